//! Backend and push-channel ports. [`MineiroClient`] implements [`Backend`]
//! over HTTP.

mod client;
pub mod types;

pub use client::MineiroClient;
pub use types::*;

use async_trait::async_trait;
use mineiro_core::{StoreId, StoreSnapshot};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status.
    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Store not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The write endpoint answered but refused the write.
    #[error("Write rejected: {0}")]
    Rejected(String),

    /// An endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The push channel is unavailable.
    #[error("Change feed unavailable: {0}")]
    FeedUnavailable(String),
}

/// Request/response side of the Mineiro API.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetch the store, its products and its testimonials.
    async fn fetch_snapshot(
        &self,
        slug: &str,
        hostname: Option<&str>,
    ) -> Result<StoreSnapshot, ApiError>;

    /// Send one write to `POST /edit`.
    async fn write(&self, request: &WriteRequest) -> Result<WriteResponse, ApiError>;

    /// Upload an image and return its public URL.
    async fn upload_image(&self, upload: &ImageUpload) -> Result<String, ApiError>;
}

/// A live push subscription.
#[derive(Debug)]
pub struct Subscription {
    /// Resolves once the server acknowledged the subscription.
    pub confirmed: oneshot::Receiver<()>,
    /// Row changes; closes when the channel drops.
    pub events: mpsc::Receiver<ChangeEvent>,
}

/// Push side of the Mineiro API.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Subscribe to row changes of one store.
    async fn subscribe(&self, store_id: &StoreId) -> Result<Subscription, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = ApiError::Api {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "API returned 500: boom");
        assert_eq!(
            ApiError::NotFound("don-pepe".to_string()).to_string(),
            "Not found: don-pepe"
        );
    }
}
