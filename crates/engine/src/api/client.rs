//! HTTP implementation of [`Backend`].

use std::sync::Arc;

use async_trait::async_trait;
use mineiro_core::StoreSnapshot;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, instrument};
use url::Url;

use super::{ApiError, Backend, ImageUpload, SnapshotResponse, UploadResponse, WriteRequest, WriteResponse};
use crate::config::{EngineConfig, endpoint};

/// Longest response body excerpt kept in errors and logs.
const BODY_EXCERPT: usize = 500;

// =============================================================================
// MineiroClient
// =============================================================================

/// Client for the Mineiro API.
#[derive(Clone)]
pub struct MineiroClient {
    inner: Arc<MineiroClientInner>,
}

struct MineiroClientInner {
    client: reqwest::Client,
    store_url: Url,
    edit_url: Url,
    upload_url: Url,
    api_token: Option<SecretString>,
}

impl std::fmt::Debug for MineiroClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MineiroClient")
            .field("store_url", &self.inner.store_url.as_str())
            .field("edit_url", &self.inner.edit_url.as_str())
            .field("upload_url", &self.inner.upload_url.as_str())
            .field("api_token", &self.inner.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl MineiroClient {
    /// Create a client for the configured API.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint URL cannot be built.
    pub fn new(config: &EngineConfig) -> Result<Self, ApiError> {
        Ok(Self {
            inner: Arc::new(MineiroClientInner {
                client: reqwest::Client::new(),
                store_url: endpoint(&config.api_base_url, "tienda")?,
                edit_url: endpoint(&config.api_base_url, "edit")?,
                upload_url: config.upload_endpoint()?,
                api_token: config.api_token.clone(),
            }),
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.inner.api_token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    /// Read the body, turning non-success statuses into [`ApiError::Api`].
    async fn read_body(response: reqwest::Response) -> Result<String, ApiError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let excerpt: String = body.chars().take(BODY_EXCERPT).collect();
            error!(status = %status, body = %excerpt, "Mineiro API returned non-success status");
            return Err(ApiError::Api {
                status: status.as_u16(),
                message: excerpt,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl Backend for MineiroClient {
    #[instrument(skip(self), fields(slug = %slug))]
    async fn fetch_snapshot(
        &self,
        slug: &str,
        hostname: Option<&str>,
    ) -> Result<StoreSnapshot, ApiError> {
        let mut url = self.inner.store_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("slug", slug);
            if let Some(hostname) = hostname {
                query.append_pair("hostname", hostname);
            }
            query.append_pair("include", "all");
        }

        let response = self.inner.client.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(slug.to_string()));
        }
        let body = Self::read_body(response).await?;

        let parsed: SnapshotResponse = serde_json::from_str(&body).map_err(|e| {
            error!(
                error = %e,
                body = %body.chars().take(BODY_EXCERPT).collect::<String>(),
                "Failed to parse snapshot response"
            );
            e
        })?;

        let snapshot = parsed
            .into_snapshot()
            .ok_or_else(|| ApiError::NotFound(slug.to_string()))?;
        debug!(
            products = snapshot.products.len(),
            testimonials = snapshot.testimonials.len(),
            "Fetched snapshot"
        );
        Ok(snapshot)
    }

    #[instrument(skip(self, request), fields(table = %request.table, action = ?request.action))]
    async fn write(&self, request: &WriteRequest) -> Result<WriteResponse, ApiError> {
        let response = self
            .authorized(self.inner.client.post(self.inner.edit_url.clone()))
            .json(request)
            .send()
            .await?;
        let body = Self::read_body(response).await?;
        let result: WriteResponse = serde_json::from_str(&body)?;

        if !result.success {
            let message = result.error.unwrap_or_else(|| "Unknown error".to_string());
            error!(error = %message, "Mineiro API rejected write");
            return Err(ApiError::Rejected(message));
        }

        debug!("Write accepted");
        Ok(result)
    }

    #[instrument(skip(self, upload), fields(file = %upload.file_name, bytes = upload.bytes.len()))]
    async fn upload_image(&self, upload: &ImageUpload) -> Result<String, ApiError> {
        let part = Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.content_type)?;
        let form = Form::new().part("file", part);

        let response = self
            .authorized(self.inner.client.post(self.inner.upload_url.clone()))
            .multipart(form)
            .send()
            .await?;
        let body = Self::read_body(response).await?;
        let uploaded: UploadResponse = serde_json::from_str(&body)?;

        debug!(url = %uploaded.url, "Image uploaded");
        Ok(uploaded.url)
    }
}
