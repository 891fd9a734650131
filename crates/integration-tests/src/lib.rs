//! Integration tests for Mineiro.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p mineiro-integration-tests
//! ```
//!
//! Everything runs in-process: pages are [`MemoryDocument`]s, the backend is
//! a [`FakeBackend`] and the push channel a [`FakeFeed`]. Timing-sensitive
//! tests use tokio's paused clock.
//!
//! # Test Categories
//!
//! - `hydration` - Address parsing, resolution and hydration passes
//! - `editing` - Inline edits, restore, undo and quick-add
//! - `sync` - Push, poll fallback and stale responses

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use mineiro_core::{StoreId, StoreSnapshot};
use mineiro_engine::api::{
    ApiError, Backend, ChangeEvent, ChangeFeed, ImageUpload, Subscription, WriteRequest,
    WriteResponse,
};
use mineiro_engine::preserved::{KeyValueStore, StorageError};
use mineiro_engine::{EngineConfig, EngineSession, MemoryDocument};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use url::Url;

pub use mineiro_engine::dom::{Document, ElementId};

/// Store slug used by every fixture.
pub const SLUG: &str = "don-pepe";

/// Bind attribute used by every fixture page.
pub const BIND: &str = "data-mineiro-bind";

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Fixtures
// =============================================================================

/// Snapshot of a paid pizzeria with sized and variant-priced products.
#[must_use]
pub fn pizzeria() -> StoreSnapshot {
    snapshot_from(json!({
        "tienda": {
            "id": 1,
            "slug": SLUG,
            "nombre": "Pizzería Don Pepe",
            "estado_pago": true,
            "plan": "pro",
            "config": {
                "hero": {"titulo": "Hola", "subtitulo": "Masa madre desde 1998"},
                "footer": {"whatsapp_url": "https://wa.me/56900000000"}
            }
        },
        "productos": [
            {
                "id": 7,
                "dom_id": "napo",
                "nombre": "Napolitana",
                "precio": 9990,
                "configuracion": {"precios": {"fam": 12990, "ind": 6990}}
            },
            {
                "id": 8,
                "dom_id": "marga",
                "nombre": "Margarita",
                "precio": 8990,
                "configuracion": {"variantes": [
                    {"nombre": "Mediana", "precio": 9490},
                    {"nombre": "Familiar", "precio": 13490}
                ]}
            },
            {"id": 9, "dom_id": "bebida", "nombre": "Bebida", "precio": 1990}
        ],
        "testimonios": [
            {"id": 3, "dom_id": "ana", "nombre": "Ana", "texto": "La mejor pizza", "rating": 5}
        ]
    }))
}

/// Parse a snapshot from its wire JSON.
///
/// # Panics
///
/// Panics if the JSON is not a snapshot.
#[must_use]
pub fn snapshot_from(value: Value) -> StoreSnapshot {
    serde_json::from_value(value).unwrap_or_else(|e| panic!("invalid fixture snapshot: {e}"))
}

/// Engine configuration for the fixture store.
///
/// # Panics
///
/// Never, the URL is constant.
#[must_use]
pub fn config() -> EngineConfig {
    let url = Url::parse("https://api.mineiro.test/v1/")
        .unwrap_or_else(|e| panic!("invalid fixture url: {e}"));
    EngineConfig::new(url, SLUG)
}

/// A page with `(tag, address, original text)` elements under `body`.
#[must_use]
pub fn page(elements: &[(&str, &str, &str)]) -> (MemoryDocument, Vec<ElementId>) {
    let mut doc = MemoryDocument::new();
    let body = doc.body();
    let ids = elements
        .iter()
        .map(|(tag, address, text)| doc.append_element(body, tag, &[(BIND, address)], text))
        .collect();
    (doc, ids)
}

/// Build an admin session over `doc`.
///
/// # Panics
///
/// Panics if the session cannot be built.
#[must_use]
pub fn admin_session(backend: &Arc<FakeBackend>, doc: MemoryDocument) -> EngineSession {
    session_with(backend, doc, None, None)
}

/// Build a session, optionally with a shared preserved store and a feed.
///
/// # Panics
///
/// Panics if the session cannot be built.
#[must_use]
pub fn session_with(
    backend: &Arc<FakeBackend>,
    doc: MemoryDocument,
    store: Option<SharedStore>,
    feed: Option<Arc<FakeFeed>>,
) -> EngineSession {
    let page_url = Url::parse("https://donpepe.cl/?mineiro-admin")
        .unwrap_or_else(|e| panic!("invalid fixture url: {e}"));
    let mut builder = EngineSession::builder(config(), backend.clone(), doc).page_url(page_url);
    if let Some(store) = store {
        builder = builder.preserved_store(Box::new(store));
    }
    if let Some(feed) = feed {
        builder = builder.change_feed(feed);
    }
    builder
        .build()
        .unwrap_or_else(|e| panic!("session build failed: {e}"))
}

/// Text of `element` in the session's document.
#[must_use]
pub fn text_of(session: &EngineSession, element: ElementId) -> Option<String> {
    session.with_document(|doc| doc.text_content(element))
}

// =============================================================================
// FakeBackend
// =============================================================================

/// In-memory backend that records writes.
#[derive(Debug)]
pub struct FakeBackend {
    snapshot: Mutex<StoreSnapshot>,
    /// Scripted fetch responses served before the current snapshot.
    scripted: Mutex<VecDeque<(Duration, StoreSnapshot)>>,
    writes: Mutex<Vec<WriteRequest>>,
    write_reply: Mutex<Option<Value>>,
    fetches: AtomicUsize,
    fail_writes: AtomicBool,
    fail_fetches: AtomicBool,
    fail_uploads: AtomicBool,
}

impl FakeBackend {
    #[must_use]
    pub fn new(snapshot: StoreSnapshot) -> Arc<Self> {
        Arc::new(Self {
            snapshot: Mutex::new(snapshot),
            scripted: Mutex::new(VecDeque::new()),
            writes: Mutex::new(Vec::new()),
            write_reply: Mutex::new(None),
            fetches: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            fail_fetches: AtomicBool::new(false),
            fail_uploads: AtomicBool::new(false),
        })
    }

    /// Change what the backend serves from now on.
    pub fn update(&self, f: impl FnOnce(&mut StoreSnapshot)) {
        f(&mut lock(&self.snapshot));
    }

    /// Serve `snapshot` to the next unscripted fetch, after `delay`.
    pub fn script_fetch(&self, delay: Duration, snapshot: StoreSnapshot) {
        lock(&self.scripted).push_back((delay, snapshot));
    }

    /// Data returned by successful writes.
    pub fn reply_with(&self, data: Value) {
        *lock(&self.write_reply) = Some(data);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn writes(&self) -> Vec<WriteRequest> {
        lock(&self.writes).clone()
    }

    #[must_use]
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn fetch_snapshot(
        &self,
        slug: &str,
        _hostname: Option<&str>,
    ) -> Result<StoreSnapshot, ApiError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(ApiError::Api {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        if slug != SLUG {
            return Err(ApiError::NotFound(slug.to_string()));
        }

        let scripted = lock(&self.scripted).pop_front();
        match scripted {
            Some((delay, snapshot)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(snapshot)
            }
            None => Ok(lock(&self.snapshot).clone()),
        }
    }

    async fn write(&self, request: &WriteRequest) -> Result<WriteResponse, ApiError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ApiError::Rejected("permission denied".to_string()));
        }
        lock(&self.writes).push(request.clone());
        Ok(WriteResponse::ok(lock(&self.write_reply).clone()))
    }

    async fn upload_image(&self, upload: &ImageUpload) -> Result<String, ApiError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(ApiError::Rejected("upload refused".to_string()));
        }
        Ok(format!("https://cdn.mineiro.test/{}", upload.file_name))
    }
}

// =============================================================================
// FakeFeed
// =============================================================================

/// Push channel the test drives by hand.
#[derive(Debug)]
pub struct FakeFeed {
    confirm: bool,
    events: Mutex<Option<mpsc::Sender<ChangeEvent>>>,
    /// Kept alive so an unconfirmed subscription times out instead of failing.
    pending_confirm: Mutex<Option<oneshot::Sender<()>>>,
    subscriptions: AtomicUsize,
}

impl FakeFeed {
    /// A feed that confirms (or never confirms) its subscriptions.
    #[must_use]
    pub fn new(confirm: bool) -> Arc<Self> {
        Arc::new(Self {
            confirm,
            events: Mutex::new(None),
            pending_confirm: Mutex::new(None),
            subscriptions: AtomicUsize::new(0),
        })
    }

    /// Deliver `event` to the subscriber. Returns whether one was listening.
    pub async fn push(&self, event: ChangeEvent) -> bool {
        let sender = lock(&self.events).clone();
        match sender {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Close the channel, as a dropped connection would.
    pub fn close(&self) {
        lock(&self.events).take();
    }

    #[must_use]
    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChangeFeed for FakeFeed {
    async fn subscribe(&self, _store_id: &StoreId) -> Result<Subscription, ApiError> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let (confirm_tx, confirmed) = oneshot::channel();
        let (events_tx, events) = mpsc::channel(16);
        if self.confirm {
            let _ = confirm_tx.send(());
        } else {
            *lock(&self.pending_confirm) = Some(confirm_tx);
        }
        *lock(&self.events) = Some(events_tx);
        Ok(Subscription { confirmed, events })
    }
}

// =============================================================================
// SharedStore
// =============================================================================

/// Key-value store shared between sessions, standing in for one browser's
/// local storage across page loads.
#[derive(Debug, Clone, Default)]
pub struct SharedStore(Arc<Mutex<HashMap<String, String>>>);

impl KeyValueStore for SharedStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(lock(&self.0).get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        lock(&self.0).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        lock(&self.0).remove(key);
        Ok(())
    }
}
