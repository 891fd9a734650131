//! The per-page engine session.
//!
//! [`EngineSession`] owns every piece of mutable engine state behind one
//! mutex: the document, the snapshot, the hydrator with its captured
//! originals, the local-edit guard, the preserved set, the undo history and
//! the current edit. The lock is never held across an `.await`; network calls
//! happen between two short critical sections.
//!
//! Background work (mutation watcher, synchronizer) runs on tokio tasks
//! spawned by [`EngineSession::start`] and aborted by
//! [`EngineSession::shutdown`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use mineiro_core::{AccountStatus, StoreSnapshot};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use url::Url;

use crate::address::BindingAddress;
use crate::api::{ApiError, Backend, ChangeFeed, WriteResponse};
use crate::config::{EngineConfig, admin_mode_requested};
use crate::dom::{Document, ElementId};
use crate::edit::EditSession;
use crate::error::EngineError;
use crate::guard::LocalEditGuard;
use crate::history::ChangeHistory;
use crate::hydrate::{HydrationReport, Hydrator};
use crate::preserved::{FileStore, KeyValueStore, MemoryStore, PreservedOriginals};
use crate::writeback::WritePlan;
use crate::{sync, watcher};

/// Attribute identifying the suspension banner.
pub const BANNER_ATTRIBUTE: &str = "data-mineiro-banner";

// =============================================================================
// State
// =============================================================================

/// Everything the engine mutates, guarded by the session mutex.
pub(crate) struct EngineState {
    pub document: Box<dyn Document>,
    pub snapshot: Option<StoreSnapshot>,
    pub status: Option<AccountStatus>,
    pub hydrator: Hydrator,
    pub guard: LocalEditGuard,
    pub preserved: PreservedOriginals,
    pub history: ChangeHistory,
    pub edit: Option<EditSession>,
    pub admin: bool,
    /// Sequence number of the last fetch whose response was applied.
    pub applied_seq: u64,
    /// Structural hash of the last applied fetch.
    pub last_hash: Option<u64>,
    pub banner: Option<ElementId>,
}

impl EngineState {
    /// Whether hydration and editing may run.
    pub fn is_operational(&self) -> bool {
        self.status.is_some_and(AccountStatus::is_operational)
    }

    /// Strip markers matching `filter`, then hydrate.
    pub fn rehydrate(&mut self, filter: impl Fn(&BindingAddress) -> bool) -> HydrationReport {
        if !self.is_operational() {
            return HydrationReport::default();
        }
        let Some(snapshot) = self.snapshot.as_ref() else {
            return HydrationReport::default();
        };
        self.hydrator
            .invalidate(self.document.as_mut(), &self.guard, &self.preserved, filter);
        self.hydrator
            .hydrate(self.document.as_mut(), snapshot, &self.guard, &self.preserved)
    }

    /// Show the suspension banner once.
    pub fn render_banner(&mut self, billing_url: &str) {
        if self.banner.is_some_and(|b| self.document.contains(b)) {
            return;
        }
        let doc = self.document.as_mut();
        let banner = doc.create_element("div");
        doc.set_attribute(banner, BANNER_ATTRIBUTE, "suspended");
        doc.set_attribute(banner, "role", "alert");
        doc.set_inner_html(
            banner,
            &format!(
                "Este sitio está temporalmente suspendido. <a href=\"{}\">Regulariza tu plan</a>",
                billing_url.replace('"', "%22")
            ),
        );
        let body = doc.body();
        doc.append_child(body, banner);
        self.banner = Some(banner);
    }

    pub fn remove_banner(&mut self) {
        if let Some(banner) = self.banner.take() {
            self.document.remove(banner);
        }
    }
}

// =============================================================================
// EngineSession
// =============================================================================

/// One binding engine attached to one page.
#[derive(Clone)]
pub struct EngineSession {
    pub(crate) inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    pub config: EngineConfig,
    pub backend: Arc<dyn Backend>,
    pub feed: Option<Arc<dyn ChangeFeed>>,
    pub state: Mutex<EngineState>,
    /// Last handed-out fetch sequence number.
    pub fetch_seq: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSession")
            .field("slug", &self.inner.config.slug)
            .field("push", &self.inner.feed.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`EngineSession`].
pub struct EngineSessionBuilder {
    config: EngineConfig,
    backend: Arc<dyn Backend>,
    document: Box<dyn Document>,
    preserved_store: Option<Box<dyn KeyValueStore>>,
    feed: Option<Arc<dyn ChangeFeed>>,
    page_url: Option<Url>,
}

impl EngineSessionBuilder {
    /// Persist the preserved set here instead of the configured default.
    #[must_use]
    pub fn preserved_store(mut self, store: Box<dyn KeyValueStore>) -> Self {
        self.preserved_store = Some(store);
        self
    }

    /// Use a push channel before falling back to polling.
    #[must_use]
    pub fn change_feed(mut self, feed: Arc<dyn ChangeFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// URL of the host page, checked for the admin flag.
    #[must_use]
    pub fn page_url(mut self, url: Url) -> Self {
        self.page_url = Some(url);
        self
    }

    /// Build the session. Nothing is fetched until [`EngineSession::start`].
    ///
    /// # Errors
    ///
    /// Returns an error if the preserved set cannot be loaded.
    pub fn build(self) -> Result<EngineSession, EngineError> {
        let store: Box<dyn KeyValueStore> = match (self.preserved_store, &self.config.state_dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => Box::new(FileStore::new(dir.clone())),
            (None, None) => Box::new(MemoryStore::new()),
        };
        let admin = self
            .page_url
            .as_ref()
            .is_some_and(|url| admin_mode_requested(url, &self.config.admin_flag));

        let state = EngineState {
            document: self.document,
            snapshot: None,
            status: None,
            hydrator: Hydrator::new(self.config.bind_attribute.clone()),
            guard: LocalEditGuard::new(self.config.timing.guard_window),
            preserved: PreservedOriginals::load(store)?,
            history: ChangeHistory::new(self.config.history_capacity),
            edit: None,
            admin,
            applied_seq: 0,
            last_hash: None,
            banner: None,
        };

        Ok(EngineSession {
            inner: Arc::new(SessionInner {
                config: self.config,
                backend: self.backend,
                feed: self.feed,
                state: Mutex::new(state),
                fetch_seq: AtomicU64::new(0),
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }
}

impl EngineSession {
    /// Start building a session over `document`.
    pub fn builder(
        config: EngineConfig,
        backend: Arc<dyn Backend>,
        document: impl Document + 'static,
    ) -> EngineSessionBuilder {
        EngineSessionBuilder {
            config,
            backend,
            document: Box::new(document),
            preserved_store: None,
            feed: None,
            page_url: None,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Fetch the snapshot, hydrate the page and start background work.
    ///
    /// A suspended store gets its banner; the synchronizer still runs so the
    /// page recovers once the store is paid. A failed initial fetch is
    /// returned as is and nothing is spawned.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial snapshot cannot be fetched.
    #[instrument(skip(self), fields(slug = %self.inner.config.slug))]
    pub async fn start(&self) -> Result<AccountStatus, EngineError> {
        self.refresh().await?;
        let (status, events) = {
            let mut state = self.lock();
            let status = state.status.unwrap_or(AccountStatus::Suspended);
            (status, state.document.subscribe())
        };

        let mut tasks = self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.push(tokio::spawn(watcher::run(self.clone(), events)));
        tasks.push(tokio::spawn(sync::run(self.clone())));
        info!(status = ?status, "Engine started");
        Ok(status)
    }

    /// Stop background work.
    pub fn shutdown(&self) {
        let mut tasks = self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    /// Hydrate unmarked elements with the current snapshot.
    pub fn hydrate(&self) -> HydrationReport {
        let mut state = self.lock();
        if !state.is_operational() {
            return HydrationReport::default();
        }
        let state = &mut *state;
        let Some(snapshot) = state.snapshot.as_ref() else {
            return HydrationReport::default();
        };
        state
            .hydrator
            .hydrate(state.document.as_mut(), snapshot, &state.guard, &state.preserved)
    }

    /// Turn the editing UI on.
    pub fn enable(&self) {
        self.lock().admin = true;
        info!("Admin mode enabled");
    }

    /// Turn the editing UI off, dropping any open edit.
    pub fn disable(&self) {
        let mut state = self.lock();
        state.admin = false;
        state.edit = None;
        info!("Admin mode disabled");
    }

    #[must_use]
    pub fn is_admin_mode(&self) -> bool {
        self.lock().admin
    }

    /// Copy of the current snapshot.
    #[must_use]
    pub fn data(&self) -> Option<StoreSnapshot> {
        self.lock().snapshot.clone()
    }

    #[must_use]
    pub fn status(&self) -> Option<AccountStatus> {
        self.lock().status
    }

    /// Number of undoable edits.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.lock().history.len()
    }

    /// Addresses currently kept at the page's original markup.
    #[must_use]
    pub fn preserved(&self) -> Vec<String> {
        self.lock().preserved.iter().map(ToString::to_string).collect()
    }

    /// Run `f` against the document under the session lock.
    pub fn with_document<R>(&self, f: impl FnOnce(&mut dyn Document) -> R) -> R {
        f(self.lock().document.as_mut())
    }

    /// Send every request of a plan.
    ///
    /// When only some requests land, their changes are merged into the
    /// snapshot before the first failure is returned.
    pub(crate) async fn send_plan(&self, plan: &WritePlan) -> Result<Vec<WriteResponse>, ApiError> {
        let backend = self.inner.backend.as_ref();
        let results = join_all(plan.requests.iter().map(|request| backend.write(request))).await;
        if results.iter().all(Result::is_ok) {
            return results.into_iter().collect();
        }

        let landed: Vec<bool> = results.iter().map(Result::is_ok).collect();
        let count = landed.iter().filter(|ok| **ok).count();
        if count > 0 {
            warn!(landed = count, total = landed.len(), "Write plan partially applied");
            if let Some(snapshot) = self.lock().snapshot.as_mut() {
                plan.apply_where(snapshot, |i| landed.get(i).copied().unwrap_or(false));
            }
        }
        results.into_iter().collect()
    }

    /// Next fetch sequence number.
    pub(crate) fn next_seq(&self) -> u64 {
        self.inner.fetch_seq.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// First row carried by a write response, if any.
pub(crate) fn returned_row(responses: &[WriteResponse]) -> Option<Value> {
    responses
        .iter()
        .filter_map(|r| r.data.as_ref())
        .find_map(|data| match data {
            Value::Array(rows) => rows.first().cloned(),
            Value::Object(_) => Some(data.clone()),
            _ => None,
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use mineiro_core::{Product, Table};

    use crate::api::{ImageUpload, WriteRequest};
    use crate::dom::MemoryDocument;
    use crate::writeback::LocalChange;

    struct StaticBackend(StoreSnapshot);

    #[async_trait]
    impl Backend for StaticBackend {
        async fn fetch_snapshot(&self, _: &str, _: Option<&str>) -> Result<StoreSnapshot, ApiError> {
            Ok(self.0.clone())
        }

        async fn write(&self, _: &WriteRequest) -> Result<WriteResponse, ApiError> {
            Ok(WriteResponse::ok(None))
        }

        async fn upload_image(&self, _: &ImageUpload) -> Result<String, ApiError> {
            Err(ApiError::FeedUnavailable("no uploads".to_string()))
        }
    }

    fn config() -> EngineConfig {
        EngineConfig::new(Url::parse("https://app.mineiro.cl/api").unwrap(), "don-pepe")
    }

    fn snapshot(paid: bool) -> StoreSnapshot {
        serde_json::from_value(json!({
            "tienda": {
                "id": 1,
                "slug": "don-pepe",
                "estado_pago": paid,
                "plan": "pro",
                "config": {"hero": {"titulo": "Hola"}}
            }
        }))
        .unwrap()
    }

    fn session(paid: bool, page: &str) -> EngineSession {
        let mut doc = MemoryDocument::new();
        let body = doc.body();
        doc.append_element(body, "h1", &[("data-mineiro-bind", "hero.titulo")], "x");
        EngineSession::builder(config(), Arc::new(StaticBackend(snapshot(paid))), doc)
            .page_url(Url::parse(page).unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_admin_flag_from_page_url() {
        assert!(session(true, "https://pizzeria.cl/?mineiro-admin").is_admin_mode());
        let s = session(true, "https://pizzeria.cl/");
        assert!(!s.is_admin_mode());
        s.enable();
        assert!(s.is_admin_mode());
        s.disable();
        assert!(!s.is_admin_mode());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_hydrates_and_shuts_down() {
        let s = session(true, "https://pizzeria.cl/");
        assert_eq!(s.start().await.unwrap(), AccountStatus::Active);
        let text = s.with_document(|doc| {
            let el = doc.query_attribute("data-mineiro-bind")[0];
            doc.text_content(el)
        });
        assert_eq!(text.as_deref(), Some("Hola"));
        assert_eq!(s.data().unwrap().store.slug, "don-pepe");
        s.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspended_store_renders_banner_only() {
        let s = session(false, "https://pizzeria.cl/");
        assert_eq!(s.start().await.unwrap(), AccountStatus::Suspended);
        s.with_document(|doc| {
            let banners = doc.query_attribute(BANNER_ATTRIBUTE);
            assert_eq!(banners.len(), 1);
            let el = doc.query_attribute("data-mineiro-bind")[0];
            assert_eq!(doc.text_content(el).as_deref(), Some("x"));
        });
        assert_eq!(s.hydrate(), HydrationReport::default());
        s.shutdown();
    }

    /// Accepts store writes and refuses product writes.
    struct StoreOnlyBackend(StoreSnapshot);

    #[async_trait]
    impl Backend for StoreOnlyBackend {
        async fn fetch_snapshot(&self, _: &str, _: Option<&str>) -> Result<StoreSnapshot, ApiError> {
            Ok(self.0.clone())
        }

        async fn write(&self, request: &WriteRequest) -> Result<WriteResponse, ApiError> {
            match request.table {
                Table::Tiendas => Ok(WriteResponse::ok(None)),
                _ => Err(ApiError::Rejected("productos locked".to_string())),
            }
        }

        async fn upload_image(&self, _: &ImageUpload) -> Result<String, ApiError> {
            Err(ApiError::FeedUnavailable("no uploads".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_plan_merges_landed_writes() {
        let s = EngineSession::builder(
            config(),
            Arc::new(StoreOnlyBackend(snapshot(true))),
            MemoryDocument::new(),
        )
        .build()
        .unwrap();
        s.refresh().await.unwrap();

        let product: Product =
            serde_json::from_value(json!({"id": 5, "nombre": "Calzone"})).unwrap();
        let plan = WritePlan {
            requests: vec![
                WriteRequest::update(Table::Tiendas, json!({"config": {}}), json!({"id": 1})),
                WriteRequest::update(Table::Productos, json!({"nombre": "Calzone"}), json!({"id": 5})),
            ],
            changes: vec![
                LocalChange::StoreConfig {
                    path: "hero.titulo".to_string(),
                    value: json!("Nuevo"),
                },
                LocalChange::Product(product),
            ],
        };

        assert!(s.send_plan(&plan).await.is_err());
        let data = s.data().unwrap();
        assert_eq!(data.store.config_value("hero.titulo"), Some(&json!("Nuevo")));
        assert!(data.products.is_empty());
    }

    #[test]
    fn test_returned_row() {
        assert_eq!(
            returned_row(&[WriteResponse::ok(Some(json!([{"id": 9}])))]),
            Some(json!({"id": 9}))
        );
        assert_eq!(returned_row(&[WriteResponse::ok(None)]), None);
    }
}
