//! Snapshot reconciliation.
//!
//! Two sources keep the snapshot current: the push channel, when one is
//! configured and confirms its subscription in time, and a fixed-interval
//! poll otherwise (or once the channel drops). Every fetch takes a sequence
//! number and only the newest response is applied. A poll only re-hydrates
//! when the structural hash changed.

use chrono::Utc;
use mineiro_core::{Product, StoreSnapshot, Table, Testimonial};
use serde::Serialize;
use serde_json::Value;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tracing::{debug, info, instrument, warn};

use crate::address::BindingAddress;
use crate::api::{ApiError, ChangeEvent, ChangeEventType, ChangeFeed, Subscription};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::guard::LocalEditGuard;
use crate::hydrate::HydrationReport;
use crate::resolve;
use crate::session::EngineSession;
use crate::writeback::{merge_product_row, merge_testimonial_row, plan_write};

/// Result of applying one fetched snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Same structural hash as the last applied fetch.
    Unchanged,
    /// The snapshot was replaced and the page re-hydrated.
    Updated(HydrationReport),
    /// A newer fetch was already applied; the response was dropped.
    Stale,
    /// The store is suspended; only the banner is shown.
    Suspended,
}

impl EngineSession {
    /// Fetch the snapshot and apply it if it is still the newest.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails; the previous snapshot is kept.
    #[instrument(skip(self), fields(slug = %self.inner.config.slug))]
    pub async fn refresh(&self) -> Result<SyncOutcome, EngineError> {
        let seq = self.next_seq();
        let config = &self.inner.config;
        let snapshot = self
            .inner
            .backend
            .fetch_snapshot(&config.slug, config.hostname.as_deref())
            .await?;
        Ok(self.apply_snapshot(seq, snapshot))
    }

    /// One poll tick. Failures are logged and keep the previous snapshot.
    pub async fn poll_once(&self) -> Option<SyncOutcome> {
        match self.refresh().await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(error = %e, "Snapshot poll failed, keeping previous snapshot");
                None
            }
        }
    }

    /// Apply the response of fetch number `seq`.
    pub(crate) fn apply_snapshot(&self, seq: u64, mut snapshot: StoreSnapshot) -> SyncOutcome {
        let config = &self.inner.config;
        let mut guard = self.lock();
        let state = &mut *guard;

        if seq <= state.applied_seq {
            debug!(seq, applied = state.applied_seq, "Dropping stale snapshot");
            return SyncOutcome::Stale;
        }
        state.applied_seq = seq;

        let status = snapshot.store.payment_state().status(Utc::now());
        state.status = Some(status);
        if !status.is_operational() {
            warn!(slug = %config.slug, "Store is suspended");
            state.snapshot = Some(snapshot);
            state.edit = None;
            state.render_banner(&config.billing_url);
            return SyncOutcome::Suspended;
        }
        state.remove_banner();

        let hash = snapshot.structural_hash();
        if state.last_hash == Some(hash) && state.snapshot.is_some() {
            return SyncOutcome::Unchanged;
        }

        // An overlaid snapshot differs from the backend's; compare the next
        // fetch afresh so the backend value returns once the guard expires.
        let overlaid = overlay_guarded(&mut state.guard, &mut snapshot, config);
        state.last_hash = (overlaid == 0).then_some(hash);
        state.snapshot = Some(snapshot);
        let report = state.rehydrate(|_| true);
        info!(seq, applied = report.applied, "Snapshot updated");
        SyncOutcome::Updated(report)
    }

    /// Merge one pushed row change and re-hydrate the addresses tied to it.
    /// Returns `None` when nothing was re-hydrated.
    pub fn apply_change(&self, event: &ChangeEvent) -> Option<HydrationReport> {
        let config = &self.inner.config;
        let mut guard = self.lock();
        let state = &mut *guard;
        let snapshot = state.snapshot.as_mut()?;

        let key = RowKey::of(&event.record);
        if let Err(e) = merge_change(snapshot, event) {
            warn!(table = %event.table, error = %e, "Ignoring unreadable change event");
            return None;
        }
        overlay_guarded(&mut state.guard, snapshot, config);
        // Pushed changes are not a fetch; the next poll compares afresh.
        state.last_hash = None;

        if event.table == Table::Tiendas {
            let status = snapshot.store.payment_state().status(Utc::now());
            state.status = Some(status);
            if !status.is_operational() {
                state.edit = None;
                state.render_banner(&config.billing_url);
                return None;
            }
            state.remove_banner();
        }

        let tied = {
            let snapshot = state.snapshot.as_ref()?;
            let table = event.table;
            move |address: &BindingAddress| key.ties(table, address, snapshot)
        };
        // `tied` borrows the snapshot; rehydrate needs the whole state.
        let addresses: Vec<BindingAddress> = state
            .document
            .query_attribute(state.hydrator.bind_attribute())
            .into_iter()
            .filter_map(|el| state.hydrator.address_of(state.document.as_ref(), el))
            .filter(|a| tied(a))
            .collect();
        debug!(table = %event.table, addresses = addresses.len(), "Applying pushed change");
        Some(state.rehydrate(|a| addresses.contains(a)))
    }
}

/// Run the synchronizer until aborted: push first, then polling.
pub(crate) async fn run(session: EngineSession) {
    let store_id = session.lock().snapshot.as_ref().map(|s| s.store.id.clone());
    if let (Some(feed), Some(store_id)) = (session.inner.feed.clone(), store_id)
        && let Err(e) = listen(&session, feed.as_ref(), &store_id).await
    {
        info!(reason = %e, "Change feed unavailable, polling instead");
    }

    let period = session.inner.config.timing.poll_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Some(outcome) = session.poll_once().await {
            debug!(?outcome, "Poll finished");
        }
    }
}

/// Consume the push channel. Returns an error once the channel is
/// unavailable, unconfirmed or closed.
async fn listen(
    session: &EngineSession,
    feed: &dyn ChangeFeed,
    store_id: &mineiro_core::StoreId,
) -> Result<(), ApiError> {
    let Subscription {
        confirmed,
        mut events,
    } = feed.subscribe(store_id).await?;

    let wait = session.inner.config.timing.push_confirm_timeout;
    match timeout(wait, confirmed).await {
        Ok(Ok(())) => info!(store = %store_id, "Change feed confirmed"),
        Ok(Err(_)) => {
            return Err(ApiError::FeedUnavailable(
                "subscription dropped before confirming".to_string(),
            ));
        }
        Err(_) => {
            return Err(ApiError::FeedUnavailable(format!(
                "no confirmation within {}ms",
                wait.as_millis()
            )));
        }
    }

    while let Some(event) = events.recv().await {
        session.apply_change(&event);
    }
    Err(ApiError::FeedUnavailable("channel closed".to_string()))
}

/// Lay the pending values of live guard records over `snapshot`. Returns the
/// number of records laid.
fn overlay_guarded(
    guard: &mut LocalEditGuard,
    snapshot: &mut StoreSnapshot,
    config: &EngineConfig,
) -> usize {
    let mut laid = 0;
    for record in guard.active() {
        match plan_write(&record.address, record.pending_value.clone(), snapshot, config) {
            Ok(plan) => {
                plan.apply(snapshot);
                laid += 1;
            }
            Err(e) => warn!(address = %record.address, error = %e, "Cannot overlay pending edit"),
        }
    }
    laid
}

fn merge_change(snapshot: &mut StoreSnapshot, event: &ChangeEvent) -> Result<(), serde_json::Error> {
    let delete = event.event_type == ChangeEventType::Delete;
    match event.table {
        Table::Tiendas if delete => {}
        Table::Tiendas => {
            let mut store = serde_json::to_value(&snapshot.store)?;
            if let (Value::Object(store), Value::Object(changes)) = (&mut store, &event.record) {
                for (column, value) in changes {
                    store.insert(column.clone(), value.clone());
                }
            }
            snapshot.store = serde_json::from_value(store)?;
        }
        Table::Productos => {
            let product: Product = serde_json::from_value(event.record.clone())?;
            if delete {
                snapshot.products.retain(|p| p.id != product.id);
            } else {
                merge_product_row(snapshot, product);
            }
        }
        Table::Testimonios => {
            let testimonial: Testimonial = serde_json::from_value(event.record.clone())?;
            if delete {
                snapshot.testimonials.retain(|t| t.id != testimonial.id);
            } else {
                merge_testimonial_row(snapshot, testimonial);
            }
        }
    }
    Ok(())
}

/// Identity of a pushed row.
#[derive(Debug, Default)]
struct RowKey {
    id: Option<String>,
    dom_id: Option<String>,
}

impl RowKey {
    fn of(record: &Value) -> Self {
        let id = record.get("id").and_then(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        let dom_id = record
            .get("dom_id")
            .and_then(Value::as_str)
            .map(ToString::to_string);
        Self { id, dom_id }
    }

    /// Whether `address` reads from this row.
    fn ties(&self, table: Table, address: &BindingAddress, snapshot: &StoreSnapshot) -> bool {
        match (table, address) {
            (Table::Tiendas, _) => true,
            (
                Table::Productos,
                BindingAddress::Product {
                    identifier,
                    category,
                    ..
                },
            ) => {
                self.dom_id.as_deref() == Some(identifier.as_str())
                    || resolve::find_product(&snapshot.products, identifier, category.as_deref())
                        .is_some_and(|p| self.id.as_deref().is_some_and(|id| p.id.matches(id)))
            }
            (Table::Testimonios, BindingAddress::Testimonial { dom_id, .. }) => {
                self.dom_id.as_deref() == Some(dom_id.as_str())
                    || resolve::find_testimonial(&snapshot.testimonials, dom_id)
                        .is_some_and(|t| self.id.as_deref().is_some_and(|id| t.id.matches(id)))
            }
            _ => false,
        }
    }
}
