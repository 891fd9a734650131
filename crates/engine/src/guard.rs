//! Protection of fresh local edits from background reconciliation.
//!
//! After the operator saves a value, the backend may still hand back the old
//! one for a while (push lag, a poll already in flight). For the guard window
//! every address edited locally is skipped by hydration and its pending value
//! is laid over incoming snapshots.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::address::BindingAddress;

/// One protected local edit.
#[derive(Debug, Clone, PartialEq)]
pub struct EditedElementRecord {
    pub address: BindingAddress,
    pub pending_value: Value,
    pub edited_at: Instant,
}

/// Address-keyed set of recent local edits.
#[derive(Debug)]
pub struct LocalEditGuard {
    window: Duration,
    records: HashMap<String, EditedElementRecord>,
}

impl LocalEditGuard {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            records: HashMap::new(),
        }
    }

    /// Record a local edit, restarting the window for that address.
    pub fn mark_edited(&mut self, address: &BindingAddress, value: Value) {
        self.records.insert(
            address.to_string(),
            EditedElementRecord {
                address: address.clone(),
                pending_value: value,
                edited_at: Instant::now(),
            },
        );
    }

    /// Whether `address` was edited within the window.
    #[must_use]
    pub fn is_guarded(&self, address: &BindingAddress) -> bool {
        self.records
            .get(&address.to_string())
            .is_some_and(|r| self.is_live(r))
    }

    /// Pending value of a live record for `address`.
    #[must_use]
    pub fn pending_value(&self, address: &BindingAddress) -> Option<&Value> {
        self.records
            .get(&address.to_string())
            .filter(|r| self.is_live(r))
            .map(|r| &r.pending_value)
    }

    /// Drop expired records.
    pub fn prune(&mut self) {
        let window = self.window;
        self.records
            .retain(|_, r| r.edited_at.elapsed() < window);
    }

    /// Records still inside the window.
    pub fn active(&mut self) -> impl Iterator<Item = &EditedElementRecord> {
        self.prune();
        self.records.values()
    }

    fn is_live(&self, record: &EditedElementRecord) -> bool {
        record.edited_at.elapsed() < self.window
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_guard_window() {
        let mut guard = LocalEditGuard::new(Duration::from_secs(30));
        let address = BindingAddress::parse("hero.titulo");
        guard.mark_edited(&address, json!("Nuevo"));

        assert!(guard.is_guarded(&address));
        assert!(!guard.is_guarded(&BindingAddress::parse("hero.subtitulo")));

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(guard.is_guarded(&address));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!guard.is_guarded(&address));
        assert_eq!(guard.active().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_re_edit_restarts_window() {
        let mut guard = LocalEditGuard::new(Duration::from_secs(30));
        let address = BindingAddress::parse("producto-pizza.precio");
        guard.mark_edited(&address, json!(9990));

        tokio::time::advance(Duration::from_secs(20)).await;
        guard.mark_edited(&address, json!(10990));

        tokio::time::advance(Duration::from_secs(20)).await;
        let active: Vec<_> = guard.active().collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].pending_value, json!(10990));
    }
}
