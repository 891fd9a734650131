//! Bounded undo history of saved edits.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::address::BindingAddress;
use crate::apply::FieldKind;
use crate::dom::ElementId;

/// One saved edit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeHistoryEntry {
    pub id: Uuid,
    pub element: ElementId,
    pub address: BindingAddress,
    /// Value before the save; `None` when nothing resolved for the address.
    pub previous_value: Option<Value>,
    pub new_value: Value,
    pub field_kind: FieldKind,
    pub timestamp: DateTime<Utc>,
}

impl ChangeHistoryEntry {
    #[must_use]
    pub fn new(
        element: ElementId,
        address: BindingAddress,
        previous_value: Option<Value>,
        new_value: Value,
        field_kind: FieldKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            element,
            address,
            previous_value,
            new_value,
            field_kind,
            timestamp: Utc::now(),
        }
    }
}

/// Newest-last stack that evicts its oldest entry when full.
#[derive(Debug)]
pub struct ChangeHistory {
    capacity: usize,
    entries: VecDeque<ChangeHistoryEntry>,
}

impl ChangeHistory {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(64)),
        }
    }

    pub fn push(&mut self, entry: ChangeHistoryEntry) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn pop(&mut self) -> Option<ChangeHistoryEntry> {
        self.entries.pop_back()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &ChangeHistoryEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn entry(n: i64) -> ChangeHistoryEntry {
        ChangeHistoryEntry::new(
            ElementId::new(1),
            BindingAddress::parse("producto-pizza.precio"),
            Some(json!(n - 1)),
            json!(n),
            FieldKind::Price,
        )
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut history = ChangeHistory::new(50);
        for n in 0..60 {
            history.push(entry(n));
        }
        assert_eq!(history.len(), 50);
        assert_eq!(history.iter().next().unwrap().new_value, json!(10));
        assert_eq!(history.pop().unwrap().new_value, json!(59));
    }

    #[test]
    fn test_pop_empty() {
        let mut history = ChangeHistory::new(3);
        assert!(history.pop().is_none());
        assert!(history.is_empty());
    }
}
