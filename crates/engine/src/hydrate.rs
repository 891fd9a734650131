//! Hydration: resolve and write every bound element on the page.
//!
//! Hydration is idempotent. Each write leaves the hydrated marker behind and a
//! marked element is skipped, so running it again after a host re-render only
//! touches the new nodes. Re-applying a changed snapshot goes through
//! [`Hydrator::invalidate`] first.

use std::collections::HashMap;

use mineiro_core::StoreSnapshot;
use serde::Serialize;
use tracing::{debug, warn};

use crate::address::BindingAddress;
use crate::apply::{self, ApplyOptions};
use crate::dom::{Document, ElementId, ElementMarkup};
use crate::guard::LocalEditGuard;
use crate::preserved::PreservedOriginals;
use crate::resolve;

/// What one hydration pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HydrationReport {
    /// Elements written from the snapshot.
    pub applied: usize,
    /// Elements whose address resolved to nothing.
    pub unresolved: usize,
    /// Elements skipped or filled from a live local edit.
    pub guarded: usize,
    /// Elements left with the page's original content.
    pub preserved: usize,
    /// Elements already carrying the hydrated marker.
    pub already: usize,
    /// Elements whose write failed.
    pub failed: usize,
}

/// Walks bound elements and keeps their pristine markup.
#[derive(Debug)]
pub struct Hydrator {
    bind_attribute: String,
    originals: HashMap<ElementId, ElementMarkup>,
}

impl Hydrator {
    #[must_use]
    pub fn new(bind_attribute: impl Into<String>) -> Self {
        Self {
            bind_attribute: bind_attribute.into(),
            originals: HashMap::new(),
        }
    }

    #[must_use]
    pub fn bind_attribute(&self) -> &str {
        &self.bind_attribute
    }

    /// Hydrate every bound element that is not marked, guarded or preserved.
    ///
    /// Unmarked elements of a guarded address (host re-renders during the
    /// guard window) receive the pending local value instead of the
    /// snapshot's.
    pub fn hydrate(
        &mut self,
        doc: &mut dyn Document,
        snapshot: &StoreSnapshot,
        guard: &LocalEditGuard,
        preserved: &PreservedOriginals,
    ) -> HydrationReport {
        let mut report = HydrationReport::default();
        self.prune_detached(doc);

        for element in doc.query_attribute(&self.bind_attribute) {
            let Some(raw) = doc.attribute(element, &self.bind_attribute) else {
                continue;
            };
            self.capture_original(doc, element);

            if apply::is_hydrated(doc, element) {
                report.already += 1;
                continue;
            }

            let address = BindingAddress::parse(&raw);
            if preserved.contains(&address) {
                report.preserved += 1;
                continue;
            }

            if guard.is_guarded(&address) {
                report.guarded += 1;
                if let Some(pending) = guard.pending_value(&address)
                    && let Err(e) =
                        apply::apply(doc, element, pending, address.field(), ApplyOptions::default())
                {
                    warn!(address = %address, error = %e, "Failed to apply pending value");
                    report.failed += 1;
                }
                continue;
            }

            let Some(value) = resolve::resolve(&address, snapshot) else {
                debug!(address = %address, "No value for address");
                report.unresolved += 1;
                continue;
            };

            match apply::apply(doc, element, &value, address.field(), ApplyOptions::default()) {
                Ok(_) => report.applied += 1,
                Err(e) => {
                    warn!(address = %address, error = %e, "Failed to apply value");
                    report.failed += 1;
                }
            }
        }

        debug!(?report, "Hydration pass finished");
        report
    }

    /// Strip the hydrated marker from bound elements whose address matches
    /// `filter`, so the next pass rewrites them. Guarded and preserved
    /// addresses keep their marker. Returns the number of elements cleared.
    pub fn invalidate(
        &self,
        doc: &mut dyn Document,
        guard: &LocalEditGuard,
        preserved: &PreservedOriginals,
        filter: impl Fn(&BindingAddress) -> bool,
    ) -> usize {
        let mut cleared = 0;
        for element in doc.query_attribute(&self.bind_attribute) {
            let Some(raw) = doc.attribute(element, &self.bind_attribute) else {
                continue;
            };
            let address = BindingAddress::parse(&raw);
            if !filter(&address) || guard.is_guarded(&address) || preserved.contains(&address) {
                continue;
            }
            if apply::is_hydrated(doc, element) {
                apply::clear_hydrated(doc, element);
                cleared += 1;
            }
        }
        cleared
    }

    /// Remember the element's markup the first time it is seen.
    pub fn capture_original(&mut self, doc: &dyn Document, element: ElementId) {
        if self.originals.contains_key(&element) {
            return;
        }
        if let Some(mut markup) = doc.capture(element) {
            markup.attributes.remove(apply::HYDRATED_ATTRIBUTE);
            self.originals.insert(element, markup);
        }
    }

    /// Forget captured markup of elements the host has since detached.
    pub fn prune_detached(&mut self, doc: &dyn Document) {
        self.originals.retain(|element, _| doc.contains(*element));
    }

    /// Pristine markup of an element, if it was ever seen.
    #[must_use]
    pub fn original(&self, element: ElementId) -> Option<&ElementMarkup> {
        self.originals.get(&element)
    }

    /// Attached elements bound to `address`.
    #[must_use]
    pub fn elements_for(&self, doc: &dyn Document, address: &BindingAddress) -> Vec<ElementId> {
        doc.query_attribute(&self.bind_attribute)
            .into_iter()
            .filter(|el| {
                doc.attribute(*el, &self.bind_attribute)
                    .is_some_and(|raw| BindingAddress::parse(&raw) == *address)
            })
            .collect()
    }

    /// Address an element is bound to.
    #[must_use]
    pub fn address_of(&self, doc: &dyn Document, element: ElementId) -> Option<BindingAddress> {
        doc.attribute(element, &self.bind_attribute)
            .map(|raw| BindingAddress::parse(&raw))
    }
}
