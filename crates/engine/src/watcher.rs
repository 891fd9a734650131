//! Re-hydration after host re-renders.
//!
//! The host page may replace bound elements at any time (client-side
//! routing, framework re-renders). The watcher listens to the document's
//! mutation channel and, once insertions that carry a binding have settled
//! for the debounce period, runs a hydration pass with the current snapshot.
//! Other mutations never delay that pass.

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::dom::{Document, ElementId, MutationEvent};
use crate::session::EngineSession;

/// Whether any of `inserted`, or anything below them, carries `attribute`.
#[must_use]
pub fn binds_any(doc: &dyn Document, attribute: &str, inserted: &[ElementId]) -> bool {
    inserted.iter().any(|el| {
        doc.attribute(*el, attribute).is_some()
            || doc
                .descendants(*el)
                .into_iter()
                .any(|d| doc.attribute(d, attribute).is_some())
    })
}

impl EngineSession {
    fn inserts_bindings(&self, event: &MutationEvent) -> bool {
        let MutationEvent::Inserted(inserted) = event else {
            return false;
        };
        let state = self.lock();
        binds_any(state.document.as_ref(), state.hydrator.bind_attribute(), inserted)
    }
}

/// Longest a pending pass can be pushed back by further insertions, in
/// debounce periods.
const MAX_DEFERRALS: u32 = 5;

/// Run the watcher until the document drops its channel or the task is
/// aborted.
pub(crate) async fn run(session: EngineSession, mut events: mpsc::UnboundedReceiver<MutationEvent>) {
    let debounce = session.config().timing.debounce;

    while let Some(event) = events.recv().await {
        if !session.inserts_bindings(&event) {
            continue;
        }

        // Wait until binding insertions stop for a full debounce period.
        // Unrelated churn never postpones the pass.
        let latest = Instant::now() + debounce * MAX_DEFERRALS;
        let deadline = sleep(debounce);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                () = &mut deadline => break,
                next = events.recv() => match next {
                    Some(event) if session.inserts_bindings(&event) => {
                        let reset = (Instant::now() + debounce).min(latest);
                        deadline.as_mut().reset(reset);
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }

        let report = session.hydrate();
        debug!(applied = report.applied, "Re-hydrated after insertion");
    }
}
