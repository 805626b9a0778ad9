use log::{debug, info};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::model::{Change, ChangeEvent};
use crate::store::{ApplyOutcome, EntityStore};

/// Totals reported when a remote event stream ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub applied: usize,
    pub skipped: usize,
}

/// Applies local mutation results and remote broadcasts to the store.
///
/// Both sources go through the same idempotent store operations, so the
/// order in which a local apply and its broadcast echo arrive does not matter.
#[derive(Debug, Clone)]
pub struct SyncReconciler {
    store: Arc<EntityStore>,
}

impl SyncReconciler {
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn apply(&self, event: ChangeEvent) -> ApplyOutcome {
        let version = event.version();
        let kind = event.change.kind();
        let action = event.change.action();
        let id = event.change.id().to_string();

        let outcome = match event.change {
            Change::Created(record) => self.store.apply_create(record, version),
            Change::Updated(record) => self.store.apply_update(record, version),
            Change::Deleted(kind, id) => self.store.apply_delete(kind, &id),
        };

        debug!(
            "[Reconciler] {:?} {} {} '{}' -> {:?}",
            event.context,
            kind,
            action.as_str(),
            id,
            outcome
        );
        outcome
    }

    /// Applies remote events until the sender side closes.
    pub async fn run(&self, mut events: mpsc::Receiver<ChangeEvent>) -> ReconcileStats {
        let mut stats = ReconcileStats::default();
        while let Some(event) = events.recv().await {
            if self.apply(event).is_applied() {
                stats.applied += 1;
            } else {
                stats.skipped += 1;
            }
        }
        info!(
            "[Reconciler] Event stream closed (applied={}, skipped={})",
            stats.applied, stats.skipped
        );
        stats
    }
}
