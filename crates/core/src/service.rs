//! Composition of the store, reconciler and commands into one service.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::commands::CrmCommands;
use crate::gateway::CrmGateway;
use crate::store::EntityStore;
use crate::sync::{ChangeEvent, ReconcileStats, SyncReconciler};

/// The injectable sync service: one store shared by the commands and by the
/// remote event pump.
#[derive(Debug, Clone)]
pub struct CrmSync {
    commands: CrmCommands,
}

impl CrmSync {
    pub fn new(gateway: Arc<dyn CrmGateway>) -> Self {
        Self::with_store(gateway, Arc::new(EntityStore::new()))
    }

    pub fn with_store(gateway: Arc<dyn CrmGateway>, store: Arc<EntityStore>) -> Self {
        let reconciler = SyncReconciler::new(store);
        Self {
            commands: CrmCommands::new(gateway, reconciler),
        }
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        self.commands.store()
    }

    pub fn commands(&self) -> &CrmCommands {
        &self.commands
    }

    pub fn reconciler(&self) -> &SyncReconciler {
        self.commands.reconciler()
    }

    /// Applies remote events on a background task until `events` closes.
    pub fn spawn_reconciler(
        &self,
        events: mpsc::Receiver<ChangeEvent>,
    ) -> JoinHandle<ReconcileStats> {
        let reconciler = self.reconciler().clone();
        tokio::spawn(async move { reconciler.run(events).await })
    }
}
