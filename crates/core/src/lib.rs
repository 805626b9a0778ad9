//! Core of the CRM sync layer: entity model, store, reconciler, mutation
//! commands, session handling and configuration.

pub mod commands;
pub mod config;
pub mod entities;
pub mod errors;
pub mod gateway;
pub mod service;
pub mod session;
pub mod store;
pub mod sync;

#[cfg(test)]
mod fixtures;

pub use commands::CrmCommands;
pub use config::SyncConfig;
pub use entities::{Entity, EntityKind, EntityRecord};
pub use errors::{Error, ErrorKind, Result};
pub use gateway::{CrmGateway, HttpMethod};
pub use service::CrmSync;
pub use session::{SessionEvent, SessionManager, UserProfile};
pub use store::{ApplyOutcome, CrmSnapshot, CrmStats, EntityStore, StoreChange};
pub use sync::{ChangeEvent, SyncReconciler, WireUpdate};
