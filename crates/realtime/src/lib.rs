//! Live change feed from the CRM broadcast server.
//!
//! [`RealtimeChannel`] keeps a Socket.IO subscription to the shared update
//! room and turns every `data-update` broadcast into a typed
//! [`crmsync_core::ChangeEvent`].

mod channel;
mod error;
pub mod protocol;

pub use channel::{ChannelExit, ChannelState, RealtimeChannel, RealtimeConfig};
pub use error::{RealtimeError, Result};
