//! Reconciliation of local mutation results and remote broadcasts.

mod model;
mod reconciler;

pub use model::*;
pub use reconciler::*;

#[cfg(test)]
mod tests;
