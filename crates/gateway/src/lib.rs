//! HTTP implementation of the CRM API gateway.

mod client;
mod error;

pub use client::{HttpGateway, LoginResponse};
pub use error::{GatewayError, Result};
