//! HTTP server for the gasrelay relay and drip gateways.
//!
//! # Modules
//!
//! - [`handlers`]: Axum route handlers and router builder
//! - [`error`]: HTTP status mapping for gateway errors
//! - [`config`]: Server configuration with environment variable expansion
//! - [`shutdown`]: Signal handling and draining of in-flight drips

pub mod config;
pub mod error;
pub mod handlers;
pub mod shutdown;

pub use handlers::{RelayState, relay_router};
