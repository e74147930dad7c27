#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the gasrelay gas-sponsorship relay.
//!
//! A relayer holds a single funded identity and pays gas on behalf of end users
//! who have only produced an off-chain signature. This crate contains the
//! chain-agnostic parts of that service: the request model for signed escrow
//! actions, the error taxonomy shared by both gateways, the rate-limit store
//! used by the onboarding drip, and exact fixed-point amount handling.
//!
//! Chain plumbing and the gateways themselves live in `gasrelay-evm`; the HTTP
//! front end lives in `gasrelay-server`.
//!
//! # Modules
//!
//! - [`action`] - Escrow action kinds, their required parameters, and request validation
//! - [`address`] - Address syntax checks and rate-limit key normalization
//! - [`amount`] - Decimal string to fixed-point integer conversion
//! - [`error`] - Error taxonomy (configuration, validation, rate limit, exhaustion, chain)
//! - [`store`] - [`RateLimitStore`](store::RateLimitStore) capability and an in-memory implementation
//! - [`timestamp`] - Unix timestamps for authorization deadlines

pub mod action;
pub mod address;
pub mod amount;
pub mod error;
pub mod store;
pub mod timestamp;

pub use action::{ActionKind, EscrowAction, MetaTxRequest, RelayRequestBody};
pub use error::RelayError;
pub use store::{MemoryRateLimitStore, RateLimitStore};
pub use timestamp::UnixTimestamp;
