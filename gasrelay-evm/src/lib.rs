#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EVM side of the gasrelay gas-sponsorship relay.
//!
//! A single relayer identity pays gas for two kinds of work:
//!
//! - [`relay::RelayGateway`] forwards signed escrow actions (deposit, release,
//!   dispute, refund) to the escrow contract's relay-enabled entry points.
//! - [`drip::DripGateway`] sends a small, once-per-address amount of native
//!   currency to new users so they can pay for their first approval.
//!
//! Both gateways reach the chain only through [`provider::RelayerProvider`],
//! implemented for a live node by [`provider::ChainConnection`].
//!
//! # Modules
//!
//! - [`contract`] - Solidity bindings for the escrow relay entry points
//! - [`drip`] - Onboarding drip with claim-then-send rate limiting
//! - [`provider`] - Chain connection, relayer identity and nonce management
//! - [`relay`] - Action-to-entry-point dispatch and submission

pub mod contract;
pub mod drip;
pub mod provider;
pub mod relay;

#[cfg(test)]
mod testing;

pub use drip::{DripGateway, DripPolicy, DripReceipt};
pub use provider::{ChainConnection, MetaTransaction, RelayerIdentity, RelayerProvider};
pub use relay::RelayGateway;
