//! Error taxonomy shared by the relay and drip gateways.
//!
//! Every failure a gateway reports is one of the classes of [`RelayError`].
//! The class, not the message, decides how the front end answers: validation
//! and rate-limit failures are the caller's to fix, exhaustion is transient,
//! configuration and chain failures are the server's.

use std::time::Duration;

use crate::action::ActionKind;

/// Any failure produced while handling a relay or drip request.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The server is missing required configuration.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// The request is malformed. Always raised before any network access.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The caller is not eligible right now; retrying will not help.
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),
    /// The relayer cannot afford the request until it is refunded.
    #[error(transparent)]
    ResourceExhaustion(#[from] ResourceExhaustionError),
    /// RPC transport failure or on-chain revert.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// The rate-limit backend failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Server-side configuration fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// No relayer signing key was provided.
    #[error("relayer signing key is not configured")]
    MissingSigningKey,
}

/// Malformed or incomplete request.
///
/// Messages name the offending field or value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Top-level request fields are absent.
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    /// The `action` string does not name a known escrow action.
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    /// Action-specific parameters are absent.
    #[error("Missing params for {action}: {}", .missing.join(", "))]
    MissingParams {
        /// The action whose parameter contract was violated.
        action: ActionKind,
        /// Names of the absent parameters.
        missing: Vec<&'static str>,
    },
    /// A present field has an unusable value.
    #[error("Invalid {field}: {reason}")]
    InvalidField {
        /// Field or parameter name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
    /// The drip recipient is not a well-formed address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    /// The target escrow contract is not on the configured allow-list.
    #[error("Escrow contract {0} is not served by this relayer")]
    EscrowNotAllowed(String),
}

impl ValidationError {
    /// Shorthand for [`ValidationError::InvalidField`].
    #[must_use]
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Steady-state ineligibility for a drip.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// The address already received a drip during this process lifetime.
    #[error("Address {address} has already received a drip")]
    AlreadyServed {
        /// Normalized recipient address.
        address: String,
    },
    /// The address already holds at least the minimum balance.
    #[error("Address {address} already has enough balance")]
    AlreadyFunded {
        /// Normalized recipient address.
        address: String,
        /// Observed balance, formatted in native units.
        balance: String,
    },
}

/// The relayer identity cannot pay for the request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Relayer balance too low ({balance} < {required}), try again later")]
pub struct ResourceExhaustionError {
    /// Current relayer balance, formatted in native units.
    pub balance: String,
    /// Amount the request needs, formatted in native units.
    pub required: String,
}

/// Failure talking to the chain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// The call reverted; `reason` is the decoded revert string when available.
    #[error("{reason}")]
    Reverted {
        /// Human-readable revert reason.
        reason: String,
    },
    /// Transport-level or node-side RPC failure.
    #[error("{message}")]
    Rpc {
        /// Message reported by the transport or the node.
        message: String,
    },
    /// The chain call did not complete within the configured deadline.
    #[error("Chain request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl ChainError {
    /// Creates a revert error from a decoded reason.
    #[must_use]
    pub fn reverted(reason: impl Into<String>) -> Self {
        Self::Reverted {
            reason: reason.into(),
        }
    }

    /// Creates an RPC error from a transport message.
    #[must_use]
    pub fn rpc(message: impl Into<String>) -> Self {
        Self::Rpc {
            message: message.into(),
        }
    }
}

/// Failure of a [`RateLimitStore`](crate::store::RateLimitStore) backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rate limit store failure: {0}")]
pub struct StoreError(pub String);
