//! Onboarding drip: a one-time grant of native currency for first gas.
//!
//! [`DripGateway::handle`] runs these steps in order, each an early exit:
//!
//! 1. the recipient must be a well-formed address;
//! 2. it must not have been served already;
//! 3. its balance must be below the minimum;
//! 4. the relayer must hold at least the drip amount;
//! 5. the recipient is claimed in the [`RateLimitStore`];
//! 6. the transfer is submitted;
//! 7. on success the hash and amount are returned;
//! 8. on failure the claim is released so a later attempt can succeed.
//!
//! Claiming before sending stands in for a transactional claim-and-spend.
//! The claim in step 5 is atomic, so of two concurrent requests for the same
//! address that both passed step 2, only one reaches the transfer.

use alloy_primitives::{TxHash, U256};
use gasrelay::address::{normalized_key, parse_address};
use gasrelay::amount::{NATIVE_DECIMALS, format_units};
use gasrelay::error::{RateLimitError, RelayError, ResourceExhaustionError, ValidationError};
use gasrelay::store::{MemoryRateLimitStore, RateLimitStore};
use serde::Serialize;

use crate::provider::{MetaTransaction, RelayerProvider};

/// 0.001 of the native currency.
pub const DEFAULT_DRIP_AMOUNT: U256 = U256::from_limbs([1_000_000_000_000_000, 0, 0, 0]);

/// 0.0005 of the native currency.
pub const DEFAULT_MIN_BALANCE: U256 = U256::from_limbs([500_000_000_000_000, 0, 0, 0]);

/// Amounts governing drip eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DripPolicy {
    /// Fixed amount sent per drip, in wei.
    pub amount: U256,
    /// Addresses holding at least this much (wei) are not eligible.
    pub min_balance: U256,
    /// Blocks to wait for after the transfer. `0` returns at mempool acceptance.
    pub confirmations: u64,
}

impl Default for DripPolicy {
    fn default() -> Self {
        Self {
            amount: DEFAULT_DRIP_AMOUNT,
            min_balance: DEFAULT_MIN_BALANCE,
            confirmations: 0,
        }
    }
}

/// Result of a successful drip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DripReceipt {
    /// Transfer transaction hash.
    pub tx_hash: TxHash,
    /// Amount sent, as a decimal string in native units.
    pub amount: String,
}

/// Funds first-time addresses from the relayer identity.
#[derive(Debug)]
pub struct DripGateway<P, S = MemoryRateLimitStore> {
    provider: P,
    store: S,
    policy: DripPolicy,
}

impl<P: RelayerProvider> DripGateway<P> {
    /// Creates a gateway backed by a process-local store.
    pub fn new(provider: P, policy: DripPolicy) -> Self {
        Self::with_store(provider, MemoryRateLimitStore::new(), policy)
    }
}

impl<P: RelayerProvider, S: RateLimitStore> DripGateway<P, S> {
    /// Creates a gateway backed by `store`.
    pub const fn with_store(provider: P, store: S, policy: DripPolicy) -> Self {
        Self {
            provider,
            store,
            policy,
        }
    }

    /// The active policy.
    pub const fn policy(&self) -> &DripPolicy {
        &self.policy
    }

    /// Sends the drip amount to `address` if it is eligible.
    ///
    /// # Errors
    ///
    /// - [`RelayError::Validation`] for a malformed address
    /// - [`RelayError::RateLimit`] if already served or already funded
    /// - [`RelayError::Configuration`] if no relayer key is configured
    /// - [`RelayError::ResourceExhaustion`] if the relayer cannot afford the drip
    /// - [`RelayError::Chain`] if a balance query or the transfer fails
    /// - [`RelayError::Store`] if the rate-limit backend fails
    pub async fn handle(&self, address: &str) -> Result<DripReceipt, RelayError> {
        let recipient = parse_address(address)
            .ok_or_else(|| ValidationError::InvalidAddress(address.to_owned()))?;
        let key = normalized_key(&recipient);

        if self.store.is_claimed(&key).await? {
            tracing::debug!(address = %key, "Drip already served");
            return Err(RateLimitError::AlreadyServed { address: key }.into());
        }

        let relayer = self.provider.relayer_address().inspect_err(|e| {
            tracing::error!(error = %e, "Drip refused");
        })?;

        let balance = self.provider.balance_of(recipient).await?;
        if balance >= self.policy.min_balance {
            let balance = format_units(balance, NATIVE_DECIMALS);
            tracing::debug!(address = %key, %balance, "Drip recipient already funded");
            return Err(RateLimitError::AlreadyFunded {
                address: key,
                balance,
            }
            .into());
        }

        let relayer_balance = self.provider.balance_of(relayer).await?;
        if relayer_balance < self.policy.amount {
            let exhausted = ResourceExhaustionError {
                balance: format_units(relayer_balance, NATIVE_DECIMALS),
                required: format_units(self.policy.amount, NATIVE_DECIMALS),
            };
            tracing::error!(
                %relayer,
                balance = %exhausted.balance,
                required = %exhausted.required,
                "Relayer underfunded for drip"
            );
            return Err(exhausted.into());
        }

        // Lost race with a concurrent request for the same address.
        if !self.store.claim_if_absent(&key).await? {
            tracing::debug!(address = %key, "Drip claimed concurrently");
            return Err(RateLimitError::AlreadyServed { address: key }.into());
        }

        let tx = MetaTransaction::transfer(recipient, self.policy.amount, self.policy.confirmations);
        match self.provider.send_transaction(tx).await {
            Ok(tx_hash) => {
                let amount = format_units(self.policy.amount, NATIVE_DECIMALS);
                tracing::info!(address = %key, %tx_hash, %amount, "Drip sent");
                Ok(DripReceipt { tx_hash, amount })
            }
            Err(e) => {
                tracing::error!(address = %key, error = %e, "Drip transfer failed, releasing claim");
                if let Err(store_err) = self.store.release(&key).await {
                    tracing::error!(address = %key, error = %store_err, "Failed to release drip claim");
                }
                Err(e)
            }
        }
    }
}
