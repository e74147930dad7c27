//! Rate-limit bookkeeping for the onboarding drip.
//!
//! The drip serves each address at most once. Whether an address has been
//! served is recorded in a [`RateLimitStore`], whose only concurrency
//! requirement is that [`claim_if_absent`](RateLimitStore::claim_if_absent)
//! is atomic: of two concurrent claims for the same key exactly one succeeds.
//!
//! [`MemoryRateLimitStore`] keeps claims for the lifetime of the process, which
//! is enough for a single instance. A durable or shared backend can be swapped
//! in behind the same trait without touching gateway logic.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashSet;

use crate::error::StoreError;

/// A set of claimed keys with an atomic claim operation.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Whether `key` is currently claimed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend is unavailable.
    async fn is_claimed(&self, key: &str) -> Result<bool, StoreError>;

    /// Claims `key`, returning `true` if it was not already claimed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend is unavailable.
    async fn claim_if_absent(&self, key: &str) -> Result<bool, StoreError>;

    /// Removes a claim so the key can be claimed again.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend is unavailable.
    async fn release(&self, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: RateLimitStore + ?Sized> RateLimitStore for Arc<T> {
    async fn is_claimed(&self, key: &str) -> Result<bool, StoreError> {
        (**self).is_claimed(key).await
    }

    async fn claim_if_absent(&self, key: &str) -> Result<bool, StoreError> {
        (**self).claim_if_absent(key).await
    }

    async fn release(&self, key: &str) -> Result<(), StoreError> {
        (**self).release(key).await
    }
}

/// Process-local [`RateLimitStore`]. Claims are lost on restart.
///
/// Cloning shares the underlying set.
#[derive(Debug, Clone, Default)]
pub struct MemoryRateLimitStore {
    claimed: Arc<DashSet<String>>,
}

impl MemoryRateLimitStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently claimed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    /// Whether no key is claimed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn is_claimed(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.claimed.contains(key))
    }

    async fn claim_if_absent(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.claimed.insert(key.to_owned()))
    }

    async fn release(&self, key: &str) -> Result<(), StoreError> {
        self.claimed.remove(key);
        Ok(())
    }
}
