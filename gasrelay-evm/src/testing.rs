//! In-memory [`RelayerProvider`] for gateway tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, B256, TxHash, U256};
use gasrelay::error::{ChainError, ConfigurationError, RelayError};

use crate::provider::{MetaTransaction, RelayerProvider};

pub const RELAYER: Address = Address::repeat_byte(0xee);

#[derive(Debug, Default)]
pub struct MockProvider {
    relayer: Option<Address>,
    balances: Mutex<HashMap<Address, U256>>,
    balance_queries: AtomicUsize,
    send_failures: Mutex<VecDeque<ChainError>>,
    sent: Mutex<Vec<MetaTransaction>>,
    send_attempts: AtomicUsize,
    latency: Option<Duration>,
}

impl MockProvider {
    pub fn with_relayer() -> Self {
        Self {
            relayer: Some(RELAYER),
            ..Self::default()
        }
    }

    /// Makes every chain call yield to the scheduler for `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.balances.lock().unwrap().insert(address, balance);
    }

    pub fn fail_next_send(&self, error: ChainError) {
        self.send_failures.lock().unwrap().push_back(error);
    }

    pub fn sent(&self) -> Vec<MetaTransaction> {
        self.sent.lock().unwrap().clone()
    }

    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    pub fn network_calls(&self) -> usize {
        self.balance_queries.load(Ordering::SeqCst) + self.send_attempts()
    }

    pub fn tx_hash(n: usize) -> TxHash {
        B256::left_padding_from(&n.to_be_bytes())
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl RelayerProvider for MockProvider {
    fn relayer_address(&self) -> Result<Address, ConfigurationError> {
        self.relayer.ok_or(ConfigurationError::MissingSigningKey)
    }

    async fn balance_of(&self, address: Address) -> Result<U256, RelayError> {
        self.balance_queries.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let balance = self.balances.lock().unwrap().get(&address).copied();
        Ok(balance.unwrap_or(U256::ZERO))
    }

    async fn send_transaction(&self, tx: MetaTransaction) -> Result<TxHash, RelayError> {
        let attempt = self.send_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.pause().await;
        let failure = self.send_failures.lock().unwrap().pop_front();
        if let Some(error) = failure {
            return Err(error.into());
        }
        self.sent.lock().unwrap().push(tx);
        Ok(Self::tx_hash(attempt))
    }
}
