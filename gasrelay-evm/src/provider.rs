//! Chain connection and relayer identity.
//!
//! [`ChainConnection`] owns the RPC endpoint and, when a key is configured,
//! the [`RelayerIdentity`] that signs and pays for every relayed action and
//! every drip. Both gateways talk to the chain only through the
//! [`RelayerProvider`] trait, so they can be exercised without a node.
//!
//! - Balance reads go through a plain [`RootProvider`] and work without a key.
//! - Writes go through a wallet-filled provider with gas, nonce and chain-id
//!   fillers. Gas is estimated before sending so a call that would revert is
//!   rejected with its revert reason before any gas is spent.
//! - Every chain call is bounded by a request timeout. Dropping the call on
//!   timeout cancels the in-flight RPC.

use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;

use alloy_network::{Ethereum, EthereumWallet, Network, TransactionBuilder};
use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_provider::fillers::{
    BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, NonceManager,
    WalletFiller,
};
use alloy_provider::{Identity, Provider, ProviderBuilder, RootProvider};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{Revert, SolError, decode_revert_reason};
use alloy_transport::{TransportError, TransportResult};
use alloy_transport_http::Http;
use dashmap::DashMap;
use gasrelay::error::{ChainError, ConfigurationError, RelayError};
use tokio::sync::Mutex;
use url::Url;

/// Default bound on a single chain call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on waiting for confirmations.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Gas, blob gas, nonce and chain-id fillers.
pub type InnerFiller = JoinFill<
    GasFiller,
    JoinFill<BlobGasFiller, JoinFill<NonceFiller<PendingNonceManager>, ChainIdFiller>>,
>;

/// Provider that fills and signs transactions with the relayer key.
pub type SigningProvider = FillProvider<
    JoinFill<JoinFill<Identity, InnerFiller>, WalletFiller<EthereumWallet>>,
    RootProvider,
>;

/// Nonce manager seeded from the `pending` transaction count.
///
/// The first nonce for an address is read with `.pending()` so transactions
/// still in the mempool from a previous run are not reused. Later nonces are
/// incremented locally. [`reset_nonce`](Self::reset_nonce) forces a fresh read
/// after a failed submission, when it is unknown whether the node saw it.
#[derive(Clone, Debug, Default)]
pub struct PendingNonceManager {
    nonces: Arc<DashMap<Address, Arc<Mutex<Option<u64>>>>>,
}

#[async_trait::async_trait]
impl NonceManager for PendingNonceManager {
    async fn get_next_nonce<P, N>(&self, provider: &P, address: Address) -> TransportResult<u64>
    where
        P: Provider<N>,
        N: Network,
    {
        let slot = Arc::clone(self.nonces.entry(address).or_default().value());
        let mut cached = slot.lock().await;
        let next = match *cached {
            Some(last) => last + 1,
            None => provider.get_transaction_count(address).pending().await?,
        };
        *cached = Some(next);
        Ok(next)
    }
}

impl PendingNonceManager {
    /// Forgets the cached nonce for `address`.
    pub async fn reset_nonce(&self, address: Address) {
        let slot = self.nonces.get(&address).map(|entry| Arc::clone(entry.value()));
        if let Some(slot) = slot {
            *slot.lock().await = None;
        }
    }
}

/// A transaction paid for by the relayer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaTransaction {
    /// Target address: the escrow contract, or the drip recipient.
    pub to: Address,
    /// Encoded call, empty for a plain transfer.
    pub calldata: Bytes,
    /// Native value sent along.
    pub value: U256,
    /// Blocks to wait for. `0` returns once the node accepts the transaction.
    pub confirmations: u64,
}

impl MetaTransaction {
    /// A contract call carrying no value, returned at mempool acceptance.
    #[must_use]
    pub const fn call(to: Address, calldata: Bytes) -> Self {
        Self {
            to,
            calldata,
            value: U256::ZERO,
            confirmations: 0,
        }
    }

    /// A plain native-currency transfer.
    #[must_use]
    pub const fn transfer(to: Address, value: U256, confirmations: u64) -> Self {
        Self {
            to,
            calldata: Bytes::new(),
            value,
            confirmations,
        }
    }
}

/// Chain access needed by the gateways.
pub trait RelayerProvider: Send + Sync {
    /// Address of the relayer identity.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when no signing key is configured.
    fn relayer_address(&self) -> Result<Address, ConfigurationError>;

    /// Native balance of `address`.
    fn balance_of(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<U256, RelayError>> + Send;

    /// Signs, pays for and submits `tx` from the relayer identity.
    fn send_transaction(
        &self,
        tx: MetaTransaction,
    ) -> impl Future<Output = Result<TxHash, RelayError>> + Send;
}

impl<T: RelayerProvider> RelayerProvider for Arc<T> {
    fn relayer_address(&self) -> Result<Address, ConfigurationError> {
        (**self).relayer_address()
    }

    fn balance_of(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<U256, RelayError>> + Send {
        (**self).balance_of(address)
    }

    fn send_transaction(
        &self,
        tx: MetaTransaction,
    ) -> impl Future<Output = Result<TxHash, RelayError>> + Send {
        (**self).send_transaction(tx)
    }
}

/// The server-held signing identity.
#[derive(Debug)]
pub struct RelayerIdentity {
    address: Address,
    provider: SigningProvider,
    nonce_manager: PendingNonceManager,
}

impl RelayerIdentity {
    fn new(signer: PrivateKeySigner, client: RpcClient) -> Self {
        let address = signer.address();
        let nonce_manager = PendingNonceManager::default();
        let filler = JoinFill::new(
            GasFiller,
            JoinFill::new(
                BlobGasFiller::default(),
                JoinFill::new(
                    NonceFiller::new(nonce_manager.clone()),
                    ChainIdFiller::default(),
                ),
            ),
        );
        let provider: SigningProvider = ProviderBuilder::default()
            .filler(filler)
            .wallet(EthereumWallet::from(signer))
            .connect_client(client);
        Self {
            address,
            provider,
            nonce_manager,
        }
    }

    /// Address that pays for relayed transactions.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }
}

/// RPC endpoint plus optional relayer identity, shared by both gateways.
#[derive(Debug)]
pub struct ChainConnection {
    read: RootProvider,
    identity: Option<RelayerIdentity>,
    eip1559: bool,
    request_timeout: Duration,
    receipt_timeout: Duration,
}

impl ChainConnection {
    /// Connects to `rpc_url`. Without a `signer` the connection can read
    /// balances but every write fails with a configuration error.
    ///
    /// No request is made until the first chain call.
    #[must_use]
    pub fn new(rpc_url: Url, signer: Option<PrivateKeySigner>) -> Self {
        let client = RpcClient::new(Http::new(rpc_url), false);
        let read = RootProvider::<Ethereum>::new(client.clone());
        let identity = signer.map(|signer| RelayerIdentity::new(signer, client));
        match &identity {
            Some(identity) => tracing::info!(relayer = %identity.address, "Relayer identity loaded"),
            None => tracing::warn!("No relayer signing key configured; writes will be rejected"),
        }
        Self {
            read,
            identity,
            eip1559: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
        }
    }

    /// Uses an explicit legacy gas price instead of EIP-1559 fees.
    #[must_use]
    pub const fn with_eip1559(mut self, eip1559: bool) -> Self {
        self.eip1559 = eip1559;
        self
    }

    /// Bounds every individual chain call.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Bounds waiting for confirmations.
    #[must_use]
    pub const fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    /// The relayer identity, if a key is configured.
    #[must_use]
    pub const fn identity(&self) -> Option<&RelayerIdentity> {
        self.identity.as_ref()
    }

    fn require_identity(&self) -> Result<&RelayerIdentity, ConfigurationError> {
        self.identity
            .as_ref()
            .ok_or(ConfigurationError::MissingSigningKey)
    }
}

impl RelayerProvider for ChainConnection {
    fn relayer_address(&self) -> Result<Address, ConfigurationError> {
        self.require_identity().map(RelayerIdentity::address)
    }

    async fn balance_of(&self, address: Address) -> Result<U256, RelayError> {
        Ok(bounded(self.request_timeout, self.read.get_balance(address)).await?)
    }

    async fn send_transaction(&self, tx: MetaTransaction) -> Result<TxHash, RelayError> {
        let identity = self.require_identity()?;
        let from = identity.address;
        let mut request = TransactionRequest::default()
            .with_from(from)
            .with_to(tx.to)
            .with_input(tx.calldata)
            .with_value(tx.value);

        if !self.eip1559 {
            let gas_price =
                bounded(self.request_timeout, identity.provider.get_gas_price()).await?;
            request.set_gas_price(gas_price);
        }

        // Surfaces the revert reason before anything is signed.
        let gas_limit = bounded(
            self.request_timeout,
            identity.provider.estimate_gas(request.clone()),
        )
        .await?;
        request.set_gas_limit(gas_limit);

        let pending = match bounded(
            self.request_timeout,
            identity.provider.send_transaction(request),
        )
        .await
        {
            Ok(pending) => pending,
            Err(e) => {
                identity.nonce_manager.reset_nonce(from).await;
                return Err(e.into());
            }
        };
        let tx_hash = *pending.tx_hash();
        tracing::debug!(%tx_hash, to = %tx.to, "Transaction accepted by node");

        if tx.confirmations > 0 {
            let receipt = match pending
                .with_required_confirmations(tx.confirmations)
                .with_timeout(Some(self.receipt_timeout))
                .get_receipt()
                .await
            {
                Ok(receipt) => receipt,
                Err(e) => {
                    identity.nonce_manager.reset_nonce(from).await;
                    return Err(ChainError::rpc(e.to_string()).into());
                }
            };
            if !receipt.status() {
                return Err(ChainError::reverted(format!("Transaction {tx_hash} reverted")).into());
            }
        }
        Ok(tx_hash)
    }
}

/// Runs a chain call under `limit`, converting its error.
async fn bounded<F, T>(limit: Duration, call: F) -> Result<T, ChainError>
where
    F: IntoFuture<Output = TransportResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(|e| chain_error(&e)),
        Err(_) => Err(ChainError::Timeout(limit)),
    }
}

/// Picks the most specific message out of a transport error.
///
/// A decoded `Error(string)` revert wins, then any other decodable revert
/// payload, then the node's error message, then the transport's own text.
#[must_use]
pub fn chain_error(err: &TransportError) -> ChainError {
    let Some(payload) = err.as_error_resp() else {
        return ChainError::rpc(err.to_string());
    };
    if let Some(data) = payload.as_revert_data() {
        if let Ok(revert) = Revert::abi_decode(&data) {
            return ChainError::reverted(revert.reason);
        }
        if let Some(reason) = decode_revert_reason(&data) {
            return ChainError::reverted(reason);
        }
    }
    let message = payload.message.to_string();
    if message.contains("revert") {
        ChainError::reverted(message)
    } else {
        ChainError::rpc(message)
    }
}
