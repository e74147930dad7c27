//! Meta-transaction relay for signed escrow actions.
//!
//! [`RelayGateway`] turns a validated [`MetaTxRequest`] into exactly one call
//! to the escrow contract's relay-enabled entry point and submits it from the
//! relayer identity. The signature is not checked here: the contract recovers
//! the signer, enforces the deadline and consumes the nonce, and a rejected
//! authorization surfaces as a revert reason from gas estimation.
//!
//! There is no retry. Two requests racing on the same signer nonce both get
//! submitted and at most one lands; the other fails with the contract's revert.

use std::collections::HashSet;

use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_sol_types::SolCall;
use gasrelay::action::{EscrowAction, MetaTxRequest, RelayRequestBody};
use gasrelay::error::{RelayError, ValidationError};
use gasrelay::timestamp::UnixTimestamp;

use crate::contract::IEscrowRelay;
use crate::provider::{MetaTransaction, RelayerProvider};

/// Encodes the relay-enabled escrow call for `request`.
///
/// Each action maps to one entry point; arguments are passed through in the
/// order `(from, action params…, nonce, deadline, signature)`.
#[must_use]
pub fn encode_call(request: &MetaTxRequest) -> Bytes {
    let from = request.from;
    let nonce = request.nonce;
    let deadline = U256::from(request.deadline.as_secs());
    let signature = request.signature.clone();
    let encoded = match request.action {
        EscrowAction::Deposit { buyer, amount } => IEscrowRelay::depositForCall {
            seller: from,
            buyer,
            amount,
            nonce,
            deadline,
            signature,
        }
        .abi_encode(),
        EscrowAction::Release { trade_id } => IEscrowRelay::releaseForCall {
            seller: from,
            tradeId: trade_id,
            nonce,
            deadline,
            signature,
        }
        .abi_encode(),
        EscrowAction::Dispute { trade_id } => IEscrowRelay::disputeForCall {
            account: from,
            tradeId: trade_id,
            nonce,
            deadline,
            signature,
        }
        .abi_encode(),
        EscrowAction::Refund { trade_id } => IEscrowRelay::refundForCall {
            seller: from,
            tradeId: trade_id,
            nonce,
            deadline,
            signature,
        }
        .abi_encode(),
    };
    Bytes::from(encoded)
}

/// Forwards signed escrow actions, paying gas from the relayer identity.
#[derive(Debug)]
pub struct RelayGateway<P> {
    provider: P,
    allowed_escrows: HashSet<Address>,
}

impl<P: RelayerProvider> RelayGateway<P> {
    /// Creates a gateway that forwards to any escrow contract.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            allowed_escrows: HashSet::new(),
        }
    }

    /// Restricts forwarding to the given escrow contracts. An empty list
    /// leaves the gateway unrestricted.
    #[must_use]
    pub fn with_allowed_escrows(mut self, escrows: impl IntoIterator<Item = Address>) -> Self {
        self.allowed_escrows = escrows.into_iter().collect();
        self
    }

    /// The chain access used for submission.
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// Validates a raw request body, then forwards it.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Validation`] before any network access if the
    /// body is incomplete or malformed, otherwise whatever [`handle`](Self::handle) returns.
    pub async fn handle_body(&self, body: RelayRequestBody) -> Result<TxHash, RelayError> {
        let request = MetaTxRequest::try_from(body).inspect_err(|e| {
            tracing::debug!(error = %e, "Rejected relay request");
        })?;
        self.handle(&request).await
    }

    /// Submits one transaction for `request` and returns its hash once the
    /// node has accepted it.
    ///
    /// # Errors
    ///
    /// - [`RelayError::Validation`] if the escrow contract is not allowed
    /// - [`RelayError::Configuration`] if no relayer key is configured
    /// - [`RelayError::Chain`] on revert or RPC failure
    pub async fn handle(&self, request: &MetaTxRequest) -> Result<TxHash, RelayError> {
        let action = request.kind();
        if !self.allowed_escrows.is_empty() && !self.allowed_escrows.contains(&request.escrow) {
            return Err(ValidationError::EscrowNotAllowed(request.escrow.to_string()).into());
        }
        let relayer = self.provider.relayer_address().inspect_err(|e| {
            tracing::error!(error = %e, %action, "Relay request refused");
        })?;
        if request.deadline.has_passed(UnixTimestamp::now()) {
            tracing::debug!(
                %action,
                deadline = %request.deadline,
                "Forwarding request whose deadline has already passed"
            );
        }

        let tx = MetaTransaction::call(request.escrow, encode_call(request));
        match self.provider.send_transaction(tx).await {
            Ok(tx_hash) => {
                tracing::info!(
                    %action,
                    from = %request.from,
                    escrow = %request.escrow,
                    nonce = %request.nonce,
                    %relayer,
                    %tx_hash,
                    "Relayed escrow action"
                );
                Ok(tx_hash)
            }
            Err(e) => {
                tracing::warn!(
                    %action,
                    from = %request.from,
                    escrow = %request.escrow,
                    nonce = %request.nonce,
                    error = %e,
                    "Relay submission failed"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gasrelay::action::ActionKind;
    use gasrelay::error::{ChainError, ConfigurationError};
    use serde_json::json;

    use super::*;
    use crate::testing::MockProvider;

    const SELLER: &str = "0x1111111111111111111111111111111111111111";
    const BUYER: &str = "0x2222222222222222222222222222222222222222";
    const ESCROW: &str = "0x3333333333333333333333333333333333333333";
    const SIGNATURE: &str = "0xabcdef0123";

    fn body(action: &str, params: serde_json::Value) -> RelayRequestBody {
        serde_json::from_value(json!({
            "action": action,
            "params": params,
            "nonce": "12",
            "deadline": 1_900_000_000u64,
            "signature": SIGNATURE,
        }))
        .unwrap()
    }

    fn trade_params() -> serde_json::Value {
        json!({ "from": SELLER, "escrowAddress": ESCROW, "tradeId": 9 })
    }

    fn gateway() -> (Arc<MockProvider>, RelayGateway<Arc<MockProvider>>) {
        let provider = Arc::new(MockProvider::with_relayer());
        (Arc::clone(&provider), RelayGateway::new(provider))
    }

    #[tokio::test]
    async fn test_deposit_calls_deposit_for() {
        let (provider, gateway) = gateway();
        let params = json!({ "from": SELLER, "escrowAddress": ESCROW, "buyer": BUYER, "amount": "100.5" });
        let tx_hash = gateway.handle_body(body("deposit", params)).await.unwrap();

        let sent = provider.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, ESCROW.parse::<Address>().unwrap());
        assert_eq!(sent[0].value, U256::ZERO);
        assert_eq!(tx_hash, MockProvider::tx_hash(1));

        let call = IEscrowRelay::depositForCall::abi_decode(&sent[0].calldata).unwrap();
        assert_eq!(call.seller, SELLER.parse::<Address>().unwrap());
        assert_eq!(call.buyer, BUYER.parse::<Address>().unwrap());
        assert_eq!(call.amount, U256::from(100_500_000u64));
        assert_eq!(call.nonce, U256::from(12u8));
        assert_eq!(call.deadline, U256::from(1_900_000_000u64));
        assert_eq!(call.signature, SIGNATURE.parse::<Bytes>().unwrap());
    }

    #[tokio::test]
    async fn test_release_calls_release_for() {
        let (provider, gateway) = gateway();
        gateway.handle_body(body("release", trade_params())).await.unwrap();
        let call = IEscrowRelay::releaseForCall::abi_decode(&provider.sent()[0].calldata).unwrap();
        assert_eq!(call.seller, SELLER.parse::<Address>().unwrap());
        assert_eq!(call.tradeId, U256::from(9u8));
        assert_eq!(call.nonce, U256::from(12u8));
    }

    #[tokio::test]
    async fn test_dispute_calls_dispute_for() {
        let (provider, gateway) = gateway();
        gateway.handle_body(body("dispute", trade_params())).await.unwrap();
        let call = IEscrowRelay::disputeForCall::abi_decode(&provider.sent()[0].calldata).unwrap();
        assert_eq!(call.account, SELLER.parse::<Address>().unwrap());
        assert_eq!(call.tradeId, U256::from(9u8));
    }

    #[tokio::test]
    async fn test_refund_calls_refund_for() {
        let (provider, gateway) = gateway();
        gateway.handle_body(body("refund", trade_params())).await.unwrap();
        let calldata = &provider.sent()[0].calldata;
        assert_eq!(&calldata[..4], IEscrowRelay::refundForCall::SELECTOR.as_slice());
        let call = IEscrowRelay::refundForCall::abi_decode(calldata).unwrap();
        assert_eq!(call.deadline, U256::from(1_900_000_000u64));
    }

    /// `(from, tradeId or amount, nonce, deadline, signature)` as decoded from calldata.
    type PassThrough = (Address, U256, U256, U256, Bytes);

    fn decode_pass_through(kind: ActionKind, calldata: &[u8]) -> PassThrough {
        match kind {
            ActionKind::Deposit => {
                let c = IEscrowRelay::depositForCall::abi_decode(calldata).unwrap();
                (c.seller, c.amount, c.nonce, c.deadline, c.signature)
            }
            ActionKind::Release => {
                let c = IEscrowRelay::releaseForCall::abi_decode(calldata).unwrap();
                (c.seller, c.tradeId, c.nonce, c.deadline, c.signature)
            }
            ActionKind::Dispute => {
                let c = IEscrowRelay::disputeForCall::abi_decode(calldata).unwrap();
                (c.account, c.tradeId, c.nonce, c.deadline, c.signature)
            }
            ActionKind::Refund => {
                let c = IEscrowRelay::refundForCall::abi_decode(calldata).unwrap();
                (c.seller, c.tradeId, c.nonce, c.deadline, c.signature)
            }
        }
    }

    #[tokio::test]
    async fn test_every_action_passes_authorization_through() {
        let selectors = [
            (ActionKind::Deposit, IEscrowRelay::depositForCall::SELECTOR),
            (ActionKind::Release, IEscrowRelay::releaseForCall::SELECTOR),
            (ActionKind::Dispute, IEscrowRelay::disputeForCall::SELECTOR),
            (ActionKind::Refund, IEscrowRelay::refundForCall::SELECTOR),
        ];
        for (kind, selector) in selectors {
            let (provider, gateway) = gateway();
            let (params, expected_param) = match kind {
                ActionKind::Deposit => (
                    json!({ "from": SELLER, "escrowAddress": ESCROW, "buyer": BUYER, "amount": "2.5" }),
                    U256::from(2_500_000u64),
                ),
                _ => (trade_params(), U256::from(9u8)),
            };
            gateway.handle_body(body(kind.as_str(), params)).await.unwrap();

            let sent = provider.sent();
            assert_eq!(sent.len(), 1, "{kind}");
            assert_eq!(sent[0].to, ESCROW.parse::<Address>().unwrap(), "{kind}");
            assert_eq!(&sent[0].calldata[..4], selector.as_slice(), "{kind}");

            let (from, param, nonce, deadline, signature) =
                decode_pass_through(kind, &sent[0].calldata);
            assert_eq!(from, SELLER.parse::<Address>().unwrap(), "{kind}");
            assert_eq!(param, expected_param, "{kind}");
            assert_eq!(nonce, U256::from(12u8), "{kind}");
            assert_eq!(deadline, U256::from(1_900_000_000u64), "{kind}");
            assert_eq!(signature, SIGNATURE.parse::<Bytes>().unwrap(), "{kind}");
        }
    }

    #[tokio::test]
    async fn test_missing_param_makes_no_network_call() {
        for kind in ActionKind::ALL {
            for &name in kind.required_params() {
                let (provider, gateway) = gateway();
                let mut params = json!({
                    "from": SELLER, "escrowAddress": ESCROW, "buyer": BUYER, "amount": "1", "tradeId": 1
                });
                params.as_object_mut().unwrap().remove(name);
                let err = gateway.handle_body(body(kind.as_str(), params)).await.unwrap_err();
                assert!(matches!(
                    err,
                    RelayError::Validation(ValidationError::MissingParams { .. })
                ));
                assert_eq!(provider.network_calls(), 0);
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_action_makes_no_contract_call() {
        let (provider, gateway) = gateway();
        let err = gateway.handle_body(body("withdraw", trade_params())).await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown action: withdraw");
        assert_eq!(provider.network_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_key_is_configuration_error() {
        let provider = Arc::new(MockProvider::default());
        let gateway = RelayGateway::new(Arc::clone(&provider));
        let err = gateway.handle_body(body("release", trade_params())).await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::Configuration(ConfigurationError::MissingSigningKey)
        ));
        assert_eq!(provider.network_calls(), 0);
    }

    #[tokio::test]
    async fn test_revert_reason_is_surfaced_without_retry() {
        let (provider, gateway) = gateway();
        provider.fail_next_send(ChainError::reverted("Escrow: invalid nonce"));
        let err = gateway.handle_body(body("release", trade_params())).await.unwrap_err();
        assert_eq!(err.to_string(), "Escrow: invalid nonce");
        assert_eq!(provider.send_attempts(), 1);
    }

    #[tokio::test]
    async fn test_escrow_allow_list() {
        let provider = Arc::new(MockProvider::with_relayer());
        let gateway = RelayGateway::new(Arc::clone(&provider))
            .with_allowed_escrows([Address::repeat_byte(0x44)]);
        let err = gateway.handle_body(body("release", trade_params())).await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::Validation(ValidationError::EscrowNotAllowed(_))
        ));
        assert_eq!(provider.network_calls(), 0);

        let allowed = RelayGateway::new(Arc::clone(&provider))
            .with_allowed_escrows([ESCROW.parse().unwrap()]);
        allowed.handle_body(body("release", trade_params())).await.unwrap();
        assert_eq!(provider.send_attempts(), 1);
    }
}
