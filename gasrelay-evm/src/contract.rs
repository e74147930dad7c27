//! Solidity interface of the escrow contract's relay entry points.
//!
//! Each escrow operation has a relay-enabled `…For` variant that takes the
//! acting signer explicitly, followed by the operation's own arguments and the
//! signer's authorization. The contract recovers the signer from `signature`
//! over the action, arguments, `nonce` and `deadline`, and tracks nonces per
//! signer. Only the call encoding is used here; nothing is read back.

use alloy_sol_types::sol;

sol! {
    /// Relay-enabled escrow entry points.
    #[allow(missing_docs)]
    #[derive(Debug, PartialEq, Eq)]
    interface IEscrowRelay {
        function depositFor(
            address seller,
            address buyer,
            uint256 amount,
            uint256 nonce,
            uint256 deadline,
            bytes signature
        ) external returns (uint256 tradeId);
        function releaseFor(
            address seller,
            uint256 tradeId,
            uint256 nonce,
            uint256 deadline,
            bytes signature
        ) external;
        function disputeFor(
            address account,
            uint256 tradeId,
            uint256 nonce,
            uint256 deadline,
            bytes signature
        ) external;
        function refundFor(
            address seller,
            uint256 tradeId,
            uint256 nonce,
            uint256 deadline,
            bytes signature
        ) external;
    }
}
