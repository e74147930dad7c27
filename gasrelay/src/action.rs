//! Signed escrow actions and their parameter contracts.
//!
//! A meta-transaction request names one of four escrow actions, carries the
//! parameters that action needs, and the caller's authorization (`nonce`,
//! `deadline`, `signature`). The relay never interprets the authorization; it
//! only checks that the request is complete and well formed before paying for
//! a transaction the contract will verify.
//!
//! The loosely-typed wire body is [`RelayRequestBody`]. Converting it into a
//! [`MetaTxRequest`] performs all validation, in this order: top-level fields
//! present, action recognised, action parameters present, each value well
//! formed. The first failure wins.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::address::parse_address;
use crate::amount::{TOKEN_DECIMALS, try_parse_units};
use crate::error::ValidationError;
use crate::timestamp::UnixTimestamp;

/// Parameter holding the signer on whose behalf the action runs.
pub const PARAM_FROM: &str = "from";
/// Parameter holding the escrow contract address.
pub const PARAM_ESCROW: &str = "escrowAddress";
/// Deposit counterparty.
pub const PARAM_BUYER: &str = "buyer";
/// Deposit amount, a decimal string in token units.
pub const PARAM_AMOUNT: &str = "amount";
/// Identifier of an existing trade.
pub const PARAM_TRADE_ID: &str = "tradeId";

/// The closed set of escrow actions the relay forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Lock tokens in escrow for a buyer.
    Deposit,
    /// Release escrowed tokens to the buyer.
    Release,
    /// Open a dispute on a trade.
    Dispute,
    /// Return escrowed tokens to the seller.
    Refund,
}

impl ActionKind {
    /// Every action kind.
    pub const ALL: [Self; 4] = [Self::Deposit, Self::Release, Self::Dispute, Self::Refund];

    /// Wire name of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Release => "release",
            Self::Dispute => "dispute",
            Self::Refund => "refund",
        }
    }

    /// Parameters a request for this action must carry.
    #[must_use]
    pub const fn required_params(self) -> &'static [&'static str] {
        match self {
            Self::Deposit => &[PARAM_FROM, PARAM_ESCROW, PARAM_BUYER, PARAM_AMOUNT],
            Self::Release | Self::Dispute | Self::Refund => {
                &[PARAM_FROM, PARAM_ESCROW, PARAM_TRADE_ID]
            }
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownAction(s.to_owned()))
    }
}

/// Action-specific, typed parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscrowAction {
    /// Deposit `amount` (token base units) into escrow for `buyer`.
    Deposit {
        /// Counterparty receiving the escrowed tokens on release.
        buyer: Address,
        /// Amount in token base units.
        amount: U256,
    },
    /// Release trade `trade_id`.
    Release {
        /// Trade identifier.
        trade_id: U256,
    },
    /// Dispute trade `trade_id`.
    Dispute {
        /// Trade identifier.
        trade_id: U256,
    },
    /// Refund trade `trade_id`.
    Refund {
        /// Trade identifier.
        trade_id: U256,
    },
}

impl EscrowAction {
    /// The kind of this action.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Deposit { .. } => ActionKind::Deposit,
            Self::Release { .. } => ActionKind::Release,
            Self::Dispute { .. } => ActionKind::Dispute,
            Self::Refund { .. } => ActionKind::Refund,
        }
    }
}

/// A validated meta-transaction, ready to be encoded for the escrow contract.
///
/// `nonce`, `deadline` and `signature` are forwarded exactly as supplied. The
/// contract owns nonce bookkeeping and replay rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaTxRequest {
    /// Signer on whose behalf the action runs.
    pub from: Address,
    /// Escrow contract to call.
    pub escrow: Address,
    /// The action and its parameters.
    pub action: EscrowAction,
    /// Caller-supplied replay-protection nonce.
    pub nonce: U256,
    /// Expiry of the signed authorization.
    pub deadline: UnixTimestamp,
    /// Off-chain signature over the action, parameters, nonce and deadline.
    pub signature: Bytes,
}

impl MetaTxRequest {
    /// The kind of the wrapped action.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        self.action.kind()
    }
}

/// Wire body of `POST /relay`, before validation.
///
/// Every field is optional so that absence is reported as a validation error
/// naming the field, not as a deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayRequestBody {
    /// Action name, one of [`ActionKind`].
    #[serde(default)]
    pub action: Option<String>,
    /// Action parameters.
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
    /// Replay-protection nonce, integer or integer string.
    #[serde(default)]
    pub nonce: Option<Value>,
    /// Authorization expiry in Unix seconds, integer or integer string.
    #[serde(default)]
    pub deadline: Option<Value>,
    /// Hex-encoded signature.
    #[serde(default)]
    pub signature: Option<String>,
}

impl TryFrom<RelayRequestBody> for MetaTxRequest {
    type Error = ValidationError;

    fn try_from(body: RelayRequestBody) -> Result<Self, Self::Error> {
        let mut missing = Vec::new();
        let action = body.action.filter(|s| !s.trim().is_empty());
        if action.is_none() {
            missing.push("action");
        }
        if body.params.is_none() {
            missing.push("params");
        }
        let nonce = body.nonce.filter(|v| !v.is_null());
        if nonce.is_none() {
            missing.push("nonce");
        }
        let deadline = body.deadline.filter(is_present);
        if deadline.is_none() {
            missing.push("deadline");
        }
        let signature = body.signature.filter(|s| !s.trim().is_empty());
        if signature.is_none() {
            missing.push("signature");
        }
        let (Some(action), Some(params), Some(nonce), Some(deadline), Some(signature)) =
            (action, body.params, nonce, deadline, signature)
        else {
            return Err(ValidationError::MissingFields(missing));
        };

        let kind: ActionKind = action.parse()?;
        let missing: Vec<&'static str> = kind
            .required_params()
            .iter()
            .copied()
            .filter(|name| !params.get(*name).is_some_and(is_present))
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingParams {
                action: kind,
                missing,
            });
        }

        let action = match kind {
            ActionKind::Deposit => EscrowAction::Deposit {
                buyer: address_param(&params, PARAM_BUYER)?,
                amount: amount_param(&params, PARAM_AMOUNT)?,
            },
            ActionKind::Release => EscrowAction::Release {
                trade_id: uint_value(PARAM_TRADE_ID, param(&params, PARAM_TRADE_ID)?)?,
            },
            ActionKind::Dispute => EscrowAction::Dispute {
                trade_id: uint_value(PARAM_TRADE_ID, param(&params, PARAM_TRADE_ID)?)?,
            },
            ActionKind::Refund => EscrowAction::Refund {
                trade_id: uint_value(PARAM_TRADE_ID, param(&params, PARAM_TRADE_ID)?)?,
            },
        };

        Ok(Self {
            from: address_param(&params, PARAM_FROM)?,
            escrow: address_param(&params, PARAM_ESCROW)?,
            action,
            nonce: uint_value("nonce", &nonce)?,
            deadline: serde_json::from_value(deadline)
                .map_err(|_| ValidationError::invalid("deadline", "must be Unix seconds"))?,
            signature: signature_value(&signature)?,
        })
    }
}

/// Null and blank strings count as absent.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

fn param<'a>(params: &'a Map<String, Value>, name: &'static str) -> Result<&'a Value, ValidationError> {
    params
        .get(name)
        .ok_or_else(|| ValidationError::invalid(name, "is missing"))
}

fn address_param(params: &Map<String, Value>, name: &'static str) -> Result<Address, ValidationError> {
    match param(params, name)? {
        Value::String(s) => parse_address(s)
            .ok_or_else(|| ValidationError::invalid(name, format!("{s} is not a valid address"))),
        _ => Err(ValidationError::invalid(name, "must be an address string")),
    }
}

fn amount_param(params: &Map<String, Value>, name: &'static str) -> Result<U256, ValidationError> {
    let raw = match param(params, name)? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return Err(ValidationError::invalid(name, "must be a decimal amount")),
    };
    try_parse_units(&raw, TOKEN_DECIMALS).map_err(|e| ValidationError::invalid(name, e.to_string()))
}

/// JSON numbers above `u64::MAX` arrive as floats and have already lost
/// precision, so they are rejected with a hint to send a string instead.
fn uint_value(name: &'static str, value: &Value) -> Result<U256, ValidationError> {
    let not_uint = || ValidationError::invalid(name, "must be a non-negative integer");
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                return Ok(U256::from(v));
            }
            let too_large = n.as_f64().is_some_and(|f| f > 0.0 && f.fract() == 0.0);
            if too_large {
                Err(ValidationError::invalid(
                    name,
                    "exceeds the JSON integer range, send it as a decimal or 0x hex string",
                ))
            } else {
                Err(not_uint())
            }
        }
        Value::String(s) => s.trim().parse::<U256>().map_err(|_| not_uint()),
        _ => Err(not_uint()),
    }
}

fn signature_value(raw: &str) -> Result<Bytes, ValidationError> {
    let bytes: Bytes = raw
        .trim()
        .parse()
        .map_err(|_| ValidationError::invalid("signature", "must be hex encoded"))?;
    if bytes.is_empty() {
        return Err(ValidationError::invalid("signature", "is empty"));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SELLER: &str = "0x1111111111111111111111111111111111111111";
    const BUYER: &str = "0x2222222222222222222222222222222222222222";
    const ESCROW: &str = "0x3333333333333333333333333333333333333333";

    fn body(action: &str, params: Value) -> RelayRequestBody {
        serde_json::from_value(json!({
            "action": action,
            "params": params,
            "nonce": 7,
            "deadline": 1_900_000_000u64,
            "signature": "0xdeadbeef",
        }))
        .unwrap()
    }

    #[test]
    fn test_action_kind_round_trips_names() {
        for kind in ActionKind::ALL {
            assert_eq!(kind.as_str().parse::<ActionKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_action_is_named() {
        let err = "withdraw".parse::<ActionKind>().unwrap_err();
        assert_eq!(err, ValidationError::UnknownAction("withdraw".into()));
        assert!("Deposit".parse::<ActionKind>().is_err());
    }

    #[test]
    fn test_deposit_validates() {
        let req = MetaTxRequest::try_from(body(
            "deposit",
            json!({ "from": SELLER, "escrowAddress": ESCROW, "buyer": BUYER, "amount": "100.5" }),
        ))
        .unwrap();
        assert_eq!(req.kind(), ActionKind::Deposit);
        assert_eq!(req.from, SELLER.parse::<Address>().unwrap());
        assert_eq!(req.escrow, ESCROW.parse::<Address>().unwrap());
        assert_eq!(
            req.action,
            EscrowAction::Deposit {
                buyer: BUYER.parse().unwrap(),
                amount: U256::from(100_500_000u64),
            }
        );
        assert_eq!(req.nonce, U256::from(7u8));
        assert_eq!(req.deadline, UnixTimestamp::from_secs(1_900_000_000));
        assert_eq!(req.signature, Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]));
    }

    #[test]
    fn test_trade_actions_validate() {
        for (name, expected) in [
            ("release", ActionKind::Release),
            ("dispute", ActionKind::Dispute),
            ("refund", ActionKind::Refund),
        ] {
            let req = MetaTxRequest::try_from(body(
                name,
                json!({ "from": SELLER, "escrowAddress": ESCROW, "tradeId": "42" }),
            ))
            .unwrap();
            assert_eq!(req.kind(), expected);
            let trade_id = match req.action {
                EscrowAction::Release { trade_id }
                | EscrowAction::Dispute { trade_id }
                | EscrowAction::Refund { trade_id } => trade_id,
                EscrowAction::Deposit { .. } => panic!("unexpected deposit"),
            };
            assert_eq!(trade_id, U256::from(42u8));
        }
    }

    #[test]
    fn test_each_missing_param_is_reported() {
        for kind in ActionKind::ALL {
            let mut full = Map::new();
            full.insert(PARAM_FROM.into(), json!(SELLER));
            full.insert(PARAM_ESCROW.into(), json!(ESCROW));
            full.insert(PARAM_BUYER.into(), json!(BUYER));
            full.insert(PARAM_AMOUNT.into(), json!("1"));
            full.insert(PARAM_TRADE_ID.into(), json!(1));
            for &name in kind.required_params() {
                let mut params = full.clone();
                params.remove(name);
                let err =
                    MetaTxRequest::try_from(body(kind.as_str(), Value::Object(params))).unwrap_err();
                assert_eq!(
                    err,
                    ValidationError::MissingParams {
                        action: kind,
                        missing: vec![name],
                    }
                );
            }
        }
    }

    #[test]
    fn test_blank_param_counts_as_missing() {
        let err = MetaTxRequest::try_from(body(
            "release",
            json!({ "from": SELLER, "escrowAddress": ESCROW, "tradeId": "" }),
        ))
        .unwrap_err();
        assert!(matches!(err, ValidationError::MissingParams { .. }));
    }

    #[test]
    fn test_missing_top_level_fields() {
        let err = MetaTxRequest::try_from(RelayRequestBody {
            action: Some("deposit".into()),
            ..RelayRequestBody::default()
        })
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingFields(vec!["params", "nonce", "deadline", "signature"])
        );
    }

    #[test]
    fn test_missing_fields_checked_before_action() {
        let err = MetaTxRequest::try_from(RelayRequestBody {
            action: Some("withdraw".into()),
            ..RelayRequestBody::default()
        })
        .unwrap_err();
        assert!(matches!(err, ValidationError::MissingFields(_)));
    }

    #[test]
    fn test_zero_nonce_is_present() {
        let mut b = body(
            "refund",
            json!({ "from": SELLER, "escrowAddress": ESCROW, "tradeId": 3 }),
        );
        b.nonce = Some(json!("0"));
        let req = MetaTxRequest::try_from(b).unwrap();
        assert_eq!(req.nonce, U256::ZERO);
    }

    #[test]
    fn test_hex_deadline_and_nonce() {
        let mut b = body(
            "dispute",
            json!({ "from": SELLER, "escrowAddress": ESCROW, "tradeId": "0x0a" }),
        );
        b.deadline = Some(json!("0x71410b00"));
        b.nonce = Some(json!("0xff"));
        let req = MetaTxRequest::try_from(b).unwrap();
        assert_eq!(req.deadline, UnixTimestamp::from_secs(1_900_088_064));
        assert_eq!(req.nonce, U256::from(255u16));
        assert_eq!(req.action, EscrowAction::Dispute { trade_id: U256::from(10u8) });
    }

    #[test]
    fn test_large_integers_need_strings() {
        let too_big = "18446744073709551616";
        let b: RelayRequestBody = serde_json::from_str(&format!(
            r#"{{"action":"release","params":{{"from":"{SELLER}","escrowAddress":"{ESCROW}","tradeId":{too_big}}},"nonce":1,"deadline":1900000000,"signature":"0x01"}}"#
        ))
        .unwrap();
        match MetaTxRequest::try_from(b).unwrap_err() {
            ValidationError::InvalidField { field, reason } => {
                assert_eq!(field, "tradeId");
                assert!(reason.contains("string"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let b = body(
            "release",
            json!({ "from": SELLER, "escrowAddress": ESCROW, "tradeId": too_big }),
        );
        let req = MetaTxRequest::try_from(b).unwrap();
        assert_eq!(
            req.action,
            EscrowAction::Release { trade_id: U256::from(u64::MAX) + U256::from(1u8) }
        );

        let mut b = body(
            "release",
            json!({ "from": SELLER, "escrowAddress": ESCROW, "tradeId": 1 }),
        );
        b.nonce = Some(json!(-3));
        let err = MetaTxRequest::try_from(b).unwrap_err();
        assert_eq!(err.to_string(), "Invalid nonce: must be a non-negative integer");
    }

    #[test]
    fn test_malformed_values_name_field() {
        let err = MetaTxRequest::try_from(body(
            "deposit",
            json!({ "from": SELLER, "escrowAddress": ESCROW, "buyer": "0x12", "amount": "1" }),
        ))
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { field: "buyer", .. }));

        let err = MetaTxRequest::try_from(body(
            "deposit",
            json!({ "from": SELLER, "escrowAddress": ESCROW, "buyer": BUYER, "amount": "ten" }),
        ))
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { field: "amount", .. }));

        let mut b = body(
            "release",
            json!({ "from": SELLER, "escrowAddress": ESCROW, "tradeId": 1 }),
        );
        b.signature = Some("0xnothex".into());
        let err = MetaTxRequest::try_from(b).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { field: "signature", .. }));
    }
}
