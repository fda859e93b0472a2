// src/access.rs
//
// Access predicates handed to the encryption network, and the wallet
// signatures that prove who is asking. This crate builds predicates but never
// evaluates them; the network re-reads chain state at decrypt time.

use alloy::primitives::{Address, Signature, U256};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::chains::{lit_chain_name, ContractSet};
use crate::models::content_id_hash;

/// Whose wallet the condition is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "address")]
pub enum Subject {
    /// Whoever presents a valid signature at decrypt time.
    Requester,
    Wallet(Address),
}

impl Subject {
    fn param(&self) -> String {
        match self {
            Subject::Requester => ":userAddress".to_string(),
            Subject::Wallet(a) => a.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum AccessPredicate {
    /// `isSubscriptionActive(subject, planId) == true`
    #[serde(rename_all = "camelCase")]
    Subscription {
        chain_id: u64,
        contract: Address,
        subject: Subject,
        plan_id: u64,
    },
    /// `hasAccess(subject, keccak256(contentId)) == true`
    #[serde(rename_all = "camelCase")]
    PayPerView {
        chain_id: u64,
        contract: Address,
        subject: Subject,
        content_id: String,
    },
    /// `holdsCreatorToken(subject, creator) >= minBalance`
    #[serde(rename_all = "camelCase")]
    TokenHolding {
        chain_id: u64,
        contract: Address,
        subject: Subject,
        creator: Address,
        min_balance: U256,
    },
}

/// Client-facing description of a predicate; contract addresses are filled
/// in from the chain registry.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum AccessSpec {
    #[serde(rename_all = "camelCase")]
    Subscription { plan_id: u64 },
    #[serde(rename_all = "camelCase")]
    PayPerView { content_id: String },
    #[serde(rename_all = "camelCase")]
    TokenHolding { creator: Address, min_balance: U256 },
}

impl AccessSpec {
    pub fn build(&self, chain_id: u64, contracts: &ContractSet) -> AccessPredicate {
        let subject = Subject::Requester;
        match self {
            AccessSpec::Subscription { plan_id } => AccessPredicate::Subscription {
                chain_id,
                contract: contracts.subscription_manager,
                subject,
                plan_id: *plan_id,
            },
            AccessSpec::PayPerView { content_id } => AccessPredicate::PayPerView {
                chain_id,
                contract: contracts.pay_per_view_manager,
                subject,
                content_id: content_id.clone(),
            },
            AccessSpec::TokenHolding {
                creator,
                min_balance,
            } => AccessPredicate::TokenHolding {
                chain_id,
                contract: contracts.creator_token,
                subject,
                creator: *creator,
                min_balance: *min_balance,
            },
        }
    }
}

impl AccessPredicate {
    pub fn chain_id(&self) -> u64 {
        match self {
            AccessPredicate::Subscription { chain_id, .. }
            | AccessPredicate::PayPerView { chain_id, .. }
            | AccessPredicate::TokenHolding { chain_id, .. } => *chain_id,
        }
    }

    pub fn chain_name(&self) -> &'static str {
        lit_chain_name(self.chain_id())
    }

    /// Unified access control conditions in the encryption network's format.
    pub fn to_conditions(&self) -> Value {
        let chain = self.chain_name();
        let condition = match self {
            AccessPredicate::Subscription {
                contract,
                subject,
                plan_id,
                ..
            } => evm_condition(
                *contract,
                "isSubscriptionActive",
                vec![subject.param(), plan_id.to_string()],
                &[("address", "subscriber"), ("uint256", "planId")],
                ("bool", ""),
                chain,
                "=",
                "true".to_string(),
            ),
            AccessPredicate::PayPerView {
                contract,
                subject,
                content_id,
                ..
            } => evm_condition(
                *contract,
                "hasAccess",
                vec![subject.param(), content_id_hash(content_id).to_string()],
                &[("address", "viewer"), ("bytes32", "contentId")],
                ("bool", ""),
                chain,
                "=",
                "true".to_string(),
            ),
            AccessPredicate::TokenHolding {
                contract,
                subject,
                creator,
                min_balance,
                ..
            } => evm_condition(
                *contract,
                "holdsCreatorToken",
                vec![subject.param(), creator.to_string()],
                &[("address", "holder"), ("address", "creator")],
                ("uint256", "balance"),
                chain,
                ">=",
                min_balance.to_string(),
            ),
        };
        Value::Array(vec![condition])
    }
}

#[allow(clippy::too_many_arguments)]
fn evm_condition(
    contract: Address,
    function_name: &str,
    params: Vec<String>,
    inputs: &[(&str, &str)],
    output: (&str, &str),
    chain: &str,
    comparator: &str,
    value: String,
) -> Value {
    let inputs: Vec<Value> = inputs
        .iter()
        .map(|(ty, name)| json!({ "type": ty, "name": name }))
        .collect();
    json!({
        "conditionType": "evmContract",
        "contractAddress": contract.to_string(),
        "functionName": function_name,
        "functionParams": params,
        "functionAbi": {
            "name": function_name,
            "type": "function",
            "stateMutability": "view",
            "inputs": inputs,
            "outputs": [{ "type": output.0, "name": output.1 }],
        },
        "chain": chain,
        "returnValueTest": {
            "key": "",
            "comparator": comparator,
            "value": value,
        },
    })
}

const CHALLENGE_PREFIX: &str = "Sign this message to decrypt content from DpappFans.\n\nTimestamp: ";
const MAX_CLOCK_SKEW_MS: i64 = 30_000;

/// The message a wallet signs to prove ownership at `timestamp_ms`.
pub fn challenge_message(timestamp_ms: i64) -> String {
    format!("{CHALLENGE_PREFIX}{timestamp_ms}")
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthSigError {
    #[error("signed message is not a recognised challenge")]
    UnknownChallenge,
    #[error("challenge expired")]
    Expired,
    #[error("challenge timestamp is in the future")]
    FromTheFuture,
    #[error("malformed signature: {0}")]
    Malformed(String),
    #[error("signature was made by {recovered}, not {claimed}")]
    WrongSigner { claimed: Address, recovered: Address },
}

/// Proof of wallet ownership: a personal_sign signature over a fresh
/// challenge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthSig {
    pub sig: String,
    pub derived_via: String,
    pub signed_message: String,
    pub address: Address,
}

impl AuthSig {
    pub fn new(signature: &Signature, timestamp_ms: i64, address: Address) -> Self {
        Self {
            sig: format!("0x{}", hex::encode(signature.as_bytes())),
            derived_via: "web3.eth.personal.sign".to_string(),
            signed_message: challenge_message(timestamp_ms),
            address,
        }
    }

    pub fn timestamp_ms(&self) -> Result<i64, AuthSigError> {
        self.signed_message
            .strip_prefix(CHALLENGE_PREFIX)
            .and_then(|ts| ts.parse::<i64>().ok())
            .ok_or(AuthSigError::UnknownChallenge)
    }

    /// Checks freshness and that `address` produced `sig`; returns the
    /// verified address.
    pub fn verify(&self, now_ms: i64, max_age_ms: i64) -> Result<Address, AuthSigError> {
        let ts = self.timestamp_ms()?;
        if ts > now_ms.saturating_add(MAX_CLOCK_SKEW_MS) {
            return Err(AuthSigError::FromTheFuture);
        }
        match now_ms.checked_sub(ts) {
            Some(age) if age <= max_age_ms => {}
            _ => return Err(AuthSigError::Expired),
        }

        let raw = hex::decode(self.sig.trim_start_matches("0x"))
            .map_err(|e| AuthSigError::Malformed(e.to_string()))?;
        let signature =
            Signature::from_raw(&raw).map_err(|e| AuthSigError::Malformed(e.to_string()))?;
        let recovered = signature
            .recover_address_from_msg(self.signed_message.as_bytes())
            .map_err(|e| AuthSigError::Malformed(e.to_string()))?;

        if recovered != self.address {
            return Err(AuthSigError::WrongSigner {
                claimed: self.address,
                recovered,
            });
        }
        Ok(recovered)
    }
}
