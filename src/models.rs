// src/models.rs

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use alloy::primitives::{keccak256, Address, B256};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::access::AccessPredicate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    Subscription,
    Ppv,
}

impl ProductType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProductType::Subscription => "subscription",
            ProductType::Ppv => "ppv",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subscription" => Ok(ProductType::Subscription),
            "ppv" => Ok(ProductType::Ppv),
            other => Err(format!("unknown product type: {other}")),
        }
    }
}

/// How a subscription or purchase was paid, as recorded on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Crypto,
    Fiat,
    Unknown,
}

impl From<u8> for PaymentMethod {
    fn from(v: u8) -> Self {
        match v {
            0 => PaymentMethod::Crypto,
            1 => PaymentMethod::Fiat,
            _ => PaymentMethod::Unknown,
        }
    }
}

/// On-chain content ids are `keccak256(utf8(content_id))`.
pub fn content_id_hash(content_id: &str) -> B256 {
    keccak256(content_id.as_bytes())
}

/// Accepts `0x` + 40 hex digits. Mixed-case input must carry a valid
/// EIP-55 checksum; all-lower and all-upper input is accepted as is.
pub fn parse_wallet_address(s: &str) -> Option<Address> {
    let hex_part = s.strip_prefix("0x")?;
    if hex_part.len() != 40 || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let has_lower = hex_part.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = hex_part.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper {
        Address::parse_checksummed(s, None).ok()
    } else {
        s.parse().ok()
    }
}

/// Everything needed to fulfil a purchase, carried on the payment session so
/// the webhook can be handled without local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutMetadata {
    pub wallet_address: Address,
    pub product_type: ProductType,
    pub plan_id: Option<u64>,
    pub content_id: Option<String>,
    pub creator_address: Option<Address>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("metadata field {0} is missing")]
    Missing(&'static str),
    #[error("metadata field {field} is invalid: {value}")]
    Invalid { field: &'static str, value: String },
}

impl CheckoutMetadata {
    pub fn to_map(&self) -> Vec<(&'static str, String)> {
        vec![
            ("walletAddress", self.wallet_address.to_string()),
            ("productType", self.product_type.to_string()),
            (
                "planId",
                self.plan_id.map(|p| p.to_string()).unwrap_or_default(),
            ),
            ("contentId", self.content_id.clone().unwrap_or_default()),
            (
                "creatorAddress",
                self.creator_address.map(|a| a.to_string()).unwrap_or_default(),
            ),
        ]
    }

    /// Blank strings are treated as absent. Only the fields the grant needs
    /// are strict; a malformed field the grant ignores is dropped with a
    /// warning so a paid event is never refused over it.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, MetadataError> {
        let raw = |k: &str| map.get(k).map(String::as_str).filter(|v| !v.trim().is_empty());
        let get = |k: &str| raw(k).map(str::trim);

        let wallet_raw = get("walletAddress").ok_or(MetadataError::Missing("walletAddress"))?;
        let wallet_address = parse_wallet_address(wallet_raw).ok_or(MetadataError::Invalid {
            field: "walletAddress",
            value: wallet_raw.to_string(),
        })?;

        let pt_raw = get("productType").ok_or(MetadataError::Missing("productType"))?;
        let product_type = pt_raw.parse().map_err(|_| MetadataError::Invalid {
            field: "productType",
            value: pt_raw.to_string(),
        })?;

        let plan_id = match (get("planId"), product_type) {
            (None, _) => None,
            (Some(v), ProductType::Subscription) => {
                Some(v.parse::<u64>().map_err(|_| MetadataError::Invalid {
                    field: "planId",
                    value: v.to_string(),
                })?)
            }
            (Some(v), ProductType::Ppv) => v.parse::<u64>().ok(),
        };

        let creator_address = get("creatorAddress").and_then(|v| {
            let parsed = parse_wallet_address(v);
            if parsed.is_none() {
                log::warn!("ignoring unparseable creatorAddress {v:?}");
            }
            parsed
        });

        Ok(Self {
            wallet_address,
            product_type,
            plan_id,
            // hashed on chain exactly as written
            content_id: raw("contentId").map(str::to_string),
            creator_address,
        })
    }
}

/// Immutable JSON document describing one piece of published content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    pub title: String,
    pub description: String,
    pub encrypted_file_cid: String,
    pub encrypted_symmetric_key: String,
    #[schema(value_type = Object)]
    pub access_control_conditions: serde_json::Value,
    /// Typed form of `access_control_conditions`, needed to decrypt.
    #[schema(value_type = Object)]
    pub access: AccessPredicate,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[schema(value_type = String)]
    pub creator: Address,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionInfo {
    pub plan_id: String,
    pub start_time: u64,
    pub end_time: u64,
    pub is_active: bool,
    pub payment_method: PaymentMethod,
}
