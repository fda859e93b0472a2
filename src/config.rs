// src/config.rs
//
// Process configuration, read once at startup. Required variables are
// checked up front so the server never starts half-configured.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::chains::POLYGON;
use crate::ledger::{DEFAULT_GRANT_DEADLINE_SECS, STALE_CLAIM_SECS};
use crate::moderation::OnFailure;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_APP_URL: &str = "http://localhost:3000";
pub const DEFAULT_GATEWAY_TEMPLATE: &str = "https://{cid}.ipfs.w3s.link";
pub const DEFAULT_WEB3_STORAGE_API: &str = "https://api.web3.storage";
pub const DEFAULT_LIT_NETWORK: &str = "datil-dev";
pub const DEFAULT_LIT_RELAY: &str = "http://localhost:7470";
pub const DEFAULT_NSFW_THRESHOLD: f64 = 0.7;
pub const DEFAULT_AUTH_SIG_MAX_AGE_SECS: u64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} has an invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub app_url: String,

    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_api_base: Option<String>,
    pub checkout_min_amount_cents: u64,

    pub rpc_url: String,
    pub backend_signer_key: String,
    pub default_chain_id: u64,
    pub active_chain_id: u64,
    pub deployments_dir: Option<PathBuf>,

    pub rapidapi_key: Option<String>,
    pub rapidapi_base_url: Option<String>,
    pub nsfw_threshold: f64,
    pub moderation_on_failure: OnFailure,

    pub web3_storage_token: Option<String>,
    pub web3_storage_api_url: String,
    pub ipfs_gateway_template: String,

    pub lit_network: String,
    pub lit_relay_url: String,
    pub auth_sig_max_age_secs: u64,

    pub grant_deadline_secs: u64,
    pub database_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |k: &str| env(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |k: &'static str| get(k).ok_or(ConfigError::Missing(k));

        let default_chain_id = parse_or(&get, "DEFAULT_CHAIN_ID", POLYGON)?;
        let active_chain_id = parse_or(&get, "ACTIVE_CHAIN_ID", default_chain_id)?;

        let nsfw_threshold: f64 = parse_or(&get, "MODERATION_NSFW_THRESHOLD", DEFAULT_NSFW_THRESHOLD)?;
        if !(0.0..=1.0).contains(&nsfw_threshold) {
            return Err(ConfigError::Invalid {
                var: "MODERATION_NSFW_THRESHOLD",
                value: nsfw_threshold.to_string(),
                reason: "must be between 0 and 1".to_string(),
            });
        }

        let checkout_min_amount_cents = parse_or(&get, "CHECKOUT_MIN_AMOUNT_CENTS", 1u64)?;
        if checkout_min_amount_cents == 0 {
            return Err(ConfigError::Invalid {
                var: "CHECKOUT_MIN_AMOUNT_CENTS",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let grant_deadline_secs = parse_or(&get, "GRANT_DEADLINE_SECS", DEFAULT_GRANT_DEADLINE_SECS)?;
        if grant_deadline_secs == 0 || grant_deadline_secs as i64 >= STALE_CLAIM_SECS {
            return Err(ConfigError::Invalid {
                var: "GRANT_DEADLINE_SECS",
                value: grant_deadline_secs.to_string(),
                reason: format!("must be between 1 and {}", STALE_CLAIM_SECS - 1),
            });
        }

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            app_url: get("APP_URL")
                .unwrap_or_else(|| DEFAULT_APP_URL.to_string())
                .trim_end_matches('/')
                .to_string(),

            stripe_secret_key: required("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            stripe_api_base: get("STRIPE_API_BASE"),
            checkout_min_amount_cents,

            rpc_url: required("RPC_URL")?,
            backend_signer_key: required("BACKEND_SIGNER_PRIVATE_KEY")?,
            default_chain_id,
            active_chain_id,
            deployments_dir: get("DEPLOYMENTS_DIR").map(PathBuf::from),

            rapidapi_key: get("RAPIDAPI_KEY"),
            rapidapi_base_url: get("RAPIDAPI_BASE_URL"),
            nsfw_threshold,
            moderation_on_failure: parse_or(&get, "MODERATION_ON_FAILURE", OnFailure::Approve)?,

            web3_storage_token: get("WEB3_STORAGE_TOKEN"),
            web3_storage_api_url: get("WEB3_STORAGE_API_URL")
                .unwrap_or_else(|| DEFAULT_WEB3_STORAGE_API.to_string()),
            ipfs_gateway_template: get("IPFS_GATEWAY_TEMPLATE")
                .unwrap_or_else(|| DEFAULT_GATEWAY_TEMPLATE.to_string()),

            lit_network: get("LIT_NETWORK").unwrap_or_else(|| DEFAULT_LIT_NETWORK.to_string()),
            lit_relay_url: get("LIT_RELAY_URL").unwrap_or_else(|| DEFAULT_LIT_RELAY.to_string()),
            auth_sig_max_age_secs: parse_or(
                &get,
                "AUTH_SIG_MAX_AGE_SECS",
                DEFAULT_AUTH_SIG_MAX_AGE_SECS,
            )?,

            grant_deadline_secs,
            database_url: get("DATABASE_URL"),
        })
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            var,
            value: raw,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
