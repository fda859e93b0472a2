// src/lit.rs
//
// Threshold encryption through a Lit relay. The relay holds the node
// connection; this side only ships access conditions, ciphertext and the
// caller's signature. Plaintext is never written anywhere.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::access::{AccessPredicate, AuthSig, AuthSigError};

#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("relay serves network {actual}, expected {expected}")]
    NetworkMismatch { expected: String, actual: String },
    #[error("invalid auth signature: {0}")]
    AuthSig(#[from] AuthSigError),
    #[error("decryption denied status={status}: {body}")]
    Denied { status: u16, body: String },
    #[error("relay error status={status}: {body}")]
    Relay { status: u16, body: String },
    #[error("invalid relay response: {0}")]
    InvalidResponse(String),
}

/// What has to be kept to ask for decryption later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    pub ciphertext: String,
    pub data_to_encrypt_hash: String,
}

#[async_trait]
pub trait EncryptionNetwork: Send + Sync {
    async fn encrypt(
        &self,
        plaintext: &[u8],
        predicate: &AccessPredicate,
    ) -> Result<EncryptedPayload, EncryptionError>;

    /// Fails unless the network confirms `predicate` for the signer of
    /// `auth_sig` against current chain state.
    async fn decrypt(
        &self,
        payload: &EncryptedPayload,
        predicate: &AccessPredicate,
        auth_sig: &AuthSig,
    ) -> Result<Vec<u8>, EncryptionError>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Handshake {
    network_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecryptResponse {
    decrypted_data: String,
}

pub struct LitClient {
    http: reqwest::Client,
    relay_url: String,
    network: String,
    auth_sig_max_age_ms: i64,
    handshake: OnceCell<Handshake>,
}

impl LitClient {
    pub fn new(relay_url: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            relay_url: relay_url.into().trim_end_matches('/').to_string(),
            network: network.into(),
            auth_sig_max_age_ms: 300_000,
            handshake: OnceCell::new(),
        }
    }

    pub fn with_auth_sig_max_age_secs(mut self, secs: u64) -> Self {
        self.auth_sig_max_age_ms = i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        self
    }

    /// Connects once; later calls reuse the result.
    async fn connect(&self) -> Result<&Handshake, EncryptionError> {
        self.handshake
            .get_or_try_init(|| async {
                let resp = self
                    .http
                    .get(format!("{}/handshake", self.relay_url))
                    .send()
                    .await?;
                let hs: Handshake = read_json(resp).await?;
                if hs.network_name != self.network {
                    return Err(EncryptionError::NetworkMismatch {
                        expected: self.network.clone(),
                        actual: hs.network_name,
                    });
                }
                log::info!("connected to Lit network {}", hs.network_name);
                Ok(hs)
            })
            .await
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, EncryptionError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(EncryptionError::Relay {
            status: status.as_u16(),
            body,
        });
    }
    serde_json::from_str(&body).map_err(|e| EncryptionError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl EncryptionNetwork for LitClient {
    async fn encrypt(
        &self,
        plaintext: &[u8],
        predicate: &AccessPredicate,
    ) -> Result<EncryptedPayload, EncryptionError> {
        self.connect().await?;
        let resp = self
            .http
            .post(format!("{}/encrypt", self.relay_url))
            .json(&json!({
                "accessControlConditions": predicate.to_conditions(),
                "chain": predicate.chain_name(),
                "dataToEncrypt": STANDARD.encode(plaintext),
            }))
            .send()
            .await?;
        read_json(resp).await
    }

    async fn decrypt(
        &self,
        payload: &EncryptedPayload,
        predicate: &AccessPredicate,
        auth_sig: &AuthSig,
    ) -> Result<Vec<u8>, EncryptionError> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let signer = auth_sig.verify(now_ms, self.auth_sig_max_age_ms)?;

        self.connect().await?;
        let resp = self
            .http
            .post(format!("{}/decrypt", self.relay_url))
            .json(&json!({
                "accessControlConditions": predicate.to_conditions(),
                "chain": predicate.chain_name(),
                "ciphertext": payload.ciphertext,
                "dataToEncryptHash": payload.data_to_encrypt_hash,
                "authSig": auth_sig,
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await?;
            log::warn!("decryption denied for {}: status={}", signer, status);
            return Err(EncryptionError::Denied {
                status: status.as_u16(),
                body,
            });
        }

        let body: DecryptResponse = resp
            .json()
            .await
            .map_err(|e| EncryptionError::InvalidResponse(e.to_string()))?;
        STANDARD
            .decode(body.decrypted_data)
            .map_err(|e| EncryptionError::InvalidResponse(e.to_string()))
    }
}
