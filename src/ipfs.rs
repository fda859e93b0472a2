// src/ipfs.rs
//
// Content-addressed storage: uploads go through the Web3.Storage HTTP API,
// reads through a public IPFS gateway.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Web3.Storage token not configured")]
    NotConfigured,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upload failed status={status} body={body}")]
    Upload { status: u16, body: String },
    #[error("failed to fetch {cid} from IPFS: status {status}")]
    Fetch { cid: String, status: u16 },
    #[error("{cid} is not valid JSON: {reason}")]
    InvalidJson { cid: String, reason: String },
    #[error("invalid upload response: {0}")]
    InvalidResponse(String),
}

/// A fetched object, split by the gateway's declared content type.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Json(Value),
    Blob { content_type: String, bytes: Vec<u8> },
}

impl Fetched {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Fetched::Json(v) => v.to_string().into_bytes(),
            Fetched::Blob { bytes, .. } => bytes,
        }
    }
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Uploads `bytes` and returns their CID. Identical bytes yield the same
    /// CID, so there is no local dedup.
    async fn put(&self, bytes: Vec<u8>, content_type: &str) -> Result<String, StorageError>;

    async fn get(&self, cid: &str) -> Result<Fetched, StorageError>;

    fn gateway_url(&self, cid: &str) -> String;
}

/// Expands a gateway template. `{cid}` is substituted; a template without a
/// placeholder is treated as a path-style gateway root.
pub fn build_gateway_url(template: &str, cid: &str) -> String {
    let trimmed = template.trim_end_matches('/');
    if trimmed.contains("{cid}") {
        return trimmed.replace("{cid}", cid);
    }
    if trimmed.ends_with("/ipfs") {
        format!("{}/{}", trimmed, cid)
    } else {
        format!("{}/ipfs/{}", trimmed, cid)
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    cid: String,
}

pub struct Web3Storage {
    http: reqwest::Client,
    token: Option<String>,
    api_url: String,
    gateway_template: String,
}

impl Web3Storage {
    pub fn new(
        token: Option<String>,
        api_url: impl Into<String>,
        gateway_template: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            gateway_template: gateway_template.into(),
        }
    }
}

#[async_trait]
impl ContentStore for Web3Storage {
    async fn put(&self, bytes: Vec<u8>, content_type: &str) -> Result<String, StorageError> {
        let token = self.token.as_deref().ok_or(StorageError::NotConfigured)?;
        let size = bytes.len();

        let resp = self
            .http
            .post(format!("{}/upload", self.api_url))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            log::error!("IPFS upload failed: status={} body={}", status, body);
            return Err(StorageError::Upload {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: UploadResponse = serde_json::from_str(&body)
            .map_err(|e| StorageError::InvalidResponse(format!("{e}; body={body}")))?;
        log::info!("stored {} bytes ({}) as {}", size, content_type, parsed.cid);
        Ok(parsed.cid)
    }

    async fn get(&self, cid: &str) -> Result<Fetched, StorageError> {
        let resp = self.http.get(self.gateway_url(cid)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(StorageError::Fetch {
                cid: cid.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let bytes = resp.bytes().await?.to_vec();

        if content_type.contains("application/json") {
            let value = serde_json::from_slice(&bytes).map_err(|e| StorageError::InvalidJson {
                cid: cid.to_string(),
                reason: e.to_string(),
            })?;
            Ok(Fetched::Json(value))
        } else {
            Ok(Fetched::Blob {
                content_type,
                bytes,
            })
        }
    }

    fn gateway_url(&self, cid: &str) -> String {
        build_gateway_url(&self.gateway_template, cid)
    }
}
