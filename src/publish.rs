// src/publish.rs
//
// Publishing pipeline: predicate -> encrypt -> store ciphertext -> store
// thumbnail -> store metadata record. Steps run in order and a failure part
// way leaves earlier uploads in place.

use std::sync::Arc;

use alloy::primitives::Address;
use thiserror::Error;

use crate::access::{AccessSpec, AuthSig};
use crate::chains::ContractSet;
use crate::ipfs::{ContentStore, Fetched, StorageError};
use crate::lit::{EncryptedPayload, EncryptionError, EncryptionNetwork};
use crate::models::ContentRecord;

const CIPHERTEXT_CONTENT_TYPE: &str = "application/octet-stream";
const RECORD_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Encryption(#[from] EncryptionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("{0} is not a content record")]
    NotARecord(String),
    #[error("ciphertext {0} is not valid utf-8")]
    InvalidCiphertext(String),
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct Upload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

pub struct PublishRequest {
    pub title: String,
    pub description: String,
    pub access: AccessSpec,
    pub file: Upload,
    pub thumbnail: Option<Upload>,
    pub creator: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decrypted {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub metadata_cid: String,
    pub encrypted_file_cid: String,
    pub thumbnail_cid: Option<String>,
}

pub struct Publisher {
    store: Arc<dyn ContentStore>,
    network: Arc<dyn EncryptionNetwork>,
    chain_id: u64,
    contracts: ContractSet,
}

impl Publisher {
    pub fn new(
        store: Arc<dyn ContentStore>,
        network: Arc<dyn EncryptionNetwork>,
        chain_id: u64,
        contracts: ContractSet,
    ) -> Self {
        Self {
            store,
            network,
            chain_id,
            contracts,
        }
    }

    pub fn gateway_url(&self, cid: &str) -> String {
        self.store.gateway_url(cid)
    }

    pub async fn publish(&self, req: PublishRequest) -> Result<Published, PublishError> {
        let predicate = req.access.build(self.chain_id, &self.contracts);

        let encrypted = self.network.encrypt(&req.file.bytes, &predicate).await?;
        let encrypted_file_cid = self
            .store
            .put(encrypted.ciphertext.into_bytes(), CIPHERTEXT_CONTENT_TYPE)
            .await?;

        let thumbnail_cid = match req.thumbnail {
            Some(thumb) => Some(self.store.put(thumb.bytes, &thumb.content_type).await?),
            None => None,
        };

        let record = ContentRecord {
            title: req.title,
            description: req.description,
            encrypted_file_cid: encrypted_file_cid.clone(),
            encrypted_symmetric_key: encrypted.data_to_encrypt_hash,
            access_control_conditions: predicate.to_conditions(),
            access: predicate,
            content_type: req.file.content_type,
            thumbnail: thumbnail_cid.clone(),
            creator: req.creator,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        let metadata = serde_json::to_vec_pretty(&record)?;
        let metadata_cid = self.store.put(metadata, RECORD_CONTENT_TYPE).await?;

        log::info!(
            "published {} by {} (file={}, thumbnail={:?})",
            metadata_cid,
            record.creator,
            encrypted_file_cid,
            thumbnail_cid
        );
        Ok(Published {
            metadata_cid,
            encrypted_file_cid,
            thumbnail_cid,
        })
    }

    pub async fn fetch_record(&self, cid: &str) -> Result<ContentRecord, PublishError> {
        match self.store.get(cid).await? {
            Fetched::Json(value) => {
                serde_json::from_value(value).map_err(|_| PublishError::NotARecord(cid.to_string()))
            }
            Fetched::Blob { .. } => Err(PublishError::NotARecord(cid.to_string())),
        }
    }

    /// Decrypts the file behind the record at `cid`. The encryption network
    /// decides access.
    pub async fn decrypt(&self, cid: &str, auth_sig: &AuthSig) -> Result<Decrypted, PublishError> {
        let record = self.fetch_record(cid).await?;
        let ciphertext = self.store.get(&record.encrypted_file_cid).await?.into_bytes();
        let ciphertext = String::from_utf8(ciphertext)
            .map_err(|_| PublishError::InvalidCiphertext(record.encrypted_file_cid.clone()))?;

        let payload = EncryptedPayload {
            ciphertext,
            data_to_encrypt_hash: record.encrypted_symmetric_key,
        };
        let bytes = self
            .network
            .decrypt(&payload, &record.access, auth_sig)
            .await?;
        Ok(Decrypted {
            content_type: record.content_type,
            bytes,
        })
    }
}
