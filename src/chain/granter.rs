// src/chain/granter.rs

use std::sync::Arc;

use alloy::primitives::{Address, TxHash};
use async_trait::async_trait;
use serde::Serialize;

use super::{ChainError, ChainHandle, WriteTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantReceipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
}

/// Privileged writes performed with the backend signer after a fiat payment.
/// Each call returns only once the transaction is included.
#[async_trait]
pub trait AccessGranter: Send + Sync {
    async fn grant_subscription(
        &self,
        subscriber: Address,
        plan_id: u64,
    ) -> Result<GrantReceipt, ChainError>;

    async fn grant_access(
        &self,
        buyer: Address,
        content_id: &str,
    ) -> Result<GrantReceipt, ChainError>;
}

pub struct EvmGranter {
    chain: Arc<ChainHandle>,
}

impl EvmGranter {
    pub fn new(chain: Arc<ChainHandle>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl AccessGranter for EvmGranter {
    async fn grant_subscription(
        &self,
        subscriber: Address,
        plan_id: u64,
    ) -> Result<GrantReceipt, ChainError> {
        let actions = self.chain.actions().await?;
        let confirmed = actions
            .grant_subscription(subscriber, plan_id, &WriteTracker::new())
            .await?
            .confirm()
            .await?;
        Ok(GrantReceipt {
            tx_hash: confirmed.tx_hash,
            block_number: confirmed.block_number,
        })
    }

    async fn grant_access(
        &self,
        buyer: Address,
        content_id: &str,
    ) -> Result<GrantReceipt, ChainError> {
        let actions = self.chain.actions().await?;
        let confirmed = actions
            .grant_access(buyer, content_id, &WriteTracker::new())
            .await?
            .confirm()
            .await?;
        Ok(GrantReceipt {
            tx_hash: confirmed.tx_hash,
            block_number: confirmed.block_number,
        })
    }
}
