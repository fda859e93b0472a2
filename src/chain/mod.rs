// src/chain/mod.rs

pub mod actions;
pub mod contracts;
pub mod granter;

use alloy::network::EthereumWallet;
use alloy::primitives::TxHash;
use alloy::providers::{DynProvider, PendingTransactionError, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::amount::AmountError;
use crate::chains::ContractSet;

pub use actions::{ChainActions, PendingWrite, TxState, WriteTracker};
pub use granter::{AccessGranter, EvmGranter, GrantReceipt};

#[derive(Debug, Error)]
pub enum ChainError {
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error("contract call failed: {0}")]
    Contract(#[from] alloy::contract::Error),
    #[error("rpc error: {0}")]
    Transport(#[from] alloy::transports::TransportError),
    #[error("transaction {tx_hash} was not confirmed: {source}")]
    Unconfirmed {
        tx_hash: TxHash,
        #[source]
        source: PendingTransactionError,
    },
    #[error("transaction {0} reverted")]
    Reverted(TxHash),
    #[error("invalid signer key: {0}")]
    Signer(String),
    #[error("invalid rpc url: {0}")]
    RpcUrl(String),
    #[error("rpc endpoint serves chain {actual}, expected {expected}")]
    WrongChain { expected: u64, actual: u64 },
    #[error("{0} requires a signing key")]
    ReadOnly(&'static str),
}

/// Connection settings for one EVM chain. The provider is created on first
/// use and then shared; alloy providers are cheap to clone and safe to use
/// from concurrent requests.
pub struct ChainHandle {
    rpc_url: String,
    chain_id: u64,
    contracts: ContractSet,
    signer: Option<PrivateKeySigner>,
    provider: OnceCell<DynProvider>,
}

impl ChainHandle {
    pub fn new(
        rpc_url: impl Into<String>,
        chain_id: u64,
        contracts: ContractSet,
        signer_key: Option<&str>,
    ) -> Result<Self, ChainError> {
        let signer = signer_key
            .map(|k| {
                k.trim()
                    .parse::<PrivateKeySigner>()
                    .map_err(|e| ChainError::Signer(e.to_string()))
            })
            .transpose()?;

        Ok(Self {
            rpc_url: rpc_url.into(),
            chain_id,
            contracts,
            signer,
            provider: OnceCell::new(),
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn contracts(&self) -> &ContractSet {
        &self.contracts
    }

    pub fn signer_address(&self) -> Option<alloy::primitives::Address> {
        self.signer.as_ref().map(|s| s.address())
    }

    async fn provider(&self) -> Result<&DynProvider, ChainError> {
        self.provider
            .get_or_try_init(|| async {
                let url = self
                    .rpc_url
                    .parse::<Url>()
                    .map_err(|e| ChainError::RpcUrl(e.to_string()))?;

                let provider = match &self.signer {
                    Some(signer) => ProviderBuilder::new()
                        .wallet(EthereumWallet::from(signer.clone()))
                        .connect_http(url)
                        .erased(),
                    None => ProviderBuilder::new().connect_http(url).erased(),
                };

                let actual = provider.get_chain_id().await?;
                if actual != self.chain_id {
                    return Err(ChainError::WrongChain {
                        expected: self.chain_id,
                        actual,
                    });
                }
                log::info!("connected to chain {} via {}", actual, self.rpc_url);
                Ok::<_, ChainError>(provider)
            })
            .await
    }

    pub async fn actions(&self) -> Result<ChainActions, ChainError> {
        let provider = self.provider().await?.clone();
        Ok(ChainActions::new(
            provider,
            self.contracts,
            self.signer.is_some(),
        ))
    }
}
