// src/chains.rs
//
// Per-chain contract addresses. Manager contracts are deployed by us, so their
// addresses arrive through the environment or deployment files; USDC is
// fixed per public network.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use alloy::primitives::{address, Address};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

pub const POLYGON: u64 = 137;
pub const POLYGON_AMOY: u64 = 80002;
pub const BASE: u64 = 8453;
pub const BASE_SEPOLIA: u64 = 84532;
pub const LOCALHOST: u64 = 1337;

/// Static description of a chain we know how to talk about.
#[derive(Debug, Clone, Copy)]
pub struct KnownChain {
    pub chain_id: u64,
    /// Suffix of the `*_<SUFFIX>` environment variables.
    pub env_suffix: &'static str,
    /// Chain name understood by the encryption network.
    pub lit_name: &'static str,
    pub usdc: Option<Address>,
}

pub const KNOWN_CHAINS: [KnownChain; 5] = [
    KnownChain {
        chain_id: POLYGON,
        env_suffix: "POLYGON",
        lit_name: "polygon",
        usdc: Some(address!("0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359")),
    },
    KnownChain {
        chain_id: POLYGON_AMOY,
        env_suffix: "AMOY",
        lit_name: "polygonAmoy",
        usdc: Some(address!("0x41E94Eb019C0762f9Bfcf9Fb1E58725BfB0e7582")),
    },
    KnownChain {
        chain_id: BASE,
        env_suffix: "BASE",
        lit_name: "base",
        usdc: Some(address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913")),
    },
    KnownChain {
        chain_id: BASE_SEPOLIA,
        env_suffix: "BASE_SEPOLIA",
        lit_name: "baseSepolia",
        usdc: Some(address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e")),
    },
    KnownChain {
        chain_id: LOCALHOST,
        env_suffix: "LOCAL",
        lit_name: "localhost",
        usdc: None,
    },
];

pub fn known_chain(chain_id: u64) -> Option<&'static KnownChain> {
    KNOWN_CHAINS.iter().find(|c| c.chain_id == chain_id)
}

/// Encryption-network chain name; unknown ids fall back to Polygon.
pub fn lit_chain_name(chain_id: u64) -> &'static str {
    known_chain(chain_id).map(|c| c.lit_name).unwrap_or("polygon")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContractSet {
    #[schema(value_type = String)]
    pub usdc: Address,
    #[schema(value_type = String)]
    pub subscription_manager: Address,
    #[schema(value_type = String)]
    pub pay_per_view_manager: Address,
    #[schema(value_type = String)]
    pub tips_manager: Address,
    #[schema(value_type = String)]
    pub creator_token: Address,
}

/// Partially known address set, completed from several sources.
#[derive(Debug, Default, Clone)]
struct PartialSet {
    usdc: Option<Address>,
    subscription_manager: Option<Address>,
    pay_per_view_manager: Option<Address>,
    tips_manager: Option<Address>,
    creator_token: Option<Address>,
}

impl PartialSet {
    fn overlay(&mut self, other: PartialSet) {
        self.usdc = other.usdc.or(self.usdc);
        self.subscription_manager = other.subscription_manager.or(self.subscription_manager);
        self.pay_per_view_manager = other.pay_per_view_manager.or(self.pay_per_view_manager);
        self.tips_manager = other.tips_manager.or(self.tips_manager);
        self.creator_token = other.creator_token.or(self.creator_token);
    }

    fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        let mut check = |name, v: Option<Address>| {
            if v.map_or(true, |a| a.is_zero()) {
                missing.push(name);
            }
        };
        check("usdc", self.usdc);
        check("subscriptionManager", self.subscription_manager);
        check("payPerViewManager", self.pay_per_view_manager);
        check("tipsManager", self.tips_manager);
        check("creatorToken", self.creator_token);
        missing
    }

    fn complete(&self) -> Option<ContractSet> {
        if !self.missing().is_empty() {
            return None;
        }
        Some(ContractSet {
            usdc: self.usdc?,
            subscription_manager: self.subscription_manager?,
            pay_per_view_manager: self.pay_per_view_manager?,
            tips_manager: self.tips_manager?,
            creator_token: self.creator_token?,
        })
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("default chain {chain_id} is missing contract addresses: {missing:?}")]
    DefaultIncomplete {
        chain_id: u64,
        missing: Vec<&'static str>,
    },
    #[error("invalid address in {var}: {value}")]
    InvalidAddress { var: String, value: String },
    #[error("deployment file {path}: {source}")]
    DeploymentIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("deployment file {path}: {source}")]
    DeploymentJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Chain id → contract addresses, with a designated default chain.
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    default_chain: u64,
    default_set: ContractSet,
    chains: BTreeMap<u64, ContractSet>,
}

impl ChainRegistry {
    pub fn new(
        default_chain: u64,
        chains: BTreeMap<u64, ContractSet>,
    ) -> Result<Self, RegistryError> {
        let Some(default_set) = chains.get(&default_chain).copied() else {
            return Err(RegistryError::DefaultIncomplete {
                chain_id: default_chain,
                missing: PartialSet::default().missing(),
            });
        };
        Ok(Self {
            default_chain,
            default_set,
            chains,
        })
    }

    /// Builds the registry from built-in USDC addresses, deployment files in
    /// `deployments_dir` and `*_<CHAIN>` environment variables, in increasing
    /// precedence. Chains with an incomplete set are skipped.
    pub fn from_sources(
        default_chain: u64,
        deployments_dir: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, RegistryError> {
        let mut chains = BTreeMap::new();

        for known in KNOWN_CHAINS.iter() {
            let mut partial = PartialSet {
                usdc: known.usdc,
                ..Default::default()
            };

            if let Some(dir) = deployments_dir {
                let path = dir.join(format!("deployment-{}.json", known.chain_id));
                if path.exists() {
                    let record = DeploymentRecord::load(&path)?;
                    partial.overlay(record.contracts.into_partial());
                }
            }

            partial.overlay(partial_from_env(known.env_suffix, &env)?);

            match partial.complete() {
                Some(set) => {
                    chains.insert(known.chain_id, set);
                }
                None if known.chain_id == default_chain => {
                    return Err(RegistryError::DefaultIncomplete {
                        chain_id: default_chain,
                        missing: partial.missing(),
                    });
                }
                None => {
                    log::warn!(
                        "chain {} skipped, missing addresses: {:?}",
                        known.chain_id,
                        partial.missing()
                    );
                }
            }
        }

        Self::new(default_chain, chains)
    }

    pub fn default_chain(&self) -> u64 {
        self.default_chain
    }

    pub fn contains(&self, chain_id: u64) -> bool {
        self.chains.contains_key(&chain_id)
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.chains.keys().copied()
    }

    /// Unknown ids resolve to the default chain.
    pub fn lookup(&self, chain_id: u64) -> &ContractSet {
        self.chains.get(&chain_id).unwrap_or(&self.default_set)
    }

    /// Same as [`lookup`](Self::lookup) but also reports the chain id that was
    /// actually used.
    pub fn resolve(&self, chain_id: Option<u64>) -> (u64, &ContractSet) {
        match chain_id {
            Some(id) if self.contains(id) => (id, self.lookup(id)),
            _ => (self.default_chain, self.lookup(self.default_chain)),
        }
    }
}

fn partial_from_env(
    suffix: &str,
    env: &impl Fn(&str) -> Option<String>,
) -> Result<PartialSet, RegistryError> {
    let read = |prefix: &str| -> Result<Option<Address>, RegistryError> {
        let var = format!("{prefix}_{suffix}");
        match env(&var).map(|v| v.trim().to_string()) {
            Some(v) if !v.is_empty() => v
                .parse::<Address>()
                .map(Some)
                .map_err(|_| RegistryError::InvalidAddress { var, value: v }),
            _ => Ok(None),
        }
    };

    Ok(PartialSet {
        usdc: read("USDC")?,
        subscription_manager: read("SUBSCRIPTION_MANAGER")?,
        pay_per_view_manager: read("PPV_MANAGER")?,
        tips_manager: read("TIPS_MANAGER")?,
        creator_token: read("CREATOR_TOKEN")?,
    })
}

/// Operator bookkeeping written once when the contracts are deployed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub network: String,
    pub chain_id: String,
    pub deployer: Address,
    pub timestamp: String,
    pub contracts: DeployedContracts,
    pub config: DeploymentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeployedContracts {
    pub usdc: Address,
    pub subscription_manager: Address,
    pub pay_per_view_manager: Address,
    pub tips_manager: Address,
    pub creator_token: Address,
}

impl DeployedContracts {
    fn into_partial(self) -> PartialSet {
        PartialSet {
            usdc: Some(self.usdc),
            subscription_manager: Some(self.subscription_manager),
            pay_per_view_manager: Some(self.pay_per_view_manager),
            tips_manager: Some(self.tips_manager),
            creator_token: Some(self.creator_token),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    pub platform_wallet: Address,
    pub platform_fee_bps: u32,
    pub trusted_backend: Address,
}

impl DeploymentRecord {
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let raw = std::fs::read_to_string(path).map_err(|source| RegistryError::DeploymentIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| RegistryError::DeploymentJson {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes `deployment-<chainId>.json` into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, RegistryError> {
        let path = dir.join(format!("deployment-{}.json", self.chain_id));
        let io_err = |source| RegistryError::DeploymentIo {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(dir).map_err(io_err)?;
        let body =
            serde_json::to_string_pretty(self).map_err(|source| RegistryError::DeploymentJson {
                path: path.clone(),
                source,
            })?;
        std::fs::write(&path, body).map_err(io_err)?;
        Ok(path)
    }
}
