// src/chain/actions.rs

use std::future::Future;
use std::sync::Arc;

use alloy::network::Ethereum;
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{DynProvider, PendingTransactionBuilder};
use serde::Serialize;
use tokio::sync::watch;

use super::contracts::{ICreatorToken, IERC20, IPayPerViewManager, ISubscriptionManager};
use super::ChainError;
use crate::amount::{days_to_seconds, parse_units, UsdcAmount};
use crate::chains::ContractSet;
use crate::models::{content_id_hash, PaymentMethod, SubscriptionInfo};

/// Observable progress of one write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum TxState {
    Submitting,
    #[serde(rename_all = "camelCase")]
    Confirming { tx_hash: TxHash },
    #[serde(rename_all = "camelCase")]
    Confirmed {
        tx_hash: TxHash,
        block_number: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        tx_hash: Option<TxHash>,
        reason: String,
    },
}

impl TxState {
    pub fn is_final(&self) -> bool {
        matches!(self, TxState::Confirmed { .. } | TxState::Failed { .. })
    }
}

/// Publishes state changes; later transitions out of a final state are
/// ignored. Clones share one state, so a caller can subscribe before
/// handing a tracker to a write.
#[derive(Debug, Clone)]
pub struct WriteTracker {
    tx: Arc<watch::Sender<TxState>>,
}

impl WriteTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(TxState::Submitting);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<TxState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> TxState {
        self.tx.borrow().clone()
    }

    fn set(&self, next: TxState) {
        self.tx.send_if_modified(|state| {
            if state.is_final() {
                return false;
            }
            *state = next;
            true
        });
    }

    pub fn submitted(&self, tx_hash: TxHash) {
        self.set(TxState::Confirming { tx_hash });
    }

    pub fn confirmed(&self, tx_hash: TxHash, block_number: Option<u64>) {
        self.set(TxState::Confirmed {
            tx_hash,
            block_number,
        });
    }

    pub fn failed(&self, tx_hash: Option<TxHash>, reason: impl Into<String>) {
        self.set(TxState::Failed {
            tx_hash,
            reason: reason.into(),
        });
    }

    /// Passes `result` through, recording an error as `Failed` first.
    fn check<T>(&self, result: Result<T, ChainError>) -> Result<T, ChainError> {
        if let Err(e) = &result {
            self.failed(None, e.to_string());
        }
        result
    }
}

impl Default for WriteTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// A submitted transaction awaiting inclusion. Nothing is retried.
pub struct PendingWrite {
    label: &'static str,
    pending: PendingTransactionBuilder<Ethereum>,
    tracker: WriteTracker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
}

impl PendingWrite {
    pub fn tx_hash(&self) -> TxHash {
        *self.pending.tx_hash()
    }

    pub fn state(&self) -> watch::Receiver<TxState> {
        self.tracker.subscribe()
    }

    /// Waits for the receipt. A reverted receipt is an error.
    pub async fn confirm(self) -> Result<Confirmation, ChainError> {
        let tx_hash = self.tx_hash();
        let receipt = match self.pending.get_receipt().await {
            Ok(r) => r,
            Err(source) => {
                self.tracker.failed(Some(tx_hash), source.to_string());
                return Err(ChainError::Unconfirmed { tx_hash, source });
            }
        };

        if !receipt.status() {
            log::warn!("{} reverted tx={}", self.label, tx_hash);
            self.tracker.failed(Some(tx_hash), "reverted");
            return Err(ChainError::Reverted(tx_hash));
        }

        self.tracker.confirmed(tx_hash, receipt.block_number);
        log::info!(
            "{} confirmed tx={} block={:?}",
            self.label,
            tx_hash,
            receipt.block_number
        );
        Ok(Confirmation {
            tx_hash,
            block_number: receipt.block_number,
        })
    }
}

/// Contract calls against one chain's deployment.
#[derive(Clone)]
pub struct ChainActions {
    provider: DynProvider,
    contracts: ContractSet,
    can_sign: bool,
}

impl ChainActions {
    pub fn new(provider: DynProvider, contracts: ContractSet, can_sign: bool) -> Self {
        Self {
            provider,
            contracts,
            can_sign,
        }
    }

    pub fn contracts(&self) -> &ContractSet {
        &self.contracts
    }

    async fn submit<F>(
        &self,
        label: &'static str,
        tracker: &WriteTracker,
        send: F,
    ) -> Result<PendingWrite, ChainError>
    where
        F: Future<Output = Result<PendingTransactionBuilder<Ethereum>, alloy::contract::Error>>,
    {
        if !self.can_sign {
            return tracker.check(Err(ChainError::ReadOnly(label)));
        }
        match send.await {
            Ok(pending) => {
                tracker.submitted(*pending.tx_hash());
                log::info!("{} submitted tx={}", label, pending.tx_hash());
                Ok(PendingWrite {
                    label,
                    pending,
                    tracker: tracker.clone(),
                })
            }
            Err(e) => {
                log::error!("{} submission failed: {}", label, e);
                tracker.check(Err(e.into()))
            }
        }
    }

    /// `price` is a decimal USDC string such as `"9.99"`.
    pub async fn create_plan(
        &self,
        price: &str,
        duration_days: u32,
        metadata_uri: &str,
        tracker: &WriteTracker,
    ) -> Result<PendingWrite, ChainError> {
        let price = tracker.check(parse_units(price).map_err(ChainError::from))?;
        let manager = ISubscriptionManager::new(self.contracts.subscription_manager, self.provider.clone());
        let call = manager.createPlan(
            U256::from(price),
            U256::from(days_to_seconds(duration_days)),
            metadata_uri.to_string(),
        );
        self.submit("createPlan", tracker, call.send()).await
    }

    pub async fn subscribe(
        &self,
        plan_id: u64,
        tracker: &WriteTracker,
    ) -> Result<PendingWrite, ChainError> {
        let manager = ISubscriptionManager::new(self.contracts.subscription_manager, self.provider.clone());
        let call = manager.subscribe(U256::from(plan_id));
        self.submit("subscribe", tracker, call.send()).await
    }

    /// Approves `spender` to move `amount` (decimal USDC) of the payment token.
    pub async fn approve_spend(
        &self,
        spender: Address,
        amount: &str,
        tracker: &WriteTracker,
    ) -> Result<PendingWrite, ChainError> {
        let amount = tracker.check(parse_units(amount).map_err(ChainError::from))?;
        let token = IERC20::new(self.contracts.usdc, self.provider.clone());
        let call = token.approve(spender, U256::from(amount));
        self.submit("approve", tracker, call.send()).await
    }

    pub async fn register_content(
        &self,
        content_id: &str,
        price: &str,
        metadata_uri: &str,
        tracker: &WriteTracker,
    ) -> Result<PendingWrite, ChainError> {
        let price = tracker.check(parse_units(price).map_err(ChainError::from))?;
        let manager = IPayPerViewManager::new(self.contracts.pay_per_view_manager, self.provider.clone());
        let call = manager.registerContent(
            content_id_hash(content_id),
            U256::from(price),
            metadata_uri.to_string(),
        );
        self.submit("registerContent", tracker, call.send()).await
    }

    pub async fn buy_view(
        &self,
        content_id: &str,
        tracker: &WriteTracker,
    ) -> Result<PendingWrite, ChainError> {
        let manager = IPayPerViewManager::new(self.contracts.pay_per_view_manager, self.provider.clone());
        let call = manager.buyView(content_id_hash(content_id));
        self.submit("buyView", tracker, call.send()).await
    }

    /// Backend-only: records a fiat-paid subscription.
    pub async fn grant_subscription(
        &self,
        subscriber: Address,
        plan_id: u64,
        tracker: &WriteTracker,
    ) -> Result<PendingWrite, ChainError> {
        let manager = ISubscriptionManager::new(self.contracts.subscription_manager, self.provider.clone());
        let call = manager.grantSubscription(subscriber, U256::from(plan_id));
        self.submit("grantSubscription", tracker, call.send()).await
    }

    /// Backend-only: records a fiat-paid content purchase.
    pub async fn grant_access(
        &self,
        buyer: Address,
        content_id: &str,
        tracker: &WriteTracker,
    ) -> Result<PendingWrite, ChainError> {
        let manager = IPayPerViewManager::new(self.contracts.pay_per_view_manager, self.provider.clone());
        let call = manager.grantAccess(buyer, content_id_hash(content_id));
        self.submit("grantAccess", tracker, call.send()).await
    }

    pub async fn read_allowance(
        &self,
        owner: Address,
        spender: Address,
    ) -> Result<UsdcAmount, ChainError> {
        let token = IERC20::new(self.contracts.usdc, self.provider.clone());
        let allowance = token.allowance(owner, spender).call().await?;
        Ok(UsdcAmount::from_u256(allowance))
    }

    pub async fn read_subscription_active(
        &self,
        subscriber: Address,
        plan_id: u64,
    ) -> Result<bool, ChainError> {
        let manager = ISubscriptionManager::new(self.contracts.subscription_manager, self.provider.clone());
        Ok(manager
            .isSubscriptionActive(subscriber, U256::from(plan_id))
            .call()
            .await?)
    }

    pub async fn read_subscription_details(
        &self,
        subscriber: Address,
        plan_id: u64,
    ) -> Result<SubscriptionInfo, ChainError> {
        let manager = ISubscriptionManager::new(self.contracts.subscription_manager, self.provider.clone());
        let sub = manager
            .getSubscription(subscriber, U256::from(plan_id))
            .call()
            .await?;
        Ok(SubscriptionInfo {
            plan_id: sub.planId.to_string(),
            start_time: u64::try_from(sub.startTime).unwrap_or(u64::MAX),
            end_time: u64::try_from(sub.endTime).unwrap_or(u64::MAX),
            is_active: sub.isActive,
            payment_method: PaymentMethod::from(sub.paymentMethod),
        })
    }

    pub async fn read_has_access(
        &self,
        viewer: Address,
        content_id: &str,
    ) -> Result<bool, ChainError> {
        let manager = IPayPerViewManager::new(self.contracts.pay_per_view_manager, self.provider.clone());
        Ok(manager
            .hasAccess(viewer, content_id_hash(content_id))
            .call()
            .await?)
    }

    pub async fn read_creator_token_balance(
        &self,
        holder: Address,
        creator: Address,
    ) -> Result<U256, ChainError> {
        let token = ICreatorToken::new(self.contracts.creator_token, self.provider.clone());
        Ok(token.holdsCreatorToken(holder, creator).call().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_walks_through_states() {
        let tracker = WriteTracker::new();
        let rx = tracker.subscribe();
        assert_eq!(*rx.borrow(), TxState::Submitting);

        let hash = TxHash::repeat_byte(7);
        tracker.submitted(hash);
        assert_eq!(*rx.borrow(), TxState::Confirming { tx_hash: hash });

        tracker.confirmed(hash, Some(12));
        assert_eq!(
            tracker.current(),
            TxState::Confirmed {
                tx_hash: hash,
                block_number: Some(12)
            }
        );
    }

    #[test]
    fn final_state_is_sticky() {
        let tracker = WriteTracker::new();
        tracker.failed(None, "rejected by wallet");
        tracker.submitted(TxHash::repeat_byte(1));
        assert!(matches!(tracker.current(), TxState::Failed { tx_hash: None, .. }));
    }

    #[tokio::test]
    async fn watchers_see_confirmation() {
        let tracker = WriteTracker::new();
        let mut rx = tracker.subscribe();
        let hash = TxHash::repeat_byte(3);

        let waiter = tokio::spawn(async move {
            let state = rx.wait_for(|s| s.is_final()).await.map(|s| s.clone());
            state
        });
        tracker.submitted(hash);
        tracker.confirmed(hash, None);

        let state = waiter.await.unwrap().unwrap();
        assert_eq!(
            state,
            TxState::Confirmed {
                tx_hash: hash,
                block_number: None
            }
        );
    }

    fn read_only_actions() -> ChainActions {
        use alloy::providers::{Provider, ProviderBuilder};

        let provider = ProviderBuilder::new()
            .connect_http("http://127.0.0.1:1".parse().unwrap())
            .erased();
        let contracts = ContractSet {
            usdc: Address::repeat_byte(1),
            subscription_manager: Address::repeat_byte(2),
            pay_per_view_manager: Address::repeat_byte(3),
            tips_manager: Address::repeat_byte(4),
            creator_token: Address::repeat_byte(5),
        };
        ChainActions::new(provider, contracts, false)
    }

    #[tokio::test]
    async fn bad_amounts_fail_before_anything_is_sent() {
        let actions = read_only_actions();

        for price in ["", "-1", "abc", "1.0000001"] {
            let tracker = WriteTracker::new();
            let rx = tracker.subscribe();
            let err = actions
                .create_plan(price, 30, "ipfs://plan", &tracker)
                .await
                .err();
            assert!(matches!(err, Some(ChainError::Amount(_))), "{price:?}");
            assert!(matches!(*rx.borrow(), TxState::Failed { tx_hash: None, .. }));
        }

        let tracker = WriteTracker::new();
        let err = actions
            .approve_spend(Address::repeat_byte(9), "-0.5", &tracker)
            .await
            .err();
        assert!(matches!(err, Some(ChainError::Amount(_))));
    }

    #[tokio::test]
    async fn unsigned_writes_report_failure_to_watchers() {
        let actions = read_only_actions();
        let tracker = WriteTracker::new();
        let rx = tracker.subscribe();
        assert_eq!(*rx.borrow(), TxState::Submitting);

        let err = actions.create_plan("9.99", 30, "ipfs://plan", &tracker).await.err();
        assert!(matches!(err, Some(ChainError::ReadOnly("createPlan"))));
        assert_eq!(
            *rx.borrow(),
            TxState::Failed {
                tx_hash: None,
                reason: "createPlan requires a signing key".into()
            }
        );
    }

    #[test]
    fn state_serializes_with_tag() {
        let json = serde_json::to_value(TxState::Confirming {
            tx_hash: TxHash::ZERO,
        })
        .unwrap();
        assert_eq!(json["state"], "confirming");
        assert!(json["txHash"].is_string());
    }
}
