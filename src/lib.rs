pub mod access;
pub mod amount;
pub mod api;
pub mod chain;
pub mod chains;
pub mod config;
pub mod docs;
pub mod ipfs;
pub mod ledger;
pub mod lit;
pub mod media;
pub mod models;
pub mod moderation;
pub mod publish;
pub mod rapidapi;

use std::sync::Arc;

use crate::api::stripe_client::CheckoutProvider;
use crate::chain::{AccessGranter, ChainHandle};
use crate::chains::ChainRegistry;
use crate::ledger::GrantLedger;
use crate::moderation::Moderator;
use crate::publish::Publisher;
use crate::rapidapi::MediaProcessor;

/// Values handlers need besides the service handles.
#[derive(Debug, Clone)]
pub struct Settings {
    pub app_url: String,
    pub stripe_webhook_secret: String,
    pub checkout_min_amount_cents: u64,
    pub auth_sig_max_age_secs: u64,
    /// Upper bound on one webhook's grant, receipt wait included.
    pub grant_deadline_secs: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub registry: Arc<ChainRegistry>,
    /// Active chain: reads and backend grants go here.
    pub chain: Arc<ChainHandle>,
    pub granter: Arc<dyn AccessGranter>,
    pub ledger: Arc<dyn GrantLedger>,
    pub checkout: Arc<dyn CheckoutProvider>,
    pub moderator: Arc<Moderator>,
    pub media: Arc<dyn MediaProcessor>,
    pub publisher: Arc<Publisher>,
}
