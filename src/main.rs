// src/main.rs
use std::error::Error;
use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpResponse, HttpServer, Responder};
use dotenvy::dotenv;
use sqlx::PgPool;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use creator_gate::api::stripe_client::{CheckoutProvider, StripeClient};
use creator_gate::chain::{ChainHandle, EvmGranter};
use creator_gate::chains::ChainRegistry;
use creator_gate::config::Config;
use creator_gate::ipfs::Web3Storage;
use creator_gate::ledger::{GrantLedger, MemoryLedger, PgLedger};
use creator_gate::lit::LitClient;
use creator_gate::moderation::Moderator;
use creator_gate::publish::Publisher;
use creator_gate::rapidapi::RapidApiClient;
use creator_gate::{api, docs, AppState, Settings};

async fn index() -> impl Responder {
    HttpResponse::Ok().body("Service ready!")
}

async fn build_state(config: &Config) -> Result<AppState, Box<dyn Error>> {
    let registry = ChainRegistry::from_sources(
        config.default_chain_id,
        config.deployments_dir.as_deref(),
        |k| std::env::var(k).ok(),
    )?;
    if !registry.contains(config.active_chain_id) {
        return Err(format!(
            "active chain {} has no complete contract set",
            config.active_chain_id
        )
        .into());
    }
    let contracts = *registry.lookup(config.active_chain_id);

    let chain = Arc::new(ChainHandle::new(
        config.rpc_url.clone(),
        config.active_chain_id,
        contracts,
        Some(config.backend_signer_key.as_str()),
    )?);
    if let Some(signer) = chain.signer_address() {
        log::info!(
            "backend signer {} on chain {}",
            signer,
            config.active_chain_id
        );
    }

    let ledger: Arc<dyn GrantLedger> = match &config.database_url {
        Some(url) => {
            let pool = PgPool::connect(url).await?;
            sqlx::migrate!().run(&pool).await?;
            log::info!("grant ledger: postgres");
            Arc::new(PgLedger::new(pool))
        }
        None => {
            log::warn!("DATABASE_URL not set, grant ledger is in-memory");
            Arc::new(MemoryLedger::new())
        }
    };

    let checkout: Arc<dyn CheckoutProvider> = match &config.stripe_api_base {
        Some(base) => Arc::new(StripeClient::with_base_url(
            config.stripe_secret_key.clone(),
            base.clone(),
        )),
        None => Arc::new(StripeClient::new(config.stripe_secret_key.clone())),
    };

    if config.rapidapi_key.is_none() {
        log::warn!("RAPIDAPI_KEY not set, moderation falls back to {}", config.moderation_on_failure);
    }
    let mut rapidapi = RapidApiClient::new(config.rapidapi_key.clone());
    if let Some(base) = &config.rapidapi_base_url {
        rapidapi = rapidapi.with_base_url(base.clone());
    }
    let rapidapi = Arc::new(rapidapi);
    let moderator = Moderator::new(rapidapi.clone())
        .with_threshold(config.nsfw_threshold)
        .with_on_failure(config.moderation_on_failure);

    let store = Arc::new(Web3Storage::new(
        config.web3_storage_token.clone(),
        config.web3_storage_api_url.clone(),
        config.ipfs_gateway_template.clone(),
    ));
    let network = Arc::new(
        LitClient::new(config.lit_relay_url.clone(), config.lit_network.clone())
            .with_auth_sig_max_age_secs(config.auth_sig_max_age_secs),
    );
    let publisher = Publisher::new(store, network, config.active_chain_id, contracts);

    Ok(AppState {
        settings: Settings {
            app_url: config.app_url.clone(),
            stripe_webhook_secret: config.stripe_webhook_secret.clone(),
            checkout_min_amount_cents: config.checkout_min_amount_cents,
            auth_sig_max_age_secs: config.auth_sig_max_age_secs,
            grant_deadline_secs: config.grant_deadline_secs,
        },
        registry: Arc::new(registry),
        granter: Arc::new(EvmGranter::new(chain.clone())),
        chain,
        ledger,
        checkout,
        moderator: Arc::new(moderator),
        media: rapidapi,
        publisher: Arc::new(publisher),
    })
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            log::error!("configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let state = match build_state(&config).await {
        Ok(s) => web::Data::new(s),
        Err(e) => {
            log::error!("startup failed: {}", e);
            std::process::exit(1);
        }
    };

    log::info!("listening on {}", config.bind_addr);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .route("/", web::get().to(index))
            .service(
                SwaggerUi::new("/docs/{_:.*}")
                    .url("/api-docs/openapi.json", docs::ApiDoc::openapi()),
            )
            .configure(api::configure)
    })
    .bind(config.bind_addr.as_str())?
    .run()
    .await
}
