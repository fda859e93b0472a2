// src/api/chain.rs

use actix_web::{get, web, HttpResponse, Responder};
use alloy::primitives::Address;
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::chain::{ChainActions, ChainError};
use crate::chains::{lit_chain_name, ContractSet};
use crate::models::{parse_wallet_address, SubscriptionInfo};
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChainList {
    pub chain_ids: Vec<u64>,
    pub default_chain_id: u64,
    pub active_chain_id: u64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfo {
    pub chain_id: u64,
    pub lit_chain: String,
    pub contracts: ContractSet,
    /// True when the requested id is not registered and the default chain
    /// was returned instead.
    pub fallback: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    pub active: bool,
    pub details: SubscriptionInfo,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AllowanceResponse {
    /// USDC base units
    pub raw: String,
    pub formatted: String,
}

fn bad_address(name: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({ "error": format!("Invalid {name} address") }))
}

fn chain_failure(what: &str, e: ChainError) -> HttpResponse {
    log::error!("{} read failed: {}", what, e);
    HttpResponse::BadGateway().json(json!({ "error": format!("Failed to read {what}") }))
}

fn addresses(pairs: [(&'static str, &str); 2]) -> Result<[Address; 2], HttpResponse> {
    let [(a_name, a), (b_name, b)] = pairs;
    let a = parse_wallet_address(a).ok_or_else(|| bad_address(a_name))?;
    let b = parse_wallet_address(b).ok_or_else(|| bad_address(b_name))?;
    Ok([a, b])
}

async fn actions(state: &AppState) -> Result<ChainActions, HttpResponse> {
    state
        .chain
        .actions()
        .await
        .map_err(|e| chain_failure("chain", e))
}

#[utoipa::path(
    get,
    path = "/api/chains",
    tag = "chain",
    responses((status = 200, description = "Registered chains", body = ChainList))
)]
#[get("/chains")]
pub async fn list_chains(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(ChainList {
        chain_ids: state.registry.chain_ids().collect(),
        default_chain_id: state.registry.default_chain(),
        active_chain_id: state.chain.chain_id(),
    })
}

#[utoipa::path(
    get,
    path = "/api/chains/{chain_id}",
    tag = "chain",
    params(("chain_id" = u64, Path, description = "EVM chain id")),
    responses(
        (status = 200, description = "Contract addresses", body = ChainInfo),
        (status = 400, description = "Not a chain id")
    )
)]
#[get("/chains/{chain_id}")]
pub async fn get_chain(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let Ok(requested) = path.trim().parse::<u64>() else {
        return HttpResponse::BadRequest().json(json!({ "error": "Invalid chain id" }));
    };
    let (chain_id, contracts) = state.registry.resolve(Some(requested));
    HttpResponse::Ok().json(ChainInfo {
        chain_id,
        lit_chain: lit_chain_name(chain_id).to_string(),
        contracts: *contracts,
        fallback: chain_id != requested,
    })
}

#[utoipa::path(
    get,
    path = "/api/subscriptions/{subscriber}/{plan_id}",
    tag = "chain",
    params(
        ("subscriber" = String, Path, description = "Subscriber wallet"),
        ("plan_id" = u64, Path, description = "Plan id")
    ),
    responses(
        (status = 200, description = "Subscription state", body = SubscriptionStatus),
        (status = 400, description = "Invalid address or plan id"),
        (status = 502, description = "RPC failure")
    )
)]
#[get("/subscriptions/{subscriber}/{plan_id}")]
pub async fn subscription_status(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> impl Responder {
    let (subscriber, plan_id) = path.into_inner();
    let Some(subscriber) = parse_wallet_address(&subscriber) else {
        return bad_address("subscriber");
    };
    let Ok(plan_id) = plan_id.parse::<u64>() else {
        return HttpResponse::BadRequest().json(json!({ "error": "Invalid plan id" }));
    };
    let actions = match actions(&state).await {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let (active, details) = tokio::join!(
        actions.read_subscription_active(subscriber, plan_id),
        actions.read_subscription_details(subscriber, plan_id)
    );
    match (active, details) {
        (Ok(active), Ok(details)) => {
            HttpResponse::Ok().json(SubscriptionStatus { active, details })
        }
        (Err(e), _) | (_, Err(e)) => chain_failure("subscription", e),
    }
}

#[utoipa::path(
    get,
    path = "/api/allowance/{owner}/{spender}",
    tag = "chain",
    params(
        ("owner" = String, Path, description = "Token owner"),
        ("spender" = String, Path, description = "Approved spender")
    ),
    responses(
        (status = 200, description = "USDC allowance", body = AllowanceResponse),
        (status = 400, description = "Invalid address"),
        (status = 502, description = "RPC failure")
    )
)]
#[get("/allowance/{owner}/{spender}")]
pub async fn allowance(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> impl Responder {
    let (owner, spender) = path.into_inner();
    let [owner, spender] = match addresses([("owner", &owner), ("spender", &spender)]) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let actions = match actions(&state).await {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    match actions.read_allowance(owner, spender).await {
        Ok(amount) => HttpResponse::Ok().json(AllowanceResponse {
            raw: amount.base_units().to_string(),
            formatted: amount.to_string(),
        }),
        Err(e) => chain_failure("allowance", e),
    }
}

#[utoipa::path(
    get,
    path = "/api/ppv/{viewer}/{content_id}",
    tag = "chain",
    params(
        ("viewer" = String, Path, description = "Viewer wallet"),
        ("content_id" = String, Path, description = "Content id, hashed with keccak-256")
    ),
    responses(
        (status = 200, description = "{hasAccess}"),
        (status = 400, description = "Invalid address"),
        (status = 502, description = "RPC failure")
    )
)]
#[get("/ppv/{viewer}/{content_id}")]
pub async fn ppv_access(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> impl Responder {
    let (viewer, content_id) = path.into_inner();
    let Some(viewer) = parse_wallet_address(&viewer) else {
        return bad_address("viewer");
    };
    let actions = match actions(&state).await {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    match actions.read_has_access(viewer, &content_id).await {
        Ok(has_access) => HttpResponse::Ok().json(json!({ "hasAccess": has_access })),
        Err(e) => chain_failure("access", e),
    }
}

#[utoipa::path(
    get,
    path = "/api/creator-token/{holder}/{creator}",
    tag = "chain",
    params(
        ("holder" = String, Path, description = "Token holder"),
        ("creator" = String, Path, description = "Creator wallet")
    ),
    responses(
        (status = 200, description = "{balance}"),
        (status = 400, description = "Invalid address"),
        (status = 502, description = "RPC failure")
    )
)]
#[get("/creator-token/{holder}/{creator}")]
pub async fn creator_token_balance(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> impl Responder {
    let (holder, creator) = path.into_inner();
    let [holder, creator] = match addresses([("holder", &holder), ("creator", &creator)]) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let actions = match actions(&state).await {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    match actions.read_creator_token_balance(holder, creator).await {
        Ok(balance) => HttpResponse::Ok().json(json!({ "balance": balance.to_string() })),
        Err(e) => chain_failure("creator token balance", e),
    }
}
