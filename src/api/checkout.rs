// src/api/checkout.rs

use actix_web::{post, web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::api::stripe_client::CreateCheckoutSession;
use crate::models::{parse_wallet_address, CheckoutMetadata, ProductType};
use crate::{AppState, Settings};

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    pub wallet_address: Option<String>,
    /// `subscription` or `ppv`
    pub product_type: Option<String>,
    #[schema(value_type = Option<u64>)]
    pub plan_id: Option<Value>,
    pub content_id: Option<String>,
    /// Amount in USD cents
    #[schema(value_type = u64)]
    pub amount: Option<Value>,
    pub creator_address: Option<String>,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

/// Accepts `3` and `"3"`.
fn as_u64(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Everything is checked here, before the payment provider is contacted.
pub fn build_session(
    req: &CreateCheckoutRequest,
    settings: &Settings,
) -> Result<CreateCheckoutSession, &'static str> {
    let wallet_address = req
        .wallet_address
        .as_deref()
        .and_then(parse_wallet_address)
        .ok_or("Invalid wallet address")?;

    let product_type = req
        .product_type
        .as_deref()
        .and_then(|p| p.parse::<ProductType>().ok())
        .ok_or("Invalid product type")?;

    let amount = req
        .amount
        .as_ref()
        .and_then(as_u64)
        .filter(|a| *a > 0)
        .ok_or("Invalid amount")?;
    if amount < settings.checkout_min_amount_cents {
        return Err("Amount is below the minimum");
    }

    let creator_address = match req.creator_address.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(parse_wallet_address(raw).ok_or("Invalid creator address")?),
    };

    let plan_id = match &req.plan_id {
        None | Some(Value::Null) => None,
        Some(v) => Some(as_u64(v).ok_or("Invalid plan id")?),
    };
    let content_id = req
        .content_id
        .clone()
        .filter(|c| !c.trim().is_empty());

    let (product_name, product_description) = match product_type {
        ProductType::Subscription => {
            let plan_id = plan_id.ok_or("planId is required for subscriptions")?;
            (
                format!("Creator Subscription - Plan #{plan_id}"),
                "Monthly subscription to creator content",
            )
        }
        ProductType::Ppv => {
            let content_id = content_id.as_deref().ok_or("contentId is required for ppv")?;
            (
                format!("Content Purchase - {content_id}"),
                "One-time content access",
            )
        }
    };

    let metadata = CheckoutMetadata {
        wallet_address,
        product_type,
        plan_id,
        content_id,
        creator_address,
    };

    Ok(CreateCheckoutSession {
        product_name,
        product_description: product_description.to_string(),
        currency: "usd".to_string(),
        unit_amount: amount,
        success_url: req.success_url.clone().unwrap_or_else(|| {
            format!(
                "{}/success?session_id={{CHECKOUT_SESSION_ID}}",
                settings.app_url
            )
        }),
        cancel_url: req
            .cancel_url
            .clone()
            .unwrap_or_else(|| format!("{}/cancel", settings.app_url)),
        metadata: metadata.to_map(),
    })
}

#[utoipa::path(
    post,
    path = "/api/fiat/create-checkout-session",
    tag = "fiat",
    request_body = CreateCheckoutRequest,
    responses(
        (status = 200, description = "Checkout session created", body = CreateCheckoutResponse),
        (status = 400, description = "Invalid wallet, product type or amount"),
        (status = 500, description = "Payment provider error")
    )
)]
#[post("/fiat/create-checkout-session")]
pub async fn create_checkout_session(
    state: web::Data<AppState>,
    payload: web::Json<CreateCheckoutRequest>,
) -> impl Responder {
    let session = match build_session(&payload, &state.settings) {
        Ok(s) => s,
        Err(reason) => return HttpResponse::BadRequest().json(json!({ "error": reason })),
    };

    log::info!(
        "creating checkout session product={} amount={} metadata={:?}",
        session.product_name,
        session.unit_amount,
        session.metadata
    );

    match state.checkout.create_checkout_session(session).await {
        Ok(created) => HttpResponse::Ok().json(CreateCheckoutResponse {
            session_id: created.id,
            url: created.url,
        }),
        Err(e) => {
            log::error!("checkout session creation error: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "error": "Failed to create checkout session"
            }))
        }
    }
}
