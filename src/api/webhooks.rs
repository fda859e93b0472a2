// src/api/webhooks.rs

use std::time::Duration;

use actix_web::{post, web, HttpRequest, HttpResponse};
use alloy::primitives::{Address, TxHash};
use serde_json::json;

use crate::api::stripe::{
    verify_signature, CheckoutSessionObject, StripeEvent, CHECKOUT_COMPLETED, SIGNATURE_HEADER,
};
use crate::chain::{ChainError, GrantReceipt};
use crate::ledger::{ClaimOutcome, GrantRequest};
use crate::models::{CheckoutMetadata, MetadataError, ProductType};
use crate::AppState;

/// What the backend signer writes for a paid session.
#[derive(Debug, Clone, PartialEq, Eq)]
enum GrantTarget {
    Subscription(u64),
    Content(String),
}

fn grant_request(
    event_id: &str,
    session: &CheckoutSessionObject,
) -> Result<(GrantRequest, GrantTarget), MetadataError> {
    let meta = CheckoutMetadata::from_map(&session.metadata)?;
    let target = match meta.product_type {
        ProductType::Subscription => {
            GrantTarget::Subscription(meta.plan_id.ok_or(MetadataError::Missing("planId"))?)
        }
        ProductType::Ppv => GrantTarget::Content(
            meta.content_id
                .clone()
                .ok_or(MetadataError::Missing("contentId"))?,
        ),
    };
    let req = GrantRequest {
        event_id: event_id.to_string(),
        session_id: session.id.clone(),
        wallet: meta.wallet_address,
        product_type: meta.product_type,
        plan_id: meta.plan_id,
        content_id: meta.content_id,
    };
    Ok((req, target))
}

async fn apply_grant(
    state: &AppState,
    wallet: Address,
    target: &GrantTarget,
) -> Result<GrantReceipt, ChainError> {
    match target {
        GrantTarget::Subscription(plan_id) => state.granter.grant_subscription(wallet, *plan_id).await,
        GrantTarget::Content(content_id) => state.granter.grant_access(wallet, content_id).await,
    }
}

/// Stripe webhook. The signature over the raw body is checked before the body
/// is parsed; nothing else happens for an unsigned request.
#[utoipa::path(
    post,
    path = "/api/fiat/webhook",
    tag = "fiat",
    request_body(content = String, content_type = "application/json", description = "Raw Stripe event JSON, verified byte for byte"),
    params(("Stripe-Signature" = String, Header, description = "t=<unix>,v1=<hex>")),
    responses(
        (status = 200, description = "Event processed or ignored"),
        (status = 400, description = "Missing or invalid signature, or unusable metadata"),
        (status = 409, description = "Same event is being processed"),
        (status = 500, description = "On-chain grant failed; Stripe should redeliver")
    )
)]
#[post("/fiat/webhook")]
pub async fn stripe_webhook(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    let Some(signature) = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
    else {
        log::warn!("stripe webhook without signature header");
        return HttpResponse::BadRequest().json(json!({
            "error": "Missing stripe-signature header"
        }));
    };

    let now = chrono::Utc::now().timestamp();
    if let Err(e) = verify_signature(
        signature,
        &body,
        &state.settings.stripe_webhook_secret,
        now,
    ) {
        log::warn!("Webhook signature verification failed: {}", e);
        return HttpResponse::BadRequest().json(json!({ "error": format!("Webhook Error: {e}") }));
    }

    let event: StripeEvent = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            log::error!("stripe webhook body is not an event: {}", e);
            return HttpResponse::BadRequest().json(json!({ "error": "Invalid event payload" }));
        }
    };

    if event.event_type != CHECKOUT_COMPLETED {
        log::debug!("ignoring stripe event {} ({})", event.id, event.event_type);
        return HttpResponse::Ok().json(json!({ "received": true }));
    }

    let (grant, target) = match serde_json::from_value::<CheckoutSessionObject>(event.data.object)
        .map_err(|e| e.to_string())
        .and_then(|session| grant_request(&event.id, &session).map_err(|e| e.to_string()))
    {
        Ok(g) => g,
        Err(reason) => {
            log::error!("stripe event {} has unusable session: {}", event.id, reason);
            return HttpResponse::BadRequest().json(json!({ "error": reason }));
        }
    };

    match state.ledger.claim(&grant).await {
        Ok(ClaimOutcome::Claimed) => {}
        Ok(ClaimOutcome::AlreadyApplied { tx_hash }) => {
            log::info!(
                "stripe event {} already applied (tx={:?}), skipping",
                event.id,
                tx_hash
            );
            return HttpResponse::Ok().json(json!({ "received": true, "duplicate": true }));
        }
        Ok(ClaimOutcome::InFlight) => {
            log::warn!("stripe event {} is already being processed", event.id);
            return HttpResponse::Conflict().json(json!({ "error": "Event is being processed" }));
        }
        Err(e) => {
            log::error!("grant ledger claim error for {}: {}", event.id, e);
            return HttpResponse::InternalServerError().json(json!({
                "error": "Failed to process payment"
            }));
        }
    }

    log::info!(
        "Processing payment event={} session={} wallet={} product={} plan={:?} content={:?}",
        grant.event_id,
        grant.session_id,
        grant.wallet,
        grant.product_type,
        grant.plan_id,
        grant.content_id
    );

    let deadline = Duration::from_secs(state.settings.grant_deadline_secs);
    let grant_call = apply_grant(&state, grant.wallet, &target);
    let outcome = match tokio::time::timeout(deadline, grant_call).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(_) => Err(format!("grant did not finish within {}s", deadline.as_secs())),
    };

    match outcome {
        Ok(receipt) => {
            log::info!(
                "{} granted to {} tx={} block={:?}",
                grant.product_type,
                grant.wallet,
                receipt.tx_hash,
                receipt.block_number
            );
            record_applied(&state, &grant, receipt.tx_hash).await;
            HttpResponse::Ok().json(json!({ "received": true }))
        }
        Err(reason) => {
            log::error!(
                "Error handling successful payment event={} wallet={}: {}",
                grant.event_id,
                grant.wallet,
                reason
            );
            if let Err(le) = state.ledger.mark_failed(&grant.event_id, &reason).await {
                log::error!("grant ledger mark_failed error for {}: {}", grant.event_id, le);
            }
            HttpResponse::InternalServerError().json(json!({
                "error": "Failed to process payment"
            }))
        }
    }
}

/// Marks the event applied, retrying once. The grant is already on chain,
/// so a ledger failure is logged for manual reconciliation and the delivery
/// is still acknowledged.
async fn record_applied(state: &AppState, grant: &GrantRequest, tx_hash: TxHash) {
    let mut last_error = None;
    for _ in 0..2 {
        match state.ledger.mark_applied(&grant.event_id, tx_hash).await {
            Ok(()) => return,
            Err(e) => last_error = Some(e),
        }
    }
    if let Some(e) = last_error {
        log::error!(
            "UNRECORDED GRANT event={} session={} wallet={} tx={}: {}; mark it applied by hand",
            grant.event_id,
            grant.session_id,
            grant.wallet,
            tx_hash,
            e
        );
    }
}
