use actix_web::test::TestRequest;
use actix_web::{test, web, App};
use alloy::primitives::Address;
use serde_json::{json, Value};
use alloy::primitives::TxHash;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use creator_gate::api;
use creator_gate::api::stripe::{signature_header, SIGNATURE_HEADER};
use creator_gate::ledger::{
    ClaimOutcome, GrantLedger, GrantRequest, GrantStatus, LedgerError, MemoryLedger,
};

mod support;

use support::{GrantCall, Harness, WEBHOOK_SECRET};

const WALLET: &str = "0x52908400098527886e0f7030069857d2e4169ee7";

fn wallet() -> Address {
    WALLET.parse().unwrap()
}

fn event_id() -> String {
    format!("evt_{}", Uuid::new_v4().simple())
}

fn completed_event(id: &str, metadata: Value) -> Value {
    json!({
        "id": id,
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test_1",
                "payment_status": "paid",
                "amount_total": 999,
                "metadata": metadata
            }
        }
    })
}

fn subscription_event(id: &str, plan_id: &str) -> Value {
    completed_event(
        id,
        json!({
            "walletAddress": WALLET,
            "productType": "subscription",
            "planId": plan_id,
            "contentId": "",
            "creatorAddress": ""
        }),
    )
}

fn signed(event: &Value, secret: &str) -> TestRequest {
    let payload = event.to_string();
    let ts = chrono::Utc::now().timestamp();
    TestRequest::post()
        .uri("/api/fiat/webhook")
        .insert_header((
            SIGNATURE_HEADER,
            signature_header(secret, ts, payload.as_bytes()),
        ))
        .insert_header(("content-type", "application/json"))
        .set_payload(payload)
}

macro_rules! app {
    ($harness:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($harness.state()))
                .configure(api::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn wrong_secret_is_rejected_without_grant() {
    let harness = Harness::default();
    let app = app!(harness);

    let req = signed(&subscription_event(&event_id(), "3"), "whsec_other").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
    assert!(harness.granter.calls().is_empty());
}

#[actix_web::test]
async fn missing_signature_header_is_rejected() {
    let harness = Harness::default();
    let app = app!(harness);

    let req = TestRequest::post()
        .uri("/api/fiat/webhook")
        .set_json(subscription_event(&event_id(), "3"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Missing stripe-signature header");
    assert!(harness.granter.calls().is_empty());
}

#[actix_web::test]
async fn stale_signature_is_rejected() {
    let harness = Harness::default();
    let app = app!(harness);

    let payload = subscription_event(&event_id(), "3").to_string();
    let ts = chrono::Utc::now().timestamp() - 3600;
    let req = TestRequest::post()
        .uri("/api/fiat/webhook")
        .insert_header((
            SIGNATURE_HEADER,
            signature_header(WEBHOOK_SECRET, ts, payload.as_bytes()),
        ))
        .set_payload(payload)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
    assert!(harness.granter.calls().is_empty());
}

#[actix_web::test]
async fn minimum_timestamp_is_rejected_as_stale() {
    let harness = Harness::default();
    let app = app!(harness);

    let req = TestRequest::post()
        .uri("/api/fiat/webhook")
        .insert_header((SIGNATURE_HEADER, "t=-9223372036854775808,v1=00"))
        .set_payload(subscription_event(&event_id(), "3").to_string())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(
        body["error"],
        "Webhook Error: timestamp outside the tolerance zone"
    );
    assert!(harness.granter.calls().is_empty());
}

#[actix_web::test]
async fn subscription_payment_grants_once() {
    let harness = Harness::default();
    let app = app!(harness);
    let id = event_id();

    let resp = test::call_service(
        &app,
        signed(&subscription_event(&id, "3"), WEBHOOK_SECRET).to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({ "received": true }));

    assert_eq!(
        harness.granter.calls(),
        vec![GrantCall::Subscription(wallet(), 3)]
    );
    assert_eq!(harness.ledger.status(&id), Some(GrantStatus::Applied));
}

#[actix_web::test]
async fn redelivery_is_acknowledged_without_second_grant() {
    let harness = Harness::default();
    let app = app!(harness);
    let id = event_id();
    let event = subscription_event(&id, "3");

    let first = test::call_service(&app, signed(&event, WEBHOOK_SECRET).to_request()).await;
    assert_eq!(first.status(), 200);

    let second = test::call_service(&app, signed(&event, WEBHOOK_SECRET).to_request()).await;
    assert_eq!(second.status(), 200);
    let body: Value = test::read_body_json(second).await;
    assert_eq!(body["duplicate"], true);

    assert_eq!(harness.granter.calls().len(), 1);
}

#[actix_web::test]
async fn chain_failure_returns_500_and_can_be_retried() {
    let harness = Harness::default();
    harness.granter.fail.store(true, Ordering::SeqCst);
    let app = app!(harness);
    let id = event_id();
    let event = subscription_event(&id, "7");

    let resp = test::call_service(&app, signed(&event, WEBHOOK_SECRET).to_request()).await;
    assert_eq!(resp.status(), 500);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Failed to process payment");
    assert_eq!(harness.ledger.status(&id), Some(GrantStatus::Failed));
    assert!(harness.ledger.last_error(&id).is_some());

    harness.granter.fail.store(false, Ordering::SeqCst);
    let retry = test::call_service(&app, signed(&event, WEBHOOK_SECRET).to_request()).await;
    assert_eq!(retry.status(), 200);
    assert_eq!(harness.ledger.status(&id), Some(GrantStatus::Applied));
    assert_eq!(harness.granter.calls().len(), 2);
}

#[actix_web::test]
async fn slow_grant_is_cut_off_at_the_deadline() {
    let harness = Harness {
        grant_deadline_secs: 1,
        ..Default::default()
    };
    harness.granter.delay_ms.store(3_000, Ordering::SeqCst);
    let app = app!(harness);
    let id = event_id();

    let resp = test::call_service(
        &app,
        signed(&subscription_event(&id, "5"), WEBHOOK_SECRET).to_request(),
    )
    .await;

    assert_eq!(resp.status(), 500);
    assert_eq!(harness.ledger.status(&id), Some(GrantStatus::Failed));
    assert_eq!(
        harness.ledger.last_error(&id).as_deref(),
        Some("grant did not finish within 1s")
    );
}

/// Fails `mark_applied` while `failures` is positive.
struct UnrecordingLedger {
    inner: MemoryLedger,
    failures: AtomicU32,
}

#[async_trait]
impl GrantLedger for UnrecordingLedger {
    async fn claim(&self, req: &GrantRequest) -> Result<ClaimOutcome, LedgerError> {
        self.inner.claim(req).await
    }

    async fn mark_applied(&self, event_id: &str, tx_hash: TxHash) -> Result<(), LedgerError> {
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(LedgerError::UnknownEvent(event_id.to_string()));
        }
        self.inner.mark_applied(event_id, tx_hash).await
    }

    async fn mark_failed(&self, event_id: &str, reason: &str) -> Result<(), LedgerError> {
        self.inner.mark_failed(event_id, reason).await
    }
}

#[actix_web::test]
async fn ledger_write_failure_after_grant_still_acknowledges() {
    let harness = Harness::default();
    let ledger = Arc::new(UnrecordingLedger {
        inner: MemoryLedger::new(),
        failures: AtomicU32::new(1),
    });
    let mut state = harness.state();
    state.ledger = ledger.clone();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(api::configure),
    )
    .await;

    // one failed write is retried
    let id = event_id();
    let event = subscription_event(&id, "3");
    let resp = test::call_service(&app, signed(&event, WEBHOOK_SECRET).to_request()).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(ledger.inner.status(&id), Some(GrantStatus::Applied));

    // a write that keeps failing leaves the claim pending, so redelivery
    // cannot grant again
    ledger.failures.store(u32::MAX, Ordering::SeqCst);
    let id = event_id();
    let event = subscription_event(&id, "4");
    let resp = test::call_service(&app, signed(&event, WEBHOOK_SECRET).to_request()).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(ledger.inner.status(&id), Some(GrantStatus::Pending));

    let again = test::call_service(&app, signed(&event, WEBHOOK_SECRET).to_request()).await;
    assert_eq!(again.status(), 409);
    assert_eq!(harness.granter.calls().len(), 2);
}

#[actix_web::test]
async fn ppv_payment_grants_content_access() {
    let harness = Harness::default();
    let app = app!(harness);

    let event = completed_event(
        &event_id(),
        json!({
            "walletAddress": WALLET,
            "productType": "ppv",
            "planId": "",
            "contentId": "episode-7",
            "creatorAddress": "0x1111111111111111111111111111111111111111"
        }),
    );
    let resp = test::call_service(&app, signed(&event, WEBHOOK_SECRET).to_request()).await;

    assert_eq!(resp.status(), 200);
    assert_eq!(
        harness.granter.calls(),
        vec![GrantCall::Access(wallet(), "episode-7".to_string())]
    );
}

#[actix_web::test]
async fn ppv_grant_ignores_bad_creator_and_keeps_raw_content_id() {
    let harness = Harness::default();
    let app = app!(harness);

    let event = completed_event(
        &event_id(),
        json!({
            "walletAddress": WALLET,
            "productType": "ppv",
            "planId": "",
            "contentId": " ep 1 ",
            "creatorAddress": "garbage"
        }),
    );
    let resp = test::call_service(&app, signed(&event, WEBHOOK_SECRET).to_request()).await;

    assert_eq!(resp.status(), 200);
    assert_eq!(
        harness.granter.calls(),
        vec![GrantCall::Access(wallet(), " ep 1 ".to_string())]
    );
}

#[actix_web::test]
async fn other_events_are_acknowledged() {
    let harness = Harness::default();
    let app = app!(harness);

    let event = json!({
        "id": event_id(),
        "type": "payment_intent.created",
        "data": { "object": { "id": "pi_1" } }
    });
    let resp = test::call_service(&app, signed(&event, WEBHOOK_SECRET).to_request()).await;

    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({ "received": true }));
    assert!(harness.granter.calls().is_empty());
}

#[actix_web::test]
async fn unusable_metadata_is_rejected() {
    let harness = Harness::default();
    let app = app!(harness);

    let event = completed_event(
        &event_id(),
        json!({ "walletAddress": "nope", "productType": "subscription", "planId": "1" }),
    );
    let resp = test::call_service(&app, signed(&event, WEBHOOK_SECRET).to_request()).await;

    assert_eq!(resp.status(), 400);
    assert!(harness.granter.calls().is_empty());
}
