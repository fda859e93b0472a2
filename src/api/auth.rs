// src/api/auth.rs

use std::task::{Context, Poll};

use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{web, Error, HttpMessage};
use alloy::primitives::Address;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures_util::future::{ready, LocalBoxFuture, Ready};

use crate::access::{AuthSig, AuthSigError};
use crate::config::DEFAULT_AUTH_SIG_MAX_AGE_SECS;
use crate::AppState;

pub const WALLET_AUTH_HEADER: &str = "X-Wallet-Auth";

/// Decodes the `X-Wallet-Auth` header: base64 of the AuthSig JSON.
pub fn decode_header(raw: &str) -> Result<AuthSig, AuthSigError> {
    let json = STANDARD
        .decode(raw.trim())
        .map_err(|e| AuthSigError::Malformed(e.to_string()))?;
    serde_json::from_slice(&json).map_err(|e| AuthSigError::Malformed(e.to_string()))
}

/// Builds an `X-Wallet-Auth` header value.
pub fn encode_header(auth_sig: &AuthSig) -> String {
    STANDARD.encode(serde_json::to_vec(auth_sig).unwrap_or_default())
}

/// Middleware that:
/// - takes `X-Wallet-Auth: base64(<AuthSig JSON>)`
/// - checks the signature and the challenge age
/// - puts the verified `Address` into `req.extensions_mut()`
pub struct WalletAuth;

impl<S, B> Transform<S, ServiceRequest> for WalletAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = WalletAuthInner<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(WalletAuthInner { service }))
    }
}

pub struct WalletAuthInner<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for WalletAuthInner<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let max_age_secs = req
            .app_data::<web::Data<AppState>>()
            .map(|s| s.settings.auth_sig_max_age_secs)
            .unwrap_or(DEFAULT_AUTH_SIG_MAX_AGE_SECS);

        let Some(raw) = req
            .headers()
            .get(WALLET_AUTH_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
        else {
            return Box::pin(async move {
                Err(actix_web::error::ErrorUnauthorized(
                    "Missing X-Wallet-Auth header",
                ))
            });
        };

        let now_ms = chrono::Utc::now().timestamp_millis();
        let max_age_ms = i64::try_from(max_age_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        match decode_header(&raw).and_then(|sig| sig.verify(now_ms, max_age_ms)) {
            Ok(address) => {
                req.extensions_mut().insert::<Address>(address);
                let fut = self.service.call(req);
                Box::pin(async move { fut.await })
            }
            Err(e) => {
                log::warn!("wallet auth rejected: {}", e);
                Box::pin(async move {
                    Err(actix_web::error::ErrorUnauthorized(format!(
                        "Invalid wallet signature: {e}"
                    )))
                })
            }
        }
    }
}
