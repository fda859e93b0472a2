// src/api/content.rs

use actix_multipart::Multipart;
use actix_web::{get, post, web, HttpResponse, Responder};
use alloy::primitives::Address;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::access::{AccessSpec, AuthSig};
use crate::api::auth::WalletAuth;
use crate::ipfs::StorageError;
use crate::lit::EncryptionError;
use crate::models::ContentRecord;
use crate::publish::{PublishError, PublishRequest, Upload};
use crate::AppState;

pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub metadata_cid: String,
    pub encrypted_file_cid: String,
    pub thumbnail_cid: Option<String>,
    pub metadata_url: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DecryptRequest {
    #[schema(value_type = Object)]
    pub auth_sig: AuthSig,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DecryptResponse {
    pub content_type: String,
    /// base64
    pub data: String,
}

fn error_response(e: &PublishError) -> HttpResponse {
    let body = json!({ "error": e.to_string() });
    match e {
        PublishError::Encryption(EncryptionError::AuthSig(_)) => {
            HttpResponse::Unauthorized().json(body)
        }
        PublishError::Encryption(EncryptionError::Denied { .. }) => {
            HttpResponse::Forbidden().json(body)
        }
        PublishError::NotARecord(_) | PublishError::Storage(StorageError::Fetch { status: 404, .. }) => {
            HttpResponse::NotFound().json(body)
        }
        PublishError::Encode(_) => HttpResponse::InternalServerError().json(body),
        PublishError::Encryption(_) | PublishError::Storage(_) | PublishError::InvalidCiphertext(_) => {
            HttpResponse::BadGateway().json(body)
        }
    }
}

#[derive(Default)]
struct UploadForm {
    title: Option<String>,
    description: Option<String>,
    access: Option<String>,
    file: Option<Upload>,
    thumbnail: Option<Upload>,
}

enum FormError {
    Malformed(String),
    TooLarge,
}

fn field_text(name: &str, bytes: Vec<u8>) -> Result<String, FormError> {
    String::from_utf8(bytes).map_err(|_| FormError::Malformed(format!("{name} is not text")))
}

async fn read_form(mut payload: Multipart) -> Result<UploadForm, FormError> {
    let mut form = UploadForm::default();
    let mut total = 0usize;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| FormError::Malformed(e.to_string()))?;
        let name = field.name().unwrap_or_default().to_string();
        let content_type = field
            .content_type()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let data = chunk.map_err(|e| FormError::Malformed(e.to_string()))?;
            total += data.len();
            if total > MAX_UPLOAD_BYTES {
                return Err(FormError::TooLarge);
            }
            bytes.extend_from_slice(&data);
        }

        match name.as_str() {
            "title" => form.title = Some(field_text(&name, bytes)?),
            "description" => form.description = Some(field_text(&name, bytes)?),
            "access" => form.access = Some(field_text(&name, bytes)?),
            "file" => form.file = Some(Upload { bytes, content_type }),
            "thumbnail" if !bytes.is_empty() => {
                form.thumbnail = Some(Upload { bytes, content_type })
            }
            _ => {}
        }
    }
    Ok(form)
}

/// Encrypts and publishes a file. The caller's verified wallet becomes the
/// record's creator.
#[utoipa::path(
    post,
    path = "/api/content",
    tag = "content",
    request_body(content = String, content_type = "multipart/form-data", description = "Fields: title, description, access (JSON), file, optional thumbnail"),
    params(("X-Wallet-Auth" = String, Header, description = "base64 of the AuthSig JSON")),
    responses(
        (status = 200, description = "Published", body = UploadResponse),
        (status = 400, description = "Missing or invalid form fields"),
        (status = 401, description = "Missing or invalid wallet signature"),
        (status = 413, description = "Upload too large"),
        (status = 502, description = "Storage or encryption network failed")
    )
)]
#[post("/content", wrap = "WalletAuth")]
pub async fn upload_content(
    state: web::Data<AppState>,
    creator: web::ReqData<Address>,
    payload: Multipart,
) -> impl Responder {
    let creator = creator.into_inner();

    let form = match read_form(payload).await {
        Ok(f) => f,
        Err(FormError::TooLarge) => {
            return HttpResponse::PayloadTooLarge().json(json!({ "error": "Upload too large" }))
        }
        Err(FormError::Malformed(e)) => {
            return HttpResponse::BadRequest().json(json!({ "error": e }))
        }
    };

    let Some(title) = form.title.filter(|t| !t.trim().is_empty()) else {
        return HttpResponse::BadRequest().json(json!({ "error": "title is required" }));
    };
    let Some(file) = form.file.filter(|f| !f.bytes.is_empty()) else {
        return HttpResponse::BadRequest().json(json!({ "error": "No file uploaded" }));
    };
    let access = match form.access.as_deref().map(serde_json::from_str::<AccessSpec>) {
        Some(Ok(a)) => a,
        Some(Err(e)) => {
            return HttpResponse::BadRequest().json(json!({ "error": format!("invalid access: {e}") }))
        }
        None => return HttpResponse::BadRequest().json(json!({ "error": "access is required" })),
    };

    let req = PublishRequest {
        title,
        description: form.description.unwrap_or_default(),
        access,
        file,
        thumbnail: form.thumbnail,
        creator,
    };

    match state.publisher.publish(req).await {
        Ok(p) => HttpResponse::Ok().json(UploadResponse {
            metadata_url: state.publisher.gateway_url(&p.metadata_cid),
            metadata_cid: p.metadata_cid,
            encrypted_file_cid: p.encrypted_file_cid,
            thumbnail_cid: p.thumbnail_cid,
        }),
        Err(e) => {
            log::error!("Upload error for {}: {}", creator, e);
            error_response(&e)
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/content/{cid}",
    tag = "content",
    params(("cid" = String, Path, description = "Metadata CID")),
    responses(
        (status = 200, description = "Content record", body = ContentRecord),
        (status = 404, description = "No record under this CID"),
        (status = 502, description = "Gateway failed")
    )
)]
#[get("/content/{cid}")]
pub async fn get_content(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let cid = path.into_inner();
    match state.publisher.fetch_record(&cid).await {
        Ok(record) => HttpResponse::Ok().json(record),
        Err(e) => {
            log::warn!("fetch content {} failed: {}", cid, e);
            error_response(&e)
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/content/{cid}/decrypt",
    tag = "content",
    params(("cid" = String, Path, description = "Metadata CID")),
    request_body = DecryptRequest,
    responses(
        (status = 200, description = "Plaintext", body = DecryptResponse),
        (status = 401, description = "Signature invalid or expired"),
        (status = 403, description = "Access condition not met"),
        (status = 404, description = "No record under this CID")
    )
)]
#[post("/content/{cid}/decrypt")]
pub async fn decrypt_content(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<DecryptRequest>,
) -> impl Responder {
    let cid = path.into_inner();
    match state.publisher.decrypt(&cid, &payload.auth_sig).await {
        Ok(plain) => HttpResponse::Ok().json(DecryptResponse {
            content_type: plain.content_type,
            data: STANDARD.encode(plain.bytes),
        }),
        Err(e) => {
            log::warn!(
                "decrypt {} for {} failed: {}",
                cid,
                payload.auth_sig.address,
                e
            );
            error_response(&e)
        }
    }
}
