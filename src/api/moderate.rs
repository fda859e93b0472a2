// src/api/moderate.rs

use actix_web::{post, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::media::{self, MediaError, MediaOperation};
use crate::moderation::MediaKind;
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ModerateRequest {
    /// `image`, `text` or `video`
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// URL for image/video, the text itself for text
    pub content: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProcessMediaRequest {
    /// `image` or `video`
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub url: Option<String>,
    /// `analyze`, `compress` or `thumbnail`
    pub operation: Option<String>,
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[utoipa::path(
    post,
    path = "/api/moderate",
    tag = "moderation",
    request_body = ModerateRequest,
    responses(
        (status = 200, description = "{approved, result, timestamp}"),
        (status = 400, description = "Missing fields or unknown type")
    )
)]
#[post("/moderate")]
pub async fn moderate(
    state: web::Data<AppState>,
    payload: web::Json<ModerateRequest>,
) -> impl Responder {
    let (Some(kind), Some(content)) = (non_empty(&payload.kind), non_empty(&payload.content)) else {
        return HttpResponse::BadRequest().json(json!({ "error": "Missing type or content" }));
    };
    let Ok(kind) = kind.parse::<MediaKind>() else {
        return HttpResponse::BadRequest().json(json!({ "error": "Invalid moderation type" }));
    };

    let verdict = state.moderator.classify(kind, content).await;
    if !verdict.approved {
        log::info!("moderation rejected {:?} content", kind);
    }

    HttpResponse::Ok().json(json!({
        "approved": verdict.approved,
        "result": verdict.result,
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/process-media",
    tag = "moderation",
    request_body = ProcessMediaRequest,
    responses(
        (status = 200, description = "{success, result, timestamp}"),
        (status = 400, description = "Missing fields or operation not valid for the type"),
        (status = 500, description = "Media service failed")
    )
)]
#[post("/process-media")]
pub async fn process_media(
    state: web::Data<AppState>,
    payload: web::Json<ProcessMediaRequest>,
) -> impl Responder {
    let (Some(kind), Some(url)) = (non_empty(&payload.kind), non_empty(&payload.url)) else {
        return HttpResponse::BadRequest().json(json!({ "error": "Missing type or url" }));
    };
    let kind = match kind.parse::<MediaKind>() {
        Ok(k @ (MediaKind::Image | MediaKind::Video)) => k,
        _ => return HttpResponse::BadRequest().json(json!({ "error": "Invalid media type" })),
    };
    let Some(operation) = non_empty(&payload.operation).and_then(|o| o.parse::<MediaOperation>().ok())
    else {
        return HttpResponse::BadRequest().json(json!({ "error": "Invalid operation" }));
    };

    match media::process(state.media.as_ref(), kind, operation, url).await {
        Ok(result) => HttpResponse::Ok().json(json!({
            "success": true,
            "result": result,
            "timestamp": chrono::Utc::now().timestamp_millis(),
        })),
        Err(MediaError::Unsupported(reason)) => {
            HttpResponse::BadRequest().json(json!({ "error": reason }))
        }
        Err(MediaError::Upstream(e)) => {
            log::error!("Media processing error ({:?} {:?} {}): {}", kind, operation, url, e);
            HttpResponse::InternalServerError().json(json!({
                "error": "Media processing failed"
            }))
        }
    }
}
