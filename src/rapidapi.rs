// src/rapidapi.rs
//
// Client for the RapidAPI classifiers and media helpers. Every call is a
// JSON request to `https://<host><endpoint>` with the X-RapidAPI-Key and
// X-RapidAPI-Host headers. Missing or null response fields take the
// documented defaults. Whether a failed call is tolerated is decided by the
// caller.

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub const CONTENT_MODERATION_HOST: &str = "content-moderation2.p.rapidapi.com";
pub const TEXT_MODERATION_HOST: &str = "text-moderation1.p.rapidapi.com";
pub const SPAM_DETECTION_HOST: &str = "spam-detection1.p.rapidapi.com";
pub const IMAGE_ANALYSIS_HOST: &str = "image-analysis1.p.rapidapi.com";
pub const FACE_DETECTION_HOST: &str = "face-detection6.p.rapidapi.com";
pub const VIDEO_PROCESSING_HOST: &str = "video-processing1.p.rapidapi.com";
pub const IMAGE_COMPRESSION_HOST: &str = "image-compression1.p.rapidapi.com";
pub const EMAIL_VALIDATION_HOST: &str = "email-validator8.p.rapidapi.com";
pub const SCREENSHOT_HOST: &str = "website-screenshot6.p.rapidapi.com";

#[derive(Debug, Error)]
pub enum RapidApiError {
    #[error("RapidAPI key not configured")]
    NotConfigured,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{host} returned status={status} body={body}")]
    Api {
        host: &'static str,
        status: u16,
        body: String,
    },
    #[error("{host} returned an unexpected body: {reason}")]
    InvalidResponse { host: &'static str, reason: String },
}

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

/// Parses a response body, treating `null` members like absent ones so
/// they fall back to the field defaults.
pub fn parse_response<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    let mut value: Value = serde_json::from_str(text)?;
    strip_nulls(&mut value);
    serde_json::from_value(value)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageModeration {
    pub is_appropriate: bool,
    pub nsfw_score: f64,
    pub violence_score: f64,
    pub categories: Vec<String>,
}

impl Default for ImageModeration {
    fn default() -> Self {
        Self {
            is_appropriate: true,
            nsfw_score: 0.0,
            violence_score: 0.0,
            categories: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextModeration {
    pub is_clean: bool,
    pub has_profanity: bool,
    pub has_hate_speech: bool,
    pub has_spam: bool,
    pub score: f64,
    pub flagged_words: Vec<String>,
}

impl Default for TextModeration {
    fn default() -> Self {
        Self {
            is_clean: true,
            has_profanity: false,
            has_hate_speech: false,
            has_spam: false,
            score: 1.0,
            flagged_words: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpamCheck {
    pub is_spam: bool,
    pub confidence: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageAnalysis {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub has_faces: bool,
    pub objects: Vec<String>,
    pub colors: Vec<String>,
}

impl Default for ImageAnalysis {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            format: "unknown".to_string(),
            has_faces: false,
            objects: Vec::new(),
            colors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FaceBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FaceDetection {
    pub face_count: u32,
    pub faces: Vec<FaceBox>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoInfo {
    pub duration: f64,
    pub thumbnail_url: String,
    pub width: u32,
    pub height: u32,
    pub format: String,
}

impl Default for VideoInfo {
    fn default() -> Self {
        Self {
            duration: 0.0,
            thumbnail_url: String::new(),
            width: 0,
            height: 0,
            format: "unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressedImage {
    pub compressed_url: String,
    #[serde(default)]
    pub original_size: u64,
    #[serde(default)]
    pub compressed_size: u64,
    #[serde(default)]
    pub compression_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompressOptions {
    pub quality: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub format: String,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            quality: 85,
            width: None,
            height: None,
            format: "webp".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailValidation {
    pub is_valid: bool,
    pub is_disposable: bool,
    pub is_role: bool,
    pub suggestion: Option<String>,
}

impl Default for EmailValidation {
    fn default() -> Self {
        Self {
            is_valid: true,
            is_disposable: false,
            is_role: false,
            suggestion: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Screenshot {
    pub screenshot_url: String,
    pub width: u32,
    pub height: u32,
}

impl Default for Screenshot {
    fn default() -> Self {
        Self {
            screenshot_url: String::new(),
            width: 1920,
            height: 1080,
        }
    }
}

/// Content classifiers used by moderation.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn moderate_content(&self, url: &str) -> Result<ImageModeration, RapidApiError>;
    async fn moderate_text(&self, text: &str) -> Result<TextModeration, RapidApiError>;
    async fn detect_spam(&self, content: &str) -> Result<SpamCheck, RapidApiError>;
}

/// Media inspection and transformation.
#[async_trait]
pub trait MediaProcessor: Send + Sync {
    async fn analyze_image(&self, url: &str) -> Result<ImageAnalysis, RapidApiError>;
    async fn detect_faces(&self, url: &str) -> Result<FaceDetection, RapidApiError>;
    async fn process_video(&self, url: &str) -> Result<VideoInfo, RapidApiError>;
    async fn compress_image(
        &self,
        url: &str,
        options: &CompressOptions,
    ) -> Result<CompressedImage, RapidApiError>;
}

#[derive(Clone)]
pub struct RapidApiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: Option<String>,
}

impl RapidApiClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: None,
        }
    }

    /// Sends every request to `base_url` instead of the per-service host.
    /// The host header is still set.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    fn url(&self, host: &str, endpoint: &str) -> String {
        match &self.base_url {
            Some(base) => format!("{base}{endpoint}"),
            None => format!("https://{host}{endpoint}"),
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        host: &'static str,
        endpoint: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<T, RapidApiError> {
        let api_key = self.api_key.as_deref().ok_or(RapidApiError::NotConfigured)?;

        let mut req = self
            .http
            .request(method, self.url(host, endpoint))
            .header("X-RapidAPI-Key", api_key)
            .header("X-RapidAPI-Host", host);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            log::error!("RapidAPI error [{}]: status={} body={}", host, status, text);
            return Err(RapidApiError::Api {
                host,
                status: status.as_u16(),
                body: text,
            });
        }

        parse_response(&text).map_err(|e| RapidApiError::InvalidResponse {
            host,
            reason: e.to_string(),
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        host: &'static str,
        endpoint: &str,
        body: Value,
    ) -> Result<T, RapidApiError> {
        self.request(Method::POST, host, endpoint, &[], Some(body))
            .await
    }

    pub async fn validate_email(&self, email: &str) -> Result<EmailValidation, RapidApiError> {
        self.request(
            Method::GET,
            EMAIL_VALIDATION_HOST,
            "/validate",
            &[("email", email.to_string())],
            None,
        )
        .await
    }

    pub async fn capture_screenshot(&self, url: &str) -> Result<Screenshot, RapidApiError> {
        self.request(
            Method::GET,
            SCREENSHOT_HOST,
            "/screenshot",
            &[
                ("url", url.to_string()),
                ("width", "1920".to_string()),
                ("height", "1080".to_string()),
            ],
            None,
        )
        .await
    }
}

#[async_trait]
impl Classifier for RapidApiClient {
    async fn moderate_content(&self, url: &str) -> Result<ImageModeration, RapidApiError> {
        self.post(CONTENT_MODERATION_HOST, "/moderate", json!({ "url": url }))
            .await
    }

    async fn moderate_text(&self, text: &str) -> Result<TextModeration, RapidApiError> {
        self.post(TEXT_MODERATION_HOST, "/moderate", json!({ "text": text }))
            .await
    }

    async fn detect_spam(&self, content: &str) -> Result<SpamCheck, RapidApiError> {
        self.post(SPAM_DETECTION_HOST, "/detect", json!({ "content": content }))
            .await
    }
}

#[async_trait]
impl MediaProcessor for RapidApiClient {
    async fn analyze_image(&self, url: &str) -> Result<ImageAnalysis, RapidApiError> {
        self.post(IMAGE_ANALYSIS_HOST, "/analyze", json!({ "url": url }))
            .await
    }

    async fn detect_faces(&self, url: &str) -> Result<FaceDetection, RapidApiError> {
        self.post(FACE_DETECTION_HOST, "/detect", json!({ "url": url }))
            .await
    }

    async fn process_video(&self, url: &str) -> Result<VideoInfo, RapidApiError> {
        self.post(
            VIDEO_PROCESSING_HOST,
            "/process",
            json!({ "url": url, "generateThumbnail": true }),
        )
        .await
    }

    async fn compress_image(
        &self,
        url: &str,
        options: &CompressOptions,
    ) -> Result<CompressedImage, RapidApiError> {
        let mut body = serde_json::to_value(options).map_err(|e| {
            RapidApiError::InvalidResponse {
                host: IMAGE_COMPRESSION_HOST,
                reason: e.to_string(),
            }
        })?;
        body["url"] = json!(url);
        self.post(IMAGE_COMPRESSION_HOST, "/compress", body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn partial_bodies_take_defaults() {
        let m: ImageModeration = serde_json::from_str(r#"{"nsfwScore":0.2}"#).unwrap();
        assert!(m.is_appropriate);
        assert_eq!(m.nsfw_score, 0.2);

        let t: TextModeration = serde_json::from_str("{}").unwrap();
        assert!(t.is_clean);
        assert_eq!(t.score, 1.0);

        let a: ImageAnalysis = serde_json::from_str(r#"{"width":640}"#).unwrap();
        assert_eq!(a.format, "unknown");
        assert_eq!(a.width, 640);
    }

    #[test]
    fn null_fields_take_defaults() {
        let m: ImageModeration =
            parse_response(r#"{"isAppropriate":false,"nsfwScore":null}"#).unwrap();
        assert!(!m.is_appropriate);
        assert_eq!(m.nsfw_score, 0.0);

        let m: ImageModeration =
            parse_response(r#"{"isAppropriate":null,"categories":null}"#).unwrap();
        assert!(m.is_appropriate);
        assert!(m.categories.is_empty());

        let v: VideoInfo =
            parse_response(r#"{"duration":12.5,"format":null,"thumbnailUrl":null}"#).unwrap();
        assert_eq!(v.format, "unknown");
        assert_eq!(v.thumbnail_url, "");
    }

    #[tokio::test]
    async fn null_score_with_inappropriate_flag_is_rejected() {
        use crate::moderation::{MediaKind, Moderator};
        use std::sync::Arc;

        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/moderate");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"isAppropriate":false,"nsfwScore":null}"#);
        });

        let client = RapidApiClient::new(Some("k".into())).with_base_url(server.base_url());
        let verdict = Moderator::new(Arc::new(client))
            .classify(MediaKind::Image, "https://img.example/2.png")
            .await;

        assert!(!verdict.approved);
        assert_eq!(verdict.result["isAppropriate"], false);
        assert_eq!(verdict.result["nsfwScore"], 0.0);
    }

    #[tokio::test]
    async fn sends_rapidapi_headers() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/moderate")
                .header("X-RapidAPI-Key", "key-1")
                .header("X-RapidAPI-Host", CONTENT_MODERATION_HOST)
                .json_body(json!({ "url": "https://img.example/1.png" }));
            then.status(200)
                .json_body(json!({ "isAppropriate": false, "nsfwScore": 0.95 }));
        });

        let client = RapidApiClient::new(Some("key-1".into())).with_base_url(server.base_url());
        let result = client
            .moderate_content("https://img.example/1.png")
            .await
            .unwrap();

        mock.assert();
        assert!(!result.is_appropriate);
        assert_eq!(result.nsfw_score, 0.95);
    }

    #[tokio::test]
    async fn upstream_error_names_host() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/detect");
            then.status(503).body("down");
        });

        let client = RapidApiClient::new(Some("k".into())).with_base_url(server.base_url());
        let err = client.detect_spam("hello").await.unwrap_err();
        match err {
            RapidApiError::Api { host, status, .. } => {
                assert_eq!(host, SPAM_DETECTION_HOST);
                assert_eq!(status, 503);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_key_fails_without_request() {
        let client = RapidApiClient::new(None).with_base_url("http://127.0.0.1:9");
        assert!(matches!(
            client.moderate_text("hi").await,
            Err(RapidApiError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn email_validation_uses_query() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/validate")
                .query_param("email", "a@b.io");
            then.status(200)
                .json_body(json!({ "isValid": true, "isDisposable": true }));
        });

        let client = RapidApiClient::new(Some("k".into())).with_base_url(server.base_url());
        let v = client.validate_email("a@b.io").await.unwrap();
        mock.assert();
        assert!(v.is_disposable);
        assert_eq!(v.suggestion, None);
    }
}
