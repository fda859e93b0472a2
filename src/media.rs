// src/media.rs

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use utoipa::ToSchema;

use crate::moderation::MediaKind;
use crate::rapidapi::{CompressOptions, MediaProcessor, RapidApiError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MediaOperation {
    Analyze,
    Compress,
    Thumbnail,
}

impl FromStr for MediaOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "analyze" => Ok(MediaOperation::Analyze),
            "compress" => Ok(MediaOperation::Compress),
            "thumbnail" => Ok(MediaOperation::Thumbnail),
            other => Err(format!("unknown operation {other}")),
        }
    }
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0}")]
    Unsupported(&'static str),
    #[error(transparent)]
    Upstream(#[from] RapidApiError),
}

/// Runs `operation` on the media at `url`.
///
/// Image analysis merges analysis and face detection, each falling back to an
/// empty result. Compression and video processing propagate failures.
pub async fn process(
    processor: &dyn MediaProcessor,
    kind: MediaKind,
    operation: MediaOperation,
    url: &str,
) -> Result<Value, MediaError> {
    match (operation, kind) {
        (MediaOperation::Analyze, MediaKind::Image) => {
            let (analysis, faces) =
                tokio::join!(processor.analyze_image(url), processor.detect_faces(url));
            let analysis = analysis.unwrap_or_else(|e| {
                log::warn!("image analysis failed for {}: {}", url, e);
                Default::default()
            });
            let faces = faces.unwrap_or_else(|e| {
                log::warn!("face detection failed for {}: {}", url, e);
                Default::default()
            });

            let mut merged = json!(analysis);
            if let (Some(target), Value::Object(extra)) = (merged.as_object_mut(), json!(faces)) {
                target.extend(extra);
            }
            Ok(merged)
        }
        (MediaOperation::Analyze, MediaKind::Video)
        | (MediaOperation::Thumbnail, MediaKind::Video) => {
            Ok(json!(processor.process_video(url).await?))
        }
        (MediaOperation::Compress, MediaKind::Image) => Ok(json!(
            processor
                .compress_image(url, &CompressOptions::default())
                .await?
        )),
        (MediaOperation::Compress, _) => Err(MediaError::Unsupported(
            "Compression only available for images",
        )),
        (MediaOperation::Thumbnail, _) => Err(MediaError::Unsupported(
            "Thumbnail generation only available for videos",
        )),
        (MediaOperation::Analyze, MediaKind::Text) => Err(MediaError::Unsupported(
            "Analysis only available for images and videos",
        )),
    }
}
