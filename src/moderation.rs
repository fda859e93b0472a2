// src/moderation.rs
//
// Upload moderation. Classifier failures are replaced by a fallback verdict
// chosen by `OnFailure`; with the default `Approve` an unreachable classifier
// never blocks an upload.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::config::DEFAULT_NSFW_THRESHOLD;
use crate::rapidapi::{Classifier, ImageModeration, RapidApiError, SpamCheck, TextModeration};

/// What to assume when a classifier call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    Approve,
    Reject,
}

impl FromStr for OnFailure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "approve" => Ok(OnFailure::Approve),
            "reject" => Ok(OnFailure::Reject),
            other => Err(format!("expected approve or reject, got {other}")),
        }
    }
}

impl fmt::Display for OnFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OnFailure::Approve => "approve",
            OnFailure::Reject => "reject",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Text,
    Video,
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaKind::Image),
            "text" => Ok(MediaKind::Text),
            "video" => Ok(MediaKind::Video),
            other => Err(format!("unknown media type {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub approved: bool,
    /// Raw classifier output, merged for text.
    pub result: Value,
}

pub struct Moderator {
    classifier: Arc<dyn Classifier>,
    nsfw_threshold: f64,
    on_failure: OnFailure,
}

impl Moderator {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            classifier,
            nsfw_threshold: DEFAULT_NSFW_THRESHOLD,
            on_failure: OnFailure::Approve,
        }
    }

    pub fn with_threshold(mut self, nsfw_threshold: f64) -> Self {
        self.nsfw_threshold = nsfw_threshold;
        self
    }

    pub fn with_on_failure(mut self, on_failure: OnFailure) -> Self {
        self.on_failure = on_failure;
        self
    }

    pub fn on_failure(&self) -> OnFailure {
        self.on_failure
    }

    /// Images and videos are classified by URL (for video, its thumbnail);
    /// text is checked for moderation and spam concurrently.
    pub async fn classify(&self, kind: MediaKind, content: &str) -> Verdict {
        match kind {
            MediaKind::Image | MediaKind::Video => {
                let outcome = self.classifier.moderate_content(content).await;
                let m = self.settle("content moderation", outcome, || ImageModeration {
                    is_appropriate: false,
                    nsfw_score: 1.0,
                    ..Default::default()
                });
                Verdict {
                    approved: m.is_appropriate && m.nsfw_score < self.nsfw_threshold,
                    result: json!(m),
                }
            }
            MediaKind::Text => {
                let (text, spam) = tokio::join!(
                    self.classifier.moderate_text(content),
                    self.classifier.detect_spam(content),
                );
                let text = self.settle("text moderation", text, || TextModeration {
                    is_clean: false,
                    score: 0.0,
                    ..Default::default()
                });
                let spam = self.settle("spam detection", spam, || SpamCheck {
                    is_spam: true,
                    ..Default::default()
                });

                let mut result = json!(text);
                result["isSpam"] = json!(spam.is_spam);
                result["spamConfidence"] = json!(spam.confidence);
                Verdict {
                    approved: text.is_clean && !spam.is_spam,
                    result,
                }
            }
        }
    }

    fn settle<T: Default>(
        &self,
        what: &str,
        outcome: Result<T, RapidApiError>,
        restrictive: impl FnOnce() -> T,
    ) -> T {
        match outcome {
            Ok(v) => v,
            Err(e) => {
                log::warn!("{} failed ({}), falling back to {}", what, e, self.on_failure);
                match self.on_failure {
                    OnFailure::Approve => T::default(),
                    OnFailure::Reject => restrictive(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Fixed {
        image: Option<ImageModeration>,
        text: Option<TextModeration>,
        spam: Option<SpamCheck>,
    }

    fn down() -> RapidApiError {
        RapidApiError::NotConfigured
    }

    #[async_trait]
    impl Classifier for Fixed {
        async fn moderate_content(&self, _url: &str) -> Result<ImageModeration, RapidApiError> {
            self.image.clone().ok_or_else(down)
        }
        async fn moderate_text(&self, _text: &str) -> Result<TextModeration, RapidApiError> {
            self.text.clone().ok_or_else(down)
        }
        async fn detect_spam(&self, _content: &str) -> Result<SpamCheck, RapidApiError> {
            self.spam.clone().ok_or_else(down)
        }
    }

    fn image(score: f64, appropriate: bool) -> Moderator {
        Moderator::new(Arc::new(Fixed {
            image: Some(ImageModeration {
                is_appropriate: appropriate,
                nsfw_score: score,
                ..Default::default()
            }),
            text: None,
            spam: None,
        }))
    }

    #[tokio::test]
    async fn nsfw_threshold_is_strict() {
        assert!(!image(0.9, true).classify(MediaKind::Image, "u").await.approved);
        assert!(!image(0.7, true).classify(MediaKind::Image, "u").await.approved);
        assert!(image(0.69, true).classify(MediaKind::Image, "u").await.approved);
        assert!(!image(0.1, false).classify(MediaKind::Video, "u").await.approved);
    }

    #[tokio::test]
    async fn threshold_is_configurable() {
        let m = image(0.5, true).with_threshold(0.4);
        assert!(!m.classify(MediaKind::Image, "u").await.approved);
    }

    #[tokio::test]
    async fn failing_classifier_fails_open() {
        let m = Moderator::new(Arc::new(Fixed {
            image: None,
            text: None,
            spam: None,
        }));
        let v = m.classify(MediaKind::Text, "buy cheap followers now").await;
        assert!(v.approved);
        assert_eq!(v.result["isSpam"], false);
        assert!(m.classify(MediaKind::Image, "u").await.approved);
    }

    #[tokio::test]
    async fn reject_policy_fails_closed() {
        let m = Moderator::new(Arc::new(Fixed {
            image: None,
            text: None,
            spam: None,
        }))
        .with_on_failure(OnFailure::Reject);
        assert!(!m.classify(MediaKind::Text, "hello").await.approved);
        assert!(!m.classify(MediaKind::Image, "u").await.approved);
    }

    #[tokio::test]
    async fn spam_alone_rejects_clean_text() {
        let m = Moderator::new(Arc::new(Fixed {
            image: None,
            text: Some(TextModeration::default()),
            spam: Some(SpamCheck {
                is_spam: true,
                confidence: 0.98,
                reasons: vec!["promotional".into()],
            }),
        }));
        let v = m.classify(MediaKind::Text, "buy cheap followers now").await;
        assert!(!v.approved);
        assert_eq!(v.result["isClean"], true);
        assert_eq!(v.result["spamConfidence"], 0.98);
    }

    #[test]
    fn on_failure_parses() {
        assert_eq!("Reject".parse::<OnFailure>().unwrap(), OnFailure::Reject);
        assert!("maybe".parse::<OnFailure>().is_err());
    }
}
