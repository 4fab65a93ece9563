//! Transcription gateway: audio bytes in, text out, with the same
//! credential-and-quota degrade policy as the other capabilities.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::TranscriptionConfig;
use crate::error::DebateError;

const MISSING_KEY_TRANSCRIPT: &str =
    "Mock transcription: speech-to-text fallback is active. Provide an OPENAI_API_KEY for real transcriptions.";
const QUOTA_TRANSCRIPT: &str =
    "Mock transcription: transcription quota exceeded. Please wait or configure an alternate provider.";
const MISSING_KEY_WARNING: &str =
    "Transcription credential missing; returning a mock transcript.";
const QUOTA_WARNING: &str = "Transcription quota exhausted; returning a mock transcript.";

/// A transcript plus how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptOutcome {
    pub transcript: String,
    pub degraded: bool,
    pub warning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// The speech-to-text capability.
#[derive(Debug)]
pub struct TranscriptionGateway {
    config: TranscriptionConfig,
    client: Option<reqwest::Client>,
}

impl TranscriptionGateway {
    pub fn new(config: TranscriptionConfig) -> Result<Self, DebateError> {
        let client = if has_credential(&config) {
            Some(
                reqwest::Client::builder()
                    .timeout(Duration::from_secs(config.timeout_secs))
                    .build()
                    .map_err(|e| {
                        DebateError::Config(format!("failed to build HTTP client: {e}"))
                    })?,
            )
        } else {
            None
        };
        Ok(Self { config, client })
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    /// Transcribe an audio upload. An empty upload is a caller error; a
    /// missing credential or exhausted quota yields a labeled mock
    /// transcript; other provider failures propagate.
    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        filename: &str,
    ) -> Result<TranscriptOutcome, DebateError> {
        if audio.is_empty() {
            return Err(DebateError::EmptyAudio);
        }

        let Some(client) = &self.client else {
            debug!("no transcription credential; returning mock transcript");
            return Ok(TranscriptOutcome {
                transcript: MISSING_KEY_TRANSCRIPT.to_string(),
                degraded: true,
                warning: Some(MISSING_KEY_WARNING.to_string()),
            });
        };

        let part = Part::bytes(audio).file_name(filename.to_string());
        let form = Form::new()
            .part("file", part)
            .text("model", self.config.model.clone());

        let response = client
            .post(format!("{}/audio/transcriptions", self.config.api_base))
            .bearer_auth(self.config.api_key.as_deref().unwrap_or_default())
            .multipart(form)
            .send()
            .await
            .map_err(|e| DebateError::CapabilityFailed {
                capability: "transcription",
                detail: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            let body: TranscriptionResponse =
                response
                    .json()
                    .await
                    .map_err(|e| DebateError::CapabilityFailed {
                        capability: "transcription",
                        detail: format!("malformed transcription response: {e}"),
                    })?;
            let transcript = if body.text.trim().is_empty() {
                "No transcript generated.".to_string()
            } else {
                body.text
            };
            return Ok(TranscriptOutcome {
                transcript,
                degraded: false,
                warning: None,
            });
        }

        let detail = response.text().await.unwrap_or_default();
        if quota_shaped(status, &detail) {
            warn!(status = %status, "transcription quota exhausted, degrading");
            return Ok(TranscriptOutcome {
                transcript: QUOTA_TRANSCRIPT.to_string(),
                degraded: true,
                warning: Some(QUOTA_WARNING.to_string()),
            });
        }

        Err(DebateError::CapabilityFailed {
            capability: "transcription",
            detail: format!("{status}: {}", truncate_detail(&detail)),
        })
    }
}

fn has_credential(config: &TranscriptionConfig) -> bool {
    config
        .api_key
        .as_deref()
        .is_some_and(|key| !key.trim().is_empty())
}

/// Quota exhaustion, rate limiting and revoked keys degrade; other
/// statuses are hard failures.
fn quota_shaped(status: StatusCode, body: &str) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::UNAUTHORIZED
        || body.contains("insufficient_quota")
}

fn truncate_detail(detail: &str) -> &str {
    let end = detail
        .char_indices()
        .nth(200)
        .map_or(detail.len(), |(i, _)| i);
    &detail[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TranscriptionConfig;

    fn degraded_gateway() -> TranscriptionGateway {
        TranscriptionGateway::new(TranscriptionConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn empty_audio_is_a_caller_error() {
        let result = degraded_gateway().transcribe(Vec::new(), "clip.webm").await;
        assert!(matches!(result, Err(DebateError::EmptyAudio)));
    }

    #[tokio::test]
    async fn missing_credential_returns_labeled_mock() {
        let gateway = degraded_gateway();
        assert!(!gateway.is_configured());

        let outcome = gateway.transcribe(vec![1, 2, 3], "clip.webm").await.unwrap();
        assert!(outcome.degraded);
        assert!(outcome.transcript.starts_with("Mock transcription"));
        assert!(outcome.warning.is_some());
    }

    #[test]
    fn blank_credential_counts_as_absent() {
        let config = TranscriptionConfig {
            api_key: Some("   ".to_string()),
            ..TranscriptionConfig::default()
        };
        assert!(!TranscriptionGateway::new(config).unwrap().is_configured());
    }

    #[test]
    fn quota_classification() {
        assert!(quota_shaped(StatusCode::TOO_MANY_REQUESTS, ""));
        assert!(quota_shaped(StatusCode::UNAUTHORIZED, ""));
        assert!(quota_shaped(
            StatusCode::FORBIDDEN,
            r#"{"error":{"code":"insufficient_quota"}}"#
        ));
        assert!(!quota_shaped(StatusCode::INTERNAL_SERVER_ERROR, "boom"));
    }
}
