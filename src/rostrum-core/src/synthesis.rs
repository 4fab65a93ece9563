//! Synthesis gateway: renders a speech to audio through a remote voice
//! provider, or hands the prepared text back for client-side synthesis when
//! the provider is unavailable.
//!
//! Input text is normalized first (pacing markers become punctuation) and
//! capped to the provider's payload limit; the cap is lossy, so the
//! truncation is flagged on the result rather than hidden.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::SynthesisConfig;
use crate::error::DebateError;
use crate::pacing::normalize_for_speech;

const MISSING_KEY_WARNING: &str =
    "Voice credential missing; using client-side speech synthesis. Set ELEVENLABS_API_KEY to enable voice rendering.";
const REJECTED_KEY_WARNING: &str =
    "Voice credential rejected (401). Check the key and its permissions; using client-side speech synthesis.";
const QUOTA_WARNING: &str =
    "Voice quota exhausted; using client-side speech synthesis until the provider recovers.";

/// How the speech ended up being rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechKind {
    /// Audio was rendered and stored; `audio_url` points at it.
    File,
    /// No audio; the caller speaks `text` itself.
    Text,
}

/// Result of a synthesis request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechRendering {
    #[serde(rename = "type")]
    pub kind: SpeechKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// The normalized text actually submitted for (or offered to) speech.
    pub text_for_speech: String,
    /// True when the submitted payload was cut at the provider cap.
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

#[derive(Serialize)]
struct VoiceRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

/// The text-to-speech capability.
#[derive(Debug)]
pub struct SynthesisGateway {
    config: SynthesisConfig,
    client: Option<reqwest::Client>,
}

impl SynthesisGateway {
    pub fn new(config: SynthesisConfig) -> Result<Self, DebateError> {
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

    /// Render `text` to speech. Blank text is a caller error; missing,
    /// rejected or exhausted credentials degrade to the text fallback;
    /// other provider failures propagate.
    pub async fn speak(&self, text: &str) -> Result<SpeechRendering, DebateError> {
        let prepared = normalize_for_speech(text);
        if prepared.is_empty() {
            return Err(DebateError::BlankField { field: "text" });
        }

        let (payload, truncated) = cap_payload(&prepared, self.config.max_chars);
        if truncated {
            debug!(cap = self.config.max_chars, "speech payload truncated");
        }

        let Some(client) = &self.client else {
            return Ok(text_fallback(prepared, truncated, MISSING_KEY_WARNING));
        };

        let body = VoiceRequest {
            text: &payload,
            model_id: &self.config.model_id,
            voice_settings: VoiceSettings {
                stability: self.config.stability,
                similarity_boost: self.config.similarity_boost,
                style: self.config.style,
                use_speaker_boost: self.config.use_speaker_boost,
            },
        };

        let response = client
            .post(format!(
                "{}/v1/text-to-speech/{}",
                self.config.api_base, self.config.voice_id
            ))
            .header("xi-api-key", self.config.api_key.as_deref().unwrap_or_default())
            .header(ACCEPT, "audio/mpeg")
            .json(&body)
            .send()
            .await
            .map_err(|e| DebateError::CapabilityFailed {
                capability: "synthesis",
                detail: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| DebateError::CapabilityFailed {
                    capability: "synthesis",
                    detail: e.to_string(),
                })?;
            let audio_url = self.store_audio(&bytes).await?;
            return Ok(SpeechRendering {
                kind: SpeechKind::File,
                audio_url: Some(audio_url),
                text: None,
                text_for_speech: prepared,
                truncated,
                warning: None,
            });
        }

        let detail = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED => {
                warn!("voice credential rejected, degrading to text");
                Ok(text_fallback(prepared, truncated, REJECTED_KEY_WARNING))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("voice quota exhausted, degrading to text");
                Ok(text_fallback(prepared, truncated, QUOTA_WARNING))
            }
            _ => Err(DebateError::CapabilityFailed {
                capability: "synthesis",
                detail: format!("{status}: {}", truncate_detail(&detail)),
            }),
        }
    }

    async fn store_audio(&self, bytes: &[u8]) -> Result<String, DebateError> {
        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .map_err(|e| DebateError::CapabilityFailed {
                capability: "synthesis",
                detail: format!("failed to create audio dir: {e}"),
            })?;
        let filename = format!("ai-speech-{}.mp3", Utc::now().timestamp_millis());
        let path = Path::new(&self.config.output_dir).join(&filename);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| DebateError::CapabilityFailed {
                capability: "synthesis",
                detail: format!("failed to write audio file: {e}"),
            })?;
        Ok(format!(
            "{}/{}",
            self.config.public_prefix.trim_end_matches('/'),
            filename
        ))
    }
}

fn has_credential(config: &SynthesisConfig) -> bool {
    config
        .api_key
        .as_deref()
        .is_some_and(|key| !key.trim().is_empty())
}

fn text_fallback(prepared: String, truncated: bool, warning: &str) -> SpeechRendering {
    SpeechRendering {
        kind: SpeechKind::Text,
        audio_url: None,
        text: Some(prepared.clone()),
        text_for_speech: prepared,
        truncated,
        warning: Some(warning.to_string()),
    }
}

/// Cut the payload at the provider cap on a character boundary, marking the
/// cut with an ellipsis.
fn cap_payload(prepared: &str, cap: usize) -> (String, bool) {
    if prepared.chars().count() <= cap {
        return (prepared.to_string(), false);
    }
    let mut capped: String = prepared.chars().take(cap).collect();
    capped.push_str("...");
    (capped, true)
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
    use crate::config::SynthesisConfig;

    fn degraded_gateway() -> SynthesisGateway {
        SynthesisGateway::new(SynthesisConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn blank_text_is_a_caller_error() {
        let result = degraded_gateway().speak("   ").await;
        assert!(matches!(
            result,
            Err(DebateError::BlankField { field: "text" })
        ));
    }

    #[tokio::test]
    async fn missing_credential_returns_text_fallback() {
        let outcome = degraded_gateway()
            .speak("A [[PAUSE_SHORT]] B [[PAUSE_LONG]] C")
            .await
            .unwrap();

        assert_eq!(outcome.kind, SpeechKind::Text);
        assert_eq!(outcome.text.as_deref(), Some("A, B. C"));
        assert_eq!(outcome.text_for_speech, "A, B. C");
        assert!(!outcome.truncated);
        assert!(outcome.warning.unwrap().contains("ELEVENLABS_API_KEY"));
    }

    #[tokio::test]
    async fn long_speeches_are_capped_with_a_visible_flag() {
        let config = SynthesisConfig {
            max_chars: 20,
            ..SynthesisConfig::default()
        };
        let gateway = SynthesisGateway::new(config).unwrap();
        let outcome = gateway
            .speak("word ".repeat(50).as_str())
            .await
            .unwrap();

        assert!(outcome.truncated);
        // The full prepared text is still handed back for client synthesis.
        assert!(outcome.text_for_speech.len() > 20);
    }

    #[test]
    fn cap_respects_character_boundaries() {
        let (capped, truncated) = cap_payload("ééééé", 3);
        assert!(truncated);
        assert_eq!(capped, "ééé...");

        let (whole, truncated) = cap_payload("short", 10);
        assert!(!truncated);
        assert_eq!(whole, "short");
    }

    #[test]
    fn rendering_serializes_with_the_wire_field_names() {
        let rendering = text_fallback("hello".to_string(), false, "warned");
        let json = serde_json::to_value(&rendering).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["textForSpeech"], "hello");
        assert_eq!(json["truncated"], false);
        assert!(json.get("audioUrl").is_none());
    }
}
