//! Runtime configuration for the gateways and storage paths.
//!
//! Credentials are resolved once, when the configuration is loaded, and
//! injected into each gateway at construction. Nothing in the engine reads
//! the environment per call: a gateway built without a credential stays in
//! degraded mode for its whole lifetime.

use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::DebateError;

/// Root configuration, loadable from TOML with environment overrides.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Settings for the text-generation gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_openai_base")]
    pub api_base: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

/// Settings for the speech-transcription gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TranscriptionConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_openai_base")]
    pub api_base: String,
    #[serde(default = "default_transcription_model")]
    pub model: String,
    #[serde(default = "default_transcription_timeout")]
    pub timeout_secs: u64,
}

/// Settings for the voice-synthesis gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SynthesisConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_voice_base")]
    pub api_base: String,
    #[serde(default = "default_voice_id")]
    pub voice_id: String,
    #[serde(default = "default_voice_model")]
    pub model_id: String,
    #[serde(default = "default_stability")]
    pub stability: f32,
    #[serde(default = "default_similarity")]
    pub similarity_boost: f32,
    #[serde(default = "default_style")]
    pub style: f32,
    #[serde(default = "default_speaker_boost")]
    pub use_speaker_boost: bool,
    #[serde(default = "default_synthesis_timeout")]
    pub timeout_secs: u64,
    /// Upstream payload cap; longer text is truncated with an ellipsis.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_audio_dir")]
    pub output_dir: String,
    /// URL prefix under which the server exposes `output_dir`.
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,
}

/// On-disk locations for the turn ledger, feedback data and audio files.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: String,
    #[serde(default = "default_ledger_file")]
    pub ledger_file: String,
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_generation_timeout() -> u64 {
    120
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_transcription_timeout() -> u64 {
    30
}

fn default_voice_base() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_voice_id() -> String {
    "21m00Tcm4TlvDq8ikWAM".to_string()
}

fn default_voice_model() -> String {
    "eleven_turbo_v2_5".to_string()
}

fn default_stability() -> f32 {
    0.38
}

fn default_similarity() -> f32 {
    0.9
}

fn default_style() -> f32 {
    0.65
}

fn default_speaker_boost() -> bool {
    true
}

fn default_synthesis_timeout() -> u64 {
    20
}

fn default_max_chars() -> usize {
    4800
}

fn default_audio_dir() -> String {
    "sessions/ai".to_string()
}

fn default_public_prefix() -> String {
    "/sessions/ai".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_sessions_dir() -> String {
    "sessions".to_string()
}

fn default_ledger_file() -> String {
    "turn-ledger.jsonl".to_string()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_openai_base(),
            model: default_generation_model(),
            temperature: default_temperature(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_openai_base(),
            model: default_transcription_model(),
            timeout_secs: default_transcription_timeout(),
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_voice_base(),
            voice_id: default_voice_id(),
            model_id: default_voice_model(),
            stability: default_stability(),
            similarity_boost: default_similarity(),
            style: default_style(),
            use_speaker_boost: default_speaker_boost(),
            timeout_secs: default_synthesis_timeout(),
            max_chars: default_max_chars(),
            output_dir: default_audio_dir(),
            public_prefix: default_public_prefix(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            sessions_dir: default_sessions_dir(),
            ledger_file: default_ledger_file(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DebateError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| DebateError::Config(format!("failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, DebateError> {
        toml::from_str(content)
            .map_err(|e| DebateError::Config(format!("failed to parse config: {e}")))
    }

    /// Build a configuration from defaults plus environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay credentials and tuning values from the environment.
    ///
    /// Empty variables count as absent so a blank `OPENAI_API_KEY=` in a
    /// `.env` file does not flip a gateway into configured mode.
    pub fn apply_env(&mut self) {
        if let Some(key) = env_string("OPENAI_API_KEY") {
            self.generation.api_key = Some(key.clone());
            self.transcription.api_key = Some(key);
        }
        if let Some(base) = env_string("OPENAI_API_BASE").or_else(|| env_string("OPENAI_BASE_URL"))
        {
            self.generation.api_base = base.clone();
            self.transcription.api_base = base;
        }
        if let Some(key) = env_string("ELEVENLABS_API_KEY") {
            self.synthesis.api_key = Some(key);
        }
        if let Some(voice) = env_string("ELEVENLABS_VOICE_ID") {
            self.synthesis.voice_id = voice;
        }
        self.synthesis.stability = env_f32("ELEVENLABS_STABILITY", self.synthesis.stability);
        self.synthesis.similarity_boost =
            env_f32("ELEVENLABS_SIMILARITY", self.synthesis.similarity_boost);
        self.synthesis.style = env_f32("ELEVENLABS_STYLE", self.synthesis.style);
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_f32(name: &str, fallback: f32) -> f32 {
    env_string(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}
