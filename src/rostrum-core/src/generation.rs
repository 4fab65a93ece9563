//! Generation gateway: the primary chat-completion provider plus the
//! degraded mode that keeps a debate alive without a credential or quota.
//!
//! Policy: no credential means no client is ever built and every call
//! returns the canned speech without touching the network. With a
//! credential, quota-shaped failures degrade with a warning; anything else
//! (network, timeout, malformed response) is a typed failure for the caller.

use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::GenerationConfig;
use crate::contract::{ContractOutcome, ReplyShape, SpeechContract, count_words};
use crate::error::DebateError;
use crate::pacing::{PAUSE_LONG, PAUSE_SHORT};
use crate::prompt::{BuiltPrompt, SpeechRequest, build_prompt};
use crate::session::Side;

/// Raw-text completion backend behind the gateway. The seam exists so tests
/// can feed arbitrary output through the contract parser.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn complete(&self, prompt: &BuiltPrompt) -> Result<String, DebateError>;
}

/// Chat-completion backend over an OpenAI-compatible API.
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAiBackend {
    pub fn new(config: &GenerationConfig, api_key: &str) -> Result<Self, DebateError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DebateError::Config(format!("failed to build HTTP client: {e}")))?;

        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&config.api_base);

        Ok(Self {
            client: Client::with_config(openai_config).with_http_client(http_client),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl GenerationBackend for OpenAiBackend {
    async fn complete(&self, prompt: &BuiltPrompt) -> Result<String, DebateError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .max_completion_tokens(prompt.max_tokens)
            .messages(vec![
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: prompt.system.clone().into(),
                    name: None,
                }),
                ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                    content: prompt.user.clone().into(),
                    name: None,
                }),
            ])
            .build()?;

        let response = self.client.chat().create(request).await?;
        Ok(response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default())
    }
}

/// A generated speech plus how it was obtained.
#[derive(Debug, Clone)]
pub struct GenerationReply {
    pub outcome: ContractOutcome,
    /// True when the speech came from the canned fallback.
    pub degraded: bool,
    pub warning: Option<String>,
}

impl GenerationReply {
    pub fn contract(&self) -> &SpeechContract {
        self.outcome.contract()
    }
}

const MISSING_KEY_WARNING: &str =
    "Generation credential missing; serving a canned practice speech. Set OPENAI_API_KEY for live replies.";
const QUOTA_WARNING: &str =
    "Generation quota exhausted; serving a canned practice speech while the provider recovers.";

/// The generation capability with its degrade policy.
pub struct GenerationGateway {
    backend: Option<Box<dyn GenerationBackend>>,
}

impl std::fmt::Debug for GenerationGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationGateway")
            .field("configured", &self.backend.is_some())
            .finish()
    }
}

impl GenerationGateway {
    /// Build from configuration. A missing or blank credential leaves the
    /// gateway permanently degraded, with no client constructed at all.
    pub fn new(config: &GenerationConfig) -> Result<Self, DebateError> {
        let backend = match config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
        {
            Some(key) => {
                Some(Box::new(OpenAiBackend::new(config, key)?) as Box<dyn GenerationBackend>)
            }
            None => None,
        };
        Ok(Self { backend })
    }

    /// A gateway that always serves the canned speech.
    pub fn degraded_only() -> Self {
        Self { backend: None }
    }

    /// A gateway over a custom backend.
    pub fn with_backend(backend: Box<dyn GenerationBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    /// Produce the next speech for the request, degrading on missing
    /// credentials and quota-shaped provider failures.
    pub async fn reply(&self, req: &SpeechRequest) -> Result<GenerationReply, DebateError> {
        let prompt = build_prompt(req);

        let Some(backend) = &self.backend else {
            debug!("no generation credential; serving canned speech");
            return Ok(mock_reply(req, &prompt.shape, MISSING_KEY_WARNING));
        };

        match backend.complete(&prompt).await {
            Ok(raw) => Ok(GenerationReply {
                outcome: crate::contract::parse_reply(&raw, &prompt.shape),
                degraded: false,
                warning: None,
            }),
            Err(DebateError::OpenAI(err)) if quota_shaped(&err) => {
                warn!(error = %err, "generation quota exhausted, degrading");
                Ok(mock_reply(req, &prompt.shape, QUOTA_WARNING))
            }
            Err(DebateError::OpenAI(err)) => Err(DebateError::CapabilityFailed {
                capability: "generation",
                detail: err.to_string(),
            }),
            Err(other) => Err(other),
        }
    }
}

/// Quota, rate-limit and revoked-credential signatures degrade; anything
/// else is a hard failure. Classification keys off the provider's error
/// message because those strings are the stable part of its contract.
fn quota_shaped(err: &OpenAIError) -> bool {
    if !matches!(err, OpenAIError::ApiError(_)) {
        return false;
    }
    let detail = err.to_string().to_ascii_lowercase();
    detail.contains("quota")
        || detail.contains("rate limit")
        || detail.contains("rate_limit")
        || detail.contains("incorrect api key")
        || detail.contains("invalid_api_key")
        || detail.contains("deactivated")
}

/// Deterministic practice speech used whenever the provider is out of
/// reach. Structured like a real reply so downstream code cannot tell the
/// difference, apart from the degraded flag.
fn mock_reply(req: &SpeechRequest, shape: &ReplyShape, warning: &str) -> GenerationReply {
    let stance = match req.side {
        Side::Pro => "in favour of",
        Side::Opp => "against",
    };
    let text = format!(
        "Ladies and gentlemen, I rise today to argue {stance} the motion \"{motion}\". Few questions before this house deserve more careful weighing.\n\n\
{long} First, principle. The other bench promises progress, yet it is fragile institutions and the people inside them that absorb every cost of change without guardrails. Caution here is not timidity; it is responsibility.\n\n\
{short} Second, precedent. Comparable experiments, rushed through on optimism alone, left behind lost livelihoods, eroded trust and bills that outlasted the headlines. That is recorded history, not speculation.\n\n\
{short} Third, the human ledger. Efficiency figures cannot price what it means for real people to lose agency over their own lives. We owe them protection, not a gamble.\n\n\
{long} In closing, surface benefits cannot outweigh structural risk. Weigh the harms, weigh the history, and stand with this bench.",
        motion = req.motion.trim(),
        long = PAUSE_LONG,
        short = PAUSE_SHORT,
    );

    let contract = SpeechContract {
        round: shape.round,
        stage: shape.stage.clone(),
        tone: shape.tone.clone(),
        word_target: shape.word_target,
        word_count: count_words(&text),
        text,
        points: vec![
            "Principled restraint beats unguarded change".to_string(),
            "Precedent shows rushed reform backfires".to_string(),
            "Human impact outweighs efficiency on paper".to_string(),
        ],
        rebuttals: vec![
            "Their optimism discounts precedent and implementation risk".to_string(),
            "Oversight gaps leave the plan unsafe in practice".to_string(),
        ],
        closing: "Choose prudence and hold with this bench.".to_string(),
        confidence_score: 0.62,
    };

    GenerationReply {
        outcome: ContractOutcome::Parsed(contract),
        degraded: true,
        warning: Some(warning.to_string()),
    }
}
