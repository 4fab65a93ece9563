//! Error types for the debate engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DebateError {
    #[error("{field} must not be blank")]
    BlankField { field: &'static str },

    #[error("no active debate session; start a new debate first")]
    NoActiveSession,

    #[error("unknown session: {0}")]
    UnknownSession(uuid::Uuid),

    #[error("session was reset while a turn was in flight")]
    StaleTurn,

    #[error("empty audio upload")]
    EmptyAudio,

    #[error("{capability} capability failed: {detail}")]
    CapabilityFailed {
        capability: &'static str,
        detail: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("OpenAI API error: {0}")]
    OpenAI(#[from] async_openai::error::OpenAIError),
}

impl DebateError {
    /// True for caller mistakes (blank input, missing or stale session)
    /// rather than engine or provider faults.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::BlankField { .. }
                | Self::NoActiveSession
                | Self::UnknownSession(_)
                | Self::StaleTurn
                | Self::EmptyAudio
        )
    }
}
