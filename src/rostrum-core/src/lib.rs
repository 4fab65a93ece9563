//! Rostrum Core Library
//!
//! Debate session orchestration: session state and turn log, prompt and
//! response-contract handling, and the three capability gateways
//! (generation, transcription, synthesis) with graceful degradation.

pub mod config;
pub mod contract;
pub mod error;
pub mod generation;
pub mod orchestrator;
pub mod pacing;
pub mod prompt;
pub mod session;
pub mod synthesis;
pub mod transcription;

pub use config::{AppConfig, GenerationConfig, StorageConfig, SynthesisConfig, TranscriptionConfig};
pub use contract::{ContractOutcome, ReplyShape, SpeechContract};
pub use error::DebateError;
pub use generation::{GenerationGateway, GenerationReply};
pub use orchestrator::{
    DebateOrchestrator, ReplyOutcome, ReplyRequest, SideChoice, StartOutcome, StartRequest,
};
pub use session::{
    MetaPatch, Phase, SessionId, SessionMeta, SessionSlot, SessionStore, Side, SkillLevel,
    Speaker, Turn, TurnExtras, TurnLedger, TurnPayload,
};
pub use synthesis::{SpeechKind, SpeechRendering, SynthesisGateway};
pub use transcription::{TranscriptOutcome, TranscriptionGateway};
