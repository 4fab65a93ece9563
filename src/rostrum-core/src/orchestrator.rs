//! Debate orchestration: the single entry point that sequences session
//! state, prompt building, the capability gateways and phase progression.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, instrument};

use crate::config::AppConfig;
use crate::error::DebateError;
use crate::generation::{GenerationGateway, GenerationReply};
use crate::prompt::SpeechRequest;
use crate::session::{
    SessionId, SessionMeta, SessionStore, Side, SkillLevel, Phase, Speaker, Turn, TurnExtras,
    TurnLedger, TurnPayload,
};
use crate::synthesis::{SpeechRendering, SynthesisGateway};
use crate::transcription::{TranscriptOutcome, TranscriptionGateway};

/// The caller's side preference when starting a debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SideChoice {
    #[default]
    Auto,
    Pro,
    Opp,
}

#[derive(Debug, Clone)]
pub struct StartRequest {
    pub motion: String,
    pub side: SideChoice,
    pub time_limit: u32,
    pub tone: String,
    pub skill_level: SkillLevel,
}

#[derive(Debug)]
pub struct StartOutcome {
    pub session_id: SessionId,
    pub turns: Vec<Turn>,
    /// Present only when the AI held proposition and delivered the opening.
    pub ai_reply: Option<GenerationReply>,
    /// The side the user ended up on.
    pub assigned_side: Side,
}

#[derive(Debug, Clone)]
pub struct ReplyRequest {
    pub session_id: Option<SessionId>,
    pub user_text: String,
    pub audio_path: Option<String>,
    pub transcript: Option<String>,
    pub round: Option<u32>,
    pub stage: Option<Phase>,
}

#[derive(Debug)]
pub struct ReplyOutcome {
    pub reply: GenerationReply,
    pub turn: Turn,
    pub round: u32,
    pub stage: Phase,
}

/// Coordinates one debate exchange at a time per session.
pub struct DebateOrchestrator {
    sessions: Arc<SessionStore>,
    generation: GenerationGateway,
    transcription: TranscriptionGateway,
    synthesis: SynthesisGateway,
}

impl std::fmt::Debug for DebateOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebateOrchestrator")
            .field("sessions", &self.sessions)
            .finish()
    }
}

impl DebateOrchestrator {
    pub fn new(
        sessions: Arc<SessionStore>,
        generation: GenerationGateway,
        transcription: TranscriptionGateway,
        synthesis: SynthesisGateway,
    ) -> Self {
        Self {
            sessions,
            generation,
            transcription,
            synthesis,
        }
    }

    /// Wire up the full engine from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, DebateError> {
        let ledger_path = std::path::Path::new(&config.storage.data_dir)
            .join(&config.storage.ledger_file);
        let sessions = Arc::new(SessionStore::with_ledger(TurnLedger::new(ledger_path)));
        Ok(Self {
            sessions,
            generation: GenerationGateway::new(&config.generation)?,
            transcription: TranscriptionGateway::new(config.transcription.clone())?,
            synthesis: SynthesisGateway::new(config.synthesis.clone())?,
        })
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Start a fresh debate, replacing the current session wholesale.
    #[instrument(skip(self, req), fields(side = ?req.side, time_limit = req.time_limit))]
    pub async fn start(&self, req: StartRequest) -> Result<StartOutcome, DebateError> {
        let motion = req.motion.trim().to_string();
        if motion.is_empty() {
            return Err(DebateError::BlankField { field: "motion" });
        }

        let user_side = match req.side {
            SideChoice::Pro => Side::Pro,
            SideChoice::Opp => Side::Opp,
            SideChoice::Auto => {
                if rand::random::<bool>() {
                    Side::Pro
                } else {
                    Side::Opp
                }
            }
        };
        let ai_side = user_side.complement();

        let tone = {
            let trimmed = req.tone.trim();
            if trimmed.is_empty() {
                "formal".to_string()
            } else {
                trimmed.to_string()
            }
        };

        let meta = SessionMeta {
            motion: motion.clone(),
            ai_side,
            user_side,
            time_limit: req.time_limit,
            tone: tone.clone(),
            skill_level: req.skill_level,
        };
        let (session_id, slot) = self.sessions.create(meta);
        info!(%session_id, ai_side = ai_side.as_str(), "debate started");

        // Proposition always opens: the AI speaks first exactly when it
        // holds the proposition bench; otherwise the user opens.
        let mut ai_reply = None;
        if ai_side.opens_debate() {
            let reply = self
                .generation
                .reply(&SpeechRequest {
                    motion,
                    side: ai_side,
                    round: 1,
                    stage: Phase::Opening,
                    tone,
                    skill_level: req.skill_level,
                    time_limit: req.time_limit,
                    context: Vec::new(),
                })
                .await?;
            slot.add_turn(
                Speaker::Ai,
                TurnPayload::Structured(reply.contract().clone()),
                TurnExtras::default(),
            );
            ai_reply = Some(reply);
        }

        Ok(StartOutcome {
            session_id,
            turns: slot.turns(),
            ai_reply,
            assigned_side: user_side,
        })
    }

    /// Record a user turn and generate the AI's answer to it. Turns within
    /// a session are strictly sequential: the exchange lock is held across
    /// the gateway call, and a session replaced mid-flight discards the
    /// stale result instead of appending it.
    #[instrument(skip(self, req), fields(chars = req.user_text.len()))]
    pub async fn reply(&self, req: ReplyRequest) -> Result<ReplyOutcome, DebateError> {
        if req.user_text.trim().is_empty() {
            return Err(DebateError::BlankField { field: "userText" });
        }

        let slot = self.sessions.resolve(req.session_id)?;
        let _exchange = slot.lock_exchange().await;

        let meta = slot.meta();
        let observed_generation = slot.generation();

        slot.add_turn(
            Speaker::User,
            TurnPayload::Text(req.user_text.clone()),
            TurnExtras {
                audio_path: req.audio_path.clone(),
                transcript: req.transcript.clone(),
            },
        );

        let round = req.round.unwrap_or_else(|| slot.round());
        let stage = req.stage.unwrap_or_else(|| slot.phase());

        let reply = self
            .generation
            .reply(&SpeechRequest {
                motion: meta.motion,
                side: meta.ai_side,
                round,
                stage,
                tone: meta.tone,
                skill_level: meta.skill_level,
                time_limit: meta.time_limit,
                context: slot.turns(),
            })
            .await?;

        let turn = slot.add_turn_checked(
            observed_generation,
            Speaker::Ai,
            TurnPayload::Structured(reply.contract().clone()),
            TurnExtras::default(),
        )?;

        // The user->ai exchange is complete; move the debate forward.
        slot.advance_phase();

        Ok(ReplyOutcome {
            reply,
            turn,
            round,
            stage,
        })
    }

    /// Transcribe an audio upload.
    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        filename: &str,
    ) -> Result<TranscriptOutcome, DebateError> {
        self.transcription.transcribe(audio, filename).await
    }

    /// Render text to speech.
    pub async fn speak(&self, text: &str) -> Result<SpeechRendering, DebateError> {
        self.synthesis.speak(text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SynthesisConfig, TranscriptionConfig};

    fn degraded_orchestrator() -> DebateOrchestrator {
        DebateOrchestrator::new(
            Arc::new(SessionStore::new()),
            GenerationGateway::degraded_only(),
            TranscriptionGateway::new(TranscriptionConfig::default()).unwrap(),
            SynthesisGateway::new(SynthesisConfig::default()).unwrap(),
        )
    }

    fn start_request(side: SideChoice) -> StartRequest {
        StartRequest {
            motion: "Schools should ban homework".to_string(),
            side,
            time_limit: 5,
            tone: "formal".to_string(),
            skill_level: SkillLevel::Professional,
        }
    }

    #[tokio::test]
    async fn blank_motion_is_rejected() {
        let orchestrator = degraded_orchestrator();
        let result = orchestrator
            .start(StartRequest {
                motion: "   ".to_string(),
                ..start_request(SideChoice::Pro)
            })
            .await;
        assert!(matches!(
            result,
            Err(DebateError::BlankField { field: "motion" })
        ));
    }

    #[tokio::test]
    async fn user_on_proposition_defers_the_opening() {
        let orchestrator = degraded_orchestrator();
        let outcome = orchestrator.start(start_request(SideChoice::Pro)).await.unwrap();

        assert_eq!(outcome.assigned_side, Side::Pro);
        assert!(outcome.ai_reply.is_none());
        assert!(outcome.turns.is_empty());
    }

    #[tokio::test]
    async fn ai_on_proposition_delivers_the_opening() {
        let orchestrator = degraded_orchestrator();
        let outcome = orchestrator.start(start_request(SideChoice::Opp)).await.unwrap();

        assert_eq!(outcome.assigned_side, Side::Opp);
        let reply = outcome.ai_reply.expect("proposition AI must open");
        assert!(reply.degraded);
        assert_eq!(reply.contract().stage, "opening");
        assert_eq!(outcome.turns.len(), 1);
        assert_eq!(outcome.turns[0].speaker, Speaker::Ai);
        // The opening never advances the phase.
        let slot = orchestrator.sessions().resolve(None).unwrap();
        assert_eq!(slot.phase(), Phase::Opening);
    }

    #[tokio::test]
    async fn auto_side_assignment_takes_complementary_benches() {
        let orchestrator = degraded_orchestrator();
        let outcome = orchestrator.start(start_request(SideChoice::Auto)).await.unwrap();
        let meta = orchestrator.sessions().resolve(None).unwrap().meta();
        assert_eq!(meta.user_side, outcome.assigned_side);
        assert_eq!(meta.ai_side, outcome.assigned_side.complement());
    }

    #[tokio::test]
    async fn reply_appends_exchange_and_advances_phase() {
        let orchestrator = degraded_orchestrator();
        orchestrator.start(start_request(SideChoice::Opp)).await.unwrap();

        let outcome = orchestrator
            .reply(ReplyRequest {
                session_id: None,
                user_text: "I disagree with the premise entirely.".to_string(),
                audio_path: None,
                transcript: None,
                round: None,
                stage: None,
            })
            .await
            .unwrap();

        // AI opening + user turn + AI reply.
        let slot = orchestrator.sessions().resolve(None).unwrap();
        let turns = slot.turns();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1].speaker, Speaker::User);
        assert_eq!(turns[2].speaker, Speaker::Ai);
        assert_eq!(outcome.stage, Phase::Opening);
        assert_eq!(slot.phase(), Phase::Rebuttal);
        // Derived round after the user turn: floor(2/2) + 1.
        assert_eq!(outcome.round, 2);
    }

    #[tokio::test]
    async fn reply_without_a_session_is_rejected() {
        let orchestrator = degraded_orchestrator();
        let result = orchestrator
            .reply(ReplyRequest {
                session_id: None,
                user_text: "hello".to_string(),
                audio_path: None,
                transcript: None,
                round: None,
                stage: None,
            })
            .await;
        assert!(matches!(result, Err(DebateError::NoActiveSession)));
    }

    #[tokio::test]
    async fn blank_reply_text_is_rejected() {
        let orchestrator = degraded_orchestrator();
        orchestrator.start(start_request(SideChoice::Pro)).await.unwrap();
        let result = orchestrator
            .reply(ReplyRequest {
                session_id: None,
                user_text: "".to_string(),
                audio_path: None,
                transcript: None,
                round: None,
                stage: None,
            })
            .await;
        assert!(matches!(
            result,
            Err(DebateError::BlankField { field: "userText" })
        ));
    }

    #[tokio::test]
    async fn caller_may_override_round_and_stage() {
        let orchestrator = degraded_orchestrator();
        orchestrator.start(start_request(SideChoice::Pro)).await.unwrap();

        let outcome = orchestrator
            .reply(ReplyRequest {
                session_id: None,
                user_text: "Let me close early.".to_string(),
                audio_path: None,
                transcript: None,
                round: Some(4),
                stage: Some(Phase::Closing),
            })
            .await
            .unwrap();

        assert_eq!(outcome.round, 4);
        assert_eq!(outcome.stage, Phase::Closing);
        assert_eq!(outcome.reply.contract().stage, "closing");
    }

    #[tokio::test]
    async fn phase_walks_the_full_chain_and_stays_terminal() {
        let orchestrator = degraded_orchestrator();
        orchestrator.start(start_request(SideChoice::Opp)).await.unwrap();
        let slot = orchestrator.sessions().resolve(None).unwrap();

        let expected = [
            Phase::Rebuttal,
            Phase::Counterargument,
            Phase::Closing,
            Phase::Closing,
        ];
        for phase in expected {
            orchestrator
                .reply(ReplyRequest {
                    session_id: None,
                    user_text: "And another thing.".to_string(),
                    audio_path: None,
                    transcript: None,
                    round: None,
                    stage: None,
                })
                .await
                .unwrap();
            assert_eq!(slot.phase(), phase);
        }
    }

    #[tokio::test]
    async fn stale_exchange_is_discarded_after_session_replacement() {
        let orchestrator = degraded_orchestrator();
        orchestrator.start(start_request(SideChoice::Pro)).await.unwrap();
        let old_slot = orchestrator.sessions().resolve(None).unwrap();
        let observed = old_slot.generation();

        // A new debate displaces the session while our exchange is parked.
        orchestrator.start(start_request(SideChoice::Pro)).await.unwrap();

        let result = old_slot.add_turn_checked(
            observed,
            Speaker::Ai,
            TurnPayload::Text("stale speech".to_string()),
            TurnExtras::default(),
        );
        assert!(matches!(result, Err(DebateError::StaleTurn)));
        assert!(old_slot.turns().is_empty());
    }

    #[tokio::test]
    async fn explicit_session_ids_stay_isolated() {
        let orchestrator = degraded_orchestrator();
        let first = orchestrator.start(start_request(SideChoice::Pro)).await.unwrap();
        let second = orchestrator.start(start_request(SideChoice::Pro)).await.unwrap();

        orchestrator
            .reply(ReplyRequest {
                session_id: Some(second.session_id),
                user_text: "Speaking in the new debate.".to_string(),
                audio_path: None,
                transcript: None,
                round: None,
                stage: None,
            })
            .await
            .unwrap();

        let first_slot = orchestrator
            .sessions()
            .resolve(Some(first.session_id))
            .unwrap();
        let second_slot = orchestrator
            .sessions()
            .resolve(Some(second.session_id))
            .unwrap();
        assert!(first_slot.turns().is_empty());
        assert_eq!(second_slot.turns().len(), 2);
    }
}
