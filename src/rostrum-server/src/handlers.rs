//! Request handlers for the debate API.

use axum::Json;
use axum::extract::{Multipart, State};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use rostrum_core::synthesis::SpeechRendering;
use rostrum_core::{Phase, ReplyRequest, Side, SideChoice, SkillLevel, StartRequest, Turn};

use crate::error::ApiError;
use crate::feedback::{FeedbackAnalysis, FeedbackSubmission};
use crate::state::AppState;

fn default_time_limit() -> u32 {
    5
}

fn default_tone() -> String {
    "formal".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBody {
    #[serde(default)]
    motion: String,
    #[serde(default)]
    side: SideChoice,
    #[serde(default = "default_time_limit")]
    time_limit: u32,
    #[serde(default = "default_tone")]
    tone: String,
    #[serde(default)]
    skill_level: SkillLevel,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    session_id: Uuid,
    turns: Vec<Turn>,
    /// Serialized contract of the AI opening, when the AI opened.
    ai_text: Option<String>,
    assigned_side: Side,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
}

#[instrument(skip(state, body), fields(side = ?body.side))]
pub async fn start(
    State(state): State<AppState>,
    Json(body): Json<StartBody>,
) -> Result<Json<StartResponse>, ApiError> {
    let outcome = state
        .orchestrator
        .start(StartRequest {
            motion: body.motion,
            side: body.side,
            time_limit: body.time_limit,
            tone: body.tone,
            skill_level: body.skill_level,
        })
        .await?;

    let (ai_text, warning) = match &outcome.ai_reply {
        Some(reply) => (
            serde_json::to_string(reply.contract()).ok(),
            reply.warning.clone(),
        ),
        None => (None, None),
    };

    Ok(Json(StartResponse {
        session_id: outcome.session_id,
        turns: outcome.turns,
        ai_text,
        assigned_side: outcome.assigned_side,
        warning,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyBody {
    #[serde(default)]
    user_text: String,
    #[serde(default)]
    session_id: Option<Uuid>,
    #[serde(default)]
    audio_path: Option<String>,
    #[serde(default)]
    transcript: Option<String>,
    #[serde(default)]
    round: Option<u32>,
    /// Caller-side phase override; the session's own phase applies when absent.
    #[serde(default)]
    state: Option<Phase>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyResponse {
    /// Serialized response contract.
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
}

#[instrument(skip(state, body), fields(chars = body.user_text.len()))]
pub async fn reply(
    State(state): State<AppState>,
    Json(body): Json<ReplyBody>,
) -> Result<Json<ReplyResponse>, ApiError> {
    let outcome = state
        .orchestrator
        .reply(ReplyRequest {
            session_id: body.session_id,
            user_text: body.user_text,
            audio_path: body.audio_path,
            transcript: body.transcript,
            round: body.round,
            stage: body.state,
        })
        .await?;

    let text = serde_json::to_string(outcome.reply.contract())
        .map_err(|e| ApiError::Internal(format!("failed to serialize contract: {e}")))?;

    Ok(Json(ReplyResponse {
        text,
        warning: outcome.reply.warning.clone(),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscribeResponse {
    transcript: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
}

pub async fn transcribe(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<TranscribeResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart upload: {e}")))?
    {
        if field.name() == Some("file") {
            let filename = field
                .file_name()
                .unwrap_or("recording.webm")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?;
            upload = Some((bytes.to_vec(), filename));
            break;
        }
    }

    let Some((bytes, filename)) = upload else {
        return Err(ApiError::BadRequest("No file uploaded".to_string()));
    };

    let outcome = state.orchestrator.transcribe(bytes, &filename).await?;
    Ok(Json(TranscribeResponse {
        transcript: outcome.transcript,
        warning: outcome.warning,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SpeakBody {
    #[serde(default)]
    text: String,
}

pub async fn speak(
    State(state): State<AppState>,
    Json(body): Json<SpeakBody>,
) -> Result<Json<SpeechRendering>, ApiError> {
    let rendering = state.orchestrator.speak(&body.text).await?;
    Ok(Json(rendering))
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    success: bool,
}

pub async fn feedback(
    State(state): State<AppState>,
    Json(submission): Json<FeedbackSubmission>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.trainer.collect(submission).await?;
    Ok(Json(SuccessResponse { success: true }))
}

pub async fn training_analysis(
    State(state): State<AppState>,
) -> Result<Json<FeedbackAnalysis>, ApiError> {
    Ok(Json(state.trainer.analyze().await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    export_path: String,
}

pub async fn export_training_data(
    State(state): State<AppState>,
) -> Result<Json<ExportResponse>, ApiError> {
    let export_path = state.trainer.export().await?;
    Ok(Json(ExportResponse { export_path }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
