//! HTTP error mapping.
//!
//! Caller mistakes come back as 4xx with the engine's message; capability
//! failures come back as 5xx with a generic message while the detail goes
//! to the log.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rostrum_core::DebateError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::feedback::FeedbackError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<DebateError> for ApiError {
    fn from(err: DebateError) -> Self {
        match &err {
            DebateError::StaleTurn => Self::Conflict(err.to_string()),
            e if e.is_caller_error() => Self::BadRequest(err.to_string()),
            DebateError::CapabilityFailed { capability, detail } => {
                error!(capability = *capability, detail = %detail, "capability call failed");
                Self::Upstream(format!("The {capability} service is unavailable"))
            }
            DebateError::OpenAI(inner) => {
                error!(error = %inner, "generation provider failure");
                Self::Upstream("The generation service is unavailable".to_string())
            }
            DebateError::Config(msg) => Self::Internal(msg.clone()),
            // is_caller_error covers the remaining variants; keep the
            // compiler honest about future additions.
            _ => Self::Internal(err.to_string()),
        }
    }
}

impl From<FeedbackError> for ApiError {
    fn from(err: FeedbackError) -> Self {
        error!(error = %err, "feedback store failure");
        Self::Internal("Failed to access feedback data".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_field_maps_to_bad_request() {
        let api: ApiError = DebateError::BlankField { field: "motion" }.into();
        assert!(matches!(api, ApiError::BadRequest(_)));
        assert_eq!(api.to_string(), "motion must not be blank");
    }

    #[test]
    fn stale_turn_maps_to_conflict() {
        let api: ApiError = DebateError::StaleTurn.into();
        assert!(matches!(api, ApiError::Conflict(_)));
    }

    #[test]
    fn capability_failure_hides_detail_from_the_caller() {
        let api: ApiError = DebateError::CapabilityFailed {
            capability: "synthesis",
            detail: "secret internal detail".to_string(),
        }
        .into();
        let message = api.to_string();
        assert!(message.contains("synthesis"));
        assert!(!message.contains("secret internal detail"));
    }

    #[test]
    fn no_active_session_maps_to_bad_request() {
        let api: ApiError = DebateError::NoActiveSession.into();
        assert!(matches!(api, ApiError::BadRequest(_)));
    }

    #[test]
    fn response_statuses_match_the_taxonomy() {
        assert_eq!(
            ApiError::BadRequest("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Conflict("x".into()).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Upstream("x".into()).into_response().status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::Internal("x".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
