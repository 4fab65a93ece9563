//! Application state shared across handlers.

use std::sync::Arc;

use rostrum_core::DebateOrchestrator;

use crate::feedback::FeedbackLog;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<DebateOrchestrator>,
    pub trainer: Arc<FeedbackLog>,
}
