//! Debate session state: metadata, the append-only turn log, and the keyed
//! store that owns them.
//!
//! Each session lives in its own slot behind a session id. A slot carries a
//! generation counter that is bumped whenever the session is replaced, so an
//! exchange that was suspended on a provider call can detect that its world
//! changed underneath it and discard the stale result instead of appending
//! out of order.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::contract::SpeechContract;
use crate::error::DebateError;

pub type SessionId = Uuid;

/// Which bench a participant argues from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Pro,
    Opp,
}

impl Side {
    pub fn complement(self) -> Self {
        match self {
            Self::Pro => Self::Opp,
            Self::Opp => Self::Pro,
        }
    }

    /// Proposition always delivers the opening speech.
    pub fn opens_debate(self) -> bool {
        matches!(self, Self::Pro)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pro => "pro",
            Self::Opp => "opp",
        }
    }

    pub fn bench_name(self) -> &'static str {
        match self {
            Self::Pro => "Proposition",
            Self::Opp => "Opposition",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Ai,
}

/// Rhetorical stage of the debate. Terminal at `Closing`: advancing a
/// finished debate is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Opening,
    Rebuttal,
    Counterargument,
    Closing,
}

impl Phase {
    pub fn next(self) -> Self {
        match self {
            Self::Opening => Self::Rebuttal,
            Self::Rebuttal => Self::Counterargument,
            Self::Counterargument | Self::Closing => Self::Closing,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Opening => "opening",
            Self::Rebuttal => "rebuttal",
            Self::Counterargument => "counterargument",
            Self::Closing => "closing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
    #[default]
    Professional,
}

impl SkillLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
            Self::Professional => "professional",
        }
    }
}

/// Session metadata, replaced wholesale when a new debate starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub motion: String,
    pub ai_side: Side,
    pub user_side: Side,
    pub time_limit: u32,
    pub tone: String,
    pub skill_level: SkillLevel,
}

/// Partial metadata update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct MetaPatch {
    pub motion: Option<String>,
    pub time_limit: Option<u32>,
    pub tone: Option<String>,
    pub skill_level: Option<SkillLevel>,
}

/// One entry in the append-only turn log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    /// Structured contract, present on ai turns only.
    #[serde(rename = "data")]
    pub payload: Option<SpeechContract>,
    pub audio_path: Option<String>,
    pub transcript: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// What a turn is made of: plain speech text, or a structured contract whose
/// text becomes the speech body.
#[derive(Debug, Clone)]
pub enum TurnPayload {
    Text(String),
    Structured(SpeechContract),
}

impl TurnPayload {
    fn into_parts(self) -> (String, Option<SpeechContract>) {
        match self {
            Self::Text(text) => (text, None),
            Self::Structured(contract) => (contract.text.clone(), Some(contract)),
        }
    }
}

/// Optional attachments recorded alongside a turn.
#[derive(Debug, Clone, Default)]
pub struct TurnExtras {
    pub audio_path: Option<String>,
    pub transcript: Option<String>,
}

#[derive(Debug)]
struct SessionState {
    meta: SessionMeta,
    turns: Vec<Turn>,
    phase: Phase,
    generation: u64,
    last_activity: DateTime<Utc>,
}

/// One live session. Writes to the turn log are serialized through
/// [`SessionSlot::lock_exchange`]; metadata reads stay concurrent.
pub struct SessionSlot {
    id: SessionId,
    state: RwLock<SessionState>,
    exchange: tokio::sync::Mutex<()>,
    ledger: Option<Arc<TurnLedger>>,
}

impl std::fmt::Debug for SessionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSlot").field("id", &self.id).finish()
    }
}

impl SessionSlot {
    fn new(id: SessionId, meta: SessionMeta, ledger: Option<Arc<TurnLedger>>) -> Self {
        Self {
            id,
            state: RwLock::new(SessionState {
                meta,
                turns: Vec::new(),
                phase: Phase::Opening,
                generation: 0,
                last_activity: Utc::now(),
            }),
            exchange: tokio::sync::Mutex::new(()),
            ledger,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Serializes the generation write path for this session. Held across
    /// the gateway call so no two turns are generated concurrently.
    pub async fn lock_exchange(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.exchange.lock().await
    }

    pub fn meta(&self) -> SessionMeta {
        self.state.read().meta.clone()
    }

    pub fn patch_meta(&self, patch: MetaPatch) {
        let mut state = self.state.write();
        if let Some(motion) = patch.motion {
            state.meta.motion = motion;
        }
        if let Some(limit) = patch.time_limit {
            state.meta.time_limit = limit;
        }
        if let Some(tone) = patch.tone {
            state.meta.tone = tone;
        }
        if let Some(level) = patch.skill_level {
            state.meta.skill_level = level;
        }
        state.last_activity = Utc::now();
    }

    /// Snapshot of the turn log in insertion order. Later appends are not
    /// visible through a snapshot already handed out.
    pub fn turns(&self) -> Vec<Turn> {
        self.state.read().turns.clone()
    }

    /// Derived round number, recomputed from the log on every call.
    pub fn round(&self) -> u32 {
        (self.state.read().turns.len() / 2) as u32 + 1
    }

    pub fn phase(&self) -> Phase {
        self.state.read().phase
    }

    /// Advance the rhetorical stage after a completed user/ai exchange.
    pub fn advance_phase(&self) {
        let mut state = self.state.write();
        state.phase = state.phase.next();
    }

    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.state.read().last_activity
    }

    /// Replace the session wholesale: new metadata, empty turn log, opening
    /// phase, bumped generation. In-flight exchanges from the old state
    /// become stale.
    pub fn reset(&self, meta: SessionMeta) {
        let mut state = self.state.write();
        state.meta = meta;
        state.turns.clear();
        state.phase = Phase::Opening;
        state.generation += 1;
        state.last_activity = Utc::now();
    }

    /// Mark every in-flight exchange against this slot stale without
    /// touching the log, used when a newer session displaces this one.
    pub fn retire(&self) {
        self.state.write().generation += 1;
    }

    /// Append a turn and mirror it into the ledger (best-effort).
    pub fn add_turn(&self, speaker: Speaker, payload: TurnPayload, extras: TurnExtras) -> Turn {
        let mut state = self.state.write();
        self.push_turn(&mut state, speaker, payload, extras)
    }

    /// Append a turn only if the session generation still matches the value
    /// captured before the caller suspended on a provider call.
    pub fn add_turn_checked(
        &self,
        generation: u64,
        speaker: Speaker,
        payload: TurnPayload,
        extras: TurnExtras,
    ) -> Result<Turn, DebateError> {
        let mut state = self.state.write();
        if state.generation != generation {
            return Err(DebateError::StaleTurn);
        }
        Ok(self.push_turn(&mut state, speaker, payload, extras))
    }

    fn push_turn(
        &self,
        state: &mut SessionState,
        speaker: Speaker,
        payload: TurnPayload,
        extras: TurnExtras,
    ) -> Turn {
        let (text, payload) = payload.into_parts();
        let turn = Turn {
            speaker,
            text,
            payload,
            audio_path: extras.audio_path,
            transcript: extras.transcript,
            timestamp: Utc::now(),
        };
        state.turns.push(turn.clone());
        state.last_activity = Utc::now();
        if let Some(ledger) = &self.ledger {
            ledger.record(self.id, &turn);
        }
        turn
    }
}

#[derive(Default)]
struct StoreInner {
    sessions: HashMap<SessionId, Arc<SessionSlot>>,
    current: Option<SessionId>,
}

/// Keyed session store. Also tracks the most recently created session so
/// callers that never learned a session id keep working.
#[derive(Default)]
pub struct SessionStore {
    inner: RwLock<StoreInner>,
    ledger: Option<Arc<TurnLedger>>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.inner.read().sessions.len())
            .finish()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ledger(ledger: TurnLedger) -> Self {
        Self {
            inner: RwLock::default(),
            ledger: Some(Arc::new(ledger)),
        }
    }

    /// Create a fresh session and make it current. The displaced current
    /// session, if any, is retired so its in-flight exchanges turn stale.
    pub fn create(&self, meta: SessionMeta) -> (SessionId, Arc<SessionSlot>) {
        let id = Uuid::new_v4();
        let slot = Arc::new(SessionSlot::new(id, meta, self.ledger.clone()));
        let mut inner = self.inner.write();
        if let Some(previous) = inner.current.and_then(|prev| inner.sessions.get(&prev).cloned())
        {
            previous.retire();
        }
        inner.sessions.insert(id, Arc::clone(&slot));
        inner.current = Some(id);
        (id, slot)
    }

    /// Resolve a session by id, or fall back to the current one.
    pub fn resolve(&self, id: Option<SessionId>) -> Result<Arc<SessionSlot>, DebateError> {
        let inner = self.inner.read();
        match id {
            Some(id) => inner
                .sessions
                .get(&id)
                .cloned()
                .ok_or(DebateError::UnknownSession(id)),
            None => inner
                .current
                .and_then(|current| inner.sessions.get(&current).cloned())
                .ok_or(DebateError::NoActiveSession),
        }
    }

    pub fn current_id(&self) -> Option<SessionId> {
        self.inner.read().current
    }

    pub fn len(&self) -> usize {
        self.inner.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().sessions.is_empty()
    }

    /// Drop a session explicitly. Returns whether it existed.
    pub fn expire(&self, id: SessionId) -> bool {
        let mut inner = self.inner.write();
        let existed = inner.sessions.remove(&id).is_some();
        if inner.current == Some(id) {
            inner.current = None;
        }
        existed
    }

    /// Drop sessions idle longer than `max_age`. Returns how many went.
    pub fn expire_idle(&self, max_age: TimeDelta) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut inner = self.inner.write();
        let before = inner.sessions.len();
        inner.sessions.retain(|_, slot| slot.last_activity() >= cutoff);
        if let Some(current) = inner.current {
            if !inner.sessions.contains_key(&current) {
                inner.current = None;
            }
        }
        before - inner.sessions.len()
    }
}

/// Append-only JSONL mirror of the turn log. Writes are best-effort: a
/// failed append is logged and swallowed, the in-memory log is the source
/// of truth either way.
#[derive(Debug)]
pub struct TurnLedger {
    path: PathBuf,
}

#[derive(Serialize)]
struct LedgerEntry<'a> {
    session: SessionId,
    #[serde(flatten)]
    turn: &'a Turn,
}

impl TurnLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn record(&self, session: SessionId, turn: &Turn) {
        if let Err(e) = self.try_append(session, turn) {
            warn!(path = %self.path.display(), error = %e, "turn ledger append failed");
        }
    }

    fn try_append(&self, session: SessionId, turn: &Turn) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let line = serde_json::to_string(&LedgerEntry { session, turn })
            .map_err(std::io::Error::other)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}
