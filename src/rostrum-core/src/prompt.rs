//! Prompt construction for the generation gateway: speech sizing,
//! sanitization, context windowing and the instruction payload.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::contract::ReplyShape;
use crate::session::{Phase, Side, SkillLevel, Speaker, Turn};

/// Fixed speaking rate used to size speeches.
pub const WORDS_PER_MINUTE: u32 = 145;
/// Floor keeping short speeches substantive.
pub const MIN_SPEECH_WORDS: u32 = 320;
/// Only this many of the most recent turns are included in the prompt;
/// older turns are dropped without summarization.
pub const CONTEXT_WINDOW: usize = 16;
/// Shortest and longest time limits a debater may request, in minutes.
pub const TIME_LIMIT_RANGE: (u32, u32) = (2, 10);

const MAX_COMPLETION_TOKENS: u32 = 3800;

const SYSTEM_PROMPT: &str = "You are \"DebaterAI\", a championship parliamentary debater trained in British and American formats.\n\
- You ALWAYS argue the opposite side of the user.\n\
- You follow round structure (Opening -> Rebuttal -> Counterargument -> Closing) and defend your assigned bench relentlessly.\n\
- Your speeches must sound like live parliamentary delivery with clear signposting, weighing, and rhetorical polish.\n\
- You may insert the tokens [[PAUSE_SHORT]] and [[PAUSE_LONG]] in the text to indicate natural vocal pauses for text-to-speech.";

/// Word-count targets for a speech of the requested length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeechTargets {
    /// Requested minutes clamped to [`TIME_LIMIT_RANGE`].
    pub minutes: u32,
    pub target: u32,
    pub min: u32,
    pub max: u32,
}

impl SpeechTargets {
    /// Clamp the time limit and derive the target band. The band is
    /// asymmetric: debaters overrun more often than they underrun.
    pub fn for_time_limit(minutes: u32) -> Self {
        let (lo, hi) = TIME_LIMIT_RANGE;
        let clamped = minutes.clamp(lo, hi);
        let target = MIN_SPEECH_WORDS.max(clamped * WORDS_PER_MINUTE);
        Self {
            minutes: clamped,
            target,
            min: (f64::from(target) * 0.90).round() as u32,
            max: (f64::from(target) * 1.08).round() as u32,
        }
    }
}

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));
static CONTROL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x1f]+").expect("control regex"));
static BRACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[{}]").expect("brace regex"));

/// Flatten user-supplied text so it cannot corrupt the prompt structure:
/// whitespace runs collapse, control characters and braces are removed.
pub fn sanitize(value: &str) -> String {
    let value = CONTROL_CHARS.replace_all(value, " ");
    let value = WHITESPACE_RUN.replace_all(&value, " ");
    let value = BRACES.replace_all(&value, "");
    value.trim().to_string()
}

/// Everything the generation gateway needs to produce the next speech.
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub motion: String,
    pub side: Side,
    pub round: u32,
    pub stage: Phase,
    pub tone: String,
    pub skill_level: SkillLevel,
    pub time_limit: u32,
    pub context: Vec<Turn>,
}

/// A prompt ready for submission, plus the shape used to validate and
/// backfill the reply.
#[derive(Debug, Clone)]
pub struct BuiltPrompt {
    pub system: String,
    pub user: String,
    pub targets: SpeechTargets,
    pub max_tokens: u32,
    pub shape: ReplyShape,
}

fn skill_note(level: SkillLevel) -> &'static str {
    match level {
        SkillLevel::Beginner => {
            "Explanation-first tone with simple language, helpful pointers, and explicit signposts."
        }
        SkillLevel::Intermediate => {
            "Thoughtful pacing, targeted rebuttals, and clear impact weighing."
        }
        SkillLevel::Advanced => {
            "Sophisticated nuance, multiple clash points, and layered reasoning."
        }
        SkillLevel::Professional => {
            "Tournament-level precision, bias awareness, and strong weighing mechanics."
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContextEntry<'a> {
    speaker: Speaker,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    transcript: Option<&'a str>,
}

/// Serialize the trimmed turn log, oldest-first within the window.
fn summarize_context(context: &[Turn]) -> String {
    let window_start = context.len().saturating_sub(CONTEXT_WINDOW);
    let entries: Vec<ContextEntry<'_>> = context[window_start..]
        .iter()
        .map(|turn| ContextEntry {
            speaker: turn.speaker,
            text: &turn.text,
            transcript: turn.transcript.as_deref(),
        })
        .collect();
    serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string())
}

/// Build the instruction payload for the next speech.
pub fn build_prompt(req: &SpeechRequest) -> BuiltPrompt {
    let motion = {
        let cleaned = sanitize(&req.motion);
        if cleaned.is_empty() {
            "Unspecified motion".to_string()
        } else {
            cleaned
        }
    };
    let tone = {
        let cleaned = sanitize(&req.tone);
        if cleaned.is_empty() {
            "formal".to_string()
        } else {
            cleaned
        }
    };
    let targets = SpeechTargets::for_time_limit(req.time_limit);
    let context_json = summarize_context(&req.context);
    let stage = req.stage.as_str();

    let user = format!(
        "DEBATE SNAPSHOT\n\
Motion: \"{motion}\"\n\
AI Role: {ai_role}\n\
User Role: {user_role}\n\
Round: {round} ({stage})\n\
Desired tone: {tone}\n\
Speech length target: {target} words (acceptable range {min}-{max})\n\
Skill Level: {skill} ({skill_note})\n\
\n\
RECENT TURN LOG (trimmed to {window} entries, most recent last):\n\
{context_json}\n\
\n\
TASK\n\
Deliver the next {stage} speech. Behave like a human parliamentary debater:\n\
- Reference the motion explicitly in the opening sentence.\n\
- Use unmistakable signposts (e.g., \"First\", \"Second\", \"Let me rebut\", \"Finally\").\n\
- Weigh impacts and explain why your bench wins even if one of your arguments collapses.\n\
- Summarize and dismantle the opponent's latest material before presenting extensions.\n\
- Insert [[PAUSE_SHORT]] for comma-length rests and [[PAUSE_LONG]] between major sections to guide TTS pacing.\n\
- Stay within {min}-{max} words.\n\
\n\
OUTPUT JSON EXACTLY IN THIS SHAPE (single-line JSON, no extra prose):\n\
{{\n\
  \"round\": {round},\n\
  \"stage\": \"{stage}\",\n\
  \"tone\": \"{tone}\",\n\
  \"word_target\": {target},\n\
  \"word_count\": <integer>,\n\
  \"text\": \"<full speech with natural paragraphs and pause tokens>\",\n\
  \"points\": [\n\
    \"Point label - claim, mechanism, and impact\",\n\
    \"Point label - claim, mechanism, and impact\"\n\
  ],\n\
  \"rebuttals\": [\n\
    \"Opponent claim - your counter and weighing\"\n\
  ],\n\
  \"closing\": \"<concise weighing + call to action>\",\n\
  \"confidence_score\": <0.0-1.0>\n\
}}\n\
\n\
Ensure the JSON is valid and the \"word_count\" matches the actual length of \"text\".",
        ai_role = req.side.bench_name(),
        user_role = req.side.complement().bench_name(),
        round = req.round,
        target = targets.target,
        min = targets.min,
        max = targets.max,
        skill = req.skill_level.as_str(),
        skill_note = skill_note(req.skill_level),
        window = CONTEXT_WINDOW,
    );

    let max_tokens = MAX_COMPLETION_TOKENS.min((f64::from(targets.target) * 2.2).round() as u32);

    BuiltPrompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
        max_tokens,
        shape: ReplyShape {
            round: req.round,
            stage: stage.to_string(),
            tone,
            word_target: targets.target,
        },
        targets,
    }
}
