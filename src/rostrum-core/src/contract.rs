//! The structured contract a generated speech must conform to, and the
//! salvage path that turns non-conforming output into a usable speech anyway.

use serde::{Deserialize, Serialize};

/// Confidence assigned when the provider did not report one, or when the
/// output had to be salvaged from raw text.
const FALLBACK_CONFIDENCE: f32 = 0.5;

/// A parsed speech as returned by the generation capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechContract {
    pub round: u32,
    pub stage: String,
    pub tone: String,
    pub word_target: u32,
    pub word_count: u32,
    pub text: String,
    pub points: Vec<String>,
    pub rebuttals: Vec<String>,
    pub closing: String,
    pub confidence_score: f32,
}

/// The values the engine asked for; used to backfill whatever the provider
/// left out of its reply.
#[derive(Debug, Clone)]
pub struct ReplyShape {
    pub round: u32,
    pub stage: String,
    pub tone: String,
    pub word_target: u32,
}

/// Outcome of parsing a generation reply. `Salvaged` marks the fallback
/// path where the raw output became the speech body verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum ContractOutcome {
    Parsed(SpeechContract),
    Salvaged(SpeechContract),
}

impl ContractOutcome {
    pub fn contract(&self) -> &SpeechContract {
        match self {
            Self::Parsed(c) | Self::Salvaged(c) => c,
        }
    }

    pub fn into_contract(self) -> SpeechContract {
        match self {
            Self::Parsed(c) | Self::Salvaged(c) => c,
        }
    }

    pub fn is_salvaged(&self) -> bool {
        matches!(self, Self::Salvaged(_))
    }
}

/// Wire shape with every field optional, so a reply that forgot a field
/// still parses and gets backfilled instead of being thrown away.
#[derive(Debug, Deserialize)]
struct WireContract {
    round: Option<u32>,
    stage: Option<String>,
    tone: Option<String>,
    word_target: Option<u32>,
    word_count: Option<u32>,
    text: Option<String>,
    points: Option<Vec<String>>,
    rebuttals: Option<Vec<String>>,
    closing: Option<String>,
    confidence_score: Option<f32>,
}

/// Parse raw generation output against the contract. Invalid JSON, or JSON
/// without a usable speech body, never fails the turn: the raw text is
/// promoted to the speech body and the rest is synthesized.
pub fn parse_reply(raw: &str, shape: &ReplyShape) -> ContractOutcome {
    match serde_json::from_str::<WireContract>(raw.trim()) {
        Ok(wire) => {
            let text = wire
                .text
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| raw.to_string());
            let word_count = wire
                .word_count
                .filter(|c| *c > 0)
                .unwrap_or_else(|| count_words(&text));
            ContractOutcome::Parsed(SpeechContract {
                round: wire.round.unwrap_or(shape.round),
                stage: wire.stage.unwrap_or_else(|| shape.stage.clone()),
                tone: wire.tone.unwrap_or_else(|| shape.tone.clone()),
                word_target: wire
                    .word_target
                    .filter(|t| *t > 0)
                    .unwrap_or(shape.word_target),
                word_count,
                text,
                points: wire.points.unwrap_or_default(),
                rebuttals: wire.rebuttals.unwrap_or_default(),
                closing: wire.closing.unwrap_or_default(),
                confidence_score: wire
                    .confidence_score
                    .unwrap_or(FALLBACK_CONFIDENCE)
                    .clamp(0.0, 1.0),
            })
        }
        Err(_) => ContractOutcome::Salvaged(salvage(raw, shape)),
    }
}

/// Best-effort contract built from raw, non-conforming output.
pub fn salvage(raw: &str, shape: &ReplyShape) -> SpeechContract {
    SpeechContract {
        round: shape.round,
        stage: shape.stage.clone(),
        tone: shape.tone.clone(),
        word_target: shape.word_target,
        word_count: count_words(raw),
        text: raw.to_string(),
        points: Vec::new(),
        rebuttals: Vec::new(),
        closing: String::new(),
        confidence_score: FALLBACK_CONFIDENCE,
    }
}

/// Whitespace-token word count.
pub fn count_words(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> ReplyShape {
        ReplyShape {
            round: 2,
            stage: "rebuttal".to_string(),
            tone: "formal".to_string(),
            word_target: 725,
        }
    }

    #[test]
    fn conforming_reply_parses() {
        let raw = r#"{
            "round": 2,
            "stage": "rebuttal",
            "tone": "formal",
            "word_target": 725,
            "word_count": 4,
            "text": "Four words of speech",
            "points": ["Point one"],
            "rebuttals": ["Counter one"],
            "closing": "Weigh it our way.",
            "confidence_score": 0.8
        }"#;

        let outcome = parse_reply(raw, &shape());
        assert!(!outcome.is_salvaged());
        let contract = outcome.contract();
        assert_eq!(contract.text, "Four words of speech");
        assert_eq!(contract.points, vec!["Point one".to_string()]);
        assert!((contract.confidence_score - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn missing_fields_are_backfilled() {
        let raw = r#"{"text": "Ladies and gentlemen, three words more."}"#;
        let outcome = parse_reply(raw, &shape());
        assert!(!outcome.is_salvaged());
        let contract = outcome.contract();
        assert_eq!(contract.round, 2);
        assert_eq!(contract.stage, "rebuttal");
        assert_eq!(contract.word_target, 725);
        assert_eq!(contract.word_count, 6);
        assert!(contract.points.is_empty());
        assert!((contract.confidence_score - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn malformed_json_is_salvaged_verbatim() {
        let raw = "I refuse to emit JSON but here is my speech anyway.";
        let outcome = parse_reply(raw, &shape());
        assert!(outcome.is_salvaged());
        let contract = outcome.contract();
        assert_eq!(contract.text, raw);
        assert_eq!(contract.word_count, count_words(raw));
        assert_eq!(contract.word_target, 725);
        assert!(contract.points.is_empty());
        assert!(contract.rebuttals.is_empty());
    }

    #[test]
    fn blank_text_field_falls_back_to_raw_output() {
        let raw = r#"{"text": "   ", "round": 9}"#;
        let outcome = parse_reply(raw, &shape());
        let contract = outcome.contract();
        assert_eq!(contract.text, raw);
        assert_eq!(contract.round, 9);
    }

    #[test]
    fn out_of_range_confidence_is_clamped() {
        let raw = r#"{"text": "hello there", "confidence_score": 3.5}"#;
        let contract = parse_reply(raw, &shape()).into_contract();
        assert!((contract.confidence_score - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn count_words_tokenizes_on_whitespace() {
        assert_eq!(count_words("  one   two\nthree\t four "), 4);
        assert_eq!(count_words(""), 0);
    }
}
