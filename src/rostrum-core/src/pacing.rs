//! Speech-pacing markers.
//!
//! Generated speeches may embed two tokens marking vocal rests. Synthesis
//! turns them into punctuation so the voice provider renders natural pauses;
//! the presentation layer strips them entirely before showing or timing text.

use std::sync::LazyLock;

use regex::Regex;

/// Comma-length rest.
pub const PAUSE_SHORT: &str = "[[PAUSE_SHORT]]";
/// Sentence-boundary rest between major sections.
pub const PAUSE_LONG: &str = "[[PAUSE_LONG]]";

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n\s*\r?\n").expect("paragraph regex"));
static LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\r?\n").expect("line regex"));
static LONG_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*\[\[pause_long\]\]\s*").expect("long marker regex"));
static SHORT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*\[\[pause_short\]\]\s*").expect("short marker regex"));
static ANY_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\[\[pause_(?:short|long)\]\]\s*").expect("marker regex")
});
static SPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").expect("space regex"));

/// Prepare text for a voice-rendering provider: paragraph breaks become long
/// pauses, then both markers become their punctuation equivalents.
pub fn normalize_for_speech(text: &str) -> String {
    let text = PARAGRAPH_BREAK.replace_all(text, format!(" {PAUSE_LONG} ").as_str());
    let text = LINE_BREAK.replace_all(&text, " ");
    let text = LONG_MARKER.replace_all(&text, ". ");
    let text = SHORT_MARKER.replace_all(&text, ", ");
    let text = SPACE_RUN.replace_all(&text, " ");
    text.trim().trim_start_matches(['.', ',', ' ']).to_string()
}

/// Remove markers entirely for on-screen display.
pub fn strip_for_display(text: &str) -> String {
    let text = ANY_MARKER.replace_all(text, " ");
    let text = SPACE_RUN.replace_all(&text, " ");
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_become_punctuation_for_speech() {
        let input = "A [[PAUSE_SHORT]] B [[PAUSE_LONG]] C";
        assert_eq!(normalize_for_speech(input), "A, B. C");
    }

    #[test]
    fn markers_vanish_for_display() {
        let input = "A [[PAUSE_SHORT]] B [[PAUSE_LONG]] C";
        assert_eq!(strip_for_display(input), "A B C");
    }

    #[test]
    fn markers_are_case_insensitive() {
        assert_eq!(normalize_for_speech("A [[pause_short]] B"), "A, B");
        assert_eq!(strip_for_display("A [[Pause_Long]] B"), "A B");
    }

    #[test]
    fn paragraph_breaks_read_as_long_pauses() {
        assert_eq!(normalize_for_speech("First point.\n\nSecond point."), "First point. Second point.");
    }

    #[test]
    fn single_newlines_collapse_to_spaces() {
        assert_eq!(normalize_for_speech("one\ntwo"), "one two");
    }

    #[test]
    fn leading_marker_does_not_leave_punctuation() {
        assert_eq!(normalize_for_speech("[[PAUSE_LONG]] Friends, colleagues."), "Friends, colleagues.");
    }

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(normalize_for_speech("Nothing to see here."), "Nothing to see here.");
        assert_eq!(strip_for_display("Nothing to see here."), "Nothing to see here.");
    }
}
