//! Enforcement layer.
//!
//! Sanitizes finished model responses so stage-ordering rules hold no
//! matter what the model decided to say:
//!
//! - a conclusion ("Your Why is: ...") never reaches the user before the
//!   protocol allows it
//! - an authorized final verdict never ends by asking another question
//!
//! These functions only ever see fully assembled text, never stream fragments.

use once_cell::sync::Lazy;
use regex::Regex;

/// Shown when almost nothing is left after removing a premature conclusion.
pub const GENERIC_FOLLOW_UP: &str = "Thank you, that helps me understand you better. \
Can you tell me about a specific moment when you felt completely absorbed in what you were doing?";

/// Appended when the kept text does not already end with a question.
pub const FOLLOW_UP_QUESTION: &str = "What else comes to mind when you think about that?";

/// Kept text shorter than this is replaced by [`GENERIC_FOLLOW_UP`].
const MIN_REMAINDER_LEN: usize = 50;

/// Interrogative lines at least this long are trimmed by sentence instead of dropped.
const MAX_TRAILING_QUESTION_LEN: usize = 100;

/// How many trailing non-blank lines are inspected for questions.
const TRAILING_WINDOW: usize = 3;

static CONCLUSION_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)(?:\b(?:your\s+why(?:\s+is|\s+statement)?|why\s+statement)[*_\s]*:)|(?:^[ \t>]*#{1,6}[ \t]*(?:your\s+why|why\s+statement)\b)",
    )
    .unwrap()
});

/// Outcome of [`strip_premature_conclusion`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripResult {
    pub cleaned: String,
    pub was_stripped: bool,
}

impl StripResult {
    fn unchanged(text: &str) -> Self {
        Self { cleaned: text.to_string(), was_stripped: false }
    }
}

/// Whether `text` contains a final-verdict marker.
pub fn has_conclusion(text: &str) -> bool {
    CONCLUSION_MARKER.is_match(text)
}

/// Remove a conclusion delivered before exchange `total`.
///
/// At or after `total` the text is returned unchanged. Otherwise everything
/// from the first conclusion marker on is dropped and the reply is made to
/// end with a question.
pub fn strip_premature_conclusion(text: &str, exchange_index: u32, total: u32) -> StripResult {
    if exchange_index >= total {
        return StripResult::unchanged(text);
    }
    let Some(marker) = CONCLUSION_MARKER.find(text) else {
        return StripResult::unchanged(text);
    };

    let remainder = text[..marker.start()]
        .trim_end_matches(|c: char| matches!(c, '*' | '_' | '#' | '>') || c.is_whitespace());

    let cleaned = if remainder.chars().count() < MIN_REMAINDER_LEN {
        GENERIC_FOLLOW_UP.to_string()
    } else if remainder.ends_with('?') {
        remainder.to_string()
    } else {
        format!("{}\n\n{}", remainder, FOLLOW_UP_QUESTION)
    };

    tracing::debug!(
        exchange_index,
        total,
        removed_bytes = text.len() - marker.start(),
        "Stripped premature conclusion"
    );

    StripResult { cleaned, was_stripped: true }
}

/// Remove trailing questions from an authorized final verdict.
///
/// Short interrogative lines among the last few non-blank lines are dropped;
/// a long final line keeps its statements and loses its trailing questions.
pub fn strip_trailing_questions(text: &str) -> String {
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();

    let mut seen = 0;
    let mut idx = lines.len();
    while idx > 0 && seen < TRAILING_WINDOW {
        idx -= 1;
        let trimmed = lines[idx].trim();
        if trimmed.is_empty() {
            continue;
        }
        seen += 1;
        if is_question(trimmed) && trimmed.chars().count() < MAX_TRAILING_QUESTION_LEN {
            lines.remove(idx);
        }
    }

    pop_blank(&mut lines);
    if let Some(last) = lines.last_mut() {
        if is_question(last.trim()) {
            *last = drop_trailing_question_sentences(last);
        }
    }
    pop_blank(&mut lines);

    lines.join("\n")
}

fn is_question(line: &str) -> bool {
    line.trim_end_matches(|c: char| matches!(c, '*' | '_' | '"' | ')') || c.is_whitespace())
        .ends_with('?')
}

fn pop_blank(lines: &mut Vec<String>) {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
}

/// Split a line into sentences and drop the interrogative ones at the end.
fn drop_trailing_question_sentences(line: &str) -> String {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = line.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(next, n)) = chars.peek() {
                if n.is_whitespace() {
                    sentences.push(&line[start..next]);
                    start = next;
                }
            }
        }
    }
    sentences.push(&line[start..]);

    while sentences.last().is_some_and(|s| is_question(s) || s.trim().is_empty()) {
        sentences.pop();
    }

    sentences.iter().map(|s| s.trim()).collect::<Vec<_>>().join(" ")
}
