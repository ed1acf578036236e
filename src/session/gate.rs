//! Answer gate.
//!
//! The single authority on whether the user actually answered. Both
//! protocols route every utterance through [`AnswerGate`] before touching
//! any counter.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Minimum normalized length of a meaningful answer.
pub const MIN_MEANINGFUL_LEN: usize = 15;

/// Utterances that never count as an answer, compared after normalization.
pub const FILLER_PHRASES: &[&str] =
    &["ok", "okay", "yes", "no", "maybe", "sure", "i guess", "i think so", "not sure", "idk"];

/// One of the four Ikigai dimensions a phase collects answers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Love,
    GoodAt,
    WorldNeeds,
    PaidFor,
}

impl Dimension {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Love => "love",
            Self::GoodAt => "good_at",
            Self::WorldNeeds => "world_needs",
            Self::PaidFor => "paid_for",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Meaningful answers recorded per dimension.
///
/// Counts only ever go up within a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhaseAnswerCounts {
    pub love: u32,
    pub good_at: u32,
    pub world_needs: u32,
    pub paid_for: u32,
}

impl PhaseAnswerCounts {
    pub fn get(&self, dimension: Dimension) -> u32 {
        match dimension {
            Dimension::Love => self.love,
            Dimension::GoodAt => self.good_at,
            Dimension::WorldNeeds => self.world_needs,
            Dimension::PaidFor => self.paid_for,
        }
    }

    fn slot(&mut self, dimension: Dimension) -> &mut u32 {
        match dimension {
            Dimension::Love => &mut self.love,
            Dimension::GoodAt => &mut self.good_at,
            Dimension::WorldNeeds => &mut self.world_needs,
            Dimension::PaidFor => &mut self.paid_for,
        }
    }

    /// Seed a dimension from prior-session data. Never lowers a count.
    pub fn seed(&mut self, dimension: Dimension, value: u32) {
        let slot = self.slot(dimension);
        *slot = (*slot).max(value);
    }
}

/// Classifies utterances as meaningful answers or filler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerGate {
    min_len: usize,
}

impl AnswerGate {
    pub const fn new(min_len: usize) -> Self {
        Self { min_len }
    }

    pub fn min_len(&self) -> usize {
        self.min_len
    }

    /// Whether the utterance is long enough and not a filler phrase.
    pub fn is_meaningful(&self, utterance: &str) -> bool {
        let normalized = normalize(utterance);
        let bare = normalized.trim_end_matches(['.', '!', '?', ',']);
        normalized.chars().count() >= self.min_len && !FILLER_PHRASES.contains(&bare)
    }

    /// Count the utterance toward `dimension` if it is meaningful.
    ///
    /// Returns the resulting count; filler leaves the counts untouched.
    pub fn record_answer(
        &self,
        counts: &mut PhaseAnswerCounts,
        dimension: Dimension,
        utterance: &str,
    ) -> u32 {
        if self.is_meaningful(utterance) {
            *counts.slot(dimension) += 1;
        }
        counts.get(dimension)
    }
}

impl Default for AnswerGate {
    fn default() -> Self {
        Self::new(MIN_MEANINGFUL_LEN)
    }
}

/// [`AnswerGate::is_meaningful`] with the default minimum length.
pub fn is_meaningful(utterance: &str) -> bool {
    AnswerGate::default().is_meaningful(utterance)
}

/// Trim, collapse inner whitespace and case-fold.
fn normalize(utterance: &str) -> String {
    utterance.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meaningful_answer() {
        assert!(is_meaningful("I love teaching kids how to paint"));
    }

    #[test]
    fn test_short_answer_is_filler() {
        assert!(!is_meaningful("painting"));
        assert!(!is_meaningful("   "));
    }

    #[test]
    fn test_filler_set_is_case_and_space_insensitive() {
        for filler in ["OK", "  Okay ", "I   Think   So", "NOT SURE", "idk."] {
            assert!(!is_meaningful(filler), "{filler:?} should be filler");
        }
    }

    #[test]
    fn test_filler_with_long_min_len_setting() {
        let gate = AnswerGate::new(2);
        assert!(!gate.is_meaningful("i think so"));
        assert!(gate.is_meaningful("hiking"));
    }

    #[test]
    fn test_classification_is_stable() {
        let utterance = "  Building furniture with my dad  ";
        let first = is_meaningful(utterance);
        assert!((0..10).all(|_| is_meaningful(utterance) == first));
    }

    #[test]
    fn test_record_answer_ignores_filler() {
        let gate = AnswerGate::default();
        let mut counts = PhaseAnswerCounts::default();

        assert_eq!(gate.record_answer(&mut counts, Dimension::Love, "maybe"), 0);
        assert_eq!(
            gate.record_answer(&mut counts, Dimension::Love, "Cooking for my friends on Sundays"),
            1
        );
        assert_eq!(gate.record_answer(&mut counts, Dimension::Love, "sure"), 1);
        assert_eq!(counts.good_at, 0);
    }

    #[test]
    fn test_seed_never_lowers() {
        let mut counts = PhaseAnswerCounts { good_at: 2, ..Default::default() };
        counts.seed(Dimension::GoodAt, 3);
        assert_eq!(counts.good_at, 3);
        counts.seed(Dimension::GoodAt, 1);
        assert_eq!(counts.good_at, 3);
    }
}
