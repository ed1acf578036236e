//! Durable profile artifacts and the insight buckets they are built from.
//!
//! Field names serialize as camelCase so saved profiles keep the same JSON
//! shape across versions of the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extract::{clean_bullets, MIN_BULLET_LEN};
use crate::session::{AutoFilledPhases, WhySynthesis};

/// Generate a unique identifier with a readable prefix.
pub fn generate_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}

/// Structured insight harvested from one "circle" of the interview.
///
/// Bullets are always normalized: trimmed, de-duplicated, longer than the
/// minimum bullet length and free of headings or markdown artifacts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedBucket {
    pub bullets: Vec<String>,
    pub quotes: Vec<String>,
    pub summary: String,
}

impl ExtractedBucket {
    /// Build a bucket, normalizing the bullet list.
    pub fn new(bullets: Vec<String>, quotes: Vec<String>, summary: impl Into<String>) -> Self {
        let quotes = quotes.into_iter().map(|q| q.trim().to_string()).filter(|q| !q.is_empty()).collect();
        Self { bullets: clean_bullets(bullets), quotes, summary: summary.into().trim().to_string() }
    }

    /// Build a bucket from the user's own answers.
    ///
    /// Answers are trimmed, de-duplicated and length-filtered only. Heading
    /// detection is for model output; a user who types in capitals or ends
    /// with a colon still keeps their answer.
    pub fn from_answers<I, S>(answers: I, summary: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = std::collections::HashSet::new();
        let bullets = answers
            .into_iter()
            .map(|a| a.as_ref().trim().to_string())
            .filter(|a| a.chars().count() >= MIN_BULLET_LEN && seen.insert(a.to_lowercase()))
            .collect();
        Self { bullets, quotes: Vec::new(), summary: summary.into().trim().to_string() }
    }

    /// Whether the bucket carries no usable insight.
    pub fn is_empty(&self) -> bool {
        self.bullets.is_empty() && self.summary.is_empty()
    }
}

/// Bucket shape stored on Ikigai profiles and overlaps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IkigaiBucket {
    pub bullets: Vec<String>,
    pub summary: String,
}

impl IkigaiBucket {
    pub fn new(bullets: Vec<String>, summary: impl Into<String>) -> Self {
        Self { bullets: clean_bullets(bullets), summary: summary.into().trim().to_string() }
    }
}

impl From<ExtractedBucket> for IkigaiBucket {
    fn from(bucket: ExtractedBucket) -> Self {
        Self { bullets: bucket.bullets, summary: bucket.summary }
    }
}

/// The four derived Ikigai intersections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overlaps {
    /// Love x Good at
    pub passion: IkigaiBucket,
    /// Love x World needs
    pub mission: IkigaiBucket,
    /// Good at x Paid for
    pub profession: IkigaiBucket,
    /// World needs x Paid for
    pub vocation: IkigaiBucket,
    pub computed_at: DateTime<Utc>,
}

impl Overlaps {
    /// Placeholder overlaps used when computation fails, so the session can still finish.
    pub fn placeholder(at: DateTime<Utc>) -> Self {
        let pending = || IkigaiBucket {
            bullets: Vec::new(),
            summary: "Overlap analysis was not available for this session.".to_string(),
        };
        Self {
            passion: pending(),
            mission: pending(),
            profession: pending(),
            vocation: pending(),
            computed_at: at,
        }
    }

    /// Whether these are the fallback placeholders.
    pub fn is_placeholder(&self) -> bool {
        [&self.passion, &self.mission, &self.profession, &self.vocation]
            .iter()
            .all(|b| b.bullets.is_empty())
    }
}

/// Result of a completed Why Finder session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhyProfile {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub summary: String,
    pub patterns: String,
    pub why_statement: String,
    pub why_explanation: String,
    #[serde(default)]
    pub what_you_love: Vec<String>,
    #[serde(default)]
    pub what_you_are_good_at: Vec<String>,
    pub model_used: String,
    pub exchange_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl WhyProfile {
    /// Create a profile from a finished synthesis.
    pub fn new(
        name: impl Into<String>,
        synthesis: &WhySynthesis,
        model_used: impl Into<String>,
        exchange_count: u32,
    ) -> Self {
        Self {
            id: generate_id("why"),
            name: name.into(),
            created_at: Utc::now(),
            summary: synthesis.learning_summary.clone(),
            patterns: synthesis.patterns.clone(),
            why_statement: synthesis.why_statement.clone(),
            why_explanation: synthesis.why_explanation.clone(),
            what_you_love: synthesis.what_you_love.clone(),
            what_you_are_good_at: synthesis.what_you_are_good_at.clone(),
            model_used: model_used.into(),
            exchange_count,
            updated_at: None,
        }
    }

    pub fn summary_view(&self) -> WhyProfileSummary {
        WhyProfileSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            why_statement: self.why_statement.clone(),
            created_at: self.created_at,
            love_count: self.what_you_love.len(),
            good_at_count: self.what_you_are_good_at.len(),
        }
    }
}

/// Listing view of a Why profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhyProfileSummary {
    pub id: String,
    pub name: String,
    pub why_statement: String,
    pub created_at: DateTime<Utc>,
    pub love_count: usize,
    pub good_at_count: usize,
}

/// Result of a completed Ikigai Builder session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IkigaiProfile {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_why_profile_id: Option<String>,
    pub why_statement: String,
    pub love: IkigaiBucket,
    pub good_at: IkigaiBucket,
    pub world_needs: IkigaiBucket,
    pub paid_for: IkigaiBucket,
    pub overlaps: Overlaps,
    #[serde(default)]
    pub key_patterns: Vec<String>,
    #[serde(default)]
    pub auto_filled_phases: AutoFilledPhases,
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl IkigaiProfile {
    pub fn summary_view(&self) -> IkigaiProfileSummary {
        IkigaiProfileSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            why_statement: self.why_statement.clone(),
            is_complete: self.is_complete,
            created_at: self.created_at,
        }
    }
}

/// Listing view of an Ikigai profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IkigaiProfileSummary {
    pub id: String,
    pub name: String,
    pub why_statement: String,
    pub is_complete: bool,
    pub created_at: DateTime<Utc>,
}
