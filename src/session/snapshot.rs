//! Resumable session snapshots.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::gate::PhaseAnswerCounts;
use super::phase::{AutoFilledPhases, IkigaiPhase, PhaseStorage};
use super::transcript::Exchange;

/// Which protocol a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    WhyFinder,
    IkigaiBuilder,
    DecisionHelper,
}

impl SessionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WhyFinder => "why_finder",
            Self::IkigaiBuilder => "ikigai_builder",
            Self::DecisionHelper => "decision_helper",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to resume a session after a restart.
///
/// Streaming state is never captured; a resumed session is always idle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub mode: SessionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ikigai_phase: Option<IkigaiPhase>,
    #[serde(default)]
    pub phase_storage: PhaseStorage,
    #[serde(default)]
    pub transcript: Vec<Exchange>,
    #[serde(default)]
    pub auto_filled: AutoFilledPhases,
    #[serde(default)]
    pub answer_counts: PhaseAnswerCounts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_why_profile_id: Option<String>,
    #[serde(default)]
    pub why_exchange_count: u32,
    pub last_updated: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn new(mode: SessionMode, at: DateTime<Utc>) -> Self {
        Self {
            mode,
            ikigai_phase: None,
            phase_storage: PhaseStorage::default(),
            transcript: Vec::new(),
            auto_filled: AutoFilledPhases::default(),
            answer_counts: PhaseAnswerCounts::default(),
            source_why_profile_id: None,
            why_exchange_count: 0,
            last_updated: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_json_shape() {
        let mut snapshot = SessionSnapshot::new(SessionMode::IkigaiBuilder, Utc::now());
        snapshot.ikigai_phase = Some(IkigaiPhase::Phase3World);
        snapshot.auto_filled.phase2_good_at = true;

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["mode"], "ikigai_builder");
        assert_eq!(json["ikigaiPhase"], "phase3_world");
        assert_eq!(json["autoFilled"]["phase2_good_at"], true);
        assert!(json.get("sourceWhyProfileId").is_none());
    }

    #[test]
    fn test_snapshot_tolerates_missing_optional_fields() {
        let json = r#"{"mode": "why_finder", "lastUpdated": "2026-01-02T03:04:05Z"}"#;
        let snapshot: SessionSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.mode, SessionMode::WhyFinder);
        assert!(snapshot.transcript.is_empty());
        assert_eq!(snapshot.why_exchange_count, 0);
    }
}
