//! Ikigai phases and the storage they fill.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{generate_id, ExtractedBucket, IkigaiProfile, Overlaps, SessionError, SessionResult};
use crate::extract::clean_bullets;

use super::gate::Dimension;
use super::transcript::Exchange;

/// Ikigai Builder states, in their only legal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IkigaiPhase {
    Phase1Love,
    Phase2GoodAt,
    Phase3World,
    Phase4Paid,
    Complete,
}

impl IkigaiPhase {
    /// Phases that hold a conversation.
    pub const CONVERSATIONAL: [Self; 4] =
        [Self::Phase1Love, Self::Phase2GoodAt, Self::Phase3World, Self::Phase4Paid];

    /// Next phase. `Complete` is terminal.
    pub fn next(self) -> Self {
        match self {
            Self::Phase1Love => Self::Phase2GoodAt,
            Self::Phase2GoodAt => Self::Phase3World,
            Self::Phase3World => Self::Phase4Paid,
            Self::Phase4Paid | Self::Complete => Self::Complete,
        }
    }

    pub fn dimension(self) -> Option<Dimension> {
        match self {
            Self::Phase1Love => Some(Dimension::Love),
            Self::Phase2GoodAt => Some(Dimension::GoodAt),
            Self::Phase3World => Some(Dimension::WorldNeeds),
            Self::Phase4Paid => Some(Dimension::PaidFor),
            Self::Complete => None,
        }
    }

    pub fn number(self) -> Option<u8> {
        match self {
            Self::Phase1Love => Some(1),
            Self::Phase2GoodAt => Some(2),
            Self::Phase3World => Some(3),
            Self::Phase4Paid => Some(4),
            Self::Complete => None,
        }
    }

    /// Stage tag stored on exchanges.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Phase1Love => "phase1_love",
            Self::Phase2GoodAt => "phase2_good_at",
            Self::Phase3World => "phase3_world",
            Self::Phase4Paid => "phase4_paid",
            Self::Complete => "complete",
        }
    }

    /// Human readable name.
    pub fn label(self) -> &'static str {
        match self {
            Self::Phase1Love => "What you love",
            Self::Phase2GoodAt => "What you're good at",
            Self::Phase3World => "What the world needs",
            Self::Phase4Paid => "What you can be paid for",
            Self::Complete => "Complete",
        }
    }
}

impl fmt::Display for IkigaiPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which phases were filled from a Why profile instead of a conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoFilledPhases {
    pub phase1_love: bool,
    pub phase2_good_at: bool,
}

impl AutoFilledPhases {
    pub fn get(&self, phase: IkigaiPhase) -> bool {
        match phase {
            IkigaiPhase::Phase1Love => self.phase1_love,
            IkigaiPhase::Phase2GoodAt => self.phase2_good_at,
            _ => false,
        }
    }
}

/// Outcome of one finished phase. Replaced whole, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseRecord {
    #[serde(default)]
    pub conversation: Vec<Exchange>,
    pub bucket: ExtractedBucket,
    #[serde(default)]
    pub key_insights: Vec<String>,
    pub completed_at: DateTime<Utc>,
    pub exchange_count: u32,
    #[serde(default)]
    pub auto_filled: bool,
}

/// Per-phase records plus overlaps; the unit of resume and profile building.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhaseStorage {
    pub phase1: Option<PhaseRecord>,
    pub phase2: Option<PhaseRecord>,
    pub phase3: Option<PhaseRecord>,
    pub phase4: Option<PhaseRecord>,
    pub overlaps: Option<Overlaps>,
    pub source_why_profile_id: Option<String>,
}

impl PhaseStorage {
    pub fn get(&self, phase: IkigaiPhase) -> Option<&PhaseRecord> {
        match phase {
            IkigaiPhase::Phase1Love => self.phase1.as_ref(),
            IkigaiPhase::Phase2GoodAt => self.phase2.as_ref(),
            IkigaiPhase::Phase3World => self.phase3.as_ref(),
            IkigaiPhase::Phase4Paid => self.phase4.as_ref(),
            IkigaiPhase::Complete => None,
        }
    }

    /// Store a phase outcome, replacing any earlier one.
    pub fn set(&mut self, phase: IkigaiPhase, record: PhaseRecord) {
        let slot = match phase {
            IkigaiPhase::Phase1Love => &mut self.phase1,
            IkigaiPhase::Phase2GoodAt => &mut self.phase2,
            IkigaiPhase::Phase3World => &mut self.phase3,
            IkigaiPhase::Phase4Paid => &mut self.phase4,
            IkigaiPhase::Complete => return,
        };
        *slot = Some(record);
    }

    pub fn completed_phases(&self) -> usize {
        IkigaiPhase::CONVERSATIONAL.iter().filter(|p| self.get(**p).is_some()).count()
    }

    /// All four phases stored and overlaps computed.
    pub fn is_complete(&self) -> bool {
        self.completed_phases() == IkigaiPhase::CONVERSATIONAL.len() && self.overlaps.is_some()
    }

    /// Bullets collected for `phase`, empty when the phase is not done.
    pub fn bullets(&self, phase: IkigaiPhase) -> Vec<String> {
        self.get(phase).map(|r| r.bucket.bullets.clone()).unwrap_or_default()
    }

    /// Assemble the durable profile. Fails unless every part is present.
    pub fn to_profile(
        &self,
        name: impl Into<String>,
        why_statement: impl Into<String>,
        auto_filled: AutoFilledPhases,
    ) -> SessionResult<IkigaiProfile> {
        let missing = |what: &str| SessionError::ProfileIncomplete(format!("{what} is missing"));
        let bucket = |phase: IkigaiPhase| {
            self.get(phase).map(|r| r.bucket.clone().into()).ok_or_else(|| missing(phase.label()))
        };

        let love = bucket(IkigaiPhase::Phase1Love)?;
        let good_at = bucket(IkigaiPhase::Phase2GoodAt)?;
        let world_needs = bucket(IkigaiPhase::Phase3World)?;
        let paid_for = bucket(IkigaiPhase::Phase4Paid)?;
        let overlaps = self.overlaps.clone().ok_or_else(|| missing("Overlap analysis"))?;

        let key_patterns = clean_bullets(
            IkigaiPhase::CONVERSATIONAL
                .iter()
                .filter_map(|p| self.get(*p))
                .flat_map(|r| r.key_insights.iter()),
        );

        Ok(IkigaiProfile {
            id: generate_id("ikigai"),
            name: name.into(),
            created_at: Utc::now(),
            source_why_profile_id: self.source_why_profile_id.clone(),
            why_statement: why_statement.into(),
            love,
            good_at,
            world_needs,
            paid_for,
            overlaps,
            key_patterns,
            auto_filled_phases: auto_filled,
            is_complete: true,
            updated_at: None,
        })
    }
}
