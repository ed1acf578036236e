//! Session orchestration engine.
//!
//! Each protocol is a pure reducer: given the current state and an event it
//! returns the next state plus the effects it wants performed. Reducers never
//! talk to models or storage; the [`Orchestrator`] does that and feeds the
//! results back in as events.
//!
//! ```text
//! UserSubmitted -> reduce -> RequestCompletion -> (stream) -> ResponseFragment*
//!                                                           -> ResponseCompleted -> reduce -> ...
//! ```

mod decision;
pub mod gate;
mod ikigai;
mod orchestrator;
mod phase;
mod snapshot;
mod transcript;
mod why_finder;

pub use decision::DecisionHelperState;
pub use gate::{is_meaningful, AnswerGate, Dimension, PhaseAnswerCounts};
pub use ikigai::{fallback_bucket, IkigaiSettings, IkigaiState, WhySource};
pub use orchestrator::{CancelHandle, Collaborators, Orchestrator, Outcome};
pub use phase::{AutoFilledPhases, IkigaiPhase, PhaseRecord, PhaseStorage};
pub use snapshot::{SessionMode, SessionSnapshot};
pub use transcript::{Exchange, ExchangeKind, ExchangeStatus, InFlight, Transcript, STOPPED_LABEL};
pub use why_finder::{WhyFinderState, WhyStage, WhySynthesis, WHY_TOTAL_EXCHANGES};

use chrono::{DateTime, Utc};

use crate::ai::{CompletionRequest, OverlapRequest, PhaseSummary, WhyExtraction};
use crate::core::{Overlaps, SessionResult};

/// Inputs to a session reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Open the session.
    Start { at: DateTime<Utc> },
    /// A restored session is being continued.
    Resumed,
    /// The user sent a message.
    UserSubmitted { text: String },
    /// A streamed piece of the in-flight response.
    ResponseFragment { text: String },
    ResponseCompleted,
    /// The user stopped generation.
    ResponseCancelled,
    /// The transport failed mid-response.
    ResponseFailed { error: String },
    SummaryReady { phase: IkigaiPhase, result: Result<PhaseSummary, String>, at: DateTime<Utc> },
    OverlapsReady { result: Result<Overlaps, String>, at: DateTime<Utc> },
    WhyExtractionReady { result: Result<WhyExtraction, String> },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "Start",
            Self::Resumed => "Resumed",
            Self::UserSubmitted { .. } => "UserSubmitted",
            Self::ResponseFragment { .. } => "ResponseFragment",
            Self::ResponseCompleted => "ResponseCompleted",
            Self::ResponseCancelled => "ResponseCancelled",
            Self::ResponseFailed { .. } => "ResponseFailed",
            Self::SummaryReady { .. } => "SummaryReady",
            Self::OverlapsReady { .. } => "OverlapsReady",
            Self::WhyExtractionReady { .. } => "WhyExtractionReady",
        }
    }
}

/// Work a reducer asks the orchestrator to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Show a locally produced message.
    Display(String),
    /// Replace the streamed text with its sanitized form.
    ShowResponse(String),
    RequestCompletion(CompletionRequest),
    RequestSummary { phase: IkigaiPhase, conversation: Vec<Exchange> },
    RequestOverlaps(OverlapRequest),
    RequestWhyExtraction { conversation: Vec<Exchange> },
    /// Persist the current state as the resumable snapshot.
    SaveSnapshot,
    PhaseCompleted { phase: IkigaiPhase, auto_filled: bool },
    /// The Why Finder finished; the user may save the result.
    PromptSaveWhy(WhySynthesis),
    /// The Ikigai Builder finished; the user may save the profile.
    PromptSaveIkigai,
}

/// New state plus requested effects.
#[derive(Debug, Clone)]
pub struct Transition<S> {
    pub state: S,
    pub effects: Vec<Effect>,
}

/// A session protocol driven by [`SessionEvent`]s.
pub trait SessionMachine: Clone + Send + Sync {
    fn mode(&self) -> SessionMode;

    /// Compute the next state. `self` is never modified.
    fn reduce(&self, event: SessionEvent) -> SessionResult<Transition<Self>>;

    fn transcript(&self) -> &Transcript;

    fn is_complete(&self) -> bool;

    /// Resumable snapshot, or `None` for sessions that are not resumable.
    fn snapshot(&self, at: DateTime<Utc>) -> Option<SessionSnapshot>;
}
