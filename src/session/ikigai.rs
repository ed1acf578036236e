//! Ikigai Builder: four conversational phases, then overlaps.
//!
//! A phase closes on its third meaningful answer. That answer is recorded
//! but never sent to the chat model; the phase summary is requested
//! instead and the next phase opens with a synthetic trigger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ai::prompts::{self, PHASE_START_TRIGGER};
use crate::ai::{CompletionRequest, OverlapRequest, PhaseSummary};
use crate::core::{ExtractedBucket, IkigaiProfile, Overlaps, SessionError, SessionResult, WhyProfile};

use super::gate::{AnswerGate, PhaseAnswerCounts};
use super::phase::{AutoFilledPhases, IkigaiPhase, PhaseRecord, PhaseStorage};
use super::snapshot::{SessionMode, SessionSnapshot};
use super::transcript::{Exchange, ExchangeKind, InFlight, Transcript};
use super::{Effect, SessionEvent, SessionMachine, Transition};

/// Fallback bullets keep at most this many characters of each answer.
const FALLBACK_ANSWER_LEN: usize = 150;

/// Tunables for the Ikigai Builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IkigaiSettings {
    pub answers_per_phase: u32,
    /// Why-profile items needed to skip a phase.
    pub autofill_threshold: usize,
    pub gate: AnswerGate,
}

impl Default for IkigaiSettings {
    fn default() -> Self {
        Self { answers_per_phase: 3, autofill_threshold: 3, gate: AnswerGate::default() }
    }
}

/// The parts of a Why profile the Ikigai Builder reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhySource {
    pub id: String,
    pub why_statement: String,
    pub what_you_love: Vec<String>,
    pub what_you_are_good_at: Vec<String>,
}

impl From<&WhyProfile> for WhySource {
    fn from(profile: &WhyProfile) -> Self {
        Self {
            id: profile.id.clone(),
            why_statement: profile.why_statement.clone(),
            what_you_love: profile.what_you_love.clone(),
            what_you_are_good_at: profile.what_you_are_good_at.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Idle,
    Summary(IkigaiPhase),
    Overlaps,
}

#[derive(Debug, Clone)]
pub struct IkigaiState {
    phase: IkigaiPhase,
    transcript: Transcript,
    storage: PhaseStorage,
    counts: PhaseAnswerCounts,
    auto_filled: AutoFilledPhases,
    source: Option<WhySource>,
    pending: Pending,
    settings: IkigaiSettings,
    started: bool,
}

impl IkigaiState {
    /// Create a session, deciding auto-fill from the optional Why profile.
    pub fn new(source: Option<WhySource>, settings: IkigaiSettings) -> Self {
        let auto_filled = source.as_ref().map_or_else(AutoFilledPhases::default, |s| AutoFilledPhases {
            phase1_love: s.what_you_love.len() >= settings.autofill_threshold,
            phase2_good_at: s.what_you_are_good_at.len() >= settings.autofill_threshold,
        });
        let storage = PhaseStorage {
            source_why_profile_id: source.as_ref().map(|s| s.id.clone()),
            ..PhaseStorage::default()
        };

        Self {
            phase: IkigaiPhase::Phase1Love,
            transcript: Transcript::new(),
            storage,
            counts: PhaseAnswerCounts::default(),
            auto_filled,
            source,
            pending: Pending::Idle,
            settings,
            started: false,
        }
    }

    /// Rebuild from a snapshot.
    ///
    /// `source` must be the Why profile the snapshot names, if any; a
    /// different profile is ignored.
    pub fn restore(
        snapshot: &SessionSnapshot,
        source: Option<WhySource>,
        settings: IkigaiSettings,
    ) -> SessionResult<Self> {
        if snapshot.mode != SessionMode::IkigaiBuilder {
            return Err(SessionError::SnapshotMismatch {
                expected: SessionMode::IkigaiBuilder.to_string(),
                found: snapshot.mode.to_string(),
            });
        }

        let source = source.filter(|s| snapshot.source_why_profile_id.as_deref() == Some(s.id.as_str()));
        Ok(Self {
            phase: snapshot.ikigai_phase.unwrap_or(IkigaiPhase::Phase1Love),
            transcript: Transcript::from_exchanges(snapshot.transcript.clone()),
            storage: snapshot.phase_storage.clone(),
            counts: snapshot.answer_counts,
            auto_filled: snapshot.auto_filled,
            source,
            pending: Pending::Idle,
            settings,
            started: true,
        })
    }

    pub fn phase(&self) -> IkigaiPhase {
        self.phase
    }

    pub fn storage(&self) -> &PhaseStorage {
        &self.storage
    }

    pub fn counts(&self) -> &PhaseAnswerCounts {
        &self.counts
    }

    pub fn auto_filled(&self) -> AutoFilledPhases {
        self.auto_filled
    }

    pub fn source(&self) -> Option<&WhySource> {
        self.source.as_ref()
    }

    /// A summary or overlap computation is outstanding.
    pub fn is_waiting(&self) -> bool {
        self.pending != Pending::Idle
    }

    /// Build the durable profile of a completed session.
    pub fn to_profile(&self, name: impl Into<String>) -> SessionResult<IkigaiProfile> {
        if self.phase != IkigaiPhase::Complete {
            return Err(SessionError::ProfileIncomplete(format!(
                "session is still in {}",
                self.phase.label()
            )));
        }
        let why = self.source.as_ref().map(|s| s.why_statement.clone()).unwrap_or_default();
        self.storage.to_profile(name, why, self.auto_filled)
    }

    fn stage_tag(&self) -> &'static str {
        self.phase.as_str()
    }

    /// Enter `phase`, skipping every auto-filled phase on the way.
    fn enter(&mut self, phase: IkigaiPhase, at: DateTime<Utc>) -> SessionResult<Vec<Effect>> {
        let mut effects = Vec::new();
        let mut phase = phase;

        while self.auto_filled.get(phase) && self.storage.get(phase).is_none() {
            let record = PhaseRecord {
                conversation: Vec::new(),
                bucket: self.seed_bucket(phase),
                key_insights: Vec::new(),
                completed_at: at,
                exchange_count: 0,
                auto_filled: true,
            };
            self.storage.set(phase, record);
            if let Some(dimension) = phase.dimension() {
                self.counts.seed(dimension, self.settings.answers_per_phase);
            }
            tracing::info!(phase = %phase, "Phase auto-filled from Why profile");
            effects.push(Effect::PhaseCompleted { phase, auto_filled: true });
            phase = phase.next();
        }

        self.phase = phase;
        tracing::debug!(phase = %phase, "Entering phase");
        effects.push(Effect::SaveSnapshot);

        let request = CompletionRequest::new(self.phase_prompt(), PHASE_START_TRIGGER);
        self.transcript.begin(InFlight::phase_start(phase.as_str()))?;
        effects.push(Effect::RequestCompletion(request));
        Ok(effects)
    }

    fn seed_bucket(&self, phase: IkigaiPhase) -> ExtractedBucket {
        let items = match (&self.source, phase) {
            (Some(source), IkigaiPhase::Phase1Love) => source.what_you_love.clone(),
            (Some(source), IkigaiPhase::Phase2GoodAt) => source.what_you_are_good_at.clone(),
            _ => Vec::new(),
        };
        ExtractedBucket::new(items, Vec::new(), "Carried over from your Why profile.")
    }

    fn phase_prompt(&self) -> String {
        prompts::ikigai_phase_prompt(
            self.phase,
            &self.storage,
            &self.counts,
            self.source.as_ref(),
            self.settings.answers_per_phase,
        )
    }

    fn submit(&mut self, text: &str) -> SessionResult<Vec<Effect>> {
        if !self.started {
            return Err(self.unexpected("UserSubmitted"));
        }
        let Some(dimension) = self.phase.dimension() else {
            return Err(SessionError::SessionComplete);
        };
        if self.pending != Pending::Idle || self.transcript.is_streaming() {
            return Err(SessionError::Busy);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyInput);
        }

        let gate = self.settings.gate;
        let meaningful = gate.is_meaningful(text);
        let phase = self.phase;

        if meaningful && self.counts.get(dimension) + 1 >= self.settings.answers_per_phase {
            self.transcript.record_unanswered(phase.as_str(), text, true);
            gate.record_answer(&mut self.counts, dimension, text);
            self.pending = Pending::Summary(phase);
            tracing::debug!(phase = %phase, "Phase gate reached, requesting summary");
            let conversation = self.transcript.for_stage(phase.as_str());
            return Ok(vec![Effect::RequestSummary { phase, conversation }]);
        }

        let tag = self.stage_tag();
        let request = CompletionRequest::new(self.phase_prompt(), text)
            .with_history(self.transcript.history(|e| e.stage == tag));
        self.transcript.begin(InFlight::answer(tag, text, meaningful))?;
        Ok(vec![Effect::RequestCompletion(request)])
    }

    fn complete_response(&mut self) -> SessionResult<Vec<Effect>> {
        let flight = self.transcript.take_in_flight()?;
        let response = flight.partial.trim().to_string();
        let counted = (flight.kind == ExchangeKind::Answer).then(|| flight.user_text.clone());

        self.transcript.commit(flight, response.clone());
        if let (Some(user_text), Some(dimension)) = (counted, self.phase.dimension()) {
            self.settings.gate.record_answer(&mut self.counts, dimension, &user_text);
        }

        Ok(vec![Effect::ShowResponse(response), Effect::SaveSnapshot])
    }

    fn summary_ready(
        &mut self,
        phase: IkigaiPhase,
        result: Result<PhaseSummary, String>,
        at: DateTime<Utc>,
    ) -> SessionResult<Vec<Effect>> {
        if self.pending != Pending::Summary(phase) {
            return Err(self.unexpected("SummaryReady"));
        }

        let conversation = self.transcript.for_stage(phase.as_str());
        let (bucket, key_insights) = match result {
            Ok(summary) if !summary.bucket.bullets.is_empty() => {
                let bucket = summary.bucket;
                (ExtractedBucket::new(bucket.bullets, bucket.quotes, bucket.summary), summary.key_insights)
            }
            Ok(_) => {
                tracing::warn!(phase = %phase, "Phase summary was empty, using answers");
                (fallback_bucket(phase, &conversation), Vec::new())
            }
            Err(error) => {
                tracing::warn!(phase = %phase, error = %error, "Phase summary failed, using answers");
                (fallback_bucket(phase, &conversation), Vec::new())
            }
        };

        let exchange_count = conversation.iter().filter(|e| e.is_counted_answer()).count() as u32;
        self.storage.set(phase, PhaseRecord {
            conversation,
            bucket,
            key_insights,
            completed_at: at,
            exchange_count,
            auto_filled: false,
        });
        tracing::info!(phase = %phase, "Phase completed");

        let mut effects = vec![Effect::PhaseCompleted { phase, auto_filled: false }];
        if phase == IkigaiPhase::Phase4Paid {
            self.pending = Pending::Overlaps;
            effects.push(Effect::RequestOverlaps(self.overlap_request()));
        } else {
            self.pending = Pending::Idle;
            effects.extend(self.enter(phase.next(), at)?);
        }
        Ok(effects)
    }

    fn overlap_request(&self) -> OverlapRequest {
        OverlapRequest {
            why_statement: self.source.as_ref().map(|s| s.why_statement.clone()).unwrap_or_default(),
            love: self.storage.bullets(IkigaiPhase::Phase1Love),
            good_at: self.storage.bullets(IkigaiPhase::Phase2GoodAt),
            world_needs: self.storage.bullets(IkigaiPhase::Phase3World),
            paid_for: self.storage.bullets(IkigaiPhase::Phase4Paid),
        }
    }

    fn overlaps_ready(&mut self, result: Result<Overlaps, String>, at: DateTime<Utc>) -> SessionResult<Vec<Effect>> {
        if self.pending != Pending::Overlaps {
            return Err(self.unexpected("OverlapsReady"));
        }

        let overlaps = result.unwrap_or_else(|error| {
            tracing::warn!(error = %error, "Overlap computation failed, using placeholders");
            Overlaps::placeholder(at)
        });
        self.storage.overlaps = Some(overlaps);
        self.phase = IkigaiPhase::Complete;
        self.pending = Pending::Idle;
        tracing::info!("Ikigai Builder completed");

        Ok(vec![Effect::SaveSnapshot, Effect::PromptSaveIkigai])
    }

    fn unexpected(&self, event: &'static str) -> SessionError {
        SessionError::UnexpectedEvent { event, state: self.phase.to_string() }
    }
}

impl SessionMachine for IkigaiState {
    fn mode(&self) -> SessionMode {
        SessionMode::IkigaiBuilder
    }

    fn reduce(&self, event: SessionEvent) -> SessionResult<Transition<Self>> {
        let mut next = self.clone();
        let effects = match event {
            SessionEvent::Start { at } => {
                if self.started {
                    return Err(self.unexpected("Start"));
                }
                next.started = true;
                next.enter(IkigaiPhase::Phase1Love, at)?
            }
            SessionEvent::Resumed if self.phase == IkigaiPhase::Complete => vec![Effect::PromptSaveIkigai],
            SessionEvent::Resumed => Vec::new(),
            SessionEvent::UserSubmitted { text } => next.submit(&text)?,
            SessionEvent::ResponseFragment { text } => {
                next.transcript.push_fragment(&text)?;
                Vec::new()
            }
            SessionEvent::ResponseCompleted => next.complete_response()?,
            SessionEvent::ResponseCancelled => {
                next.transcript.stop()?;
                Vec::new()
            }
            SessionEvent::ResponseFailed { error } => {
                next.transcript.abandon()?;
                tracing::warn!(error = %error, "Response failed, exchange discarded");
                Vec::new()
            }
            SessionEvent::SummaryReady { phase, result, at } => next.summary_ready(phase, result, at)?,
            SessionEvent::OverlapsReady { result, at } => next.overlaps_ready(result, at)?,
            other => return Err(self.unexpected(other.name())),
        };
        Ok(Transition { state: next, effects })
    }

    fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    fn is_complete(&self) -> bool {
        self.phase == IkigaiPhase::Complete
    }

    fn snapshot(&self, at: DateTime<Utc>) -> Option<SessionSnapshot> {
        let mut snapshot = SessionSnapshot::new(SessionMode::IkigaiBuilder, at);
        snapshot.ikigai_phase = Some(self.phase);
        snapshot.phase_storage = self.storage.clone();
        snapshot.transcript = self.transcript.exchanges().to_vec();
        snapshot.auto_filled = self.auto_filled;
        snapshot.answer_counts = self.counts;
        snapshot.source_why_profile_id = self.storage.source_why_profile_id.clone();
        Some(snapshot)
    }
}

/// Bucket built from the user's own answers when no summary is available.
///
/// Keeps the first characters of each meaningful answer; the paid-for phase
/// keeps every answer since short replies there are often concrete. Cancelled
/// exchanges never contribute.
pub fn fallback_bucket(phase: IkigaiPhase, conversation: &[Exchange]) -> ExtractedBucket {
    let keep_all = phase == IkigaiPhase::Phase4Paid;
    let answers = conversation
        .iter()
        .filter(|e| if keep_all { e.is_settled_answer() } else { e.is_counted_answer() })
        .map(|e| e.user_text.chars().take(FALLBACK_ANSWER_LEN).collect::<String>());
    ExtractedBucket::from_answers(answers, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(love: usize, good_at: usize) -> WhySource {
        let items = |prefix: &str, n: usize| (0..n).map(|i| format!("{prefix} item {i}")).collect();
        WhySource {
            id: "why_abc".to_string(),
            why_statement: "To help people grow".to_string(),
            what_you_love: items("Love", love),
            what_you_are_good_at: items("Skill", good_at),
        }
    }

    fn start(state: IkigaiState) -> Transition<IkigaiState> {
        let t = state.reduce(SessionEvent::Start { at: Utc::now() }).unwrap();
        let t = t.state.reduce(SessionEvent::ResponseFragment { text: "Welcome!".to_string() }).unwrap();
        t.state.reduce(SessionEvent::ResponseCompleted).unwrap()
    }

    fn answer(state: &IkigaiState, text: &str) -> Transition<IkigaiState> {
        let t = state.reduce(SessionEvent::UserSubmitted { text: text.to_string() }).unwrap();
        if matches!(t.effects.first(), Some(Effect::RequestSummary { .. })) {
            return t;
        }
        let t = t.state.reduce(SessionEvent::ResponseFragment { text: "Tell me more?".to_string() }).unwrap();
        t.state.reduce(SessionEvent::ResponseCompleted).unwrap()
    }

    #[test]
    fn test_auto_fill_flags_from_source() {
        let state = IkigaiState::new(Some(source(4, 1)), IkigaiSettings::default());
        assert!(state.auto_filled().phase1_love);
        assert!(!state.auto_filled().phase2_good_at);
    }

    #[test]
    fn test_start_skips_auto_filled_phase() {
        let t = IkigaiState::new(Some(source(3, 0)), IkigaiSettings::default())
            .reduce(SessionEvent::Start { at: Utc::now() })
            .unwrap();

        assert_eq!(t.state.phase(), IkigaiPhase::Phase2GoodAt);
        assert_eq!(t.state.counts().love, 3);
        assert!(t.state.storage().phase1.as_ref().unwrap().auto_filled);
        assert!(matches!(t.effects[0], Effect::PhaseCompleted { phase: IkigaiPhase::Phase1Love, auto_filled: true }));
        let Some(Effect::RequestCompletion(request)) = t.effects.last() else { panic!("no phase start") };
        assert_eq!(request.user_message, PHASE_START_TRIGGER);
        assert!(request.history.is_empty());
    }

    #[test]
    fn test_third_answer_is_not_forwarded() {
        let mut state = start(IkigaiState::new(None, IkigaiSettings::default())).state;
        state = answer(&state, "Baking sourdough bread at dawn").state;
        state = answer(&state, "ok").state;
        state = answer(&state, "Long walks with my dog in the forest").state;
        assert_eq!(state.counts().love, 2);

        let t = state.reduce(SessionEvent::UserSubmitted { text: "Playing jazz piano with friends".to_string() }).unwrap();
        assert_eq!(t.effects.len(), 1);
        let Effect::RequestSummary { phase, conversation } = &t.effects[0] else { panic!("expected summary") };
        assert_eq!(*phase, IkigaiPhase::Phase1Love);
        assert_eq!(conversation.iter().filter(|e| e.is_answer()).count(), 4);
        assert!(t.state.is_waiting());
        assert_eq!(
            t.state.reduce(SessionEvent::UserSubmitted { text: "one more thing to add".to_string() }).unwrap_err(),
            SessionError::Busy
        );
    }

    #[test]
    fn test_failed_summary_falls_back_to_answers() {
        let mut state = start(IkigaiState::new(None, IkigaiSettings::default())).state;
        for text in ["Baking sourdough bread at dawn", "Long walks with my dog", "Playing jazz piano"] {
            state = answer(&state, text).state;
        }
        let t = state
            .reduce(SessionEvent::SummaryReady {
                phase: IkigaiPhase::Phase1Love,
                result: Err("timeout".to_string()),
                at: Utc::now(),
            })
            .unwrap();

        let record = t.state.storage().phase1.as_ref().unwrap();
        assert_eq!(record.bucket.bullets.len(), 3);
        assert_eq!(record.exchange_count, 3);
        assert_eq!(t.state.phase(), IkigaiPhase::Phase2GoodAt);
    }

    #[test]
    fn test_cancelled_answer_is_not_counted_or_kept() {
        let state = start(IkigaiState::new(None, IkigaiSettings::default())).state;
        let t = state.reduce(SessionEvent::UserSubmitted { text: "Baking sourdough bread at dawn".to_string() }).unwrap();
        let t = t.state.reduce(SessionEvent::ResponseFragment { text: "That sounds".to_string() }).unwrap();
        let mut state = t.state.reduce(SessionEvent::ResponseCancelled).unwrap().state;
        assert_eq!(state.counts().love, 0);

        for text in ["Long walks with my dog", "Playing jazz piano", "Restoring old bicycles"] {
            state = answer(&state, text).state;
        }
        assert_eq!(state.counts().love, 3);

        let t = state
            .reduce(SessionEvent::SummaryReady {
                phase: IkigaiPhase::Phase1Love,
                result: Err("timeout".to_string()),
                at: Utc::now(),
            })
            .unwrap();

        let record = t.state.storage().phase1.as_ref().unwrap();
        assert_eq!(record.exchange_count, 3);
        assert_eq!(record.bucket.bullets, vec!["Long walks with my dog", "Playing jazz piano", "Restoring old bicycles"]);
    }

    #[test]
    fn test_fallback_keeps_shouted_answers() {
        let mut state = start(IkigaiState::new(None, IkigaiSettings::default())).state;
        for text in [
            "I LOVE BUILDING ROBOTS WITH MY KIDS",
            "Here is the thing I love most:",
            "Cooking dinner for my whole family",
        ] {
            state = answer(&state, text).state;
        }
        let t = state
            .reduce(SessionEvent::SummaryReady {
                phase: IkigaiPhase::Phase1Love,
                result: Err("timeout".to_string()),
                at: Utc::now(),
            })
            .unwrap();

        let record = t.state.storage().phase1.as_ref().unwrap();
        assert_eq!(record.bucket.bullets.len(), 3);
        assert_eq!(record.bucket.bullets[0], "I LOVE BUILDING ROBOTS WITH MY KIDS");
    }

    #[test]
    fn test_summary_for_wrong_phase_is_rejected() {
        let state = start(IkigaiState::new(None, IkigaiSettings::default())).state;
        let err = state
            .reduce(SessionEvent::SummaryReady {
                phase: IkigaiPhase::Phase3World,
                result: Err(String::new()),
                at: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::UnexpectedEvent { event: "SummaryReady", .. }));
    }

    #[test]
    fn test_fallback_truncates_and_filters() {
        let long = "x".repeat(400);
        let exchanges: Vec<Exchange> = [(long.as_str(), true), ("ok", false)]
            .iter()
            .enumerate()
            .map(|(i, (text, meaningful))| Exchange {
                index: i as u32 + 1,
                stage: "phase1_love".to_string(),
                kind: ExchangeKind::Answer,
                user_text: text.to_string(),
                meaningful: *meaningful,
                raw_response: String::new(),
                response: String::new(),
                status: super::super::ExchangeStatus::Complete,
            })
            .collect();

        let bucket = fallback_bucket(IkigaiPhase::Phase1Love, &exchanges);
        assert_eq!(bucket.bullets.len(), 1);
        assert_eq!(bucket.bullets[0].chars().count(), FALLBACK_ANSWER_LEN);
    }

    #[test]
    fn test_to_profile_before_complete() {
        let state = IkigaiState::new(None, IkigaiSettings::default());
        assert!(matches!(state.to_profile("x"), Err(SessionError::ProfileIncomplete(_))));
    }
}
