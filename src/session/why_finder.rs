//! Why Finder: a strict twelve-exchange protocol.
//!
//! The stage is a projection of the meaningful-answer counter. Before the
//! last exchange every response passes through premature-conclusion
//! stripping; the last exchange is forced to `completed` whatever the
//! model said.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ai::prompts::{self, INITIAL_GREETING};
use crate::ai::{CompletionRequest, WhyExtraction};
use crate::core::{SessionError, SessionResult};
use crate::enforce::{has_conclusion, strip_premature_conclusion, strip_trailing_questions};
use crate::extract::{
    extract_bullets, find_section, GOOD_AT, LEARNING_SUMMARY, LOVED, PATTERNS, WHY_EXPLANATION,
    WHY_STATEMENT,
};

use super::gate::AnswerGate;
use super::snapshot::{SessionMode, SessionSnapshot};
use super::transcript::{InFlight, Transcript};
use super::{Effect, SessionEvent, SessionMachine, Transition};

/// Exchanges in a full Why Finder session.
pub const WHY_TOTAL_EXCHANGES: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhyStage {
    Intro,
    EnergyMap,
    Stories,
    YourWhy,
    Completed,
}

impl WhyStage {
    /// Stage of the exchange with 1-based index `index`.
    pub fn for_exchange(index: u32) -> Self {
        match index {
            0..=3 => Self::Intro,
            4..=6 => Self::EnergyMap,
            7..=10 => Self::Stories,
            _ => Self::YourWhy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::EnergyMap => "energy_map",
            Self::Stories => "stories",
            Self::YourWhy => "your_why",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for WhyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sections harvested from the final verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhySynthesis {
    pub learning_summary: String,
    pub patterns: String,
    pub why_statement: String,
    pub why_explanation: String,
    pub what_you_love: Vec<String>,
    pub what_you_are_good_at: Vec<String>,
    /// The model never delivered a marked conclusion.
    pub missing_conclusion: bool,
}

impl WhySynthesis {
    /// Extract every section from a final verdict.
    pub fn from_verdict(text: &str) -> Self {
        let why_statement = find_section(text, &WHY_STATEMENT).unwrap_or_default();
        Self {
            learning_summary: find_section(text, &LEARNING_SUMMARY).unwrap_or_default(),
            patterns: find_section(text, &PATTERNS).unwrap_or_default(),
            why_explanation: find_section(text, &WHY_EXPLANATION).unwrap_or_default(),
            what_you_love: extract_bullets(text, &LOVED),
            what_you_are_good_at: extract_bullets(text, &GOOD_AT),
            missing_conclusion: !has_conclusion(text) || why_statement.is_empty(),
            why_statement,
        }
    }

    /// Loved or good-at lists are missing and worth a second extraction.
    pub fn needs_extraction(&self) -> bool {
        self.what_you_love.is_empty() || self.what_you_are_good_at.is_empty()
    }

    /// Fill empty fields from a collaborator extraction. Local data wins.
    pub fn merge(&mut self, extraction: WhyExtraction) {
        if self.what_you_love.is_empty() {
            self.what_you_love = extraction.what_you_love;
        }
        if self.what_you_are_good_at.is_empty() {
            self.what_you_are_good_at = extraction.what_you_are_good_at;
        }
        if self.why_explanation.is_empty() {
            self.why_explanation = extraction.why_explanation;
        }
    }
}

#[derive(Debug, Clone)]
pub struct WhyFinderState {
    transcript: Transcript,
    exchange_count: u32,
    total: u32,
    gate: AnswerGate,
    synthesis: Option<WhySynthesis>,
    awaiting_extraction: bool,
}

impl WhyFinderState {
    pub fn new() -> Self {
        Self::with_settings(WHY_TOTAL_EXCHANGES, AnswerGate::default())
    }

    pub fn with_settings(total: u32, gate: AnswerGate) -> Self {
        Self {
            transcript: Transcript::new(),
            exchange_count: 0,
            total: total.max(1),
            gate,
            synthesis: None,
            awaiting_extraction: false,
        }
    }

    /// Rebuild a session from a snapshot.
    ///
    /// A snapshot taken at the cap is restored as completed, re-deriving the
    /// synthesis from the last response.
    pub fn restore(snapshot: &SessionSnapshot, total: u32, gate: AnswerGate) -> SessionResult<Self> {
        if snapshot.mode != SessionMode::WhyFinder {
            return Err(SessionError::SnapshotMismatch {
                expected: SessionMode::WhyFinder.to_string(),
                found: snapshot.mode.to_string(),
            });
        }

        let mut state = Self::with_settings(total, gate);
        state.transcript = Transcript::from_exchanges(snapshot.transcript.clone());
        state.exchange_count = snapshot.why_exchange_count.min(state.total);

        if state.exchange_count >= state.total {
            let verdict = state.transcript.last().map(|e| e.response.as_str()).unwrap_or_default();
            state.synthesis = Some(WhySynthesis::from_verdict(verdict));
        }

        Ok(state)
    }

    pub fn stage(&self) -> WhyStage {
        if self.synthesis.is_some() {
            WhyStage::Completed
        } else {
            WhyStage::for_exchange(self.exchange_count + 1)
        }
    }

    /// Meaningful exchanges completed so far.
    pub fn exchange_count(&self) -> u32 {
        self.exchange_count
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn synthesis(&self) -> Option<&WhySynthesis> {
        self.synthesis.as_ref()
    }

    fn submit(&mut self, text: &str) -> SessionResult<Vec<Effect>> {
        if self.synthesis.is_some() {
            return Err(SessionError::SessionComplete);
        }
        if self.transcript.is_streaming() {
            return Err(SessionError::Busy);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyInput);
        }

        let meaningful = self.gate.is_meaningful(text);
        let index = self.exchange_count + u32::from(meaningful);
        let stage = WhyStage::for_exchange(self.exchange_count + 1);

        let request = CompletionRequest::new(
            prompts::why_coach_prompt(stage, index.max(1), self.total),
            text,
        )
        .with_history(self.transcript.history(|_| true));

        self.transcript.begin(InFlight::answer(stage.as_str(), text, meaningful))?;
        Ok(vec![Effect::RequestCompletion(request)])
    }

    fn complete_response(&mut self) -> SessionResult<Vec<Effect>> {
        let flight = self.transcript.take_in_flight()?;
        let index = self.exchange_count + u32::from(flight.meaningful);

        if flight.meaningful && index >= self.total {
            return Ok(self.finish(flight, index));
        }

        let stripped = strip_premature_conclusion(&flight.partial, index, self.total);
        if stripped.was_stripped {
            tracing::debug!(exchange = index, "Premature conclusion removed from response");
        }
        let response = stripped.cleaned.trim().to_string();
        self.transcript.commit(flight, response.clone());
        self.exchange_count = index;

        Ok(vec![Effect::ShowResponse(response), Effect::SaveSnapshot])
    }

    fn finish(&mut self, flight: InFlight, index: u32) -> Vec<Effect> {
        let verdict = strip_trailing_questions(&flight.partial).trim().to_string();
        let synthesis = WhySynthesis::from_verdict(&verdict);
        if synthesis.missing_conclusion {
            tracing::warn!(exchange = index, "Final response carried no Why statement");
        }

        let conversation = {
            self.transcript.commit(flight, verdict.clone());
            self.transcript.exchanges().to_vec()
        };
        self.exchange_count = index;

        let mut effects = vec![Effect::ShowResponse(verdict), Effect::SaveSnapshot];
        if synthesis.needs_extraction() {
            self.awaiting_extraction = true;
            effects.push(Effect::RequestWhyExtraction { conversation });
        } else {
            effects.push(Effect::PromptSaveWhy(synthesis.clone()));
        }
        tracing::info!(exchanges = index, "Why Finder completed");
        self.synthesis = Some(synthesis);
        effects
    }

    /// Pick a restored session back up. A completed session whose lists are
    /// still missing asks for the extraction again before offering a save.
    fn resumed(&mut self) -> Vec<Effect> {
        let Some(synthesis) = &self.synthesis else {
            return Vec::new();
        };
        if self.awaiting_extraction {
            return Vec::new();
        }
        if synthesis.needs_extraction() {
            tracing::debug!("Requesting Why extraction for restored session");
            self.awaiting_extraction = true;
            return vec![Effect::RequestWhyExtraction { conversation: self.transcript.exchanges().to_vec() }];
        }
        vec![Effect::PromptSaveWhy(synthesis.clone())]
    }

    fn merge_extraction(&mut self, result: Result<WhyExtraction, String>) -> SessionResult<Vec<Effect>> {
        if !self.awaiting_extraction {
            return Err(self.unexpected("WhyExtractionReady"));
        }
        self.awaiting_extraction = false;

        let synthesis = self.synthesis.get_or_insert_with(WhySynthesis::default);
        match result {
            Ok(extraction) => synthesis.merge(extraction),
            Err(error) => tracing::warn!(error = %error, "Why extraction failed, keeping local sections"),
        }
        Ok(vec![Effect::PromptSaveWhy(synthesis.clone())])
    }

    fn unexpected(&self, event: &'static str) -> SessionError {
        SessionError::UnexpectedEvent { event, state: self.stage().to_string() }
    }
}

impl Default for WhyFinderState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMachine for WhyFinderState {
    fn mode(&self) -> SessionMode {
        SessionMode::WhyFinder
    }

    fn reduce(&self, event: SessionEvent) -> SessionResult<Transition<Self>> {
        let mut next = self.clone();
        let effects = match event {
            SessionEvent::Start { .. } => {
                if !self.transcript.is_empty() {
                    return Err(self.unexpected("Start"));
                }
                next.transcript.record_greeting(WhyStage::Intro.as_str(), INITIAL_GREETING);
                vec![Effect::Display(INITIAL_GREETING.to_string())]
            }
            SessionEvent::Resumed => next.resumed(),
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
            SessionEvent::WhyExtractionReady { result } => next.merge_extraction(result)?,
            other => return Err(self.unexpected(other.name())),
        };
        Ok(Transition { state: next, effects })
    }

    fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    fn is_complete(&self) -> bool {
        self.synthesis.is_some() && !self.awaiting_extraction
    }

    fn snapshot(&self, at: DateTime<Utc>) -> Option<SessionSnapshot> {
        let mut snapshot = SessionSnapshot::new(SessionMode::WhyFinder, at);
        snapshot.transcript = self.transcript.exchanges().to_vec();
        snapshot.why_exchange_count = self.exchange_count;
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANSWER: &str = "I spend weekends teaching my nephew to code";

    fn run(state: &WhyFinderState, event: SessionEvent) -> Transition<WhyFinderState> {
        state.reduce(event).unwrap()
    }

    fn exchange(state: &WhyFinderState, text: &str, response: &str) -> Transition<WhyFinderState> {
        let t = run(state, SessionEvent::UserSubmitted { text: text.to_string() });
        let t = run(&t.state, SessionEvent::ResponseFragment { text: response.to_string() });
        run(&t.state, SessionEvent::ResponseCompleted)
    }

    #[test]
    fn test_stage_projection() {
        let stages: Vec<_> = (1..=12).map(WhyStage::for_exchange).collect();
        assert_eq!(stages[0], WhyStage::Intro);
        assert_eq!(stages[3], WhyStage::EnergyMap);
        assert_eq!(stages[6], WhyStage::Stories);
        assert_eq!(stages[9], WhyStage::Stories);
        assert_eq!(stages[10], WhyStage::YourWhy);
    }

    #[test]
    fn test_start_shows_greeting_without_model() {
        let t = run(&WhyFinderState::new(), SessionEvent::Start { at: Utc::now() });
        assert_eq!(t.effects, vec![Effect::Display(INITIAL_GREETING.to_string())]);
        assert_eq!(t.state.transcript().exchanges().len(), 1);
        assert!(t.state.reduce(SessionEvent::Start { at: Utc::now() }).is_err());
    }

    #[test]
    fn test_submit_while_streaming_is_busy() {
        let t = run(&WhyFinderState::new(), SessionEvent::UserSubmitted { text: ANSWER.to_string() });
        let err = t.state.reduce(SessionEvent::UserSubmitted { text: ANSWER.to_string() }).unwrap_err();
        assert_eq!(err, SessionError::Busy);
    }

    #[test]
    fn test_filler_does_not_advance() {
        let t = exchange(&WhyFinderState::new(), "ok", "Tell me more?");
        assert_eq!(t.state.exchange_count(), 0);
        assert_eq!(t.state.stage(), WhyStage::Intro);
    }

    #[test]
    fn test_premature_conclusion_is_stripped() {
        let t = exchange(
            &WhyFinderState::new(),
            ANSWER,
            "Teaching clearly matters to you and it shows in how you talk about it.\nYOUR WHY IS: To teach.",
        );
        let Effect::ShowResponse(text) = &t.effects[0] else { panic!("expected response") };
        assert!(!has_conclusion(text));
        assert_eq!(t.state.exchange_count(), 1);
    }

    #[test]
    fn test_cancel_leaves_counter() {
        let t = run(&WhyFinderState::new(), SessionEvent::UserSubmitted { text: ANSWER.to_string() });
        let t = run(&t.state, SessionEvent::ResponseFragment { text: "Half".to_string() });
        let t = run(&t.state, SessionEvent::ResponseCancelled);
        assert_eq!(t.state.exchange_count(), 0);
        assert!(!t.state.transcript().is_streaming());
    }

    #[test]
    fn test_final_exchange_forces_completion() {
        let mut state = WhyFinderState::with_settings(2, AnswerGate::default());
        state = exchange(&state, ANSWER, "What else?").state;
        let t = exchange(&state, ANSWER, "No verdict here. What do you think?");

        assert_eq!(t.state.stage(), WhyStage::Completed);
        let synthesis = t.state.synthesis().unwrap();
        assert!(synthesis.missing_conclusion);
        assert!(matches!(t.effects.last(), Some(Effect::RequestWhyExtraction { .. })));
        assert_eq!(
            t.state.reduce(SessionEvent::UserSubmitted { text: ANSWER.to_string() }).unwrap_err(),
            SessionError::SessionComplete
        );
    }

    #[test]
    fn test_extraction_merges_missing_lists() {
        let mut state = WhyFinderState::with_settings(1, AnswerGate::default());
        state = exchange(&state, ANSWER, "YOUR WHY IS: To help people learn.\nWHAT YOU LOVE:\n- Teaching kids").state;
        assert!(!state.is_complete());

        let t = run(
            &state,
            SessionEvent::WhyExtractionReady {
                result: Ok(WhyExtraction {
                    what_you_love: vec!["Ignored".to_string()],
                    what_you_are_good_at: vec!["Explaining ideas".to_string()],
                    why_explanation: String::new(),
                }),
            },
        );
        let Some(Effect::PromptSaveWhy(synthesis)) = t.effects.first() else { panic!("no save prompt") };
        assert_eq!(synthesis.what_you_love, vec!["Teaching kids"]);
        assert_eq!(synthesis.what_you_are_good_at, vec!["Explaining ideas"]);
        assert!(t.state.is_complete());
    }

    #[test]
    fn test_resume_requests_outstanding_extraction() {
        let state = WhyFinderState::with_settings(1, AnswerGate::default());
        let state = exchange(&state, ANSWER, "YOUR WHY IS: To help people learn.\nWHAT YOU LOVE:\n- Teaching kids").state;
        let snapshot = state.snapshot(Utc::now()).unwrap();

        let restored = WhyFinderState::restore(&snapshot, 1, AnswerGate::default()).unwrap();
        assert!(restored.synthesis().unwrap().what_you_are_good_at.is_empty());

        let t = run(&restored, SessionEvent::Resumed);
        assert!(matches!(t.effects.as_slice(), [Effect::RequestWhyExtraction { .. }]));
        assert!(!t.state.is_complete());

        let t = run(
            &t.state,
            SessionEvent::WhyExtractionReady {
                result: Ok(WhyExtraction {
                    what_you_love: Vec::new(),
                    what_you_are_good_at: vec!["Explaining ideas".to_string()],
                    why_explanation: String::new(),
                }),
            },
        );
        let Some(Effect::PromptSaveWhy(synthesis)) = t.effects.first() else { panic!("no save prompt") };
        assert_eq!(synthesis.what_you_are_good_at, vec!["Explaining ideas"]);
    }

    #[test]
    fn test_resume_mid_session_is_quiet() {
        let state = exchange(&WhyFinderState::new(), ANSWER, "What else?").state;
        let restored = WhyFinderState::restore(&state.snapshot(Utc::now()).unwrap(), 12, AnswerGate::default()).unwrap();

        let t = run(&restored, SessionEvent::Resumed);
        assert!(t.effects.is_empty());
        assert_eq!(t.state.exchange_count(), 1);
    }
}
