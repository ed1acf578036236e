//! Decision-Helper: open-ended Q&A grounded in a complete Ikigai profile.

use chrono::{DateTime, Utc};

use crate::ai::prompts::{self, DECISION_GREETING};
use crate::ai::CompletionRequest;
use crate::core::{IkigaiProfile, SessionError, SessionResult};

use super::snapshot::{SessionMode, SessionSnapshot};
use super::transcript::{InFlight, Transcript};
use super::{Effect, SessionEvent, SessionMachine, Transition};

const STAGE: &str = "decision";

#[derive(Debug, Clone)]
pub struct DecisionHelperState {
    profile: IkigaiProfile,
    system_prompt: String,
    transcript: Transcript,
}

impl DecisionHelperState {
    /// Requires a profile whose four phases and overlaps are all present.
    pub fn new(profile: IkigaiProfile) -> SessionResult<Self> {
        if !profile.is_complete {
            return Err(SessionError::ProfileIncomplete(format!(
                "profile '{}' is not complete",
                profile.name
            )));
        }
        let system_prompt = prompts::decision_helper_prompt(&profile);
        Ok(Self { profile, system_prompt, transcript: Transcript::new() })
    }

    pub fn profile(&self) -> &IkigaiProfile {
        &self.profile
    }
}

impl SessionMachine for DecisionHelperState {
    fn mode(&self) -> SessionMode {
        SessionMode::DecisionHelper
    }

    fn reduce(&self, event: SessionEvent) -> SessionResult<Transition<Self>> {
        let mut next = self.clone();
        let effects = match event {
            SessionEvent::Start { .. } => {
                next.transcript.record_greeting(STAGE, DECISION_GREETING);
                vec![Effect::Display(DECISION_GREETING.to_string())]
            }
            SessionEvent::UserSubmitted { text } => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(SessionError::EmptyInput);
                }
                let request = CompletionRequest::new(self.system_prompt.clone(), text)
                    .with_history(self.transcript.history(|_| true));
                next.transcript.begin(InFlight::answer(STAGE, text, true))?;
                vec![Effect::RequestCompletion(request)]
            }
            SessionEvent::ResponseFragment { text } => {
                next.transcript.push_fragment(&text)?;
                Vec::new()
            }
            SessionEvent::ResponseCompleted => {
                let flight = next.transcript.take_in_flight()?;
                let response = flight.partial.trim().to_string();
                next.transcript.commit(flight, response.clone());
                vec![Effect::ShowResponse(response)]
            }
            SessionEvent::ResponseCancelled => {
                next.transcript.stop()?;
                Vec::new()
            }
            SessionEvent::ResponseFailed { error } => {
                next.transcript.abandon()?;
                tracing::warn!(error = %error, "Response failed, exchange discarded");
                Vec::new()
            }
            other => {
                return Err(SessionError::UnexpectedEvent { event: other.name(), state: STAGE.to_string() })
            }
        };
        Ok(Transition { state: next, effects })
    }

    fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    fn is_complete(&self) -> bool {
        false
    }

    fn snapshot(&self, _at: DateTime<Utc>) -> Option<SessionSnapshot> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{IkigaiBucket, Overlaps};
    use crate::session::AutoFilledPhases;

    fn profile(is_complete: bool) -> IkigaiProfile {
        let bucket = || IkigaiBucket::new(vec!["Something real".to_string()], "summary");
        IkigaiProfile {
            id: "ikigai_1".to_string(),
            name: "Mine".to_string(),
            created_at: Utc::now(),
            source_why_profile_id: None,
            why_statement: "To help people grow".to_string(),
            love: bucket(),
            good_at: bucket(),
            world_needs: bucket(),
            paid_for: bucket(),
            overlaps: Overlaps::placeholder(Utc::now()),
            key_patterns: Vec::new(),
            auto_filled_phases: AutoFilledPhases::default(),
            is_complete,
            updated_at: None,
        }
    }

    #[test]
    fn test_requires_complete_profile() {
        assert!(matches!(
            DecisionHelperState::new(profile(false)),
            Err(SessionError::ProfileIncomplete(_))
        ));
    }

    #[test]
    fn test_prompt_carries_profile() {
        let state = DecisionHelperState::new(profile(true)).unwrap();
        let t = state.reduce(SessionEvent::UserSubmitted { text: "Should I take the job?".to_string() }).unwrap();
        let Effect::RequestCompletion(request) = &t.effects[0] else { panic!("expected completion") };
        assert!(request.system_prompt.contains("To help people grow"));
        assert!(t.state.snapshot(Utc::now()).is_none());
    }
}
