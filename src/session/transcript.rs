//! Exchange log with a single in-flight slot.

use serde::{Deserialize, Serialize};

use crate::ai::ChatMessage;
use crate::core::{SessionError, SessionResult};

/// Label appended to the visible text of a cancelled response.
pub const STOPPED_LABEL: &str = "[Stopped]";

/// What triggered an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeKind {
    /// Locally produced opening message, no user text.
    Greeting,
    /// A real user submission.
    Answer,
    /// Synthetic trigger that opens an Ikigai phase.
    PhaseStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeStatus {
    Complete,
    Stopped,
}

/// One user utterance and the agent response paired with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exchange {
    /// 1-based position in the transcript.
    pub index: u32,
    pub stage: String,
    pub kind: ExchangeKind,
    pub user_text: String,
    pub meaningful: bool,
    /// Response exactly as the model produced it.
    pub raw_response: String,
    /// Response after enforcement, what the user sees.
    pub response: String,
    pub status: ExchangeStatus,
}

impl Exchange {
    pub fn is_answer(&self) -> bool {
        self.kind == ExchangeKind::Answer
    }

    /// A real answer whose exchange was not cancelled.
    pub fn is_settled_answer(&self) -> bool {
        self.is_answer() && self.status == ExchangeStatus::Complete
    }

    /// A settled answer that passed the gate.
    pub fn is_counted_answer(&self) -> bool {
        self.is_settled_answer() && self.meaningful
    }

    /// Text shown for this response, with the stop label when cancelled.
    pub fn display_text(&self) -> String {
        match self.status {
            ExchangeStatus::Complete => self.response.clone(),
            ExchangeStatus::Stopped if self.response.is_empty() => STOPPED_LABEL.to_string(),
            ExchangeStatus::Stopped => format!("{} {}", self.response, STOPPED_LABEL),
        }
    }
}

/// An exchange whose response is still streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlight {
    pub kind: ExchangeKind,
    pub stage: String,
    pub user_text: String,
    pub meaningful: bool,
    pub partial: String,
}

impl InFlight {
    pub fn answer(stage: impl Into<String>, user_text: impl Into<String>, meaningful: bool) -> Self {
        Self {
            kind: ExchangeKind::Answer,
            stage: stage.into(),
            user_text: user_text.into(),
            meaningful,
            partial: String::new(),
        }
    }

    pub fn phase_start(stage: impl Into<String>) -> Self {
        Self {
            kind: ExchangeKind::PhaseStart,
            stage: stage.into(),
            user_text: String::new(),
            meaningful: false,
            partial: String::new(),
        }
    }
}

/// Ordered exchanges plus at most one exchange in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    exchanges: Vec<Exchange>,
    in_flight: Option<InFlight>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted exchanges. Nothing is ever restored in flight.
    pub fn from_exchanges(exchanges: Vec<Exchange>) -> Self {
        Self { exchanges, in_flight: None }
    }

    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty() && self.in_flight.is_none()
    }

    pub fn last(&self) -> Option<&Exchange> {
        self.exchanges.last()
    }

    pub fn is_streaming(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight(&self) -> Option<&InFlight> {
        self.in_flight.as_ref()
    }

    /// Open the in-flight slot. Rejected while another response streams.
    pub fn begin(&mut self, in_flight: InFlight) -> SessionResult<()> {
        if self.in_flight.is_some() {
            return Err(SessionError::Busy);
        }
        self.in_flight = Some(in_flight);
        Ok(())
    }

    /// Append a streamed fragment to the in-flight buffer.
    pub fn push_fragment(&mut self, fragment: &str) -> SessionResult<()> {
        let flight = self.in_flight.as_mut().ok_or_else(|| idle("ResponseFragment"))?;
        flight.partial.push_str(fragment);
        Ok(())
    }

    /// Take the finished in-flight exchange for sanitizing.
    pub fn take_in_flight(&mut self) -> SessionResult<InFlight> {
        self.in_flight.take().ok_or_else(|| idle("ResponseCompleted"))
    }

    /// Append a completed exchange built from a finished flight.
    pub fn commit(&mut self, flight: InFlight, response: String) -> &Exchange {
        let exchange = Exchange {
            index: self.next_index(),
            stage: flight.stage,
            kind: flight.kind,
            user_text: flight.user_text,
            meaningful: flight.meaningful,
            raw_response: flight.partial,
            response,
            status: ExchangeStatus::Complete,
        };
        self.push(exchange)
    }

    /// Append an exchange that never reached the model.
    pub fn record_unanswered(&mut self, stage: impl Into<String>, user_text: impl Into<String>, meaningful: bool) -> &Exchange {
        let exchange = Exchange {
            index: self.next_index(),
            stage: stage.into(),
            kind: ExchangeKind::Answer,
            user_text: user_text.into(),
            meaningful,
            raw_response: String::new(),
            response: String::new(),
            status: ExchangeStatus::Complete,
        };
        self.push(exchange)
    }

    /// Append a locally produced greeting.
    pub fn record_greeting(&mut self, stage: impl Into<String>, text: impl Into<String>) -> &Exchange {
        let text = text.into();
        let exchange = Exchange {
            index: self.next_index(),
            stage: stage.into(),
            kind: ExchangeKind::Greeting,
            user_text: String::new(),
            meaningful: false,
            raw_response: text.clone(),
            response: text,
            status: ExchangeStatus::Complete,
        };
        self.push(exchange)
    }

    /// Close the in-flight exchange as stopped, keeping the partial text.
    pub fn stop(&mut self) -> SessionResult<&Exchange> {
        let flight = self.in_flight.take().ok_or_else(|| idle("ResponseCancelled"))?;
        let exchange = Exchange {
            index: self.next_index(),
            stage: flight.stage,
            kind: flight.kind,
            user_text: flight.user_text,
            meaningful: flight.meaningful,
            response: flight.partial.trim().to_string(),
            raw_response: flight.partial,
            status: ExchangeStatus::Stopped,
        };
        Ok(self.push(exchange))
    }

    /// Drop the in-flight exchange after a transport failure.
    pub fn abandon(&mut self) -> SessionResult<InFlight> {
        self.in_flight.take().ok_or_else(|| idle("ResponseFailed"))
    }

    /// Chat history for exchanges matching `keep`, in order.
    ///
    /// Synthetic phase triggers contribute only their response.
    pub fn history<F>(&self, keep: F) -> Vec<ChatMessage>
    where
        F: Fn(&Exchange) -> bool,
    {
        let mut messages = Vec::new();
        for exchange in self.exchanges.iter().filter(|e| keep(e)) {
            if exchange.is_answer() {
                messages.push(ChatMessage::user(exchange.user_text.clone()));
            }
            if !exchange.response.is_empty() {
                messages.push(ChatMessage::assistant(exchange.response.clone()));
            }
        }
        messages
    }

    /// Completed exchanges tagged with `stage`.
    pub fn for_stage(&self, stage: &str) -> Vec<Exchange> {
        self.exchanges.iter().filter(|e| e.stage == stage).cloned().collect()
    }

    fn next_index(&self) -> u32 {
        self.exchanges.len() as u32 + 1
    }

    fn push(&mut self, exchange: Exchange) -> &Exchange {
        self.exchanges.push(exchange);
        &self.exchanges[self.exchanges.len() - 1]
    }
}

fn idle(event: &'static str) -> SessionError {
    SessionError::UnexpectedEvent { event, state: "no response in flight".to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_rejects_second_flight() {
        let mut transcript = Transcript::new();
        transcript.begin(InFlight::answer("intro", "first", true)).unwrap();
        assert_eq!(transcript.begin(InFlight::answer("intro", "second", true)), Err(SessionError::Busy));
    }

    #[test]
    fn test_commit_keeps_raw_and_sanitized() {
        let mut transcript = Transcript::new();
        transcript.begin(InFlight::answer("intro", "I like baking bread", true)).unwrap();
        transcript.push_fragment("Raw ").unwrap();
        transcript.push_fragment("text").unwrap();
        let flight = transcript.take_in_flight().unwrap();
        let exchange = transcript.commit(flight, "Clean text".to_string());

        assert_eq!(exchange.index, 1);
        assert_eq!(exchange.raw_response, "Raw text");
        assert_eq!(exchange.response, "Clean text");
        assert!(!transcript.is_streaming());
    }

    #[test]
    fn test_stop_keeps_partial() {
        let mut transcript = Transcript::new();
        transcript.begin(InFlight::answer("stories", "A story about camp", true)).unwrap();
        transcript.push_fragment("That sounds").unwrap();
        let exchange = transcript.stop().unwrap();

        assert_eq!(exchange.status, ExchangeStatus::Stopped);
        assert_eq!(exchange.display_text(), "That sounds [Stopped]");
        assert!(exchange.is_answer());
        assert!(!exchange.is_counted_answer());
    }

    #[test]
    fn test_fragment_without_flight_is_unexpected() {
        let mut transcript = Transcript::new();
        assert!(matches!(transcript.push_fragment("x"), Err(SessionError::UnexpectedEvent { .. })));
    }

    #[test]
    fn test_history_skips_phase_trigger_text() {
        let mut transcript = Transcript::new();
        transcript.begin(InFlight::phase_start("phase1_love")).unwrap();
        transcript.push_fragment("Welcome to phase one").unwrap();
        let flight = transcript.take_in_flight().unwrap();
        transcript.commit(flight, "Welcome to phase one".to_string());
        transcript.record_unanswered("phase1_love", "Gardening on weekends", true);

        let history = transcript.history(|_| true);
        assert_eq!(history, vec![
            ChatMessage::assistant("Welcome to phase one"),
            ChatMessage::user("Gardening on weekends"),
        ]);
    }
}
