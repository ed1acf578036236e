//! Effect runner.
//!
//! Feeds events into a [`SessionMachine`], performs the effects it asks
//! for, and turns the results back into events. Only one response streams
//! at a time; [`CancelHandle::cancel`] stops it from any thread.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::ai::{
    ChatProvider, CompletionRequest, LlmAnalyst, OverlapComputer, PhaseSummarizer, WhyExtractor,
};
use crate::core::{SessionError, SessionResult};
use crate::store::ProfileStore;

use super::phase::IkigaiPhase;
use super::why_finder::WhySynthesis;
use super::{Effect, SessionEvent, SessionMachine};

/// What the caller should show after an event was processed.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A locally produced message.
    Message(String),
    /// The final form of a streamed response.
    Response(String),
    /// Generation was stopped; the partial text is kept.
    Stopped(String),
    PhaseCompleted { phase: IkigaiPhase, auto_filled: bool },
    /// A Why Finder session finished and can be saved.
    SaveSuggested(WhySynthesis),
    /// An Ikigai Builder session finished and can be saved.
    IkigaiReady,
    /// Something went wrong that did not stop the session.
    Warning(String),
}

/// Everything the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub chat: Arc<dyn ChatProvider>,
    pub summarizer: Arc<dyn PhaseSummarizer>,
    pub overlaps: Arc<dyn OverlapComputer>,
    pub why_extractor: Arc<dyn WhyExtractor>,
    pub store: Arc<dyn ProfileStore>,
}

impl Collaborators {
    /// Use `chat` for conversation and, through [`LlmAnalyst`], for analysis.
    pub fn with_analyst(chat: Arc<dyn ChatProvider>, store: Arc<dyn ProfileStore>) -> Self {
        let analyst = Arc::new(LlmAnalyst::new(Arc::clone(&chat)));
        Self {
            chat,
            summarizer: analyst.clone(),
            overlaps: analyst.clone(),
            why_extractor: analyst,
            store,
        }
    }
}

/// Cancels the response currently streaming, if any.
///
/// A cancel that arrives while a dispatch is running but no response is
/// streaming (before the stream opens, or during a summary or overlap call)
/// is held and stops the next response of that dispatch. A cancel while no
/// dispatch is running is dropped.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    slot: Arc<Mutex<CancelSlot>>,
}

#[derive(Debug, Default)]
enum CancelSlot {
    #[default]
    Idle,
    Busy { pending: bool },
    Streaming(CancellationToken),
}

impl CancelHandle {
    pub fn cancel(&self) {
        let mut slot = self.slot.lock();
        match &mut *slot {
            CancelSlot::Idle => tracing::debug!("Cancel ignored, no session activity"),
            CancelSlot::Busy { pending } => *pending = true,
            CancelSlot::Streaming(token) => token.cancel(),
        }
    }

    /// Mark a dispatch as running until the guard drops.
    fn begin(&self) -> BusyGuard {
        *self.slot.lock() = CancelSlot::Busy { pending: false };
        BusyGuard(self.clone())
    }

    /// Fresh token for a new response, already cancelled if a cancel is held.
    fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut slot = self.slot.lock();
        if matches!(*slot, CancelSlot::Busy { pending: true }) {
            token.cancel();
        }
        *slot = CancelSlot::Streaming(token.clone());
        token
    }

    fn disarm(&self) {
        *self.slot.lock() = CancelSlot::Busy { pending: false };
    }
}

struct BusyGuard(CancelHandle);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        *self.0.slot.lock() = CancelSlot::Idle;
    }
}

pub struct Orchestrator<M: SessionMachine> {
    state: M,
    collaborators: Collaborators,
    cancel: CancelHandle,
}

impl<M: SessionMachine> Orchestrator<M> {
    pub fn new(state: M, collaborators: Collaborators) -> Self {
        Self { state, collaborators, cancel: CancelHandle::default() }
    }

    pub fn state(&self) -> &M {
        &self.state
    }

    pub fn into_state(self) -> M {
        self.state
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Open the session.
    pub async fn start<F>(&mut self, on_fragment: F) -> SessionResult<Vec<Outcome>>
    where
        F: FnMut(&str),
    {
        self.dispatch(SessionEvent::Start { at: Utc::now() }, on_fragment).await
    }

    /// Continue a restored session, replaying any work it still owes.
    pub async fn resume<F>(&mut self, on_fragment: F) -> SessionResult<Vec<Outcome>>
    where
        F: FnMut(&str),
    {
        self.dispatch(SessionEvent::Resumed, on_fragment).await
    }

    /// Send a user message. `on_fragment` sees raw streamed text as it arrives.
    pub async fn submit<F>(&mut self, text: &str, on_fragment: F) -> SessionResult<Vec<Outcome>>
    where
        F: FnMut(&str),
    {
        self.dispatch(SessionEvent::UserSubmitted { text: text.to_string() }, on_fragment).await
    }

    /// Apply `event` and run effects until the session is idle again.
    pub async fn dispatch<F>(&mut self, event: SessionEvent, mut on_fragment: F) -> SessionResult<Vec<Outcome>>
    where
        F: FnMut(&str),
    {
        let _busy = self.cancel.begin();
        let mut outcomes = Vec::new();
        let mut queue: VecDeque<Effect> = self.apply(event)?.into();

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Display(text) => outcomes.push(Outcome::Message(text)),
                Effect::ShowResponse(text) => outcomes.push(Outcome::Response(text)),
                Effect::RequestCompletion(request) => {
                    let follow_up = self.stream(request, &mut on_fragment, &mut outcomes).await;
                    self.cancel.disarm();
                    queue.extend(follow_up?);
                }
                Effect::RequestSummary { phase, conversation } => {
                    let result = self
                        .collaborators
                        .summarizer
                        .summarize(phase, &conversation)
                        .await
                        .map_err(|e| e.to_string());
                    queue.extend(self.apply(SessionEvent::SummaryReady { phase, result, at: Utc::now() })?);
                }
                Effect::RequestOverlaps(request) => {
                    let result =
                        self.collaborators.overlaps.compute_overlaps(&request).await.map_err(|e| e.to_string());
                    queue.extend(self.apply(SessionEvent::OverlapsReady { result, at: Utc::now() })?);
                }
                Effect::RequestWhyExtraction { conversation } => {
                    let result =
                        self.collaborators.why_extractor.extract_why(&conversation).await.map_err(|e| e.to_string());
                    queue.extend(self.apply(SessionEvent::WhyExtractionReady { result })?);
                }
                Effect::SaveSnapshot => {
                    if let Some(warning) = self.save_snapshot().await {
                        outcomes.push(Outcome::Warning(warning));
                    }
                }
                Effect::PhaseCompleted { phase, auto_filled } => {
                    outcomes.push(Outcome::PhaseCompleted { phase, auto_filled });
                }
                Effect::PromptSaveWhy(synthesis) => outcomes.push(Outcome::SaveSuggested(synthesis)),
                Effect::PromptSaveIkigai => outcomes.push(Outcome::IkigaiReady),
            }
        }

        Ok(outcomes)
    }

    fn apply(&mut self, event: SessionEvent) -> SessionResult<Vec<Effect>> {
        let transition = self.state.reduce(event)?;
        self.state = transition.state;
        Ok(transition.effects)
    }

    /// Stream one completion into the state.
    ///
    /// Returns the effects of the terminal event. Transport failures are
    /// reported as [`SessionError::CollaboratorUnavailable`] after the
    /// in-flight exchange is discarded.
    async fn stream<F>(
        &mut self,
        request: CompletionRequest,
        on_fragment: &mut F,
        outcomes: &mut Vec<Outcome>,
    ) -> SessionResult<Vec<Effect>>
    where
        F: FnMut(&str),
    {
        let token = self.cancel.arm();
        let chat = Arc::clone(&self.collaborators.chat);

        let mut stream = tokio::select! {
            biased;
            () = token.cancelled() => return self.stop(outcomes),
            started = chat.stream_chat(&request) => match started {
                Ok(stream) => stream,
                Err(e) => return Err(self.fail(e)),
            },
        };

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => return self.stop(outcomes),
                next = stream.next() => match next {
                    Some(Ok(fragment)) => {
                        on_fragment(&fragment);
                        self.apply(SessionEvent::ResponseFragment { text: fragment })?;
                    }
                    Some(Err(e)) => return Err(self.fail(e)),
                    None => return self.apply(SessionEvent::ResponseCompleted),
                },
            }
        }
    }

    fn stop(&mut self, outcomes: &mut Vec<Outcome>) -> SessionResult<Vec<Effect>> {
        let effects = self.apply(SessionEvent::ResponseCancelled)?;
        let partial = self.state.transcript().last().map(|e| e.response.clone()).unwrap_or_default();
        tracing::debug!(len = partial.len(), "Generation stopped");
        outcomes.push(Outcome::Stopped(partial));
        Ok(effects)
    }

    fn fail(&mut self, error: anyhow::Error) -> SessionError {
        tracing::warn!(provider = self.collaborators.chat.name(), error = %error, "Chat request failed");
        if let Err(e) = self.apply(SessionEvent::ResponseFailed { error: error.to_string() }) {
            tracing::debug!(error = %e, "No response to discard");
        }
        SessionError::CollaboratorUnavailable(error.to_string())
    }

    async fn save_snapshot(&self) -> Option<String> {
        let snapshot = self.state.snapshot(Utc::now())?;
        match self.collaborators.store.save_temp_state(&snapshot).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Could not save session progress");
                Some(format!("Progress could not be saved: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::ai::FragmentStream;
    use crate::core::{IkigaiBucket, IkigaiProfile, Overlaps};
    use crate::session::{DecisionHelperState, WhyFinderState};
    use crate::store::{JsonFileStore, MemoryStore};

    struct Echo;

    #[async_trait]
    impl ChatProvider for Echo {
        async fn stream_chat(&self, request: &CompletionRequest) -> anyhow::Result<FragmentStream> {
            let reply = format!("You said: {}", request.user_message);
            Ok(futures::stream::iter(vec![Ok(reply)]).boxed())
        }
        fn name(&self) -> &str {
            "echo"
        }
        fn model(&self) -> &str {
            "echo-1"
        }
        async fn is_available(&self) -> bool {
            true
        }
    }

    fn profile() -> IkigaiProfile {
        let bucket = || IkigaiBucket::new(vec!["Teaching kids to code".to_string()], "Teaching");
        IkigaiProfile {
            id: "ikigai_test".to_string(),
            name: "Test".to_string(),
            created_at: Utc::now(),
            source_why_profile_id: None,
            why_statement: "To teach".to_string(),
            love: bucket(),
            good_at: bucket(),
            world_needs: bucket(),
            paid_for: bucket(),
            overlaps: Overlaps::placeholder(Utc::now()),
            key_patterns: Vec::new(),
            auto_filled_phases: Default::default(),
            is_complete: true,
            updated_at: None,
        }
    }

    #[test]
    fn test_cancel_before_stream_is_held() {
        let handle = CancelHandle::default();
        handle.cancel();
        {
            let _busy = handle.begin();
            assert!(!handle.arm().is_cancelled());
            handle.disarm();

            handle.cancel();
            assert!(handle.arm().is_cancelled());
            handle.disarm();
            assert!(!handle.arm().is_cancelled());
        }
        handle.cancel();
        let _busy = handle.begin();
        assert!(!handle.arm().is_cancelled());
    }

    #[tokio::test]
    async fn test_fragments_reach_callback() {
        let state = DecisionHelperState::new(profile()).unwrap();
        let collaborators = Collaborators::with_analyst(Arc::new(Echo), Arc::new(MemoryStore::new()));
        let mut orchestrator = Orchestrator::new(state, collaborators);

        orchestrator.start(|_| {}).await.unwrap();
        let mut streamed = String::new();
        let outcomes = orchestrator
            .submit("Should I take the teaching job?", |f| streamed.push_str(f))
            .await
            .unwrap();

        assert_eq!(streamed, "You said: Should I take the teaching job?");
        assert_eq!(outcomes, vec![Outcome::Response(streamed.clone())]);
        assert_eq!(orchestrator.state().transcript().exchanges().len(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_failure_is_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();

        let collaborators = Collaborators::with_analyst(Arc::new(Echo), Arc::new(JsonFileStore::with_path(&blocker)));
        let mut orchestrator = Orchestrator::new(WhyFinderState::new(), collaborators);
        orchestrator.start(|_| {}).await.unwrap();

        let outcomes = orchestrator.submit("I build tools for teachers at a startup", |_| {}).await.unwrap();
        assert!(outcomes.iter().any(|o| matches!(o, Outcome::Warning(_))));
        assert_eq!(orchestrator.state().exchange_count(), 1);
    }
}
