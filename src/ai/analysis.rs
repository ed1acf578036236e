//! Structured analysis collaborators.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::core::{ExtractedBucket, IkigaiBucket, Overlaps};
use crate::extract::recover_json;
use crate::session::{Exchange, IkigaiPhase};

use super::{prompts, AIError, ChatProvider, CompletionRequest};

/// Widest `[...]` span in a response.
static JSON_ARRAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[\s\S]*\]").unwrap());

/// A strength suggested by a single answer, with the words that show it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateStrength {
    pub text: String,
    pub source_quote: String,
    pub phase: IkigaiPhase,
}

/// Summary of one finished Ikigai phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseSummary {
    pub bucket: ExtractedBucket,
    pub key_insights: Vec<String>,
}

/// Inputs to overlap computation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlapRequest {
    pub why_statement: String,
    pub love: Vec<String>,
    pub good_at: Vec<String>,
    pub world_needs: Vec<String>,
    pub paid_for: Vec<String>,
}

/// Loved / good-at lists recovered from a Why conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhyExtraction {
    pub what_you_love: Vec<String>,
    pub what_you_are_good_at: Vec<String>,
    pub why_explanation: String,
}

#[async_trait]
pub trait PhaseSummarizer: Send + Sync {
    async fn summarize(&self, phase: IkigaiPhase, conversation: &[Exchange]) -> anyhow::Result<PhaseSummary>;
}

#[async_trait]
pub trait OverlapComputer: Send + Sync {
    async fn compute_overlaps(&self, request: &OverlapRequest) -> anyhow::Result<Overlaps>;
}

#[async_trait]
pub trait WhyExtractor: Send + Sync {
    async fn extract_why(&self, conversation: &[Exchange]) -> anyhow::Result<WhyExtraction>;
}

/// Analysis backed by a chat model and JSON recovery.
///
/// Output that yields no usable JSON is an error, so callers fall back to
/// their own deterministic defaults.
pub struct LlmAnalyst {
    chat: Arc<dyn ChatProvider>,
}

impl LlmAnalyst {
    pub fn new(chat: Arc<dyn ChatProvider>) -> Self {
        Self { chat }
    }

    /// Candidate strengths shown in one answer.
    ///
    /// Never fails: an unreachable model or unreadable output yields an
    /// empty list.
    pub async fn extract_strengths(&self, answer: &str, phase: IkigaiPhase) -> Vec<CandidateStrength> {
        let request = CompletionRequest::new(prompts::strength_extraction_prompt(answer, phase), answer);
        match self.chat.complete(&request).await {
            Ok(text) => parse_strengths(&text, phase),
            Err(e) => {
                tracing::warn!(provider = self.chat.name(), error = %e, "Strength extraction failed");
                Vec::new()
            }
        }
    }

    async fn ask_json(&self, prompt: String, instruction: &str) -> anyhow::Result<Map<String, Value>> {
        let request = CompletionRequest::new(prompt, instruction);
        let text = self.chat.complete(&request).await?;
        recover_json(&text).ok_or_else(|| {
            tracing::debug!(provider = self.chat.name(), len = text.len(), "No JSON in analysis output");
            AIError::MalformedOutput("no JSON object found".to_string()).into()
        })
    }
}

#[async_trait]
impl PhaseSummarizer for LlmAnalyst {
    async fn summarize(&self, phase: IkigaiPhase, conversation: &[Exchange]) -> anyhow::Result<PhaseSummary> {
        let obj = self
            .ask_json(prompts::phase_summary_prompt(phase, conversation), "Extract the data as JSON.")
            .await?;
        parse_phase_summary(phase, &obj)
            .ok_or_else(|| AIError::MalformedOutput(format!("no {phase} bullets")).into())
    }
}

#[async_trait]
impl OverlapComputer for LlmAnalyst {
    async fn compute_overlaps(&self, request: &OverlapRequest) -> anyhow::Result<Overlaps> {
        let obj = self.ask_json(prompts::overlap_prompt(request), "Compute the overlaps as JSON.").await?;
        parse_overlaps(&obj, Utc::now())
            .ok_or_else(|| AIError::MalformedOutput("no overlap sections".to_string()).into())
    }
}

#[async_trait]
impl WhyExtractor for LlmAnalyst {
    async fn extract_why(&self, conversation: &[Exchange]) -> anyhow::Result<WhyExtraction> {
        let obj = self.ask_json(prompts::why_extraction_prompt(conversation), "Extract the lists as JSON.").await?;
        Ok(parse_why_extraction(&obj))
    }
}

/// Strings from a JSON array, a single string, or objects with a `text` field.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(o) => o.get("text").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn text_field(value: Option<&Value>) -> String {
    value.and_then(Value::as_str).unwrap_or_default().trim().to_string()
}

fn field<'a>(obj: &'a Map<String, Value>, snake: &str, camel: &str) -> Option<&'a Value> {
    obj.get(snake).or_else(|| obj.get(camel))
}

/// Read a phase summary. The bucket may be nested under the phase key or flat.
pub fn parse_phase_summary(phase: IkigaiPhase, obj: &Map<String, Value>) -> Option<PhaseSummary> {
    let key = phase.dimension()?.as_str();
    let node = obj.get(key).and_then(Value::as_object).unwrap_or(obj);

    let mut bullets = string_list(node.get("bullets"));
    if phase == IkigaiPhase::Phase4Paid {
        bullets.extend(string_list(node.get("current")));
        bullets.extend(string_list(node.get("potential")));
    }
    let bucket = ExtractedBucket::new(bullets, string_list(node.get("quotes")), text_field(node.get("summary")));
    if bucket.is_empty() {
        return None;
    }

    let key_insights = string_list(field(obj, "key_insights", "keyInsights"));
    Some(PhaseSummary { bucket, key_insights })
}

/// Read the four overlaps. Missing sections are left empty; none at all is `None`.
pub fn parse_overlaps(obj: &Map<String, Value>, at: DateTime<Utc>) -> Option<Overlaps> {
    let names = ["passion", "mission", "profession", "vocation"];
    if names.iter().all(|n| !obj.contains_key(*n)) {
        return None;
    }

    let bucket = |name: &str| match obj.get(name) {
        Some(Value::Object(node)) => IkigaiBucket::new(string_list(node.get("bullets")), text_field(node.get("summary"))),
        Some(Value::String(summary)) => IkigaiBucket::new(Vec::new(), summary.clone()),
        _ => IkigaiBucket::default(),
    };

    Some(Overlaps {
        passion: bucket("passion"),
        mission: bucket("mission"),
        profession: bucket("profession"),
        vocation: bucket("vocation"),
        computed_at: at,
    })
}

/// Read a JSON array of strengths. Items without text are skipped; an
/// unknown or missing phase falls back to `phase`.
pub fn parse_strengths(text: &str, phase: IkigaiPhase) -> Vec<CandidateStrength> {
    let Some(Value::Array(items)) = JSON_ARRAY.find(text).and_then(|m| serde_json::from_str::<Value>(m.as_str()).ok()) else {
        tracing::debug!(len = text.len(), "No strength array in output");
        return Vec::new();
    };

    items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|item| {
            let text = text_field(item.get("text"));
            if text.is_empty() {
                return None;
            }
            let phase = item
                .get("phase")
                .and_then(|p| serde_json::from_value(p.clone()).ok())
                .unwrap_or(phase);
            Some(CandidateStrength { text, source_quote: text_field(field(item, "source_quote", "sourceQuote")), phase })
        })
        .collect()
}

pub fn parse_why_extraction(obj: &Map<String, Value>) -> WhyExtraction {
    WhyExtraction {
        what_you_love: crate::extract::clean_bullets(string_list(field(obj, "what_you_love", "whatYouLove"))),
        what_you_are_good_at: crate::extract::clean_bullets(string_list(field(
            obj,
            "what_you_are_good_at",
            "whatYouAreGoodAt",
        ))),
        why_explanation: text_field(field(obj, "why_explanation", "whyExplanation")),
    }
}
