//! Prompt builders.
//!
//! Wording here is replaceable; the engine only relies on the section
//! headings it asks for, which match what `extract` looks for.

use std::fmt::Write as _;

use crate::core::IkigaiProfile;
use crate::session::{Exchange, IkigaiPhase, PhaseAnswerCounts, PhaseStorage, WhySource, WhyStage};

use super::OverlapRequest;

/// Opening message of a Why Finder session, shown without a model call.
pub const INITIAL_GREETING: &str = "Hey! I am here to help you discover your Why, your core purpose.

We will have a quick conversation about what energizes you, what drains you, and find patterns that reveal what matters to you.

So tell me, what do you do right now, and what made you curious about finding your why?";

/// Opening message of a Decision-Helper session.
pub const DECISION_GREETING: &str =
    "Let's look at a decision through the lens of your Ikigai. What are you weighing right now?";

/// Synthetic user turn that asks the model to open an Ikigai phase.
pub const PHASE_START_TRIGGER: &str =
    "Start this phase: briefly introduce it and ask the first question.";

const COACH_BASE: &str = "You are a warm, curious coach helping someone discover their Why. \
Ask one question at a time. Keep replies short and reflect back what you heard in their own words.";

fn stage_instructions(stage: WhyStage) -> &'static str {
    match stage {
        WhyStage::Intro => {
            "Get to know them: what they do today and what brought them here. Build rapport."
        }
        WhyStage::EnergyMap => {
            "Map their energy: which activities leave them energized and which drain them."
        }
        WhyStage::Stories => {
            "Collect specific stories: moments they were proud of or completely absorbed. Ask what made each one matter."
        }
        WhyStage::YourWhy => {
            "Look for the thread running through their stories and test candidate themes with them."
        }
        WhyStage::Completed => "The session is complete. Thank them briefly.",
    }
}

/// System prompt for Why Finder exchange `exchange_index` of `total`.
///
/// The final exchange is told to deliver the verdict with fixed headings.
pub fn why_coach_prompt(stage: WhyStage, exchange_index: u32, total: u32) -> String {
    let mut prompt = format!(
        "{COACH_BASE}\n\nCURRENT STAGE: {}\n{}\n\nEXCHANGE {exchange_index} OF {total}",
        stage.as_str().to_uppercase(),
        stage_instructions(stage),
    );

    if exchange_index < total {
        let _ = write!(
            prompt,
            "\n\nDo NOT propose a Why statement yet. {} exchanges remain. End your reply with exactly one question.",
            total - exchange_index
        );
    } else {
        prompt.push_str(
            "\n\nThis is the final exchange. Deliver their Why now using exactly these headings:\n\
WHAT I LEARNED ABOUT YOU:\n\
PATTERNS I NOTICED:\n\
YOUR WHY IS: To ... so that ...\n\
WHY THIS FITS YOU:\n\
WHAT YOU LOVE:\n- one item per line\n\
WHAT YOU'RE GOOD AT:\n- one item per line\n\n\
Do not ask any further questions.",
        );
    }

    prompt
}

fn phase_focus(phase: IkigaiPhase) -> &'static str {
    match phase {
        IkigaiPhase::Phase1Love => "what they love doing, the activities that make time disappear",
        IkigaiPhase::Phase2GoodAt => "what they are good at, the skills others come to them for",
        IkigaiPhase::Phase3World => "what the world needs from them, the problems they care about",
        IkigaiPhase::Phase4Paid => {
            "what they can be paid for, both today and what could earn money in the future"
        }
        IkigaiPhase::Complete => "reviewing their completed Ikigai",
    }
}

/// Short bullet summary of earlier phases, used instead of their transcripts.
pub fn build_short_summary(storage: &PhaseStorage, source: Option<&WhySource>) -> String {
    let mut summary = String::new();

    if let Some(source) = source {
        if !source.why_statement.is_empty() {
            let _ = writeln!(summary, "Their Why: {}", source.why_statement);
        }
    }

    for phase in IkigaiPhase::CONVERSATIONAL {
        let Some(record) = storage.get(phase) else {
            continue;
        };
        let bullets: Vec<&str> = record.bucket.bullets.iter().take(5).map(String::as_str).collect();
        if bullets.is_empty() {
            continue;
        }
        let _ = writeln!(summary, "{}: {}", phase.label(), bullets.join("; "));
    }

    summary.trim_end().to_string()
}

/// System prompt for a conversational Ikigai phase.
pub fn ikigai_phase_prompt(
    phase: IkigaiPhase,
    storage: &PhaseStorage,
    counts: &PhaseAnswerCounts,
    source: Option<&WhySource>,
    answers_per_phase: u32,
) -> String {
    let answered = phase.dimension().map_or(0, |d| counts.get(d));
    let mut prompt = format!(
        "You are an Ikigai coach. This phase explores {}.\n\
Ask one open question at a time and build on their last answer.\n\n\
PHASE: {}\nANSWERS SO FAR: {answered} of {answers_per_phase}",
        phase_focus(phase),
        phase.label(),
    );

    let context = build_short_summary(storage, source);
    if !context.is_empty() {
        let _ = write!(prompt, "\n\nWHAT WE ALREADY KNOW:\n{context}");
    }

    prompt.push_str("\n\nDo not summarize the phase or move on; the session does that for you.");
    prompt
}

fn render_conversation(conversation: &[Exchange]) -> String {
    let mut text = String::new();
    for exchange in conversation {
        if !exchange.response.is_empty() {
            let _ = writeln!(text, "Coach: {}", exchange.response);
        }
        if exchange.is_answer() {
            let _ = writeln!(text, "User: {}", exchange.user_text);
        }
    }
    text
}

/// Prompt asking for a JSON summary of one finished phase.
pub fn phase_summary_prompt(phase: IkigaiPhase, conversation: &[Exchange]) -> String {
    let key = phase.dimension().map_or("summary", |d| d.as_str());
    let shape = if phase == IkigaiPhase::Phase4Paid {
        r#"{"paid_for": {"current": ["..."], "potential": ["..."], "summary": "..."}, "key_insights": ["..."]}"#
            .to_string()
    } else {
        format!(r#"{{"{key}": {{"bullets": ["..."], "quotes": ["..."], "summary": "..."}}, "key_insights": ["..."]}}"#)
    };

    format!(
        "Extract what this conversation reveals about {}.\n\
Use the user's own words where possible. Each bullet is a short phrase.\n\n\
Return ONLY valid JSON shaped like:\n{shape}\n\nCONVERSATION:\n{}",
        phase_focus(phase),
        render_conversation(conversation),
    )
}

/// Prompt asking for the four Ikigai overlaps as JSON.
pub fn overlap_prompt(request: &OverlapRequest) -> String {
    let list = |items: &[String]| if items.is_empty() { "(none)".to_string() } else { items.join("; ") };
    format!(
        "Find where the four circles of this person's Ikigai overlap.\n\n\
WHY: {}\nLOVE: {}\nGOOD AT: {}\nWORLD NEEDS: {}\nPAID FOR: {}\n\n\
passion = love x good at, mission = love x world needs, \
profession = good at x paid for, vocation = world needs x paid for.\n\n\
Return ONLY valid JSON shaped like:\n\
{{\"passion\": {{\"bullets\": [\"...\"], \"summary\": \"...\"}}, \"mission\": {{...}}, \"profession\": {{...}}, \"vocation\": {{...}}}}",
        if request.why_statement.is_empty() { "(unknown)" } else { &request.why_statement },
        list(&request.love),
        list(&request.good_at),
        list(&request.world_needs),
        list(&request.paid_for),
    )
}

/// Prompt asking for loved / good-at lists from a finished Why session.
pub fn why_extraction_prompt(conversation: &[Exchange]) -> String {
    format!(
        "Read this coaching conversation and list what the person loves doing and what they are good at.\n\n\
Return ONLY valid JSON shaped like:\n\
{{\"whatYouLove\": [\"...\"], \"whatYouAreGoodAt\": [\"...\"], \"whyExplanation\": \"...\"}}\n\n\
CONVERSATION:\n{}",
        render_conversation(conversation),
    )
}

/// Prompt asking for candidate strengths shown in a single answer.
pub fn strength_extraction_prompt(answer: &str, phase: IkigaiPhase) -> String {
    format!(
        "Identify the strengths this answer shows while talking about {}.\n\
Only name strengths the words actually support, and quote the part that shows each one.\n\n\
Return ONLY a JSON array shaped like:\n\
[{{\"text\": \"...\", \"sourceQuote\": \"...\"}}]\n\n\
ANSWER:\n{}",
        phase_focus(phase),
        answer.trim(),
    )
}

/// System prompt for the Decision-Helper, grounded in a complete profile.
pub fn decision_helper_prompt(profile: &IkigaiProfile) -> String {
    let bullets = |items: &[String]| items.iter().map(|b| format!("- {b}")).collect::<Vec<_>>().join("\n");
    format!(
        "You help the user weigh decisions against their Ikigai. Be concrete and honest; \
point out which circles an option strengthens or neglects.\n\n\
WHY: {}\n\nLOVE:\n{}\n\nGOOD AT:\n{}\n\nWORLD NEEDS:\n{}\n\nPAID FOR:\n{}\n\n\
PASSION: {}\nMISSION: {}\nPROFESSION: {}\nVOCATION: {}",
        profile.why_statement,
        bullets(&profile.love.bullets),
        bullets(&profile.good_at.bullets),
        bullets(&profile.world_needs.bullets),
        bullets(&profile.paid_for.bullets),
        profile.overlaps.passion.summary,
        profile.overlaps.mission.summary,
        profile.overlaps.profession.summary,
        profile.overlaps.vocation.summary,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_early_exchange_forbids_verdict() {
        let prompt = why_coach_prompt(WhyStage::Intro, 2, 12);
        assert!(prompt.contains("Do NOT propose a Why statement"));
        assert!(prompt.contains("10 exchanges remain"));
    }

    #[test]
    fn test_final_exchange_requests_headings() {
        let prompt = why_coach_prompt(WhyStage::YourWhy, 12, 12);
        assert!(prompt.contains("YOUR WHY IS:"));
        assert!(prompt.contains("WHAT YOU'RE GOOD AT:"));
    }

    #[test]
    fn test_short_summary_empty_without_data() {
        assert!(build_short_summary(&PhaseStorage::default(), None).is_empty());
    }

    #[test]
    fn test_paid_for_summary_prompt_shape() {
        let prompt = phase_summary_prompt(IkigaiPhase::Phase4Paid, &[]);
        assert!(prompt.contains("\"current\""));
        assert!(prompt.contains("\"potential\""));
    }
}
