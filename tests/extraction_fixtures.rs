//! Extraction Fixture Tests
//!
//! Realistic model output run through section extraction, JSON recovery and
//! response sanitizing.

use chrono::{TimeZone, Utc};
use insta::assert_snapshot;
use serde_json::Value;

use ikigai_coach::ai::{parse_overlaps, parse_phase_summary, parse_why_extraction};
use ikigai_coach::enforce::{strip_premature_conclusion, strip_trailing_questions, GENERIC_FOLLOW_UP};
use ikigai_coach::extract::{extract_bullets, find_section, recover_json, GOOD_AT, LOVED, PAID_FOR, WHY_STATEMENT};
use ikigai_coach::session::{IkigaiPhase, WhySynthesis};

const VERDICT: &str = "Thank you for sharing all of this with me.

## What I learned about you
You come alive when a room full of people finally *gets it*.

**PATTERNS I NOTICED:**
1. You gravitate toward teaching
2. You build things others can use

**YOUR WHY IS:** \u{201c}To turn confusion into confidence for the people around me.\u{201d}

**WHY THIS FITS YOU:**
Your best days were the ones where someone else got unstuck.

**WHAT YOU LOVE:**
- Running weekend workshops
- Sketching in the park
- **Sketching in the park**
- Ok

**WHAT YOU\u{2019}RE GOOD AT:**
* Explaining complex things simply
* Staying patient under pressure

What part of this feels most true to you?";

fn render(synthesis: &WhySynthesis) -> String {
    format!(
        "why: {}\nloves: {}\ngood at: {}\nmissing: {}",
        synthesis.why_statement,
        synthesis.what_you_love.join(" | "),
        synthesis.what_you_are_good_at.join(" | "),
        synthesis.missing_conclusion
    )
}

// ============================================================================
// Sections & Bullets
// ============================================================================

#[test]
fn test_bullets_under_bold_heading() {
    let text = "**WHAT YOU LOVE:**\n- Painting\n- Teaching kids\nWHAT YOU'RE GOOD AT:\n- Writing";
    let bullets = extract_bullets(text, &LOVED);
    assert_snapshot!(bullets.join(" | "), @"Painting | Teaching kids");
}

#[test]
fn test_verdict_synthesis() {
    let synthesis = WhySynthesis::from_verdict(&strip_trailing_questions(VERDICT));
    assert_snapshot!(render(&synthesis), @r"
why: To turn confusion into confidence for the people around me.
loves: Running weekend workshops | Sketching in the park
good at: Explaining complex things simply | Staying patient under pressure
missing: false
");
}

#[test]
fn test_comma_separated_inline_list() {
    let text = "WHAT YOU CAN BE PAID FOR: tutoring, curriculum design; technical writing";
    assert_snapshot!(extract_bullets(text, &PAID_FOR).join(" | "), @"tutoring | curriculum design | technical writing");
}

#[test]
fn test_missing_heading_yields_nothing() {
    let text = "We talked about a lot today. Let's keep exploring next time.";
    assert!(extract_bullets(text, &GOOD_AT).is_empty());
    assert_eq!(find_section(text, &WHY_STATEMENT), None);
    assert!(WhySynthesis::from_verdict(text).missing_conclusion);
}

// ============================================================================
// JSON Recovery
// ============================================================================

#[test]
fn test_last_object_in_noise() {
    let obj = recover_json(r#"noise {"a":1} more noise {"a":2}"#).unwrap();
    assert_snapshot!(Value::Object(obj).to_string(), @r#"{"a":2}"#);
}

#[test]
fn test_fenced_block_with_commentary() {
    let text = "Here is the analysis you asked for:\n\n```json\n{\"love\": {\"bullets\": [\"Painting\"], \"summary\": \"Art\"}}\n```\nLet me know!";
    let obj = recover_json(text).unwrap();
    assert_snapshot!(Value::Object(obj).to_string(), @r#"{"love":{"bullets":["Painting"],"summary":"Art"}}"#);
}

#[test]
fn test_nested_object_without_fence() {
    let obj = recover_json(r#"Sure! {"outer": {"inner": 1}} hope that helps"#).unwrap();
    assert_snapshot!(Value::Object(obj).to_string(), @r#"{"outer":{"inner":1}}"#);
}

#[test]
fn test_no_json_at_all() {
    assert!(recover_json("I could not produce a summary this time.").is_none());
    assert!(recover_json("").is_none());
}

#[test]
fn test_paid_for_summary_merges_current_and_potential() {
    let text = r#"```json
{"paid_for": {"current": ["Freelance tutoring"], "potential": ["Online courses", "Workshops for teams"], "summary": "Teaching pays"},
 "key_insights": ["Teaching is the common thread"]}
```"#;
    let obj = recover_json(text).unwrap();
    let summary = parse_phase_summary(IkigaiPhase::Phase4Paid, &obj).unwrap();
    assert_snapshot!(summary.bucket.bullets.join(" | "), @"Freelance tutoring | Online courses | Workshops for teams");
    assert_eq!(summary.key_insights, vec!["Teaching is the common thread"]);
}

#[test]
fn test_overlaps_and_extraction_accept_camel_case() {
    let obj = recover_json(
        r#"{"passion": {"bullets": ["Teaching art to kids"], "summary": "Joyful"}, "mission": "Help kids create"}"#,
    )
    .unwrap();
    let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let overlaps = parse_overlaps(&obj, at).unwrap();
    assert_eq!(overlaps.passion.bullets, vec!["Teaching art to kids"]);
    assert_eq!(overlaps.mission.summary, "Help kids create");
    assert!(overlaps.vocation.bullets.is_empty());

    let obj = recover_json(r#"{"whatYouLove": ["Hiking with friends"], "whatYouAreGoodAt": ["Listening closely"]}"#)
        .unwrap();
    let extraction = parse_why_extraction(&obj);
    assert_eq!(extraction.what_you_love, vec!["Hiking with friends"]);
    assert_eq!(extraction.what_you_are_good_at, vec!["Listening closely"]);
}

// ============================================================================
// Sanitizing
// ============================================================================

#[test]
fn test_early_verdict_reduced_to_generic_follow_up() {
    let result = strip_premature_conclusion("Nice!\n\nYOUR WHY IS: To teach.", 4, 12);
    assert!(result.was_stripped);
    assert_eq!(result.cleaned, GENERIC_FOLLOW_UP);
}

#[test]
fn test_final_verdict_untouched_by_premature_check() {
    let result = strip_premature_conclusion(VERDICT, 12, 12);
    assert!(!result.was_stripped);
    assert_eq!(result.cleaned, VERDICT);
}

#[test]
fn test_trailing_question_removed_from_verdict() {
    let cleaned = strip_trailing_questions(VERDICT);
    assert!(!cleaned.contains("most true to you"));
    assert!(cleaned.trim_end().ends_with("Staying patient under pressure"));
}
