//! Section and bullet extraction from markdown-ish model output.

use once_cell::sync::Lazy;
use regex::Regex;

/// Items shorter than this (in characters, after cleaning) are dropped.
pub const MIN_BULLET_LEN: usize = 5;

/// Longest line that can still be read as a heading.
const MAX_HEADING_LEN: usize = 60;

static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[-*+•–—·]\s+|\d{1,2}[.)]\s+)").unwrap());

/// A named section and the heading spellings models use for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub name: &'static str,
    pub variants: &'static [&'static str],
}

pub const LEARNING_SUMMARY: Section = Section {
    name: "learning_summary",
    variants: &[
        "WHAT I LEARNED ABOUT YOU",
        "WHAT I'VE LEARNED ABOUT YOU",
        "WHAT I HAVE LEARNED ABOUT YOU",
        "WHAT I LEARNED",
        "WHAT I'VE LEARNED",
        "SUMMARY",
    ],
};

pub const PATTERNS: Section = Section {
    name: "patterns",
    variants: &["PATTERNS I NOTICED", "PATTERNS I SEE", "THE PATTERNS", "PATTERNS", "THE PATTERN"],
};

pub const WHY_STATEMENT: Section = Section {
    name: "why_statement",
    variants: &["YOUR WHY IS", "YOUR WHY STATEMENT", "YOUR WHY", "WHY STATEMENT"],
};

pub const WHY_EXPLANATION: Section = Section {
    name: "why_explanation",
    variants: &["WHY THIS FITS YOU", "WHY THIS FITS", "HOW THIS FITS YOU", "WHY IT FITS"],
};

pub const LOVED: Section = Section {
    name: "loved",
    variants: &["WHAT YOU LOVE DOING", "WHAT YOU LOVE", "THINGS YOU LOVE", "WHAT YOU ENJOY"],
};

pub const GOOD_AT: Section = Section {
    name: "good_at",
    variants: &[
        "WHAT YOU'RE GOOD AT",
        "WHAT YOU ARE GOOD AT",
        "YOUR STRENGTHS",
        "WHAT YOU'RE GREAT AT",
    ],
};

pub const WORLD_NEEDS: Section = Section {
    name: "world_needs",
    variants: &["WHAT THE WORLD NEEDS", "WHAT THE WORLD NEEDS FROM YOU", "WORLD NEEDS"],
};

pub const PAID_FOR: Section = Section {
    name: "paid_for",
    variants: &["WHAT YOU CAN BE PAID FOR", "WHAT YOU COULD BE PAID FOR", "PAID FOR"],
};

/// Every heading the engine knows about. A line matching any of these ends a capture.
pub const KNOWN_SECTIONS: &[Section] = &[
    LEARNING_SUMMARY,
    PATTERNS,
    WHY_STATEMENT,
    WHY_EXPLANATION,
    LOVED,
    GOOD_AT,
    WORLD_NEEDS,
    PAID_FOR,
];

/// Find the first heading for `section` and return the prose under it.
///
/// Emphasis markers are removed and surrounding quotes are trimmed. Inline
/// content on the heading line (`**YOUR WHY IS:** To ...`) is part of the
/// section. Returns `None` when no heading matches or the section is empty.
pub fn find_section(text: &str, section: &Section) -> Option<String> {
    let lines = capture(text, section)?;
    let prose = lines
        .iter()
        .map(|line| strip_emphasis(line.trim()))
        .collect::<Vec<_>>()
        .join("\n");
    let prose = prose.trim().trim_matches(|c| matches!(c, '"' | '“' | '”')).trim().to_string();

    if prose.is_empty() {
        None
    } else {
        Some(prose)
    }
}

/// Extract the bullet items listed under the first heading for `section`.
///
/// Returns an empty list when the heading is missing.
pub fn extract_bullets(text: &str, section: &Section) -> Vec<String> {
    let Some(lines) = capture(text, section) else {
        return Vec::new();
    };

    let non_empty: Vec<&str> =
        lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty()).collect();

    // A single comma-separated line after an inline heading
    let items: Vec<String> = match non_empty.as_slice() {
        [only] if !LIST_MARKER.is_match(only) && (only.contains(',') || only.contains(';')) => {
            only.split([',', ';']).map(str::to_string).collect()
        }
        _ => non_empty.into_iter().map(str::to_string).collect(),
    };

    clean_bullets(items)
}

/// Normalize a raw list of candidate bullets.
///
/// Strips list markers and emphasis, drops headings and short items, and
/// removes case-insensitive duplicates while keeping first-seen order.
pub fn clean_bullets<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    let mut bullets = Vec::new();

    for item in items {
        let item = normalize_quotes(item.as_ref());
        if is_heading_item(&item) {
            continue;
        }
        let cleaned = clean_item(&item);
        if cleaned.chars().count() < MIN_BULLET_LEN || is_heading_item(&cleaned) {
            continue;
        }
        if seen.insert(cleaned.to_lowercase()) {
            bullets.push(cleaned);
        }
    }

    bullets
}

/// Whether a line looks like the start of a new section.
///
/// List items are never headings. Markdown `#` headings, known section
/// headings, short lines ending in a colon, and short all-caps lines are.
pub fn is_heading_like(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || LIST_MARKER.is_match(trimmed) {
        return false;
    }
    if trimmed.starts_with('#') {
        return true;
    }
    let normalized = normalize_quotes(trimmed);
    if KNOWN_SECTIONS.iter().any(|s| match_heading(&normalized, s).is_some()) {
        return true;
    }
    let plain = strip_emphasis(&normalized);
    (plain.ends_with(':') && plain.chars().count() <= MAX_HEADING_LEN) || is_shouting(&plain)
}

/// Lines under the first heading for `section`, up to the next heading-like line.
fn capture(text: &str, section: &Section) -> Option<Vec<String>> {
    let text = normalize_quotes(text);
    let lines: Vec<&str> = text.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        let Some(inline) = match_heading(line, section) else {
            continue;
        };

        let mut captured = Vec::new();
        if !inline.is_empty() {
            captured.push(inline.to_string());
        }
        for next in &lines[i + 1..] {
            if is_heading_like(next) {
                break;
            }
            captured.push((*next).to_string());
        }
        return Some(captured);
    }

    None
}

/// Match a heading line against a section's variants.
///
/// Returns the inline content after the heading. A bare variant only counts
/// as a heading when followed by a colon or when the line is formatted as
/// a heading (`#`, `**`, `__`), so prose that happens to start with the
/// same words is not captured.
fn match_heading<'a>(line: &'a str, section: &Section) -> Option<&'a str> {
    let trimmed = line.trim();
    let body = trimmed.trim_start_matches(|c: char| matches!(c, '#' | '*' | '_' | '>') || c.is_whitespace());
    let decorated = body.len() != trimmed.len();

    for variant in section.variants {
        let Some(head) = body.get(..variant.len()) else {
            continue;
        };
        if !head.eq_ignore_ascii_case(variant) {
            continue;
        }

        let rest = &body[variant.len()..];
        let after_emphasis = rest.trim_start_matches(['*', '_']);
        let has_colon = after_emphasis.trim_start().starts_with(':');
        let bare = after_emphasis.trim().is_empty();

        if has_colon || (bare && decorated) || (rest.is_empty() && is_shouting(head)) {
            let inline = after_emphasis
                .trim_start()
                .trim_start_matches(':')
                .trim_start_matches(['*', '_'])
                .trim();
            return Some(inline);
        }
    }

    None
}

/// Remove list markers and emphasis from a single item.
fn clean_item(item: &str) -> String {
    let mut text = item.trim();
    while let Some(m) = LIST_MARKER.find(text) {
        text = text[m.end()..].trim_start();
    }
    let text = strip_emphasis(text);
    text.trim_matches(|c: char| c.is_whitespace() || c == '`').to_string()
}

/// Whether an already-extracted item is really a heading.
fn is_heading_item(item: &str) -> bool {
    let mut text = item.trim();
    while let Some(m) = LIST_MARKER.find(text) {
        text = text[m.end()..].trim_start();
    }
    let plain = strip_emphasis(text);
    if plain.is_empty() {
        return false;
    }
    if plain.ends_with(':') || text.starts_with('#') || is_shouting(&plain) {
        return true;
    }

    let upper = plain.to_ascii_uppercase();
    KNOWN_SECTIONS.iter().flat_map(|s| s.variants.iter()).any(|variant| {
        upper == *variant || upper.contains(&format!("{}:", variant))
    })
}

/// Short line with letters and no lowercase: `PATTERNS I NOTICED`.
fn is_shouting(text: &str) -> bool {
    let letters = text.chars().filter(|c| c.is_alphabetic()).count();
    letters >= 3
        && text.chars().count() <= MAX_HEADING_LEN
        && !text.chars().any(|c| c.is_lowercase())
}

fn strip_emphasis(text: &str) -> String {
    text.replace("**", "")
        .replace("__", "")
        .trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace())
        .to_string()
}

fn normalize_quotes(text: &str) -> String {
    text.replace(['’', '‘'], "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FINAL_VERDICT: &str = "Thank you for sharing so openly.

**WHAT I LEARNED ABOUT YOU:**
You light up when you teach and build things with your hands.

**PATTERNS I NOTICED:**
- Helping others understand hard ideas
- Making something tangible

**YOUR WHY IS:** To help people see what they are capable of, so they can build lives they are proud of.

**WHY THIS FITS YOU:**
Every story you told ended with someone else growing.

**WHAT YOU LOVE:**
- Teaching kids
- Woodworking on weekends

**WHAT YOU'RE GOOD AT:**
- Explaining complex things simply
- Staying patient under pressure";

    #[test]
    fn test_spec_bullet_example() {
        let text = "**WHAT YOU LOVE:**\n- Painting\n- Teaching kids\nWHAT YOU'RE GOOD AT:\n- Writing";
        assert_eq!(extract_bullets(text, &LOVED), vec!["Painting", "Teaching kids"]);
        assert_eq!(extract_bullets(text, &GOOD_AT), vec!["Writing"]);
    }

    #[test]
    fn test_find_why_statement_inline() {
        let why = find_section(FINAL_VERDICT, &WHY_STATEMENT).unwrap();
        assert_eq!(
            why,
            "To help people see what they are capable of, so they can build lives they are proud of."
        );
    }

    #[test]
    fn test_find_multiline_section() {
        let summary = find_section(FINAL_VERDICT, &LEARNING_SUMMARY).unwrap();
        assert_eq!(summary, "You light up when you teach and build things with your hands.");

        let fits = find_section(FINAL_VERDICT, &WHY_EXPLANATION).unwrap();
        assert!(fits.starts_with("Every story"));
    }

    #[test]
    fn test_heading_variants() {
        let text = "## Your Strengths\n1. Listening deeply\n2) Planning ahead\n";
        assert_eq!(extract_bullets(text, &GOOD_AT), vec!["Listening deeply", "Planning ahead"]);

        let curly = "WHAT YOU’RE GOOD AT:\n• Negotiation";
        assert_eq!(extract_bullets(curly, &GOOD_AT), vec!["Negotiation"]);
    }

    #[test]
    fn test_missing_heading_is_empty() {
        assert!(extract_bullets("Just some chat with no headings.", &LOVED).is_empty());
        assert!(find_section("Nothing here", &WHY_STATEMENT).is_none());
    }

    #[test]
    fn test_prose_is_not_a_heading() {
        let text = "Your why is something we will uncover together.\nTell me more?";
        assert!(find_section(text, &WHY_STATEMENT).is_none());
    }

    #[test]
    fn test_inline_comma_list() {
        let text = "What you love: painting, teaching kids, long hikes";
        assert_eq!(extract_bullets(text, &LOVED), vec!["painting", "teaching kids", "long hikes"]);
    }

    #[test]
    fn test_clean_bullets_drops_headings_and_short_items() {
        let bullets = clean_bullets([
            "- **Teaching kids**",
            "* teaching kids",
            "- Art",
            "STRENGTHS",
            "Things I noticed:",
            "- Your strengths: listening",
            "`Running workshops`",
        ]);
        assert_eq!(bullets, vec!["Teaching kids", "Running workshops"]);
    }

    #[test]
    fn test_is_heading_like() {
        assert!(is_heading_like("## Anything"));
        assert!(is_heading_like("**PATTERNS I NOTICED:**"));
        assert!(is_heading_like("Next steps:"));
        assert!(is_heading_like("THE BIG PICTURE"));
        assert!(!is_heading_like("- A bullet: with a colon"));
        assert!(!is_heading_like("Just a normal sentence about things."));
    }
}
