//! Extraction engine.
//!
//! Recovers structured values from free-form model output:
//!
//! - **Sections** - named prose sections and bullet lists under known headings
//! - **JSON** - a single JSON object buried in commentary, fences or noise
//!
//! Every function here degrades gracefully: a missing heading yields an empty
//! list or `None`, never an error. Callers decide on fallbacks.

mod json;
mod sections;

pub use json::{recover_json, recover_json_as};
pub use sections::{
    clean_bullets, extract_bullets, find_section, is_heading_like, Section, GOOD_AT,
    KNOWN_SECTIONS, LEARNING_SUMMARY, LOVED, MIN_BULLET_LEN, PAID_FOR, PATTERNS, WHY_EXPLANATION,
    WHY_STATEMENT, WORLD_NEEDS,
};
