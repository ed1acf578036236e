//! Core types for the coaching engine.
//!
//! Profiles, configuration and the error types shared across modules.

mod config;
mod error;
mod profile;

pub use config::{AiConfig, ClaudeConfig, Config, GeneralConfig, OllamaConfig, SessionConfig};
pub use error::{SessionError, SessionResult, StoreError, StoreResult};
pub use profile::{
    generate_id, ExtractedBucket, IkigaiBucket, IkigaiProfile, IkigaiProfileSummary, Overlaps,
    WhyProfile, WhyProfileSummary,
};
