//! # Ikigai Coach
//!
//! Guided self-reflection interviews driven by a language model.
//!
//! Three session types share one engine:
//!
//! - **Why Finder**: a fixed-length interview that ends in a Why statement
//! - **Ikigai Builder**: four phases (love, good at, world needs, paid for)
//!   followed by an overlap analysis, optionally seeded from a saved Why profile
//! - **Decision Helper**: open Q&A grounded in a completed Ikigai profile
//!
//! Sessions are pure reducers over [`session::SessionEvent`]s. The
//! [`session::Orchestrator`] streams model output, runs analysis, and keeps a
//! resumable snapshot in a [`store::ProfileStore`].
//!
//! ## Quick Start
//!
//! ```bash
//! # Find your Why
//! ikigai why
//!
//! # Build an Ikigai from a saved Why profile
//! ikigai ikigai --from why_1712345678_ab12cd34
//!
//! # Pick up where you left off
//! ikigai resume
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::uninlined_format_args)]

pub mod ai;
pub mod core;
pub mod enforce;
pub mod extract;
pub mod session;
pub mod store;

#[cfg(feature = "ai")]
pub use ai::{ClaudeProvider, OllamaProvider};
pub use ai::{AIManager, ChatMessage, ChatProvider, CompletionRequest, LlmAnalyst};

pub use core::{Config, IkigaiProfile, SessionError, StoreError, WhyProfile};
pub use session::{
    CancelHandle, Collaborators, DecisionHelperState, IkigaiPhase, IkigaiState, Orchestrator,
    Outcome, SessionMachine, SessionSnapshot, WhyFinderState,
};
pub use store::{JsonFileStore, MemoryStore, ProfileStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "ikigai";
