//! The intake conversation
//!
//! - [`machine`]: pure state machine over [`IntakeSession`](crate::types::IntakeSession)
//! - [`progress`]: phase tracker view derived from a session
//! - [`prompts`]: what the assistant asks at each step
//! - [`service`]: persistence, per-session serialization and collaborators

mod business;
pub mod machine;
pub mod progress;
pub mod prompts;
pub mod service;

pub use machine::{RecordedTurn, TransitionError};
pub use progress::{
    phase_progress, MessageView, PhaseProgress, PhaseStatus, SessionSnapshot, TrackerPhase,
};
pub use prompts::{PromptProvider, ScriptedPrompts};
pub use service::IntakeService;
