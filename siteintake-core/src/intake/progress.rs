//! Phase tracker view of an intake session
//!
//! The chat front-end shows six coarse phases instead of the nine intake
//! steps. [`TrackerPhase::for_step`] is the single mapping between the two;
//! everything in this module is derived from an [`IntakeSession`] and never
//! mutates it.
//!
//! | Step(s) | Phase |
//! |---------|-------|
//! | greeting, business-name | discovery |
//! | industry | audit |
//! | services | features |
//! | branding | design |
//! | content | content |
//! | review, generating, complete | close |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{
    ConversationMessage, IntakeSession, IntakeStep, MessageRole, SessionStatus,
};

/// Phase ids shown by the phase tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerPhase {
    Discovery,
    Audit,
    Features,
    Design,
    Content,
    Close,
}

impl TrackerPhase {
    pub const ALL: [TrackerPhase; 6] = [
        TrackerPhase::Discovery,
        TrackerPhase::Audit,
        TrackerPhase::Features,
        TrackerPhase::Design,
        TrackerPhase::Content,
        TrackerPhase::Close,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerPhase::Discovery => "discovery",
            TrackerPhase::Audit => "audit",
            TrackerPhase::Features => "features",
            TrackerPhase::Design => "design",
            TrackerPhase::Content => "content",
            TrackerPhase::Close => "close",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrackerPhase::Discovery => "Discovery",
            TrackerPhase::Audit => "Audit",
            TrackerPhase::Features => "Features",
            TrackerPhase::Design => "Design",
            TrackerPhase::Content => "Content",
            TrackerPhase::Close => "Launch",
        }
    }

    /// The phase a step belongs to
    pub fn for_step(step: IntakeStep) -> TrackerPhase {
        match step {
            IntakeStep::Greeting | IntakeStep::BusinessName => TrackerPhase::Discovery,
            IntakeStep::Industry => TrackerPhase::Audit,
            IntakeStep::Services => TrackerPhase::Features,
            IntakeStep::Branding => TrackerPhase::Design,
            IntakeStep::Content => TrackerPhase::Content,
            IntakeStep::Review | IntakeStep::Generating | IntakeStep::Complete => {
                TrackerPhase::Close
            }
        }
    }

    /// Steps mapped to this phase, in order
    pub fn steps(&self) -> Vec<IntakeStep> {
        IntakeStep::ALL
            .into_iter()
            .filter(|step| Self::for_step(*step) == *self)
            .collect()
    }

    fn last_step(&self) -> IntakeStep {
        match self {
            TrackerPhase::Discovery => IntakeStep::BusinessName,
            TrackerPhase::Audit => IntakeStep::Industry,
            TrackerPhase::Features => IntakeStep::Services,
            TrackerPhase::Design => IntakeStep::Branding,
            TrackerPhase::Content => IntakeStep::Content,
            TrackerPhase::Close => IntakeStep::Complete,
        }
    }
}

impl std::fmt::Display for TrackerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Pending,
    Active,
    Completed,
}

/// Progress of one tracker phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseProgress {
    pub status: PhaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Compute progress for every tracker phase.
///
/// Close is the only phase that holds the final step, so it completes when
/// the session reaches `complete`; every other phase completes as soon as
/// the cursor moves past its last step.
pub fn phase_progress(session: &IntakeSession) -> BTreeMap<TrackerPhase, PhaseProgress> {
    let current = session.current_step;

    TrackerPhase::ALL
        .into_iter()
        .map(|phase| {
            let last = phase.last_step();
            let completed = if phase == TrackerPhase::Close {
                current == IntakeStep::Complete
            } else {
                current > last
            };

            let status = if completed {
                PhaseStatus::Completed
            } else if TrackerPhase::for_step(current) == phase {
                PhaseStatus::Active
            } else {
                PhaseStatus::Pending
            };

            let started_at = session
                .step_history
                .iter()
                .find(|entry| TrackerPhase::for_step(entry.step) == phase)
                .map(|entry| entry.entered_at);

            let completed_at = if !completed {
                None
            } else if phase == TrackerPhase::Close {
                session.entered_at(IntakeStep::Complete)
            } else {
                session
                    .step_history
                    .iter()
                    .find(|entry| entry.step > last)
                    .map(|entry| entry.entered_at)
            };

            (
                phase,
                PhaseProgress {
                    status,
                    started_at,
                    completed_at,
                },
            )
        })
        .collect()
}

/// A transcript entry as rendered by the message list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub phase: TrackerPhase,
    pub timestamp: DateTime<Utc>,
}

impl From<&ConversationMessage> for MessageView {
    fn from(message: &ConversationMessage) -> Self {
        Self {
            id: message.id.clone(),
            role: message.role,
            content: message.content.clone(),
            phase: TrackerPhase::for_step(message.step),
            timestamp: message.timestamp,
        }
    }
}

/// Read-only snapshot handed to the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub status: SessionStatus,
    pub current_step: IntakeStep,
    pub current_phase: TrackerPhase,
    pub messages: Vec<MessageView>,
    pub phase_progress: BTreeMap<TrackerPhase, PhaseProgress>,
    /// Cause of the failure while the session is in `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the user can retry after a failure
    pub can_retry: bool,
}

impl SessionSnapshot {
    pub fn build(session: &IntakeSession, transcript: &[ConversationMessage]) -> Self {
        let can_retry = session.status == SessionStatus::Error
            && session.last_error.as_ref().is_some_and(|e| !e.abandoned);

        Self {
            session_id: session.id.clone(),
            status: session.status,
            current_step: session.current_step,
            current_phase: TrackerPhase::for_step(session.current_step),
            messages: transcript.iter().map(MessageView::from).collect(),
            phase_progress: phase_progress(session),
            error: session.last_error.as_ref().map(|e| e.cause.clone()),
            can_retry,
        }
    }
}
