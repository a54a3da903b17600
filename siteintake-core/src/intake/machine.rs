//! Intake session state machine
//!
//! Every operation validates against the current status and step before
//! touching the session. A rejected operation returns a [`TransitionError`]
//! and leaves the session exactly as it was.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::types::{
    ConversationMessage, FailureKind, GeneratedSiteConfig, IntakeResponse, IntakeSession,
    IntakeStep, MessageRole, SessionError, SessionStatus, StepEntry,
};

/// Error type for rejected state machine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// An answer arrived for a step other than the current one
    #[error("out of sequence: session is at step {expected}, got an answer for {actual}")]
    OutOfSequence {
        expected: IntakeStep,
        actual: IntakeStep,
    },

    /// The operation is not allowed from the session's current state
    #[error("cannot {action} while session is {status} at step {step}: {reason}")]
    InvalidTransition {
        action: &'static str,
        status: SessionStatus,
        step: IntakeStep,
        reason: String,
    },
}

/// The transcript side effect of a recorded answer.
#[derive(Debug, Clone)]
pub struct RecordedTurn {
    /// The response appended to the session
    pub response: IntakeResponse,
    /// Assistant prompt followed by the user's answer
    pub messages: [ConversationMessage; 2],
    /// Step the session moved to (unchanged when answering during review)
    pub next_step: IntakeStep,
}

impl Default for IntakeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl IntakeSession {
    /// Create a new session at the greeting step.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            business_id: None,
            status: SessionStatus::InProgress,
            current_step: IntakeStep::Greeting,
            responses: Vec::new(),
            step_history: vec![StepEntry {
                step: IntakeStep::Greeting,
                entered_at: now,
            }],
            generated_site: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record an answer for `step` and advance to the next step.
    ///
    /// Answers given during review are appended without moving the cursor;
    /// review is left through [`Self::complete_intake`].
    pub fn record_response(
        &mut self,
        step: IntakeStep,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) -> Result<RecordedTurn, TransitionError> {
        self.ensure_status("record a response", SessionStatus::InProgress)?;

        if step != self.current_step {
            return Err(TransitionError::OutOfSequence {
                expected: self.current_step,
                actual: step,
            });
        }

        let answer = answer.into();
        if answer.trim().is_empty() {
            return Err(self.invalid("record a response", "answer is empty"));
        }

        let question = question.into();
        let now = Utc::now();
        let response = IntakeResponse {
            step,
            question: question.clone(),
            answer: answer.clone(),
            timestamp: now,
        };
        self.responses.push(response.clone());

        if step.requires_answer() {
            if let Some(next) = step.next() {
                self.enter_step(next, now);
            }
        }
        self.updated_at = now;

        let messages = [
            ConversationMessage::new(&self.id, MessageRole::Assistant, question, step, now),
            ConversationMessage::new(&self.id, MessageRole::User, answer, step, now),
        ];

        Ok(RecordedTurn {
            response,
            messages,
            next_step: self.current_step,
        })
    }

    /// Move past a step that takes no answer.
    ///
    /// Only review qualifies: advancing from it is the same transition as
    /// [`Self::complete_intake`]. Returns the step the session moved to.
    pub fn advance_phase(&mut self) -> Result<IntakeStep, TransitionError> {
        self.ensure_status("advance the phase", SessionStatus::InProgress)?;

        if self.current_step != IntakeStep::Review {
            return Err(self.invalid(
                "advance the phase",
                format!("step {} is waiting for an answer", self.current_step),
            ));
        }

        self.complete_intake()?;
        Ok(self.current_step)
    }

    /// Finish the conversation and request site generation.
    pub fn complete_intake(&mut self) -> Result<(), TransitionError> {
        const ACTION: &str = "complete the intake";
        self.ensure_status(ACTION, SessionStatus::InProgress)?;

        if self.current_step != IntakeStep::Review {
            return Err(self.invalid(ACTION, "intake is not at the review step"));
        }

        let missing = self.missing_steps();
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|s| s.as_str()).collect();
            return Err(self.invalid(ACTION, format!("missing answers for {}", names.join(", "))));
        }

        let now = Utc::now();
        self.status = SessionStatus::Generating;
        self.enter_step(IntakeStep::Generating, now);
        self.updated_at = now;
        Ok(())
    }

    /// Check that the session is waiting for a generated site.
    pub fn ensure_generating(&self) -> Result<(), TransitionError> {
        self.ensure_status("generate the site", SessionStatus::Generating)
    }

    /// Attach the generated site and mark the intake completed.
    pub fn mark_generated(&mut self, config: GeneratedSiteConfig) -> Result<(), TransitionError> {
        self.ensure_status("mark the site generated", SessionStatus::Generating)?;

        let now = Utc::now();
        self.generated_site = Some(config);
        self.status = SessionStatus::Completed;
        self.enter_step(IntakeStep::Complete, now);
        self.updated_at = now;
        Ok(())
    }

    /// Check that the session has a generated site that can be deployed.
    pub fn ensure_deployable(&self) -> Result<(), TransitionError> {
        const ACTION: &str = "deploy the site";
        if self.generated_site.is_none() {
            return Err(self.invalid(ACTION, "no site has been generated"));
        }
        self.ensure_status(ACTION, SessionStatus::Completed)
    }

    /// Record the deployment URL and mark the session deployed.
    pub fn mark_deployed(&mut self, url: impl Into<String>) -> Result<(), TransitionError> {
        self.ensure_deployable()?;

        let url = url.into();
        if url.trim().is_empty() {
            return Err(self.invalid("deploy the site", "deployment URL is empty"));
        }

        if let Some(site) = self.generated_site.as_mut() {
            site.deployment_url = Some(url);
        }
        self.status = SessionStatus::Deployed;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Move a non-terminal session into the `error` status.
    ///
    /// Responses and the generated site are kept untouched.
    pub fn mark_error(
        &mut self,
        kind: FailureKind,
        cause: impl Into<String>,
    ) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(self.invalid("mark the session failed", "session is already terminal"));
        }

        let now = Utc::now();
        self.last_error = Some(SessionError {
            kind,
            cause: cause.into(),
            previous_status: self.status,
            occurred_at: now,
            abandoned: false,
        });
        self.status = SessionStatus::Error;
        self.updated_at = now;
        Ok(())
    }

    /// Leave the `error` status, returning to the status held before it.
    pub fn retry(&mut self) -> Result<SessionStatus, TransitionError> {
        const ACTION: &str = "retry";
        self.ensure_status(ACTION, SessionStatus::Error)?;

        let previous = match &self.last_error {
            Some(err) if err.abandoned => {
                return Err(self.invalid(ACTION, "session was abandoned"));
            }
            Some(err) => err.previous_status,
            None => return Err(self.invalid(ACTION, "no error is recorded")),
        };

        self.status = previous;
        self.last_error = None;
        self.updated_at = Utc::now();
        Ok(previous)
    }

    /// Give up on a failed session. It stays inspectable but can no longer
    /// be retried.
    pub fn abandon(&mut self) -> Result<(), TransitionError> {
        const ACTION: &str = "abandon";
        self.ensure_status(ACTION, SessionStatus::Error)?;

        match &self.last_error {
            Some(err) if err.abandoned => {
                return Err(self.invalid(ACTION, "session is already abandoned"));
            }
            Some(_) => {}
            None => return Err(self.invalid(ACTION, "no error is recorded")),
        }

        if let Some(err) = self.last_error.as_mut() {
            err.abandoned = true;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Required steps that have no response yet
    pub fn missing_steps(&self) -> Vec<IntakeStep> {
        IntakeStep::REQUIRED
            .into_iter()
            .filter(|step| !self.responses.iter().any(|r| r.step == *step))
            .collect()
    }

    /// The latest answer recorded for `step`
    pub fn answer_for(&self, step: IntakeStep) -> Option<&str> {
        self.responses
            .iter()
            .rev()
            .find(|r| r.step == step)
            .map(|r| r.answer.as_str())
    }

    /// Whether an answer can be recorded right now
    pub fn accepts_answers(&self) -> bool {
        self.status == SessionStatus::InProgress
    }

    /// When the session entered `step`, if it has
    pub fn entered_at(&self, step: IntakeStep) -> Option<DateTime<Utc>> {
        self.step_history
            .iter()
            .find(|entry| entry.step == step)
            .map(|entry| entry.entered_at)
    }

    /// Stable digest of the session id and its responses.
    ///
    /// Identical intakes produce identical fingerprints, so it serves as the
    /// idempotency key for generation requests.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_bytes());
        for response in &self.responses {
            hasher.update([0u8]);
            hasher.update(response.step.as_str().as_bytes());
            hasher.update([0u8]);
            hasher.update(response.answer.as_bytes());
            hasher.update([0u8]);
            hasher.update(response.timestamp.to_rfc3339().as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    fn enter_step(&mut self, step: IntakeStep, at: DateTime<Utc>) {
        self.current_step = step;
        self.step_history.push(StepEntry {
            step,
            entered_at: at,
        });
    }

    fn ensure_status(
        &self,
        action: &'static str,
        required: SessionStatus,
    ) -> Result<(), TransitionError> {
        if self.status == required {
            Ok(())
        } else {
            Err(self.invalid(action, format!("requires status {}", required)))
        }
    }

    fn invalid(&self, action: &'static str, reason: impl Into<String>) -> TransitionError {
        TransitionError::InvalidTransition {
            action,
            status: self.status,
            step: self.current_step,
            reason: reason.into(),
        }
    }
}
