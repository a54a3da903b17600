//! Intake service: the state machine plus persistence
//!
//! Every mutating call follows the same shape: take the session's lock,
//! load it, apply one state machine operation, then save the session and
//! its new transcript entries in a single transaction. A rejected operation
//! saves nothing, so the stored session is always one the machine produced.
//!
//! Calls for different sessions run independently; calls for the same
//! session are serialized. The per-session locks guard no data, so a lock
//! poisoned by a panic is taken over by the next caller.

use chrono::Utc;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use crate::db::{Database, SessionFilter, SessionSummary};
use crate::error::{Error, Result};
use crate::generate::{SiteDeployer, SiteGenerator};
use crate::types::{
    BusinessInfo, ConversationMessage, FailureKind, GeneratedSiteConfig, IntakeSession,
    IntakeStep, SessionStatus,
};

use super::machine::RecordedTurn;
use super::progress::SessionSnapshot;
use super::prompts::{PromptProvider, ScriptedPrompts};

/// Side effects collected while applying an operation, saved with the session
#[derive(Default)]
struct Effects {
    messages: Vec<ConversationMessage>,
    business: Option<BusinessInfo>,
}

/// Session-scoped entry point for the intake flow
pub struct IntakeService {
    db: Database,
    prompts: Box<dyn PromptProvider>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IntakeService {
    /// Create a service using the built-in question script
    pub fn new(db: Database) -> Self {
        Self::with_prompts(db, Box::new(ScriptedPrompts))
    }

    pub fn with_prompts(db: Database, prompts: Box<dyn PromptProvider>) -> Self {
        Self {
            db,
            prompts,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying database
    pub fn database(&self) -> &Database {
        &self.db
    }

    // ============================================
    // Conversation
    // ============================================

    /// Start a new session at the greeting step
    pub fn create_session(&self) -> Result<IntakeSession> {
        let session = IntakeSession::new();
        self.db.save_session(&session, &[], None)?;
        tracing::info!(session_id = %session.id, "Created intake session");
        Ok(session)
    }

    /// The assistant prompt for the session's current step
    pub fn next_prompt(&self, id: &str) -> Result<String> {
        let session = self.get_session(id)?;
        Ok(self.prompts.prompt_for(session.current_step, &session))
    }

    /// Record an answer to `question` for `step`.
    ///
    /// Fails with an out-of-sequence error if `step` is not the session's
    /// current step; nothing is stored in that case.
    pub fn record_response(
        &self,
        id: &str,
        step: IntakeStep,
        question: &str,
        answer: &str,
    ) -> Result<RecordedTurn> {
        self.mutate(id, |session, effects| {
            let turn = session.record_response(step, question, answer)?;
            effects.messages.extend(turn.messages.iter().cloned());
            tracing::info!(
                session_id = %session.id,
                step = %step,
                next_step = %turn.next_step,
                "Recorded response"
            );
            Ok(turn)
        })
    }

    /// Answer the current step, using the provider's prompt as the question
    pub fn send(&self, id: &str, answer: &str) -> Result<RecordedTurn> {
        self.mutate(id, |session, effects| {
            let step = session.current_step;
            let question = self.prompts.prompt_for(step, session);
            let turn = session.record_response(step, question, answer)?;
            effects.messages.extend(turn.messages.iter().cloned());
            tracing::info!(
                session_id = %session.id,
                step = %step,
                next_step = %turn.next_step,
                "Recorded response"
            );
            Ok(turn)
        })
    }

    /// Leave the review step; returns the step the session moved to
    pub fn advance_phase(&self, id: &str) -> Result<IntakeStep> {
        self.mutate(id, |session, _| {
            let step = session.advance_phase()?;
            tracing::info!(session_id = %session.id, step = %step, "Advanced phase");
            Ok(step)
        })
    }

    /// Finish the conversation and move to `generating`
    pub fn complete_intake(&self, id: &str) -> Result<IntakeSession> {
        self.mutate(id, |session, _| {
            session.complete_intake()?;
            tracing::info!(session_id = %session.id, "Intake complete, awaiting generation");
            Ok(session.clone())
        })
    }

    // ============================================
    // Generation and deployment
    // ============================================

    /// Attach a site produced elsewhere and materialize the business record
    pub fn mark_generated(&self, id: &str, config: GeneratedSiteConfig) -> Result<IntakeSession> {
        self.mutate(id, |session, effects| {
            session.mark_generated(config)?;
            attach_business(session, effects);
            tracing::info!(session_id = %session.id, "Site generated");
            Ok(session.clone())
        })
    }

    /// Run `generator` for a session in `generating`.
    ///
    /// A generator failure moves the session to `error` (kind `generation`)
    /// and is returned as [`Error::GenerationFailure`].
    pub fn generate(&self, id: &str, generator: &dyn SiteGenerator) -> Result<IntakeSession> {
        self.mutate(id, |session, effects| {
            session.ensure_generating()?;

            tracing::info!(
                session_id = %session.id,
                generator = generator.name(),
                "Generating site"
            );

            match run_collaborator(|| generator.generate(session), Error::GenerationFailure) {
                Ok(site) => {
                    session.mark_generated(site)?;
                    attach_business(session, effects);
                    tracing::info!(
                        session_id = %session.id,
                        business_id = session.business_id.as_deref().unwrap_or_default(),
                        "Site generated"
                    );
                    Ok(Ok(session.clone()))
                }
                Err(err) => {
                    let cause = failure_cause(err);
                    tracing::warn!(session_id = %session.id, error = %cause, "Site generation failed");
                    session.mark_error(FailureKind::Generation, cause.clone())?;
                    Ok(Err(Error::GenerationFailure(cause)))
                }
            }
        })?
    }

    /// Record an externally obtained deployment URL
    pub fn mark_deployed(&self, id: &str, url: &str) -> Result<IntakeSession> {
        self.mutate(id, |session, _| {
            session.mark_deployed(url)?;
            tracing::info!(session_id = %session.id, url, "Site deployed");
            Ok(session.clone())
        })
    }

    /// Run `deployer` for a session with a generated site.
    ///
    /// A deployer failure moves the session to `error` (kind `deployment`)
    /// and is returned as [`Error::DeploymentFailure`].
    pub fn deploy(&self, id: &str, deployer: &dyn SiteDeployer) -> Result<IntakeSession> {
        self.mutate(id, |session, _| {
            session.ensure_deployable()?;
            let site = session
                .generated_site
                .clone()
                .ok_or_else(|| Error::DeploymentFailure("no generated site".to_string()))?;

            tracing::info!(
                session_id = %session.id,
                deployer = deployer.name(),
                "Deploying site"
            );

            let deployed = run_collaborator(
                || deployer.deploy(session, &site),
                Error::DeploymentFailure,
            );
            let result = deployed.and_then(|url| {
                if url.trim().is_empty() {
                    Err(Error::DeploymentFailure(
                        "deployer returned an empty URL".to_string(),
                    ))
                } else {
                    Ok(url)
                }
            });

            match result {
                Ok(url) => {
                    session.mark_deployed(url.as_str())?;
                    tracing::info!(session_id = %session.id, url = %url, "Site deployed");
                    Ok(Ok(session.clone()))
                }
                Err(err) => {
                    let cause = failure_cause(err);
                    tracing::warn!(session_id = %session.id, error = %cause, "Deployment failed");
                    session.mark_error(FailureKind::Deployment, cause.clone())?;
                    Ok(Err(Error::DeploymentFailure(cause)))
                }
            }
        })?
    }

    // ============================================
    // Failure handling
    // ============================================

    /// Move a session into `error`
    pub fn mark_error(&self, id: &str, kind: FailureKind, cause: &str) -> Result<IntakeSession> {
        self.mutate(id, |session, _| {
            session.mark_error(kind, cause)?;
            tracing::warn!(session_id = %session.id, kind = kind.as_str(), cause, "Session failed");
            Ok(session.clone())
        })
    }

    /// Return a failed session to the status it held before the failure
    pub fn retry(&self, id: &str) -> Result<SessionStatus> {
        self.mutate(id, |session, _| {
            let status = session.retry()?;
            tracing::info!(session_id = %session.id, status = %status, "Retrying session");
            Ok(status)
        })
    }

    /// Give up on a failed session
    pub fn abandon(&self, id: &str) -> Result<IntakeSession> {
        self.mutate(id, |session, _| {
            session.abandon()?;
            tracing::info!(session_id = %session.id, "Abandoned session");
            Ok(session.clone())
        })
    }

    /// Fail sessions that have been `generating` for longer than `max_age`.
    ///
    /// Returns the ids of the sessions that were moved to `error`.
    pub fn expire_stalled(&self, max_age: chrono::Duration) -> Result<Vec<String>> {
        let cutoff = Utc::now() - max_age;
        let candidates = self.db.list_sessions(&SessionFilter {
            status: Some(SessionStatus::Generating),
            ..Default::default()
        })?;

        let mut expired = Vec::new();
        for summary in candidates.into_iter().filter(|s| s.updated_at < cutoff) {
            // Re-checked under the lock: the session may have moved on since listing
            let changed = self.mutate(&summary.id, |session, _| {
                if session.status != SessionStatus::Generating || session.updated_at >= cutoff {
                    return Ok(false);
                }
                session.mark_error(
                    FailureKind::Stalled,
                    format!(
                        "site generation did not finish within {} minutes",
                        max_age.num_minutes()
                    ),
                )?;
                Ok(true)
            })?;

            if changed {
                tracing::warn!(session_id = %summary.id, "Expired stalled generation");
                expired.push(summary.id);
            }
        }

        Ok(expired)
    }

    // ============================================
    // Queries
    // ============================================

    /// Load a session
    pub fn get_session(&self, id: &str) -> Result<IntakeSession> {
        self.db
            .get_session(id)?
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))
    }

    /// List sessions, most recently updated first
    pub fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<SessionSummary>> {
        self.db.list_sessions(filter)
    }

    /// The session's transcript in recorded order
    pub fn transcript(&self, id: &str) -> Result<Vec<ConversationMessage>> {
        // Distinguish an unknown session from an empty transcript
        self.get_session(id)?;
        self.db.get_transcript(id)
    }

    /// Read-only view for the chat front-end
    pub fn snapshot(&self, id: &str) -> Result<SessionSnapshot> {
        let session = self.get_session(id)?;
        let transcript = self.db.get_transcript(id)?;
        Ok(SessionSnapshot::build(&session, &transcript))
    }

    /// The business materialized from a session, once its site is generated
    pub fn get_business(&self, id: &str) -> Result<Option<BusinessInfo>> {
        let session = self.get_session(id)?;
        match session.business_id {
            Some(business_id) => self.db.get_business(&business_id),
            None => Ok(None),
        }
    }

    // ============================================
    // Serialization
    // ============================================

    fn mutate<T>(
        &self,
        id: &str,
        apply: impl FnOnce(&mut IntakeSession, &mut Effects) -> Result<T>,
    ) -> Result<T> {
        let entry = self.session_lock(id);
        let _guard = entry.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.load_apply_save(id, apply)
    }

    fn load_apply_save<T>(
        &self,
        id: &str,
        apply: impl FnOnce(&mut IntakeSession, &mut Effects) -> Result<T>,
    ) -> Result<T> {
        let mut session = self.get_session(id)?;
        let mut effects = Effects::default();

        let value = apply(&mut session, &mut effects)?;

        self.db
            .save_session(&session, &effects.messages, effects.business.as_ref())?;
        Ok(value)
    }

    fn session_lock(&self, id: &str) -> SessionLock<'_> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = locks.entry(id.to_string()).or_default().clone();
        SessionLock {
            locks: &self.locks,
            id: id.to_string(),
            lock,
        }
    }
}

/// A session's lock, removed from the map when the last holder drops it
struct SessionLock<'a> {
    locks: &'a Mutex<HashMap<String, Arc<Mutex<()>>>>,
    id: String,
    lock: Arc<Mutex<()>>,
}

impl Drop for SessionLock<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map plus ours
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.id);
        }
    }
}

/// Run a collaborator, reporting a panic as a failure built by `failure`
fn run_collaborator<T>(
    call: impl FnOnce() -> Result<T>,
    failure: fn(String) -> Error,
) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown cause".to_string());
        Err(failure(format!("collaborator panicked: {}", detail)))
    })
}

/// Build the business record and link it to the session
fn attach_business(session: &mut IntakeSession, effects: &mut Effects) {
    let Some(mut business) = BusinessInfo::from_intake(session) else {
        tracing::warn!(session_id = %session.id, "Not enough answers to build a business record");
        return;
    };

    match &session.business_id {
        Some(existing) => business.id = existing.clone(),
        None => session.business_id = Some(business.id.clone()),
    }
    effects.business = Some(business);
}

fn failure_cause(err: Error) -> String {
    match err {
        Error::GenerationFailure(cause) | Error::DeploymentFailure(cause) => cause,
        other => other.to_string(),
    }
}
