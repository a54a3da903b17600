//! Error types for siteintake-core

use thiserror::Error;

use crate::intake::TransitionError;

/// Main error type for the siteintake-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Session not found
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Rejected state machine operation (out of sequence or invalid transition)
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Site generation collaborator failed
    #[error("site generation failed: {0}")]
    GenerationFailure(String),

    /// Deployment collaborator failed
    #[error("deployment failed: {0}")]
    DeploymentFailure(String),
}

impl Error {
    /// Returns the transition error if this is a rejected state machine operation
    pub fn as_transition(&self) -> Option<&TransitionError> {
        match self {
            Error::Transition(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the caller can recover by re-prompting or resyncing its view.
    ///
    /// Collaborator failures are not recoverable this way: they move the
    /// session into the `error` status and need an explicit retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Transition(_))
    }
}

/// Result type alias for siteintake-core
pub type Result<T> = std::result::Result<T, Error>;
