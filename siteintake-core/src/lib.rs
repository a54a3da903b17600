//! # siteintake-core
//!
//! Core library for siteintake: a conversational intake that collects what
//! a small business needs for its website, then generates and deploys it.
//!
//! This library provides:
//! - Domain types for intake sessions, responses, transcripts and sites
//! - The intake state machine and the phase tracker view over it
//! - Site generation and deployment collaborators
//! - Database storage layer with SQLite
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Lifecycle
//!
//! ```text
//! in-progress ──complete_intake──▶ generating ──mark_generated──▶ completed ──mark_deployed──▶ deployed
//!      │                               │                              │
//!      └──────────────mark_error───────┴──────────────────────────────┴──▶ error ──retry──▶ (previous)
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use siteintake_core::{Config, Database, IntakeService};
//!
//! let config = Config::load().expect("failed to load config");
//!
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let service = IntakeService::new(db);
//! let session = service.create_session().expect("failed to create session");
//! println!("{}", service.next_prompt(&session.id).unwrap());
//! # let _ = config;
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::{Database, SessionFilter, SessionSummary};
pub use error::{Error, Result};
pub use generate::{
    LocalDeployer, RemoteSiteService, SiteDeployer, SiteGenerator, TemplateSiteGenerator,
};
pub use intake::{
    IntakeService, PromptProvider, RecordedTurn, ScriptedPrompts, SessionSnapshot, TrackerPhase,
    TransitionError,
};
pub use types::*;

// Public modules
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod generate;
pub mod intake;
pub mod logging;
pub mod types;
