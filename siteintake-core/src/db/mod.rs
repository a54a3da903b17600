//! Database layer for siteintake
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Repository pattern for queries
//! - Atomic saves of a session together with its new transcript entries

pub mod repo;
pub mod schema;

pub use repo::{Database, SessionFilter, SessionSummary};
