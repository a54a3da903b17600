//! Database repository layer
//!
//! Provides query and insert operations for intake sessions, their
//! responses, the conversation transcript and materialized businesses.

use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Session summary for list views.
///
/// Contains pre-computed counts to avoid loading every response when
/// rendering session lists.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// Session ID
    pub id: String,
    pub status: SessionStatus,
    pub current_step: IntakeStep,
    /// Business name, from the business record or the latest name answer
    pub business_name: Option<String>,
    /// Number of recorded responses
    pub response_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database handle with connection pooling (single connection for now)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    // ============================================
    // Session operations
    // ============================================

    /// Persist a session in one transaction.
    ///
    /// Writes `business` first (if given), then the session row, then any
    /// responses not yet stored and the new transcript `messages`. Either
    /// everything lands or nothing does.
    pub fn save_session(
        &self,
        session: &IntakeSession,
        messages: &[ConversationMessage],
        business: Option<&BusinessInfo>,
    ) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        if let Some(business) = business {
            Self::write_business(&tx, business)?;
        }
        Self::write_session(&tx, session)?;
        Self::append_responses(&tx, session)?;
        Self::append_messages(&tx, &session.id, messages)?;

        tx.commit()?;
        Ok(())
    }

    fn write_session(conn: &Connection, session: &IntakeSession) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO intake_sessions (id, business_id, status, current_step, step_history,
                                         generated_site, last_error, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                business_id = COALESCE(excluded.business_id, intake_sessions.business_id),
                status = excluded.status,
                current_step = excluded.current_step,
                step_history = excluded.step_history,
                generated_site = excluded.generated_site,
                last_error = excluded.last_error,
                updated_at = excluded.updated_at
            "#,
            params![
                session.id,
                session.business_id,
                session.status.as_str(),
                session.current_step.as_str(),
                serde_json::to_string(&session.step_history)?,
                session
                    .generated_site
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                session
                    .last_error
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                session.created_at.to_rfc3339(),
                session.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Insert responses past the ones already stored; stored rows are never touched.
    fn append_responses(conn: &Connection, session: &IntakeSession) -> Result<()> {
        let stored: i64 = conn.query_row(
            "SELECT COUNT(*) FROM intake_responses WHERE session_id = ?",
            [&session.id],
            |r| r.get(0),
        )?;

        let mut stmt = conn.prepare(
            r#"
            INSERT INTO intake_responses (session_id, seq, step, question, answer, answered_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )?;

        for (seq, response) in session
            .responses
            .iter()
            .enumerate()
            .skip(stored as usize)
        {
            stmt.execute(params![
                session.id,
                seq as i64,
                response.step.as_str(),
                response.question,
                response.answer,
                response.timestamp.to_rfc3339(),
            ])?;
        }
        Ok(())
    }

    fn append_messages(
        conn: &Connection,
        session_id: &str,
        messages: &[ConversationMessage],
    ) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let next_seq: i64 = conn.query_row(
            "SELECT COALESCE(MAX(seq) + 1, 0) FROM conversation_messages WHERE session_id = ?",
            [session_id],
            |r| r.get(0),
        )?;

        let mut stmt = conn.prepare(
            r#"
            INSERT INTO conversation_messages (id, session_id, seq, role, content, step,
                                               created_at, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )?;

        for (offset, message) in messages.iter().enumerate() {
            stmt.execute(params![
                message.id,
                session_id,
                next_seq + offset as i64,
                message.role.as_str(),
                message.content,
                message.step.as_str(),
                message.timestamp.to_rfc3339(),
                message.metadata.as_ref().map(|m| m.to_string()),
            ])?;
        }
        Ok(())
    }

    /// Get a session by ID, with all of its responses
    pub fn get_session(&self, id: &str) -> Result<Option<IntakeSession>> {
        let conn = self.conn.lock().unwrap();
        let session = conn
            .query_row(
                "SELECT * FROM intake_sessions WHERE id = ?",
                [id],
                Self::row_to_session,
            )
            .optional()?;

        let Some(mut session) = session else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT * FROM intake_responses WHERE session_id = ? ORDER BY seq ASC",
        )?;
        session.responses = stmt
            .query_map([id], Self::row_to_response)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(session))
    }

    /// List sessions with optional filtering, most recently updated first
    pub fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<SessionSummary>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = String::from(
            r#"
            SELECT
                s.id,
                s.status,
                s.current_step,
                s.created_at,
                s.updated_at,
                COALESCE(b.name, (
                    SELECT r.answer FROM intake_responses r
                    WHERE r.session_id = s.id AND r.step = 'business-name'
                    ORDER BY r.seq DESC LIMIT 1
                )) AS business_name,
                (SELECT COUNT(*) FROM intake_responses r WHERE r.session_id = s.id) AS response_count
            FROM intake_sessions s
            LEFT JOIN businesses b ON b.id = s.business_id
            WHERE 1=1
            "#,
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];

        if let Some(status) = &filter.status {
            sql.push_str(" AND s.status = ?");
            params.push(Box::new(status.as_str().to_string()));
        }

        if let Some(since) = &filter.since {
            sql.push_str(" AND s.created_at >= ?");
            params.push(Box::new(since.to_rfc3339()));
        }

        sql.push_str(" ORDER BY s.updated_at DESC");

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let summaries = stmt
            .query_map(params_refs.as_slice(), |row| {
                Ok(SessionSummary {
                    id: row.get("id")?,
                    status: parse_column(row, "status")?,
                    current_step: parse_column(row, "current_step")?,
                    business_name: row.get("business_name")?,
                    response_count: row.get("response_count")?,
                    created_at: timestamp_column(row, "created_at")?,
                    updated_at: timestamp_column(row, "updated_at")?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(summaries)
    }

    /// Count sessions grouped by status
    pub fn count_sessions_by_status(&self) -> Result<HashMap<SessionStatus, i64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM intake_sessions GROUP BY status")?;

        let counts = stmt
            .query_map([], |row| {
                Ok((parse_column::<SessionStatus>(row, "status")?, row.get(1)?))
            })?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;

        Ok(counts)
    }

    fn row_to_session(row: &Row) -> rusqlite::Result<IntakeSession> {
        Ok(IntakeSession {
            id: row.get("id")?,
            business_id: row.get("business_id")?,
            status: parse_column(row, "status")?,
            current_step: parse_column(row, "current_step")?,
            responses: Vec::new(),
            step_history: json_column(row, "step_history")?,
            generated_site: optional_json_column(row, "generated_site")?,
            last_error: optional_json_column(row, "last_error")?,
            created_at: timestamp_column(row, "created_at")?,
            updated_at: timestamp_column(row, "updated_at")?,
        })
    }

    fn row_to_response(row: &Row) -> rusqlite::Result<IntakeResponse> {
        Ok(IntakeResponse {
            step: parse_column(row, "step")?,
            question: row.get("question")?,
            answer: row.get("answer")?,
            timestamp: timestamp_column(row, "answered_at")?,
        })
    }

    // ============================================
    // Transcript operations
    // ============================================

    /// Get the transcript for a session, in the order it was recorded
    pub fn get_transcript(&self, session_id: &str) -> Result<Vec<ConversationMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM conversation_messages WHERE session_id = ? ORDER BY seq ASC",
        )?;

        let messages = stmt
            .query_map([session_id], Self::row_to_message)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(messages)
    }

    /// Count transcript messages for a session
    pub fn count_session_messages(&self, session_id: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM conversation_messages WHERE session_id = ?",
            [session_id],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    fn row_to_message(row: &Row) -> rusqlite::Result<ConversationMessage> {
        Ok(ConversationMessage {
            id: row.get("id")?,
            session_id: row.get("session_id")?,
            role: parse_column(row, "role")?,
            content: row.get("content")?,
            step: parse_column(row, "step")?,
            timestamp: timestamp_column(row, "created_at")?,
            metadata: optional_json_column(row, "metadata")?,
        })
    }

    // ============================================
    // Business operations
    // ============================================

    fn write_business(conn: &Connection, business: &BusinessInfo) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO businesses (id, name, industry, description, address, contact, hours,
                                    social_links, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                industry = excluded.industry,
                description = excluded.description,
                address = excluded.address,
                contact = excluded.contact,
                hours = excluded.hours,
                social_links = excluded.social_links,
                updated_at = excluded.updated_at
            "#,
            params![
                business.id,
                business.name,
                business.industry,
                business.description,
                business.address.as_ref().map(serde_json::to_string).transpose()?,
                business.contact.as_ref().map(serde_json::to_string).transpose()?,
                business.hours.as_ref().map(serde_json::to_string).transpose()?,
                serde_json::to_string(&business.social_links)?,
                business.created_at.to_rfc3339(),
                business.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get a business by ID
    pub fn get_business(&self, id: &str) -> Result<Option<BusinessInfo>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM businesses WHERE id = ?", [id], |row| {
            Ok(BusinessInfo {
                id: row.get("id")?,
                name: row.get("name")?,
                industry: row.get("industry")?,
                description: row.get("description")?,
                address: optional_json_column(row, "address")?,
                contact: optional_json_column(row, "contact")?,
                hours: optional_json_column(row, "hours")?,
                social_links: json_column(row, "social_links")?,
                created_at: timestamp_column(row, "created_at")?,
                updated_at: timestamp_column(row, "updated_at")?,
            })
        })
        .optional()
        .map_err(Error::from)
    }
}

/// Filter for listing sessions
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    /// Filter by status
    pub status: Option<SessionStatus>,
    /// Filter sessions created after this time
    pub since: Option<DateTime<Utc>>,
    /// Maximum number of sessions to return
    pub limit: Option<usize>,
}

// Stored values that fail to parse surface as conversion errors rather than
// being replaced with defaults.

fn conversion_error(
    row: &Row,
    column: &str,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    let index = row.as_ref().column_index(column).unwrap_or_default();
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, err.into())
}

fn timestamp_column(row: &Row, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let value: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(row, column, e))
}

fn parse_column<T>(row: &Row, column: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let value: String = row.get(column)?;
    value.parse().map_err(|e: String| conversion_error(row, column, e))
}

fn json_column<T: DeserializeOwned>(row: &Row, column: &str) -> rusqlite::Result<T> {
    let value: String = row.get(column)?;
    serde_json::from_str(&value).map_err(|e| conversion_error(row, column, e))
}

fn optional_json_column<T: DeserializeOwned>(
    row: &Row,
    column: &str,
) -> rusqlite::Result<Option<T>> {
    let value: Option<String> = row.get(column)?;
    value
        .map(|v| serde_json::from_str(&v).map_err(|e| conversion_error(row, column, e)))
        .transpose()
}
