//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: Intake sessions and their answers
    r#"
    CREATE TABLE IF NOT EXISTS businesses (
        id               TEXT PRIMARY KEY,
        name             TEXT NOT NULL,
        industry         TEXT NOT NULL,
        description      TEXT NOT NULL,
        address          JSON,
        contact          JSON,
        hours            JSON,
        social_links     JSON NOT NULL DEFAULT '[]',
        created_at       DATETIME NOT NULL,
        updated_at       DATETIME NOT NULL
    );

    CREATE TABLE IF NOT EXISTS intake_sessions (
        id               TEXT PRIMARY KEY,
        business_id      TEXT REFERENCES businesses(id),
        status           TEXT NOT NULL,
        current_step     TEXT NOT NULL,
        step_history     JSON NOT NULL,
        generated_site   JSON,
        last_error       JSON,
        created_at       DATETIME NOT NULL,
        updated_at       DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_intake_sessions_status ON intake_sessions(status);
    CREATE INDEX IF NOT EXISTS idx_intake_sessions_updated ON intake_sessions(updated_at);

    -- Append-only: a response is never rewritten once recorded
    CREATE TABLE IF NOT EXISTS intake_responses (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id       TEXT NOT NULL REFERENCES intake_sessions(id),
        seq              INTEGER NOT NULL,
        step             TEXT NOT NULL,
        question         TEXT NOT NULL,
        answer           TEXT NOT NULL,
        answered_at      DATETIME NOT NULL,

        UNIQUE(session_id, seq)
    );
    "#,
    // Version 2: Conversation transcript
    r#"
    CREATE TABLE IF NOT EXISTS conversation_messages (
        id               TEXT PRIMARY KEY,
        session_id       TEXT NOT NULL REFERENCES intake_sessions(id),
        seq              INTEGER NOT NULL,
        role             TEXT NOT NULL,
        content          TEXT NOT NULL,
        step             TEXT NOT NULL,
        created_at       DATETIME NOT NULL,
        metadata         JSON,

        UNIQUE(session_id, seq)
    );

    CREATE INDEX IF NOT EXISTS idx_conversation_messages_session
        ON conversation_messages(session_id, seq);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables = [
            "businesses",
            "intake_sessions",
            "intake_responses",
            "conversation_messages",
        ];

        for table in tables {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_responses_are_unique_per_seq() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO intake_sessions (id, status, current_step, step_history, created_at, updated_at)
             VALUES ('s1', 'in-progress', 'greeting', '[]', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        let insert = "INSERT INTO intake_responses (session_id, seq, step, question, answer, answered_at)
                      VALUES ('s1', 0, 'greeting', 'Hi', 'Hello', '2026-01-01T00:00:00Z')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());

        // Unknown session is rejected by the foreign key
        assert!(conn
            .execute(
                "INSERT INTO intake_responses (session_id, seq, step, question, answer, answered_at)
                 VALUES ('missing', 0, 'greeting', 'Hi', 'Hello', '2026-01-01T00:00:00Z')",
                [],
            )
            .is_err());
    }
}
