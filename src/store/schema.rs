//! SQLite DDL for the orchestration core's persistent store.
//!
//! All `CREATE TABLE` statements live here so they are reviewable and
//! testable in isolation. `faces`, `summaries`, `person_memories`, and
//! `todos` are the wire contract (§6); columns beyond the contract (e.g.
//! `socials`) are included because the contract names them even where the
//! core never populates them.

use rusqlite::Connection;

pub(crate) const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS faces (
    person_id TEXT PRIMARY KEY,
    embedding BLOB NOT NULL,
    count     INTEGER NOT NULL DEFAULT 1,
    name      TEXT,
    recap     TEXT,
    socials   TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS summaries (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    person_id  TEXT NOT NULL REFERENCES faces(person_id),
    text       TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_summaries_person ON summaries(person_id, created_at);

CREATE TABLE IF NOT EXISTS person_memories (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    person_id       TEXT NOT NULL,
    text            TEXT NOT NULL,
    context         TEXT,
    conversation_id TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_person ON person_memories(person_id);

CREATE TABLE IF NOT EXISTS todos (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    description     TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'open',
    person_id       TEXT,
    conversation_id TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    completed_at    TEXT
);

CREATE INDEX IF NOT EXISTS idx_todos_conversation ON todos(conversation_id);
"#;

/// Apply the full schema to an open connection. Safe to call repeatedly.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}
