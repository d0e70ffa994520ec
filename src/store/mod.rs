//! Persistent store: a pooled SQLite connection backing the `faces`,
//! `summaries`, `person_memories`, and `todos` tables (§6).
//!
//! Embeddings are stored as raw little-endian float32 bytes; the store
//! performs no vector math — cosine comparison happens in
//! [`crate::embedding`] against the in-memory gallery cache.

mod schema;

use crate::config::StoreConfig;
use crate::error::{OrchestratorError, Result};
use crate::types::{Embedding, GalleryEntry, PersonId, Summary};
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::time::Duration;

type DbPool = Pool<SqliteConnectionManager>;

/// Handle to the persistent store. Cheap to clone (wraps a pool).
#[derive(Clone)]
pub struct Store {
    pool: DbPool,
}

impl Store {
    /// Open (creating if absent) the database at `config.db_path` and apply
    /// the schema, bounding the pool to `[min_connections, max_connections]`.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| OrchestratorError::Store(format!("creating data dir: {e}")))?;
        }
        let manager = SqliteConnectionManager::file(&config.db_path).with_init(|conn| {
            conn.execute_batch("PRAGMA busy_timeout=5000; PRAGMA foreign_keys=ON;")
        });
        let pool = Pool::builder()
            .max_size(config.max_connections.max(1))
            .min_idle(Some(config.min_connections.min(config.max_connections.max(1))))
            .connection_timeout(Duration::from_secs(10))
            .build(manager)
            .map_err(|e| OrchestratorError::Store(format!("building pool: {e}")))?;

        let conn = pool
            .get()
            .map_err(|e| OrchestratorError::Store(format!("getting connection: {e}")))?;
        schema::apply_schema(&conn)
            .map_err(|e| OrchestratorError::Store(format!("applying schema: {e}")))?;

        Ok(Self { pool })
    }

    /// Open an in-memory store, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| OrchestratorError::Store(format!("building pool: {e}")))?;
        let conn = pool
            .get()
            .map_err(|e| OrchestratorError::Store(format!("getting connection: {e}")))?;
        schema::apply_schema(&conn)
            .map_err(|e| OrchestratorError::Store(format!("applying schema: {e}")))?;
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| OrchestratorError::Store(format!("pool exhausted: {e}")))
    }

    /// Load the full gallery: one [`GalleryEntry`] per known person.
    pub fn load_gallery(&self) -> Result<Vec<GalleryEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT person_id, embedding, count FROM faces")
            .map_err(|e| OrchestratorError::Store(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                let person_id: String = row.get(0)?;
                let bytes: Vec<u8> = row.get(1)?;
                let count: u32 = row.get(2)?;
                Ok((person_id, bytes, count))
            })
            .map_err(|e| OrchestratorError::Store(e.to_string()))?;

        let mut entries = Vec::new();
        for row in rows {
            let (person_id, bytes, count) =
                row.map_err(|e| OrchestratorError::Store(e.to_string()))?;
            let embedding = Embedding::from_bytes(&bytes)?;
            entries.push(GalleryEntry {
                person_id,
                embedding,
                count,
            });
        }
        Ok(entries)
    }

    /// Insert a newly-seen person with `count = 1`.
    pub fn insert_new_face(&self, person_id: &PersonId, embedding: &Embedding) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO faces (person_id, embedding, count) VALUES (?1, ?2, 1)
             ON CONFLICT(person_id) DO UPDATE SET embedding = excluded.embedding, count = 1",
            rusqlite::params![person_id, embedding.to_bytes()],
        )
        .map_err(|e| OrchestratorError::Store(e.to_string()))?;
        Ok(())
    }

    /// Persist the final folded centroid for a departing person (the
    /// at-most-one-writer write described in §4.2/§8 property 3).
    pub fn write_final_centroid(
        &self,
        person_id: &PersonId,
        embedding: &Embedding,
        count: u32,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE faces SET embedding = ?2, count = ?3 WHERE person_id = ?1",
            rusqlite::params![person_id, embedding.to_bytes(), count],
        )
        .map_err(|e| OrchestratorError::Store(e.to_string()))?;
        Ok(())
    }

    /// Stored display name for a person, if any. `Ok(None)` covers both "no
    /// such person" and "person exists but has no stored name" — callers
    /// that need to distinguish those call [`Self::person_exists`] first.
    pub fn get_name(&self, person_id: &PersonId) -> Result<Option<String>> {
        use rusqlite::OptionalExtension;
        let conn = self.conn()?;
        conn.query_row(
            "SELECT name FROM faces WHERE person_id = ?1",
            [person_id],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()
        .map_err(|e| OrchestratorError::Store(e.to_string()))
        .map(|opt| opt.flatten())
    }

    /// Rename a person by id.
    pub fn set_name(&self, person_id: &PersonId, new_name: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE faces SET name = ?2 WHERE person_id = ?1",
                rusqlite::params![person_id, new_name],
            )
            .map_err(|e| OrchestratorError::Store(e.to_string()))?;
        Ok(changed > 0)
    }

    /// Rename a person looked up by their current stored name (the
    /// `change_name` fallback path, §6).
    pub fn set_name_by_existing_name(&self, existing_name: &str, new_name: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE faces SET name = ?2 WHERE name = ?1",
                rusqlite::params![existing_name, new_name],
            )
            .map_err(|e| OrchestratorError::Store(e.to_string()))?;
        Ok(changed > 0)
    }

    /// Whether a person with this id exists in the store at all.
    pub fn person_exists(&self, person_id: &PersonId) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM faces WHERE person_id = ?1",
                [person_id],
                |row| row.get(0),
            )
            .map_err(|e| OrchestratorError::Store(e.to_string()))?;
        Ok(count > 0)
    }

    /// The person's stored recap field.
    pub fn get_recap(&self, person_id: &PersonId) -> Result<Option<String>> {
        use rusqlite::OptionalExtension;
        let conn = self.conn()?;
        conn.query_row(
            "SELECT recap FROM faces WHERE person_id = ?1",
            [person_id],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()
        .map_err(|e| OrchestratorError::Store(e.to_string()))
        .map(|opt| opt.flatten())
    }

    /// Overwrite the person's recap field with the latest summary prose.
    pub fn set_recap(&self, person_id: &PersonId, recap: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE faces SET recap = ?2 WHERE person_id = ?1",
            rusqlite::params![person_id, recap],
        )
        .map_err(|e| OrchestratorError::Store(e.to_string()))?;
        Ok(())
    }

    /// Append-only summary insert.
    pub fn insert_summary(&self, person_id: &PersonId, text: &str, created_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO summaries (person_id, text, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![person_id, text, created_at.to_rfc3339()],
        )
        .map_err(|e| OrchestratorError::Store(e.to_string()))?;
        Ok(())
    }

    /// All summaries for a person, most-recent-first (§4.4 step 4).
    pub fn summaries_for_person(&self, person_id: &PersonId) -> Result<Vec<Summary>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT text, created_at FROM summaries WHERE person_id = ?1 ORDER BY created_at DESC")
            .map_err(|e| OrchestratorError::Store(e.to_string()))?;
        let rows = stmt
            .query_map([person_id], |row| {
                let text: String = row.get(0)?;
                let created_at: String = row.get(1)?;
                Ok((text, created_at))
            })
            .map_err(|e| OrchestratorError::Store(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            let (text, created_at) = row.map_err(|e| OrchestratorError::Store(e.to_string()))?;
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());
            out.push(Summary {
                person_id: person_id.clone(),
                text,
                created_at,
            });
        }
        Ok(out)
    }

    /// Link a new memory record to a conversation (used by agent tools).
    pub fn insert_person_memory(
        &self,
        person_id: &PersonId,
        text: &str,
        context: Option<&str>,
        conversation_id: &str,
    ) -> Result<()> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO person_memories (person_id, text, context, conversation_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            rusqlite::params![person_id, text, context, conversation_id, now],
        )
        .map_err(|e| OrchestratorError::Store(e.to_string()))?;
        Ok(())
    }

    /// Insert a todo linked to the current conversation (§8 scenario S5).
    pub fn insert_todo(
        &self,
        description: &str,
        person_id: Option<&PersonId>,
        conversation_id: &str,
    ) -> Result<i64> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO todos (description, status, person_id, conversation_id, created_at)
             VALUES (?1, 'open', ?2, ?3, ?4)",
            rusqlite::params![description, person_id, conversation_id, now],
        )
        .map_err(|e| OrchestratorError::Store(e.to_string()))?;
        Ok(conn.last_insert_rowid())
    }

    /// Count of todos linked to a conversation (used by tests).
    pub fn todo_count_for_conversation(&self, conversation_id: &str) -> Result<i64> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT COUNT(*) FROM todos WHERE conversation_id = ?1",
            [conversation_id],
            |row| row.get(0),
        )
        .map_err(|e| OrchestratorError::Store(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_load_gallery_round_trips() {
        let store = Store::open_in_memory().expect("open");
        let e = Embedding::new(vec![1.0, 0.0, 0.0]);
        store.insert_new_face(&"Unnamed_aaaaaaaa".to_owned(), &e).expect("insert");

        let gallery = store.load_gallery().expect("load");
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery[0].count, 1);
        assert_eq!(gallery[0].embedding, e);
    }

    #[test]
    fn final_centroid_write_updates_existing_row() {
        let store = Store::open_in_memory().expect("open");
        let pid = "Unnamed_bbbbbbbb".to_owned();
        store
            .insert_new_face(&pid, &Embedding::new(vec![1.0, 0.0]))
            .expect("insert");
        store
            .write_final_centroid(&pid, &Embedding::new(vec![0.5, 0.5]), 3)
            .expect("write final");

        let gallery = store.load_gallery().expect("load");
        assert_eq!(gallery[0].count, 3);
        assert_eq!(gallery[0].embedding.as_slice(), &[0.5, 0.5]);
    }

    #[test]
    fn summaries_are_returned_most_recent_first() {
        let store = Store::open_in_memory().expect("open");
        let pid = "Unnamed_cccccccc".to_owned();
        store.insert_new_face(&pid, &Embedding::new(vec![1.0])).expect("insert");

        let t0 = Utc::now();
        store.insert_summary(&pid, "first", t0).expect("insert summary");
        let t1 = t0 + chrono::Duration::seconds(5);
        store.insert_summary(&pid, "second", t1).expect("insert summary");

        let summaries = store.summaries_for_person(&pid).expect("load");
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].text, "second");
    }

    #[test]
    fn change_name_by_existing_name_falls_back() {
        let store = Store::open_in_memory().expect("open");
        let pid = "Unnamed_dddddddd".to_owned();
        store.insert_new_face(&pid, &Embedding::new(vec![1.0])).expect("insert");
        store.set_name(&pid, "Alice").expect("set name");

        let changed = store
            .set_name_by_existing_name("Alice", "Alicia")
            .expect("rename by name");
        assert!(changed);
        assert_eq!(store.get_name(&pid).unwrap(), Some("Alicia".to_owned()));
    }

    #[test]
    fn todo_insert_links_to_conversation() {
        let store = Store::open_in_memory().expect("open");
        store
            .insert_todo("buy milk", None, "conv-1")
            .expect("insert todo");
        assert_eq!(store.todo_count_for_conversation("conv-1").unwrap(), 1);
    }
}
