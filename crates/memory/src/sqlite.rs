//! SQLite episodic store with FTS5 full-text search.
//!
//! Uses a single SQLite database file with two tables:
//! - `episodes` — the durable, append-only log of turns
//! - `episodes_fts` — FTS5 virtual table for ranked keyword search (BM25)
//!
//! Triggers keep the FTS index in sync on insert/delete. There is no update
//! trigger: episodes are never mutated after creation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use switchyard_core::error::MemoryError;
use switchyard_core::memory::{EpisodeEntry, EpisodicStore};
use switchyard_core::request::SessionId;

/// A production episodic store backed by SQLite + FTS5.
pub struct SqliteEpisodicStore {
    pool: SqlitePool,
    /// Entries kept before oldest-first pruning (0 = unbounded)
    max_entries: u64,
}

impl SqliteEpisodicStore {
    /// Open (or create) the store at the given path.
    pub async fn new(path: &str, max_entries: u64) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool, max_entries };
        store.run_migrations().await?;
        info!("SQLite episodic store initialized at {path}");
        Ok(store)
    }

    /// Run schema migrations — creates tables, FTS5 virtual table, and triggers.
    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS episodes (
                iid          INTEGER PRIMARY KEY AUTOINCREMENT,
                id           TEXT UNIQUE NOT NULL,
                session_id   TEXT NOT NULL,
                turn_index   INTEGER NOT NULL,
                input_text   TEXT NOT NULL,
                output_text  TEXT NOT NULL,
                tags         TEXT NOT NULL DEFAULT '[]',
                created_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("episodes table: {e}")))?;

        // External-content FTS5 table synced via triggers
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE IF NOT EXISTS episodes_fts USING fts5(
                input_text,
                output_text,
                tags,
                content='episodes',
                content_rowid='iid',
                tokenize='porter unicode61'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("FTS5 table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TRIGGER IF NOT EXISTS episodes_ai AFTER INSERT ON episodes BEGIN
                INSERT INTO episodes_fts(rowid, input_text, output_text, tags)
                VALUES (new.iid, new.input_text, new.output_text, new.tags);
            END
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("insert trigger: {e}")))?;

        sqlx::query(
            r#"
            CREATE TRIGGER IF NOT EXISTS episodes_ad AFTER DELETE ON episodes BEGIN
                INSERT INTO episodes_fts(episodes_fts, rowid, input_text, output_text, tags)
                VALUES ('delete', old.iid, old.input_text, old.output_text, old.tags);
            END
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("delete trigger: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_episodes_session ON episodes(session_id, created_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("session index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Parse an `EpisodeEntry` from a SQLite row.
    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<EpisodeEntry, MemoryError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| MemoryError::QueryFailed(format!("id column: {e}")))?;
        let session_id: String = row
            .try_get("session_id")
            .map_err(|e| MemoryError::QueryFailed(format!("session_id column: {e}")))?;
        let turn_index: i64 = row
            .try_get("turn_index")
            .map_err(|e| MemoryError::QueryFailed(format!("turn_index column: {e}")))?;
        let input_text: String = row
            .try_get("input_text")
            .map_err(|e| MemoryError::QueryFailed(format!("input_text column: {e}")))?;
        let output_text: String = row
            .try_get("output_text")
            .map_err(|e| MemoryError::QueryFailed(format!("output_text column: {e}")))?;
        let tags_json: String = row
            .try_get("tags")
            .map_err(|e| MemoryError::QueryFailed(format!("tags column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| MemoryError::QueryFailed(format!("created_at column: {e}")))?;

        let extracted_tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
        let timestamp = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(EpisodeEntry {
            id,
            session_id: SessionId(session_id),
            turn_index: turn_index.max(0) as u64,
            input_text,
            output_text,
            extracted_tags,
            timestamp,
            score: 0.0,
        })
    }

    /// Build a safe FTS5 query from user text.
    ///
    /// Tokenizes the input into words joined by implicit AND, quoting each
    /// token to prevent FTS syntax injection. Prefix matching with `*`.
    fn sanitize_fts_query(text: &str) -> String {
        text.split_whitespace()
            .map(|w| {
                let clean: String = w
                    .chars()
                    .filter(|c| c.is_alphanumeric() || *c == '_')
                    .collect();
                if clean.is_empty() {
                    return String::new();
                }
                format!("\"{clean}\"*")
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Prune oldest entries past the cap.
    async fn enforce_retention(&self) -> Result<(), MemoryError> {
        if self.max_entries == 0 {
            return Ok(());
        }
        let total = self.count().await?;
        if total <= self.max_entries {
            return Ok(());
        }
        let excess = (total - self.max_entries) as i64;
        sqlx::query(
            "DELETE FROM episodes WHERE iid IN (SELECT iid FROM episodes ORDER BY iid ASC LIMIT ?1)",
        )
        .bind(excess)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("Retention prune failed: {e}")))?;
        debug!(pruned = excess, "Episodic retention prune");
        Ok(())
    }
}

#[async_trait]
impl EpisodicStore for SqliteEpisodicStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append(&self, mut entry: EpisodeEntry) -> Result<String, MemoryError> {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        let id = entry.id.clone();
        let tags_json = serde_json::to_string(&entry.extracted_tags)
            .map_err(|e| MemoryError::Storage(format!("Tags serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO episodes (id, session_id, turn_index, input_text, output_text, tags, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.session_id.0)
        .bind(entry.turn_index as i64)
        .bind(&entry.input_text)
        .bind(&entry.output_text)
        .bind(&tags_json)
        .bind(entry.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT failed: {e}")))?;

        self.enforce_retention().await?;

        debug!("Appended episode {id}");
        Ok(id)
    }

    async fn search(
        &self,
        session_id: &SessionId,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<EpisodeEntry>, MemoryError> {
        if query_text.trim().is_empty() {
            // Empty query: return the session's most recent entries
            let rows = sqlx::query(
                "SELECT * FROM episodes WHERE session_id = ?1 ORDER BY created_at DESC LIMIT ?2",
            )
            .bind(&session_id.0)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("Empty search: {e}")))?;

            return rows.iter().map(Self::row_to_entry).collect();
        }

        let fts_query = Self::sanitize_fts_query(query_text);
        if fts_query.is_empty() {
            return Ok(vec![]);
        }

        // BM25 rank first, recency as tiebreak
        let rows = sqlx::query(
            r#"
            SELECT e.*, bm25(episodes_fts) AS rank
            FROM episodes_fts f
            JOIN episodes e ON e.iid = f.rowid
            WHERE episodes_fts MATCH ?1
              AND e.session_id = ?2
            ORDER BY rank, e.created_at DESC
            LIMIT ?3
            "#,
        )
        .bind(&fts_query)
        .bind(&session_id.0)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("FTS5 search: {e}")))?;

        rows.iter()
            .map(|row| {
                let mut entry = Self::row_to_entry(row)?;
                // bm25() returns negative values (lower = better match);
                // flip so higher = better
                let rank: f64 = row.try_get("rank").unwrap_or(0.0);
                entry.score = (-rank) as f32;
                Ok(entry)
            })
            .collect()
    }

    async fn count(&self) -> Result<u64, MemoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS c FROM episodes")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("Count failed: {e}")))?;
        let count: i64 = row
            .try_get("c")
            .map_err(|e| MemoryError::QueryFailed(format!("c column: {e}")))?;
        Ok(count.max(0) as u64)
    }

    async fn session_turns(&self, session_id: &SessionId) -> Result<u64, MemoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS c FROM episodes WHERE session_id = ?1")
            .bind(&session_id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("Session count failed: {e}")))?;
        let count: i64 = row
            .try_get("c")
            .map_err(|e| MemoryError::QueryFailed(format!("c column: {e}")))?;
        Ok(count.max(0) as u64)
    }
}
