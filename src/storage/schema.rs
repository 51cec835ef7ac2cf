use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use super::types::DatabaseError;

// ============================================================================
// Database
// ============================================================================

/// A handle onto the single-table `content` cache.
///
/// The ingest orchestrator opens a writer handle ([`Database::open_writer`]);
/// the tool server opens a read-only handle ([`Database::open_reader`]).
/// Both share the same schema and migration logic — see spec.md §4.2 and §5
/// ("Writer/reader separation across processes").
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a writer connection, creating the database file and parent
    /// directories if needed, and run migrations.
    ///
    /// `max_open_connections = 1` to match the embedded engine's
    /// single-writer model (spec.md §5 "Resources").
    pub async fn open_writer(path: &str) -> Result<Self, DatabaseError> {
        if path != ":memory:" {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        DatabaseError::Migration(format!(
                            "failed to create database directory {}: {e}",
                            parent.display()
                        ))
                    })?;
                }
            }
        }

        let url = format!("sqlite:{path}?mode=rwc");
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000");

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Open a read-only connection for the tool server. Does not create the
    /// file if missing — a missing file is the `DB-missing` friendly error
    /// (spec.md §4.7) and must be detected before this call resolves it.
    pub async fn open_reader(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{path}?mode=ro");
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(Self { pool })
    }

    /// Creates the `content` table and its indexes if they don't already
    /// exist, atomically within a transaction.
    ///
    /// Idempotent: every statement is `IF NOT EXISTS`, so re-running this on
    /// an existing database is a no-op (spec.md §4.2 "idempotent"). Called
    /// once by [`Database::open_writer`] and again at the start of every
    /// ingest cycle (spec.md §4.6 Phase A) — a failure there is run-fatal.
    /// If any step fails the transaction rolls back, leaving the previous
    /// schema state intact.
    pub async fn init_schema(&self) -> Result<(), DatabaseError> {
        sqlx::query("PRAGMA busy_timeout = 5000")
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS content (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                author_username TEXT NOT NULL,
                author_display_name TEXT,
                content TEXT NOT NULL DEFAULT '',
                url TEXT,
                created_at TEXT NOT NULL,
                fetched_at TEXT NOT NULL,
                metadata TEXT,
                like_count INTEGER NOT NULL DEFAULT 0,
                reply_count INTEGER NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_content_created_at ON content(created_at DESC)")
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_content_source_author ON content(source, author_username)",
        )
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_content_url ON content(url)")
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }
}
