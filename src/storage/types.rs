use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Cache store errors, by handling policy rather than by underlying cause.
///
/// Mirrors spec.md §7's error taxonomy: `InstanceLocked` and `Other` are
/// transport-level (the engine couldn't be reached at all), `TableMissing`
/// is surfaced distinctly so the tool server can emit a friendly hint, and
/// `Validation` rejects malformed writes before they ever reach SQL.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another writer holds the database (SQLITE_BUSY / SQLITE_LOCKED / can't-open).
    #[error("database is locked by another process")]
    InstanceLocked,

    /// Schema migration failed.
    #[error("schema migration failed: {0}")]
    Migration(String),

    /// Query ran against a database that has never been initialized.
    #[error("content table does not exist (run an ingest first)")]
    TableMissing,

    /// Upsert rejected: empty `id` or `source`.
    #[error("invalid content item: {0}")]
    Validation(String),

    /// Any other sqlx error.
    #[error("database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Classify a raw sqlx error by its message, since SQLite surfaces both
    /// lock contention and missing-table errors as opaque strings rather
    /// than structured codes (spec.md §9's open question on this).
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            let message = db_err.message().to_lowercase();
            if message.contains("no such table") {
                return DatabaseError::TableMissing;
            }
            if message.contains("database is locked")
                || message.contains("database table is locked")
                || message.contains("sqlite_busy")
                || message.contains("sqlite_locked")
            {
                return DatabaseError::InstanceLocked;
            }
        }

        let message = err.to_string().to_lowercase();
        if message.contains("unable to open database file") {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Content model
// ============================================================================

/// Where a cached item's content came from — a ground truth of the link's
/// host, frozen at ingest time (spec.md §9 "Source classification").
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Article,
    Youtube,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Article => "article",
            Source::Youtube => "youtube",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "article" => Some(Source::Article),
            "youtube" => Some(Source::Youtube),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The sole persisted entity (spec.md §3).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContentItem {
    pub id: String,
    pub source: Source,
    pub author_username: String,
    pub author_display_name: Option<String>,
    pub content: String,
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
    pub like_count: i64,
    pub reply_count: i64,
}

/// Row type read back from the `content` table before timestamp/JSON parsing.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ContentRow {
    pub id: String,
    pub source: String,
    pub author_username: String,
    pub author_display_name: Option<String>,
    pub content: String,
    pub url: Option<String>,
    pub created_at: String,
    pub fetched_at: String,
    pub metadata: Option<String>,
    pub like_count: i64,
    pub reply_count: i64,
}

impl ContentRow {
    pub(crate) fn into_item(self) -> ContentItem {
        ContentItem {
            id: self.id,
            source: Source::parse(&self.source).unwrap_or(Source::Article),
            author_username: self.author_username,
            author_display_name: self.author_display_name,
            content: self.content,
            url: self.url,
            created_at: parse_rfc3339_or_epoch(&self.created_at),
            fetched_at: parse_rfc3339_or_epoch(&self.fetched_at),
            metadata: self
                .metadata
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or(serde_json::Value::Null),
            like_count: self.like_count,
            reply_count: self.reply_count,
        }
    }
}

fn parse_rfc3339_or_epoch(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::UNIX_EPOCH)
}

/// Formats a timestamp the way rows are stored: RFC3339 UTC with a `Z`
/// suffix, which sorts lexically in the same order it sorts chronologically
/// so SQLite can compare it without parsing (spec.md §4.2).
pub(crate) fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// A new or replacement item to upsert (the writable half of [`ContentItem`];
/// `fetched_at` is stamped by the store, not supplied by the caller).
#[derive(Debug, Clone)]
pub struct NewContentItem {
    pub id: String,
    pub source: Source,
    pub author_username: String,
    pub author_display_name: Option<String>,
    pub content: String,
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}
