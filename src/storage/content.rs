use std::collections::HashSet;

use super::schema::Database;
use super::types::{format_timestamp, ContentItem, ContentRow, DatabaseError, NewContentItem, Source};

impl Database {
    // ========================================================================
    // Content Operations
    // ========================================================================

    /// Atomic insert-or-update keyed on `id`; the store stamps `fetched_at`.
    ///
    /// Rejects an empty `id` with [`DatabaseError::Validation`] (spec.md §4.2).
    /// All mutable columns are replaced on conflict, matching the "upsert
    /// keyed on `id` replaces all mutable columns atomically" invariant in
    /// spec.md §3.
    pub async fn upsert(&self, item: &NewContentItem) -> Result<(), DatabaseError> {
        if item.id.trim().is_empty() {
            return Err(DatabaseError::Validation("id must not be empty".into()));
        }

        let metadata = if item.metadata.is_null() {
            None
        } else {
            Some(serde_json::to_string(&item.metadata).map_err(|e| {
                DatabaseError::Validation(format!("metadata is not valid JSON: {e}"))
            })?)
        };

        let now = format_timestamp(chrono::Utc::now());
        let created_at = format_timestamp(item.created_at);

        sqlx::query(
            r#"
            INSERT INTO content
                (id, source, author_username, author_display_name, content, url,
                 created_at, fetched_at, metadata, like_count, reply_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0)
            ON CONFLICT(id) DO UPDATE SET
                source = excluded.source,
                author_username = excluded.author_username,
                author_display_name = excluded.author_display_name,
                content = excluded.content,
                url = excluded.url,
                created_at = excluded.created_at,
                fetched_at = excluded.fetched_at,
                metadata = excluded.metadata
            "#,
        )
        .bind(&item.id)
        .bind(item.source.as_str())
        .bind(&item.author_username)
        .bind(&item.author_display_name)
        .bind(&item.content)
        .bind(&item.url)
        .bind(&created_at)
        .bind(&now)
        .bind(&metadata)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }

    /// Fetch a single item by its primary key.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<ContentItem>, DatabaseError> {
        let row: Option<ContentRow> = sqlx::query_as("SELECT * FROM content WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(ContentRow::into_item))
    }

    /// The most recent item whose `url` matches, ties broken by
    /// `created_at` descending (spec.md §4.2).
    pub async fn get_by_url(&self, url: &str) -> Result<Option<ContentItem>, DatabaseError> {
        let row: Option<ContentRow> = sqlx::query_as(
            "SELECT * FROM content WHERE url = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(ContentRow::into_item))
    }

    /// Set of known, non-null URLs, optionally scoped to a source. Used by
    /// the orchestrator to pre-filter already-cached entries (spec.md §4.6
    /// Phase A).
    pub async fn list_urls_by_source(
        &self,
        source: Option<Source>,
    ) -> Result<HashSet<String>, DatabaseError> {
        let rows: Vec<(String,)> = match source {
            Some(source) => {
                sqlx::query_as("SELECT url FROM content WHERE url IS NOT NULL AND source = ?")
                    .bind(source.as_str())
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query_as("SELECT url FROM content WHERE url IS NOT NULL")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(DatabaseError::from_sqlx)?;

        Ok(rows.into_iter().map(|(url,)| url).collect())
    }

    /// Items with `created_at >= since`, optionally filtered by source,
    /// ordered by `created_at` descending. `limit == 0` means no cap
    /// (spec.md §4.2).
    pub async fn get_since(
        &self,
        since: chrono::DateTime<chrono::Utc>,
        source: Option<Source>,
        limit: u32,
    ) -> Result<Vec<ContentItem>, DatabaseError> {
        let since = format_timestamp(since);
        let limit = limit as i64;

        let rows: Vec<ContentRow> = match (source, limit) {
            (Some(source), 0) => {
                sqlx::query_as(
                    "SELECT * FROM content WHERE created_at >= ? AND source = ? ORDER BY created_at DESC",
                )
                .bind(&since)
                .bind(source.as_str())
                .fetch_all(&self.pool)
                .await
            }
            (Some(source), limit) => {
                sqlx::query_as(
                    "SELECT * FROM content WHERE created_at >= ? AND source = ? ORDER BY created_at DESC LIMIT ?",
                )
                .bind(&since)
                .bind(source.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            (None, 0) => {
                sqlx::query_as("SELECT * FROM content WHERE created_at >= ? ORDER BY created_at DESC")
                    .bind(&since)
                    .fetch_all(&self.pool)
                    .await
            }
            (None, limit) => {
                sqlx::query_as(
                    "SELECT * FROM content WHERE created_at >= ? ORDER BY created_at DESC LIMIT ?",
                )
                .bind(&since)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(DatabaseError::from_sqlx)?;

        Ok(rows.into_iter().map(ContentRow::into_item).collect())
    }

    /// Fetch several items by id, in the order the caller asked for them,
    /// silently omitting ids that aren't present (used by `get_content`'s
    /// `ids` path — spec.md §4.7).
    pub async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<ContentItem>, DatabaseError> {
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(item) = self.get_by_id(id).await? {
                items.push(item);
            }
        }
        Ok(items)
    }
}
