use std::path::{Path, PathBuf};

use chrono::{Duration as ChronoDuration, Utc};
use rmcp::handler::server::router::tool::ToolRouter as RmcpToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, ServerCapabilities, ServerInfo};
use rmcp::transport::stdio;
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServiceExt};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::storage::{ContentItem, Database, DatabaseError, Source};

const PREVIEW_LEN: usize = 400;

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ListCacheArgs {
    /// Look back this many hours. `<= 0` is treated as 24.
    pub hours: Option<i64>,
    /// Restrict to "article" or "youtube"; any other value is ignored.
    pub source: Option<String>,
    /// Max rows returned. `<= 0` or absent defaults to 50.
    pub limit: Option<i64>,
    /// When false (the default), return a 400-char preview instead of full content.
    pub include_content: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct GetContentArgs {
    /// Fetch these specific ids, in order.
    pub ids: Option<Vec<String>>,
    /// Fetch the most recent item matching this URL.
    pub url: Option<String>,
    /// Look back this many hours (default 24) when neither `ids` nor `url` is given.
    pub hours: Option<i64>,
    /// Restrict to "article" or "youtube"; any other value is ignored.
    pub source: Option<String>,
    /// Max rows returned; `0` or absent means no cap.
    pub limit: Option<i64>,
    /// Defaults to true here (unlike `list_cache`).
    pub include_content: Option<bool>,
}

fn parse_source(raw: Option<&str>) -> Option<Source> {
    raw.map(|s| s.trim().to_lowercase()).and_then(|s| Source::parse(&s))
}

fn item_to_json(item: &ContentItem, include_content: bool) -> serde_json::Value {
    let title = item
        .metadata
        .get("entry_title")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let mut value = serde_json::json!({
        "id": item.id,
        "source": item.source.as_str(),
        "author_username": item.author_username,
        "author_display_name": item.author_display_name,
        "url": item.url,
        "created_at": item.created_at.to_rfc3339(),
        "fetched_at": item.fetched_at.to_rfc3339(),
        "metadata": item.metadata,
        "title": title,
    });

    if include_content {
        value["content"] = serde_json::json!(item.content);
    } else {
        let preview = if item.content.chars().count() > PREVIEW_LEN {
            let truncated: String = item.content.chars().take(PREVIEW_LEN).collect();
            format!("{truncated}...")
        } else {
            item.content.clone()
        };
        value["content_preview"] = serde_json::json!(preview);
    }

    value
}

fn friendly_error(db_path: &Path, err: &DatabaseError) -> serde_json::Value {
    let db_path = db_path.display().to_string();
    match err {
        DatabaseError::TableMissing => serde_json::json!({
            "ok": false,
            "message": "content table does not exist",
            "hint": "run `colino ingest` at least once to initialize the cache",
            "db_path": db_path,
        }),
        other => serde_json::json!({
            "ok": false,
            "message": format!("query failed: {other}"),
            "hint": "check that the database file is not corrupted and is writable by the ingest process",
            "db_path": db_path,
        }),
    }
}

fn db_missing_error(db_path: &Path) -> serde_json::Value {
    serde_json::json!({
        "ok": false,
        "message": format!("database file not found at {}", db_path.display()),
        "hint": "run `colino ingest` to create the cache",
        "db_path": db_path.display().to_string(),
    })
}

fn tool_result(payload: serde_json::Value) -> CallToolResult {
    CallToolResult::structured(payload)
}

/// The stdio MCP server exposing the cache's two read-only tools.
///
/// Holds no session state beyond the database path — opens a fresh
/// read-only connection per call so a cache that appears after startup
/// (or disappears) is reflected immediately (spec.md §4.7, §9 S6).
#[derive(Clone)]
pub struct CacheServer {
    db_path: PathBuf,
    tool_router: RmcpToolRouter<Self>,
}

impl CacheServer {
    pub fn new(db_path: PathBuf) -> Self {
        Self {
            db_path,
            tool_router: Self::tool_router(),
        }
    }

    async fn open(&self) -> Result<Database, serde_json::Value> {
        if !self.db_path.exists() {
            return Err(db_missing_error(&self.db_path));
        }
        let path = self.db_path.to_string_lossy().to_string();
        Database::open_reader(&path)
            .await
            .map_err(|e| friendly_error(&self.db_path, &e))
    }
}

#[tool_router]
impl CacheServer {
    #[tool(description = "List recently cached articles and YouTube transcripts")]
    async fn list_cache(
        &self,
        Parameters(args): Parameters<ListCacheArgs>,
    ) -> Result<CallToolResult, McpError> {
        let db = match self.open().await {
            Ok(db) => db,
            Err(payload) => return Ok(tool_result(payload)),
        };

        let hours = args.hours.filter(|h| *h > 0).unwrap_or(24);
        let limit = args.limit.filter(|l| *l > 0).unwrap_or(50) as u32;
        let source = parse_source(args.source.as_deref());
        let include_content = args.include_content.unwrap_or(false);

        let since = Utc::now() - ChronoDuration::hours(hours);
        let items = match db.get_since(since, source, limit).await {
            Ok(items) => items,
            Err(e) => return Ok(tool_result(friendly_error(&self.db_path, &e))),
        };

        let json_items: Vec<serde_json::Value> = items
            .iter()
            .map(|item| item_to_json(item, include_content))
            .collect();

        Ok(tool_result(serde_json::json!({
            "ok": true,
            "count": json_items.len(),
            "items": json_items,
        })))
    }

    #[tool(description = "Fetch cached content by id, by URL, or by a recency window")]
    async fn get_content(
        &self,
        Parameters(args): Parameters<GetContentArgs>,
    ) -> Result<CallToolResult, McpError> {
        let db = match self.open().await {
            Ok(db) => db,
            Err(payload) => return Ok(tool_result(payload)),
        };

        let include_content = args.include_content.unwrap_or(true);

        let items = if let Some(ids) = args.ids.filter(|ids| !ids.is_empty()) {
            match db.get_by_ids(&ids).await {
                Ok(items) => items,
                Err(e) => return Ok(tool_result(friendly_error(&self.db_path, &e))),
            }
        } else if let Some(url) = args.url {
            match db.get_by_url(&url).await {
                Ok(Some(item)) => vec![item],
                Ok(None) => Vec::new(),
                Err(e) => return Ok(tool_result(friendly_error(&self.db_path, &e))),
            }
        } else {
            let hours = args.hours.filter(|h| *h > 0).unwrap_or(24);
            let limit = args.limit.filter(|l| *l > 0).unwrap_or(0) as u32;
            let source = parse_source(args.source.as_deref());
            let since = Utc::now() - ChronoDuration::hours(hours);
            match db.get_since(since, source, limit).await {
                Ok(items) => items,
                Err(e) => return Ok(tool_result(friendly_error(&self.db_path, &e))),
            }
        };

        let json_items: Vec<serde_json::Value> = items
            .iter()
            .map(|item| item_to_json(item, include_content))
            .collect();

        Ok(tool_result(serde_json::json!({
            "ok": true,
            "count": json_items.len(),
            "items": json_items,
        })))
    }
}

#[tool_handler]
impl rmcp::ServerHandler for CacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build()).with_instructions(
            "Read-only access to Colino's local content cache: recent feed articles and YouTube transcripts.",
        )
    }
}

/// Runs the tool server on stdio until the client disconnects.
pub async fn serve_stdio(db_path: PathBuf) -> Result<(), McpError> {
    let server = CacheServer::new(db_path);
    let running = server
        .serve(stdio())
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    running
        .waiting()
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(())
}
