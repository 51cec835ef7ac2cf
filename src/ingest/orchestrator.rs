use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::content::{
    build_client, extract_article, extract_video_id, fetch_transcript_from, is_youtube_url, plain_text,
    Endpoints, ProxyConfig,
};
use crate::feed::{fetch_feed, FeedEntry};
use crate::storage::{Database, DatabaseError, NewContentItem, Source};

/// Errors that abort a run before any work is attempted (spec.md §4.6
/// "Run-fatal"). Per-feed and per-task failures never surface here.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to initialize schema: {0}")]
    Schema(#[from] DatabaseError),
}

/// Outcome of one ingest run.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestReport {
    /// Items newly upserted this run.
    pub saved: usize,
    /// Tasks attempted (kept past dedup at Phase D step 1/2).
    pub processed: usize,
}

struct ScrapeTask {
    feed_title: String,
    feed_url: String,
    entry: FeedEntry,
    host: String,
}

/// Everything a host's worker needs to process its queue of tasks, bundled
/// so it can be cloned once per host instead of threaded argument by
/// argument.
struct WorkerContext {
    db: Database,
    client: reqwest::Client,
    config: Config,
    youtube_endpoints: Endpoints,
}

/// One feed-and-scrape ingest run over a configured set of feeds.
pub struct IngestRun {
    db: Database,
    config: Config,
    client: reqwest::Client,
    cancel: CancellationToken,
    youtube_endpoints: Endpoints,
}

impl IngestRun {
    pub fn new(db: Database, config: Config, client: reqwest::Client, cancel: CancellationToken) -> Self {
        Self {
            db,
            config,
            client,
            cancel,
            youtube_endpoints: Endpoints::default(),
        }
    }

    /// Points the transcript fetcher's YouTube endpoints elsewhere —
    /// primarily so tests can drive the watch-page/player/caption-track
    /// protocol against a mock server instead of the real site.
    pub fn with_youtube_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.youtube_endpoints = endpoints;
        self
    }

    fn politeness_interval(&self) -> Duration {
        if self.config.scraper_max_workers <= 8 {
            Duration::from_millis(1500)
        } else {
            Duration::from_secs(2)
        }
    }

    /// Runs the four-phase ingest pipeline (spec.md §4.6) and returns a
    /// report. Only schema-init failure aborts the whole run; everything
    /// else is logged and skipped.
    pub async fn run(&self) -> Result<IngestReport, IngestError> {
        // Phase A — ensure the schema exists (run-fatal on failure), then
        // preload already-cached URLs so Phase D's URL-dedup check is a
        // single in-memory set.
        self.db.init_schema().await?;

        let known_urls = self
            .db
            .list_urls_by_source(None)
            .await
            .unwrap_or_default();

        if self.config.feeds.is_empty() {
            return Ok(IngestReport::default());
        }

        // Phase B — feed fan-out.
        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let (tx, mut rx) = mpsc::channel(self.config.feeds.len().max(1));

        for feed_url in &self.config.feeds {
            let client = self.client.clone();
            let feed_url = feed_url.clone();
            let tx = tx.clone();
            let cancel = self.cancel.clone();

            tokio::spawn(async move {
                if cancel.is_cancelled() {
                    return;
                }
                let result = fetch_feed(&client, &feed_url, timeout).await;
                let _ = tx.send((feed_url, result)).await;
            });
        }
        drop(tx);

        let mut fetched = Vec::new();
        while let Some((feed_url, result)) = rx.recv().await {
            match result {
                Ok(parsed) => fetched.push((feed_url, parsed)),
                Err(e) => {
                    tracing::warn!(feed = %feed_url, error = %e, "feed fetch failed, skipping");
                }
            }
        }

        // Phase C — task assembly.
        let mut tasks_by_host: HashMap<String, Vec<ScrapeTask>> = HashMap::new();
        for (feed_url, parsed) in fetched {
            let feed_title = parsed.title.clone().unwrap_or_else(|| feed_url.clone());
            let entries = parsed.entries;

            let feed_host = reqwest::Url::parse(&feed_url)
                .ok()
                .and_then(|u| u.host_str().map(|h| h.to_string()))
                .unwrap_or_default();

            for entry in entries.into_iter().take(self.config.max_posts_per_feed) {
                if let Some(link) = &entry.link {
                    if known_urls.contains(link) {
                        continue;
                    }
                }

                let host = entry
                    .link
                    .as_deref()
                    .and_then(|l| reqwest::Url::parse(l).ok())
                    .and_then(|u| u.host_str().map(|h| h.to_string()))
                    .unwrap_or_else(|| feed_host.clone());

                tasks_by_host
                    .entry(host.clone())
                    .or_default()
                    .push(ScrapeTask {
                        feed_title: feed_title.clone(),
                        feed_url: feed_url.clone(),
                        entry,
                        host,
                    });
            }
        }

        // Phase D — per-host scrape.
        let saved = Arc::new(Mutex::new(0usize));
        let processed = Arc::new(Mutex::new(0usize));
        let politeness = self.politeness_interval();

        let mut workers = Vec::new();
        for (_, tasks) in tasks_by_host {
            let ctx = Arc::new(WorkerContext {
                db: self.db.clone(),
                client: self.client.clone(),
                config: self.config.clone(),
                youtube_endpoints: self.youtube_endpoints.clone(),
            });
            let cancel = self.cancel.clone();
            let saved = Arc::clone(&saved);
            let processed = Arc::clone(&processed);

            workers.push(tokio::spawn(async move {
                for task in tasks {
                    if cancel.is_cancelled() {
                        break;
                    }

                    let did_fetch = process_task(&ctx, task, timeout, &saved, &processed).await;

                    if did_fetch {
                        tokio::select! {
                            _ = tokio::time::sleep(politeness) => {}
                            _ = cancel.cancelled() => break,
                        }
                    }
                }
            }));
        }

        for worker in workers {
            let _ = worker.await;
        }

        let saved = *saved.lock().await;
        let processed = *processed.lock().await;
        Ok(IngestReport { saved, processed })
    }
}

/// Processes one scrape task end to end. Returns whether an outbound
/// network request against the task's origin was made (used to decide
/// whether the caller should wait the politeness interval).
async fn process_task(
    ctx: &WorkerContext,
    task: ScrapeTask,
    timeout: Duration,
    saved: &Arc<Mutex<usize>>,
    processed: &Arc<Mutex<usize>>,
) -> bool {
    let WorkerContext {
        db,
        client,
        config,
        youtube_endpoints,
    } = ctx;
    tracing::debug!(host = %task.host, title = %task.entry.title, "processing scrape task");

    // Step 1: stable id — guid, else link, else skip (spec.md §3/§4.6 step 1).
    let id = match task.entry.guid.as_ref().map(|g| g.trim()).filter(|g| !g.is_empty()) {
        Some(guid) => guid.to_string(),
        None => return false,
    };

    // Step 2: dedup by id or url.
    match db.get_by_id(&id).await {
        Ok(Some(_)) => return false,
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(id = %id, error = %e, "dedup lookup by id failed, continuing");
        }
    }
    if let Some(link) = &task.entry.link {
        match db.get_by_url(link).await {
            Ok(Some(_)) => return false,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(url = %link, error = %e, "dedup lookup by url failed, continuing");
            }
        }
    }

    {
        let mut processed = processed.lock().await;
        *processed += 1;
    }

    // Step 3: source classification.
    let url = task.entry.link.clone().unwrap_or_default();
    let source = if is_youtube_url(&url) {
        Source::Youtube
    } else {
        Source::Article
    };

    // Step 4: created_at.
    let created_at = task
        .entry
        .published
        .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
        .unwrap_or_else(Utc::now);

    // Step 5: extract content.
    let raw_fallback = task
        .entry
        .content
        .clone()
        .or_else(|| task.entry.summary.clone())
        .unwrap_or_default();

    let mut did_fetch = false;
    let content = match source {
        Source::Youtube => {
            let video_id = extract_video_id(&url);
            let transcript_result = match video_id {
                Some(video_id) => {
                    let proxy = if config.youtube_proxy.enabled {
                        Some(ProxyConfig {
                            username: config.youtube_proxy.username.clone(),
                            password: config.youtube_proxy.password.clone(),
                            domain: config.youtube_proxy.domain.clone(),
                            port: config.youtube_proxy.port,
                        })
                    } else {
                        None
                    };
                    let yt_client = build_client(proxy.as_ref()).unwrap_or_else(|_| client.clone());
                    did_fetch = true;
                    fetch_transcript_from(&yt_client, &video_id, timeout, youtube_endpoints).await
                }
                None => Err(crate::content::TranscriptError::NoCaptions),
            };

            match transcript_result {
                Ok(snippets) if !snippets.is_empty() => {
                    let joined = snippets
                        .iter()
                        .map(|s| s.text.as_str())
                        .collect::<Vec<_>>()
                        .join("\n");
                    format!("YouTube Transcript:\n{joined}")
                }
                Ok(_) => plain_text(&raw_fallback),
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "transcript fetch failed, falling back");
                    plain_text(&raw_fallback)
                }
            }
        }
        Source::Article => {
            if url.is_empty() {
                plain_text(&raw_fallback)
            } else {
                did_fetch = true;
                let extracted = extract_article(client, &url, timeout).await;
                if !extracted.is_empty() {
                    extracted
                } else {
                    plain_text(&raw_fallback)
                }
            }
        }
    };

    // Step 6: metadata.
    let metadata = serde_json::json!({
        "feed_url": task.feed_url,
        "feed_title": task.feed_title,
        "entry_title": task.entry.title,
    });

    let item = NewContentItem {
        id,
        source,
        author_username: task.feed_title.clone(),
        author_display_name: Some(task.feed_title.clone()),
        content,
        url: task.entry.link.clone(),
        created_at,
        metadata,
    };

    // Step 7: upsert.
    match db.upsert(&item).await {
        Ok(()) => {
            let mut saved = saved.lock().await;
            *saved += 1;
        }
        Err(e) => {
            tracing::warn!(id = %item.id, error = %e, "upsert failed, continuing");
        }
    }

    did_fetch
}
