//! End-to-end orchestrator scenarios (spec.md §8 S1-S4), driven against
//! wiremock servers the way `feed/fetcher.rs`'s own tests are.

use chrono::TimeZone;
use colino::config::Config;
use colino::content::Endpoints;
use colino::ingest::IngestRun;
use colino::storage::{Database, Source};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARTICLE_BODY: &str = r#"<!DOCTYPE html>
<html><head><title>Article</title></head>
<body><article>
<h1>Article</h1>
<p>This is the first paragraph of a long enough article body to clear the
minimum extracted length threshold so the extractor accepts it as real content
rather than discarding it as noise.</p>
<p>And a second paragraph to be sure we are well above one hundred characters
of meaningful text once the tags are stripped away by the extractor.</p>
</article></body></html>"#;

fn rss_with_items(base: &str, items: &[(&str, &str, &str)]) -> String {
    let entries: String = items
        .iter()
        .map(|(guid, title, path)| {
            format!(
                r#"<item>
                    <guid>{guid}</guid>
                    <title>{title}</title>
                    <link>{base}{path}</link>
                    <pubDate>Sat, 01 Aug 2025 00:00:00 GMT</pubDate>
                    <description>fallback text for {title}</description>
                </item>"#
            )
        })
        .collect();
    format!(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Feed</title>{entries}</channel></rss>"#)
}

fn youtube_rss(title_guid: &str, video_url: &str) -> String {
    format!(
        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Feed</title>
        <item>
            <guid>{title_guid}</guid>
            <title>A Video</title>
            <link>{video_url}</link>
            <pubDate>Sat, 01 Aug 2025 00:00:00 GMT</pubDate>
            <description>fallback transcript text</description>
        </item>
        </channel></rss>"#
    )
}

fn config_for(feeds: Vec<String>) -> Config {
    Config {
        feeds,
        timeout_seconds: 5,
        ..Config::default()
    }
}

/// S1 — basic article ingest: one feed, four items, all upserted with
/// extracted article content.
#[tokio::test]
async fn s1_basic_article_ingest() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();

    let items = [
        ("g1", "Item 1", "/articles/1"),
        ("g2", "Item 2", "/articles/2"),
        ("g3", "Item 3", "/articles/3"),
        ("g4", "Item 4", "/articles/4"),
    ];
    Mock::given(method("GET"))
        .and(path("/rss"))
        .respond_with(ResponseTemplate::new(200).set_body_string(rss_with_items(&base, &items)))
        .mount(&mock_server)
        .await;
    for (_, _, p) in items {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_string(ARTICLE_BODY))
            .mount(&mock_server)
            .await;
    }

    let db = Database::open_writer(":memory:").await.unwrap();
    let config = config_for(vec![format!("{base}/rss")]);
    let client = reqwest::Client::new();
    let run = IngestRun::new(db.clone(), config, client, CancellationToken::new());

    let report = run.run().await.unwrap();
    assert_eq!(report.saved, 4);
    assert_eq!(report.processed, 4);

    let since = chrono::Utc
        .with_ymd_and_hms(2025, 8, 1, 0, 0, 0)
        .unwrap();
    let rows = db.get_since(since, Some(Source::Article), 100).await.unwrap();
    assert_eq!(rows.len(), 4);
    for row in &rows {
        assert_eq!(row.source, Source::Article);
        assert!(row.content.contains("first paragraph"));
        assert!(row.metadata["entry_title"].as_str().unwrap().starts_with("Item"));
    }
}

/// S2 — dedup by URL/id: a second feed serving the same guids and links
/// saves nothing new.
#[tokio::test]
async fn s2_dedup_across_two_feeds() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();

    let items = [
        ("g1", "Item 1", "/articles/1"),
        ("g2", "Item 2", "/articles/2"),
        ("g3", "Item 3", "/articles/3"),
        ("g4", "Item 4", "/articles/4"),
    ];
    let rss_body = rss_with_items(&base, &items);
    Mock::given(method("GET"))
        .and(path("/rss"))
        .respond_with(ResponseTemplate::new(200).set_body_string(rss_body.clone()))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rss2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(rss_body))
        .mount(&mock_server)
        .await;
    for (_, _, p) in items {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_string(ARTICLE_BODY))
            .mount(&mock_server)
            .await;
    }

    let db = Database::open_writer(":memory:").await.unwrap();
    let client = reqwest::Client::new();

    let first = IngestRun::new(
        db.clone(),
        config_for(vec![format!("{base}/rss")]),
        client.clone(),
        CancellationToken::new(),
    );
    let first_report = first.run().await.unwrap();
    assert_eq!(first_report.saved, 4);

    let second = IngestRun::new(
        db.clone(),
        config_for(vec![format!("{base}/rss"), format!("{base}/rss2")]),
        client,
        CancellationToken::new(),
    );
    let second_report = second.run().await.unwrap();
    assert_eq!(second_report.saved, 0);
    assert_eq!(second_report.processed, 0);

    let since = chrono::Utc.with_ymd_and_hms(2025, 8, 1, 0, 0, 0).unwrap();
    let rows = db.get_since(since, None, 0).await.unwrap();
    assert_eq!(rows.len(), 4, "dedup must not duplicate rows across feeds");
}

/// S3 — YouTube classification: a linked video's transcript is fetched and
/// joined into the stored content.
#[tokio::test]
async fn s3_youtube_classification_joins_transcript() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/rss"))
        .respond_with(ResponseTemplate::new(200).set_body_string(youtube_rss(
            "yt1",
            "https://www.youtube.com/watch?v=abc123",
        )))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/watch"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"window.x = {"INNERTUBE_API_KEY":"testkey123"};"#),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/youtubei/v1/player"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "playabilityStatus": {"status": "OK"},
            "captions": {
                "playerCaptionsTracklistRenderer": {
                    "captionTracks": [
                        {"baseUrl": format!("{base}/api/timedtext?lang=en"), "kind": "manual"}
                    ]
                }
            }
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/timedtext"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<transcript><text start="0.0" dur="1.0">hello</text><text start="1.0" dur="1.0">world</text></transcript>"#,
        ))
        .mount(&mock_server)
        .await;

    let db = Database::open_writer(":memory:").await.unwrap();
    let config = config_for(vec![format!("{base}/rss")]);
    let client = reqwest::Client::new();
    let run = IngestRun::new(db.clone(), config, client, CancellationToken::new())
        .with_youtube_endpoints(Endpoints::pointing_at(&base));

    let report = run.run().await.unwrap();
    assert_eq!(report.saved, 1);

    let item = db.get_by_id("yt1").await.unwrap().unwrap();
    assert_eq!(item.source, Source::Youtube);
    assert!(item.content.starts_with("YouTube Transcript:\n"));
    assert!(item.content.contains("hello\nworld"));
}

/// S4 — transcript failure falls back to the feed's own description, and
/// the run completes without a run-level error.
#[tokio::test]
async fn s4_transcript_failure_falls_back_to_description() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/rss"))
        .respond_with(ResponseTemplate::new(200).set_body_string(youtube_rss(
            "yt2",
            "https://www.youtube.com/watch?v=abc123",
        )))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/watch"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"window.x = {"INNERTUBE_API_KEY":"testkey123"};"#),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/youtubei/v1/player"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&mock_server)
        .await;

    let db = Database::open_writer(":memory:").await.unwrap();
    let config = config_for(vec![format!("{base}/rss")]);
    let client = reqwest::Client::new();
    let run = IngestRun::new(db.clone(), config, client, CancellationToken::new())
        .with_youtube_endpoints(Endpoints::pointing_at(&base));

    let report = run.run().await.unwrap();
    assert_eq!(report.saved, 1);

    let item = db.get_by_id("yt2").await.unwrap().unwrap();
    assert_eq!(item.source, Source::Youtube);
    assert_eq!(item.content, "fallback transcript text");
}
