use std::io::Cursor;
use std::time::Duration;

/// Minimum length (after trimming) for extracted text to be considered useful.
const MIN_EXTRACTED_LEN: usize = 100;

/// Fetches `url` and runs a readability-style extractor over the response
/// body, returning plain text (spec.md §4.4).
///
/// Never propagates an error to the caller: non-2xx responses, empty
/// bodies, and extractor failures all resolve to an empty string. The
/// orchestrator decides the fallback.
pub async fn extract_article(client: &reqwest::Client, url: &str, timeout: Duration) -> String {
    let response = match tokio::time::timeout(timeout, client.get(url).send()).await {
        Ok(Ok(resp)) => resp,
        _ => return String::new(),
    };

    if !response.status().is_success() {
        return String::new();
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(_) => return String::new(),
    };

    if body.trim().is_empty() {
        return String::new();
    }

    let parsed_url = match url::Url::parse(url) {
        Ok(u) => u,
        Err(_) => return String::new(),
    };

    let url_owned = url.to_string();
    let extracted = tokio::task::spawn_blocking(move || {
        let mut cursor = Cursor::new(body.into_bytes());
        readability::extractor::extract(&mut cursor, &parsed_url).ok()
    })
    .await
    .ok()
    .flatten();

    match extracted {
        Some(product) => {
            let text = product.text.trim().to_string();
            if text.len() > MIN_EXTRACTED_LEN {
                text
            } else {
                String::new()
            }
        }
        None => {
            tracing::debug!(url = %url_owned, "readability extraction failed, returning empty");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ARTICLE_HTML: &str = r#"<!DOCTYPE html>
<html><head><title>Test Article</title></head>
<body>
<article>
<h1>Test Article</h1>
<p>This is the first paragraph of a long enough article body to clear the
minimum extracted length threshold so the extractor accepts it as real content
rather than discarding it as noise.</p>
<p>And a second paragraph to be sure we are well above one hundred characters
of meaningful text once the tags are stripped away by the extractor.</p>
</article>
</body></html>"#;

    #[tokio::test]
    async fn extracts_article_body_text() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ARTICLE_HTML))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let text = extract_article(&client, &mock_server.uri(), Duration::from_secs(5)).await;
        assert!(text.contains("first paragraph"));
    }

    #[tokio::test]
    async fn non_2xx_returns_empty() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let text = extract_article(&client, &mock_server.uri(), Duration::from_secs(5)).await;
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn empty_body_returns_empty() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let text = extract_article(&client, &mock_server.uri(), Duration::from_secs(5)).await;
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn short_content_below_threshold_returns_empty() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body><p>Too short.</p></body></html>"),
            )
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let text = extract_article(&client, &mock_server.uri(), Duration::from_secs(5)).await;
        assert!(text.is_empty());
    }
}
