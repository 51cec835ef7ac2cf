use scraper::Html;

/// Converts an HTML fragment to plain text by walking the parsed node tree,
/// rather than regex-stripping tags (spec.md §4.6 step 5, §9). Used as the
/// last-resort fallback when neither the article extractor nor the
/// transcript fetcher produced anything.
pub fn plain_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let fragment = Html::parse_fragment(html);
    let text: String = fragment
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ");

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
