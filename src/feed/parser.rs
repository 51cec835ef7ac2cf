use anyhow::Result;
use feed_rs::parser;

/// A single syndication entry, normalized across RSS and Atom (spec.md §4.3).
///
/// `guid` is `None` when the feed supplies neither a real id nor a link —
/// spec.md §3/§4.6 step 1 says such entries are skipped, not hashed into a
/// synthetic id.
#[derive(Debug, Clone)]
pub struct FeedEntry {
    pub guid: Option<String>,
    pub title: String,
    pub link: Option<String>,
    pub published: Option<i64>,
    pub content: Option<String>,
    pub summary: Option<String>,
}

/// A parsed feed: its own title (if any) plus its entries.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub entries: Vec<FeedEntry>,
}

/// Parses a feed document (RSS or Atom) into its title and entries.
///
/// An entry's id is the first non-empty of its real guid or its link
/// (spec.md §3/§4.6 step 1); an entry with neither is left with `guid: None`
/// so the caller can skip it rather than inventing an id.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed> {
    // feed-rs fills a missing entry id with a link+title hash of its own by
    // default; override it to leave the id empty so the literal
    // guid-else-link fallback below decides instead.
    let feed = parser::Builder::new()
        .id_generator(|_links, _title, _uri| String::new())
        .build()
        .parse(bytes)?;
    let title = feed.title.map(|t| t.content);

    let entries: Vec<FeedEntry> = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry.links.first().map(|l| l.href.clone());
            let published = entry.published.or(entry.updated).map(|dt| dt.timestamp());
            let summary = entry.summary.map(|s| s.content);
            let content = entry.content.and_then(|c| c.body);
            let title = entry
                .title
                .map(|t| t.content)
                .unwrap_or_else(|| "Untitled".to_string());

            let real_guid = entry.id.trim();
            let guid = if !real_guid.is_empty() {
                Some(real_guid.to_string())
            } else {
                link.clone()
            };

            FeedEntry {
                guid,
                title,
                link,
                published,
                content,
                summary,
            }
        })
        .collect();

    Ok(ParsedFeed { title, entries })
}
