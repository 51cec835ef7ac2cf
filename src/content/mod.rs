//! Content extraction: article body text, YouTube transcripts, and an
//! HTML-to-plain-text fallback for bare RSS descriptions.

mod extractor;
mod html_to_text;
mod transcript;

pub use extractor::extract_article;
pub use html_to_text::plain_text;
pub use transcript::{
    build_client, extract_video_id, fetch_transcript, fetch_transcript_from, is_youtube_url, Endpoints,
    ProxyConfig, TranscriptError,
};
