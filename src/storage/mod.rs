mod content;
mod schema;
mod types;

pub use schema::Database;
pub use types::{ContentItem, DatabaseError, NewContentItem, Source};
