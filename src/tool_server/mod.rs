//! The stdio tool server (C7): exposes `list_cache` and `get_content` to
//! an LLM client over framed JSON on stdin/stdout.

mod tools;

pub use tools::serve_stdio;
