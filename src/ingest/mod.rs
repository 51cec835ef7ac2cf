//! The ingest orchestrator: fans out feed fetches, dedups against the
//! cache, scrapes per-host with a politeness interval, and upserts results.

mod orchestrator;

pub use orchestrator::IngestRun;
