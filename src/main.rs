use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use colino::config::Config;
use colino::ingest::IngestRun;
use colino::storage::{Database, DatabaseError};
use colino::tool_server;

#[derive(Parser, Debug)]
#[command(name = "colino", about = "Local-first feed and transcript aggregator")]
struct Args {
    /// Path to the config file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the stdio tool server.
    Server,
    /// Fetch configured feeds, extract content, and upsert into the cache.
    Ingest {
        /// Run once and exit (currently the only supported mode).
        #[arg(long)]
        once: bool,
    },
}

fn init_logging(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();

    let log_path = config
        .log_path
        .clone()
        .or_else(|| std::env::var("COLINO_LOG").ok().map(std::path::PathBuf::from));

    match log_path {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            if let Some(dir) = dir {
                let _ = std::fs::create_dir_all(dir);
            }
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "colino.log".to_string());
            let dir = dir.unwrap_or_else(|| std::path::Path::new("."));
            let appender = tracing_appender::rolling::never(dir, file_name);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(appender)
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(env_filter).init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);
    init_logging(&config);

    let db_path = config.resolve_database_path();

    match args.command {
        Command::Server => {
            tool_server::serve_stdio(db_path)
                .await
                .map_err(|e| anyhow::anyhow!("tool server failed: {e}"))?;
            Ok(())
        }
        Command::Ingest { once: _ } => {
            let db_path_str = db_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("invalid UTF-8 in database path"))?
                .to_string();

            let db = match Database::open_writer(&db_path_str).await {
                Ok(db) => db,
                Err(DatabaseError::InstanceLocked) => {
                    eprintln!("Error: another colino instance is writing to the database.");
                    std::process::exit(1);
                }
                Err(e) => return Err(anyhow::anyhow!("failed to open database: {e}")),
            };

            let client = reqwest::Client::builder()
                .user_agent(config.user_agent.clone())
                .build()
                .context("failed to build HTTP client")?;

            let cancel = CancellationToken::new();
            let run = IngestRun::new(db, config, client, cancel);
            let report = run
                .run()
                .await
                .context("ingest run failed during setup")?;

            tracing::info!(
                saved = report.saved,
                processed = report.processed,
                "ingest run complete"
            );
            println!(
                "ingest complete: {} saved, {} processed",
                report.saved, report.processed
            );
            Ok(())
        }
    }
}
