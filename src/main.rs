use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::index::Database;
use crate::landmark::Profile;
use crate::routes::AppState;

mod config;
mod index;
mod landmark;
mod matching;
mod routes;

#[derive(Parser)]
#[command(name = "earmark", version, about = "Landmark-based audio identification")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service
    Serve,
    /// Index a song from an audio file
    Add {
        path: PathBuf,
        /// Display name; defaults to the file name
        #[arg(long)]
        name: Option<String>,
    },
    /// Match an audio clip against the index
    Match { path: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let db = Database::open(&config.database_path)
        .await
        .with_context(|| format!("opening index at {}", config.database_path.display()))?;

    match cli.command {
        Command::Serve => {
            let state = Arc::new(AppState {
                db,
                match_threshold: config.match_threshold,
            });
            let app = routes::router(state);

            let listener = tokio::net::TcpListener::bind(&config.bind_addr)
                .await
                .with_context(|| format!("binding {}", config.bind_addr))?;
            log::info!("listening on {}", config.bind_addr);
            axum::serve(listener, app).await?;
        }
        Command::Add { path, name } => {
            let audio_bytes = std::fs::read(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let song_name = name.unwrap_or_else(|| {
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "unknown".to_string())
            });

            let landmarks = tokio::task::spawn_blocking(move || {
                landmark::extract_or_empty(&audio_bytes, Profile::Ingestion)
            })
            .await?;

            let song_id = db
                .ingest(&song_name, &path.to_string_lossy(), &landmarks)
                .await?;
            println!(
                "added '{}' as song {} with {} landmarks",
                song_name,
                song_id,
                landmarks.len()
            );
        }
        Command::Match { path } => {
            let audio_bytes = std::fs::read(&path)
                .with_context(|| format!("reading {}", path.display()))?;

            let landmarks = tokio::task::spawn_blocking(move || {
                landmark::extract_or_empty(&audio_bytes, Profile::Query)
            })
            .await?;

            let outcome = matching::best_match(&db, &landmarks).await?;
            let match_found =
                outcome.song_name.is_some() && outcome.score >= config.match_threshold;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "song": outcome.song_name,
                    "confidence": outcome.score,
                    "offset": outcome.offset,
                    "match_found": match_found,
                }))?
            );
        }
    }

    Ok(())
}
