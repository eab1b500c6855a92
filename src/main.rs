//! Paddock CLI - inspect and manage the motorsport statistics cache
//!
//! Resolves resources through the same orchestrator the game server uses, so
//! the on-disk store can be warmed, checked and purged from a shell.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use paddock::cli::{Cli, Command};
use paddock::Orchestrator;

/// Installs a stderr log subscriber; `RUST_LOG` wins over `level`
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = cli.cache_config();
    let orchestrator = Orchestrator::from_config(&config)?;

    match cli.command {
        Command::Get { target, force } => {
            let key = target.to_key();
            let sweeper = orchestrator.spawn_sweeper();
            let resolved = orchestrator.resolve(&key, force).await;
            if let Some(sweeper) = sweeper {
                sweeper.shutdown().await;
            }
            let resolved = resolved?;

            if resolved.is_stale() {
                tracing::warn!(
                    %key,
                    source = ?resolved.source,
                    fetched_at = %resolved.fetched_at,
                    "API unavailable, serving stored data"
                );
            } else {
                tracing::info!(
                    %key,
                    source = ?resolved.source,
                    fetched_at = %resolved.fetched_at,
                    "resolved"
                );
            }
            println!("{}", serde_json::to_string_pretty(resolved.payload.as_ref())?);
        }
        Command::Fresh { target } => {
            let key = target.to_key();
            println!("{}: {}", key, orchestrator.store_state(&key).await);
        }
        Command::Purge { season } => {
            let removed = match season {
                Some(season) => orchestrator.purge_season(season).await?,
                None => orchestrator.purge_all().await?,
            };
            println!("removed {} stored resource(s)", removed);
        }
    }

    Ok(())
}
