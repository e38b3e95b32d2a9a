//! Maintenance commands for playlist order keys
//!
//! ```text
//! playlist-order [--config <file>] backfill
//! playlist-order [--config <file>] rebalance <playlist-id>
//! ```
//!
//! The config file may also be given through `PLAYLIST_ORDER_CONFIG`.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use playlist_order::telemetry::init_tracing;
use playlist_order::{ContainerId, OrderConfig, OrderMaintainer, SqliteStore};

const USAGE: &str =
    "usage: playlist-order [--config <file>] <backfill | rebalance <playlist-id>>";

enum Command {
    Backfill,
    Rebalance(ContainerId),
}

struct Args {
    config_path: Option<PathBuf>,
    command: Command,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut args = args.into_iter();
    let mut config_path = std::env::var_os("PLAYLIST_ORDER_CONFIG").map(PathBuf::from);
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            match args.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => bail!("--config needs a file path\n{USAGE}"),
            }
        } else if arg.starts_with('-') {
            bail!("unknown option {arg}\n{USAGE}");
        } else {
            positional.push(arg);
        }
    }

    let command = match positional.as_slice() {
        [cmd] if cmd == "backfill" => Command::Backfill,
        [cmd, id] if cmd == "rebalance" => Command::Rebalance(
            id.parse()
                .with_context(|| format!("invalid playlist id {id}"))?,
        ),
        _ => bail!("{USAGE}"),
    };

    Ok(Args {
        config_path,
        command,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let args = parse_args(std::env::args().skip(1))?;
    let config = match &args.config_path {
        Some(path) => OrderConfig::load_from_file(path)?,
        None => OrderConfig::default(),
    };

    let store = SqliteStore::connect(&config.database)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.url))?;
    let maintainer = OrderMaintainer::with_config(Arc::new(store.clone()), config);

    let result = run(&maintainer, args.command).await;
    store.close().await;
    result
}

async fn run(maintainer: &OrderMaintainer, command: Command) -> Result<()> {
    match command {
        Command::Backfill => {
            let report = maintainer.backfill_all().await?;
            tracing::info!(
                containers = report.assigned.len(),
                assigned = report.total_assigned(),
                failed = report.failures.len(),
                "Backfill finished"
            );
            if !report.is_complete() {
                bail!(
                    "backfill failed for {} playlist(s); rerun to retry",
                    report.failures.len()
                );
            }
        }
        Command::Rebalance(playlist) => {
            let assigned = maintainer.rebalance(&playlist).await?;
            for (song, key) in &assigned {
                println!("{song}\t{key}");
            }
        }
    }
    Ok(())
}
