//! # seed
//!
//! Replays a JSON activity fixture through the engine over an in-memory
//! store, then prints the reconciliation report.
//!
//! ```bash
//! seed [FIXTURE] [--from SNAPSHOT] [--save SNAPSHOT] [--repair]
//! ```
//!
//! `FIXTURE` defaults to `fixtures/activity.json`.

mod activity;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use configs::{LogFormat, LogSettings, Settings};
use services::{Engine, EngineOptions, PageLimits};
use storage_adapters::MemoryStore;

use crate::activity::Activity;

/// Replays an activity fixture and reports counter drift.
#[derive(Parser, Debug)]
#[command(name = "seed", version, about)]
struct Args {
    /// Activity fixture to replay
    #[arg(default_value = "fixtures/activity.json")]
    fixture: PathBuf,

    /// Restore the store from this snapshot before replaying
    #[arg(long, value_name = "SNAPSHOT")]
    from: Option<PathBuf>,

    /// Write the store to this snapshot after replaying
    #[arg(long, value_name = "SNAPSHOT")]
    save: Option<PathBuf>,

    /// Repair drifted counters instead of only auditing them
    #[arg(long)]
    repair: bool,
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let registry = tracing_subscriber::registry().with(filter);
    match log.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn engine_options(settings: &Settings) -> Result<EngineOptions> {
    Ok(EngineOptions {
        text_limits: settings.text_limits(),
        page_limits: PageLimits {
            default_page_size: settings.feed.default_page_size,
            max_page_size: settings.feed.max_page_size,
        },
        day_offset: settings.streak.day_offset()?,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Settings and logging
    let settings = Settings::load().context("loading settings")?;
    init_tracing(&settings.log);
    let args = Args::parse();

    // 2. Store, optionally restored from an earlier run
    let store = match &args.from {
        Some(path) => MemoryStore::load_json(path)
            .with_context(|| format!("restoring snapshot {}", path.display()))?,
        None => MemoryStore::new(),
    };
    let engine = Engine::new(Arc::new(store.clone()), engine_options(&settings)?);

    // 3. Replay
    let activity = Activity::load(&args.fixture)?;
    let stats = activity::replay(&engine, activity).await?;
    info!(applied = stats.applied, skipped = stats.skipped, fixture = %args.fixture.display(), "replay finished");

    // 4. Reconciliation
    let report = if args.repair {
        serde_json::to_string_pretty(&engine.reconciler.repair().await?)?
    } else {
        serde_json::to_string_pretty(&engine.reconciler.audit().await?)?
    };
    println!("{report}");

    if let Some(path) = &args.save {
        store
            .save_json(path)
            .with_context(|| format!("saving snapshot {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn fixture_defaults_and_flags_parse() {
        let args = Args::try_parse_from(["seed"]).unwrap();
        assert_eq!(args.fixture, PathBuf::from("fixtures/activity.json"));
        assert!(args.from.is_none() && args.save.is_none() && !args.repair);

        let args = Args::try_parse_from([
            "seed", "week.json", "--from", "in.json", "--save", "out.json", "--repair",
        ])
        .unwrap();
        assert_eq!(args.fixture, PathBuf::from("week.json"));
        assert_eq!(args.from, Some(PathBuf::from("in.json")));
        assert_eq!(args.save, Some(PathBuf::from("out.json")));
        assert!(args.repair);
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(Args::try_parse_from(["seed", "--verbose"]).is_err());
    }
}
