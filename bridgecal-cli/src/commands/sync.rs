use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use bridgecal_core::{
    AdapterProcess, AppConfig, BridgeCalError, MappingStore, Origin, SyncEngine, TickDriver,
};
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::logging;

pub async fn run(
    once: bool,
    daemon: bool,
    interval: Option<u64>,
    config: Option<&Path>,
    debug: bool,
) -> i32 {
    if once && daemon {
        eprintln!("{}", "Use either --once or --daemon, not both.".red());
        return 2;
    }

    logging::init(debug);

    match run_inner(once, interval, config).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{}", format!("{error:#}").red());
            exit_code_for(&error)
        }
    }
}

async fn run_inner(once: bool, interval: Option<u64>, config: Option<&Path>) -> Result<i32> {
    let mut cfg = AppConfig::load(config)?;
    if let Some(seconds) = interval {
        if seconds == 0 {
            return Err(
                BridgeCalError::Config("--interval must be greater than 0".to_string()).into(),
            );
        }
        cfg.sync.interval_seconds = seconds;
    }

    let store = MappingStore::open(&cfg.store_path())
        .with_context(|| format!("opening mapping store at {}", cfg.store_path().display()))?;

    let timeout = Duration::from_secs(cfg.adapters.timeout_seconds);
    let outlook =
        AdapterProcess::new(Origin::Outlook, cfg.adapters.outlook_command.clone(), timeout);
    let google = AdapterProcess::new(Origin::Google, cfg.adapters.google_command.clone(), timeout);

    let engine = SyncEngine::new(outlook, google, store, cfg.sync.redaction_mode);
    let mut driver = TickDriver::new(
        engine,
        cfg.window.clone(),
        Duration::from_secs(cfg.sync.interval_seconds),
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, finishing current pass");
                cancel.cancel();
            }
        }
    });

    if once {
        let summary = driver.run_once(&cancel).await?;
        println!("sync: {summary}");
        if summary.errors > 0 && summary.writes() == 0 {
            Ok(4)
        } else {
            Ok(0)
        }
    } else {
        driver.run_loop(&cancel).await?;
        info!("sync daemon stopped");
        Ok(0)
    }
}

fn exit_code_for(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<BridgeCalError>()
        .map(BridgeCalError::exit_code)
        .unwrap_or(4)
}
