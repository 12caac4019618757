use std::path::Path;
use std::time::Duration;

use bridgecal_core::adapter::{AdapterError, CalendarAdapter};
use bridgecal_core::{AdapterProcess, AppConfig, BridgeCalError, BridgeCalResult, MappingStore, Origin};
use chrono::Utc;
use owo_colors::OwoColorize;

use crate::logging;

/// Validate Outlook adapter access, Google adapter access, and local state
/// persistence. Exits with the highest-priority failure code: 2 over 3
/// over 4.
pub async fn run(config: Option<&Path>, debug: bool) -> i32 {
    logging::init(debug);

    let cfg = match AppConfig::load(config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}", e.to_string().red());
            return e.exit_code();
        }
    };

    let mut failures: Vec<(i32, String)> = Vec::new();
    let timeout = Duration::from_secs(cfg.adapters.timeout_seconds);

    let outlook =
        AdapterProcess::new(Origin::Outlook, cfg.adapters.outlook_command.clone(), timeout);
    match outlook.health_check().await {
        Ok(()) => println!("{} Outlook adapter access", "[ok]".green()),
        Err(e) => failures.push((adapter_code(&e), format!("Outlook check failed: {e}"))),
    }

    let google = AdapterProcess::new(Origin::Google, cfg.adapters.google_command.clone(), timeout);
    match google.health_check().await {
        Ok(()) => println!("{} Google adapter auth + access", "[ok]".green()),
        Err(e) => failures.push((adapter_code(&e), format!("Google check failed: {e}"))),
    }

    match probe_store(&cfg) {
        Ok(()) => println!("{} state.db writable", "[ok]".green()),
        Err(e) => failures.push((2, format!("state.db check failed: {e}"))),
    }

    if failures.is_empty() {
        println!("doctor: all checks passed");
        return 0;
    }

    for (_, message) in &failures {
        eprintln!("{} {message}", "[fail]".red());
    }

    if failures.iter().any(|(code, _)| *code == 2) {
        2
    } else if failures.iter().any(|(code, _)| *code == 3) {
        3
    } else {
        4
    }
}

fn probe_store(cfg: &AppConfig) -> BridgeCalResult<()> {
    let store = MappingStore::open(&cfg.store_path())?;
    let stamp = Utc::now().to_rfc3339();
    store.set_cursor("doctor.last_write", &stamp)?;
    match store.get_cursor("doctor.last_write")? {
        Some(observed) if observed == stamp => Ok(()),
        _ => Err(BridgeCalError::Config(
            "state.db round-trip mismatch".to_string(),
        )),
    }
}

fn adapter_code(error: &AdapterError) -> i32 {
    match error {
        AdapterError::Config(_) => 2,
        AdapterError::Auth(_) => 3,
        _ => 4,
    }
}
