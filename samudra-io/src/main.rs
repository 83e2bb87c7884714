//! SamudraIO - Sonar record relay daemon
//!
//! ## Data Path
//!
//! - **TCP (sonar center)**: subscribed record stream, reconnected on loss
//! - **UDP (relay port)**: peers send any datagram as a heartbeat and receive
//!   one MB1 packet per ping until their tokens run out
//!
//! A recorded capture file can stand in for the sonar center.

use samudra_io::app::build_relay_app;
use samudra_io::config::AppConfig;
use samudra_io::error::{Error, Result};
use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Parse config path from command line arguments.
///
/// Supports:
/// - `samudra-io <path>` (positional)
/// - `samudra-io --config <path>` (flag-based)
/// - `samudra-io -c <path>` (short flag)
///
/// Defaults to `/etc/samudra.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    "/etc/samudra.toml".to_string()
}

fn main() -> Result<()> {
    let config_path = parse_config_path();
    let config = AppConfig::from_file(&config_path);

    // Logger comes first so a bad config is still reported
    let level = config
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    log::info!("SamudraIO v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!("Using config: {}", config_path);
    let config = config.inspect_err(|e| log::error!("Failed to load config: {}", e))?;

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);

    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let mut app = build_relay_app(&config, running)?;

    log::info!("SamudraIO running. Press Ctrl-C to stop.");
    let result = app.run();

    match &result {
        Ok(()) => log::info!("SamudraIO stopped"),
        Err(e) => log::error!("SamudraIO stopped: {}", e),
    }
    result
}
