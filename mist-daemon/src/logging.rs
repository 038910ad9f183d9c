//! Logging initialization for the daemon binaries.
//!
//! Journald when running under systemd, stdout otherwise. Level comes from
//! `MISTCOOL_LOG`, overridden to `debug` by the `-D` flag.

use std::path::Path;

/// Initialize the global tracing subscriber.
pub fn init(debug_mode: bool) {
    let log_level = if debug_mode {
        "debug".to_string()
    } else {
        std::env::var("MISTCOOL_LOG").unwrap_or_else(|_| "info".to_string())
    };

    let use_journald = Path::new("/run/systemd/journal/socket").exists();

    if use_journald {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(&log_level))
                    .init();
                return;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {e}, falling back to stdout");
            }
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(log_level.as_str())
        .init();
}
