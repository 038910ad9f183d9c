//! Liveness probe.
//!
//! Checks the per-worker liveness markers for one of the three processes
//! and, for the WebUI, that the HTTP port answers. Exit 0 healthy, -1 not.

use tracing::{error, info};

use mist_core::{check_http_port, check_liveness_all, Config, HealthzTarget};
use mist_daemon::cli::Args;
use mist_daemon::logging;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    eprintln!("healthz {VERSION} - Mistcool liveness probe");
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    healthz [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c CONFIG          Config file [default: config.json]");
    eprintln!("    -m (CTRL|ACT|WEB)  Which process to check [default: CTRL]");
    eprintln!("    -p PORT            HTTP port probed in WEB mode [default: 5000]");
    eprintln!("    -D                 Debug logging");
}

fn liveness_targets(config: &Config, mode: &str) -> Vec<HealthzTarget> {
    // The subscribe workers refresh on every received message, so their
    // freshness window is the controller's publish interval.
    let default_interval = config.controller.interval_sec;

    match mode {
        "CTRL" => vec![HealthzTarget::new(
            "controller",
            &config.controller.liveness.file,
            config.controller.interval_sec,
        )],
        "WEB" => vec![HealthzTarget::new(
            "webui - subscribe",
            &config.webui.subscribe.liveness.file,
            default_interval,
        )],
        _ => vec![
            HealthzTarget::new(
                "actuator - subscribe",
                &config.actuator.subscribe.liveness.file,
                default_interval,
            ),
            HealthzTarget::new(
                "actuator - control",
                &config.actuator.control.liveness.file,
                config.actuator.control.interval_sec,
            ),
            HealthzTarget::new(
                "actuator - monitor",
                &config.actuator.monitor.liveness.file,
                config.actuator.monitor.interval_sec,
            ),
        ],
    }
}

fn main() {
    let mut config_file = "config.json".to_string();
    let mut mode = "CTRL".to_string();
    let mut port: u16 = 5000;
    let mut debug_mode = false;

    let mut args = Args::from_env();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                return;
            }
            "-v" | "--version" => {
                println!("healthz {VERSION}");
                return;
            }
            "-c" => config_file = args.value("-c"),
            "-m" => mode = args.value("-m"),
            "-p" => port = args.parse_value("-p"),
            "-D" => debug_mode = true,
            arg => {
                eprintln!("Unknown argument: {arg}");
                print_help();
                std::process::exit(1);
            }
        }
    }

    logging::init(debug_mode);

    let config = match Config::load(&config_file) {
        Ok(config) => config,
        Err(e) => {
            error!("Could not load config {config_file}: {e}");
            std::process::exit(1);
        }
    };

    info!("Mode: {mode}");
    let targets = liveness_targets(&config, &mode);

    let failed = check_liveness_all(&targets);
    if !failed.is_empty() {
        error!("Dead workers: {}", failed.join(", "));
        std::process::exit(-1);
    }

    // Only the WebUI exposes a port worth probing from here.
    if mode == "WEB" && !check_http_port("localhost", port) {
        std::process::exit(-1);
    }

    info!("OK.");
}
