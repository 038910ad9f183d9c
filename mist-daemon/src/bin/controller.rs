//! Cooling controller daemon.
//!
//! Reads sensor snapshots, decides the cooling mode and publishes control
//! messages, re-published through the last-value caching proxy so late
//! subscribers see state immediately.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use mist_core::{Config, DedupNotifier, DummySensorSource, LogNotifier, RuntimeSettings};
use mist_daemon::cli::{env_flag, env_or, Args};
use mist_daemon::shutdown::Shutdown;
use mist_daemon::{controller, logging};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    eprintln!("controller {VERSION} - Mistcool cooling controller");
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    controller [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c CONFIG    Config file [default: config.json]");
    eprintln!("    -p PORT     Pub/sub port served to subscribers [default: 2222]");
    eprintln!("    -r PORT     Port of the real publisher behind the proxy [default: 2200]");
    eprintln!("    -N          Disable the caching proxy");
    eprintln!("    -n COUNT    Stop after COUNT control messages (0 = unbounded) [default: 0]");
    eprintln!("    -t SPEEDUP  Time acceleration factor [default: 1]");
    eprintln!("    -i SEC      Proxy idle timeout in seconds (0 = unbounded) [default: 0]");
    eprintln!("    -d          Dummy mode (random cooling modes)");
    eprintln!("    -D          Debug logging");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    MISTCOOL_LOG   Log level (trace, debug, info, warn, error)");
    eprintln!("    HEMS_PUB_PORT  Overrides -p");
    eprintln!("    DUMMY_MODE     true overrides -d");
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut config_file = "config.json".to_string();
    let mut settings = RuntimeSettings {
        pub_port: env_or("HEMS_PUB_PORT", 2222),
        dummy_mode: env_flag("DUMMY_MODE"),
        ..RuntimeSettings::default()
    };

    let mut args = Args::from_env();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(());
            }
            "-v" | "--version" => {
                println!("controller {VERSION}");
                return Ok(());
            }
            "-c" => config_file = args.value("-c"),
            "-p" => settings.pub_port = args.parse_value("-p"),
            "-r" => settings.real_port = args.parse_value("-r"),
            "-N" => settings.disable_proxy = true,
            "-n" => settings.msg_count = args.parse_value("-n"),
            "-t" => settings.speedup = args.parse_value("-t"),
            "-i" => settings.idle_timeout_sec = args.parse_value("-i"),
            "-d" => settings.dummy_mode = true,
            "-D" => settings.debug_mode = true,
            arg => {
                eprintln!("Unknown argument: {arg}");
                print_help();
                std::process::exit(1);
            }
        }
    }

    logging::init(settings.debug_mode);
    info!("STARTUP: controller {VERSION} starting");

    let config = match Config::load(&config_file) {
        Ok(config) => config,
        Err(e) => {
            error!("Could not load config {config_file}: {e}");
            std::process::exit(1);
        }
    };

    if settings.dummy_mode {
        warn!("DUMMY mode");
        std::env::set_var("DUMMY_MODE", "true");
    } else {
        // The time-series database client is injected at this seam; this
        // build ships the offline source.
        warn!("No database client built in, using the dummy sensor source");
    }

    let shutdown = Shutdown::new();
    shutdown.install_signal_handler();

    let notifier = Arc::new(DedupNotifier::new(
        Arc::new(LogNotifier),
        Duration::from_secs(10 * 60),
    ));
    let source = Arc::new(DummySensorSource);

    controller::run(config, settings, source, notifier, shutdown).await?;

    info!("SHUTDOWN: controller terminated cleanly");
    Ok(())
}
