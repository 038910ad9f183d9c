//! WebUI daemon: read-only dashboard API.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use mist_core::{Config, DummySensorSource, LogNotifier, RuntimeSettings};
use mist_daemon::actuator::new_message_queue;
use mist_daemon::cli::{env_flag, env_or, Args};
use mist_daemon::shutdown::Shutdown;
use mist_daemon::webui::{self, worker, WebuiState};
use mist_daemon::logging;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    eprintln!("webui {VERSION} - Mistcool dashboard API");
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    webui [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c CONFIG   Config file [default: config.json]");
    eprintln!("    -s HOST     Controller host [default: localhost]");
    eprintln!("    -p PORT     Controller pub/sub port [default: 2222]");
    eprintln!("    -a HOST     Actuator host [default: localhost]");
    eprintln!("    -l PORT     Actuator log server port [default: 5001]");
    eprintln!("    -S PORT     ActuatorStatus subscribe port (0 = disabled) [default: 0]");
    eprintln!("    -n COUNT    Stop after COUNT control messages (0 = unbounded) [default: 0]");
    eprintln!("    -d          Dummy mode");
    eprintln!("    -D          Debug logging");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    MISTCOOL_LOG          Log level");
    eprintln!("    HEMS_CONTROL_HOST     Overrides -s");
    eprintln!("    HEMS_PUB_PORT         Overrides -p");
    eprintln!("    HEMS_LOG_PORT         Overrides -l");
    eprintln!("    HEMS_STATUS_PUB_PORT  Overrides -S");
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut config_file = "config.json".to_string();
    let mut actuator_host = env_or("HEMS_ACTUATOR_HOST", "localhost".to_string());
    let mut settings = RuntimeSettings {
        control_host: env_or("HEMS_CONTROL_HOST", "localhost".to_string()),
        pub_port: env_or("HEMS_PUB_PORT", 2222),
        log_port: env_or("HEMS_LOG_PORT", 5001),
        status_pub_port: env_or("HEMS_STATUS_PUB_PORT", 0),
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
                println!("webui {VERSION}");
                return Ok(());
            }
            "-c" => config_file = args.value("-c"),
            "-s" => settings.control_host = args.value("-s"),
            "-p" => settings.pub_port = args.parse_value("-p"),
            "-a" => actuator_host = args.value("-a"),
            "-l" => settings.log_port = args.parse_value("-l"),
            "-S" => settings.status_pub_port = args.parse_value("-S"),
            "-n" => settings.msg_count = args.parse_value("-n"),
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
    info!("STARTUP: webui {VERSION} starting");
    info!("Using pub server of {}:{}", settings.control_host, settings.pub_port);

    let config = match Config::load(&config_file) {
        Ok(config) => config,
        Err(e) => {
            error!("Could not load config {config_file}: {e}");
            std::process::exit(1);
        }
    };

    if settings.dummy_mode {
        warn!("Set dummy mode");
        std::env::set_var("DUMMY_MODE", "true");
    }

    let shutdown = Shutdown::new();
    shutdown.install_signal_handler();

    let state = WebuiState {
        config: config.clone(),
        queue: new_message_queue(),
        last_message: Arc::new(Mutex::new(None)),
        last_status: Arc::new(Mutex::new(None)),
        source: Arc::new(DummySensorSource),
        actuator_base_url: format!("http://{actuator_host}:{}", settings.log_port),
        http: reqwest::Client::new(),
    };

    let subscribe_handle = tokio::spawn(worker::subscribe_worker(
        config.clone(),
        settings.clone(),
        state.queue.clone(),
        Arc::new(LogNotifier),
        shutdown.clone(),
    ));

    let status_handle = (settings.status_pub_port != 0).then(|| {
        tokio::spawn(worker::actuator_status_worker(
            actuator_host.clone(),
            settings.status_pub_port,
            state.last_status.clone(),
            shutdown.clone(),
        ))
    });

    let result = webui::run_server(state, shutdown.clone()).await;

    shutdown.trigger();
    if let Err(e) = subscribe_handle.await {
        error!("Subscribe worker task failed: {e}");
    }
    if let Some(handle) = status_handle {
        if let Err(e) = handle.await {
            error!("Status worker task failed: {e}");
        }
    }

    result?;
    info!("SHUTDOWN: webui terminated cleanly");
    Ok(())
}
