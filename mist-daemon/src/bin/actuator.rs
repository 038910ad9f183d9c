//! Actuator daemon: drives the solenoid valve from the control stream.
//!
//! Spawns the subscribe/control/monitor workers plus the log web server,
//! and tears everything down on SIGINT/SIGTERM or an exhausted message
//! count. The valve is always left CLOSE on the way out.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use mist_core::notify::NullEventSink;
use mist_core::{
    Config, DedupNotifier, DigitalOutput, DummyFlowSensor, FlowMonitor, HazardRegistry,
    LogNotifier, MemoryOutput, RuntimeSettings, SysfsOutput, ValveController, WorkLog,
};
use mist_daemon::actuator::{self, web_server, ActuatorContext};
use mist_daemon::cli::{env_flag, env_or, Args};
use mist_daemon::shutdown::Shutdown;
use mist_daemon::logging;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    eprintln!("actuator {VERSION} - Mistcool valve actuator");
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    actuator [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c CONFIG   Config file [default: config.json]");
    eprintln!("    -s HOST     Controller host [default: localhost]");
    eprintln!("    -p PORT     Controller pub/sub port [default: 2222]");
    eprintln!("    -l PORT     Log web server port [default: 5001]");
    eprintln!("    -S PORT     ActuatorStatus publish port (0 = disabled) [default: 0]");
    eprintln!("    -n COUNT    Stop after COUNT control messages (0 = unbounded) [default: 0]");
    eprintln!("    -t SPEEDUP  Time acceleration factor [default: 1]");
    eprintln!("    -d          Dummy mode (no hardware)");
    eprintln!("    -D          Debug logging");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    MISTCOOL_LOG          Log level");
    eprintln!("    HEMS_CONTROL_HOST     Overrides -s");
    eprintln!("    HEMS_PUB_PORT         Overrides -p");
    eprintln!("    HEMS_LOG_PORT         Overrides -l");
    eprintln!("    HEMS_STATUS_PUB_PORT  Overrides -S");
    eprintln!("    DUMMY_MODE            true overrides -d");
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let mut config_file = "config.json".to_string();
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
                return;
            }
            "-v" | "--version" => {
                println!("actuator {VERSION}");
                return;
            }
            "-c" => config_file = args.value("-c"),
            "-s" => settings.control_host = args.value("-s"),
            "-p" => settings.pub_port = args.parse_value("-p"),
            "-l" => settings.log_port = args.parse_value("-l"),
            "-S" => settings.status_pub_port = args.parse_value("-S"),
            "-n" => settings.msg_count = args.parse_value("-n"),
            "-t" => settings.speedup = args.parse_value("-t"),
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
    info!("STARTUP: actuator {VERSION} starting");
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
    } else {
        // The serial flow-sensor driver is injected at this seam; this
        // build ships the valve-tracking dummy.
        warn!("No serial flow-sensor driver built in, using the dummy flow sensor");
    }

    let shutdown = Shutdown::new();
    shutdown.install_signal_handler();

    let notifier = Arc::new(DedupNotifier::new(
        Arc::new(LogNotifier),
        Duration::from_secs(10 * 60),
    ));
    let event_counter = Arc::new(NullEventSink::new());
    let work_log = WorkLog::new(notifier, event_counter.clone());

    info!("Initialize valve");
    let output: Arc<dyn DigitalOutput> = if settings.dummy_mode {
        Arc::new(MemoryOutput::new())
    } else {
        match SysfsOutput::new(config.actuator.control.valve.pin_no) {
            Ok(output) => Arc::new(output),
            Err(e) => {
                error!("Could not initialize GPIO: {e}");
                std::process::exit(1);
            }
        }
    };

    let valve = match ValveController::new(output.clone(), &config.stat_dir, work_log.clone()) {
        Ok(valve) => Arc::new(valve),
        Err(e) => {
            error!("Could not initialize valve controller: {e}");
            std::process::exit(1);
        }
    };

    let hazard = Arc::new(HazardRegistry::new(
        &config.actuator.control.hazard.file,
        work_log.clone(),
    ));

    let sensor = Arc::new(DummyFlowSensor::new(output));
    let monitor = Arc::new(FlowMonitor::new(
        sensor,
        valve.clone(),
        hazard.clone(),
        work_log.clone(),
        config.actuator.monitor.clone(),
    ));

    let ctx = ActuatorContext {
        config,
        settings: settings.clone(),
        valve: valve.clone(),
        hazard,
        monitor: monitor.clone(),
        work_log: work_log.clone(),
        event_counter: event_counter.clone(),
        queue: actuator::new_message_queue(),
        last_message: Arc::new(Mutex::new(None)),
    };

    let test_mode = std::env::var("TEST").map(|v| v == "true").unwrap_or(false);
    if !ctx.settings.dummy_mode && !test_mode {
        actuator::wait_before_start(&ctx.config, &shutdown).await;
    }

    info!("Starting log server on port {}", settings.log_port);
    let web_state = web_server::WebState {
        valve,
        monitor,
        work_log,
        event_counter,
    };
    let web_shutdown = shutdown.clone();
    let web_handle = tokio::spawn(web_server::run(settings.log_port, web_state, web_shutdown));

    let ret = actuator::run(ctx, shutdown.clone()).await;

    shutdown.trigger();
    if let Err(e) = web_handle.await {
        error!("Log server task failed: {e}");
    }

    if ret != 0 {
        error!("Terminating with error");
        std::process::exit(ret);
    }
    info!("SHUTDOWN: actuator terminated cleanly");
}
