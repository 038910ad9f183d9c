//! Actuator supervisor: subscribe, control and monitor workers.
//!
//! Each worker touches its liveness marker after every successful
//! iteration, checks the shared shutdown event at least once a second and
//! catches its own errors at the loop boundary; no error crosses into
//! another worker. The join step bounds each worker's shutdown at 5 s.

pub mod control;
pub mod status;
pub mod web_server;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use mist_core::constants::{MESSAGE_QUEUE_BOUND, WORKER_JOIN_TIMEOUT};
use mist_core::{footprint, Config, FlowMonitor, HazardRegistry, RuntimeSettings, ValveController, WorkLog};
use mist_core::notify::NullEventSink;
use mist_protocol::{ControlMessage, PUBSUB_TOPIC};

use crate::shutdown::Shutdown;
use crate::transport;

use control::ControlWorker;

/// Bounded single-producer/single-consumer queue between the subscribe and
/// control workers. When full the oldest entry is dropped so the newest
/// decision always wins.
pub type MessageQueue = Arc<Mutex<VecDeque<ControlMessage>>>;

/// Everything the actuator workers share.
#[derive(Clone)]
pub struct ActuatorContext {
    pub config: Config,
    pub settings: RuntimeSettings,
    pub valve: Arc<ValveController>,
    pub hazard: Arc<HazardRegistry>,
    pub monitor: Arc<FlowMonitor>,
    pub work_log: WorkLog,
    pub event_counter: Arc<NullEventSink>,
    pub queue: MessageQueue,
    /// Most recently applied control message, shared with the status
    /// publisher and the web server
    pub last_message: Arc<Mutex<Option<ControlMessage>>>,
}

pub fn new_message_queue() -> MessageQueue {
    Arc::new(Mutex::new(VecDeque::with_capacity(MESSAGE_QUEUE_BOUND)))
}

/// Enqueue a received message, dropping the oldest entry when full, and
/// touch the subscribe liveness marker.
pub fn queue_put(queue: &MessageQueue, message: ControlMessage, liveness_file: &std::path::Path) {
    {
        let mut queue = queue.lock();
        if queue.len() == MESSAGE_QUEUE_BOUND {
            queue.pop_front();
        }
        queue.push_back(message);
    }
    if let Err(e) = footprint::update(liveness_file) {
        warn!("Failed to touch subscribe liveness marker: {e}");
    }
}

/// Hold off touching the valve for one control interval so a replaced
/// instance never fights its predecessor over the solenoid.
pub async fn wait_before_start(config: &Config, shutdown: &Shutdown) {
    let total = config.actuator.control.interval_sec;
    for i in 0..total {
        if shutdown.is_triggered() {
            return;
        }
        info!("Wait for the old instance to finish ({:3} / {:3})", i + 1, total);
        shutdown.sleep(Duration::from_secs(1)).await;
    }
}

async fn subscribe_worker(ctx: ActuatorContext, shutdown: Shutdown) -> i32 {
    info!("Start subscribe worker ({}:{})", ctx.settings.control_host, ctx.settings.pub_port);

    let queue = ctx.queue.clone();
    let liveness_file = ctx.config.actuator.subscribe.liveness.file.clone();

    let result = transport::start_client(
        &ctx.settings.control_host,
        ctx.settings.pub_port,
        PUBSUB_TOPIC,
        ctx.settings.msg_count,
        shutdown.clone(),
        |payload| match ControlMessage::from_json(payload) {
            Ok(message) => queue_put(&queue, message, &liveness_file),
            Err(e) => warn!("Ignoring malformed control message: {e}"),
        },
    )
    .await;

    // A bounded receive count means a test run: once it is exhausted the
    // other workers should drain too.
    if ctx.settings.msg_count != 0 {
        shutdown.trigger();
    }

    match result {
        Ok(()) => 0,
        Err(e) => {
            error!("Subscribe worker failed: {e}");
            -1
        }
    }
}

async fn control_worker(ctx: ActuatorContext, shutdown: Shutdown) -> i32 {
    let interval = Duration::from_secs_f64(
        ctx.settings.effective_interval(ctx.config.actuator.control.interval_sec),
    );
    let mut worker = ControlWorker::new(&ctx);
    let mut ret = 0;

    while !shutdown.is_triggered() {
        if let Err(e) = worker.step() {
            error!("Control worker iteration failed: {e}");
            ctx.work_log.add_with_level(
                format!("Valve control failed: {e}"),
                mist_protocol::LogLevel::Error,
            );
            ret = -1;
        }
        shutdown.sleep(interval).await;
    }

    // Always leave the valve closed on the way out.
    if let Err(e) = ctx.valve.close() {
        error!("Failed to close the valve at shutdown: {e}");
        ret = -1;
    }

    info!("Stop control worker");
    ret
}

async fn monitor_worker(ctx: ActuatorContext, shutdown: Shutdown) -> i32 {
    let interval = Duration::from_secs_f64(
        ctx.settings.effective_interval(ctx.config.actuator.monitor.interval_sec),
    );

    let mut publisher = if ctx.settings.status_pub_port != 0 {
        match transport::PubSocket::bind(ctx.settings.status_pub_port).await {
            Ok(socket) => {
                info!("ActuatorStatus publisher bound to port {}", ctx.settings.status_pub_port);
                Some(socket)
            }
            Err(e) => {
                error!("Failed to bind status publisher: {e}");
                None
            }
        }
    } else {
        None
    };

    let mut ret = 0;
    while !shutdown.is_triggered() {
        match ctx.monitor.tick() {
            Ok(condition) => {
                if let Some(socket) = &mut publisher {
                    status::publish(socket, &ctx, &condition).await;
                }
                if let Err(e) = footprint::update(&ctx.config.actuator.monitor.liveness.file) {
                    warn!("Failed to touch monitor liveness marker: {e}");
                }
            }
            Err(e) => {
                error!("Monitor iteration failed: {e}");
                ret = -1;
            }
        }
        shutdown.sleep(interval).await;
    }

    info!("Stop monitor worker");
    ret
}

/// Spawn the three workers and join them with a bounded timeout. Returns
/// the process exit code (0 clean, -1 when any worker failed).
pub async fn run(ctx: ActuatorContext, shutdown: Shutdown) -> i32 {
    let workers = [
        ("subscribe", tokio::spawn(subscribe_worker(ctx.clone(), shutdown.clone()))),
        ("control", tokio::spawn(control_worker(ctx.clone(), shutdown.clone()))),
        ("monitor", tokio::spawn(monitor_worker(ctx.clone(), shutdown.clone()))),
    ];

    // Workers run until the shared termination event fires (signal or an
    // exhausted message count inside a worker).
    while !shutdown.is_triggered() {
        if workers.iter().all(|(_, handle)| handle.is_finished()) {
            shutdown.trigger();
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    let mut ret = 0;
    for (name, handle) in workers {
        info!("Wait {name} finish");
        match tokio::time::timeout(WORKER_JOIN_TIMEOUT, handle).await {
            Ok(Ok(code)) if code != 0 => {
                error!("Error occurred in {name}");
                ret = -1;
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                error!("{name} worker panicked: {e}");
                ret = -1;
            }
            Err(_) => {
                warn!("{name} worker did not finish in time");
                ret = -1;
            }
        }
    }

    warn!("Terminate actuator");
    ret
}
