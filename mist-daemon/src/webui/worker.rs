//! WebUI subscribe workers.
//!
//! One worker mirrors the control topic into a bounded queue for the HTTP
//! handlers; an optional second worker tracks the actuator status topic.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use mist_core::{Config, Notifier, RuntimeSettings};
use mist_protocol::{ActuatorStatus, ControlMessage, PUBSUB_TOPIC, STATUS_TOPIC};

use crate::actuator::{queue_put, MessageQueue};
use crate::shutdown::Shutdown;
use crate::transport;

/// Subscribe to control messages and keep the queue fresh.
pub async fn subscribe_worker(
    config: Config,
    settings: RuntimeSettings,
    queue: MessageQueue,
    notifier: Arc<dyn Notifier>,
    shutdown: Shutdown,
) -> i32 {
    info!(
        "Start webui subscribe worker ({}:{})",
        settings.control_host, settings.pub_port
    );

    let liveness_file = config.webui.subscribe.liveness.file.clone();
    let result = transport::start_client(
        &settings.control_host,
        settings.pub_port,
        PUBSUB_TOPIC,
        settings.msg_count,
        shutdown,
        |payload| match ControlMessage::from_json(payload) {
            Ok(message) => {
                info!("Receive message: mode_index={}", message.mode_index);
                queue_put(&queue, message, &liveness_file);
            }
            Err(e) => warn!("Ignoring malformed control message: {e}"),
        },
    )
    .await;

    match result {
        Ok(()) => 0,
        Err(e) => {
            error!("Failed to receive control message: {e}");
            notifier.notify_error(&format!("Failed to receive control message: {e}"));
            -1
        }
    }
}

/// Subscribe to the secondary status topic, keeping the latest
/// `ActuatorStatus` for the HTTP handlers.
pub async fn actuator_status_worker(
    actuator_host: String,
    status_pub_port: u16,
    last_status: Arc<Mutex<Option<ActuatorStatus>>>,
    shutdown: Shutdown,
) -> i32 {
    info!("Start actuator status worker ({actuator_host}:{status_pub_port})");

    let result = transport::start_client(
        &actuator_host,
        status_pub_port,
        STATUS_TOPIC,
        0,
        shutdown,
        |payload| match ActuatorStatus::from_json(payload) {
            Ok(status) => {
                debug!("Receive actuator status: {status:?}");
                *last_status.lock() = Some(status);
            }
            Err(e) => warn!("Ignoring malformed actuator status: {e}"),
        },
    )
    .await;

    match result {
        Ok(()) => 0,
        Err(e) => {
            error!("Failed to receive actuator status: {e}");
            -1
        }
    }
}
