//! Secondary status publisher (actuator → WebUI).

use chrono::Utc;
use tracing::{debug, error};

use mist_core::MistCondition;
use mist_protocol::{ActuatorStatus, STATUS_TOPIC};

use super::ActuatorContext;
use crate::transport::PubSocket;

/// Build the status message for the current observation.
pub fn build_status(ctx: &ActuatorContext, condition: &MistCondition) -> ActuatorStatus {
    let cooling_mode_index = ctx
        .last_message
        .lock()
        .as_ref()
        .map(|m| m.mode_index)
        .unwrap_or(0);

    ActuatorStatus {
        timestamp: Utc::now(),
        valve: condition.valve,
        flow_lpm: condition.flow,
        cooling_mode_index,
        hazard_detected: ctx.hazard.is_latched(),
    }
}

/// Publish one status message on the secondary topic.
pub async fn publish(socket: &mut PubSocket, ctx: &ActuatorContext, condition: &MistCondition) {
    socket.accept_pending().await;

    let status = build_status(ctx, condition);
    match status.to_json() {
        Ok(json) => {
            debug!("Published ActuatorStatus: {json}");
            socket.publish(STATUS_TOPIC, &json).await;
        }
        Err(e) => error!("Failed to encode ActuatorStatus: {e}"),
    }
}
