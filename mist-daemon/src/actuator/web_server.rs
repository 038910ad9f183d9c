//! Actuator log server: valve status, flow and work-log endpoints.
//!
//! Read-only except for the log clear, which only empties the in-memory
//! journal. The WebUI proxies these endpoints for the dashboard.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::info;

use mist_core::notify::NullEventSink;
use mist_core::{FlowMonitor, ValveController, WorkLog, WorkLogEntry};
use mist_error::{CoolerError, Result};
use mist_protocol::ValveState;

use crate::shutdown::Shutdown;

#[derive(Clone)]
pub struct WebState {
    pub valve: Arc<ValveController>,
    pub monitor: Arc<FlowMonitor>,
    pub work_log: WorkLog,
    pub event_counter: Arc<NullEventSink>,
}

#[derive(Serialize)]
struct ValveStatusResponse {
    state: &'static str,
    state_value: u8,
    duration: f64,
}

#[derive(Serialize)]
struct FlowResponse {
    flow: f32,
}

#[derive(Serialize)]
struct LogResponse {
    log: Vec<WorkLogEntry>,
}

#[derive(Serialize)]
struct EventResponse {
    count: u64,
}

#[derive(Serialize)]
struct ResultResponse {
    result: &'static str,
}

async fn api_valve_status(State(state): State<WebState>) -> Json<ValveStatusResponse> {
    let status = state.valve.get_status().unwrap_or(mist_protocol::ValveStatus {
        state: ValveState::Close,
        duration_sec: 0.0,
    });
    Json(ValveStatusResponse {
        state: status.state.name(),
        state_value: status.state.as_u8(),
        duration: status.duration_sec,
    })
}

async fn api_get_flow(State(state): State<WebState>) -> Json<FlowResponse> {
    let flow = state
        .monitor
        .last_condition()
        .and_then(|c| c.flow)
        .unwrap_or(0.0);
    Json(FlowResponse { flow })
}

async fn api_log_view(State(state): State<WebState>) -> Json<LogResponse> {
    Json(LogResponse {
        log: state.work_log.entries(),
    })
}

async fn api_log_clear(State(state): State<WebState>) -> Json<ResultResponse> {
    state.work_log.clear();
    Json(ResultResponse { result: "ok" })
}

async fn api_event(State(state): State<WebState>) -> Json<EventResponse> {
    Json(EventResponse {
        count: state.event_counter.count(),
    })
}

pub fn build_router(state: WebState) -> Router {
    Router::new()
        .route("/api/valve_status", get(api_valve_status))
        .route("/api/get_flow", get(api_get_flow))
        .route("/api/log_view", get(api_log_view))
        .route("/api/log_clear", get(api_log_clear))
        .route("/api/event", get(api_event))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the log endpoints until shutdown.
pub async fn run(port: u16, state: WebState, shutdown: Shutdown) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| CoolerError::transport(format!("bind log port {port} failed: {e}")))?;
    info!("Log server listening on port {port}");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            while !shutdown.is_triggered() {
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            }
        })
        .await
        .map_err(|e| CoolerError::DownstreamIo(format!("log server failed: {e}")))
}
