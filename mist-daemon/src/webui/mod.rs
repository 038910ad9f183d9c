//! WebUI: read-only HTTP/JSON API for the browser dashboard.
//!
//! Aggregates the last-seen control message and actuator status, serves the
//! watering cost estimate, and proxies the actuator's log endpoints so the
//! dashboard talks to a single origin. JSONP (`?callback=`) is supported
//! for the dashboard's legacy chart loader.

pub mod worker;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use mist_core::{Config, SensorSource};
use mist_error::{CoolerError, Result};
use mist_protocol::{ActuatorStatus, ControlMessage};

use crate::actuator::MessageQueue;
use crate::shutdown::Shutdown;

#[derive(Clone)]
pub struct WebuiState {
    pub config: Config,
    pub queue: MessageQueue,
    pub last_message: Arc<Mutex<Option<ControlMessage>>>,
    pub last_status: Arc<Mutex<Option<ActuatorStatus>>>,
    pub source: Arc<dyn SensorSource>,
    pub actuator_base_url: String,
    pub http: reqwest::Client,
}

#[derive(Debug, Clone, Serialize)]
pub struct WateringInfo {
    pub amount: f64,
    pub price: f64,
}

impl WebuiState {
    /// Drain the queue to the newest message; readers keep a shallow copy.
    fn last_control_message(&self) -> Option<ControlMessage> {
        let mut queue = self.queue.lock();
        let mut last = self.last_message.lock();
        while let Some(message) = queue.pop_front() {
            *last = Some(message);
        }
        last.clone()
    }

    fn watering(&self, day_before: u32) -> Result<WateringInfo> {
        let amount = self.source.day_flow_total(day_before)?;
        Ok(WateringInfo {
            amount,
            price: amount * self.config.controller.watering.unit_price / 1000.0,
        })
    }

    fn watering_list(&self) -> Vec<WateringInfo> {
        (0..10)
            .map(|day| {
                self.watering(day).unwrap_or_else(|e| {
                    warn!("Failed to compute watering for day {day}: {e}");
                    WateringInfo {
                        amount: 0.0,
                        price: 0.0,
                    }
                })
            })
            .collect()
    }
}

/// Wrap a JSON value as JSONP when a `callback` query parameter is present.
fn jsonp(params: &HashMap<String, String>, value: serde_json::Value) -> Response {
    match params.get("callback") {
        Some(callback) => {
            let body = format!("{callback}({value});");
            ([(header::CONTENT_TYPE, "application/javascript")], body).into_response()
        }
        None => axum::Json(value).into_response(),
    }
}

async fn api_stat(
    State(state): State<WebuiState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let message = state.last_control_message();
    let actuator_status = state.last_status.lock().clone();
    let watering = state.watering(0).ok();

    let value = match &message {
        Some(message) => json!({
            "watering": watering,
            "sensor": &message.sense_data,
            "mode": message,
            "cooler_status": &message.cooler_status,
            "outdoor_status": &message.outdoor_status,
            "actuator_status": actuator_status,
        }),
        None => json!({
            "watering": watering,
            "sensor": {},
            "mode": null,
            "cooler_status": null,
            "outdoor_status": null,
            "actuator_status": actuator_status,
        }),
    };

    jsonp(&params, value)
}

async fn api_watering(
    State(state): State<WebuiState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    jsonp(&params, json!({ "watering": state.watering_list() }))
}

/// Forward a GET to the actuator log server and relay the JSON body.
async fn proxy_get(state: &WebuiState, path: &str) -> Response {
    let url = format!("{}{path}", state.actuator_base_url);
    match state.http.get(&url).send().await {
        Ok(response) => {
            let status = StatusCode::from_u16(response.status().as_u16())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            match response.text().await {
                Ok(body) => (
                    status,
                    [(header::CONTENT_TYPE, "application/json")],
                    body,
                )
                    .into_response(),
                Err(e) => proxy_error(&url, &e.to_string()),
            }
        }
        Err(e) => proxy_error(&url, &e.to_string()),
    }
}

fn proxy_error(url: &str, reason: &str) -> Response {
    error!("Proxy request to {url} failed: {reason}");
    (
        StatusCode::BAD_GATEWAY,
        axum::Json(json!({ "error": reason })),
    )
        .into_response()
}

macro_rules! proxy_route {
    ($name:ident, $path:literal) => {
        async fn $name(State(state): State<WebuiState>) -> Response {
            proxy_get(&state, $path).await
        }
    };
}

proxy_route!(proxy_valve_status, "/api/valve_status");
proxy_route!(proxy_get_flow, "/api/get_flow");
proxy_route!(proxy_log_view, "/api/log_view");
proxy_route!(proxy_log_clear, "/api/log_clear");
proxy_route!(proxy_event, "/api/event");

pub fn build_router(state: WebuiState) -> Router {
    Router::new()
        .route("/api/stat", get(api_stat))
        .route("/api/watering", get(api_watering))
        .route("/api/valve_status", get(proxy_valve_status))
        .route("/api/get_flow", get(proxy_get_flow))
        .route("/api/log_view", get(proxy_log_view))
        .route("/api/log_clear", get(proxy_log_clear))
        .route("/api/event", get(proxy_event))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the dashboard API until shutdown.
pub async fn run_server(state: WebuiState, shutdown: Shutdown) -> Result<()> {
    let port = state.config.webui.port;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| CoolerError::transport(format!("bind webui port {port} failed: {e}")))?;
    info!("WebUI listening on port {port}");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            while !shutdown.is_triggered() {
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            }
        })
        .await
        .map_err(|e| CoolerError::DownstreamIo(format!("webui server failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::new_message_queue;
    use mist_core::DummySensorSource;

    fn state(dir: &std::path::Path) -> WebuiState {
        WebuiState {
            config: Config::for_state_dir(dir),
            queue: new_message_queue(),
            last_message: Arc::new(Mutex::new(None)),
            last_status: Arc::new(Mutex::new(None)),
            source: Arc::new(DummySensorSource),
            actuator_base_url: "http://localhost:5001".into(),
            http: reqwest::Client::new(),
        }
    }

    #[test]
    fn test_last_control_message_drains_queue() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());

        assert!(state.last_control_message().is_none());

        state.queue.lock().push_back(ControlMessage::idle());
        let mut working = ControlMessage::idle();
        working.mode_index = 4;
        state.queue.lock().push_back(working);

        let message = state.last_control_message().unwrap();
        assert_eq!(message.mode_index, 4);
        assert!(state.queue.lock().is_empty());

        // Still available after the queue went quiet.
        assert_eq!(state.last_control_message().unwrap().mode_index, 4);
    }

    #[test]
    fn test_watering_list_has_ten_days() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let list = state.watering_list();
        assert_eq!(list.len(), 10);
        for info in &list {
            assert!((info.price - info.amount * state.config.controller.watering.unit_price / 1000.0).abs() < 1e-9);
        }
    }
}
