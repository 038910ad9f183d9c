//! Last-value caching proxy.
//!
//! Sits between the publisher and late subscribers: keeps the most recent
//! payload per topic and replays it to every newly-connected downstream
//! subscriber, so dashboards and actuators that start after the controller
//! see state immediately instead of waiting out the next emission.
//!
//! Cache and forwarder are one task driven by a multi-source select;
//! splitting them would lose the atomicity of (cache-update, forward) and
//! (subscribe, send-cached).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use mist_error::{CoolerError, Result};
use mist_protocol::{decode_frame, encode_frame};

use crate::shutdown::Shutdown;
use crate::transport::read_line_bounded;

/// Select tick driving idle-timeout and shutdown checks.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Reconnect backoff towards the upstream publisher.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

struct ProxyState {
    downstream: Vec<TcpStream>,
    cache: HashMap<String, String>,
    /// A downstream subscriber has connected at least once
    subscribed: bool,
    /// Downstream deliveries counted towards msg_count
    proxy_count: u32,
    idle_start: Option<Instant>,
}

impl ProxyState {
    fn new() -> Self {
        Self {
            downstream: Vec::new(),
            cache: HashMap::new(),
            subscribed: false,
            proxy_count: 0,
            idle_start: None,
        }
    }

    async fn broadcast(&mut self, line: &str) {
        let mut frame = line.to_string();
        frame.push('\n');

        let mut alive = Vec::with_capacity(self.downstream.len());
        for mut stream in self.downstream.drain(..) {
            match stream.write_all(frame.as_bytes()).await {
                Ok(()) => alive.push(stream),
                Err(e) => info!("Client unsubscribed: {e}"),
            }
        }
        self.downstream = alive;
    }

    /// Register a new downstream subscriber and replay the cache to it.
    async fn subscribe(&mut self, mut stream: TcpStream) {
        info!("New client subscribed.");
        self.subscribed = true;

        let mut replayed = 0;
        for (topic, payload) in &self.cache {
            let mut frame = encode_frame(topic, payload);
            frame.push('\n');
            if let Err(e) = stream.write_all(frame.as_bytes()).await {
                info!("Client unsubscribed during replay: {e}");
                return;
            }
            replayed += 1;
        }

        if replayed > 0 {
            info!("Send cache");
            self.proxy_count += replayed;
        } else {
            warn!("Cache is empty");
        }

        self.downstream.push(stream);
    }
}

/// Run the caching proxy until shutdown, `msg_count` downstream deliveries,
/// or `idle_timeout_sec` without upstream traffic (armed only once the
/// cache holds its first payload; downstream traffic does not reset it).
pub async fn run_proxy(
    server_host: &str,
    server_port: u16,
    proxy_port: u16,
    msg_count: u32,
    idle_timeout_sec: u32,
    shutdown: Shutdown,
) -> Result<()> {
    info!("Start proxy server (front: {server_host}:{server_port}, port: {proxy_port})...");

    let listener = TcpListener::bind(("0.0.0.0", proxy_port))
        .await
        .map_err(|e| CoolerError::transport(format!("bind port {proxy_port} failed: {e}")))?;

    let mut state = ProxyState::new();

    'outer: while !shutdown.is_triggered() {
        let upstream = match TcpStream::connect((server_host, server_port)).await {
            Ok(stream) => stream,
            Err(e) => {
                debug!("Upstream not reachable ({e}), retrying...");
                // Keep serving subscribe events while the publisher is away.
                tokio::select! {
                    accepted = listener.accept() => {
                        if let Ok((stream, _)) = accepted {
                            state.subscribe(stream).await;
                        }
                    }
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
                if reached_count(&state, msg_count) {
                    break 'outer;
                }
                continue;
            }
        };
        info!("Connected to upstream publisher.");
        let mut reader = BufReader::new(upstream);
        let mut line_buf: Vec<u8> = Vec::new();

        loop {
            if shutdown.is_triggered() {
                break 'outer;
            }

            tokio::select! {
                read = read_line_bounded(&mut reader, &mut line_buf) => {
                    match read {
                        Ok(0) => {
                            debug!("Upstream closed, reconnecting...");
                            break;
                        }
                        Ok(_) => {
                            let line = String::from_utf8_lossy(&line_buf).into_owned();
                            line_buf.clear();
                            let line = line.trim_end_matches(['\r', '\n']);
                            let Some(frame) = decode_frame(line) else {
                                warn!("Malformed frame from upstream, skipping");
                                continue;
                            };

                            debug!("Store cache");
                            state.cache.insert(frame.topic.to_string(), frame.payload.to_string());
                            state.idle_start = None;

                            debug!("Proxy message");
                            state.broadcast(line).await;
                            if state.subscribed {
                                state.proxy_count += 1;
                            }

                            if reached_count(&state, msg_count) {
                                break 'outer;
                            }
                        }
                        Err(e) => {
                            warn!("Upstream read failed ({e}), reconnecting...");
                            break;
                        }
                    }
                }
                accepted = listener.accept() => {
                    if let Ok((stream, _)) = accepted {
                        state.subscribe(stream).await;
                        if reached_count(&state, msg_count) {
                            break 'outer;
                        }
                    }
                }
                _ = tokio::time::sleep(POLL_INTERVAL) => {
                    if idle_expired(&mut state, idle_timeout_sec) {
                        info!("Terminate due to idle timeout ({idle_timeout_sec} sec).");
                        break 'outer;
                    }
                }
            }
        }
    }

    warn!("Stop proxy server");
    Ok(())
}

fn reached_count(state: &ProxyState, msg_count: u32) -> bool {
    if msg_count != 0 {
        debug!("(proxy_count, msg_count) = ({}, {msg_count})", state.proxy_count);
        if state.proxy_count >= msg_count {
            info!("Terminate, because the specified number of times has been reached.");
            return true;
        }
    }
    false
}

/// The idle timer arms once the cache has received its first payload and
/// resets on upstream traffic only.
fn idle_expired(state: &mut ProxyState, idle_timeout_sec: u32) -> bool {
    if idle_timeout_sec == 0 || state.cache.is_empty() {
        return false;
    }
    match state.idle_start {
        None => {
            state.idle_start = Some(Instant::now());
            false
        }
        Some(start) => start.elapsed().as_secs_f64() > f64::from(idle_timeout_sec),
    }
}
