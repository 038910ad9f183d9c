//! Publishing side of the pub/sub fabric.

use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use mist_error::{CoolerError, Result};
use mist_protocol::encode_frame;

use crate::shutdown::Shutdown;
use crate::transport::PROXY_MSG_MARGIN;

/// Per-subscriber write timeout; a stalled subscriber is dropped rather
/// than allowed to stall the emission loop.
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// How long the publisher waits for its first subscriber before emitting
/// into the void.
const FIRST_SUBSCRIBER_TIMEOUT: Duration = Duration::from_secs(1);

/// A bound pub socket fanning frames out to every connected subscriber.
pub struct PubSocket {
    listener: TcpListener,
    subscribers: Vec<TcpStream>,
}

impl PubSocket {
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|e| CoolerError::transport(format!("bind port {port} failed: {e}")))?;
        Ok(Self {
            listener,
            subscribers: Vec::new(),
        })
    }

    /// Actual bound port (useful when binding port 0 in tests).
    pub fn local_port(&self) -> u16 {
        self.listener
            .local_addr()
            .map(|addr| addr.port())
            .unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn register(&mut self, stream: TcpStream) {
        if let Ok(peer) = stream.peer_addr() {
            debug!("New client subscribed: {peer}");
        }
        self.subscribers.push(stream);
    }

    /// Accept connections until one subscriber is present or the timeout
    /// elapses.
    pub async fn wait_first_subscriber(&mut self, shutdown: &Shutdown) {
        info!("Waiting for first client connection...");
        let deadline = Instant::now() + FIRST_SUBSCRIBER_TIMEOUT;

        while self.subscribers.is_empty() && !shutdown.is_triggered() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("Timeout waiting for first client connection.");
                return;
            }
            match timeout(remaining.min(Duration::from_millis(100)), self.listener.accept()).await {
                Ok(Ok((stream, _))) => {
                    info!("First client connected.");
                    self.register(stream);
                }
                Ok(Err(e)) => warn!("Accept failed: {e}"),
                Err(_) => {}
            }
        }
    }

    /// Drain pending connection attempts without blocking.
    pub async fn accept_pending(&mut self) {
        while let Ok(Ok((stream, _))) =
            timeout(Duration::from_millis(1), self.listener.accept()).await
        {
            self.register(stream);
        }
    }

    /// Send one framed message to every subscriber, dropping the dead ones.
    pub async fn publish(&mut self, topic: &str, payload: &str) {
        let mut frame = encode_frame(topic, payload);
        frame.push('\n');
        let bytes = frame.as_bytes();

        let mut alive = Vec::with_capacity(self.subscribers.len());
        for mut stream in self.subscribers.drain(..) {
            match timeout(WRITE_TIMEOUT, stream.write_all(bytes)).await {
                Ok(Ok(())) => alive.push(stream),
                Ok(Err(e)) => debug!("Client unsubscribed: {e}"),
                Err(_) => warn!("Dropping stalled subscriber"),
            }
        }
        self.subscribers = alive;
    }

    /// Sleep for `duration` while still accepting new subscribers, waking
    /// early on shutdown.
    pub async fn idle(&mut self, duration: Duration, shutdown: &Shutdown) {
        let deadline = Instant::now() + duration;
        loop {
            if shutdown.is_triggered() {
                return;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted.ok(),
                _ = tokio::time::sleep(remaining.min(Duration::from_secs(1))) => None,
            };
            if let Some((stream, _)) = accepted {
                self.register(stream);
            }
        }
    }
}

/// Emit one framed message per period until shutdown or the message count
/// is exhausted.
///
/// `gen` produces the payload for each emission; `None` skips the period
/// (the generator already logged why). The count terminates at
/// `msg_count + PROXY_MSG_MARGIN` so a proxy between this publisher and the
/// counted subscriber still drains its share.
pub async fn run_publisher<F>(
    port: u16,
    interval_sec: f64,
    msg_count: u32,
    topic: &str,
    shutdown: Shutdown,
    mut gen: F,
) -> Result<()>
where
    F: FnMut() -> Option<String>,
{
    info!("Start pub server (port: {port})...");

    let mut socket = PubSocket::bind(port).await?;
    info!("Server initialize done.");

    socket.wait_first_subscriber(&shutdown).await;

    let mut send_count: u32 = 0;
    while !shutdown.is_triggered() {
        let started = Instant::now();

        socket.accept_pending().await;

        if let Some(payload) = gen() {
            socket.publish(topic, &payload).await;

            if msg_count != 0 {
                send_count += 1;
                debug!("(send_count, msg_count) = ({send_count}, {msg_count})");
                if send_count >= msg_count + PROXY_MSG_MARGIN {
                    info!("Terminate, because the specified number of times has been reached.");
                    break;
                }
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        let sleep_sec = (interval_sec - elapsed).max(0.5);
        debug!("Sleep {sleep_sec:.1} sec...");
        socket.idle(Duration::from_secs_f64(sleep_sec), &shutdown).await;
    }

    warn!("Stop pub server");
    Ok(())
}
