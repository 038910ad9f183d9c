//! Subscribing side of the pub/sub fabric.

use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use mist_error::Result;
use mist_protocol::decode_frame;

use crate::shutdown::Shutdown;
use crate::transport::{read_line_bounded, RECV_POLL_TIMEOUT};

/// Connect to a publisher and invoke `on_message` with the payload of every
/// frame matching `topic`.
///
/// Receive is poll-driven with a 1 s soft timeout so the shutdown flag is
/// honoured promptly. Connection failures and EOFs log and loop; a
/// publisher that stays away simply means no liveness touches, which the
/// supervision layer detects.
///
/// Exits after `msg_count` deliveries (0 = unbounded) or on shutdown.
pub async fn start_client<F>(
    server_host: &str,
    server_port: u16,
    topic: &str,
    msg_count: u32,
    shutdown: Shutdown,
    mut on_message: F,
) -> Result<()>
where
    F: FnMut(&str),
{
    info!("Start subscriber ({server_host}:{server_port})...");

    let mut receive_count: u32 = 0;

    'outer: while !shutdown.is_triggered() {
        let stream = match TcpStream::connect((server_host, server_port)).await {
            Ok(stream) => stream,
            Err(e) => {
                debug!("Publisher not reachable ({e}), retrying...");
                shutdown.sleep(RECV_POLL_TIMEOUT).await;
                continue;
            }
        };
        info!("Subscriber connected.");
        let mut reader = BufReader::new(stream);
        let mut line_buf: Vec<u8> = Vec::new();

        loop {
            if shutdown.is_triggered() {
                info!("Terminate signal received, stopping subscriber");
                break 'outer;
            }

            match timeout(RECV_POLL_TIMEOUT, read_line_bounded(&mut reader, &mut line_buf)).await {
                Err(_) => continue,
                Ok(Ok(0)) => {
                    debug!("Publisher closed the connection, reconnecting...");
                    break;
                }
                Ok(Ok(_)) => {
                    let mut delivered = false;
                    {
                        let line = String::from_utf8_lossy(&line_buf);
                        match decode_frame(&line) {
                            Some(frame) if frame.topic == topic => {
                                debug!("recv {}", frame.payload);
                                on_message(frame.payload);
                                delivered = true;
                            }
                            Some(_) => {}
                            None => warn!("Malformed frame, skipping"),
                        }
                    }
                    line_buf.clear();

                    if delivered && msg_count != 0 {
                        receive_count += 1;
                        debug!("(receive_count, msg_count) = ({receive_count}, {msg_count})");
                        if receive_count >= msg_count {
                            info!("Terminate, because the specified number of times has been reached.");
                            break 'outer;
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!("Receive failed ({e}), reconnecting...");
                    break;
                }
            }
        }
    }

    warn!("Stop subscriber");
    Ok(())
}
