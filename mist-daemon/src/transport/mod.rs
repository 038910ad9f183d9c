//! One-topic, one-to-many pub/sub over TCP with a last-value caching proxy.
//!
//! Frames are newline-delimited text lines `"<topic> <payload-json>"`.
//! Within one (publisher, subscriber) pair delivery order matches emission
//! order; the caching proxy may insert exactly one cached message ahead of
//! the first fresh delivery to a newly-connected subscriber, so consumers
//! must tolerate one duplicate.

mod proxy;
mod publisher;
mod subscriber;

pub use proxy::run_proxy;
pub use publisher::{run_publisher, PubSocket};
pub use subscriber::start_client;

use mist_protocol::MAX_MESSAGE_SIZE;

/// Extra emissions past `msg_count` so that a proxy sitting between the
/// publisher and the counted subscriber still sees enough traffic.
pub const PROXY_MSG_MARGIN: u32 = 15;

/// Soft receive timeout so cancellation stays responsive.
pub const RECV_POLL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);

/// Read one newline-terminated line, bounded at [`MAX_MESSAGE_SIZE`].
///
/// Appends to `out` without clearing: the future may be cancelled by a
/// receive timeout or a select arm, and bytes already consumed from the
/// reader must survive into the next poll. The caller clears `out` after
/// processing each complete line.
///
/// Returns `Ok(0)` at EOF with no buffered data. Oversized lines fail with
/// `InvalidData` without buffering beyond the limit.
pub(crate) async fn read_line_bounded<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
    out: &mut Vec<u8>,
) -> std::io::Result<usize> {
    use tokio::io::AsyncBufReadExt;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(out.len());
        }

        let mut take_len = available.len();
        let mut found_newline = false;
        if let Some(pos) = available.iter().position(|b| *b == b'\n') {
            take_len = pos + 1;
            found_newline = true;
        }

        let remaining = MAX_MESSAGE_SIZE.saturating_sub(out.len());
        if take_len > remaining {
            let consume_len = remaining.min(available.len());
            reader.consume(consume_len);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Message too large",
            ));
        }

        out.extend_from_slice(&available[..take_len]);
        reader.consume(take_len);

        if found_newline {
            return Ok(out.len());
        }
    }
}
