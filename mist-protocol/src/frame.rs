//! Line framing for the pub/sub sockets.
//!
//! A frame is a single text line `"<topic> <payload-json>"`. The payload is
//! opaque at this layer; subscribers filter on the topic before parsing.

/// Maximum frame size accepted on the wire (64 KiB)
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// A decoded frame borrowing from the received line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub topic: &'a str,
    pub payload: &'a str,
}

/// Encode a topic and payload into a wire line (without trailing newline).
pub fn encode_frame(topic: &str, payload: &str) -> String {
    format!("{topic} {payload}")
}

/// Split a received line into topic and payload.
///
/// Returns `None` for lines without a separator or with an empty topic; the
/// caller logs and skips those rather than tearing the connection down.
pub fn decode_frame(line: &str) -> Option<Frame<'_>> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (topic, payload) = line.split_once(' ')?;
    if topic.is_empty() {
        return None;
    }
    Some(Frame { topic, payload })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let line = encode_frame("unit_cooler", r#"{"state":1}"#);
        let frame = decode_frame(&line).unwrap();
        assert_eq!(frame.topic, "unit_cooler");
        assert_eq!(frame.payload, r#"{"state":1}"#);
    }

    #[test]
    fn test_decode_strips_newline() {
        let frame = decode_frame("actuator_status {}\n").unwrap();
        assert_eq!(frame.topic, "actuator_status");
        assert_eq!(frame.payload, "{}");
    }

    #[test]
    fn test_decode_rejects_missing_separator() {
        assert!(decode_frame("unit_cooler").is_none());
        assert!(decode_frame(" {}").is_none());
    }

    #[test]
    fn test_payload_may_contain_spaces() {
        let frame = decode_frame(r#"unit_cooler {"message":"a b c"}"#).unwrap();
        assert_eq!(frame.payload, r#"{"message":"a b c"}"#);
    }
}
