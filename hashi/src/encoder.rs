//! Server-Sent Events encoding for AG-UI events.

use crate::error::Result;
use crate::event::Event;

/// The SSE media type.
pub const SSE_CONTENT_TYPE: &str = "text/event-stream";

/// Response headers every AG-UI stream carries. `X-Accel-Buffering: no`
/// keeps reverse proxies from buffering the stream.
pub const SSE_HEADERS: [(&str, &str); 3] = [
    ("Cache-Control", "no-cache"),
    ("Connection", "keep-alive"),
    ("X-Accel-Buffering", "no"),
];

/// Encodes events as SSE frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventEncoder;

impl EventEncoder {
    /// Create a new encoder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encode one event as `event: <name>\ndata: <json>\n\n`.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if the event cannot be serialized.
    pub fn encode(&self, event: &Event) -> Result<String> {
        let data = serde_json::to_string(event)?;
        Ok(format!("event: {}\ndata: {}\n\n", event.name(), data))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::event::{RunStartedEvent, TextMessageContentEvent};

    #[test]
    fn frame_has_event_and_data_lines() {
        let encoder = EventEncoder::new();
        let frame = encoder.encode(&RunStartedEvent::new("t1", "r1")).unwrap();
        assert!(frame.starts_with("event: RUN_STARTED\ndata: "));
        assert!(frame.ends_with("\n\n"));
        let data = frame
            .trim_end()
            .strip_prefix("event: RUN_STARTED\ndata: ")
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(data).unwrap();
        assert_eq!(parsed["threadId"], "t1");
        assert_eq!(parsed["type"], "RUN_STARTED");
    }

    #[test]
    fn delta_payload_survives_encoding() {
        let encoder = EventEncoder::new();
        let frame = encoder
            .encode(&TextMessageContentEvent::new("m1", "line one\nline two"))
            .unwrap();
        // JSON escaping keeps the frame on two lines regardless of
        // newlines in the delta.
        assert_eq!(frame.matches('\n').count(), 3);
    }
}
