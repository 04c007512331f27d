//! Frame decoding for the push transport.
//!
//! One line is one frame. Plain newline-delimited JSON and SSE `data:` lines
//! are both accepted; SSE control lines carry no payload.

use serde_json::Value;

/// Upper bound for a single line on the wire.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Extract the payload of one line, or `None` if the line carries no data.
pub fn frame_payload(line: &str) -> Option<&str> {
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() || line.starts_with(':') {
        return None;
    }

    if let Some(data) = line.strip_prefix("data:") {
        let data = data.strip_prefix(' ').unwrap_or(data);
        return if data.trim().is_empty() {
            None
        } else {
            Some(data)
        };
    }

    for field in ["event:", "id:", "retry:"] {
        if line.starts_with(field) {
            return None;
        }
    }

    Some(line)
}

/// Parse a frame payload as JSON.
pub fn decode_frame(payload: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(payload)
}
