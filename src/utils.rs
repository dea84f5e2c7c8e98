use anyhow::anyhow;
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::{Frame, OutboundFrame, RawFrame};

/// Parses one inbound WebSocket payload.
pub(crate) fn decode_frame(data: &[u8]) -> anyhow::Result<Frame> {
    match std::str::from_utf8(data) {
        Ok(text) => log::trace!("<-- {}", text),
        Err(_) => log::trace!("<-- {} (binary)", buf_to_hex(data)),
    }

    let raw: RawFrame = serde_json::from_slice(data).map_err(|err| {
        log::debug!("failed to parse frame: {}", err);
        anyhow!(err)
    })?;
    Ok(Frame::from(raw))
}

/// Serializes one outbound frame into a text message.
pub(crate) fn encode_frame(frame: &OutboundFrame) -> Result<Message, serde_json::Error> {
    let line = serde_json::to_string(frame)?;
    log::trace!("--> {}", &line);
    Ok(Message::Text(line.into()))
}

fn buf_to_hex(buf: &[u8]) -> String {
    buf.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_request() {
        let message = encode_frame(&OutboundFrame::request(1, "initialize", json!({"a": 1}))).unwrap();
        let Message::Text(text) = message else {
            panic!("expected text message");
        };
        let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "method": "initialize", "params": {"a": 1}, "id": 1}));
    }

    #[test]
    fn decode_rejects_non_object() {
        assert!(decode_frame(b"[1,2,3]").is_err());
        assert!(decode_frame(b"\xff\xfe").is_err());
        assert!(decode_frame(b"").is_err());
    }

    #[test]
    fn decode_notification() {
        let frame = decode_frame(br#"{"method":"analysis/progress"}"#).unwrap();
        assert_eq!(
            frame,
            Frame::Notification {
                method: "analysis/progress".into(),
                params: serde_json::Value::Null,
            }
        );
    }
}
