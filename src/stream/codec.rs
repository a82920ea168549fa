//! TurnEvent ⇄ SSE 帧
//!
//! 写端：每个事件一帧 `event: <type>\ndata: <json>\n\n`。
//! 读端：坏帧（包括超长帧）不会中断整条流，而是转成一条 error 事件继续读取。

use serde_json::Value;

use crate::react::TurnEvent;
use crate::stream::frame::{FrameSplitter, SseFrame};

pub const MALFORMED_EVENT: &str = "Malformed stream event received.";
pub const INVALID_EVENT: &str = "Invalid stream event received.";

pub fn encode_event(event: &TurnEvent) -> String {
    let data = serde_json::to_string(event).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to serialize turn event");
        format!(r#"{{"type":"error","message":"{INVALID_EVENT}"}}"#)
    });
    format!("event: {}\ndata: {}\n\n", event.event_type(), data)
}

/// 注释帧（保活用，读端忽略）
pub fn encode_comment(text: &str) -> String {
    let mut out = String::new();
    for line in text.lines() {
        out.push(':');
        out.push_str(line);
        out.push('\n');
    }
    if out.is_empty() {
        out.push_str(":\n");
    }
    out.push('\n');
    out
}

/// 单帧解码：data 不是 JSON → Malformed；结构不符或与 event 行不一致 → Invalid
pub fn decode_frame(frame: &SseFrame) -> TurnEvent {
    let value: Value = match serde_json::from_str(&frame.data) {
        Ok(v) => v,
        Err(_) => return TurnEvent::error(MALFORMED_EVENT),
    };
    let event: TurnEvent = match serde_json::from_value(value) {
        Ok(e) => e,
        Err(_) => return TurnEvent::error(INVALID_EVENT),
    };
    match &frame.event {
        Some(declared) if declared != event.event_type() => TurnEvent::error(INVALID_EVENT),
        _ => event,
    }
}

/// 增量读取器：任意分包喂入字节，按序产出事件
#[derive(Debug, Default)]
pub struct TurnEventReader {
    frames: FrameSplitter,
}

impl TurnEventReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<TurnEvent> {
        self.frames
            .push(chunk)
            .into_iter()
            .map(|frame| match frame {
                Ok(frame) => decode_frame(&frame),
                Err(_) => TurnEvent::error(MALFORMED_EVENT),
            })
            .collect()
    }

    /// 输入结束，解析末尾残帧
    pub fn finish(&mut self) -> Option<TurnEvent> {
        self.frames.finish().as_ref().map(decode_frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::react::TurnTrace;
    use crate::tools::Block;

    fn final_event() -> TurnEvent {
        TurnEvent::Final {
            assistant_text: "好的，已记录".into(),
            blocks: vec![Block::success("Logged 30 min of Run")],
            trace: TurnTrace {
                tools_used: vec!["log_activity".into()],
                model: Some("mock".into()),
                fallback_used: false,
                hit_tool_limit: false,
            },
        }
    }

    #[test]
    fn test_encode_layout() {
        let s = encode_event(&TurnEvent::Start {
            turn_id: "t1".into(),
        });
        assert_eq!(s, "event: start\ndata: {\"type\":\"start\",\"turn_id\":\"t1\"}\n\n");
    }

    #[test]
    fn test_reader_survives_byte_by_byte_delivery() {
        let events = vec![
            TurnEvent::Start {
                turn_id: "t1".into(),
            },
            final_event(),
        ];
        let wire: String = events.iter().map(encode_event).collect();
        let mut reader = TurnEventReader::new();
        let mut got = Vec::new();
        for b in wire.as_bytes() {
            got.extend(reader.push(std::slice::from_ref(b)));
        }
        assert!(reader.finish().is_none());
        assert_eq!(got, events);
    }

    #[test]
    fn test_malformed_and_invalid_frames() {
        let mut reader = TurnEventReader::new();
        let got = reader.push(
            b"event: start\ndata: {not json\n\n\
              event: start\ndata: {\"type\":\"start\"}\n\n\
              event: final\ndata: {\"type\":\"start\",\"turn_id\":\"t\"}\n\n",
        );
        assert_eq!(
            got,
            vec![
                TurnEvent::error(MALFORMED_EVENT),
                TurnEvent::error(INVALID_EVENT),
                TurnEvent::error(INVALID_EVENT),
            ]
        );
    }

    #[test]
    fn test_oversized_frame_becomes_malformed_event() {
        let mut reader = TurnEventReader {
            frames: FrameSplitter::with_max_frame_bytes(64),
        };
        let mut got = reader.push(format!("data: {}", "x".repeat(100)).as_bytes());
        got.extend(reader.push(b"\n\n"));
        got.extend(reader.push(encode_event(&TurnEvent::Start { turn_id: "t2".into() }).as_bytes()));
        assert_eq!(
            got,
            vec![
                TurnEvent::error(MALFORMED_EVENT),
                TurnEvent::Start { turn_id: "t2".into() },
            ]
        );
    }

    #[test]
    fn test_comments_are_ignored() {
        let mut wire = encode_comment("ping");
        wire.push_str(&encode_event(&TurnEvent::error("Turn cancelled: stop")));
        let mut reader = TurnEventReader::new();
        assert_eq!(
            reader.push(wire.as_bytes()),
            vec![TurnEvent::error("Turn cancelled: stop")]
        );
    }
}
