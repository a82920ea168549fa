//! 流式传输编解码（SSE）

pub mod codec;
pub mod frame;

pub use codec::{
    decode_frame, encode_comment, encode_event, TurnEventReader, INVALID_EVENT, MALFORMED_EVENT,
};
pub use frame::{FrameSplitter, SseFrame};
