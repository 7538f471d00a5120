//! Protocol module - wire format, framing, and raw frames.
//!
//! This module implements the binary framing layer:
//! - 11-byte header encoding/decoding and validation
//! - Frame buffer for accumulating partial reads
//! - Raw frame struct (header + undecoded payload)

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame, RawFrame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    FrameKind, Header, ABSOLUTE_MAX_PAYLOAD_SIZE, DEFAULT_MAX_PAYLOAD_SIZE, EVENT_CALL_ID,
    HEADER_SIZE, MAGIC,
};
