//! Raw frame: a validated header plus its undecoded payload.
//!
//! Uses `bytes::Bytes` so payloads are shared, not copied, between the
//! frame buffer and the codec.

use bytes::Bytes;

use super::wire_format::{FrameKind, Header, HEADER_SIZE};

/// A complete frame as it came off the wire.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes.
    pub payload: Bytes,
}

impl RawFrame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    #[inline]
    pub fn kind(&self) -> FrameKind {
        self.header.kind
    }

    #[inline]
    pub fn call_id(&self) -> u32 {
        self.header.call_id
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Build a complete frame as a single byte vector.
///
/// The header's length field is taken from `payload`.
///
/// # Example
///
/// ```
/// use homegear_ipc::protocol::{build_frame, FrameKind};
///
/// let bytes = build_frame(FrameKind::Response, 42, b"hello");
/// assert_eq!(bytes.len(), 11 + 5);
/// ```
pub fn build_frame(kind: FrameKind, call_id: u32, payload: &[u8]) -> Vec<u8> {
    let header = Header::new(kind, call_id, payload.len() as u32);
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}
