//! Wire format encoding and decoding.
//!
//! Implements the 11-byte header format:
//! ```text
//! ┌──────────┬───────┬──────────┬──────────┐
//! │ Magic    │ Kind  │ Call ID  │ Length   │
//! │ 2 bytes  │ 1 byte│ 4 bytes  │ 4 bytes  │
//! │ uint16 BE│       │ uint32 BE│ uint32 BE│
//! └──────────┴───────┴──────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian.

use crate::error::CodecError;

/// Header size in bytes (fixed, exactly 11).
pub const HEADER_SIZE: usize = 11;

/// Magic prefix of every frame ("HG").
pub const MAGIC: u16 = 0x4847;

/// Default maximum payload size (16 MB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Absolute maximum payload size (1 GB). Configured limits are clamped to it.
pub const ABSOLUTE_MAX_PAYLOAD_SIZE: u32 = 1_073_741_824;

/// Call ID carried by event frames.
pub const EVENT_CALL_ID: u32 = 0;

/// Frame kind byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// Method call expecting a Response or Error.
    Request = 1,
    /// Successful result of a Request.
    Response = 2,
    /// Fault result of a Request.
    Error = 3,
    /// Unsolicited notification, no call ID.
    Event = 4,
}

impl FrameKind {
    /// Parse a kind byte.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(FrameKind::Request),
            2 => Some(FrameKind::Response),
            3 => Some(FrameKind::Error),
            4 => Some(FrameKind::Event),
            _ => None,
        }
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Frame kind.
    pub kind: FrameKind,
    /// Correlation identifier (0 = event).
    pub call_id: u32,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(kind: FrameKind, call_id: u32, payload_length: u32) -> Self {
        Self {
            kind,
            call_id,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use homegear_ipc::protocol::{FrameKind, Header};
    ///
    /// let header = Header::new(FrameKind::Request, 42, 100);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 11);
    /// assert_eq!(&bytes[..2], b"HG");
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (11 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..2].copy_from_slice(&MAGIC.to_be_bytes());
        buf[2] = self.kind.as_u8();
        buf[3..7].copy_from_slice(&self.call_id.to_be_bytes());
        buf[7..11].copy_from_slice(&self.payload_length.to_be_bytes());
    }

    /// Decode and validate a header.
    ///
    /// Returns `Ok(None)` if the buffer is too short. Everything that is
    /// present must be well formed: magic, kind byte, and the rule that only
    /// events carry call ID 0. The payload limit is checked separately by
    /// [`Header::check_length`].
    ///
    /// # Example
    ///
    /// ```
    /// use homegear_ipc::protocol::{FrameKind, Header};
    ///
    /// let bytes = [b'H', b'G', 2, 0, 0, 0, 42, 0, 0, 0, 100];
    /// let header = Header::decode(&bytes).unwrap().unwrap();
    /// assert_eq!(header.kind, FrameKind::Response);
    /// assert_eq!(header.call_id, 42);
    /// assert_eq!(header.payload_length, 100);
    /// ```
    pub fn decode(buf: &[u8]) -> Result<Option<Self>, CodecError> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let magic = u16::from_be_bytes([buf[0], buf[1]]);
        if magic != MAGIC {
            return Err(CodecError::Malformed(format!("bad magic 0x{magic:04x}")));
        }

        let kind = FrameKind::from_u8(buf[2])
            .ok_or_else(|| CodecError::Malformed(format!("unknown frame kind {}", buf[2])))?;

        let header = Self {
            kind,
            call_id: u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]),
            payload_length: u32::from_be_bytes([buf[7], buf[8], buf[9], buf[10]]),
        };

        match (kind, header.call_id) {
            (FrameKind::Event, EVENT_CALL_ID) => {}
            (FrameKind::Event, id) => {
                return Err(CodecError::Malformed(format!("event frame with call id {id}")))
            }
            (_, EVENT_CALL_ID) => {
                return Err(CodecError::Malformed(format!("{kind:?} frame without call id")))
            }
            _ => {}
        }

        Ok(Some(header))
    }

    /// Check the declared payload length against a limit.
    pub fn check_length(&self, max_payload_size: u32) -> Result<(), CodecError> {
        if self.payload_length > max_payload_size {
            return Err(CodecError::Malformed(format!(
                "payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }
        Ok(())
    }

    /// Check if this is an event.
    #[inline]
    pub fn is_event(&self) -> bool {
        self.kind == FrameKind::Event
    }
}
