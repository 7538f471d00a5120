//! Typed frames and the stream decoder.
//!
//! Payload layouts (MessagePack, struct-as-map):
//!
//! | Kind     | Payload                                   |
//! |----------|-------------------------------------------|
//! | Request  | `{ "method": str, "params": [Value] }`    |
//! | Response | `Value`                                   |
//! | Error    | `{ "faultCode": i64, "faultString": str }`|
//! | Event    | `{ "method": str, "params": [Value] }`    |

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::MsgPackCodec;
use crate::error::{CodecError, RpcFault};
use crate::protocol::{
    FrameBuffer, FrameKind, Header, RawFrame, ABSOLUTE_MAX_PAYLOAD_SIZE, DEFAULT_MAX_PAYLOAD_SIZE,
    EVENT_CALL_ID, HEADER_SIZE,
};
use crate::value::Value;

/// A decoded wire frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Method call.
    Request {
        id: u32,
        method: String,
        params: Vec<Value>,
    },
    /// Successful result for call `id`.
    Response { id: u32, value: Value },
    /// Fault result for call `id`.
    Error { id: u32, fault: RpcFault },
    /// Unsolicited notification.
    Event { method: String, params: Vec<Value> },
}

impl Frame {
    /// Wire kind of this frame.
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Request { .. } => FrameKind::Request,
            Frame::Response { .. } => FrameKind::Response,
            Frame::Error { .. } => FrameKind::Error,
            Frame::Event { .. } => FrameKind::Event,
        }
    }

    /// Correlation ID, absent for events.
    pub fn call_id(&self) -> Option<u32> {
        match self {
            Frame::Request { id, .. } | Frame::Response { id, .. } | Frame::Error { id, .. } => {
                Some(*id)
            }
            Frame::Event { .. } => None,
        }
    }

    /// Decode the payload of a raw frame.
    pub fn from_raw(raw: &RawFrame) -> Result<Self, CodecError> {
        let id = raw.call_id();
        let frame = match raw.kind() {
            FrameKind::Request => {
                let call: Call = MsgPackCodec::decode(raw.payload())?;
                Frame::Request {
                    id,
                    method: call.method,
                    params: call.params,
                }
            }
            FrameKind::Response => Frame::Response {
                id,
                value: MsgPackCodec::decode(raw.payload())?,
            },
            FrameKind::Error => {
                let fault: FaultBody = MsgPackCodec::decode(raw.payload())?;
                Frame::Error {
                    id,
                    fault: RpcFault::new(fault.code, fault.message),
                }
            }
            FrameKind::Event => {
                let call: Call = MsgPackCodec::decode(raw.payload())?;
                Frame::Event {
                    method: call.method,
                    params: call.params,
                }
            }
        };
        Ok(frame)
    }

    /// Encode into header and payload.
    pub fn encode_parts(&self) -> Result<EncodedFrame, CodecError> {
        match self {
            Frame::Request { id, method, params } => request_parts(*id, method, params),
            Frame::Response { id, value } => response_parts(*id, value),
            Frame::Error { id, fault } => error_parts(*id, fault),
            Frame::Event { method, params } => event_parts(method, params),
        }
    }

    /// Encode into a contiguous byte vector.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(self.encode_parts()?.to_vec())
    }
}

#[derive(Deserialize)]
struct Call {
    method: String,
    #[serde(default)]
    params: Vec<Value>,
}

#[derive(Serialize)]
struct CallRef<'a> {
    method: &'a str,
    params: &'a [Value],
}

#[derive(Serialize, Deserialize)]
struct FaultBody {
    #[serde(rename = "faultCode")]
    code: i64,
    #[serde(rename = "faultString")]
    message: String,
}

/// Encoded header plus payload, kept apart for vectored writes.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub header: Header,
    pub payload: Bytes,
}

impl EncodedFrame {
    fn build<T: Serialize>(kind: FrameKind, call_id: u32, body: &T) -> Result<Self, CodecError> {
        let payload = MsgPackCodec::encode(body)?;
        if payload.len() > ABSOLUTE_MAX_PAYLOAD_SIZE as usize {
            return Err(CodecError::Malformed(format!(
                "payload size {} exceeds maximum {}",
                payload.len(),
                ABSOLUTE_MAX_PAYLOAD_SIZE
            )));
        }
        Ok(Self {
            header: Header::new(kind, call_id, payload.len() as u32),
            payload: Bytes::from(payload),
        })
    }

    /// Total size on the wire.
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Contiguous header + payload bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.payload);
        buf
    }
}

pub fn request_parts(id: u32, method: &str, params: &[Value]) -> Result<EncodedFrame, CodecError> {
    if id == EVENT_CALL_ID {
        return Err(CodecError::Malformed("request without call id".into()));
    }
    EncodedFrame::build(FrameKind::Request, id, &CallRef { method, params })
}

pub fn response_parts(id: u32, value: &Value) -> Result<EncodedFrame, CodecError> {
    if id == EVENT_CALL_ID {
        return Err(CodecError::Malformed("response without call id".into()));
    }
    EncodedFrame::build(FrameKind::Response, id, value)
}

pub fn error_parts(id: u32, fault: &RpcFault) -> Result<EncodedFrame, CodecError> {
    if id == EVENT_CALL_ID {
        return Err(CodecError::Malformed("error without call id".into()));
    }
    let body = FaultBody {
        code: fault.code,
        message: fault.message.clone(),
    };
    EncodedFrame::build(FrameKind::Error, id, &body)
}

pub fn event_parts(method: &str, params: &[Value]) -> Result<EncodedFrame, CodecError> {
    EncodedFrame::build(FrameKind::Event, EVENT_CALL_ID, &CallRef { method, params })
}

/// Encode a request frame.
///
/// # Example
///
/// ```
/// use homegear_ipc::codec::{encode_request, Decoder, Frame};
/// use homegear_ipc::Value;
///
/// let bytes = encode_request(7, "logLevel", &[Value::from(4)]).unwrap();
/// let mut decoder = Decoder::new();
/// let frames: Vec<Frame> = decoder.decode(&bytes).collect::<Result<_, _>>().unwrap();
/// assert_eq!(
///     frames,
///     vec![Frame::Request { id: 7, method: "logLevel".into(), params: vec![Value::from(4)] }]
/// );
/// ```
pub fn encode_request(id: u32, method: &str, params: &[Value]) -> Result<Vec<u8>, CodecError> {
    Ok(request_parts(id, method, params)?.to_vec())
}

/// Encode a response frame.
pub fn encode_response(id: u32, value: &Value) -> Result<Vec<u8>, CodecError> {
    Ok(response_parts(id, value)?.to_vec())
}

/// Encode an error frame.
pub fn encode_error(id: u32, fault: &RpcFault) -> Result<Vec<u8>, CodecError> {
    Ok(error_parts(id, fault)?.to_vec())
}

/// Encode an event frame.
pub fn encode_event(method: &str, params: &[Value]) -> Result<Vec<u8>, CodecError> {
    Ok(event_parts(method, params)?.to_vec())
}

/// Streaming decoder: bytes in, complete frames out.
///
/// Partial frames stay buffered across calls. After the first malformed
/// frame the decoder is poisoned and every later call yields the same error.
pub struct Decoder {
    buffer: FrameBuffer,
    poisoned: Option<String>,
}

impl Decoder {
    /// Decoder with the default payload limit.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Decoder with a custom payload limit (clamped to the absolute maximum).
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: FrameBuffer::with_max_payload(max_payload_size.min(ABSOLUTE_MAX_PAYLOAD_SIZE)),
            poisoned: None,
        }
    }

    /// Feed bytes and iterate the frames they complete.
    ///
    /// The iterator is lazy: frames are cut from the buffer as it advances,
    /// and it ends after the first error.
    pub fn decode(&mut self, bytes: &[u8]) -> Frames<'_> {
        if self.poisoned.is_none() {
            self.buffer.extend(bytes);
        }
        Frames {
            decoder: self,
            done: false,
        }
    }

    /// Check if a malformed frame has been seen.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    /// Bytes buffered toward an incomplete frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Call at end of stream: leftover bytes mean the peer hung up
    /// inside a frame.
    pub fn finish(&self) -> Result<(), CodecError> {
        if self.buffer.has_partial_frame() {
            Err(CodecError::Malformed(format!(
                "stream ended inside a frame ({} payload bytes buffered)",
                self.buffer.len()
            )))
        } else {
            Ok(())
        }
    }

    fn poison(&mut self, err: &CodecError) {
        self.poisoned = Some(err.to_string());
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator returned by [`Decoder::decode`].
pub struct Frames<'a> {
    decoder: &'a mut Decoder,
    done: bool,
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if let Some(reason) = &self.decoder.poisoned {
            self.done = true;
            return Some(Err(CodecError::Malformed(reason.clone())));
        }

        let result = self
            .decoder
            .buffer
            .next_frame()
            .and_then(|raw| raw.map(|r| Frame::from_raw(&r)).transpose());

        match result {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => None,
            Err(err) => {
                self.decoder.poison(&err);
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
