//! Codec module - typed frames on top of the binary framing layer.
//!
//! - [`MsgPackCodec`] - MessagePack payloads via `rmp-serde` (`to_vec_named`)
//! - [`Frame`] - Request / Response / Error / Event with decoded payloads
//! - [`Decoder`] - reassembles frames from arbitrary read chunks
//!
//! # Example
//!
//! ```
//! use homegear_ipc::codec::{encode_response, Decoder, Frame};
//! use homegear_ipc::Value;
//!
//! let bytes = encode_response(1, &Value::from(3)).unwrap();
//! let (head, tail) = bytes.split_at(6);
//!
//! let mut decoder = Decoder::new();
//! assert_eq!(decoder.decode(head).count(), 0);
//! let frame = decoder.decode(tail).next().unwrap().unwrap();
//! assert_eq!(frame, Frame::Response { id: 1, value: Value::from(3) });
//! ```

mod frames;
mod msgpack;

pub use frames::{
    encode_error, encode_event, encode_request, encode_response, error_parts, event_parts,
    request_parts, response_parts, Decoder, EncodedFrame, Frame, Frames,
};
pub use msgpack::MsgPackCodec;
