//! MsgPack codec using `rmp-serde`.
//!
//! Always `to_vec_named`: structs travel as maps keyed by field name, which
//! is what the daemon's variable decoder expects for `faultCode` /
//! `faultString` and for call envelopes.

use crate::error::CodecError;

/// MessagePack codec for structured payloads.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// Fails with [`CodecError::Malformed`] on invalid data.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Fault {
        #[serde(rename = "faultCode")]
        code: i64,
        #[serde(rename = "faultString")]
        message: String,
    }

    #[test]
    fn test_struct_roundtrip() {
        let original = Fault {
            code: -32601,
            message: "Requested method not found.".to_string(),
        };

        let encoded = MsgPackCodec::encode(&original).unwrap();
        let decoded: Fault = MsgPackCodec::decode(&encoded).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_named_produces_map_format() {
        let encoded = MsgPackCodec::encode(&Fault {
            code: 1,
            message: "x".to_string(),
        })
        .unwrap();

        // 0x82 = fixmap with 2 elements; array format would be 0x92.
        assert_eq!(encoded[0], 0x82, "Expected fixmap, got {:02X}", encoded[0]);
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let result: Result<Fault, CodecError> = MsgPackCodec::decode(b"not valid msgpack");
        assert!(matches!(result, Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_decode_truncated() {
        let encoded = MsgPackCodec::encode(&"a string that will be cut").unwrap();
        let result: Result<String, CodecError> = MsgPackCodec::decode(&encoded[..4]);
        assert!(result.is_err());
    }
}
