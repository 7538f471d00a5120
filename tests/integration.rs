//! Integration tests for the wire codec.
//!
//! These tests verify the codec and framing layers together, the way a
//! daemon's byte stream exercises them.

use std::collections::BTreeMap;

use homegear_ipc::codec::{
    encode_error, encode_event, encode_request, encode_response, Decoder, Frame, MsgPackCodec,
};
use homegear_ipc::protocol::{build_frame, FrameBuffer, FrameKind, Header, HEADER_SIZE, MAGIC};
use homegear_ipc::{CodecError, RpcFault, Value};
use proptest::prelude::*;

fn decode_all(bytes: &[u8]) -> Vec<Frame> {
    Decoder::new()
        .decode(bytes)
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

/// Full request frame: header fields plus MsgPack payload layout.
#[test]
fn test_request_layout() {
    let bytes = encode_request(12345, "logLevel", &[Value::from(4)]).unwrap();

    let header = Header::decode(&bytes).unwrap().unwrap();
    assert_eq!(header.kind, FrameKind::Request);
    assert_eq!(header.call_id, 12345);
    assert_eq!(header.payload_length as usize, bytes.len() - HEADER_SIZE);
    assert_eq!(u16::from_be_bytes([bytes[0], bytes[1]]), MAGIC);

    let body: BTreeMap<String, Value> = MsgPackCodec::decode(&bytes[HEADER_SIZE..]).unwrap();
    assert_eq!(body["method"], Value::from("logLevel"));
    assert_eq!(body["params"], Value::Array(vec![Value::from(4)]));
}

/// A daemon stream mixing every frame kind decodes in order.
#[test]
fn test_mixed_frame_sequence() {
    let mut stream = Vec::new();
    stream.extend(encode_response(1, &Value::from(3)).unwrap());
    stream.extend(
        encode_event(
            "broadcastEvent",
            &[
                Value::from("device"),
                Value::from(42),
                Value::from(1),
                Value::Array(vec![Value::from("STATE")]),
                Value::Array(vec![Value::from(true)]),
            ],
        )
        .unwrap(),
    );
    stream.extend(encode_error(2, &RpcFault::new(-32601, "Requested method not found.")).unwrap());
    stream.extend(encode_request(3, "nodeOutput", &[Value::from("n1")]).unwrap());

    let frames = decode_all(&stream);
    let kinds: Vec<_> = frames.iter().map(Frame::kind).collect();
    assert_eq!(
        kinds,
        vec![
            FrameKind::Response,
            FrameKind::Event,
            FrameKind::Error,
            FrameKind::Request
        ]
    );
    assert_eq!(
        frames.iter().map(Frame::call_id).collect::<Vec<_>>(),
        vec![Some(1), None, Some(2), Some(3)]
    );
}

/// Fragmented delivery: every split point yields the same single frame.
#[test]
fn test_fragmented_frame_every_split() {
    let bytes = encode_response(789, &Value::from("test data for fragmentation")).unwrap();

    for split in 0..=bytes.len() {
        let mut decoder = Decoder::new();
        let mut frames: Vec<_> = decoder.decode(&bytes[..split]).collect();
        frames.extend(decoder.decode(&bytes[split..]));
        let frames: Vec<_> = frames.into_iter().map(Result::unwrap).collect();

        assert_eq!(
            frames,
            vec![Frame::Response {
                id: 789,
                value: Value::from("test data for fragmentation")
            }],
            "split at {split}"
        );
    }
}

/// Byte-at-a-time delivery through the raw frame buffer.
#[test]
fn test_frame_buffer_byte_by_byte() {
    let payload = MsgPackCodec::encode(&Value::from(vec![1u8, 2, 3])).unwrap();
    let bytes = build_frame(FrameKind::Response, 5, &payload);

    let mut buffer = FrameBuffer::new();
    let mut frames = Vec::new();
    for byte in &bytes {
        frames.extend(buffer.push(std::slice::from_ref(byte)).unwrap());
    }

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].call_id(), 5);
    assert_eq!(frames[0].payload(), &payload[..]);
    assert!(buffer.is_empty());
}

#[test]
fn test_malformed_headers() {
    let valid = encode_response(1, &Value::Void).unwrap();

    let mut bad_magic = valid.clone();
    bad_magic[0] = 0x00;

    let mut bad_kind = valid.clone();
    bad_kind[2] = 9;

    // Event kind with a call id.
    let mut event_with_id = valid.clone();
    event_with_id[2] = FrameKind::Event.as_u8();

    // Response with call id 0.
    let response_without_id = build_frame(FrameKind::Response, 0, &[0xc0]);

    for bytes in [bad_magic, bad_kind, event_with_id, response_without_id] {
        let results: Vec<_> = Decoder::new().decode(&bytes).collect();
        assert!(
            matches!(results[..], [Err(CodecError::Malformed(_))]),
            "{bytes:02x?}"
        );
    }
}

/// Integers beyond the signed 64-bit range are not representable.
#[test]
fn test_u64_out_of_range_is_malformed() {
    let payload = rmp_serde::to_vec(&u64::MAX).unwrap();
    let bytes = build_frame(FrameKind::Response, 1, &payload);
    let results: Vec<_> = Decoder::new().decode(&bytes).collect();
    assert!(matches!(results[..], [Err(CodecError::Malformed(_))]));
}

#[test]
fn test_json_conversion_feeds_codec() {
    let json = serde_json::json!({
        "name": "kitchen",
        "level": 0.75,
        "peers": [1, 2, -3],
        "active": true,
        "note": null
    });
    let value = Value::from(json.clone());

    let bytes = encode_response(1, &value).unwrap();
    let frames = decode_all(&bytes);
    let Frame::Response { value: decoded, .. } = &frames[0] else {
        panic!("expected response");
    };
    assert_eq!(decoded, &value);

    let back: serde_json::Value = decoded.clone().into();
    assert_eq!(back, json);
}

fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Void),
        any::<bool>().prop_map(Value::Boolean),
        any::<i64>().prop_map(Value::Integer),
        (-1.0e12f64..1.0e12).prop_map(Value::Float),
        ".{0,16}".prop_map(Value::String),
        proptest::collection::vec(any::<u8>(), 0..32).prop_map(Value::Binary),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            proptest::collection::btree_map(".{0,8}", inner, 0..4).prop_map(Value::Struct),
        ]
    })
}

proptest! {
    #[test]
    fn value_survives_the_wire(value in value_strategy(), id in 1u32..) {
        let bytes = encode_response(id, &value).unwrap();
        let frames = decode_all(&bytes);
        prop_assert_eq!(frames, vec![Frame::Response { id, value }]);
    }

    #[test]
    fn call_params_survive_the_wire(
        method in "[a-zA-Z]{1,24}",
        params in proptest::collection::vec(value_strategy(), 0..6),
        chunk in 1usize..64,
    ) {
        let bytes = encode_request(7, &method, &params).unwrap();

        let mut decoder = Decoder::new();
        let mut frames = Vec::new();
        for piece in bytes.chunks(chunk) {
            frames.extend(decoder.decode(piece).map(Result::unwrap));
        }
        prop_assert_eq!(frames, vec![Frame::Request { id: 7, method, params }]);
    }
}
