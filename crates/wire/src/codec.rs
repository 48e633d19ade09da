//! Byte-level encoding and tokio frame codec.
//!
//! Payload layout: one byte of type tag, then the body.
//!
//! | tag | type     | body                                    |
//! |-----|----------|-----------------------------------------|
//! | 0   | null     | empty                                   |
//! | 1   | integer  | i32, big-endian                         |
//! | 2   | string   | u32 BE byte length + UTF-8 bytes        |
//! | 3   | sequence | u32 BE element count + elements         |
//! | 4   | mapping  | u32 BE pair count + (key string, value) |
//!
//! Frames on the socket are a u32 big-endian payload length followed by the
//! payload. Invalid UTF-8 inside a string body decodes to U+FFFD and bumps
//! `wire_invalid_utf8_total`; the frame itself is kept.

use {
    bytes::{Buf, BufMut, BytesMut},
    metrics::counter,
    tokio_util::codec::{Decoder, Encoder},
};

use crate::{
    MAX_DEPTH, MAX_FRAME_BYTES, WireError,
    value::{Value, ValueMap},
};

const TAG_NULL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_STR: u8 = 2;
const TAG_LIST: u8 = 3;
const TAG_MAP: u8 = 4;

const LEN_HEADER: usize = 4;

// ── Encoding ─────────────────────────────────────────────────────────────────

/// Serialize one value tree to payload bytes (no frame header).
pub fn encode(value: &Value) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::with_capacity(64);
    encode_into(value, &mut out)?;
    Ok(out)
}

fn encode_into(value: &Value, out: &mut Vec<u8>) -> Result<(), WireError> {
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Int(n) => {
            out.push(TAG_INT);
            out.extend_from_slice(&n.to_be_bytes());
        },
        Value::Str(s) => {
            out.push(TAG_STR);
            put_len(s.len(), out)?;
            out.extend_from_slice(s.as_bytes());
        },
        Value::List(items) => {
            out.push(TAG_LIST);
            put_len(items.len(), out)?;
            for item in items {
                encode_into(item, out)?;
            }
        },
        Value::Map(map) => {
            out.push(TAG_MAP);
            put_len(map.len(), out)?;
            for (key, item) in map.iter() {
                put_len(key.len(), out)?;
                out.extend_from_slice(key.as_bytes());
                encode_into(item, out)?;
            }
        },
    }
    Ok(())
}

fn put_len(len: usize, out: &mut Vec<u8>) -> Result<(), WireError> {
    let len = u32::try_from(len)
        .map_err(|_| WireError::Encoding(format!("length {len} exceeds u32 field")))?;
    out.extend_from_slice(&len.to_be_bytes());
    Ok(())
}

// ── Decoding ─────────────────────────────────────────────────────────────────

/// Parse one value tree from payload bytes. Trailing bytes are an error: a
/// frame carries exactly one value.
pub fn decode(bytes: &[u8]) -> Result<Value, WireError> {
    let mut cursor = bytes;
    let value = decode_value(&mut cursor, 0)?;
    if !cursor.is_empty() {
        return Err(WireError::malformed(format!(
            "{} trailing bytes after value",
            cursor.len()
        )));
    }
    Ok(value)
}

fn decode_value(buf: &mut &[u8], depth: usize) -> Result<Value, WireError> {
    if depth > MAX_DEPTH {
        return Err(WireError::malformed("value nesting exceeds depth cap"));
    }
    if buf.is_empty() {
        return Err(WireError::malformed("truncated value: missing type tag"));
    }
    let tag = buf.get_u8();
    match tag {
        TAG_NULL => Ok(Value::Null),
        TAG_INT => {
            need(buf, 4)?;
            Ok(Value::Int(buf.get_i32()))
        },
        TAG_STR => Ok(Value::Str(take_string(buf)?)),
        TAG_LIST => {
            let count = take_len(buf)?;
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                items.push(decode_value(buf, depth + 1)?);
            }
            Ok(Value::List(items))
        },
        TAG_MAP => {
            let count = take_len(buf)?;
            let mut map = ValueMap::new();
            for _ in 0..count {
                let key = take_string(buf)?;
                let value = decode_value(buf, depth + 1)?;
                map.insert(key, value);
            }
            Ok(Value::Map(map))
        },
        other => Err(WireError::malformed(format!("unknown type tag {other:#04x}"))),
    }
}

fn need(buf: &[u8], n: usize) -> Result<(), WireError> {
    if buf.len() < n {
        return Err(WireError::malformed(format!(
            "truncated value: need {n} bytes, have {}",
            buf.len()
        )));
    }
    Ok(())
}

fn take_len(buf: &mut &[u8]) -> Result<usize, WireError> {
    need(buf, 4)?;
    Ok(buf.get_u32() as usize)
}

fn take_string(buf: &mut &[u8]) -> Result<String, WireError> {
    let len = take_len(buf)?;
    need(buf, len)?;
    let (head, rest) = buf.split_at(len);
    let text = match std::str::from_utf8(head) {
        Ok(s) => s.to_owned(),
        Err(_) => {
            counter!("wire_invalid_utf8_total").increment(1);
            String::from_utf8_lossy(head).into_owned()
        },
    };
    *buf = rest;
    Ok(text)
}

// ── Frame codec ──────────────────────────────────────────────────────────────

/// Length-prefixed frame codec for `FramedRead`/`FramedWrite` over the router
/// socket. One frame in, one value tree out.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame: usize,
}

impl FrameCodec {
    #[must_use]
    pub fn new(max_frame: usize) -> Self {
        Self { max_frame }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_BYTES)
    }
}

impl Decoder for FrameCodec {
    type Item = Value;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Value>, WireError> {
        if src.len() < LEN_HEADER {
            return Ok(None);
        }
        let mut len_bytes = [0u8; LEN_HEADER];
        len_bytes.copy_from_slice(&src[..LEN_HEADER]);
        let len = u32::from_be_bytes(len_bytes) as usize;

        if len > self.max_frame {
            // Peer is speaking a different protocol or is hostile; the link
            // layer tears the connection down on this error.
            return Err(WireError::OversizedFrame {
                len,
                max: self.max_frame,
            });
        }
        if src.len() < LEN_HEADER + len {
            src.reserve(LEN_HEADER + len - src.len());
            return Ok(None);
        }

        src.advance(LEN_HEADER);
        let payload = src.split_to(len);
        counter!("wire_frames_decoded_total").increment(1);
        decode(&payload).map(Some)
    }
}

impl Encoder<Value> for FrameCodec {
    type Error = WireError;

    fn encode(&mut self, value: Value, dst: &mut BytesMut) -> Result<(), WireError> {
        let payload = encode(&value)?;
        if payload.len() > self.max_frame {
            return Err(WireError::OversizedFrame {
                len: payload.len(),
                max: self.max_frame,
            });
        }
        let len = u32::try_from(payload.len())
            .map_err(|_| WireError::Encoding("payload exceeds u32 frame length".into()))?;
        dst.reserve(LEN_HEADER + payload.len());
        dst.put_u32(len);
        dst.extend_from_slice(&payload);
        counter!("wire_frames_encoded_total").increment(1);
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn sample_packet() -> Value {
        let mut services = ValueMap::new();
        services.insert("tell", 1);
        services.insert("channel", 1);
        Value::List(vec![
            Value::Str("tell".into()),
            Value::Int(200),
            Value::Str("Alpha".into()),
            Value::Str("alice".into()),
            Value::Str("Beta".into()),
            Value::Str("bob".into()),
            Value::Str("alice".into()),
            Value::Str("hi".into()),
            Value::Null,
            Value::Map(services),
        ])
    }

    #[rstest]
    #[case(Value::Null)]
    #[case(Value::Int(0))]
    #[case(Value::Int(i32::MIN))]
    #[case(Value::Int(i32::MAX))]
    #[case(Value::Str(String::new()))]
    #[case(Value::Str("héllo wörld".into()))]
    #[case(Value::List(vec![]))]
    #[case(Value::Map(ValueMap::new()))]
    #[case(sample_packet())]
    fn test_roundtrip(#[case] value: Value) {
        let bytes = encode(&value).unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!(back, value);
        // Byte-determinism: re-encoding the decoded tree reproduces the input.
        assert_eq!(encode(&back).unwrap(), bytes);
    }

    #[test]
    fn test_empty_string_and_null_stay_distinct() {
        let empty = encode(&Value::Str(String::new())).unwrap();
        let null = encode(&Value::Null).unwrap();
        assert_ne!(empty, null);
        assert_eq!(decode(&empty).unwrap(), Value::Str(String::new()));
        assert_eq!(decode(&null).unwrap(), Value::Null);
    }

    #[test]
    fn test_truncated_payload_is_malformed() {
        let mut bytes = encode(&sample_packet()).unwrap();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(decode(&bytes), Err(WireError::MalformedFrame(_))));
    }

    #[test]
    fn test_unknown_tag_is_malformed() {
        assert!(matches!(decode(&[0x09]), Err(WireError::MalformedFrame(_))));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = encode(&Value::Int(1)).unwrap();
        bytes.push(0);
        assert!(matches!(decode(&bytes), Err(WireError::MalformedFrame(_))));
    }

    #[test]
    fn test_invalid_utf8_replaced_not_dropped() {
        // string tag, length 2, bytes [0xff, 0xfe]
        let bytes = [TAG_STR, 0, 0, 0, 2, 0xff, 0xfe];
        let value = decode(&bytes).unwrap();
        assert_eq!(value, Value::Str("\u{fffd}\u{fffd}".into()));
    }

    #[test]
    fn test_frame_codec_roundtrip_and_partial_reads() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(sample_packet(), &mut buf).unwrap();
        codec.encode(Value::Int(7), &mut buf).unwrap();

        // Feed the codec one byte at a time; it must wait for whole frames.
        let mut feed = BytesMut::new();
        let mut decoded = Vec::new();
        for byte in buf.iter().copied() {
            feed.put_u8(byte);
            while let Some(value) = codec.decode(&mut feed).unwrap() {
                decoded.push(value);
            }
        }
        assert_eq!(decoded, vec![sample_packet(), Value::Int(7)]);
    }

    #[test]
    fn test_frame_codec_rejects_oversized() {
        let mut codec = FrameCodec::new(16);
        let mut buf = BytesMut::new();
        buf.put_u32(17);
        buf.extend_from_slice(&[0u8; 17]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(WireError::OversizedFrame { len: 17, max: 16 })
        ));
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let mut bytes = Vec::new();
        for _ in 0..(MAX_DEPTH + 2) {
            bytes.push(TAG_LIST);
            bytes.extend_from_slice(&1u32.to_be_bytes());
        }
        bytes.push(TAG_NULL);
        assert!(matches!(decode(&bytes), Err(WireError::MalformedFrame(_))));
    }
}
