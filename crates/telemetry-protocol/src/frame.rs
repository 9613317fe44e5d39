//! Type-length-value frame codec
//!
//! Wire layout: `[type][length][value; length]`. Decoding stops at the
//! declared length, so fixed-size notification buffers with trailing
//! padding decode to the frame they carry.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{FRAME_HEADER_SIZE, MAX_FRAME_VALUE, ProtocolError, ProtocolResult};

/// Type of message carried by a frame
///
/// Tags are bit flags so a peer can advertise a set of supported types in a
/// single byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Link liveness, empty value
    Heartbeat = 0x01,
    /// Fill level reading
    WaterLevel = 0x02,
    /// Reserved challenge value
    Nonce = 0x04,
}

impl MessageType {
    pub const ALL: [MessageType; 3] = [
        MessageType::Heartbeat,
        MessageType::WaterLevel,
        MessageType::Nonce,
    ];
}

impl From<MessageType> for u8 {
    fn from(kind: MessageType) -> Self {
        kind as u8
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(tag: u8) -> ProtocolResult<Self> {
        match tag {
            0x01 => Ok(MessageType::Heartbeat),
            0x02 => Ok(MessageType::WaterLevel),
            0x04 => Ok(MessageType::Nonce),
            other => Err(ProtocolError::InvalidMessageType(other)),
        }
    }
}

/// A single TLV frame
///
/// The value never exceeds [`MAX_FRAME_VALUE`] bytes, so the length byte
/// always equals `value.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub(crate) kind: MessageType,
    pub(crate) value: Bytes,
}

impl Frame {
    /// Build a frame, rejecting values the length byte cannot describe
    pub fn new(kind: MessageType, value: impl Into<Bytes>) -> ProtocolResult<Self> {
        let value = value.into();
        if value.len() > MAX_FRAME_VALUE {
            return Err(ProtocolError::PayloadTooLarge {
                size: value.len(),
                max: MAX_FRAME_VALUE,
            });
        }
        Ok(Self { kind, value })
    }

    /// Frame with no value
    pub fn empty(kind: MessageType) -> Self {
        Self {
            kind,
            value: Bytes::new(),
        }
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    /// Declared length of the value
    pub fn length(&self) -> u8 {
        // Bounded by the constructor
        self.value.len() as u8
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Size of the encoded frame in bytes
    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.value.len()
    }

    /// Serialize to bytes for transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.push(self.kind.into());
        out.push(self.length());
        out.extend_from_slice(&self.value);
        out
    }

    /// Deserialize from received bytes
    ///
    /// Bytes past the declared length are ignored.
    pub fn from_bytes(data: &[u8]) -> ProtocolResult<Self> {
        if data.len() < FRAME_HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                needed: FRAME_HEADER_SIZE,
                available: data.len(),
            });
        }

        let length = data[1] as usize;
        let rest = &data[FRAME_HEADER_SIZE..];
        if rest.len() < length {
            return Err(ProtocolError::Truncated {
                needed: FRAME_HEADER_SIZE + length,
                available: data.len(),
            });
        }

        let kind = MessageType::try_from(data[0])?;
        Ok(Self {
            kind,
            value: Bytes::copy_from_slice(&rest[..length]),
        })
    }
}

/// Encode `value` as a frame of type `kind`
pub fn encode(kind: MessageType, value: &[u8]) -> ProtocolResult<Vec<u8>> {
    Ok(Frame::new(kind, Bytes::copy_from_slice(value))?.to_bytes())
}

/// Decode one frame from the front of `data`
pub fn decode(data: &[u8]) -> ProtocolResult<Frame> {
    Frame::from_bytes(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_water_level_wire_layout() {
        let value = 10.0f32.to_le_bytes();
        let encoded = encode(MessageType::WaterLevel, &value).unwrap();
        assert_eq!(encoded, vec![2, 4, 0x00, 0x00, 0x20, 0x41]);
    }

    #[test]
    fn test_encode_rejects_oversized_value() {
        let value = vec![0u8; MAX_FRAME_VALUE + 1];
        let result = encode(MessageType::WaterLevel, &value);
        assert_eq!(
            result,
            Err(ProtocolError::PayloadTooLarge {
                size: 256,
                max: 255
            })
        );
    }

    #[test]
    fn test_encode_accepts_max_value() {
        let value = vec![0xAB; MAX_FRAME_VALUE];
        let encoded = encode(MessageType::Nonce, &value).unwrap();
        assert_eq!(encoded.len(), 257);
        assert_eq!(encoded[1], 255);
    }

    #[test]
    fn test_decode_short_header() {
        assert_eq!(
            decode(&[]),
            Err(ProtocolError::Truncated {
                needed: 2,
                available: 0
            })
        );
        assert!(matches!(
            decode(&[0x02]),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_declared_length_exceeds_data() {
        let result = decode(&[u8::from(MessageType::WaterLevel), 10]);
        assert_eq!(
            result,
            Err(ProtocolError::Truncated {
                needed: 12,
                available: 2
            })
        );
    }

    #[test]
    fn test_decode_ignores_trailing_padding() {
        let mut buffer = vec![0u8; 34];
        buffer[..6].copy_from_slice(&[2, 4, 0x00, 0x00, 0x20, 0x41]);
        let frame = decode(&buffer).unwrap();
        assert_eq!(frame.kind(), MessageType::WaterLevel);
        assert_eq!(frame.length(), 4);
        assert_eq!(frame.value(), &[0x00, 0x00, 0x20, 0x41]);
    }

    #[test]
    fn test_decode_unknown_type() {
        assert_eq!(
            decode(&[0x08, 0]),
            Err(ProtocolError::InvalidMessageType(0x08))
        );
    }

    #[test]
    fn test_empty_frame() {
        let frame = Frame::empty(MessageType::Heartbeat);
        assert_eq!(frame.to_bytes(), vec![1, 0]);
        assert_eq!(decode(&frame.to_bytes()).unwrap(), frame);
    }

    proptest! {
        #[test]
        fn frame_roundtrip(
            kind in prop::sample::select(MessageType::ALL.to_vec()),
            value in prop::collection::vec(any::<u8>(), 0..=MAX_FRAME_VALUE),
        ) {
            let encoded = encode(kind, &value).unwrap();
            let frame = decode(&encoded).unwrap();
            prop_assert_eq!(frame.kind(), kind);
            prop_assert_eq!(frame.length() as usize, value.len());
            prop_assert_eq!(frame.value(), &value[..]);
        }

        #[test]
        fn truncated_frames_rejected(
            kind in prop::sample::select(MessageType::ALL.to_vec()),
            value in prop::collection::vec(any::<u8>(), 1..=MAX_FRAME_VALUE),
            cut in any::<prop::sample::Index>(),
        ) {
            let encoded = encode(kind, &value).unwrap();
            let keep = cut.index(encoded.len());
            let result = decode(&encoded[..keep]);
            prop_assert!(
                matches!(result, Err(ProtocolError::Truncated { .. })),
                "expected truncation error, got {:?}",
                result
            );
        }
    }
}
