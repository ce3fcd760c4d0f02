//! CoE V1 frame codec.
//!
//! Every V1 datagram is exactly 14 bytes and carries one block of one node:
//!
//! ```text
//! byte 0      node number
//! byte 1      block number
//! analog  (block 1..8):  bytes 2..10 four i16 LE raws, bytes 10..14 unit ids
//! digital (block 0 | 9): bytes 2..4  u16 LE bit field, byte 11 shared unit id
//! ```
//!
//! Digital frames on the wire zero-fill bytes 4..14 when transmitted; the
//! shared unit id at byte 11 is only ever populated by the controller side,
//! so outbound digital frames leave it zero.

use crate::codec::{address, scaling};
use crate::core::data::{DataType, LogicalOutput, NodeUpdate, ProtocolVersion};
use crate::core::error::{CoeError, Result};

/// Fixed V1 datagram size.
pub const FRAME_LEN: usize = 14;

/// Clamp bounds of the i16 analog raws.
const RAW_MIN: i64 = i16::MIN as i64;
const RAW_MAX: i64 = i16::MAX as i64;

/// Complete slot state of one block, as fed to the encoder.
///
/// V1 frames always transmit the whole block, so encoding takes full
/// arrays rather than sparse values.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockPayload {
    Analog { values: [f64; 4], units: [u8; 4] },
    Digital { bits: [bool; 16] },
}

/// Non-fatal condition noticed while encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeWarning {
    /// A scaled value left the i16 range and was clamped.
    RangeOverflow { slot: usize, value: f64, raw: i64 },
}

impl std::fmt::Display for EncodeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RangeOverflow { slot, value, raw } => write!(
                f,
                "value {} in slot {} scales to {} which exceeds the 16-bit range",
                value, slot, raw
            ),
        }
    }
}

/// An encoded frame plus any warnings raised while producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPacket {
    pub bytes: Vec<u8>,
    pub warnings: Vec<EncodeWarning>,
}

/// Decode one V1 datagram into a complete block update.
///
/// Slot positions are translated to logical output numbers, so the
/// result addresses values the same way V2 updates do.
pub fn decode(bytes: &[u8]) -> Result<NodeUpdate> {
    if bytes.len() != FRAME_LEN {
        return Err(CoeError::LengthMismatch {
            expected: FRAME_LEN,
            actual: bytes.len(),
        });
    }

    let node = bytes[0];
    let block = bytes[1];
    let data_type = address::block_data_type(block);
    let mut update = NodeUpdate::new(node, data_type).with_block(block);

    match data_type {
        DataType::Digital => {
            let bit_field = u16::from_le_bytes([bytes[2], bytes[3]]);
            let unit = bytes[11];
            for pos in 0..16 {
                let output = address::output_at(block, DataType::Digital, pos);
                let bit = (bit_field >> pos) & 1 == 1;
                update.insert(LogicalOutput::new(output, bit, unit));
            }
        }
        DataType::Analog => {
            for pos in 0..4 {
                let raw = i16::from_le_bytes([bytes[2 + pos * 2], bytes[3 + pos * 2]]);
                let unit = bytes[10 + pos];
                let output = address::output_at(block, DataType::Analog, pos);
                let value = scaling::to_real(raw as i32, unit, ProtocolVersion::V1);
                update.insert(LogicalOutput::new(output, value, unit));
            }
        }
    }

    Ok(update)
}

/// Encode the complete state of one block into a V1 datagram.
///
/// Analog raws outside the i16 range are clamped; each clamp is reported
/// as a warning rather than an error so transmission still proceeds.
pub fn encode(node: u8, block: u8, payload: &BlockPayload) -> EncodedPacket {
    let mut bytes = vec![0u8; FRAME_LEN];
    let mut warnings = Vec::new();

    bytes[0] = node;
    bytes[1] = block;

    match payload {
        BlockPayload::Digital { bits } => {
            let mut bit_field = 0u16;
            for (pos, &bit) in bits.iter().enumerate() {
                if bit {
                    bit_field |= 1 << pos;
                }
            }
            bytes[2..4].copy_from_slice(&bit_field.to_le_bytes());
            // bytes 4..14 stay zero
        }
        BlockPayload::Analog { values, units } => {
            for pos in 0..4 {
                let raw = scaling::to_raw(values[pos], units[pos], ProtocolVersion::V1);
                if !(RAW_MIN..=RAW_MAX).contains(&raw) {
                    warnings.push(EncodeWarning::RangeOverflow {
                        slot: pos,
                        value: values[pos],
                        raw,
                    });
                }
                let clamped = raw.clamp(RAW_MIN, RAW_MAX) as i16;
                bytes[2 + pos * 2..4 + pos * 2].copy_from_slice(&clamped.to_le_bytes());
                bytes[10 + pos] = units[pos];
            }
        }
    }

    EncodedPacket { bytes, warnings }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_analog_block() {
        // Node 5, block 1, slot 0 = raw 225 unit 1 (22.5 °C).
        let mut frame = vec![0u8; 14];
        frame[0] = 5;
        frame[1] = 1;
        frame[2..4].copy_from_slice(&225i16.to_le_bytes());
        frame[10] = 1;

        let update = decode(&frame).unwrap();
        assert_eq!(update.node, 5);
        assert_eq!(update.block, Some(1));
        assert_eq!(update.data_type, DataType::Analog);
        assert_eq!(update.len(), 4);

        let out = update.get(1).unwrap();
        assert_eq!(out.value.as_f64(), 22.5);
        assert_eq!(out.unit, 1);
        // Remaining slots decode as zeros with unit 0.
        assert_eq!(update.get(2).unwrap().value.as_f64(), 0.0);
        assert_eq!(update.get(4).unwrap().unit, 0);
    }

    #[test]
    fn test_decode_digital_blocks() {
        let mut frame = vec![0u8; 14];
        frame[0] = 3;
        frame[1] = 0;
        frame[2..4].copy_from_slice(&0b101u16.to_le_bytes());
        frame[11] = 43;

        let update = decode(&frame).unwrap();
        assert_eq!(update.data_type, DataType::Digital);
        assert_eq!(update.len(), 16);
        assert!(update.get(1).unwrap().value.as_bool());
        assert!(!update.get(2).unwrap().value.as_bool());
        assert!(update.get(3).unwrap().value.as_bool());
        assert_eq!(update.get(1).unwrap().unit, 43);

        // Block 9 carries outputs 17..32.
        frame[1] = 9;
        let update = decode(&frame).unwrap();
        assert!(update.get(17).unwrap().value.as_bool());
        assert!(update.get(1).is_none());
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let err = decode(&[0u8; 13]).unwrap_err();
        match err {
            CoeError::LengthMismatch { expected, actual } => {
                assert_eq!(expected, 14);
                assert_eq!(actual, 13);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_encode_analog_round_trip() {
        let payload = BlockPayload::Analog {
            values: [22.5, -4.0, 0.0, 100.0],
            units: [1, 1, 0, 0],
        };
        let packet = encode(5, 1, &payload);
        assert!(packet.warnings.is_empty());
        assert_eq!(packet.bytes.len(), 14);

        let update = decode(&packet.bytes).unwrap();
        assert_eq!(update.get(1).unwrap().value.as_f64(), 22.5);
        assert_eq!(update.get(2).unwrap().value.as_f64(), -4.0);
        assert_eq!(update.get(4).unwrap().value.as_f64(), 100.0);
    }

    #[test]
    fn test_encode_clamps_out_of_range() {
        // 500.0 V on unit 13 (two decimals) scales to 50000, beyond i16.
        let payload = BlockPayload::Analog {
            values: [500.0, 0.0, 0.0, 0.0],
            units: [13, 0, 0, 0],
        };
        let packet = encode(1, 1, &payload);
        assert_eq!(packet.warnings.len(), 1);
        assert!(matches!(
            packet.warnings[0],
            EncodeWarning::RangeOverflow { slot: 0, raw: 50000, .. }
        ));
        let raw = i16::from_le_bytes([packet.bytes[2], packet.bytes[3]]);
        assert_eq!(raw, i16::MAX);
    }

    #[test]
    fn test_encode_digital_zero_fills_tail() {
        let mut bits = [false; 16];
        bits[0] = true;
        bits[15] = true;
        let packet = encode(2, 9, &BlockPayload::Digital { bits });
        assert!(packet.warnings.is_empty());
        assert_eq!(packet.bytes[0], 2);
        assert_eq!(packet.bytes[1], 9);
        assert_eq!(
            u16::from_le_bytes([packet.bytes[2], packet.bytes[3]]),
            0x8001
        );
        assert!(packet.bytes[4..].iter().all(|&b| b == 0));
    }
}
