//! CoE V2 frame codec.
//!
//! V2 datagrams carry a variable number of independently addressed values:
//!
//! ```text
//! byte 0   version low  (0x02)
//! byte 1   version high (0x00)
//! byte 2   message length (4 + count * 8)
//! byte 3   entry count (max 16)
//! then count entries of 8 bytes each:
//!   +0  node number
//!   +1  wire output, u16 LE (<= 254 digital, > 254 analog offset by 255)
//!   +3  unit id
//!   +4  raw value, i32 LE
//! ```
//!
//! Unlike V1 a single datagram may mix nodes and data types; decoding
//! groups entries into one sparse update per (node, data type) pair.

use std::collections::BTreeMap;

use crate::codec::{address, scaling};
use crate::core::data::{
    DataType, LogicalOutput, NodeUpdate, OutputValue, ProtocolVersion,
};
use crate::core::error::{CoeError, Result};

/// V2 header magic.
pub const VERSION_LOW: u8 = 0x02;
pub const VERSION_HIGH: u8 = 0x00;

/// Header and per-entry sizes.
pub const HEADER_LEN: usize = 4;
pub const ENTRY_LEN: usize = 8;

/// Hard cap on entries per datagram.
pub const MAX_ENTRIES: usize = 16;

/// One value to transmit, addressed by its logical output number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct V2Output {
    pub output: u16,
    pub unit: u8,
    pub value: OutputValue,
}

/// Decode one V2 datagram into sparse per-node updates.
///
/// Entries are grouped by (node, data type); output numbers inside each
/// update are logical, with the analog wire offset already removed.
///
/// The declared length byte is not validated; the entry count alone
/// determines the expected datagram size.
pub fn decode(bytes: &[u8]) -> Result<Vec<NodeUpdate>> {
    if bytes.len() < HEADER_LEN {
        return Err(CoeError::LengthMismatch {
            expected: HEADER_LEN,
            actual: bytes.len(),
        });
    }
    if bytes[0] != VERSION_LOW || bytes[1] != VERSION_HIGH {
        return Err(CoeError::VersionMismatch {
            low: bytes[0],
            high: bytes[1],
        });
    }

    let count = bytes[3] as usize;
    let expected = HEADER_LEN + count * ENTRY_LEN;
    if bytes.len() != expected {
        return Err(CoeError::LengthMismatch {
            expected,
            actual: bytes.len(),
        });
    }

    let mut groups: BTreeMap<(u8, DataType), NodeUpdate> = BTreeMap::new();
    for i in 0..count {
        let off = HEADER_LEN + i * ENTRY_LEN;
        let node = bytes[off];
        let wire = u16::from_le_bytes([bytes[off + 1], bytes[off + 2]]);
        let unit = bytes[off + 3];
        let raw = i32::from_le_bytes([
            bytes[off + 4],
            bytes[off + 5],
            bytes[off + 6],
            bytes[off + 7],
        ]);

        let (data_type, output) = address::v2_wire_to_logical(wire);
        let value = match data_type {
            DataType::Digital => OutputValue::Digital(raw != 0),
            DataType::Analog => {
                OutputValue::Analog(scaling::to_real(raw, unit, ProtocolVersion::V2))
            }
        };

        groups
            .entry((node, data_type))
            .or_insert_with(|| NodeUpdate::new(node, data_type))
            .insert(LogicalOutput { output, value, unit });
    }

    Ok(groups.into_values().collect())
}

/// Encode up to [`MAX_ENTRIES`] values for one node into a V2 datagram.
pub fn encode(node: u8, outputs: &[V2Output]) -> Result<Vec<u8>> {
    if outputs.len() > MAX_ENTRIES {
        return Err(CoeError::TooManyEntries {
            count: outputs.len(),
        });
    }

    let len = HEADER_LEN + outputs.len() * ENTRY_LEN;
    let mut bytes = vec![0u8; len];
    bytes[0] = VERSION_LOW;
    bytes[1] = VERSION_HIGH;
    bytes[2] = len as u8;
    bytes[3] = outputs.len() as u8;

    for (i, out) in outputs.iter().enumerate() {
        let off = HEADER_LEN + i * ENTRY_LEN;
        let (wire, raw) = match out.value {
            OutputValue::Digital(state) => (
                address::v2_logical_to_wire(DataType::Digital, out.output),
                state as i32,
            ),
            OutputValue::Analog(value) => {
                let raw = scaling::to_raw(value, out.unit, ProtocolVersion::V2)
                    .clamp(i32::MIN as i64, i32::MAX as i64) as i32;
                (address::v2_logical_to_wire(DataType::Analog, out.output), raw)
            }
        };
        bytes[off] = node;
        bytes[off + 1..off + 3].copy_from_slice(&wire.to_le_bytes());
        bytes[off + 3] = out.unit;
        bytes[off + 4..off + 8].copy_from_slice(&raw.to_le_bytes());
    }

    Ok(bytes)
}

/// Encode an arbitrary number of values, splitting across datagrams of at
/// most [`MAX_ENTRIES`] entries each.
pub fn encode_chunked(node: u8, outputs: &[V2Output]) -> Vec<Vec<u8>> {
    outputs
        .chunks(MAX_ENTRIES)
        .filter_map(|chunk| encode(node, chunk).ok())
        .collect()
}
