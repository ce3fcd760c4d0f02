//! Logical-output addressing.
//!
//! V1 addresses values by (block, position): analog outputs 1..32 map to
//! blocks 1..8 with four slots each, digital outputs 1..16 to block 0 and
//! 17..32 to block 9 with sixteen bits each. V2 addresses values by a flat
//! wire output number: 1..=254 is digital output N directly, 255+N is
//! analog output N.

use crate::core::data::{DataType, PacketKey, ProtocolVersion};

/// V1 digital blocks.
pub const DIGITAL_BLOCK_LOW: u8 = 0;
pub const DIGITAL_BLOCK_HIGH: u8 = 9;

/// V2 wire outputs above this carry analog values offset by it.
pub const V2_ANALOG_BASE: u16 = 255;

/// Position of an output inside its V1 block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub number: u8,
    pub position: usize,
}

/// V1 block and slot for a logical output number.
///
/// Outputs below 1 fall back to block 1 position 0, matching device
/// firmware behavior for out-of-range addressing.
pub fn block_info(data_type: DataType, output: u16) -> BlockInfo {
    if output < 1 {
        return BlockInfo {
            number: 1,
            position: 0,
        };
    }
    match data_type {
        DataType::Analog => BlockInfo {
            number: ((output - 1) / 4 + 1) as u8,
            position: ((output - 1) % 4) as usize,
        },
        DataType::Digital => {
            if output <= 16 {
                BlockInfo {
                    number: DIGITAL_BLOCK_LOW,
                    position: (output - 1) as usize,
                }
            } else {
                BlockInfo {
                    number: DIGITAL_BLOCK_HIGH,
                    position: (output - 17) as usize,
                }
            }
        }
    }
}

/// Logical output number at a V1 block position.
pub fn output_at(block: u8, data_type: DataType, position: usize) -> u16 {
    match data_type {
        DataType::Analog => (block as u16 - 1) * 4 + 1 + position as u16,
        DataType::Digital => {
            let start = if block == DIGITAL_BLOCK_LOW { 1 } else { 17 };
            start + position as u16
        }
    }
}

/// All logical outputs carried by a V1 block, in slot order.
pub fn outputs_of_block(block: u8, data_type: DataType) -> Vec<u16> {
    let slots = match data_type {
        DataType::Analog => 4,
        DataType::Digital => 16,
    };
    (0..slots).map(|pos| output_at(block, data_type, pos)).collect()
}

/// Whether a V1 block number carries digital values.
pub fn block_data_type(block: u8) -> DataType {
    if block == DIGITAL_BLOCK_LOW || block == DIGITAL_BLOCK_HIGH {
        DataType::Digital
    } else {
        DataType::Analog
    }
}

/// Split a V2 wire output into data type and logical output number.
pub fn v2_wire_to_logical(wire: u16) -> (DataType, u16) {
    if wire <= V2_ANALOG_BASE - 1 {
        (DataType::Digital, wire)
    } else {
        (DataType::Analog, wire - V2_ANALOG_BASE)
    }
}

/// Build the V2 wire output for a logical output number.
pub fn v2_logical_to_wire(data_type: DataType, output: u16) -> u16 {
    match data_type {
        DataType::Digital => output,
        DataType::Analog => output + V2_ANALOG_BASE,
    }
}

/// Coalescing key for one logical output under the given version:
/// V1 groups by (node, block), V2 by (node, data type).
pub fn packet_key_for(
    version: ProtocolVersion,
    data_type: DataType,
    node: u8,
    output: u16,
) -> PacketKey {
    match version {
        ProtocolVersion::V1 => PacketKey::V1 {
            node,
            block: block_info(data_type, output).number,
        },
        ProtocolVersion::V2 => PacketKey::V2 {
            node,
            kind: data_type,
        },
    }
}
