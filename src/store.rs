//! Last-known-good-value state store.
//!
//! CoE senders transmit sparse updates: a V2 datagram carries only the
//! outputs that changed, and even V1 blocks arrive one at a time. The store
//! accumulates everything ever seen per [`PacketKey`] so that complete block
//! state can be reconstructed at any moment, both for presenting inbound
//! data to hosts and for re-encoding full frames on the outbound path.
//!
//! Backed by [`DashMap`] for lock-free concurrent access; merges of
//! different keys never contend.

use std::collections::BTreeMap;

use dashmap::DashMap;

use crate::codec::address;
use crate::codec::v1::BlockPayload;
use crate::core::data::{DataType, LogicalOutput, NodeUpdate, OutputValue, PacketKey};

/// One analog V1 slot: the value together with the unit it was sent under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogSlot {
    pub value: f64,
    pub unit: u8,
}

/// Accumulated state behind one packet key.
///
/// V1 keys use fixed slot arrays sized to the block layout; V2 keys hold a
/// sparse map over logical output numbers. `None` slots were never seen.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockState {
    Analog {
        slots: [Option<AnalogSlot>; 4],
    },
    Digital {
        bits: [Option<bool>; 16],
        unit: Option<u8>,
    },
    Sparse(BTreeMap<u16, LogicalOutput>),
}

impl BlockState {
    /// Empty state shaped for the given key.
    pub fn empty(key: PacketKey) -> Self {
        match key {
            PacketKey::V1 { block, .. } => match address::block_data_type(block) {
                DataType::Analog => Self::Analog { slots: [None; 4] },
                DataType::Digital => Self::Digital {
                    bits: [None; 16],
                    unit: None,
                },
            },
            PacketKey::V2 { .. } => Self::Sparse(BTreeMap::new()),
        }
    }

    /// Merge one output into this state. Later writes win.
    ///
    /// V1 outputs addressing a different block than the key's are ignored.
    pub fn apply(&mut self, key: PacketKey, out: &LogicalOutput) {
        match self {
            Self::Analog { slots } => {
                let block = v1_block(key);
                let info = address::block_info(DataType::Analog, out.output);
                if info.number == block {
                    slots[info.position] = Some(AnalogSlot {
                        value: out.value.as_f64(),
                        unit: out.unit,
                    });
                }
            }
            Self::Digital { bits, unit } => {
                let block = v1_block(key);
                let info = address::block_info(DataType::Digital, out.output);
                if info.number == block {
                    bits[info.position] = Some(out.value.as_bool());
                    *unit = Some(out.unit);
                }
            }
            Self::Sparse(outputs) => {
                outputs.insert(out.output, out.clone());
            }
        }
    }

    /// Look up the last known value of one logical output.
    pub fn get(&self, key: PacketKey, output: u16) -> Option<LogicalOutput> {
        match self {
            Self::Analog { slots } => {
                let info = address::block_info(DataType::Analog, output);
                if info.number != v1_block(key) {
                    return None;
                }
                slots[info.position].map(|slot| LogicalOutput {
                    output,
                    value: OutputValue::Analog(slot.value),
                    unit: slot.unit,
                })
            }
            Self::Digital { bits, unit } => {
                let info = address::block_info(DataType::Digital, output);
                if info.number != v1_block(key) {
                    return None;
                }
                bits[info.position].map(|bit| LogicalOutput {
                    output,
                    value: OutputValue::Digital(bit),
                    unit: unit.unwrap_or(0),
                })
            }
            Self::Sparse(outputs) => outputs.get(&output).cloned(),
        }
    }

    /// All outputs with a known value, in ascending output order.
    pub fn known_outputs(&self, key: PacketKey) -> Vec<LogicalOutput> {
        match self {
            Self::Analog { .. } | Self::Digital { .. } => {
                let block = v1_block(key);
                address::outputs_of_block(block, key.data_type())
                    .into_iter()
                    .filter_map(|output| self.get(key, output))
                    .collect()
            }
            Self::Sparse(outputs) => outputs.values().cloned().collect(),
        }
    }

    /// Complete block payload for V1 transmission.
    ///
    /// Slots never written default to zero (and digital bits to off),
    /// matching how controllers pad partially configured blocks. Returns
    /// `None` for V2 state.
    pub fn v1_payload(&self) -> Option<BlockPayload> {
        match self {
            Self::Analog { slots } => {
                let mut values = [0.0; 4];
                let mut units = [0u8; 4];
                for (pos, slot) in slots.iter().enumerate() {
                    if let Some(slot) = slot {
                        values[pos] = slot.value;
                        units[pos] = slot.unit;
                    }
                }
                Some(BlockPayload::Analog { values, units })
            }
            Self::Digital { bits, .. } => {
                let mut out = [false; 16];
                for (pos, bit) in bits.iter().enumerate() {
                    out[pos] = bit.unwrap_or(false);
                }
                Some(BlockPayload::Digital { bits: out })
            }
            Self::Sparse(_) => None,
        }
    }
}

fn v1_block(key: PacketKey) -> u8 {
    match key {
        PacketKey::V1 { block, .. } => block,
        // Slot variants are only built for V1 keys.
        PacketKey::V2 { .. } => 0,
    }
}

/// Concurrent LKGV store, one [`BlockState`] per packet key.
#[derive(Debug, Default)]
pub struct StateStore {
    blocks: DashMap<PacketKey, BlockState>,
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            blocks: DashMap::new(),
        }
    }

    /// Merge a sparse update into the state behind its key, creating the
    /// state on first reference. Returns the complete merged state.
    pub fn merge(&self, key: PacketKey, update: &NodeUpdate) -> BlockState {
        let mut entry = self
            .blocks
            .entry(key)
            .or_insert_with(|| BlockState::empty(key));
        for out in update.outputs.values() {
            entry.apply(key, out);
        }
        entry.clone()
    }

    /// Merge a single output write, creating the state on first reference.
    pub fn merge_output(&self, key: PacketKey, out: &LogicalOutput) -> BlockState {
        let mut entry = self
            .blocks
            .entry(key)
            .or_insert_with(|| BlockState::empty(key));
        entry.apply(key, out);
        entry.clone()
    }

    /// Last known value of one output, or `None` if never seen.
    pub fn read(&self, key: PacketKey, output: u16) -> Option<LogicalOutput> {
        self.blocks.get(&key).and_then(|state| state.get(key, output))
    }

    /// Complete state behind a key, or `None` if the key was never touched.
    pub fn snapshot(&self, key: PacketKey) -> Option<BlockState> {
        self.blocks.get(&key).map(|state| state.clone())
    }

    /// All keys with accumulated state.
    pub fn keys(&self) -> Vec<PacketKey> {
        self.blocks.iter().map(|entry| *entry.key()).collect()
    }

    /// Drop all accumulated state.
    pub fn clear(&self) {
        self.blocks.clear();
    }
}
