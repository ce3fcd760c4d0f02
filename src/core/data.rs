//! Core data model for the CoE gateway.
//!
//! These types are version-agnostic: both wire codecs decode into
//! [`NodeUpdate`] and encode from it (or from per-block state derived from
//! it). Nothing here knows about byte layouts.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Highest addressable CAN node number on the CoE bus.
pub const MAX_NODE: u8 = 62;

/// The two incompatible CoE wire versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    V1,
    V2,
}

impl ProtocolVersion {
    /// Well-known UDP port for this version (5441 for V1, 5442 for V2).
    pub const fn port(&self) -> u16 {
        match self {
            Self::V1 => 5441,
            Self::V2 => 5442,
        }
    }

    /// Highest user-facing output number addressable under this version.
    pub const fn max_output(&self) -> u16 {
        match self {
            Self::V1 => 32,
            Self::V2 => 64,
        }
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V1 => write!(f, "1"),
            Self::V2 => write!(f, "2"),
        }
    }
}

/// Whether an addressable point is an analog channel or a digital bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Analog,
    Digital,
}

impl DataType {
    /// Short label used in status lines ("A" / "D").
    pub const fn short(&self) -> &'static str {
        match self {
            Self::Analog => "A",
            Self::Digital => "D",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Analog => write!(f, "analog"),
            Self::Digital => write!(f, "digital"),
        }
    }
}

/// A scaled logical value: a real number for analog points, a bool for
/// digital points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputValue {
    Analog(f64),
    Digital(bool),
}

impl OutputValue {
    /// Get the value as f64 (digital maps to 0.0 / 1.0).
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Analog(v) => *v,
            Self::Digital(v) => {
                if *v {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Get the value as bool (analog is true when nonzero).
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Analog(v) => *v != 0.0,
            Self::Digital(v) => *v,
        }
    }

    /// The data type this value belongs to.
    pub const fn data_type(&self) -> DataType {
        match self {
            Self::Analog(_) => DataType::Analog,
            Self::Digital(_) => DataType::Digital,
        }
    }
}

impl From<f64> for OutputValue {
    fn from(v: f64) -> Self {
        Self::Analog(v)
    }
}

impl From<bool> for OutputValue {
    fn from(v: bool) -> Self {
        Self::Digital(v)
    }
}

/// One addressable point in version-agnostic terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogicalOutput {
    /// 1-based user-facing output number.
    pub output: u16,

    /// Scaled value.
    pub value: OutputValue,

    /// Unit id from the wire (see [`crate::units`]).
    pub unit: u8,
}

impl LogicalOutput {
    /// Create a new logical output.
    pub fn new(output: u16, value: impl Into<OutputValue>, unit: u8) -> Self {
        Self {
            output,
            value: value.into(),
            unit,
        }
    }
}

/// A decoded (or to-be-encoded) set of outputs for one CAN node.
///
/// Inherently sparse: only outputs actually carried by a datagram — or
/// actually known after an LKGV merge — are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeUpdate {
    /// CAN node number (1..=62; 0 is a receive-side wildcard).
    pub node: u8,

    /// Analog or digital.
    pub data_type: DataType,

    /// V1 block number this update came from, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<u8>,

    /// Populated outputs, keyed by output number.
    pub outputs: BTreeMap<u16, LogicalOutput>,

    /// Sender address, when the update came off the wire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SocketAddr>,

    /// When the gateway received (or assembled) this update.
    pub received_at: DateTime<Utc>,
}

impl NodeUpdate {
    /// Create an empty update with the current timestamp.
    pub fn new(node: u8, data_type: DataType) -> Self {
        Self {
            node,
            data_type,
            block: None,
            outputs: BTreeMap::new(),
            source: None,
            received_at: Utc::now(),
        }
    }

    /// Set the V1 block number.
    #[must_use]
    pub fn with_block(mut self, block: u8) -> Self {
        self.block = Some(block);
        self
    }

    /// Set the source address.
    #[must_use]
    pub fn with_source(mut self, source: SocketAddr) -> Self {
        self.source = Some(source);
        self
    }

    /// Insert one output, replacing any previous entry for that number.
    pub fn insert(&mut self, output: LogicalOutput) {
        self.outputs.insert(output.output, output);
    }

    /// Look up one output by number.
    pub fn get(&self, output: u16) -> Option<&LogicalOutput> {
        self.outputs.get(&output)
    }

    /// Number of populated outputs.
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// True if no outputs are populated.
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// The addressable-unit key this update belongs to, if derivable.
    ///
    /// V2 updates always have one; V1 updates need a known block number.
    pub fn key(&self, version: ProtocolVersion) -> Option<PacketKey> {
        match version {
            ProtocolVersion::V1 => self.block.map(|block| PacketKey::V1 {
                node: self.node,
                block,
            }),
            ProtocolVersion::V2 => Some(PacketKey::V2 {
                node: self.node,
                kind: self.data_type,
            }),
        }
    }
}

/// Identifies one physical wire packet's worth of state.
///
/// All logical outputs sharing a key are encodable into a single datagram:
/// V1 addresses a fixed block, V2 addresses a (node, data type) group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "lowercase")]
pub enum PacketKey {
    V1 { node: u8, block: u8 },
    V2 { node: u8, kind: DataType },
}

impl PacketKey {
    /// The CAN node number.
    pub const fn node(&self) -> u8 {
        match self {
            Self::V1 { node, .. } | Self::V2 { node, .. } => *node,
        }
    }

    /// Analog or digital. V1 blocks 0 and 9 are the digital blocks.
    pub const fn data_type(&self) -> DataType {
        match self {
            Self::V1 { block, .. } => {
                if *block == 0 || *block == 9 {
                    DataType::Digital
                } else {
                    DataType::Analog
                }
            }
            Self::V2 { kind, .. } => *kind,
        }
    }

    /// The protocol version this key addresses.
    pub const fn version(&self) -> ProtocolVersion {
        match self {
            Self::V1 { .. } => ProtocolVersion::V1,
            Self::V2 { .. } => ProtocolVersion::V2,
        }
    }
}

impl std::fmt::Display for PacketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V1 { node, block } => write!(f, "{}-{}", node, block),
            Self::V2 { node, kind } => write!(f, "{}-{}", node, kind.short()),
        }
    }
}

/// Clamp a configured node number into the valid range.
///
/// `allow_zero` permits 0, the receive-side "any node" wildcard.
pub fn clamp_node(value: i64, allow_zero: bool) -> u8 {
    let min = if allow_zero { 0 } else { 1 };
    value.clamp(min, MAX_NODE as i64) as u8
}

/// Clamp a configured output number into the range the version supports.
pub fn clamp_output(value: i64, version: ProtocolVersion) -> u16 {
    value.clamp(1, version.max_output() as i64) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_value_conversions() {
        let v = OutputValue::from(22.5);
        assert_eq!(v.as_f64(), 22.5);
        assert!(v.as_bool());
        assert_eq!(v.data_type(), DataType::Analog);

        let v = OutputValue::from(false);
        assert_eq!(v.as_f64(), 0.0);
        assert!(!v.as_bool());
        assert_eq!(v.data_type(), DataType::Digital);
    }

    #[test]
    fn test_node_update_sparse_insert() {
        let mut update = NodeUpdate::new(5, DataType::Analog);
        update.insert(LogicalOutput::new(1, 22.5, 1));
        update.insert(LogicalOutput::new(3, 0.0, 0));

        assert_eq!(update.len(), 2);
        assert!(update.get(2).is_none());
        assert_eq!(update.get(1).unwrap().value.as_f64(), 22.5);
    }

    #[test]
    fn test_packet_key_data_type() {
        assert_eq!(
            PacketKey::V1 { node: 1, block: 0 }.data_type(),
            DataType::Digital
        );
        assert_eq!(
            PacketKey::V1 { node: 1, block: 9 }.data_type(),
            DataType::Digital
        );
        assert_eq!(
            PacketKey::V1 { node: 1, block: 3 }.data_type(),
            DataType::Analog
        );
        assert_eq!(
            PacketKey::V2 {
                node: 1,
                kind: DataType::Digital
            }
            .data_type(),
            DataType::Digital
        );
    }

    #[test]
    fn test_update_key_derivation() {
        let update = NodeUpdate::new(7, DataType::Analog).with_block(2);
        assert_eq!(
            update.key(ProtocolVersion::V1),
            Some(PacketKey::V1 { node: 7, block: 2 })
        );

        let update = NodeUpdate::new(7, DataType::Digital);
        assert_eq!(update.key(ProtocolVersion::V1), None);
        assert_eq!(
            update.key(ProtocolVersion::V2),
            Some(PacketKey::V2 {
                node: 7,
                kind: DataType::Digital
            })
        );
    }

    #[test]
    fn test_clamping() {
        assert_eq!(clamp_node(0, true), 0);
        assert_eq!(clamp_node(0, false), 1);
        assert_eq!(clamp_node(100, false), MAX_NODE);
        assert_eq!(clamp_output(0, ProtocolVersion::V1), 1);
        assert_eq!(clamp_output(40, ProtocolVersion::V1), 32);
        assert_eq!(clamp_output(40, ProtocolVersion::V2), 40);
        assert_eq!(clamp_output(100, ProtocolVersion::V2), 64);
    }
}
