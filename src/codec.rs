//! Wire codecs for the CoE protocol family.
//!
//! [`v1`] and [`v2`] implement the two frame formats bit for bit; [`address`]
//! translates between logical output numbers and the on-wire addressing of
//! each version; [`scaling`] applies the per-unit decimal factors.

pub mod address;
pub mod scaling;
pub mod v1;
pub mod v2;

use crate::core::data::{NodeUpdate, ProtocolVersion};
use crate::core::error::Result;

/// Decode one datagram under the given protocol version.
///
/// V1 frames always yield exactly one update; V2 frames yield one update
/// per (node, data type) pair present in the datagram.
pub fn decode(version: ProtocolVersion, bytes: &[u8]) -> Result<Vec<NodeUpdate>> {
    match version {
        ProtocolVersion::V1 => Ok(vec![v1::decode(bytes)?]),
        ProtocolVersion::V2 => v2::decode(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::data::DataType;

    #[test]
    fn test_decode_dispatches_by_version() {
        let mut v1_frame = vec![0u8; 14];
        v1_frame[0] = 5;
        v1_frame[1] = 1;
        let updates = decode(ProtocolVersion::V1, &v1_frame).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].node, 5);
        assert_eq!(updates[0].data_type, DataType::Analog);

        let v2_frame = vec![0x02, 0x00, 4, 0];
        let updates = decode(ProtocolVersion::V2, &v2_frame).unwrap();
        assert!(updates.is_empty());

        assert!(decode(ProtocolVersion::V2, &v1_frame).is_err());
    }
}
