//! Decimal scaling between raw wire integers and real values.
//!
//! Every analog value on the wire is a scaled integer; the unit id selects
//! the power-of-ten factor. V2 may scale a unit differently than V1 (see
//! [`crate::units::decimals`]).

use crate::core::data::ProtocolVersion;
use crate::units;

/// Convert a raw wire integer into its real value.
pub fn to_real(raw: i32, unit: u8, version: ProtocolVersion) -> f64 {
    let decimals = units::decimals(unit, version);
    raw as f64 / 10f64.powi(decimals as i32)
}

/// Convert a real value into the raw integer transmitted on the wire.
///
/// Rounds half away from zero. Range clamping is left to the frame
/// encoders since V1 and V2 carry different integer widths.
pub fn to_raw(value: f64, unit: u8, version: ProtocolVersion) -> i64 {
    let decimals = units::decimals(unit, version);
    (value * 10f64.powi(decimals as i32)).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temperature_scaling() {
        // Unit 1 (°C) carries one decimal: raw 225 is 22.5 °C.
        assert_eq!(to_real(225, 1, ProtocolVersion::V1), 22.5);
        assert_eq!(to_raw(22.5, 1, ProtocolVersion::V1), 225);
    }

    #[test]
    fn test_power_kw_differs_per_version() {
        // Unit 10 (kW): raw 2500 reads 250.0 under V1 but 25.0 under V2.
        assert_eq!(to_real(2500, 10, ProtocolVersion::V1), 250.0);
        assert_eq!(to_real(2500, 10, ProtocolVersion::V2), 25.0);
        assert_eq!(to_raw(25.0, 10, ProtocolVersion::V2), 2500);
    }

    #[test]
    fn test_unknown_unit_passes_through() {
        assert_eq!(to_real(1234, 200, ProtocolVersion::V1), 1234.0);
        assert_eq!(to_raw(1234.0, 200, ProtocolVersion::V2), 1234);
    }

    #[test]
    fn test_rounding() {
        // 22.55 at one decimal rounds half away from zero.
        assert_eq!(to_raw(22.55, 1, ProtocolVersion::V1), 226);
        assert_eq!(to_raw(-22.55, 1, ProtocolVersion::V1), -226);
    }

    #[test]
    fn test_round_trip_is_exact_for_every_unit() {
        // Covers the full unit table under both versions, including the
        // integer extremes each frame format can carry.
        let v1_raws = [i16::MIN as i32, -225, -1, 0, 1, 225, i16::MAX as i32];
        let v2_raws = [
            i32::MIN,
            -1_234_567_890,
            -1,
            0,
            1,
            1_234_567_890,
            i32::MAX,
        ];
        for id in units::known_ids() {
            for &raw in &v1_raws {
                let real = to_real(raw, id, ProtocolVersion::V1);
                assert_eq!(
                    to_raw(real, id, ProtocolVersion::V1),
                    raw as i64,
                    "unit {} raw {} under V1",
                    id,
                    raw
                );
            }
            for &raw in &v2_raws {
                let real = to_real(raw, id, ProtocolVersion::V2);
                assert_eq!(
                    to_raw(real, id, ProtocolVersion::V2),
                    raw as i64,
                    "unit {} raw {} under V2",
                    id,
                    raw
                );
            }
        }
    }

    #[test]
    fn test_zero_decimals() {
        assert_eq!(to_real(42, 0, ProtocolVersion::V1), 42.0);
        assert_eq!(to_raw(42.4, 0, ProtocolVersion::V1), 42);
    }
}
