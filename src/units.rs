//! Static unit registry.
//!
//! CoE datagrams carry a one-byte unit id per value. The id selects both the
//! display metadata (localized name, symbol) and the decimal-scaling factor
//! applied between raw wire integers and real values. The table is fixed by
//! the device firmware; a handful of units scale differently under V2
//! (currently unit 10, power in kW: 1 decimal under V1, 2 under V2).
//!
//! Unknown unit ids are never an error: they resolve to a sentinel with zero
//! decimals and a synthesized "Unknown (<id>)" name, so values pass through
//! unscaled.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::core::data::ProtocolVersion;

/// One entry of the unit table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitDefinition {
    /// Wire unit id.
    pub id: u8,
    /// Decimal places under V1 (and V2 unless overridden).
    pub decimals: u8,
    /// V2-specific decimal override; wins when encoding/decoding V2.
    pub v2_decimals: Option<u8>,
    /// True for digital display units (no symbol is shown for these).
    pub digital: bool,
    pub name_de: &'static str,
    pub name_en: &'static str,
    pub symbol_de: &'static str,
    pub symbol_en: &'static str,
}

/// Localized unit metadata as exposed to hosts and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitInfo {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Display language for unit metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    German,
    #[default]
    English,
}

impl Language {
    /// Resolve a language tag; anything starting with "de" selects German.
    pub fn from_tag(tag: &str) -> Self {
        if tag.to_ascii_lowercase().starts_with("de") {
            Self::German
        } else {
            Self::English
        }
    }
}

macro_rules! unit {
    ($id:expr, $dec:expr, $name_de:expr, $symb_de:expr, $name_en:expr, $symb_en:expr) => {
        UnitDefinition {
            id: $id,
            decimals: $dec,
            v2_decimals: None,
            digital: false,
            name_de: $name_de,
            name_en: $name_en,
            symbol_de: $symb_de,
            symbol_en: $symb_en,
        }
    };
}

const UNIT_DEFS: &[UnitDefinition] = &[
    unit!(0, 0, "Dimensionslos", "", "Dimensionless", ""),
    unit!(1, 1, "Temperatur °C", "°C", "Temperature °C", "°C"),
    unit!(2, 0, "Solarstrahlung", "W/m²", "Solar radiation", "W/m²"),
    unit!(3, 0, "Durchfluss l/h", "l/h", "Flow rate l/h", "l/h"),
    unit!(4, 0, "Sekunden", "Sek", "Seconds", "sec"),
    unit!(5, 0, "Minuten", "Min", "Minutes", "min"),
    unit!(6, 1, "Durchfluss l/Imp", "l/Imp", "Flow rate l/Imp", "l/Imp"),
    unit!(7, 1, "Temperatur", "K", "Temperature", "K"),
    unit!(8, 1, "Prozent", "%", "Percent", "%"),
    // Power kW scales differently under V2 (override below).
    UnitDefinition {
        id: 10,
        decimals: 1,
        v2_decimals: Some(2),
        digital: false,
        name_de: "Leistung kW",
        name_en: "Power kW",
        symbol_de: "kW",
        symbol_en: "kW",
    },
    unit!(11, 1, "Energie kWh", "kWh", "Energy kWh", "kWh"),
    unit!(12, 0, "Energie MWh", "MWh", "Energy MWh", "MWh"),
    unit!(13, 2, "Spannung", "V", "Voltage", "V"),
    unit!(14, 1, "Stromstärke mA", "mA", "Current mA", "mA"),
    unit!(15, 0, "Stunden", "Std", "Hours", "hr"),
    unit!(16, 0, "Tage", "Tage", "Days", "Days"),
    unit!(17, 0, "Anzahl Impulse", "Imp", "Number of pulses", "Imp"),
    unit!(18, 2, "Widerstand", "kΩ", "Resistance", "kΩ"),
    unit!(19, 0, "Liter", "l", "Liters", "l"),
    unit!(20, 0, "Geschwindigkeit km/h", "km/h", "Speed km/h", "km/h"),
    unit!(21, 2, "Frequenz", "Hz", "Frequency", "Hz"),
    unit!(22, 0, "Durchfluss l/min", "l/min", "Flow rate l/min", "l/min"),
    unit!(23, 2, "Druck bar", "bar", "Pressure bar", "bar"),
    unit!(24, 2, "Arbeitszahl", "", "COP", ""),
    unit!(25, 0, "Länge km", "km", "Length km", "km"),
    unit!(26, 1, "Länge m", "m", "Length m", "m"),
    unit!(27, 1, "Länge mm", "mm", "Length mm", "mm"),
    unit!(28, 0, "Kubikmeter", "m³", "Cubic meters", "m³"),
    unit!(35, 0, "Durchfluss l/d", "l/d", "Flow rate l/d", "l/d"),
    unit!(36, 0, "Geschwindigkeit m/s", "m/s", "Speed m/s", "m/s"),
    unit!(37, 0, "Durchfluss m³/min", "m³/min", "Flow rate m³/min", "m³/min"),
    unit!(38, 0, "Durchfluss m³/h", "m³/h", "Flow rate m³/h", "m³/h"),
    unit!(39, 0, "Durchfluss m³/d", "m³/d", "Flow rate m³/d", "m³/d"),
    unit!(40, 0, "Geschwindigkeit mm/min", "mm/min", "Speed mm/min", "mm/min"),
    unit!(41, 0, "Geschwindigkeit mm/h", "mm/h", "Speed mm/h", "mm/h"),
    unit!(42, 0, "Geschwindigkeit mm/d", "mm/d", "Speed mm/d", "mm/d"),
    UnitDefinition {
        id: 43,
        decimals: 0,
        v2_decimals: None,
        digital: true,
        name_de: "Digital (aus/ein)",
        name_en: "Digital (off/on)",
        symbol_de: "Aus/Ein",
        symbol_en: "Off/On",
    },
    UnitDefinition {
        id: 44,
        decimals: 0,
        v2_decimals: None,
        digital: true,
        name_de: "Digital (nein/ja)",
        name_en: "Digital (no/yes)",
        symbol_de: "Nein/Ja",
        symbol_en: "No/Yes",
    },
    unit!(46, 1, "RAS", "°C", "RAS", "°C"),
    unit!(50, 2, "Euro", "€", "Euro", "€"),
    unit!(51, 2, "Dollar", "$", "Dollar", "$"),
    unit!(52, 1, "Absolute Feuchte", "g/m³", "Absolute humidity", "g/m³"),
    unit!(53, 5, "Dimensionslos(,5)", "", "Dimensional (.5)", ""),
    unit!(54, 1, "Grad (Winkel)", "°", "Degrees (Angle)", "°"),
    unit!(56, 6, "Grad (1/100 .6)", "°", "Degrees (.6)", "°"),
    unit!(57, 1, "Sekunden", "s", "Seconds", "s"),
    unit!(58, 1, "Dimensionslos(,1)", "", "Dimensional (.1)", ""),
    unit!(59, 0, "Prozent (,0)", "%", "Percent (.0)", "%"),
    unit!(60, 0, "Uhrzeit", "h", "Time", "h"),
    unit!(63, 1, "Stromstärke A", "A", "Current A", "A"),
    unit!(65, 1, "Druck mbar", "mbar", "Pressure mbar", "mbar"),
    unit!(66, 0, "Druck Pa", "Pa", "Pressure Pa", "Pa"),
    unit!(67, 0, "CO2-Gehalt ppm", "ppm", "CO2 content ppm", "ppm"),
    unit!(68, 0, "", "", "", ""),
    unit!(69, 0, "Leistung W", "W", "Power W", "W"),
    unit!(70, 2, "Gewicht t", "t", "Weight t", "t"),
    unit!(71, 1, "Gewicht kg", "kg", "Weight kg", "kg"),
    unit!(72, 1, "Gewicht g", "g", "Weight g", "g"),
    unit!(73, 1, "Länge cm", "cm", "Length cm", "cm"),
    unit!(74, 0, "Temperatur K", "K", "Temperature K", "K"),
    unit!(75, 1, "Lichtstärke", "lx", "Light intensity", "lx"),
    unit!(76, 0, "Radonkonzentration", "Bq/m³", "Radon concentration", "Bq/m³"),
    unit!(77, 3, "Preis ct/kWh", "ct/kWh", "Price ct/kWh", "ct/kWh"),
    UnitDefinition {
        id: 78,
        decimals: 0,
        v2_decimals: None,
        digital: true,
        name_de: "Digital (geschl./offen)",
        name_en: "Digital (closed/open)",
        symbol_de: "Geschlossen/Offen",
        symbol_en: "Closed/Open",
    },
];

static UNIT_TABLE: Lazy<BTreeMap<u8, &'static UnitDefinition>> = Lazy::new(|| {
    UNIT_DEFS.iter().map(|def| (def.id, def)).collect()
});

/// Look up a unit definition by wire id.
pub fn lookup(id: u8) -> Option<&'static UnitDefinition> {
    UNIT_TABLE.get(&id).copied()
}

/// Iterator over every known unit id, ascending.
pub fn known_ids() -> impl Iterator<Item = u8> {
    UNIT_TABLE.keys().copied()
}

/// Decimal places for a unit under the given protocol version.
///
/// Unknown ids resolve to 0, so their values pass through unscaled.
pub fn decimals(id: u8, version: ProtocolVersion) -> u8 {
    match lookup(id) {
        Some(def) => match version {
            ProtocolVersion::V2 => def.v2_decimals.unwrap_or(def.decimals),
            ProtocolVersion::V1 => def.decimals,
        },
        None => 0,
    }
}

/// Localized metadata for one unit id, with the unknown-unit sentinel.
pub fn info(id: u8, lang: Language) -> UnitInfo {
    match lookup(id) {
        Some(def) => {
            let (name, symbol) = match lang {
                Language::German => (def.name_de, def.symbol_de),
                Language::English => (def.name_en, def.symbol_en),
            };
            UnitInfo {
                name: name.to_string(),
                // Digital display units carry state words, not a symbol.
                symbol: if def.digital {
                    String::new()
                } else {
                    symbol.to_string()
                },
                decimals: def.decimals,
            }
        }
        None => UnitInfo {
            name: format!("Unknown ({})", id),
            symbol: String::new(),
            decimals: 0,
        },
    }
}

/// Localized metadata for every known unit, keyed by id.
pub fn list_units(lang: Language) -> BTreeMap<u8, UnitInfo> {
    UNIT_TABLE.keys().map(|&id| (id, info(id, lang))).collect()
}

/// State word for a digital value under its display unit
/// (43 => off/on, 44 => no/yes, 78 => closed/open; anything else off/on).
pub fn digital_state_label(unit: u8, value: bool) -> &'static str {
    match (unit, value) {
        (44, true) => "yes",
        (44, false) => "no",
        (78, true) => "open",
        (78, false) => "closed",
        (_, true) => "on",
        (_, false) => "off",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_unit() {
        let def = lookup(1).unwrap();
        assert_eq!(def.name_en, "Temperature °C");
        assert_eq!(def.decimals, 1);
    }

    #[test]
    fn test_v2_override_wins() {
        // Unit 10 (kW): 1 decimal under V1, 2 under V2.
        assert_eq!(decimals(10, ProtocolVersion::V1), 1);
        assert_eq!(decimals(10, ProtocolVersion::V2), 2);
        // No override elsewhere.
        assert_eq!(decimals(1, ProtocolVersion::V1), 1);
        assert_eq!(decimals(1, ProtocolVersion::V2), 1);
    }

    #[test]
    fn test_unknown_unit_sentinel() {
        assert_eq!(decimals(200, ProtocolVersion::V1), 0);
        let info = info(200, Language::English);
        assert_eq!(info.name, "Unknown (200)");
        assert_eq!(info.symbol, "");
        assert_eq!(info.decimals, 0);
    }

    #[test]
    fn test_localization() {
        assert_eq!(info(10, Language::German).name, "Leistung kW");
        assert_eq!(info(10, Language::English).name, "Power kW");
        assert_eq!(Language::from_tag("de-AT"), Language::German);
        assert_eq!(Language::from_tag("DE"), Language::German);
        assert_eq!(Language::from_tag("en-US"), Language::English);
        assert_eq!(Language::from_tag(""), Language::English);
    }

    #[test]
    fn test_digital_units_have_no_symbol() {
        for id in [43u8, 44, 78] {
            assert!(lookup(id).unwrap().digital);
            assert_eq!(info(id, Language::English).symbol, "");
        }
    }

    #[test]
    fn test_digital_state_labels() {
        assert_eq!(digital_state_label(43, true), "on");
        assert_eq!(digital_state_label(44, false), "no");
        assert_eq!(digital_state_label(78, true), "open");
        assert_eq!(digital_state_label(78, false), "closed");
        assert_eq!(digital_state_label(0, false), "off");
    }

    #[test]
    fn test_list_units_complete() {
        let units = list_units(Language::English);
        assert_eq!(units.len(), UNIT_DEFS.len());
        assert_eq!(units.get(&1).unwrap().name, "Temperature °C");
    }
}
