//! Cellular channel types: GsmBand, Channel

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// GSM frequency band, named the way the channel scanner names it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GsmBand {
    #[serde(rename = "GSM450")]
    Gsm450,
    #[serde(rename = "GSM480")]
    Gsm480,
    #[serde(rename = "GSM850")]
    Gsm850,
    #[serde(rename = "GSM900")]
    Gsm900,
    #[serde(rename = "GSM-R")]
    GsmR,
    #[serde(rename = "DCS1800")]
    Dcs1800,
    #[serde(rename = "PCS1900")]
    Pcs1900,
}

impl GsmBand {
    /// Scanner-facing name (`-b` argument)
    pub const fn as_str(self) -> &'static str {
        match self {
            GsmBand::Gsm450 => "GSM450",
            GsmBand::Gsm480 => "GSM480",
            GsmBand::Gsm850 => "GSM850",
            GsmBand::Gsm900 => "GSM900",
            GsmBand::GsmR => "GSM-R",
            GsmBand::Dcs1800 => "DCS1800",
            GsmBand::Pcs1900 => "PCS1900",
        }
    }
}

impl std::fmt::Display for GsmBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GsmBand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GSM450" => Ok(GsmBand::Gsm450),
            "GSM480" => Ok(GsmBand::Gsm480),
            "GSM850" => Ok(GsmBand::Gsm850),
            "GSM900" | "EGSM" | "E-GSM" => Ok(GsmBand::Gsm900),
            "GSM-R" | "GSMR" => Ok(GsmBand::GsmR),
            "DCS1800" | "GSM1800" => Ok(GsmBand::Dcs1800),
            "PCS1900" | "GSM1900" => Ok(GsmBand::Pcs1900),
            other => Err(format!("unknown GSM band '{other}'")),
        }
    }
}

/// One broadcast channel found by a scan.
///
/// Immutable once recorded. Uniqueness key is `arfcn`. Persisted verbatim to
/// the channel cache artifact as `{arfcn, frequency, power, band}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Channel {
    /// Absolute Radio Frequency Channel Number
    pub arfcn: String,
    /// Downlink centre frequency (MHz)
    pub frequency: f64,
    /// Received power at scan time (dB)
    pub power: f64,
    /// Band the channel was found in
    pub band: GsmBand,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_names_round_trip_through_serde() {
        let json = serde_json::to_string(&GsmBand::Dcs1800).unwrap();
        assert_eq!(json, "\"DCS1800\"");
        let back: GsmBand = serde_json::from_str("\"GSM-R\"").unwrap();
        assert_eq!(back, GsmBand::GsmR);
    }

    #[test]
    fn band_parse_accepts_aliases() {
        assert_eq!("gsm900".parse::<GsmBand>().unwrap(), GsmBand::Gsm900);
        assert_eq!("GSM1800".parse::<GsmBand>().unwrap(), GsmBand::Dcs1800);
        assert!("LTE20".parse::<GsmBand>().is_err());
    }
}
