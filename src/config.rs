//! Session configuration: CAN addressing and ISO-TP tuning, loadable from a TOML file or
//! assembled from CLI flags. Modeled on `sdv-playground/SOVDd`'s `example-ecu` config loader
//! (`config --config <path>`, CLI flags overriding file values field-by-field); this is pure
//! ambient plumbing, never sent over the wire.

use crate::isotp::IsoTpSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// CAN identifiers that together define one diagnostic session's addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSet {
    /// Tester → ECU physical request id.
    pub phys_source: u32,
    /// ECU → tester physical response id.
    pub phys_target: u32,
    /// Functional (broadcast) request id.
    pub func_source: u32,
}

impl Default for AddressSet {
    fn default() -> Self {
        Self {
            phys_source: 0x7E0,
            phys_target: 0x7E8,
            func_source: 0x7DF,
        }
    }
}

/// Full session configuration: addressing, interface, and ISO-TP tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// CAN interface name (e.g. `can0`, `vcan0`).
    #[serde(default = "default_interface")]
    pub interface_name: String,
    /// Addressing for this session.
    #[serde(default)]
    pub addresses: AddressSet,
    /// ISO-TP pacing parameters.
    #[serde(default)]
    pub isotp: IsoTpSettings,
}

fn default_interface() -> String {
    "vcan0".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface_name: default_interface(),
            addresses: AddressSet::default(),
            isotp: IsoTpSettings::default(),
        }
    }
}

impl Config {
    /// Loads a config from a TOML file on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let cfg = toml::from_str(&text)?;
        Ok(cfg)
    }
}

/// Errors raised loading or parsing a [`Config`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The config file was not valid TOML, or had the wrong shape.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Parses a `0x`-prefixed or plain decimal CAN id from a CLI flag.
pub fn parse_can_id(raw: &str) -> Result<u32, std::num::ParseIntError> {
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => raw.parse::<u32>(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_and_decimal_ids() {
        assert_eq!(parse_can_id("0x7E0").unwrap(), 0x7E0);
        assert_eq!(parse_can_id("2016").unwrap(), 2016);
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let cfg = Config::default();
        let text = toml::to_string(&cfg).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.addresses, cfg.addresses);
        assert_eq!(back.interface_name, cfg.interface_name);
    }
}
