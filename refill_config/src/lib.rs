#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the refill station.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Values are static for the lifetime of the process; there is no reload.
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TagKeySource {
    /// Reader UID as `AA:BB:CC:DD`
    #[default]
    Uid,
    /// Text decoded from the tag's data blocks
    Content,
}

#[derive(Debug, Deserialize)]
pub struct StationCfg {
    pub id: u32,
    /// Pause between accepting a tag and starting the pump (bottle placement)
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Reader poll timeout per presence check
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    #[serde(default)]
    pub tag_key: TagKeySource,
}

fn default_settle_ms() -> u64 {
    3000
}

fn default_poll_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyTypeCfg {
    A,
    #[default]
    B,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TagCfg {
    /// First block to read (inclusive)
    pub start_block: u8,
    /// Last block to read (exclusive)
    pub end_block: u8,
    /// Six-byte sector key as 12 hex digits
    pub key: String,
    pub key_type: KeyTypeCfg,
}

impl Default for TagCfg {
    fn default() -> Self {
        Self {
            start_block: 4,
            end_block: 6,
            key: "FFFFFFFFFFFF".to_string(),
            key_type: KeyTypeCfg::B,
        }
    }
}

impl TagCfg {
    pub fn key_bytes(&self) -> eyre::Result<[u8; 6]> {
        let bytes = parse_hex(&self.key)?;
        <[u8; 6]>::try_from(bytes.as_slice())
            .map_err(|_| eyre::eyre!("tag.key must be 6 bytes (12 hex digits), got {}", bytes.len()))
    }
}

#[derive(Debug, Deserialize)]
pub struct BackendCfg {
    pub base_url: String,
    /// Per-request timeout for lookups and reports
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Deserialize)]
pub struct TelemetryCfg {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Topic prefix; the user topic is `{base_topic}User-{user_id}`
    pub base_topic: String,
    #[serde(default)]
    pub qos: u8,
    #[serde(default = "default_true")]
    pub tls: bool,
}

fn default_mqtt_port() -> u16 {
    8883
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AckMode {
    /// Blink the status indicator for as long as the lookup runs
    #[default]
    Blink,
    /// Pulse the status indicator `ack_blinks` times before the lookup
    Pulse,
}

#[derive(Debug, Deserialize)]
pub struct IndicatorCfg {
    pub status_pin: u8,
    #[serde(default)]
    pub status_active_low: bool,
    #[serde(default = "default_half_period_ms")]
    pub half_period_ms: u64,
    #[serde(default = "default_ack_blinks")]
    pub ack_blinks: u32,
    #[serde(default)]
    pub ack_mode: AckMode,
}

fn default_half_period_ms() -> u64 {
    200
}

fn default_ack_blinks() -> u32 {
    3
}

#[derive(Debug, Deserialize)]
pub struct PanicCfg {
    pub pin: u8,
    #[serde(default = "default_true")]
    pub active_low: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct InputsCfg {
    pub debounce_ms: u64,
    /// Buttons pull to ground when pressed
    pub active_low: bool,
}

impl Default for InputsCfg {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            active_low: true,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChannelCfg {
    pub name: String,
    pub water_type: String,
    pub pump_pin: u8,
    #[serde(default)]
    pub pump_active_low: bool,
    pub indicator_pin: u8,
    pub flow_ml_per_s: f64,
    pub button_pin: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub station: StationCfg,
    #[serde(default)]
    pub tag: TagCfg,
    pub backend: BackendCfg,
    /// Optional message broker; no telemetry is published without it
    #[serde(default)]
    pub telemetry: Option<TelemetryCfg>,
    pub indicators: IndicatorCfg,
    #[serde(default)]
    pub panic: Option<PanicCfg>,
    #[serde(default)]
    pub inputs: InputsCfg,
    #[serde(rename = "channel", default)]
    pub channels: Vec<ChannelCfg>,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_path(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {}", path.display(), e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {}: {}", path.display(), e))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Decode a hex string (whitespace and `:` separators allowed).
pub fn parse_hex(s: &str) -> eyre::Result<Vec<u8>> {
    let digits: Vec<u8> = s
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b':')
        .collect();
    if digits.len() % 2 != 0 {
        eyre::bail!("hex input has an odd number of digits");
    }
    digits
        .chunks(2)
        .map(|pair| {
            let hi = hex_val(pair[0])?;
            let lo = hex_val(pair[1])?;
            Ok((hi << 4) | lo)
        })
        .collect()
}

fn hex_val(c: u8) -> eyre::Result<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => eyre::bail!("invalid hex digit {:?}", c as char),
    }
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Station
        if self.station.poll_ms == 0 {
            eyre::bail!("station.poll_ms must be >= 1");
        }
        if self.station.settle_ms > 60 * 1000 {
            eyre::bail!("station.settle_ms is unreasonably large (>60s)");
        }

        // Tag
        if self.tag.end_block <= self.tag.start_block {
            eyre::bail!("tag.end_block must be greater than tag.start_block");
        }
        self.tag.key_bytes()?;

        // Backend
        if self.backend.base_url.trim().is_empty() {
            eyre::bail!("backend.base_url must not be empty");
        }
        if self.backend.timeout_ms == 0 {
            eyre::bail!("backend.timeout_ms must be >= 1");
        }

        // Telemetry
        if let Some(t) = &self.telemetry {
            if t.host.trim().is_empty() {
                eyre::bail!("telemetry.host must not be empty");
            }
            if t.qos > 1 {
                eyre::bail!("telemetry.qos must be 0 or 1");
            }
            if t.username.is_some() != t.password.is_some() {
                eyre::bail!("telemetry.username and telemetry.password must be set together");
            }
        }

        // Indicators
        if self.indicators.half_period_ms == 0 {
            eyre::bail!("indicators.half_period_ms must be >= 1");
        }

        // Channels
        if self.channels.is_empty() {
            eyre::bail!("at least one [[channel]] is required");
        }
        let mut names = HashSet::new();
        let mut water_types = HashSet::new();
        for ch in &self.channels {
            if ch.name.trim().is_empty() {
                eyre::bail!("channel.name must not be empty");
            }
            if !names.insert(ch.name.as_str()) {
                eyre::bail!("duplicate channel name {:?}", ch.name);
            }
            if !water_types.insert(ch.water_type.to_ascii_lowercase()) {
                eyre::bail!("duplicate channel water_type {:?}", ch.water_type);
            }
            if !(ch.flow_ml_per_s.is_finite() && ch.flow_ml_per_s > 0.0) {
                eyre::bail!("channel {:?}: flow_ml_per_s must be > 0", ch.name);
            }
        }

        // Pins: every physical line is claimed once
        let mut pins = HashSet::new();
        let mut claim = |pin: u8, what: String| -> eyre::Result<()> {
            if !pins.insert(pin) {
                eyre::bail!("pin {pin} is assigned twice (at {what})");
            }
            Ok(())
        };
        claim(self.indicators.status_pin, "indicators.status_pin".into())?;
        if let Some(p) = &self.panic {
            claim(p.pin, "panic.pin".into())?;
        }
        for ch in &self.channels {
            claim(ch.pump_pin, format!("channel {:?} pump_pin", ch.name))?;
            claim(ch.indicator_pin, format!("channel {:?} indicator_pin", ch.name))?;
            if let Some(b) = ch.button_pin {
                claim(b, format!("channel {:?} button_pin", ch.name))?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_accepts_separators() {
        assert_eq!(parse_hex("FF:ff 01").unwrap(), vec![0xFF, 0xFF, 0x01]);
        assert!(parse_hex("F").is_err());
        assert!(parse_hex("GG").is_err());
    }

    #[test]
    fn key_bytes_requires_six_bytes() {
        let mut tag = TagCfg::default();
        assert_eq!(tag.key_bytes().unwrap(), [0xFF; 6]);
        tag.key = "FFFF".into();
        assert!(tag.key_bytes().is_err());
    }
}
