//! Core-side station settings, independent of the TOML schema.

use std::time::Duration;

use refill_traits::KeyType;

use crate::gateway::WaterType;
use crate::indicator::DEFAULT_HALF_PERIOD;

/// Which string identifies a tag to the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TagKeySource {
    #[default]
    Uid,
    Content,
}

/// Tag memory blocks `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub start: u8,
    pub end: u8,
}

impl Default for BlockRange {
    fn default() -> Self {
        Self { start: 4, end: 6 }
    }
}

impl BlockRange {
    /// Data blocks in the range; every fourth block is a sector trailer and is skipped.
    pub fn data_blocks(self) -> impl Iterator<Item = u8> {
        (self.start..self.end).filter(|b| b % 4 != 3)
    }
}

/// How the tag's data blocks are read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagAccess {
    pub blocks: BlockRange,
    pub key: [u8; 6],
    pub key_type: KeyType,
}

impl Default for TagAccess {
    fn default() -> Self {
        Self {
            blocks: BlockRange::default(),
            key: [0xFF; 6],
            key_type: KeyType::B,
        }
    }
}

/// Acknowledgement shown on the status indicator when a tag is recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStyle {
    /// Blink for as long as the preference lookup runs.
    Blink,
    /// Pulse this many times, then look up.
    Pulse(u32),
}

/// One configured water line, before outputs are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSpec {
    pub name: String,
    pub water_type: WaterType,
    pub flow_ml_per_s: f64,
}

impl ChannelSpec {
    pub fn pump_output(&self) -> String {
        format!("{}.pump", self.name)
    }

    pub fn indicator_output(&self) -> String {
        format!("{}.led", self.name)
    }
}

/// Name of the station-wide status indicator output.
pub const STATUS_OUTPUT: &str = "status";

#[derive(Debug, Clone, PartialEq)]
pub struct StationConfig {
    pub station_id: u32,
    /// Bottle placement pause before the pump starts
    pub settle: Duration,
    /// Reader poll timeout and pause after each detected tag
    pub poll_interval: Duration,
    pub tag_key: TagKeySource,
    pub tag_access: TagAccess,
    pub ack: AckStyle,
    pub blink_half_period: Duration,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            station_id: 0,
            settle: Duration::from_secs(3),
            poll_interval: Duration::from_millis(500),
            tag_key: TagKeySource::Uid,
            tag_access: TagAccess::default(),
            ack: AckStyle::Blink,
            blink_half_period: DEFAULT_HALF_PERIOD,
        }
    }
}
