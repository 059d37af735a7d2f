//! Conversions from `refill_config` types to core types.

use std::time::Duration;

use refill_traits::KeyType;

use crate::config::{AckStyle, BlockRange, ChannelSpec, StationConfig, TagAccess, TagKeySource};
use crate::error::BuildError;
use crate::gateway::WaterType;

impl From<refill_config::TagKeySource> for TagKeySource {
    fn from(c: refill_config::TagKeySource) -> Self {
        match c {
            refill_config::TagKeySource::Uid => Self::Uid,
            refill_config::TagKeySource::Content => Self::Content,
        }
    }
}

fn key_type(c: refill_config::KeyTypeCfg) -> KeyType {
    match c {
        refill_config::KeyTypeCfg::A => KeyType::A,
        refill_config::KeyTypeCfg::B => KeyType::B,
    }
}

impl From<&refill_config::IndicatorCfg> for AckStyle {
    fn from(c: &refill_config::IndicatorCfg) -> Self {
        match c.ack_mode {
            refill_config::AckMode::Blink => Self::Blink,
            refill_config::AckMode::Pulse => Self::Pulse(c.ack_blinks),
        }
    }
}

impl From<&refill_config::ChannelCfg> for ChannelSpec {
    fn from(c: &refill_config::ChannelCfg) -> Self {
        Self {
            name: c.name.clone(),
            water_type: WaterType::parse(&c.water_type),
            flow_ml_per_s: c.flow_ml_per_s,
        }
    }
}

impl TryFrom<&refill_config::TagCfg> for TagAccess {
    type Error = BuildError;

    fn try_from(c: &refill_config::TagCfg) -> Result<Self, BuildError> {
        let key = c
            .key_bytes()
            .map_err(|e| BuildError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            blocks: BlockRange {
                start: c.start_block,
                end: c.end_block,
            },
            key,
            key_type: key_type(c.key_type),
        })
    }
}

impl TryFrom<&refill_config::Config> for StationConfig {
    type Error = BuildError;

    fn try_from(c: &refill_config::Config) -> Result<Self, BuildError> {
        Ok(Self {
            station_id: c.station.id,
            settle: Duration::from_millis(c.station.settle_ms),
            poll_interval: Duration::from_millis(c.station.poll_ms),
            tag_key: c.station.tag_key.into(),
            tag_access: TagAccess::try_from(&c.tag)?,
            ack: AckStyle::from(&c.indicators),
            blink_half_period: Duration::from_millis(c.indicators.half_period_ms),
        })
    }
}
