use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StationError {
    #[error("authentication failed for block {block}")]
    BlockAuthFailed { block: u8 },
    #[error("read failed for block {block}")]
    BlockReadFailed { block: u8 },
    #[error("preference lookup failed: {0}")]
    LookupFailed(String),
    #[error("no channel dispenses water type {0:?}")]
    UnknownWaterType(String),
    #[error("transaction report failed: {0}")]
    ReportFailed(String),
    #[error("telemetry publish failed: {0}")]
    TelemetryFailed(String),
    #[error("channel {0:?} is busy")]
    ChannelBusy(String),
    #[error("unknown channel {0:?}")]
    UnknownChannel(String),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("panic stop triggered")]
    PanicTriggered,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing status indicator")]
    MissingStatus,
    #[error("missing backend gateway")]
    MissingGateway,
    #[error("no dispense channels configured")]
    NoChannels,
    #[error("duplicate output name {0:?}")]
    DuplicateOutput(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("failed to start worker thread: {0}")]
    Thread(String),
}

pub type Result<T> = std::result::Result<T, StationError>;
