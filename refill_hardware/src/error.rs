use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("authentication failed for block {0}")]
    BlockAuth(u8),
    #[error("read failed for block {0}")]
    BlockRead(u8),
    #[error("tag source closed")]
    Closed,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
