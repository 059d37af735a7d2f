pub mod net;

pub use net::{HttpClient, HttpResponse, MessagePublisher, Qos};

use std::time::Duration;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A named digital output line (pump relay, indicator LED).
///
/// `on`/`off` express the logical state; polarity (active-low relays) is the
/// implementation's concern.
pub trait DigitalOutput {
    fn on(&mut self) -> Result<(), BoxError>;
    fn off(&mut self) -> Result<(), BoxError>;
    fn is_on(&self) -> bool;
}

impl<T: DigitalOutput + ?Sized> DigitalOutput for Box<T> {
    fn on(&mut self) -> Result<(), BoxError> {
        (**self).on()
    }
    fn off(&mut self) -> Result<(), BoxError> {
        (**self).off()
    }
    fn is_on(&self) -> bool {
        (**self).is_on()
    }
}

/// Key slot used to authenticate a MIFARE Classic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyType {
    A,
    #[default]
    B,
}

/// A token seen by the reader, identified by its reader-assigned UID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTag {
    pub uid: Vec<u8>,
}

/// Tag-transport collaborator.
pub trait TagReader {
    /// Wait up to `timeout` for a token; `Ok(None)` when nothing was presented.
    fn poll_for_tag(&mut self, timeout: Duration) -> Result<Option<RawTag>, BoxError>;

    /// Authenticate `block` with `key` and read its 16 bytes.
    fn authenticate_and_read_block(
        &mut self,
        uid: &[u8],
        block: u8,
        key_type: KeyType,
        key: &[u8; 6],
    ) -> Result<Vec<u8>, BoxError>;
}

impl<T: TagReader + ?Sized> TagReader for Box<T> {
    fn poll_for_tag(&mut self, timeout: Duration) -> Result<Option<RawTag>, BoxError> {
        (**self).poll_for_tag(timeout)
    }

    fn authenticate_and_read_block(
        &mut self,
        uid: &[u8],
        block: u8,
        key_type: KeyType,
        key: &[u8; 6],
    ) -> Result<Vec<u8>, BoxError> {
        (**self).authenticate_and_read_block(uid, block, key_type, key)
    }
}
