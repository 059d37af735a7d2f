pub mod debounce;
pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;
pub mod util;

pub use debounce::{Edge, EdgeDebouncer};

use crossbeam_channel as xch;
use refill_traits::{BoxError, DigitalOutput, KeyType, RawTag, TagReader};
use std::collections::HashMap;
use std::io::BufRead;
use std::time::Duration;

use crate::error::HwError;

/// Simulated output line; logs transitions instead of driving a pin.
#[derive(Debug)]
pub struct SimulatedOutput {
    name: String,
    on: bool,
}

impl SimulatedOutput {
    pub fn new(name: impl Into<String>) -> Self {
        SimulatedOutput {
            name: name.into(),
            on: false,
        }
    }
}

impl DigitalOutput for SimulatedOutput {
    fn on(&mut self) -> Result<(), BoxError> {
        if !self.on {
            tracing::debug!(output = %self.name, "on (simulated)");
        }
        self.on = true;
        Ok(())
    }
    fn off(&mut self) -> Result<(), BoxError> {
        if self.on {
            tracing::debug!(output = %self.name, "off (simulated)");
        }
        self.on = false;
        Ok(())
    }
    fn is_on(&self) -> bool {
        self.on
    }
}

/// First block of a MIFARE Classic 1K data area used for synthesized content.
const FIRST_DATA_BLOCK: u8 = 4;
const BLOCK_LEN: usize = 16;

/// Tag reader fed by text lines, one presentation per line.
///
/// Line format: `<uid> [content]`, where `<uid>` is hex with optional `:`
/// separators (`04:A2:3B:1C` or `04A23B1C`). USB readers that emulate a
/// keyboard emit exactly this shape on stdin. When `content` is present the
/// reader synthesizes a text record across the data blocks so block reads
/// behave like a programmed tag; otherwise block reads fail.
pub struct LineTagReader {
    rx: xch::Receiver<(RawTag, Option<String>)>,
    contents: HashMap<Vec<u8>, Vec<u8>>,
    closed: bool,
}

impl LineTagReader {
    /// Spawn a reader thread over `input`. The thread exits at end of input.
    pub fn spawn<R: BufRead + Send + 'static>(input: R) -> Self {
        let (tx, rx) = xch::unbounded();
        std::thread::spawn(move || {
            for line in input.lines() {
                let line = match line {
                    Ok(l) => l,
                    Err(e) => {
                        tracing::warn!(error = %e, "tag input read failed");
                        break;
                    }
                };
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                let (uid_part, content) = match trimmed.split_once(char::is_whitespace) {
                    Some((u, c)) => (u, Some(c.trim().to_string())),
                    None => (trimmed, None),
                };
                match util::parse_uid(uid_part) {
                    Some(uid) => {
                        if tx.send((RawTag { uid }, content)).is_err() {
                            break;
                        }
                    }
                    None => tracing::warn!(line = %trimmed, "ignoring malformed tag line"),
                }
            }
            tracing::trace!("tag input exhausted");
        });
        Self {
            rx,
            contents: HashMap::new(),
            closed: false,
        }
    }
}

impl TagReader for LineTagReader {
    fn poll_for_tag(&mut self, timeout: Duration) -> Result<Option<RawTag>, BoxError> {
        if self.closed {
            return Err(Box::new(HwError::Closed));
        }
        match self.rx.recv_timeout(timeout) {
            Ok((tag, content)) => {
                match content {
                    Some(text) => {
                        self.contents
                            .insert(tag.uid.clone(), util::encode_text_record(&text));
                    }
                    None => {
                        self.contents.remove(&tag.uid);
                    }
                }
                Ok(Some(tag))
            }
            Err(xch::RecvTimeoutError::Timeout) => Ok(None),
            Err(xch::RecvTimeoutError::Disconnected) => {
                self.closed = true;
                Err(Box::new(HwError::Closed))
            }
        }
    }

    fn authenticate_and_read_block(
        &mut self,
        uid: &[u8],
        block: u8,
        _key_type: KeyType,
        _key: &[u8; 6],
    ) -> Result<Vec<u8>, BoxError> {
        let Some(record) = self.contents.get(uid) else {
            return Err(Box::new(HwError::BlockAuth(block)));
        };
        let Some(index) = data_block_index(block) else {
            return Err(Box::new(HwError::BlockRead(block)));
        };
        let start = index * BLOCK_LEN;
        let mut out = vec![0u8; BLOCK_LEN];
        if start < record.len() {
            let end = (start + BLOCK_LEN).min(record.len());
            out[..end - start].copy_from_slice(&record[start..end]);
        }
        Ok(out)
    }
}

/// Position of `block` among data blocks from `FIRST_DATA_BLOCK`, skipping trailers.
fn data_block_index(block: u8) -> Option<usize> {
    if block < FIRST_DATA_BLOCK || block % 4 == 3 {
        return None;
    }
    let rel = usize::from(block - FIRST_DATA_BLOCK);
    Some(rel - rel / 4)
}
