//! Presented tags and reading their content.

use refill_traits::TagReader;

use crate::codec;
use crate::config::{TagAccess, TagKeySource};
use crate::hw_error::map_block_error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Reader-assigned UID.
    pub identifier: Vec<u8>,
    /// Decoded text from the tag memory; empty when not read.
    pub content: String,
}

impl Tag {
    /// UID as upper-case hex octets joined by `:`, e.g. `04:A2:3B:1C`.
    pub fn uid_hex(&self) -> String {
        self.identifier
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Key sent to the preferences lookup.
    pub fn lookup_key(&self, source: TagKeySource) -> String {
        match source {
            TagKeySource::Uid => self.uid_hex(),
            TagKeySource::Content => self.content.clone(),
        }
    }
}

/// Read and decode the configured data blocks of `uid`.
///
/// A block that fails to authenticate or read is logged and left out;
/// whatever was read is decoded.
pub fn read_content<R: TagReader + ?Sized>(reader: &mut R, uid: &[u8], access: &TagAccess) -> String {
    let mut raw = Vec::with_capacity(16 * usize::from(access.blocks.end.saturating_sub(access.blocks.start)));
    for block in access.blocks.data_blocks() {
        match reader.authenticate_and_read_block(uid, block, access.key_type, &access.key) {
            Ok(bytes) => raw.extend_from_slice(&bytes),
            Err(e) => {
                let err = map_block_error(&*e, block);
                tracing::warn!(block, error = %err, "skipping unreadable tag block");
            }
        }
    }
    codec::decode(&raw)
}
