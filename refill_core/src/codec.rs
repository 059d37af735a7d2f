//! Tag content decoding.
//!
//! Tags are programmed with a single plain-text record. The text sits between
//! the record's status/language header (`0x02 'e' 'n'`) and the terminator
//! TLV (`0xFE 0x00`). Anything outside that window, and any non-printable
//! character inside it, is dropped.

/// Status byte plus `en` language code that precedes the text.
pub const START_MARKER: &[u8; 3] = b"\x02en";
/// Terminator TLV that follows the record.
pub const END_MARKER: &[u8; 2] = b"\xfe\x00";

/// Decode the printable text carried in `raw`.
///
/// Never fails: a missing start marker decodes from offset 0, a missing end
/// marker decodes to the end of the buffer, and invalid UTF-8 is replaced
/// before filtering to printable ASCII (`0x20..=0x7E`). Both markers are
/// located by their first occurrence; an end marker that precedes the start
/// marker leaves nothing between them and decodes to an empty string.
pub fn decode(raw: &[u8]) -> String {
    let start = find(raw, START_MARKER).map_or(0, |i| i + START_MARKER.len());
    let end = find(raw, END_MARKER).unwrap_or(raw.len());
    let text = raw.get(start..end).unwrap_or_default();
    String::from_utf8_lossy(text)
        .chars()
        .filter(|c| matches!(c, ' '..='~'))
        .collect()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
