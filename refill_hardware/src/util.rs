/// Parse a UID written as hex octets, with or without `:`/`-` separators.
///
/// Returns `None` for empty input, odd digit counts, or non-hex characters.
pub fn parse_uid(s: &str) -> Option<Vec<u8>> {
    let digits: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
    if digits.is_empty() || digits.len() % 2 != 0 {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Encode `text` the way a phone app writes a plain-text record: an NDEF
/// message TLV holding a well-known `T` record with language `en`, followed
/// by the terminator TLV.
pub fn encode_text_record(text: &str) -> Vec<u8> {
    // 255 minus the record header (4) and the status/lang prefix (3)
    let body: Vec<u8> = text.bytes().take(248).collect();
    let payload_len = body.len() + 3;
    let record_len = payload_len + 4;
    let mut out = Vec::with_capacity(record_len + 4);
    out.extend_from_slice(&[0x03, record_len as u8, 0xD1, 0x01, payload_len as u8, b'T']);
    out.extend_from_slice(&[0x02, b'e', b'n']);
    out.extend_from_slice(&body);
    out.extend_from_slice(&[0xFE, 0x00]);
    out
}
