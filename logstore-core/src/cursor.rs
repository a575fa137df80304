//! Cursor codec (spec §4.2, component C1): opaque, version-tagged, resource-scoped
//! pagination tokens.
//!
//! Logical content is `(resource_tag, version, position)`, assembled into the wire
//! form `"<tag>v<zero-padded-version>:<position>"` and base-62 encoded over
//! `[0-9a-zA-Z]` via big-integer radix conversion of the raw bytes. The base-62 step
//! exists only to make cursors URL-safe and self-obfuscating (spec §9) — it is not
//! cryptographic, and a hostile client decoding one is fine as long as a malformed or
//! misrouted cursor always fails with `invalid-cursor`, never with misrouted results.

use crate::errors::StoreError;

pub const CURSOR_VERSION: u32 = 1;

/// Resource tag for `ListEvent` cursors.
pub const EVENT_TAG: &str = "evt";
/// Resource tag for `ListAttempt` cursors.
pub const ATTEMPT_TAG: &str = "att";

const ALPHABET: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Encode a position string into an opaque cursor scoped to `resource_tag`.
pub fn encode(resource_tag: &str, position: &str) -> String {
    let content = format!("{resource_tag}v{:02}:{position}", CURSOR_VERSION);
    encode_base62(content.as_bytes())
}

/// Decode a cursor, verifying it was issued for `resource_tag`, and return its
/// inner position string.
///
/// Fails with [`StoreError::InvalidCursor`] on garbage input or a cross-endpoint
/// cursor, and with [`StoreError::VersionMismatch`] on a structurally valid cursor
/// carrying an unsupported version number.
pub fn decode(encoded: &str, resource_tag: &str) -> Result<String, StoreError> {
    let raw = decode_base62(encoded)
        .map_err(|_| StoreError::InvalidCursor("malformed base-62 cursor".into()))?;
    let content = String::from_utf8(raw)
        .map_err(|_| StoreError::InvalidCursor("cursor does not decode to valid content".into()))?;

    let rest = content.strip_prefix(resource_tag).ok_or_else(|| {
        StoreError::InvalidCursor(format!(
            "cursor was not issued for resource '{resource_tag}'"
        ))
    })?;
    let rest = rest
        .strip_prefix('v')
        .ok_or_else(|| StoreError::InvalidCursor("malformed cursor structure".into()))?;
    if rest.len() < 3 || rest.as_bytes()[2] != b':' {
        return Err(StoreError::InvalidCursor(
            "malformed cursor version field".into(),
        ));
    }
    let version: u32 = rest[0..2]
        .parse()
        .map_err(|_| StoreError::InvalidCursor("malformed cursor version field".into()))?;
    let position = rest[3..].to_string();

    if version != CURSOR_VERSION {
        return Err(StoreError::VersionMismatch(format!(
            "cursor version {version} is not supported (expected {CURSOR_VERSION})"
        )));
    }

    Ok(position)
}

/// Build the recommended position shape `"<unix_ms>::<row_id>"` (spec §4.2), zero-padded
/// so lexicographic string comparison of the position equals tuple comparison of
/// `(time, id)`. Assumes `time_ms >= 0`, true for any real event/attempt timestamp.
pub fn encode_position(time_ms: i64, id: &str) -> String {
    format!("{:020}::{}", time_ms.max(0), id)
}

/// Base-62 encode arbitrary cursor content without the version/tag validation
/// `encode` performs. Used to hand-assemble adversarial cursors (spec §8 scenario S5
/// constructs `"evtv99:pos"` this way) — never needed for a well-formed cursor.
pub fn encode_raw(content: &[u8]) -> String {
    encode_base62(content)
}

/// Inverse of [`encode_position`].
pub fn decode_position(position: &str) -> Option<(i64, String)> {
    let (time_str, id) = position.split_once("::")?;
    let time_ms: i64 = time_str.parse().ok()?;
    Some((time_ms, id.to_string()))
}

fn encode_base62(data: &[u8]) -> String {
    let zero_count = data.iter().take_while(|&&b| b == 0).count();
    let significant = &data[zero_count..];

    let mut num = significant.to_vec();
    let mut digits: Vec<u8> = Vec::new();
    let mut begin = 0;
    while begin < num.len() {
        let mut remainder: u32 = 0;
        for byte in num.iter_mut().skip(begin) {
            let acc = remainder * 256 + *byte as u32;
            *byte = (acc / 62) as u8;
            remainder = acc % 62;
        }
        digits.push(remainder as u8);
        while begin < num.len() && num[begin] == 0 {
            begin += 1;
        }
    }

    let mut s = String::with_capacity(zero_count + digits.len());
    for _ in 0..zero_count {
        s.push(ALPHABET[0] as char);
    }
    for &d in digits.iter().rev() {
        s.push(ALPHABET[d as usize] as char);
    }
    s
}

fn decode_base62(s: &str) -> Result<Vec<u8>, ()> {
    if s.is_empty() {
        return Ok(Vec::new());
    }
    let zero_count = s.chars().take_while(|&c| c == '0').count();

    let mut bytes: Vec<u8> = Vec::new();
    for c in s.chars().skip(zero_count) {
        let d = ALPHABET
            .iter()
            .position(|&ch| ch as char == c)
            .ok_or(())? as u32;
        let mut carry = d;
        for byte in bytes.iter_mut().rev() {
            let acc = (*byte as u32) * 62 + carry;
            *byte = (acc & 0xFF) as u8;
            carry = acc >> 8;
        }
        while carry > 0 {
            bytes.insert(0, (carry & 0xFF) as u8);
            carry >>= 8;
        }
    }

    let mut result = vec![0u8; zero_count];
    result.extend(bytes);
    Ok(result)
}
