//! Internal key encoding.
//!
//! An internal key is the user key followed by a fixed64 tag holding the
//! sequence number and value type: `tag = (sequence << 8) | value_type`,
//! little-endian. Point-lookup keys arrive in this form; the filter cache
//! reads the sequence number out of them to drive its hotness tracking.

use byteorder::{ByteOrder, LittleEndian};

pub type SequenceNumber = u64;

/// Sequence numbers occupy the top 56 bits of the tag.
pub const MAX_SEQUENCE_NUMBER: SequenceNumber = (1 << 56) - 1;

const TAG_LEN: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
    Deletion = 0,
    Value = 1,
}

impl ValueType {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(ValueType::Deletion),
            1 => Some(ValueType::Value),
            _ => None,
        }
    }
}

/// The decoded form of an internal key, borrowing the user key bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParsedInternalKey<'a> {
    pub user_key: &'a [u8],
    pub sequence: SequenceNumber,
    pub value_type: ValueType,
}

/// Appends the internal-key encoding of `(user_key, sequence, value_type)`.
pub fn append_internal_key(
    dst: &mut Vec<u8>,
    user_key: &[u8],
    sequence: SequenceNumber,
    value_type: ValueType,
) {
    debug_assert!(sequence <= MAX_SEQUENCE_NUMBER);
    dst.extend_from_slice(user_key);
    let mut tag = [0u8; TAG_LEN];
    LittleEndian::write_u64(&mut tag, (sequence << 8) | value_type as u64);
    dst.extend_from_slice(&tag);
}

/// Decodes an internal key. Returns None when `key` is too short to carry a
/// tag or the value type byte is unknown.
pub fn parse_internal_key(key: &[u8]) -> Option<ParsedInternalKey<'_>> {
    if key.len() < TAG_LEN {
        return None;
    }
    let split = key.len() - TAG_LEN;
    let tag = LittleEndian::read_u64(&key[split..]);
    let value_type = ValueType::from_u8((tag & 0xff) as u8)?;
    Some(ParsedInternalKey {
        user_key: &key[..split],
        sequence: tag >> 8,
        value_type,
    })
}

/// Strips the tag off an internal key. Keys shorter than a tag are returned
/// unchanged so a malformed probe still hashes deterministically.
pub fn extract_user_key(key: &[u8]) -> &[u8] {
    if key.len() < TAG_LEN {
        key
    } else {
        &key[..key.len() - TAG_LEN]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut encoded = Vec::new();
        append_internal_key(&mut encoded, b"foo", 42, ValueType::Value);
        assert_eq!(encoded.len(), 3 + TAG_LEN);

        let parsed = parse_internal_key(&encoded).unwrap();
        assert_eq!(parsed.user_key, b"foo");
        assert_eq!(parsed.sequence, 42);
        assert_eq!(parsed.value_type, ValueType::Value);
        assert_eq!(extract_user_key(&encoded), b"foo");
    }

    #[test]
    fn test_deletion_tag() {
        let mut encoded = Vec::new();
        append_internal_key(&mut encoded, b"k", 7, ValueType::Deletion);
        let parsed = parse_internal_key(&encoded).unwrap();
        assert_eq!(parsed.sequence, 7);
        assert_eq!(parsed.value_type, ValueType::Deletion);
    }

    #[test]
    fn test_short_and_malformed_keys() {
        assert!(parse_internal_key(b"short").is_none());
        assert_eq!(extract_user_key(b"short"), b"short");

        // Unknown value type byte.
        let mut encoded = Vec::new();
        append_internal_key(&mut encoded, b"foo", 1, ValueType::Value);
        let last = encoded.len() - TAG_LEN;
        encoded[last] = 0x7f;
        assert!(parse_internal_key(&encoded).is_none());
    }

    #[test]
    fn test_empty_user_key() {
        let mut encoded = Vec::new();
        append_internal_key(&mut encoded, b"", 9, ValueType::Value);
        let parsed = parse_internal_key(&encoded).unwrap();
        assert!(parsed.user_key.is_empty());
        assert_eq!(parsed.sequence, 9);
    }
}
