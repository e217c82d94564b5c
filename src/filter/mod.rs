//! Per-table probabilistic filters split into independent units.
//!
//! A filter block carries `N` bitmaps over the same keys, each built with a
//! distinct hash seed. A reader holds between zero and `N` of them resident;
//! probing ANDs the answers across resident units, so the compounded false
//! positive rate with `k` units is `r^k` for a per-unit rate of `r`.

mod bloom;
mod builder;
mod reader;

pub use bloom::BloomFilterPolicy;
pub use builder::{FilterBlockBuilder, UnitsHandle, FILTER_TRAILER_LEN};
pub use reader::FilterBlockReader;

use std::sync::Arc;

use crate::key::extract_user_key;

/// The filter family used to build and probe unit bitmaps.
pub trait FilterPolicy: Send + Sync {
    /// Identifies the filter family; part of the filter cache key.
    fn name(&self) -> &'static str;

    /// The per-unit false positive rate `r` in (0, 1).
    fn false_positive_rate(&self) -> f64;

    /// Appends a filter over `keys` to `dst`. `unit` selects the hash seed
    /// family: distinct units must produce statistically independent
    /// bitmaps.
    fn create_filter(&self, keys: &[&[u8]], dst: &mut Vec<u8>, unit: u32);

    /// Probes one unit's bitmap. False positives are allowed, false
    /// negatives are not.
    fn key_may_match(&self, key: &[u8], filter: &[u8], unit: u32) -> bool;
}

/// Adapts a user-key policy to internal keys by stripping the sequence tag
/// before building or probing.
pub struct InternalFilterPolicy {
    user: Arc<dyn FilterPolicy>,
}

impl InternalFilterPolicy {
    pub fn new(user: Arc<dyn FilterPolicy>) -> Self {
        Self { user }
    }
}

impl FilterPolicy for InternalFilterPolicy {
    fn name(&self) -> &'static str {
        self.user.name()
    }

    fn false_positive_rate(&self) -> f64 {
        self.user.false_positive_rate()
    }

    fn create_filter(&self, keys: &[&[u8]], dst: &mut Vec<u8>, unit: u32) {
        let stripped: Vec<&[u8]> = keys.iter().map(|k| extract_user_key(k)).collect();
        self.user.create_filter(&stripped, dst, unit);
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8], unit: u32) -> bool {
        self.user.key_may_match(extract_user_key(key), filter, unit)
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Shared fixtures for the filter and cache tests.

    use super::*;
    use crate::file::StringSink;
    use byteorder::{ByteOrder, LittleEndian};

    /// Emits one 4-byte hash per key; probing scans for the probe's hash.
    /// Deterministic and unit-seeded, so tests can assert exact outcomes.
    pub(crate) struct TestHashPolicy;

    impl FilterPolicy for TestHashPolicy {
        fn name(&self) -> &'static str {
            "TestHashPolicy"
        }

        fn false_positive_rate(&self) -> f64 {
            0.1
        }

        fn create_filter(&self, keys: &[&[u8]], dst: &mut Vec<u8>, unit: u32) {
            for key in keys {
                let mut buf = [0u8; 4];
                LittleEndian::write_u32(&mut buf, bloom::hash(key, unit));
                dst.extend_from_slice(&buf);
            }
        }

        fn key_may_match(&self, key: &[u8], filter: &[u8], unit: u32) -> bool {
            let h = bloom::hash(key, unit);
            filter
                .chunks_exact(4)
                .any(|chunk| LittleEndian::read_u32(chunk) == h)
        }
    }

    /// Writes raw units consecutively into `sink` and returns where they
    /// landed. Units occupy `[offset, offset + N*U)` with no framing.
    pub(crate) fn write_units(sink: &mut StringSink, units: &[Vec<u8>]) -> UnitsHandle {
        assert!(!units.is_empty());
        let handle = UnitsHandle {
            offset: sink.offset(),
            size: units[0].len() as u32,
        };
        for unit in units {
            assert_eq!(unit.len(), units[0].len());
            sink.append(unit);
        }
        handle
    }

    #[test]
    fn test_internal_policy_strips_tag() {
        use crate::key::{append_internal_key, ValueType};

        let policy = InternalFilterPolicy::new(Arc::new(TestHashPolicy));

        let mut added = Vec::new();
        append_internal_key(&mut added, b"foo", 5, ValueType::Value);

        let mut filter = Vec::new();
        policy.create_filter(&[&added], &mut filter, 0);

        // A probe under a different sequence number still matches the same
        // user key.
        let mut probe = Vec::new();
        append_internal_key(&mut probe, b"foo", 900, ValueType::Value);
        assert!(policy.key_may_match(&probe, &filter, 0));

        let mut miss = Vec::new();
        append_internal_key(&mut miss, b"bar", 5, ValueType::Value);
        assert!(!policy.key_may_match(&miss, &filter, 0));
    }
}
