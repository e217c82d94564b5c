//! The multi-queue filter cache.
//!
//! Every open table registers its filter reader here under a key derived
//! from the filter policy name and the table id. Entries are grouped into
//! queues by resident-unit count; the adjustment engine moves units from
//! cold entries to hot ones when the expected-I/O cost strictly drops.

mod multi_queue;
mod queue;

pub use multi_queue::MultiQueue;

use byteorder::{ByteOrder, LittleEndian};

use crate::filter::FilterBlockReader;
use std::sync::Arc;

/// A stable reference to a multi-queue entry. Valid until the entry is
/// erased.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Handle(pub(crate) usize);

/// Called when an entry is erased, with the entry's key and reader.
pub type DeleterFn = Box<dyn Fn(&[u8], &Arc<FilterBlockReader>) + Send>;

/// The cache key for one table's filter block:
/// `"filter." || policy_name || fixed64_le(table_id)`.
pub fn filter_cache_key(policy_name: &str, table_id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(7 + policy_name.len() + 8);
    key.extend_from_slice(b"filter.");
    key.extend_from_slice(policy_name.as_bytes());
    let mut id = [0u8; 8];
    LittleEndian::write_u64(&mut id, table_id);
    key.extend_from_slice(&id);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_cache_key() {
        let key = filter_cache_key("emberdb.BloomFilter", 0x0102);
        assert!(key.starts_with(b"filter.emberdb.BloomFilter"));
        assert_eq!(&key[key.len() - 8..], &[0x02, 0x01, 0, 0, 0, 0, 0, 0]);
        assert_ne!(key, filter_cache_key("emberdb.BloomFilter", 0x0103));
        assert_ne!(key, filter_cache_key("TestHashPolicy", 0x0102));
    }
}
