//! Filter block construction.
//!
//! The builder accumulates keys per filter base (`2^base_lg` bytes of block
//! offsets, 2KiB by default) and emits `N` parallel bitmap units for each
//! base. The table writer places the raw units on disk first, then appends
//! the trailer the builder finishes with:
//!
//! ```text
//! +--------------------------+
//! | offsets[num]   u32 LE    |  per-base index into each unit's bitmap
//! +--------------------------+
//! | disk_offset    u64 LE    |  file offset of the first unit
//! | disk_size      u32 LE    |  size of one unit (U)
//! | init_units     u32 LE    |  units loaded at table open (k0)
//! | all_units      u32 LE    |  units available on disk (N)
//! | base_lg        u8        |  log2 of the filter base
//! +--------------------------+
//! ```
//!
//! The call sequence must match `(start_block add_key*)* return_filters
//! finish`.

use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};

use super::FilterPolicy;
use crate::config::Options;

/// Trailer bytes that follow the offsets array.
pub const FILTER_TRAILER_LEN: usize = 21;

/// Where the raw units of one filter block sit in the table file. All units
/// share one size; unit `i` starts at `offset + i * size`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UnitsHandle {
    pub offset: u64,
    pub size: u32,
}

pub struct FilterBlockBuilder {
    policy: Arc<dyn FilterPolicy>,
    init_units: u32,
    all_units: u32,
    base_lg: u8,

    keys: Vec<u8>,      // flattened key contents
    start: Vec<usize>,  // starting index in keys of each key
    filter_offsets: Vec<u32>,
    units: Vec<Vec<u8>>, // one bitmap per unit, built in parallel
    finished: bool,
}

impl FilterBlockBuilder {
    pub fn new(policy: Arc<dyn FilterPolicy>) -> Self {
        Self::with_options(policy, &Options::default())
    }

    pub fn with_options(policy: Arc<dyn FilterPolicy>, opts: &Options) -> Self {
        Self {
            policy,
            init_units: opts.init_units,
            all_units: opts.all_units,
            base_lg: opts.base_lg,
            keys: Vec::new(),
            start: Vec::new(),
            filter_offsets: Vec::new(),
            units: vec![Vec::new(); opts.all_units as usize],
            finished: false,
        }
    }

    /// Starts a data block at `block_offset`, emitting filters for every
    /// filter base boundary crossed since the previous call.
    pub fn start_block(&mut self, block_offset: u64) {
        let filter_index = block_offset >> self.base_lg;
        debug_assert!(filter_index >= self.filter_offsets.len() as u64);
        while filter_index > self.filter_offsets.len() as u64 {
            self.generate_filter();
        }
    }

    pub fn add_key(&mut self, key: &[u8]) {
        self.start.push(self.keys.len());
        self.keys.extend_from_slice(key);
    }

    /// Flushes any pending keys and exposes the finished bitmaps so the
    /// table writer can place them on disk ahead of the trailer.
    pub fn return_filters(&mut self) -> &[Vec<u8>] {
        self.flush();
        &self.units
    }

    /// Emits the trailer. `handle` records where the caller wrote the units.
    pub fn finish(&mut self, handle: &UnitsHandle) -> Vec<u8> {
        self.flush();

        let mut result =
            Vec::with_capacity(self.filter_offsets.len() * 4 + FILTER_TRAILER_LEN);
        for offset in &self.filter_offsets {
            result.write_u32::<LittleEndian>(*offset).unwrap();
        }
        result.write_u64::<LittleEndian>(handle.offset).unwrap();
        result.write_u32::<LittleEndian>(handle.size).unwrap();
        result.write_u32::<LittleEndian>(self.init_units).unwrap();
        result.write_u32::<LittleEndian>(self.all_units).unwrap();
        result.push(self.base_lg);
        result
    }

    fn flush(&mut self) {
        if self.finished {
            return;
        }
        if !self.start.is_empty() {
            self.generate_filter();
            // The offsets array carries one trailing entry: the limit of
            // the last filter.
            self.filter_offsets.push(self.units[0].len() as u32);
        }
        self.finished = true;
    }

    fn generate_filter(&mut self) {
        let num_keys = self.start.len();
        if num_keys == 0 {
            // No keys for this base. All units share one layout, so unit 0's
            // length stands in for all of them.
            self.filter_offsets.push(self.units[0].len() as u32);
            return;
        }

        // Rebuild key slices from the flattened buffer.
        self.start.push(self.keys.len()); // simplifies length computation
        let keys: Vec<&[u8]> = (0..num_keys)
            .map(|i| &self.keys[self.start[i]..self.start[i + 1]])
            .collect();

        self.filter_offsets.push(self.units[0].len() as u32);
        for unit in 0..self.all_units {
            self.policy.create_filter(&keys, &mut self.units[unit as usize], unit);
        }

        self.keys.clear();
        self.start.clear();
    }
}
