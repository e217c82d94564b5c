//! Filter block reader: the per-table unit manager.
//!
//! A reader parses the trailer a [`FilterBlockBuilder`] emitted and manages
//! which of the block's `N` units are resident. Construction returns
//! immediately; the initial `k0` units are brought in by a job on the
//! background loader, and probes arriving earlier wait on the init gate.
//! Residency is LIFO: loading installs unit `|resident|`, evicting drops
//! unit `|resident| - 1`, matching the on-disk layout where unit `i` sits at
//! `disk_offset + i * U`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use byteorder::{ByteOrder, LittleEndian};
use tracing::warn;

use super::builder::FILTER_TRAILER_LEN;
use super::FilterPolicy;
use crate::config::LIFE_TIME;
use crate::errcorrupt;
use crate::error::{Error, Result};
use crate::file::RandomAccessFile;
use crate::key::{parse_internal_key, SequenceNumber};
use crate::scheduler::MqScheduler;
use crate::signal::Gate;

pub struct FilterBlockReader {
    policy: Arc<dyn FilterPolicy>,

    // Immutable after construction.
    offsets: Vec<u32>,
    num: usize,
    base_lg: u8,
    disk_offset: u64,
    disk_size: u32,
    init_units: u32,
    all_units: u32,

    // Updated off the cache lock; the cache mutex provides the
    // happens-before the adjuster relies on when it reads them.
    access_count: AtomicU64,
    last_sn: AtomicU64,

    state: Mutex<ReaderState>,
    init_gate: Gate,
}

struct ReaderState {
    /// Resident bitmaps, lowest unit index first.
    units: Vec<Vec<u8>>,
    file: Arc<dyn RandomAccessFile>,
}

impl FilterBlockReader {
    /// Parses the trailer and schedules the initial load on the background
    /// loader. Returns immediately; probes block on the init gate until the
    /// load completes (or fails, leaving the reader with fewer units).
    pub fn new(
        policy: Arc<dyn FilterPolicy>,
        contents: &[u8],
        file: Arc<dyn RandomAccessFile>,
    ) -> Result<Arc<Self>> {
        let reader = Arc::new(Self::parse(policy, contents, file)?);
        let job = reader.clone();
        MqScheduler::global().schedule(move || job.init_load_filter());
        Ok(reader)
    }

    fn parse(
        policy: Arc<dyn FilterPolicy>,
        contents: &[u8],
        file: Arc<dyn RandomAccessFile>,
    ) -> Result<Self> {
        let n = contents.len();
        if n < FILTER_TRAILER_LEN {
            return errcorrupt!("filter trailer too short: {n} bytes");
        }
        if (n - FILTER_TRAILER_LEN) % 4 != 0 {
            return errcorrupt!(
                "filter offsets array misaligned: {} bytes",
                n - FILTER_TRAILER_LEN
            );
        }

        let base_lg = contents[n - 1];
        let all_units = LittleEndian::read_u32(&contents[n - 5..]);
        let init_units = LittleEndian::read_u32(&contents[n - 9..]);
        if init_units > all_units {
            return errcorrupt!("filter trailer loads {init_units} of {all_units} units");
        }
        let disk_size = LittleEndian::read_u32(&contents[n - 13..]);
        let disk_offset = LittleEndian::read_u64(&contents[n - 21..]);

        let num = (n - FILTER_TRAILER_LEN) / 4;
        let offsets = (0..num)
            .map(|i| LittleEndian::read_u32(&contents[i * 4..]))
            .collect();

        Ok(Self {
            policy,
            offsets,
            num,
            base_lg,
            disk_offset,
            disk_size,
            init_units,
            all_units,
            access_count: AtomicU64::new(0),
            last_sn: AtomicU64::new(0),
            state: Mutex::new(ReaderState {
                units: Vec::new(),
                file,
            }),
            init_gate: Gate::new(),
        })
    }

    /// Body of the background job: loads the initial `k0` units, then opens
    /// the gate for waiting probes. Must not acquire the multi-queue mutex;
    /// the reader's own lock is sufficient.
    pub(crate) fn init_load_filter(&self) {
        let _signal = self.init_gate.begin();
        let mut state = self.state.lock().unwrap();
        while (state.units.len() as u32) < self.init_units {
            if let Err(e) = self.load_one(&mut state) {
                // The guard still opens the gate; waiters proceed against
                // however many units made it in.
                warn!(error = %e, "initial filter load failed");
                return;
            }
        }
    }

    /// Answers whether `key` may be present in the data block at
    /// `block_offset`. Probes every resident unit and ANDs the answers; with
    /// zero units resident there is no information and the answer is `true`.
    /// Never fails: malformed offsets degrade to a match.
    pub fn key_may_match(&self, block_offset: u64, key: &[u8]) -> bool {
        if let Some(parsed) = parse_internal_key(key) {
            self.last_sn.store(parsed.sequence, Ordering::Relaxed);
        }
        self.access_count.fetch_add(1, Ordering::Relaxed);
        self.init_gate.wait();

        let state = self.state.lock().unwrap();
        let index = (block_offset >> self.base_lg) as usize;
        if index + 1 < self.num {
            let start = self.offsets[index] as usize;
            let limit = self.offsets[index + 1] as usize;
            if start <= limit && limit <= self.disk_size as usize {
                // One definite miss in any unit is a definite miss overall.
                // An empty slice (no keys in this base) misses in every
                // resident unit.
                for (unit, bitmap) in state.units.iter().enumerate() {
                    if !self
                        .policy
                        .key_may_match(key, &bitmap[start..limit], unit as u32)
                    {
                        return false;
                    }
                }
            }
            // Out-of-range offsets are treated as potential matches.
        }
        true
    }

    /// Loads the next unit from disk.
    pub fn load_filter(&self) -> Result<()> {
        self.init_gate.wait();
        let mut state = self.state.lock().unwrap();
        self.load_one(&mut state)
    }

    /// Drops the most recently loaded unit.
    pub fn evict_filter(&self) -> Result<()> {
        self.init_gate.wait();
        let mut state = self.state.lock().unwrap();
        if state.units.pop().is_none() {
            return Err(Error::Empty);
        }
        Ok(())
    }

    /// Re-binds the table file (it may have been reopened) and restores
    /// residency to exactly the initial unit count.
    pub fn go_back_to_init_filter(&self, file: Arc<dyn RandomAccessFile>) -> Result<()> {
        self.init_gate.wait();
        let mut state = self.state.lock().unwrap();
        state.file = file;
        state.units.truncate(self.init_units as usize);
        while (state.units.len() as u32) < self.init_units {
            self.load_one(&mut state)?;
        }
        Ok(())
    }

    fn load_one(&self, state: &mut ReaderState) -> Result<()> {
        let index = state.units.len() as u32;
        if index >= self.all_units {
            return Err(Error::Exhausted);
        }
        let mut unit = vec![0u8; self.disk_size as usize];
        let offset = self.disk_offset + index as u64 * self.disk_size as u64;
        // On failure the reader keeps its prior residency.
        state.file.read_at(offset, &mut unit)?;
        state.units.push(unit);
        Ok(())
    }

    /// Number of units currently resident. Waits for the initial load.
    pub fn filter_units_number(&self) -> usize {
        self.init_gate.wait();
        self.state.lock().unwrap().units.len()
    }

    /// Units the initial load brings in (k0).
    pub fn load_filter_number(&self) -> u32 {
        self.init_units
    }

    /// Units available on disk (N).
    pub fn all_units_number(&self) -> u32 {
        self.all_units
    }

    /// Size of one unit in bytes (U).
    pub fn one_unit_size(&self) -> u32 {
        self.disk_size
    }

    /// Memory held by resident units, in bytes.
    pub fn size(&self) -> usize {
        self.filter_units_number() * self.disk_size as usize
    }

    pub fn access_time(&self) -> u64 {
        self.access_count.load(Ordering::Relaxed)
    }

    pub fn is_cold(&self, now: SequenceNumber) -> bool {
        now >= self.last_sn.load(Ordering::Relaxed).saturating_add(LIFE_TIME)
    }

    pub fn can_be_loaded(&self) -> bool {
        (self.filter_units_number() as u32) < self.all_units
    }

    pub fn can_be_evict(&self) -> bool {
        self.filter_units_number() > 0
    }

    /// Expected wasted block reads at the current residency: `r^k * F` for
    /// false positive rate `r`, `k` resident units and `F` observed accesses.
    pub fn ios(&self) -> f64 {
        self.expected_ios(self.filter_units_number() as i32)
    }

    /// Expected wasted block reads with one more unit resident.
    pub fn load_ios(&self) -> f64 {
        self.expected_ios(self.filter_units_number() as i32 + 1)
    }

    /// Expected wasted block reads with one unit evicted.
    pub fn evict_ios(&self) -> f64 {
        debug_assert!(self.can_be_evict());
        self.expected_ios((self.filter_units_number() as i32 - 1).max(0))
    }

    fn expected_ios(&self, residency: i32) -> f64 {
        let fpr = self.policy.false_positive_rate().powi(residency);
        fpr * self.access_time() as f64
    }
}
