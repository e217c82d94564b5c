//! The multi-queue and its cost-model adjuster.
//!
//! Entries are partitioned into `N+1` queues by resident-unit count, with a
//! hash map from cache key to entry. Every point-lookup promotes the hot
//! entry to MRU and gives the adjuster a chance to run: it gathers cold
//! entries (LRU first, fullest queues first) whose units would free enough
//! memory for one more hot unit, then applies the swap only when the
//! expected wasted block reads strictly decrease:
//!
//! ```text
//! orig = Σ cold.ios() + hot.ios()
//! adj  = Σ cold.evict_ios() + hot.load_ios()     apply iff adj < orig
//! ```
//!
//! One mutex guards the queues, the map and the usage counter; reader
//! internals take their own lock. The adjuster calls reader primitives
//! while holding the outer mutex, never the reverse, so the lock order is
//! fixed. Queue moves follow successful reader operations, which keeps the
//! invariant "queue index == resident units" without rollback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::queue::{NodeArena, SingleQueue};
use super::{DeleterFn, Handle};
use crate::error::Result;
use crate::file::RandomAccessFile;
use crate::filter::FilterBlockReader;
use crate::key::{parse_internal_key, SequenceNumber};

pub struct MultiQueue {
    inner: Mutex<Inner>,
    adjustments: AtomicU64,
}

struct Inner {
    arena: NodeArena,
    /// `queues[i]` holds the entries with `i` resident units.
    queues: Vec<SingleQueue>,
    map: HashMap<Vec<u8>, usize>,
    /// Bytes held by resident units across all entries.
    usage: usize,
}

impl Inner {
    fn move_node(&mut self, id: usize, to: usize) {
        let from = self.arena.get(id).queue;
        self.queues[from].unlink(&mut self.arena, id);
        self.queues[to].push_mru(&mut self.arena, id);
        self.arena.get_mut(id).queue = to;
    }

    fn promote(&mut self, id: usize) {
        let queue = self.arena.get(id).queue;
        self.queues[queue].move_to_mru(&mut self.arena, id);
    }
}

impl MultiQueue {
    /// A cache for filter blocks carrying at most `all_units` units each.
    pub fn new(all_units: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                arena: NodeArena::new(),
                queues: (0..=all_units).map(|_| SingleQueue::new()).collect(),
                map: HashMap::new(),
                usage: 0,
            }),
            adjustments: AtomicU64::new(0),
        }
    }

    /// Registers a reader under `key` and returns its handle. The entry
    /// starts in the queue of its initial unit count. Callers key entries by
    /// `(policy name, table id)`; duplicate keys are not supported.
    pub fn insert(
        &self,
        key: &[u8],
        reader: Arc<FilterBlockReader>,
        deleter: Option<DeleterFn>,
    ) -> Handle {
        let init = reader.load_filter_number() as usize;
        let charge = init * reader.one_unit_size() as usize;

        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        assert!(
            init < inner.queues.len(),
            "reader loads more units than the cache tracks"
        );
        let id = inner.arena.alloc(key.to_vec(), reader, deleter, init);
        inner.queues[init].push_mru(&mut inner.arena, id);
        inner.map.insert(key.to_vec(), id);
        inner.usage += charge;
        Handle(id)
    }

    /// Hash lookup only; LRU order is untouched until `update_handle`.
    pub fn lookup(&self, key: &[u8]) -> Option<Handle> {
        self.inner.lock().unwrap().map.get(key).copied().map(Handle)
    }

    /// The reader behind a handle; None once the entry has been erased.
    pub fn value(&self, handle: Handle) -> Option<Arc<FilterBlockReader>> {
        let guard = self.inner.lock().unwrap();
        guard.arena.try_get(handle.0).map(|node| node.reader.clone())
    }

    /// Promotes the entry to MRU within its queue and, when `key` carries a
    /// sequence number, runs the adjuster against it.
    pub fn update_handle(&self, handle: Handle, key: &[u8]) {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        if inner.arena.try_get(handle.0).is_none() {
            return;
        }
        inner.promote(handle.0);
        if let Some(parsed) = parse_internal_key(key) {
            self.adjust(inner, handle.0, parsed.sequence);
        }
    }

    /// The point-lookup path: promotion, adjustment, then the probe itself.
    /// The probe runs outside the cache lock; a stale handle answers `true`.
    pub fn key_may_match(&self, handle: Handle, block_offset: u64, key: &[u8]) -> bool {
        let reader = {
            let mut guard = self.inner.lock().unwrap();
            let inner = &mut *guard;
            let Some(node) = inner.arena.try_get(handle.0) else {
                return true;
            };
            let reader = node.reader.clone();
            inner.promote(handle.0);
            if let Some(parsed) = parse_internal_key(key) {
                self.adjust(inner, handle.0, parsed.sequence);
            }
            reader
        };
        reader.key_may_match(block_offset, key)
    }

    /// Evicts every unit of the entry's reader but keeps the entry, so a
    /// closed table can reopen against the same handle.
    pub fn release(&self, handle: Handle) {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let Some(node) = inner.arena.try_get(handle.0) else {
            return;
        };
        let reader = node.reader.clone();
        let unit = reader.one_unit_size() as usize;
        while reader.evict_filter().is_ok() {
            inner.usage -= unit;
        }
        let resident = reader.filter_units_number();
        inner.move_node(handle.0, resident);
    }

    /// Re-binds the entry's reader to `file` and restores its residency to
    /// the initial unit count, moving the entry to the matching queue.
    pub fn go_back_to_init_filter(
        &self,
        handle: Handle,
        file: Arc<dyn RandomAccessFile>,
    ) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let Some(node) = inner.arena.try_get(handle.0) else {
            return Ok(());
        };
        let reader = node.reader.clone();
        let unit = reader.one_unit_size() as usize;
        let before = node.queue;

        let result = reader.go_back_to_init_filter(file);
        // Even a failed restore changed residency; track what is actually
        // resident so queue index and usage stay truthful.
        let after = reader.filter_units_number();
        inner.move_node(handle.0, after);
        inner.usage = inner.usage + after * unit - before * unit;
        result
    }

    /// Removes the entry, invoking its deleter.
    pub fn erase(&self, key: &[u8]) {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        if let Some(id) = inner.map.remove(key) {
            let queue = inner.arena.get(id).queue;
            inner.queues[queue].unlink(&mut inner.arena, id);
            let node = inner.arena.remove(id);
            inner.usage -= queue * node.reader.one_unit_size() as usize;
            if let Some(deleter) = &node.deleter {
                deleter(&node.key, &node.reader);
            }
        }
    }

    /// Bytes held by resident units across all entries.
    pub fn total_charge(&self) -> usize {
        self.inner.lock().unwrap().usage
    }

    /// Number of applied adjustments.
    pub fn adjustments(&self) -> u64 {
        self.adjustments.load(Ordering::Relaxed)
    }

    /// The adjuster. Precondition: the hot entry exists. Runs under the
    /// cache mutex; reader primitives take their own lock inside.
    fn adjust(&self, inner: &mut Inner, hot: usize, sn: SequenceNumber) {
        let hot_reader = inner.arena.get(hot).reader.clone();
        if !hot_reader.can_be_loaded() {
            return;
        }

        // Gather cold donors until they cover the memory of one hot unit.
        // Fullest queues first: their units reclaim the most per entry.
        let mut memory = hot_reader.one_unit_size() as i64;
        let mut cold = Vec::new();
        for qi in (1..inner.queues.len()).rev() {
            inner.queues[qi].find_cold(&inner.arena, &mut memory, sn, hot, &mut cold);
            if memory <= 0 {
                break;
            }
        }
        if memory > 0 {
            return; // no viable candidate set
        }

        if !Self::can_be_adjusted(&inner.arena, &cold, hot) {
            return;
        }

        for &id in &cold {
            let reader = inner.arena.get(id).reader.clone();
            if let Err(e) = reader.evict_filter() {
                warn!(error = %e, "filter adjustment aborted: evict failed");
                return;
            }
            let to = inner.arena.get(id).queue - 1;
            inner.move_node(id, to);
            inner.usage -= reader.one_unit_size() as usize;
        }

        if let Err(e) = hot_reader.load_filter() {
            warn!(error = %e, "filter adjustment aborted: load failed");
            return;
        }
        let to = inner.arena.get(hot).queue + 1;
        inner.move_node(hot, to);
        inner.usage += hot_reader.one_unit_size() as usize;

        self.adjustments.fetch_add(1, Ordering::Relaxed);
        debug!(donors = cold.len(), "filter adjustment applied");
    }

    /// The cost check: apply only when the expected wasted block reads
    /// strictly decrease.
    fn can_be_adjusted(arena: &NodeArena, cold: &[usize], hot: usize) -> bool {
        let hot_reader = &arena.get(hot).reader;
        let mut original = hot_reader.ios();
        let mut adjusted = hot_reader.load_ios();
        for &id in cold {
            let reader = &arena.get(id).reader;
            if !reader.can_be_evict() {
                return false;
            }
            original += reader.ios();
            adjusted += reader.evict_ios();
        }
        adjusted < original
    }

    /// Checks that every entry sits in the queue matching its residency and
    /// that usage adds up.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let guard = self.inner.lock().unwrap();
        let mut usage = 0;
        for (qi, queue) in guard.queues.iter().enumerate() {
            for id in queue.iter_lru(&guard.arena) {
                let node = guard.arena.get(id);
                assert_eq!(node.queue, qi);
                assert_eq!(node.reader.filter_units_number(), qi);
                usage += qi * node.reader.one_unit_size() as usize;
            }
        }
        assert_eq!(guard.usage, usage);
    }
}

impl Drop for MultiQueue {
    fn drop(&mut self) {
        // Deterministic teardown: map first, then the queued nodes, each
        // deleter seeing its reader still alive.
        let inner = self.inner.get_mut().unwrap();
        inner.map.clear();
        for node in inner.arena.drain() {
            if let Some(deleter) = &node.deleter {
                deleter(&node.key, &node.reader);
            }
        }
    }
}
