//! Node storage and single-queue list discipline.
//!
//! Nodes live in an arena of stable slots so a handle stays valid while the
//! entry moves between queues. Each queue is a doubly-linked MRU→LRU list
//! threaded through the arena by slot index; the multi-queue's mutex guards
//! both, so the list code itself carries no synchronization.

use std::sync::Arc;

use crate::filter::FilterBlockReader;
use crate::key::SequenceNumber;

use super::DeleterFn;

pub(crate) struct Node {
    pub key: Vec<u8>,
    pub reader: Arc<FilterBlockReader>,
    pub deleter: Option<DeleterFn>,
    /// Index of the queue this node is linked into.
    pub queue: usize,
    prev: Option<usize>,
    next: Option<usize>,
}

pub(crate) struct NodeArena {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn alloc(
        &mut self,
        key: Vec<u8>,
        reader: Arc<FilterBlockReader>,
        deleter: Option<DeleterFn>,
        queue: usize,
    ) -> usize {
        let node = Node {
            key,
            reader,
            deleter,
            queue,
            prev: None,
            next: None,
        };
        match self.free.pop() {
            Some(id) => {
                self.slots[id] = Some(node);
                id
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    pub fn get(&self, id: usize) -> &Node {
        self.slots[id].as_ref().expect("vacant queue node")
    }

    pub fn get_mut(&mut self, id: usize) -> &mut Node {
        self.slots[id].as_mut().expect("vacant queue node")
    }

    pub fn try_get(&self, id: usize) -> Option<&Node> {
        self.slots.get(id).and_then(|slot| slot.as_ref())
    }

    /// Frees the slot and returns the node. The node must be unlinked.
    pub fn remove(&mut self, id: usize) -> Node {
        let node = self.slots[id].take().expect("vacant queue node");
        debug_assert!(node.prev.is_none() && node.next.is_none());
        self.free.push(id);
        node
    }

    /// Drains every occupied slot, in slot order.
    pub fn drain(&mut self) -> impl Iterator<Item = Node> + '_ {
        self.slots.drain(..).flatten()
    }
}

/// One MRU→LRU list of entries sharing a resident-unit count. `mru` is the
/// head; `next` walks toward the LRU end.
pub(crate) struct SingleQueue {
    mru: Option<usize>,
    lru: Option<usize>,
    len: usize,
}

impl SingleQueue {
    pub fn new() -> Self {
        Self {
            mru: None,
            lru: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Links an unlinked node at the MRU end.
    pub fn push_mru(&mut self, arena: &mut NodeArena, id: usize) {
        let old_mru = self.mru;
        {
            let node = arena.get_mut(id);
            node.prev = None;
            node.next = old_mru;
        }
        match old_mru {
            Some(old) => arena.get_mut(old).prev = Some(id),
            None => self.lru = Some(id),
        }
        self.mru = Some(id);
        self.len += 1;
    }

    /// Unlinks a node, leaving it loose for a move or an erase.
    pub fn unlink(&mut self, arena: &mut NodeArena, id: usize) {
        let (prev, next) = {
            let node = arena.get(id);
            (node.prev, node.next)
        };
        match prev {
            Some(prev) => arena.get_mut(prev).next = next,
            None => self.mru = next,
        }
        match next {
            Some(next) => arena.get_mut(next).prev = prev,
            None => self.lru = prev,
        }
        let node = arena.get_mut(id);
        node.prev = None;
        node.next = None;
        self.len -= 1;
    }

    pub fn move_to_mru(&mut self, arena: &mut NodeArena, id: usize) {
        self.unlink(arena, id);
        self.push_mru(arena, id);
    }

    /// Walks LRU→MRU collecting nodes whose reader is cold at `sn` and has a
    /// unit to give, decrementing `memory` per candidate. Stops once the
    /// budget is met or the list is exhausted. `exclude` keeps the hot entry
    /// from donating to itself before its own probe lands.
    pub fn find_cold(
        &self,
        arena: &NodeArena,
        memory: &mut i64,
        sn: SequenceNumber,
        exclude: usize,
        out: &mut Vec<usize>,
    ) {
        let mut cursor = self.lru;
        while let Some(id) = cursor {
            if *memory <= 0 {
                break;
            }
            let node = arena.get(id);
            if id != exclude && node.reader.is_cold(sn) && node.reader.can_be_evict() {
                *memory -= node.reader.one_unit_size() as i64;
                out.push(id);
            }
            cursor = node.prev;
        }
    }

    /// LRU→MRU iteration order, for tests and teardown checks.
    #[cfg(test)]
    pub fn iter_lru<'a>(&self, arena: &'a NodeArena) -> impl Iterator<Item = usize> + 'a {
        std::iter::successors(self.lru, move |&id| arena.get(id).prev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{StringSink, StringSource};
    use crate::filter::testutil::{write_units, TestHashPolicy};
    use crate::filter::FilterBlockBuilder;

    fn test_reader() -> Arc<FilterBlockReader> {
        let mut builder = FilterBlockBuilder::new(Arc::new(TestHashPolicy));
        builder.start_block(0);
        builder.add_key(b"foo");

        let mut sink = StringSink::new();
        let handle = write_units(&mut sink, builder.return_filters());
        let trailer = builder.finish(&handle);
        let source = Arc::new(StringSource::new(sink.contents()));
        FilterBlockReader::new(Arc::new(TestHashPolicy), &trailer, source).unwrap()
    }

    #[test]
    fn test_mru_order() {
        let mut arena = NodeArena::new();
        let mut queue = SingleQueue::new();

        let a = arena.alloc(b"a".to_vec(), test_reader(), None, 0);
        let b = arena.alloc(b"b".to_vec(), test_reader(), None, 0);
        let c = arena.alloc(b"c".to_vec(), test_reader(), None, 0);
        queue.push_mru(&mut arena, a);
        queue.push_mru(&mut arena, b);
        queue.push_mru(&mut arena, c);
        assert_eq!(queue.len(), 3);

        // LRU→MRU: a, b, c
        assert_eq!(queue.iter_lru(&arena).collect::<Vec<_>>(), vec![a, b, c]);

        queue.move_to_mru(&mut arena, a);
        assert_eq!(queue.iter_lru(&arena).collect::<Vec<_>>(), vec![b, c, a]);

        queue.unlink(&mut arena, c);
        assert_eq!(queue.iter_lru(&arena).collect::<Vec<_>>(), vec![b, a]);
        assert_eq!(queue.len(), 2);

        queue.unlink(&mut arena, b);
        queue.unlink(&mut arena, a);
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.iter_lru(&arena).count(), 0);
    }

    #[test]
    fn test_arena_reuses_slots() {
        let mut arena = NodeArena::new();
        let a = arena.alloc(b"a".to_vec(), test_reader(), None, 0);
        arena.remove(a);
        let b = arena.alloc(b"b".to_vec(), test_reader(), None, 0);
        assert_eq!(a, b);
        assert_eq!(arena.get(b).key, b"b");
        assert!(arena.try_get(99).is_none());
    }

    #[test]
    fn test_find_cold_walks_lru_first() {
        let mut arena = NodeArena::new();
        let mut queue = SingleQueue::new();

        let cold_lru = arena.alloc(b"cold-lru".to_vec(), test_reader(), None, 1);
        let cold_mru = arena.alloc(b"cold-mru".to_vec(), test_reader(), None, 1);
        queue.push_mru(&mut arena, cold_lru);
        queue.push_mru(&mut arena, cold_mru);

        // Both readers are cold (no probes yet), but one unit covers the
        // budget, so only the LRU node is taken.
        let unit = arena.get(cold_lru).reader.one_unit_size() as i64;
        let mut memory = unit;
        let mut out = Vec::new();
        queue.find_cold(&arena, &mut memory, 1_000_000, usize::MAX, &mut out);
        assert_eq!(out, vec![cold_lru]);
        assert!(memory <= 0);

        // A larger budget takes both, LRU first.
        let mut memory = unit * 2;
        let mut out = Vec::new();
        queue.find_cold(&arena, &mut memory, 1_000_000, usize::MAX, &mut out);
        assert_eq!(out, vec![cold_lru, cold_mru]);

        // The excluded entry never donates, even when cold.
        let mut memory = unit * 2;
        let mut out = Vec::new();
        queue.find_cold(&arena, &mut memory, 1_000_000, cold_lru, &mut out);
        assert_eq!(out, vec![cold_mru]);
    }
}
