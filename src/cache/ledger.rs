//! Entry Ledger Module
//!
//! Owns every cached entry, its recency position and the running byte total.
//!
//! Entries live in a slab of slots addressed by stable indices. The key index
//! maps to those indices, and the recency order is an intrusive doubly-linked
//! list threaded through the same slots:
//! - Head = Most recently used
//! - Tail = Least recently used
//!
//! The ledger is not synchronized; callers serialize access to it.

use std::collections::HashMap;
use std::time::Instant;

use crate::cache::CacheEntry;

/// Null link in the recency list.
const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Slot {
    /// None while the slot sits on the free list
    entry: Option<CacheEntry>,
    prev: usize,
    next: usize,
}

// == Ledger ==
/// Key index, recency order and byte accounting for the cache.
#[derive(Debug)]
pub struct Ledger {
    /// Key to slot index
    index: HashMap<String, usize>,
    /// Slot arena
    slots: Vec<Slot>,
    /// Vacated slots available for reuse
    free: Vec<usize>,
    head: usize,
    tail: usize,
    /// Sum of value lengths of resident entries
    total_bytes: usize,
    capacity_bytes: usize,
}

impl Ledger {
    // == Constructor ==
    /// Creates an empty ledger accounting against `capacity_bytes`.
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            index: HashMap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            total_bytes: 0,
            capacity_bytes,
        }
    }

    // == Insert Or Replace ==
    /// Installs `entry` as the most recently used entry.
    ///
    /// An existing entry under the same key is removed first and returned.
    pub fn insert_or_replace(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        let replaced = self.remove(&entry.key);

        let key = entry.key.clone();
        self.total_bytes += entry.size();
        let idx = self.alloc(entry);
        self.push_front(idx);
        self.index.insert(key, idx);

        replaced
    }

    // == Touch ==
    /// Moves the entry to the front of the recency order.
    ///
    /// Returns false if the key is absent.
    pub fn touch(&mut self, key: &str) -> bool {
        match self.index.get(key) {
            Some(&idx) => {
                if self.head != idx {
                    self.unlink(idx);
                    self.push_front(idx);
                }
                true
            }
            None => false,
        }
    }

    // == Evict Oldest ==
    /// Removes and returns the least recently used entry.
    ///
    /// Returns None if the ledger is empty.
    pub fn evict_oldest(&mut self) -> Option<CacheEntry> {
        if self.tail == NIL {
            return None;
        }
        let idx = self.tail;
        let entry = self.release(idx);
        self.index.remove(&entry.key);
        Some(entry)
    }

    // == Lookup ==
    /// Returns the entry for `key` without changing its recency.
    pub fn lookup(&self, key: &str) -> Option<&CacheEntry> {
        self.index.get(key).and_then(|&idx| self.entry_at(idx))
    }

    // == Remove ==
    /// Removes the entry for `key`, if any.
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let idx = self.index.remove(key)?;
        Some(self.release(idx))
    }

    // == Sweep Expired ==
    /// Removes every entry whose deadline is before `now`.
    ///
    /// The slots to drop are collected in one pass over the recency list
    /// before any of them is unlinked, so every entry is examined exactly once.
    /// Returns the removed entries, most recently used first.
    pub fn sweep_expired(&mut self, now: Instant) -> Vec<CacheEntry> {
        let mut doomed = Vec::new();
        let mut cursor = self.head;
        while cursor != NIL {
            let slot = &self.slots[cursor];
            if slot.entry.as_ref().is_some_and(|e| e.is_expired_at(now)) {
                doomed.push(cursor);
            }
            cursor = slot.next;
        }

        doomed
            .into_iter()
            .map(|idx| {
                let entry = self.release(idx);
                self.index.remove(&entry.key);
                entry
            })
            .collect()
    }

    // == Clear ==
    /// Drops every entry and resets accounting.
    pub fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
        self.free.clear();
        self.head = NIL;
        self.tail = NIL;
        self.total_bytes = 0;
    }

    // == Accessors ==
    /// Number of resident entries, expired-but-unswept ones included.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Keys<'_> {
        Keys {
            ledger: self,
            cursor: self.head,
        }
    }

    // == Internal List Operations ==
    fn entry_at(&self, idx: usize) -> Option<&CacheEntry> {
        self.slots.get(idx).and_then(|slot| slot.entry.as_ref())
    }

    fn alloc(&mut self, entry: CacheEntry) -> usize {
        let slot = Slot {
            entry: Some(entry),
            prev: NIL,
            next: NIL,
        };
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = slot;
                idx
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        }
    }

    /// Unlinks a slot, frees it and settles the byte total.
    ///
    /// Does not touch the key index.
    fn release(&mut self, idx: usize) -> CacheEntry {
        self.unlink(idx);
        let entry = self.slots[idx]
            .entry
            .take()
            .unwrap_or_else(|| unreachable!("linked slot {idx} has no entry"));
        self.total_bytes -= entry.size();
        self.free.push(idx);
        entry
    }

    fn push_front(&mut self, idx: usize) {
        self.slots[idx].prev = NIL;
        self.slots[idx].next = self.head;
        if self.head != NIL {
            self.slots[self.head].prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        if prev != NIL {
            self.slots[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.slots[next].prev = prev;
        } else {
            self.tail = prev;
        }
        self.slots[idx].prev = NIL;
        self.slots[idx].next = NIL;
    }

    /// Panics unless index, recency list and byte total agree.
    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        let mut seen = std::collections::HashSet::new();
        let mut bytes = 0;
        let mut prev = NIL;
        let mut cursor = self.head;
        while cursor != NIL {
            let slot = &self.slots[cursor];
            assert_eq!(slot.prev, prev, "broken back link at slot {cursor}");
            let entry = slot.entry.as_ref().expect("linked slot must hold an entry");
            assert_eq!(self.index.get(&entry.key), Some(&cursor));
            assert!(seen.insert(entry.key.clone()), "duplicate key {}", entry.key);
            bytes += entry.size();
            prev = cursor;
            cursor = slot.next;
        }
        assert_eq!(self.tail, prev, "tail does not end the list");
        assert_eq!(seen.len(), self.index.len(), "index and recency disagree");
        assert_eq!(bytes, self.total_bytes, "byte total out of sync");
    }
}

/// Iterator over ledger keys in recency order.
pub struct Keys<'a> {
    ledger: &'a Ledger,
    cursor: usize,
}

impl<'a> Iterator for Keys<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.ledger.slots.get(self.cursor)?;
        self.cursor = slot.next;
        slot.entry.as_ref().map(|e| e.key.as_str())
    }
}
