//! RAM-resident lookup index.
//!
//! One six-byte entry per live key: the CRC-16 hash of the key bytes and
//! the record's offset from the active area base. Entries are kept sorted
//! by hash; equal hashes are adjacent in insertion order and are
//! disambiguated by reading the record and comparing key bytes (the index
//! deliberately does not store keys). The backing storage starts at 32
//! entries and doubles when full.

use crate::error::{Error, Result};

/// Initial entry capacity; growth doubles from here.
pub const INITIAL_CAPACITY: usize = 32;

/// One index entry: key hash and record offset within the active area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub hash: u16,
    pub offset: u32,
}

/// Sorted sequence of [`IndexEntry`] values.
pub struct RamIndex {
    entries: Vec<IndexEntry>,
    max_entries: usize,
}

impl RamIndex {
    pub fn new() -> Result<Self> {
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(INITIAL_CAPACITY)
            .map_err(|_| Error::MemAlloc)?;
        Ok(RamIndex {
            entries,
            max_entries: INITIAL_CAPACITY,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current growth ceiling (doubles when reached).
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn entry(&self, pos: usize) -> IndexEntry {
        self.entries[pos]
    }

    /// Replace the entry at `pos`.
    pub fn set(&mut self, pos: usize, entry: IndexEntry) {
        self.entries[pos] = entry;
    }

    /// First position whose hash is not less than `hash`; the scan for a
    /// key starts here and ends at the first entry with a greater hash.
    pub fn probe_start(&self, hash: u16) -> usize {
        let mut pos = 0;
        while pos < self.entries.len() && self.entries[pos].hash < hash {
            pos += 1;
        }
        pos
    }

    /// Ensure room for one more entry, doubling the ceiling when full.
    pub fn reserve_for_add(&mut self) -> Result<()> {
        if self.entries.len() < self.max_entries {
            return Ok(());
        }
        let grown = self.max_entries * 2;
        self.entries
            .try_reserve_exact(grown - self.entries.len())
            .map_err(|_| Error::MemAlloc)?;
        self.max_entries = grown;
        Ok(())
    }

    /// Insert at `pos`, shifting the tail right. Grows if at capacity.
    pub fn insert(&mut self, pos: usize, entry: IndexEntry) -> Result<()> {
        self.reserve_for_add()?;
        debug_assert!(pos == 0 || self.entries[pos - 1].hash <= entry.hash);
        debug_assert!(pos == self.entries.len() || entry.hash <= self.entries[pos].hash);
        self.entries.insert(pos, entry);
        Ok(())
    }

    /// Remove the entry at `pos`, shifting the tail left.
    pub fn remove(&mut self, pos: usize) {
        self.entries.remove(pos);
    }

    /// Drop every entry; capacity is retained.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(hash: u16, offset: u32) -> IndexEntry {
        IndexEntry { hash, offset }
    }

    #[test]
    fn probe_start_respects_sort_order() {
        let mut idx = RamIndex::new().unwrap();
        for (pos, e) in [entry(10, 0), entry(20, 1), entry(20, 2), entry(30, 3)]
            .into_iter()
            .enumerate()
        {
            idx.insert(pos, e).unwrap();
        }
        assert_eq!(idx.probe_start(5), 0);
        assert_eq!(idx.probe_start(10), 0);
        assert_eq!(idx.probe_start(20), 1);
        assert_eq!(idx.probe_start(25), 3);
        assert_eq!(idx.probe_start(40), 4);
    }

    #[test]
    fn equal_hash_entries_stay_adjacent_in_insertion_order() {
        let mut idx = RamIndex::new().unwrap();
        idx.insert(0, entry(7, 100)).unwrap();
        // A second key with the same hash lands after the existing run.
        let pos = {
            let mut p = idx.probe_start(7);
            while p < idx.len() && idx.entry(p).hash == 7 {
                p += 1;
            }
            p
        };
        idx.insert(pos, entry(7, 200)).unwrap();
        assert_eq!(idx.entry(0).offset, 100);
        assert_eq!(idx.entry(1).offset, 200);
    }

    #[test]
    fn remove_shifts_tail_left() {
        let mut idx = RamIndex::new().unwrap();
        idx.insert(0, entry(1, 10)).unwrap();
        idx.insert(1, entry(2, 20)).unwrap();
        idx.insert(2, entry(3, 30)).unwrap();
        idx.remove(1);
        assert_eq!(idx.len(), 2);
        assert_eq!(idx.entry(1), entry(3, 30));
    }

    #[test]
    fn capacity_doubles_when_full() {
        let mut idx = RamIndex::new().unwrap();
        assert_eq!(idx.max_entries(), INITIAL_CAPACITY);
        for i in 0..INITIAL_CAPACITY + 1 {
            idx.insert(i, entry(i as u16, i as u32)).unwrap();
        }
        assert_eq!(idx.max_entries(), INITIAL_CAPACITY * 2);
        assert_eq!(idx.len(), INITIAL_CAPACITY + 1);
    }
}
