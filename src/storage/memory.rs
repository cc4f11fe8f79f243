//! In-memory failure counter store.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::Result;
use crate::ratelimit::{CounterStore, LskfIdentifier};

/// Failure counters kept in memory only.
///
/// Nothing survives a restart, so this is only suitable for tests and for
/// hosts that persist counters elsewhere.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: DashMap<LskfIdentifier, u32>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryCounterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of reads served so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of writes performed so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl CounterStore for MemoryCounterStore {
    fn read(&self, id: &LskfIdentifier) -> Result<u32> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.counters.get(id).map(|c| *c).unwrap_or(0))
    }

    fn write(&self, id: &LskfIdentifier, count: u32) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.counters.insert(*id, count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_counter_reads_zero() {
        let store = MemoryCounterStore::new();
        assert_eq!(store.read(&LskfIdentifier::new(0, 1)).unwrap(), 0);
        assert_eq!(store.read_count(), 1);
    }

    #[test]
    fn test_write_then_read() {
        let store = MemoryCounterStore::new();
        let id = LskfIdentifier::new(0, 1);

        store.write(&id, 7).unwrap();
        assert_eq!(store.read(&id).unwrap(), 7);
        assert_eq!(store.read(&LskfIdentifier::new(0, 2)).unwrap(), 0);
        assert_eq!(store.write_count(), 1);
    }
}
