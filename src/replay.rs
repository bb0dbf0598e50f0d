// Numan Thabit 2025
// replay.rs - per-source monotonic sequence guard

use ahash::AHashMap;

/// Default upper bound on distinct tracked sources.
pub const DEFAULT_MAX_SOURCES: usize = 1024;

/// Result of checking a sequence number against the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First packet from this source; the sequence becomes its baseline.
    FirstSeen,
    /// Sequence advanced past the previously accepted value.
    Advanced { previous: u32 },
    /// Sequence was not greater than the last accepted value.
    Stale { last_seen: u32 },
    /// Unknown source and the store is at capacity.
    StoreFull { capacity: usize },
}

impl Admission {
    pub fn is_accepted(self) -> bool {
        matches!(self, Admission::FirstSeen | Admission::Advanced { .. })
    }
}

/// Highest accepted sequence number per source.
///
/// Entries are created on first sighting and never removed. Once `capacity`
/// sources are tracked, packets from further unseen sources are refused
/// rather than evicting an existing baseline.
#[derive(Debug)]
pub struct ReplayGuard {
    capacity: usize,
    last_seen: AHashMap<u32, u32>,
}

impl ReplayGuard {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be non-zero");
        Self {
            capacity,
            last_seen: AHashMap::default(),
        }
    }

    /// Admits the packet when its sequence strictly exceeds the stored value.
    pub fn admit(&mut self, source_id: u32, seq: u32) -> bool {
        self.check_and_update(source_id, seq).is_accepted()
    }

    /// Checks `seq` for `source_id`, updating the baseline on acceptance.
    pub fn check_and_update(&mut self, source_id: u32, seq: u32) -> Admission {
        if let Some(last) = self.last_seen.get_mut(&source_id) {
            if seq > *last {
                let previous = *last;
                *last = seq;
                return Admission::Advanced { previous };
            }
            return Admission::Stale { last_seen: *last };
        }

        if self.last_seen.len() >= self.capacity {
            return Admission::StoreFull {
                capacity: self.capacity,
            };
        }

        self.last_seen.insert(source_id, seq);
        Admission::FirstSeen
    }

    pub fn last_sequence(&self, source_id: u32) -> Option<u32> {
        self.last_seen.get(&source_id).copied()
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SOURCES)
    }
}
