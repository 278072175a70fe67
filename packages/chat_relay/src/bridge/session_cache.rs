//! Bounded record of which conversations already have a CLI session.
//!
//! Entries expire a fixed time after they were written. Independently of
//! expiry, the least recently used entry is evicted once the cache grows
//! past its capacity.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_CAPACITY: usize = 10_000;
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy)]
struct Entry {
    written_at: Instant,
    /// Recency stamp; the key in `recency` that points back at this entry
    last_used: u64,
}

#[derive(Debug)]
pub struct SessionCache {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<String, Entry>,
    recency: BTreeMap<u64, String>,
    clock: u64,
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

impl SessionCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            clock: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn is_expired(&self, entry: &Entry) -> bool {
        entry.written_at.elapsed() >= self.ttl
    }

    /// Whether `key` holds a live entry. A hit counts as a use.
    pub fn contains(&mut self, key: &str) -> bool {
        let Some(entry) = self.entries.get(key).copied() else {
            return false;
        };

        if self.is_expired(&entry) {
            self.remove(key);
            return false;
        }

        let stamp = self.tick();
        self.recency.remove(&entry.last_used);
        self.recency.insert(stamp, key.to_string());
        if let Some(e) = self.entries.get_mut(key) {
            e.last_used = stamp;
        }
        true
    }

    /// Insert or refresh `key`, restarting its time-to-live.
    ///
    /// Expired entries are swept first so they never count against capacity.
    pub fn insert(&mut self, key: &str) {
        self.purge_expired();

        let stamp = self.tick();
        let entry = Entry {
            written_at: Instant::now(),
            last_used: stamp,
        };
        if let Some(previous) = self.entries.insert(key.to_string(), entry) {
            self.recency.remove(&previous.last_used);
        }
        self.recency.insert(stamp, key.to_string());

        while self.entries.len() > self.capacity {
            match self.recency.pop_first() {
                Some((_, oldest)) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.recency.remove(&entry.last_used);
                true
            }
            None => false,
        }
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| self.is_expired(e))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
