//! Short-lived cache of recently-seen `(src, packet_id)` pairs used to
//! suppress re-delivery of looped or repeated copies of the same packet.

use std::collections::HashMap;

use crate::address::Address;

pub const DEFAULT_CAPACITY: usize = 128;
pub const WINDOW_MS: u32 = 30_000;

/// Bounded, lazily-purged duplicate suppressor. Oldest entry is evicted
/// first when the cache is full, matching spec §4.4.
pub struct DuplicateSuppressor {
    capacity: usize,
    entries: HashMap<(Address, u32), u32>,
    order: Vec<(Address, u32)>,
}

impl DuplicateSuppressor {
    pub fn new(capacity: usize) -> Self {
        DuplicateSuppressor {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert `(src, packet_id)` first seen at `now`. Returns `true` when the
    /// pair was already present within the dedup window (i.e. this is a
    /// duplicate) and `false` for a first sighting. Entries older than
    /// [`WINDOW_MS`] are purged lazily before the lookup.
    pub fn seen(&mut self, src: Address, packet_id: u32, now_ms: u32) -> bool {
        self.purge(now_ms);

        let key = (src, packet_id);
        if self.entries.contains_key(&key) {
            return true;
        }

        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(key, now_ms);
        self.order.push(key);
        false
    }

    /// Drop all entries older than [`WINDOW_MS`]. `seen` already purges
    /// lazily on every insert; `Engine::tick` also calls this directly on its
    /// own cadence so the cache doesn't hold stale entries indefinitely
    /// during a lull in traffic.
    pub(crate) fn purge(&mut self, now_ms: u32) {
        let mut evicted = 0usize;
        self.order.retain(|key| {
            let Some(&first_seen) = self.entries.get(key) else {
                return false;
            };
            if now_ms.wrapping_sub(first_seen) >= WINDOW_MS {
                self.entries.remove(key);
                evicted += 1;
                false
            } else {
                true
            }
        });
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.entries.len(), "dedup_purge");
        }
    }

    fn evict_oldest(&mut self) {
        if !self.order.is_empty() {
            let oldest = self.order.remove(0);
            self.entries.remove(&oldest);
        }
    }
}
