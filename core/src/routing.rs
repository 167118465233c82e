//! Bounded routing table: device records keyed by address, FIFO-by-staleness
//! eviction, and the next-hop policy the packet engine forwards against.

use std::collections::HashMap;

use crate::address::Address;

/// An entry is online iff `now - last_seen < ONLINE_WINDOW_MS` (spec §3/§8's
/// invariant, stated exactly this way).
pub const ONLINE_WINDOW_MS: u32 = 300_000;
/// The spec names three statuses (online/stale/offline) but only pins down
/// the online/not-online boundary. `stale` is the grace band between
/// missing one online window and being swept as fully offline — an entry
/// that might still be mid-flight to a neighbour rather than truly gone.
/// Chosen as one further online window, a round number with no spec
/// citation beyond "online/stale/offline are three distinct states" (see
/// `DESIGN.md`).
pub const STALE_WINDOW_MS: u32 = 2 * ONLINE_WINDOW_MS;
/// Default routing table capacity.
pub const DEFAULT_CAPACITY: usize = 100;
/// Default eviction horizon for `sweep`.
pub const DEFAULT_EVICTION_HORIZON_MS: u32 = 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum RoutingStatus {
    Online,
    Stale,
    Offline,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RoutingEntry {
    pub address: Address,
    pub parent: Address,
    pub rssi: i8,
    pub last_seen_ms: u32,
    pub status: RoutingStatus,
    pub battery_mv: Option<u16>,
}

impl RoutingEntry {
    fn fresh(address: Address, parent: Address, rssi: i8, now_ms: u32) -> Self {
        RoutingEntry {
            address,
            parent,
            rssi,
            last_seen_ms: now_ms,
            status: RoutingStatus::Online,
            battery_mv: None,
        }
    }
}

/// Where to hand an outgoing packet per spec §4.3's next-hop policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextHop {
    Broadcast,
    Direct(Address),
    ViaParent(Address),
    NoRoute,
}

/// FIFO-by-insertion-order bounded table. `order` tracks insertion order so
/// eviction when full always drops the longest-resident entry, per spec
/// §3's "eviction is FIFO-by-staleness when full."
pub struct RoutingTable {
    capacity: usize,
    eviction_horizon_ms: u32,
    entries: HashMap<Address, RoutingEntry>,
    order: Vec<Address>,
}

impl RoutingTable {
    pub fn new(capacity: usize, eviction_horizon_ms: u32) -> Self {
        RoutingTable {
            capacity,
            eviction_horizon_ms,
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

    /// Record that `src` was heard, relayed immediately by `last_hop`, with
    /// signal strength `rssi`. Creates a new entry (parent = last_hop) if
    /// `src` is unknown; otherwise refreshes `last_seen`/`rssi` and updates
    /// `parent` only when `last_hop != src` (a direct neighbour's parent is
    /// always itself, by definition, and must never be overwritten by a
    /// relayed copy of its own traffic).
    pub fn observe(&mut self, src: Address, last_hop: Address, rssi: i8, now_ms: u32) -> bool {
        if let Some(entry) = self.entries.get_mut(&src) {
            entry.last_seen_ms = now_ms;
            entry.rssi = rssi;
            entry.status = RoutingStatus::Online;
            if last_hop != src {
                entry.parent = last_hop;
            }
            return true;
        }

        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries
            .insert(src, RoutingEntry::fresh(src, last_hop, rssi, now_ms));
        self.order.push(src);
        true
    }

    pub fn lookup(&self, dst: Address) -> Option<&RoutingEntry> {
        self.entries.get(&dst)
    }

    pub fn observe_battery(&mut self, addr: Address, battery_mv: u16) {
        if let Some(entry) = self.entries.get_mut(&addr) {
            entry.battery_mv = Some(battery_mv);
        }
    }

    /// Next-hop decision for a packet addressed to `dst`, `self_addr` being
    /// this node's own address (needed to recognise direct neighbours).
    pub fn next_hop(&self, dst: Address, self_addr: Address) -> NextHop {
        if dst.is_broadcast() {
            return NextHop::Broadcast;
        }
        match self.entries.get(&dst) {
            Some(entry) if entry.parent == self_addr => NextHop::Direct(dst),
            Some(entry) => NextHop::ViaParent(entry.parent),
            None => NextHop::NoRoute,
        }
    }

    /// Mark entries stale/offline by age and evict anything older than the
    /// configured horizon, to bound table size over long uptimes.
    pub fn sweep(&mut self, now_ms: u32) {
        let horizon = self.eviction_horizon_ms;
        let mut evicted = 0usize;
        self.order.retain(|addr| {
            let Some(entry) = self.entries.get_mut(addr) else {
                return false;
            };
            let age = now_ms.wrapping_sub(entry.last_seen_ms);
            if age >= horizon {
                self.entries.remove(addr);
                evicted += 1;
                return false;
            }
            entry.status = if age >= STALE_WINDOW_MS {
                RoutingStatus::Offline
            } else if age >= ONLINE_WINDOW_MS {
                RoutingStatus::Stale
            } else {
                RoutingStatus::Online
            };
            true
        });
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.entries.len(), "routing_sweep_eviction");
        }
    }

    /// Read-only snapshot for the admin collaborator.
    pub fn snapshot(&self) -> Vec<RoutingEntry> {
        self.order.iter().filter_map(|a| self.entries.get(a).cloned()).collect()
    }

    /// Replace the table's contents with a persisted snapshot, preserving
    /// each entry's recorded status and battery reading verbatim (unlike
    /// [`Self::observe`], which always resets status to online). Rejects a
    /// snapshot whose record count exceeds capacity — the caller should
    /// treat that as [`crate::error::FatalError::PersistedStateCorrupt`].
    pub fn restore(&mut self, entries: Vec<RoutingEntry>) -> Result<(), ()> {
        if entries.len() > self.capacity {
            return Err(());
        }
        self.order = entries.iter().map(|e| e.address).collect();
        self.entries = entries.into_iter().map(|e| (e.address, e)).collect();
        Ok(())
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest) = self.order.first().copied() {
            self.order.remove(0);
            self.entries.remove(&oldest);
            tracing::debug!(%oldest, "routing_table_full_eviction");
        }
    }
}
