//! Explicit engine configuration, passed at construction rather than held
//! as global state (spec §9: "Represent as an explicit configuration object
//! passed at engine construction").

use crate::{codec, dedup, routing};

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub routing_capacity: usize,
    pub routing_eviction_horizon_ms: u32,
    pub dedup_capacity: usize,
    pub default_ttl: u8,
    /// Retransmit attempts for `REQUIRE_ACK` submissions after the first
    /// deadline miss. Spec §9 open question: not clearly defined upstream;
    /// one retransmit is the chosen default (see `DESIGN.md`).
    pub ack_retry_count: u8,
    pub ack_deadline_min_ms: u32,
    pub ack_deadline_max_ms: u32,
    pub heartbeat_interval_node_ms: u32,
    pub heartbeat_interval_repeater_ms: u32,
    pub discovery_interval_ms: u32,
    pub routing_sweep_interval_ms: u32,
    pub dedup_purge_interval_ms: u32,
    pub session_rotation_check_interval_ms: u32,
    /// Whether this node is a repeater (shorter heartbeat cadence) or a leaf
    /// node (spec §4.6: "60s (nodes) / 30s (repeaters)").
    pub is_repeater: bool,
    /// Group ids this node participates in, for the `CMD_GROUP` local-process
    /// decision in spec §4.5 step 6.
    pub group_memberships: [u16; 8],
    pub group_membership_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            routing_capacity: routing::DEFAULT_CAPACITY,
            routing_eviction_horizon_ms: routing::DEFAULT_EVICTION_HORIZON_MS,
            dedup_capacity: dedup::DEFAULT_CAPACITY,
            default_ttl: codec::DEFAULT_TTL,
            ack_retry_count: 1,
            ack_deadline_min_ms: 500,
            ack_deadline_max_ms: 5_000,
            heartbeat_interval_node_ms: 60_000,
            heartbeat_interval_repeater_ms: 30_000,
            discovery_interval_ms: 10 * 60_000,
            routing_sweep_interval_ms: 60_000,
            dedup_purge_interval_ms: 30_000,
            session_rotation_check_interval_ms: 60_000,
            is_repeater: false,
            group_memberships: [0; 8],
            group_membership_count: 0,
        }
    }
}

impl EngineConfig {
    pub fn heartbeat_interval_ms(&self) -> u32 {
        if self.is_repeater {
            self.heartbeat_interval_repeater_ms
        } else {
            self.heartbeat_interval_node_ms
        }
    }

    pub fn participates_in_group(&self, group_id: u16) -> bool {
        self.group_memberships[..self.group_membership_count].contains(&group_id)
    }

    /// ACK deadline for a submission: `2s * (default_ttl - ttl_budget)`,
    /// clamped to `[ack_deadline_min_ms, ack_deadline_max_ms]` (spec §4.5
    /// egress step 4). `ttl_budget` is the outgoing packet's `ttl` field.
    pub fn ack_deadline_ms(&self, ttl_budget: u8) -> u32 {
        let hops = self.default_ttl.saturating_sub(ttl_budget) as u32;
        (2_000 * hops).clamp(self.ack_deadline_min_ms, self.ack_deadline_max_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_constants() {
        let c = EngineConfig::default();
        assert_eq!(c.routing_capacity, 100);
        assert_eq!(c.dedup_capacity, 128);
        assert_eq!(c.default_ttl, 7);
    }

    #[test]
    fn heartbeat_interval_depends_on_role() {
        let mut c = EngineConfig::default();
        assert_eq!(c.heartbeat_interval_ms(), 60_000);
        c.is_repeater = true;
        assert_eq!(c.heartbeat_interval_ms(), 30_000);
    }

    #[test]
    fn ack_deadline_is_clamped() {
        let c = EngineConfig::default();
        assert_eq!(c.ack_deadline_ms(7), c.ack_deadline_min_ms); // 0 hops -> clamp to min
        assert_eq!(c.ack_deadline_ms(5), 4_000); // 2 hops
        assert_eq!(c.ack_deadline_ms(0), c.ack_deadline_max_ms); // 7 hops -> clamp to max
    }

    #[test]
    fn group_membership_lookup() {
        let mut c = EngineConfig::default();
        c.group_memberships[0] = 42;
        c.group_membership_count = 1;
        assert!(c.participates_in_group(42));
        assert!(!c.participates_in_group(7));
    }
}
