//! The packet engine: the eight-step ingress pipeline, the four-step egress
//! pipeline, local message handlers, and the `tick` duty loop. This is the
//! heart of the crate (spec §4.5) — everything else in this workspace exists
//! to support what happens here.

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use zeroize::Zeroizing;

use crate::address::Address;
use crate::aead;
use crate::codec::{self, flags, EmergencyEvent, GroupCommand, MsgType, Packet, SensorData, PACKET_LEN, PAYLOAD_LEN};
use crate::collaborators::{Advisory, Clock, KeyStore, Link, LinkResult, RandomSource, Sinks};
use crate::config::EngineConfig;
use crate::counters::{Counters, CountersSnapshot};
use crate::dedup::DuplicateSuppressor;
use crate::error::{EgressError, FatalError, IngressDrop};
use crate::keys::{self, SessionState};
use crate::routing::{NextHop, RoutingEntry, RoutingTable};
use crate::timer::Schedule;

/// Usable plaintext capacity once the trailing Poly1305 tag is accounted
/// for. Unencrypted payloads may use the full [`PAYLOAD_LEN`].
pub const PAYLOAD_CIPHERTEXT_LEN: usize = PAYLOAD_LEN - aead::TAG_LEN;

pub type PacketId = u32;

/// Result of a single `ingest` call, kept mainly for test observability —
/// none of this propagates to callers as an error (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Delivered to a local sink (and, if `dst` was broadcast, also queued
    /// for re-forwarding).
    Delivered,
    /// Re-forwarded toward another hop, not delivered locally.
    Forwarded,
    /// Both delivered locally and re-forwarded (broadcast/group traffic).
    DeliveredAndForwarded,
    /// An ACK or NACK was correlated against the outbound-waiting set.
    AckCorrelated,
    /// Accepted but produced no local delivery, forward, or ACK correlation
    /// (e.g. a `HEARTBEAT`, or a `DISCOVERY` that was answered directly).
    Accepted,
    Dropped(IngressDrop),
}

struct AckWaiter {
    frame: [u8; PACKET_LEN],
    next_hop: Address,
    deadline_interval_ms: u32,
    next_deadline_ms: u32,
    retries_left: u8,
}

/// The mesh protocol engine. Generic over its five collaborator traits so
/// the hot ingress/egress path is monomorphized and allocation-free outside
/// of the bounded tables it already owns (spec §5: "no dynamic allocation
/// ... in the ingress/egress hot path").
pub struct Engine<L: Link, C: Clock, R: RandomSource, K: KeyStore, S: Sinks> {
    config: EngineConfig,
    self_addr: Address,
    link: L,
    clock: C,
    random: R,
    keystore: K,
    sinks: S,

    routing: RoutingTable,
    dedup: DuplicateSuppressor,
    counters: Counters,

    session: SessionState,
    prev_session: Option<(u32, Zeroizing<[u8; 32]>, u32)>,

    next_packet_id: u32,
    waiters: HashMap<PacketId, AckWaiter>,

    heartbeat_due: Schedule,
    discovery_due: Schedule,
    routing_sweep_due: Schedule,
    dedup_purge_due: Schedule,
    session_rotation_due: Schedule,
}

impl<L: Link, C: Clock, R: RandomSource, K: KeyStore, S: Sinks> Engine<L, C, R, K, S> {
    pub fn new(
        config: EngineConfig,
        self_addr: Address,
        link: L,
        clock: C,
        mut random: R,
        keystore: K,
        sinks: S,
    ) -> Result<Self, FatalError> {
        let now_ms = clock.now_ms();
        let (session_id, session_key) = keystore.current_session();
        let session = SessionState {
            session_id,
            session_key: Zeroizing::new(session_key),
            started_at_ms: now_ms,
        };

        // Seed the packet-id counter from a random starting point rather
        // than 0, so a reboot doesn't replay the same (src, packet_id)
        // space the prior boot already used under the same session key —
        // packet_id uniqueness per session is the sender's responsibility
        // (spec §4.2) and a fixed restart-at-zero would violate it silently.
        let mut seed = [0u8; 4];
        random.fill(&mut seed)?;
        let next_packet_id = u32::from_le_bytes(seed);

        let heartbeat_interval = config.heartbeat_interval_ms();
        Ok(Engine {
            routing: RoutingTable::new(config.routing_capacity, config.routing_eviction_horizon_ms),
            dedup: DuplicateSuppressor::new(config.dedup_capacity),
            counters: Counters::default(),
            session,
            prev_session: None,
            next_packet_id,
            waiters: HashMap::new(),
            heartbeat_due: Schedule::due_immediately(heartbeat_interval),
            discovery_due: Schedule::due_immediately(config.discovery_interval_ms),
            routing_sweep_due: Schedule::due_immediately(config.routing_sweep_interval_ms),
            dedup_purge_due: Schedule::due_immediately(config.dedup_purge_interval_ms),
            session_rotation_due: Schedule::due_immediately(config.session_rotation_check_interval_ms),
            config,
            self_addr,
            link,
            clock,
            random,
            keystore,
            sinks,
        })
    }

    pub fn counters(&self) -> CountersSnapshot {
        self.counters.snapshot()
    }

    pub fn snapshot_routes(&self) -> Vec<RoutingEntry> {
        self.routing.snapshot()
    }

    /// Load a persisted routing-table snapshot (spec §6's "on-disk persisted
    /// state"). Reading the bytes from a filesystem path is the
    /// collaborator's job; this only decodes and installs them. A snapshot
    /// that is truncated or declares more records than this engine's
    /// configured capacity is one of the two conditions spec §7 calls fatal.
    pub fn restore_routes(&mut self, bytes: &[u8]) -> Result<(), FatalError> {
        let entries = crate::persist::decode(bytes, self.config.routing_capacity)
            .map_err(|_| FatalError::PersistedStateCorrupt)?;
        self.routing.restore(entries).map_err(|_| FatalError::PersistedStateCorrupt)
    }

    fn next_packet_id(&mut self) -> u32 {
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.wrapping_add(1);
        id
    }

    fn drop_ingress(&self, kind: IngressDrop) {
        self.counters.record_drop(kind);
    }

    // ---- ingress -------------------------------------------------------

    /// Entry point the link driver calls for every received frame. Never
    /// blocks, never panics on malformed input, never propagates an error —
    /// every rejection is counted and (except auth failures) traced at
    /// debug level (spec §7).
    pub fn ingest(&mut self, frame: &[u8], last_hop: Address, rssi: i8, now_ms: u32) -> IngestOutcome {
        self.counters.rx.fetch_add(1, Ordering::Relaxed);

        let mut packet = match codec::decode(frame) {
            Ok(p) => p,
            Err(e) => {
                let kind = IngressDrop::MalformedFrame(e);
                self.drop_ingress(kind);
                return IngestOutcome::Dropped(kind);
            }
        };

        if packet.network_id != codec::NETWORK_ID
            || packet.version != codec::PROTOCOL_VERSION
            || packet.ttl == 0
            || !packet.src.is_valid_source()
        {
            self.drop_ingress(IngressDrop::InvalidHeader);
            return IngestOutcome::Dropped(IngressDrop::InvalidHeader);
        }

        // Emergencies bypass the duplicate filter entirely (spec §4.5
        // local-handler notes, scenario 6): both copies still get processed.
        let is_emergency = packet.msg_type == MsgType::EventBroadcast as u8;
        if !is_emergency && self.dedup.seen(packet.src, packet.packet_id, now_ms) {
            self.drop_ingress(IngressDrop::Duplicate);
            return IngestOutcome::Dropped(IngressDrop::Duplicate);
        }
        if is_emergency {
            self.dedup.seen(packet.src, packet.packet_id, now_ms);
        }

        self.routing.observe(packet.src, last_hop, rssi, now_ms);

        let mut reseal_key: Option<Zeroizing<[u8; 32]>> = None;
        if packet.has_flag(flags::ENCRYPTED) {
            match self.decrypt_in_place(&mut packet, now_ms) {
                Some(key) => reseal_key = Some(key),
                None => {
                    self.drop_ingress(IngressDrop::AuthFailure);
                    return IngestOutcome::Dropped(IngressDrop::AuthFailure);
                }
            }
        }

        let is_for_me = packet.dst == self.self_addr;
        let is_broadcast = packet.dst.is_broadcast();

        let mut delivered = false;
        if is_for_me || is_broadcast {
            delivered = self.dispatch_local(&packet, now_ms);
        }

        let mut forwarded = false;
        let mut forward_drop = None;
        if !is_for_me || is_broadcast {
            match self.forward(&mut packet, reseal_key) {
                Ok(()) => forwarded = true,
                Err(reason) => forward_drop = Some(reason),
            }
        }

        if (is_for_me || is_broadcast)
            && packet.has_flag(flags::REQUIRE_ACK)
            && packet.msg_type != MsgType::Ack as u8
            && packet.msg_type != MsgType::Nack as u8
        {
            self.send_ack(packet.src, packet.packet_id, now_ms);
        }

        match (delivered, forwarded) {
            (true, true) => IngestOutcome::DeliveredAndForwarded,
            (true, false) => IngestOutcome::Delivered,
            (false, true) => IngestOutcome::Forwarded,
            (false, false) => match forward_drop {
                Some(reason) => IngestOutcome::Dropped(reason),
                None => IngestOutcome::Accepted,
            },
        }
    }

    /// Try the current session key, then (only within the rotation overlap
    /// window) the previous one. The wire format carries no explicit session
    /// id (spec §3's packet layout has none), so a receiver cannot tell
    /// "bound to an unknown session" apart from "tag doesn't verify" — both
    /// candidates failing is reported as `AuthFailure`. `UnknownSession`
    /// stays in the error enum for a future wire revision that adds an
    /// explicit session id field (see `DESIGN.md`).
    fn decrypt_in_place(&mut self, packet: &mut Packet, now_ms: u32) -> Option<Zeroizing<[u8; 32]>> {
        let nonce = aead::derive_packet_nonce(packet.packet_id, &packet.src);
        let aad = packet.header_bytes();
        let ciphertext = packet.payload[..PAYLOAD_CIPHERTEXT_LEN].to_vec();
        let mut tag = [0u8; aead::TAG_LEN];
        tag.copy_from_slice(&packet.payload[PAYLOAD_CIPHERTEXT_LEN..PAYLOAD_LEN]);

        let mut plaintext = [0u8; PAYLOAD_CIPHERTEXT_LEN];
        if aead::open(&self.session.session_key, &nonce, &aad, &ciphertext, &tag, &mut plaintext).is_ok() {
            packet.payload[..PAYLOAD_CIPHERTEXT_LEN].copy_from_slice(&plaintext);
            return Some(Zeroizing::new(*self.session.session_key));
        }

        if let Some((_, prev_key, rotated_at_ms)) = &self.prev_session {
            if SessionState::within_overlap(*rotated_at_ms, now_ms)
                && aead::open(prev_key, &nonce, &aad, &ciphertext, &tag, &mut plaintext).is_ok()
            {
                let key = Zeroizing::new(**prev_key);
                packet.payload[..PAYLOAD_CIPHERTEXT_LEN].copy_from_slice(&plaintext);
                return Some(key);
            }
        }
        None
    }

    fn dispatch_local(&mut self, packet: &Packet, now_ms: u32) -> bool {
        match MsgType::from_u8(packet.msg_type) {
            Some(MsgType::DataSensor) => match SensorData::decode(&packet.payload) {
                Ok(data) => {
                    if data.temperature_c > 40.0 {
                        self.sinks.on_advisory(packet.src, Advisory::HighTemperature);
                    }
                    if data.battery_mv < 3000 {
                        self.sinks.on_advisory(packet.src, Advisory::LowBattery);
                    }
                    self.routing.observe_battery(packet.src, data.battery_mv);
                    self.sinks.on_sensor(packet.src, data);
                    self.counters.delivered_local.fetch_add(1, Ordering::Relaxed);
                    true
                }
                Err(_) => false,
            },
            Some(MsgType::CmdSet) | Some(MsgType::CmdGet) => {
                self.sinks.on_command(packet.src, packet.msg_type, &packet.payload);
                self.counters.delivered_local.fetch_add(1, Ordering::Relaxed);
                true
            }
            Some(MsgType::CmdGroup) => match GroupCommand::decode(&packet.payload) {
                Ok(cmd) => {
                    if packet.has_flag(flags::LOCAL_PROCESS) || self.config.participates_in_group(cmd.group_id) {
                        self.sinks.on_command(packet.src, packet.msg_type, &packet.payload);
                        self.counters.delivered_local.fetch_add(1, Ordering::Relaxed);
                        true
                    } else {
                        false
                    }
                }
                Err(_) => false,
            },
            Some(MsgType::EventBroadcast) => match EmergencyEvent::decode(&packet.payload) {
                Ok(event) => {
                    self.sinks.on_event(packet.src, event);
                    self.counters.delivered_local.fetch_add(1, Ordering::Relaxed);
                    true
                }
                Err(_) => false,
            },
            Some(MsgType::Heartbeat) => false, // routing already refreshed by observe()
            Some(MsgType::Discovery) => {
                self.reply_discovery(packet.src, now_ms);
                false
            }
            Some(MsgType::Ack) | Some(MsgType::Nack) => {
                self.correlate_ack(packet);
                false
            }
            _ => false,
        }
    }

    fn correlate_ack(&mut self, packet: &Packet) {
        if self.waiters.is_empty() {
            return;
        }
        let Some(acked_id_bytes) = packet.payload.get(0..4) else { return };
        let acked_id = u32::from_le_bytes(acked_id_bytes.try_into().unwrap());
        self.waiters.remove(&acked_id);
    }

    fn reply_discovery(&mut self, to: Address, now_ms: u32) {
        let mut payload = [0u8; 9];
        payload[0..6].copy_from_slice(self.self_addr.as_bytes());
        payload[6] = self.config.is_repeater as u8;
        payload[7..9].copy_from_slice(&(self.routing.len() as u16).to_le_bytes());
        let _ = self.submit(to, MsgType::DeviceStateUpdate as u8, 0, 0, &payload, now_ms);
    }

    fn send_ack(&mut self, to: Address, acked_packet_id: u32, now_ms: u32) {
        let mut payload = [0u8; 4];
        payload.copy_from_slice(&acked_packet_id.to_le_bytes());
        let _ = self.submit(to, MsgType::Ack as u8, 0, 0, &payload, now_ms);
    }

    /// Decrement TTL, look up the next hop, and (if the payload was
    /// decrypted on ingress) re-seal it under the outgoing header before
    /// transmitting. `Err` carries the drop reason (already counted).
    fn forward(&mut self, packet: &mut Packet, reseal_key: Option<Zeroizing<[u8; 32]>>) -> Result<(), IngressDrop> {
        if packet.ttl <= 1 {
            self.drop_ingress(IngressDrop::TtlExhausted);
            return Err(IngressDrop::TtlExhausted);
        }
        packet.ttl -= 1;
        packet.last_hop = self.self_addr;

        let next_hop_addr = match self.routing.next_hop(packet.dst, self.self_addr) {
            NextHop::Broadcast => Address::BROADCAST,
            NextHop::Direct(a) | NextHop::ViaParent(a) => a,
            NextHop::NoRoute => {
                self.drop_ingress(IngressDrop::NoRoute);
                return Err(IngressDrop::NoRoute);
            }
        };

        // The AAD is the header, which just changed (ttl, last_hop). The
        // nonce is derived only from packet_id and src (both stable across
        // hops), so re-sealing the *same* plaintext under the *same* nonce
        // with a new AAD is safe here: the keystream is identical each time,
        // but since the plaintext never changes neither does the resulting
        // ciphertext, so nothing beyond what a passive observer already sees
        // is exposed. See `DESIGN.md` for the full reasoning — the
        // alternative (binding the tag to the originating header only)
        // would make every multi-hop relay fail authentication at hop two.
        if let Some(key) = reseal_key {
            let nonce = aead::derive_packet_nonce(packet.packet_id, &packet.src);
            let aad = packet.header_bytes();
            let plaintext = packet.payload[..PAYLOAD_CIPHERTEXT_LEN].to_vec();
            let mut ciphertext = [0u8; PAYLOAD_CIPHERTEXT_LEN];
            let tag = aead::seal(&key, &nonce, &aad, &plaintext, &mut ciphertext);
            packet.payload[..PAYLOAD_CIPHERTEXT_LEN].copy_from_slice(&ciphertext);
            packet.payload[PAYLOAD_CIPHERTEXT_LEN..PAYLOAD_LEN].copy_from_slice(&tag);
        }

        let frame = codec::encode(packet);
        match self.link.send(next_hop_addr, &frame) {
            LinkResult::Ok => {
                self.counters.tx.fetch_add(1, Ordering::Relaxed);
                self.counters.forwarded.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            LinkResult::Busy | LinkResult::Error => {
                self.drop_ingress(IngressDrop::LinkBusy);
                Err(IngressDrop::LinkBusy)
            }
        }
    }

    // ---- egress ---------------------------------------------------------

    /// Build, optionally encrypt, and transmit a packet; register an ACK
    /// waiter if requested. Mirrors the ingress pipeline's shape but for
    /// locally originated traffic (spec §4.5 egress steps 1-4).
    pub fn submit(
        &mut self,
        dst: Address,
        msg_type: u8,
        flags_bits: u8,
        group_id: u16,
        payload: &[u8],
        now_ms: u32,
    ) -> Result<PacketId, EgressError> {
        let encrypted = flags_bits & flags::ENCRYPTED != 0;
        let max_len = if encrypted { PAYLOAD_CIPHERTEXT_LEN } else { PAYLOAD_LEN };
        if payload.len() > max_len {
            let err = EgressError::PayloadTooLarge(payload.len(), max_len);
            self.counters.record_egress_error(err);
            return Err(err);
        }

        let packet_id = self.next_packet_id();
        let mut packet = Packet::new(self.self_addr, dst, msg_type, flags_bits, group_id);
        packet.ttl = self.config.default_ttl;
        packet.packet_id = packet_id;
        packet.payload[..payload.len()].copy_from_slice(payload);

        if encrypted {
            let nonce = aead::derive_packet_nonce(packet_id, &self.self_addr);
            let aad = packet.header_bytes();
            let plaintext = packet.payload[..PAYLOAD_CIPHERTEXT_LEN].to_vec();
            let mut ciphertext = [0u8; PAYLOAD_CIPHERTEXT_LEN];
            let tag = aead::seal(&self.session.session_key, &nonce, &aad, &plaintext, &mut ciphertext);
            packet.payload[..PAYLOAD_CIPHERTEXT_LEN].copy_from_slice(&ciphertext);
            packet.payload[PAYLOAD_CIPHERTEXT_LEN..PAYLOAD_LEN].copy_from_slice(&tag);
        }

        let ttl_budget = packet.ttl;
        let next_hop_addr = match self.routing.next_hop(dst, self.self_addr) {
            NextHop::Broadcast => Address::BROADCAST,
            NextHop::Direct(a) | NextHop::ViaParent(a) => a,
            NextHop::NoRoute if dst.is_broadcast() => Address::BROADCAST,
            NextHop::NoRoute => {
                self.counters.record_egress_error(EgressError::NoRoute);
                return Err(EgressError::NoRoute);
            }
        };

        let frame = codec::encode(&packet);
        match self.link.send(next_hop_addr, &frame) {
            LinkResult::Ok => self.counters.tx.fetch_add(1, Ordering::Relaxed),
            LinkResult::Busy | LinkResult::Error => {
                self.counters.record_egress_error(EgressError::LinkBusy);
                return Err(EgressError::LinkBusy);
            }
        };

        if flags_bits & flags::REQUIRE_ACK != 0 {
            let interval = self.config.ack_deadline_ms(ttl_budget);
            self.waiters.insert(
                packet_id,
                AckWaiter {
                    frame,
                    next_hop: next_hop_addr,
                    deadline_interval_ms: interval,
                    next_deadline_ms: now_ms.wrapping_add(interval),
                    retries_left: self.config.ack_retry_count,
                },
            );
        }

        Ok(packet_id)
    }

    // ---- timer loop -------------------------------------------------------

    /// Called from the host's event loop on every iteration (or at least
    /// once per expected due interval); cheap to call often since every duty
    /// is gated by its own `Schedule` (spec §4.6).
    pub fn tick(&mut self, now_ms: u32) {
        if self.heartbeat_due.is_due(now_ms) {
            let _ = self.submit(Address::BROADCAST, MsgType::Heartbeat as u8, 0, 0, &[], now_ms);
            self.heartbeat_due.set_interval_ms(self.config.heartbeat_interval_ms());
            self.heartbeat_due.reschedule(now_ms);
        }
        if self.discovery_due.is_due(now_ms) {
            let _ = self.submit(Address::BROADCAST, MsgType::Discovery as u8, 0, 0, &[], now_ms);
            self.discovery_due.reschedule(now_ms);
        }
        if self.routing_sweep_due.is_due(now_ms) {
            self.routing.sweep(now_ms);
            self.routing_sweep_due.reschedule(now_ms);
        }
        if self.dedup_purge_due.is_due(now_ms) {
            self.dedup.purge(now_ms);
            self.dedup_purge_due.reschedule(now_ms);
        }
        if self.session_rotation_due.is_due(now_ms) {
            self.check_session_rotation(now_ms);
            self.session_rotation_due.reschedule(now_ms);
        }
        self.expire_ack_waiters(now_ms);
    }

    fn check_session_rotation(&mut self, now_ms: u32) {
        if !self.session.is_due_for_rotation(now_ms) {
            return;
        }
        let new_id = self.session.session_id.wrapping_add(1);
        let new_key = keys::derive_session_key(&self.keystore.master_key(), new_id);
        let retired = std::mem::replace(
            &mut self.session,
            SessionState { session_id: new_id, session_key: new_key, started_at_ms: now_ms },
        );
        self.prev_session = Some((retired.session_id, retired.session_key, now_ms));
        tracing::debug!(new_session_id = new_id, "session_rotated");
    }

    fn expire_ack_waiters(&mut self, now_ms: u32) {
        let due: Vec<PacketId> = self
            .waiters
            .iter()
            .filter(|(_, w)| now_ms.wrapping_sub(w.next_deadline_ms) < u32::MAX / 2)
            .map(|(id, _)| *id)
            .collect();

        for packet_id in due {
            let Some(waiter) = self.waiters.get_mut(&packet_id) else { continue };
            if waiter.retries_left == 0 {
                self.waiters.remove(&packet_id);
                self.counters.record_egress_error(EgressError::DeliveryFailed(packet_id));
                self.sinks.on_delivery_failed(packet_id);
                continue;
            }
            waiter.retries_left -= 1;
            waiter.next_deadline_ms = now_ms.wrapping_add(waiter.deadline_interval_ms);
            match self.link.send(waiter.next_hop, &waiter.frame) {
                LinkResult::Ok => self.counters.tx.fetch_add(1, Ordering::Relaxed),
                LinkResult::Busy | LinkResult::Error => {
                    self.counters.record_egress_error(EgressError::LinkBusy)
                }
            };
        }
    }

    pub fn clock_now_ms(&self) -> u32 {
        self.clock.now_ms()
    }
}
