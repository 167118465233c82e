//! meshstatic-sim — an in-process, multi-node simulator for
//! `meshstatic-core`. It fills the role `tools/loadtest` fills for the
//! teacher: an ergonomic way to drive the system from outside for manual
//! testing, printing periodic progress the same way, just against a
//! simulated radio medium and a chain of real [`Engine`]s instead of HTTP
//! requests against a running server.
//!
//! Topology is a linear repeater chain: node `i` can hear nodes `i-1` and
//! `i+1` only. Node 1 periodically submits `DATA_SENSOR` readings toward the
//! far end of the chain with `REQUIRE_ACK` set, exercising multi-hop relay,
//! routing discovery (via heartbeats), and ACK correlation end to end. A
//! midpoint node also raises an `EVENT_BROADCAST` partway through the run to
//! exercise the emergency dedup bypass and broadcast re-forwarding.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Instant;

use clap::Parser;
use rand::RngCore;
use tracing::info;

use meshstatic_core::prelude::*;
use meshstatic_core::{codec, keys};

#[derive(Parser)]
#[command(name = "meshstatic-sim")]
#[command(about = "In-process multi-node simulator for meshstatic-core")]
struct Args {
    /// Number of nodes in the repeater chain (node 1 originates, the last
    /// node is the coordinator).
    #[arg(long, default_value_t = 5)]
    nodes: usize,

    /// Number of simulated ticks to run.
    #[arg(long, default_value_t = 400)]
    ticks: u32,

    /// Milliseconds of simulated time advanced per tick.
    #[arg(long, default_value_t = 200)]
    tick_ms: u32,

    /// Submit a sensor reading from node 1 every this many ticks.
    #[arg(long, default_value_t = 25)]
    sensor_every: u32,

    /// RSSI reported for every simulated link, constant across the run —
    /// this simulator models connectivity as a topology graph, not a
    /// distance-and-attenuation radio model.
    #[arg(long, default_value_t = -55)]
    rssi: i8,
}

/// A frame handed to the medium: which node sent it, which hop it was
/// addressed to, and the raw bytes.
struct OutboundFrame {
    from_idx: usize,
    next_hop: Address,
    bytes: Vec<u8>,
}

type Outbox = Rc<RefCell<VecDeque<OutboundFrame>>>;

/// The simulated link layer: every `send` call is appended to a shared
/// outbox instead of touching real hardware. The main loop drains it and
/// decides, based on chain topology, which neighbouring node(s) actually
/// hear the transmission.
struct ChainLink {
    idx: usize,
    outbox: Outbox,
}

impl Link for ChainLink {
    fn send(&mut self, next_hop: Address, frame: &[u8]) -> LinkResult {
        self.outbox.borrow_mut().push_back(OutboundFrame {
            from_idx: self.idx,
            next_hop,
            bytes: frame.to_vec(),
        });
        LinkResult::Ok
    }
}

/// Millisecond clock shared by every node in the simulation — all nodes
/// observe the same simulated wall-clock tick.
#[derive(Clone)]
struct SharedClock(Rc<RefCell<u32>>);

impl Clock for SharedClock {
    fn now_ms(&self) -> u32 {
        *self.0.borrow()
    }
}

struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), FatalError> {
        rand::thread_rng().fill_bytes(buf);
        Ok(())
    }
}

/// Every node in the simulation is provisioned with the same master key, as
/// a real deployment's boot-time key provisioning would do; each derives the
/// same session key independently (spec §4.2's session-key derivation is
/// deterministic given the same master key and session id).
struct SharedKeyStore {
    master_key: [u8; 32],
    session_key: [u8; 32],
}

impl SharedKeyStore {
    fn new(master_key: [u8; 32]) -> Self {
        let session_key = *keys::derive_session_key(&master_key, 0);
        SharedKeyStore { master_key, session_key }
    }
}

impl KeyStore for SharedKeyStore {
    fn master_key(&self) -> [u8; 32] {
        self.master_key
    }

    fn current_session(&self) -> (u32, [u8; 32]) {
        (0, self.session_key)
    }
}

/// Per-node tallies of what reached this node's local handlers, printed in
/// the final summary.
#[derive(Default, Clone)]
struct SimStats {
    sensor_readings: u64,
    commands: u64,
    events: u64,
    advisories: u64,
    delivery_failed: u64,
}

struct SimSinks {
    idx: usize,
    stats: Rc<RefCell<SimStats>>,
}

impl Sinks for SimSinks {
    fn on_sensor(&mut self, src: Address, data: SensorData) {
        self.stats.borrow_mut().sensor_readings += 1;
        info!(node = self.idx, %src, temperature_c = data.temperature_c, battery_mv = data.battery_mv, "sensor_delivered");
    }

    fn on_command(&mut self, src: Address, msg_type: u8, _bytes: &[u8]) {
        self.stats.borrow_mut().commands += 1;
        info!(node = self.idx, %src, msg_type, "command_delivered");
    }

    fn on_event(&mut self, src: Address, event: EmergencyEvent) {
        self.stats.borrow_mut().events += 1;
        info!(node = self.idx, %src, severity = event.severity, "emergency_delivered");
    }

    fn on_advisory(&mut self, src: Address, advisory: Advisory) {
        self.stats.borrow_mut().advisories += 1;
        info!(node = self.idx, %src, ?advisory, "advisory_raised");
    }

    fn on_delivery_failed(&mut self, packet_id: u32) {
        self.stats.borrow_mut().delivery_failed += 1;
        info!(node = self.idx, packet_id, "delivery_failed");
    }
}

type SimEngine = Engine<ChainLink, SharedClock, ThreadRandom, SharedKeyStore, SimSinks>;

fn node_addr(idx: usize) -> Address {
    Address::new([0x02, 0, 0, 0, 0, idx as u8])
}

fn build_node(idx: usize, outbox: Outbox, clock: SharedClock, master_key: [u8; 32], stats: Rc<RefCell<SimStats>>) -> SimEngine {
    let mut config = EngineConfig::default();
    config.is_repeater = idx != 1; // only the originator is a plain leaf node
    Engine::new(
        config,
        node_addr(idx),
        ChainLink { idx, outbox },
        clock,
        ThreadRandom,
        SharedKeyStore::new(master_key),
        SimSinks { idx, stats },
    )
    .unwrap_or_else(|e| {
        eprintln!("node {idx} failed to start: {e}");
        std::process::exit(1);
    })
}

/// Drain the shared outbox, delivering each frame only to chain-adjacent
/// neighbours — the simulated stand-in for "only nodes in radio range hear
/// this transmission."
fn deliver_outbox(outbox: &Outbox, nodes: &mut [SimEngine], rssi: i8, now_ms: u32) {
    loop {
        let frame = outbox.borrow_mut().pop_front();
        let Some(frame) = frame else { break };
        let sender_addr = node_addr(frame.from_idx);
        let neighbours: Vec<usize> = [frame.from_idx.wrapping_sub(1), frame.from_idx + 1]
            .into_iter()
            .filter(|&n| n >= 1 && n <= nodes.len())
            .collect();

        for &n in &neighbours {
            if frame.next_hop.is_broadcast() || frame.next_hop == node_addr(n) {
                nodes[n - 1].ingest(&frame.bytes, sender_addr, rssi, now_ms);
            }
        }
    }
}

fn sensor_payload(tick: u32) -> [u8; codec::PAYLOAD_LEN] {
    let mut payload = [0u8; codec::PAYLOAD_LEN];
    let data = SensorData {
        device_type: 1,
        timestamp_s: tick,
        temperature_c: 22.0 + (tick % 30) as f32,
        humidity_pct: 45.0,
        battery_mv: 3600u16.saturating_sub((tick % 700) as u16),
        rssi: -50,
        accuracy_pct: 95,
    };
    let encoded = data.encode();
    payload[..encoded.len()].copy_from_slice(&encoded);
    payload
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "meshstatic_sim=info".into()))
        .init();

    let args = Args::parse();
    if args.nodes < 2 {
        eprintln!("need at least 2 nodes to form a chain");
        std::process::exit(1);
    }

    println!("=== MeshStatic Simulator ===");
    println!("Nodes:         {} (chain, node 1 -> node {})", args.nodes, args.nodes);
    println!("Ticks:         {} x {}ms", args.ticks, args.tick_ms);
    println!("Sensor cadence: every {} ticks from node 1", args.sensor_every);
    println!();

    let mut master_key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut master_key);

    let outbox: Outbox = Rc::new(RefCell::new(VecDeque::new()));
    let clock = SharedClock(Rc::new(RefCell::new(0)));

    let stats: Vec<Rc<RefCell<SimStats>>> = (0..args.nodes).map(|_| Rc::new(RefCell::new(SimStats::default()))).collect();
    let mut nodes: Vec<SimEngine> = (1..=args.nodes)
        .map(|idx| build_node(idx, outbox.clone(), clock.clone(), master_key, stats[idx - 1].clone()))
        .collect();

    let coordinator = node_addr(args.nodes);
    let emergency_origin = args.nodes / 2 + 1;

    let start = Instant::now();
    let mut sensor_packets_sent = 0u64;
    let mut emergency_sent = false;

    for tick in 0..args.ticks {
        *clock.0.borrow_mut() = tick * args.tick_ms;
        let now_ms = tick * args.tick_ms;

        for node in nodes.iter_mut() {
            node.tick(now_ms);
        }
        deliver_outbox(&outbox, &mut nodes, args.rssi, now_ms);

        if tick > 0 && tick % args.sensor_every == 0 {
            let payload = sensor_payload(tick);
            let result = nodes[0].submit(
                coordinator,
                codec::MsgType::DataSensor as u8,
                codec::flags::REQUIRE_ACK,
                0,
                &payload,
                now_ms,
            );
            if result.is_ok() {
                sensor_packets_sent += 1;
            }
            deliver_outbox(&outbox, &mut nodes, args.rssi, now_ms);
        }

        // Midpoint node raises one emergency broadcast partway through the
        // run, once routes have had time to settle via heartbeats.
        if !emergency_sent && tick == args.ticks / 2 {
            let mut extra = [0u8; 16];
            extra[..4].copy_from_slice(b"fire");
            let event = EmergencyEvent {
                event_type: 1,
                severity: 9,
                sensor_addr: node_addr(emergency_origin),
                extra_len: 4,
                extra,
            };
            let mut payload = [0u8; codec::PAYLOAD_LEN];
            let encoded = event.encode();
            payload[..encoded.len()].copy_from_slice(&encoded);
            let _ = nodes[emergency_origin - 1].submit(
                Address::BROADCAST,
                codec::MsgType::EventBroadcast as u8,
                codec::flags::EMERGENCY,
                0,
                &payload,
                now_ms,
            );
            deliver_outbox(&outbox, &mut nodes, args.rssi, now_ms);
            emergency_sent = true;
        }

        if tick % 50 == 0 {
            let elapsed = start.elapsed().as_secs_f64();
            println!("  [tick {tick:>4}] sim_ms={now_ms} sensor_packets_sent={sensor_packets_sent} wall={elapsed:.2}s");
        }
    }

    println!("\n=== Results ===");
    for (i, node) in nodes.iter().enumerate() {
        let idx = i + 1;
        let counters = node.counters();
        let s = stats[i].borrow();
        println!(
            "node {idx}: rx={} tx={} delivered_local={} forwarded={} duplicate={} auth_failure={} ttl_exhausted={} no_route={} | sensor={} commands={} events={} advisories={} delivery_failed={}",
            counters.rx,
            counters.tx,
            counters.delivered_local,
            counters.forwarded,
            counters.duplicate,
            counters.auth_failure,
            counters.ttl_exhausted,
            counters.no_route,
            s.sensor_readings,
            s.commands,
            s.events,
            s.advisories,
            s.delivery_failed,
        );
    }

    let coordinator_routes = nodes[args.nodes - 1].snapshot_routes();
    println!("\ncoordinator routing table: {} entries known", coordinator_routes.len());
    for entry in &coordinator_routes {
        println!("  {} via parent {} rssi={} status={:?}", entry.address, entry.parent, entry.rssi, entry.status);
    }
}
