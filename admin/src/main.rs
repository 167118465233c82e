//! meshstatic-admin — demonstration HTTP admin surface for a single
//! `meshstatic-core` engine instance. Exposes route-table and counter
//! snapshots as JSON and a discovery-broadcast trigger.
//!
//! This binary is the out-of-scope "administrative HTTP surface" the
//! protocol spec only lists for completeness (routing and dedup state, send
//! counters, remote config push), built with the same stack an ingestion
//! edge in this shop reaches for — axum, tower-http, tracing-subscriber —
//! so the surface is a working demo, not a stub. Its [`LoggingLink`] does
//! not talk to real mesh hardware; a production deployment swaps it for a
//! serial/radio driver without touching the engine.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use meshstatic_core::prelude::*;
use meshstatic_core::{keys, CountersSnapshot, RoutingEntry};
use rand::RngCore;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Logs every frame it would have transmitted instead of touching real
/// hardware.
struct LoggingLink;

impl Link for LoggingLink {
    fn send(&mut self, next_hop: Address, frame: &[u8]) -> LinkResult {
        tracing::debug!(%next_hop, len = frame.len(), "link_send");
        LinkResult::Ok
    }
}

/// Milliseconds elapsed since this process started. Wraps the same way the
/// wire format's `u32` millisecond clock does, just on a much longer cycle.
struct SystemClock {
    start: Instant,
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }
}

struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), FatalError> {
        rand::thread_rng().fill_bytes(buf);
        Ok(())
    }
}

/// A master key and the single session derived from it at startup. Rotation
/// past the first 24h is handled by the engine itself, which re-derives
/// future session ids from `master_key()` — this collaborator only needs to
/// hand out the starting point.
struct EnvKeyStore {
    master_key: [u8; 32],
    session_id: u32,
    session_key: [u8; 32],
}

impl EnvKeyStore {
    fn from_env() -> Self {
        const VAR: &str = "MESHSTATIC_MASTER_KEY";
        let master_key = match std::env::var(VAR) {
            Ok(hex) => parse_hex_key(&hex).unwrap_or_else(|| {
                warn!(var = VAR, "value is not 64 hex characters; generating an ephemeral key instead");
                random_key()
            }),
            Err(_) => {
                info!(var = VAR, "not set; generating an ephemeral master key for this process");
                random_key()
            }
        };
        let session_key = *keys::derive_session_key(&master_key, 0);
        EnvKeyStore { master_key, session_id: 0, session_key }
    }
}

impl KeyStore for EnvKeyStore {
    fn master_key(&self) -> [u8; 32] {
        self.master_key
    }

    fn current_session(&self) -> (u32, [u8; 32]) {
        (self.session_id, self.session_key)
    }
}

fn random_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

fn parse_hex_key(hex: &str) -> Option<[u8; 32]> {
    let hex = hex.trim();
    if hex.len() != 64 {
        return None;
    }
    let mut key = [0u8; 32];
    for (i, byte) in key.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(key)
}

/// Logs every sink callback at the level the condition deserves; the
/// admin surface itself doesn't act on sensor/command traffic, it only
/// reports what the engine saw.
#[derive(Default)]
struct AdminSinks;

impl Sinks for AdminSinks {
    fn on_sensor(&mut self, src: Address, data: SensorData) {
        info!(%src, battery_mv = data.battery_mv, temperature_c = data.temperature_c, "sensor_reading");
    }

    fn on_command(&mut self, src: Address, msg_type: u8, bytes: &[u8]) {
        info!(%src, msg_type, len = bytes.len(), "command_received");
    }

    fn on_event(&mut self, src: Address, event: EmergencyEvent) {
        warn!(%src, event_type = event.event_type, severity = event.severity, "emergency_event");
    }

    fn on_advisory(&mut self, src: Address, advisory: Advisory) {
        warn!(%src, ?advisory, "advisory");
    }

    fn on_delivery_failed(&mut self, packet_id: u32) {
        warn!(packet_id, "delivery_failed");
    }

    fn on_egress_error(&mut self, packet_id: u32, error: EgressError) {
        warn!(packet_id, %error, "egress_error");
    }
}

type AdminEngine = Engine<LoggingLink, SystemClock, OsRandom, EnvKeyStore, AdminSinks>;

#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<AdminEngine>>,
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn ready() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(s): State<AppState>) -> Json<CountersSnapshot> {
    let engine = s.engine.lock().unwrap();
    Json(engine.counters())
}

async fn routes(State(s): State<AppState>) -> Json<Vec<RoutingEntry>> {
    let engine = s.engine.lock().unwrap();
    Json(engine.snapshot_routes())
}

#[derive(serde::Serialize)]
struct DiscoveryResponse {
    packet_id: u32,
}

async fn discovery(State(s): State<AppState>) -> impl IntoResponse {
    let mut engine = s.engine.lock().unwrap();
    let now_ms = engine.clock_now_ms();
    match engine.submit(Address::BROADCAST, MsgType::Discovery as u8, 0, 0, &[], now_ms) {
        Ok(packet_id) => (StatusCode::ACCEPTED, Json(DiscoveryResponse { packet_id })).into_response(),
        Err(e) => {
            error!(error = %e, "discovery_submit_failed");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

/// Drives the engine's periodic duties (heartbeat, discovery, routing sweep,
/// dedup purge, session rotation) the way a real device's main loop would,
/// just on a wall-clock tick instead of an embedded scheduler.
async fn tick_loop(state: AppState) {
    let mut interval = tokio::time::interval(std::time::Duration::from_millis(250));
    loop {
        interval.tick().await;
        let mut engine = state.engine.lock().unwrap();
        let now_ms = engine.clock_now_ms();
        engine.tick(now_ms);
    }
}

fn self_address() -> Address {
    match std::env::var("MESHSTATIC_SELF_ADDR").ok().and_then(|s| parse_colon_hex(&s)) {
        Some(addr) => addr,
        None => Address::new([0x02, 0, 0, 0, 0, 0x01]),
    }
}

fn parse_colon_hex(s: &str) -> Option<Address> {
    let mut bytes = [0u8; 6];
    let parts: Vec<&str> = s.trim().split(':').collect();
    if parts.len() != 6 {
        return None;
    }
    for (i, part) in parts.iter().enumerate() {
        bytes[i] = u8::from_str_radix(part, 16).ok()?;
    }
    Some(Address::new(bytes))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "meshstatic_admin=info,tower_http=info".into()))
        .json()
        .init();

    let self_addr = self_address();
    info!(%self_addr, "meshstatic-admin starting");

    let engine = AdminEngine::new(
        EngineConfig::default(),
        self_addr,
        LoggingLink,
        SystemClock { start: Instant::now() },
        OsRandom,
        EnvKeyStore::from_env(),
        AdminSinks::default(),
    )
    .unwrap_or_else(|e| {
        eprintln!("engine construction failed: {e}");
        std::process::exit(1);
    });

    let state = AppState { engine: Arc::new(Mutex::new(engine)) };
    tokio::spawn(tick_loop(state.clone()));

    let app = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .route("/routes", get(routes))
        .route("/discovery", post(discovery))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let port: u16 = std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(8088);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap_or_else(|e| {
        eprintln!("could not bind port {port}: {e}");
        std::process::exit(1);
    });
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown");
        })
        .await
        .unwrap_or_else(|e| {
            eprintln!("server error: {e}");
            std::process::exit(1);
        });
}
