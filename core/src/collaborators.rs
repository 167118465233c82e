//! The boundary the engine is driven through. Everything here is a trait:
//! the link driver, sensor payload sinks, the HTTP admin surface, and
//! persisted configuration all live outside this crate and implement these
//! interfaces (spec §1, §6, §9 — "model the link as a small trait/interface;
//! do not require a specific runtime").

use crate::address::Address;
use crate::codec::{EmergencyEvent, SensorData};
use crate::error::{EgressError, FatalError};

/// Outcome of a non-blocking link send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkResult {
    Ok,
    Busy,
    Error,
}

/// The broadcast-capable link layer. `send` must not block; if the driver
/// can't accept the frame right now it returns `Busy` and the engine counts
/// `LinkBusy` rather than retrying synchronously.
pub trait Link {
    fn send(&mut self, next_hop: Address, frame: &[u8]) -> LinkResult;
}

/// Monotonic millisecond clock, wrap-around aware (spec §6).
pub trait Clock {
    fn now_ms(&self) -> u32;
}

/// Cryptographically strong randomness source. Fallible: spec §7 names
/// "inability to obtain randomness at initialisation" as one of only two
/// fatal conditions, so the source itself must be able to report that
/// failure rather than silently hand back zeroed or low-quality bytes.
pub trait RandomSource {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), FatalError>;
}

/// Master key and current session material. The master key never leaves
/// this trait's implementor in plaintext for longer than a call needs it.
pub trait KeyStore {
    fn master_key(&self) -> [u8; 32];
    /// Current session id and key, as the host's key schedule understands
    /// it (the engine also runs its own rotation timer against the session
    /// it derived at startup — see `Engine::tick`).
    fn current_session(&self) -> (u32, [u8; 32]);
}

/// Local delivery sinks for payloads the engine decodes and accepts.
pub trait Sinks {
    fn on_sensor(&mut self, src: Address, data: SensorData);
    fn on_command(&mut self, src: Address, msg_type: u8, bytes: &[u8]);
    fn on_event(&mut self, src: Address, event: EmergencyEvent);
    /// Advisory signal raised alongside `on_sensor` when a reading crosses a
    /// threshold worth a caller's attention (spec §4.5: temperature > 40°C or
    /// battery_mv < 3000).
    fn on_advisory(&mut self, src: Address, advisory: Advisory) {
        let _ = (src, advisory);
    }
    /// A `REQUIRE_ACK` submission's retries were exhausted without an ACK.
    fn on_delivery_failed(&mut self, packet_id: u32) {
        let _ = packet_id;
    }
    fn on_egress_error(&mut self, packet_id: u32, error: EgressError) {
        let _ = (packet_id, error);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advisory {
    HighTemperature,
    LowBattery,
}
