//! Error kinds for the mesh engine.
//!
//! Per spec §7 these are enumerated and counted, not propagated as
//! exceptions: [`IngressDrop`] never reaches an external caller (it only
//! drives a [`crate::counters::Counters`] increment and a debug-level trace
//! event), while [`EgressError`] is returned synchronously from
//! [`crate::engine::Engine::submit`] and [`FatalError`] is returned only from
//! engine construction.

use crate::codec::WireError;

/// Reasons an inbound frame never reaches a local handler or gets forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IngressDrop {
    #[error("frame could not be decoded: {0}")]
    MalformedFrame(#[from] WireError),
    #[error("header failed validation (network id, version, ttl, or src)")]
    InvalidHeader,
    #[error("duplicate (src, packet_id) seen within the dedup window")]
    Duplicate,
    #[error("AEAD authentication failed")]
    AuthFailure,
    #[error("packet is bound to an unknown session id")]
    UnknownSession,
    #[error("ttl reached zero before a destination hop")]
    TtlExhausted,
    #[error("no route to destination")]
    NoRoute,
    #[error("routing table is at capacity")]
    TableFull,
    #[error("link reported back-pressure")]
    LinkBusy,
}

/// Errors `submit` can return synchronously, plus the asynchronous
/// `DeliveryFailed` surfaced later via [`crate::collaborators::Sinks::on_delivery_failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EgressError {
    #[error("payload of {0} bytes exceeds the {1}-byte maximum")]
    PayloadTooLarge(usize, usize),
    #[error("no route to destination")]
    NoRoute,
    #[error("link reported back-pressure")]
    LinkBusy,
    #[error("no ACK received for packet {0:?} after retries were exhausted")]
    DeliveryFailed(u32),
}

/// Conditions that refuse engine startup outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FatalError {
    #[error("could not obtain randomness at initialisation")]
    RandomUnavailable,
    #[error("persisted routing state is corrupt or exceeds capacity")]
    PersistedStateCorrupt,
}
