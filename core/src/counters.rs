//! Structured drop/accept counters, exposed via `Engine::counters()`.
//!
//! Mirrors the teacher's `Metrics` struct (`AtomicU64` per counted event,
//! `Ordering::Relaxed` throughout since these are statistics, not
//! synchronization points) but counts mesh-specific events instead of HTTP
//! ingestion outcomes.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{EgressError, IngressDrop};

#[derive(Default)]
pub struct Counters {
    pub rx: AtomicU64,
    pub tx: AtomicU64,
    pub malformed_frame: AtomicU64,
    pub invalid_header: AtomicU64,
    pub duplicate: AtomicU64,
    pub auth_failure: AtomicU64,
    pub unknown_session: AtomicU64,
    pub ttl_exhausted: AtomicU64,
    pub no_route: AtomicU64,
    pub table_full: AtomicU64,
    pub link_busy: AtomicU64,
    pub payload_too_large: AtomicU64,
    pub delivery_failed: AtomicU64,
    pub delivered_local: AtomicU64,
    pub forwarded: AtomicU64,
}

/// A point-in-time, plain-data copy of [`Counters`] for reporting — the
/// admin collaborator's JSON view serializes this, not the live atomics.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct CountersSnapshot {
    pub rx: u64,
    pub tx: u64,
    pub malformed_frame: u64,
    pub invalid_header: u64,
    pub duplicate: u64,
    pub auth_failure: u64,
    pub unknown_session: u64,
    pub ttl_exhausted: u64,
    pub no_route: u64,
    pub table_full: u64,
    pub link_busy: u64,
    pub payload_too_large: u64,
    pub delivery_failed: u64,
    pub delivered_local: u64,
    pub forwarded: u64,
}

impl Counters {
    pub fn record_drop(&self, kind: IngressDrop) {
        let field = match kind {
            IngressDrop::MalformedFrame(_) => &self.malformed_frame,
            IngressDrop::InvalidHeader => &self.invalid_header,
            IngressDrop::Duplicate => &self.duplicate,
            IngressDrop::AuthFailure => &self.auth_failure,
            IngressDrop::UnknownSession => &self.unknown_session,
            IngressDrop::TtlExhausted => &self.ttl_exhausted,
            IngressDrop::NoRoute => &self.no_route,
            IngressDrop::TableFull => &self.table_full,
            IngressDrop::LinkBusy => &self.link_busy,
        };
        field.fetch_add(1, Ordering::Relaxed);
        // Authentication failures are silent per spec §7: no data derived
        // from the offending frame is logged, only the counter increments.
        if !matches!(kind, IngressDrop::AuthFailure) {
            tracing::debug!(%kind, "ingress_drop");
        }
    }

    /// Mirrors `record_drop` for the egress side: every `EgressError` variant
    /// `submit` can return (synchronously or, for `DeliveryFailed`, via the
    /// ACK-waiter timeout) increments its counter the same way.
    pub fn record_egress_error(&self, kind: EgressError) {
        let field = match kind {
            EgressError::PayloadTooLarge(..) => &self.payload_too_large,
            EgressError::NoRoute => &self.no_route,
            EgressError::LinkBusy => &self.link_busy,
            EgressError::DeliveryFailed(_) => &self.delivery_failed,
        };
        field.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(%kind, "egress_error");
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            rx: self.rx.load(Ordering::Relaxed),
            tx: self.tx.load(Ordering::Relaxed),
            malformed_frame: self.malformed_frame.load(Ordering::Relaxed),
            invalid_header: self.invalid_header.load(Ordering::Relaxed),
            duplicate: self.duplicate.load(Ordering::Relaxed),
            auth_failure: self.auth_failure.load(Ordering::Relaxed),
            unknown_session: self.unknown_session.load(Ordering::Relaxed),
            ttl_exhausted: self.ttl_exhausted.load(Ordering::Relaxed),
            no_route: self.no_route.load(Ordering::Relaxed),
            table_full: self.table_full.load(Ordering::Relaxed),
            link_busy: self.link_busy.load(Ordering::Relaxed),
            payload_too_large: self.payload_too_large.load(Ordering::Relaxed),
            delivery_failed: self.delivery_failed.load(Ordering::Relaxed),
            delivered_local: self.delivered_local.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
        }
    }
}
