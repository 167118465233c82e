//! `meshstatic-core` — the MeshStatic mesh protocol engine.
//!
//! A multi-hop wireless mesh for small embedded nodes exchanging short,
//! authenticated datagrams over a broadcast-capable link layer. This crate
//! is the protocol engine only: the 210-byte wire codec, a ChaCha20-Poly1305
//! AEAD layer composed by hand per RFC 8439, a rotating session-key
//! schedule, a bounded routing table, a duplicate suppressor, and the
//! single-threaded [`engine::Engine`] state machine that ties them together.
//!
//! The link driver, sensor sampling loop, HTTP admin surface, persisted
//! configuration storage, and OTA firmware update are external collaborators
//! — see [`collaborators`] for the trait boundaries this crate consumes
//! instead of depending on any of them directly.
//!
//! ```no_run
//! use meshstatic_core::prelude::*;
//!
//! # struct MyLink; impl Link for MyLink { fn send(&mut self, _: Address, _: &[u8]) -> LinkResult { LinkResult::Ok } }
//! # struct MyClock; impl Clock for MyClock { fn now_ms(&self) -> u32 { 0 } }
//! # struct MyRandom; impl RandomSource for MyRandom { fn fill(&mut self, buf: &mut [u8]) -> Result<(), FatalError> { buf.fill(0); Ok(()) } }
//! # struct MyKeys; impl KeyStore for MyKeys { fn master_key(&self) -> [u8;32] { [0;32] } fn current_session(&self) -> (u32,[u8;32]) { (0,[0;32]) } }
//! # #[derive(Default)] struct MySinks;
//! # impl Sinks for MySinks {
//! #     fn on_sensor(&mut self, _: Address, _: SensorData) {}
//! #     fn on_command(&mut self, _: Address, _: u8, _: &[u8]) {}
//! #     fn on_event(&mut self, _: Address, _: EmergencyEvent) {}
//! # }
//! let mut engine = Engine::new(
//!     EngineConfig::default(),
//!     Address::new([0x02, 0, 0, 0, 0, 0x01]),
//!     MyLink, MyClock, MyRandom, MyKeys, MySinks::default(),
//! ).expect("engine construction only fails on fatal collaborator errors");
//!
//! engine.tick(0);
//! ```

pub mod address;
pub mod aead;
pub mod codec;
pub mod collaborators;
pub mod config;
pub mod counters;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod keys;
pub mod persist;
pub mod routing;
pub mod timer;

#[cfg(any(test, feature = "test-util"))]
pub mod testkit;

pub use address::Address;
pub use codec::{EmergencyEvent, GroupCommand, MsgType, Packet, SensorData};
pub use collaborators::{Advisory, Clock, KeyStore, Link, LinkResult, RandomSource, Sinks};
pub use config::EngineConfig;
pub use counters::CountersSnapshot;
pub use engine::{Engine, IngestOutcome, PacketId};
pub use error::{EgressError, FatalError, IngressDrop};
pub use routing::{RoutingEntry, RoutingStatus};

/// Convenience re-export of the types most callers construct an [`Engine`] with.
pub mod prelude {
    pub use crate::address::Address;
    pub use crate::codec::{EmergencyEvent, GroupCommand, MsgType, SensorData};
    pub use crate::collaborators::{Advisory, Clock, KeyStore, Link, LinkResult, RandomSource, Sinks};
    pub use crate::config::EngineConfig;
    pub use crate::engine::{Engine, IngestOutcome, PacketId};
    pub use crate::error::{EgressError, FatalError, IngressDrop};
}
