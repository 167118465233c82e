//! In-memory collaborator implementations used by this crate's own unit and
//! integration tests. Never compiled into a release build.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::address::Address;
use crate::codec::{EmergencyEvent, SensorData};
use crate::collaborators::{Advisory, Clock, KeyStore, Link, LinkResult, RandomSource, Sinks};

/// A frame captured off a [`TestLink`], tagged with the next hop it was
/// addressed to so a test can assert who received what.
#[derive(Debug, Clone)]
pub struct SentFrame {
    pub next_hop: Address,
    pub bytes: Vec<u8>,
}

/// A link that records every frame instead of transmitting it, with an
/// optional queue of canned results to simulate back-pressure.
#[derive(Default)]
pub struct TestLink {
    pub sent: Rc<RefCell<Vec<SentFrame>>>,
    pub results: VecDeque<LinkResult>,
}

impl TestLink {
    pub fn new() -> Self {
        TestLink { sent: Rc::new(RefCell::new(Vec::new())), results: VecDeque::new() }
    }

    pub fn sent_log(&self) -> Rc<RefCell<Vec<SentFrame>>> {
        self.sent.clone()
    }

    pub fn push_result(&mut self, result: LinkResult) {
        self.results.push_back(result);
    }
}

impl Link for TestLink {
    fn send(&mut self, next_hop: Address, frame: &[u8]) -> LinkResult {
        let result = self.results.pop_front().unwrap_or(LinkResult::Ok);
        self.sent.borrow_mut().push(SentFrame { next_hop, bytes: frame.to_vec() });
        result
    }
}

/// A clock driven entirely by test code.
#[derive(Default, Clone, Copy)]
pub struct TestClock {
    pub now_ms: u32,
}

impl Clock for TestClock {
    fn now_ms(&self) -> u32 {
        self.now_ms
    }
}

/// Deterministic "randomness" — a fixed byte pattern, never an all-zero
/// packet-id seed, so tests that care about restart-safety still exercise
/// a non-trivial starting value.
pub struct FixedRandom {
    pub fill_byte: u8,
}

impl Default for FixedRandom {
    fn default() -> Self {
        FixedRandom { fill_byte: 0x42 }
    }
}

impl RandomSource for FixedRandom {
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), crate::error::FatalError> {
        buf.fill(self.fill_byte);
        Ok(())
    }
}

/// A fixed master key and session, handed out verbatim.
pub struct StaticKeyStore {
    pub master_key: [u8; 32],
    pub session_id: u32,
    pub session_key: [u8; 32],
}

impl StaticKeyStore {
    pub fn new(master_key: [u8; 32], session_id: u32) -> Self {
        let session_key = crate::keys::derive_session_key(&master_key, session_id);
        StaticKeyStore { master_key, session_id, session_key: *session_key }
    }
}

impl KeyStore for StaticKeyStore {
    fn master_key(&self) -> [u8; 32] {
        self.master_key
    }

    fn current_session(&self) -> (u32, [u8; 32]) {
        (self.session_id, self.session_key)
    }
}

/// Captures every sink callback for later assertion. Backed by an `Rc<RefCell<_>>`,
/// the same way [`TestLink`] shares its sent-frame log: grab a [`RecordingSinks::handle`]
/// before moving the sink into an `Engine` (which takes it by value), and
/// inspect the handle afterward — this is what lets an integration test in
/// `tests/` observe sink activity on an `Engine` it otherwise only drives
/// through its public `ingest`/`submit`/`tick` API.
#[derive(Default)]
pub struct RecordingSinks {
    inner: Rc<RefCell<RecordingSinksInner>>,
}

#[derive(Default)]
struct RecordingSinksInner {
    sensor: Vec<(Address, SensorData)>,
    commands: Vec<(Address, u8, Vec<u8>)>,
    events: Vec<(Address, EmergencyEvent)>,
    advisories: Vec<(Address, Advisory)>,
    delivery_failed: Vec<u32>,
}

/// A cloneable view onto a [`RecordingSinks`]'s captured callbacks.
#[derive(Clone, Default)]
pub struct RecordingSinksHandle(Rc<RefCell<RecordingSinksInner>>);

impl RecordingSinks {
    pub fn new() -> Self {
        RecordingSinks::default()
    }

    pub fn handle(&self) -> RecordingSinksHandle {
        RecordingSinksHandle(self.inner.clone())
    }
}

impl RecordingSinksHandle {
    pub fn sensor(&self) -> Vec<(Address, SensorData)> {
        self.0.borrow().sensor.clone()
    }

    pub fn commands(&self) -> Vec<(Address, u8, Vec<u8>)> {
        self.0.borrow().commands.clone()
    }

    pub fn events(&self) -> Vec<(Address, EmergencyEvent)> {
        self.0.borrow().events.clone()
    }

    pub fn advisories(&self) -> Vec<(Address, Advisory)> {
        self.0.borrow().advisories.clone()
    }

    pub fn delivery_failed(&self) -> Vec<u32> {
        self.0.borrow().delivery_failed.clone()
    }
}

impl Sinks for RecordingSinks {
    fn on_sensor(&mut self, src: Address, data: SensorData) {
        self.inner.borrow_mut().sensor.push((src, data));
    }

    fn on_command(&mut self, src: Address, msg_type: u8, bytes: &[u8]) {
        self.inner.borrow_mut().commands.push((src, msg_type, bytes.to_vec()));
    }

    fn on_event(&mut self, src: Address, event: EmergencyEvent) {
        self.inner.borrow_mut().events.push((src, event));
    }

    fn on_advisory(&mut self, src: Address, advisory: Advisory) {
        self.inner.borrow_mut().advisories.push((src, advisory));
    }

    fn on_delivery_failed(&mut self, packet_id: u32) {
        self.inner.borrow_mut().delivery_failed.push(packet_id);
    }
}
