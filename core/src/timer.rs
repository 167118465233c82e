//! Due-time bookkeeping for `Engine::tick`'s periodic duties (spec §4.6):
//! heartbeat, discovery, routing sweep, dedup purge, session-rotation check.
//! Each duty is a [`Schedule`] the engine checks and reschedules against the
//! host-supplied clock, rather than a spawned timer — the engine is driven
//! entirely by external calls (spec §5, §9).

/// A single periodic duty: fires once `now_ms` reaches `next_due_ms`, then
/// reschedules itself `interval_ms` forward. Wrap-around aware.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    next_due_ms: u32,
    interval_ms: u32,
}

impl Schedule {
    /// A schedule that fires immediately on the first `tick` call, then
    /// every `interval_ms` after that.
    pub fn due_immediately(interval_ms: u32) -> Self {
        Schedule { next_due_ms: 0, interval_ms }
    }

    pub fn is_due(&self, now_ms: u32) -> bool {
        now_ms.wrapping_sub(self.next_due_ms) < u32::MAX / 2
    }

    /// Advance `next_due_ms` to `now_ms + interval_ms`. Always relative to
    /// the firing time, not the previous due time, so a long stall (e.g. the
    /// host skipped several `tick` calls) doesn't cause a burst of
    /// immediately-due duties once it resumes.
    pub fn reschedule(&mut self, now_ms: u32) {
        self.next_due_ms = now_ms.wrapping_add(self.interval_ms);
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    pub fn set_interval_ms(&mut self, interval_ms: u32) {
        self.interval_ms = interval_ms;
    }
}
