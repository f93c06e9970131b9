//! Heartbeat liveness monitor (§4.6). Three increment sources (sync send error, TPORT_ERR
//! observed during poll, explicit `record_failure`) feed one counter; two sources
//! (`record_success`, a successful heartbeat send) clear it. Modeled as an explicit small state
//! machine rather than flags scattered across the client.

use std::time::Duration;

/// Tracks the periodic-TesterPresent timer and the consecutive-failure counter that fires the
/// disconnect callback.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    interval: Duration,
    elapsed: Duration,
    fail_count: u32,
    fail_threshold: u32,
}

impl HeartbeatMonitor {
    /// Builds a monitor with the given interval and consecutive-failure threshold.
    pub fn new(interval: Duration, fail_threshold: u32) -> Self {
        Self {
            interval,
            elapsed: Duration::ZERO,
            fail_count: 0,
            fail_threshold,
        }
    }

    /// Advances the interval timer by `dt`. Returns `true` once the interval has elapsed;
    /// the timer is NOT reset here — callers must call [`Self::reset`] themselves, and only
    /// once a heartbeat attempt actually happens (not when skipped because the client was
    /// busy), so a skipped heartbeat fires again on the very next tick instead of waiting out
    /// a full interval.
    pub fn tick(&mut self, dt: Duration) -> bool {
        self.elapsed += dt;
        self.elapsed >= self.interval
    }

    /// Resets the interval timer; call after an actual heartbeat send attempt.
    pub fn reset(&mut self) {
        self.elapsed = Duration::ZERO;
    }

    /// Records a failed heartbeat attempt (sync send error or a TPORT_ERR observed in `poll`).
    /// Returns `true` once the threshold is reached (caller should fire the disconnect callback).
    pub fn record_failure(&mut self) -> bool {
        self.fail_count += 1;
        self.fail_count >= self.fail_threshold
    }

    /// Clears the failure counter — called on any successfully received response, not just a
    /// heartbeat reply.
    pub fn record_success(&mut self) {
        self.fail_count = 0;
    }

    /// Current consecutive-failure count, for diagnostics/tests.
    pub fn fail_count(&self) -> u32 {
        self.fail_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_per_interval_after_reset() {
        let mut hb = HeartbeatMonitor::new(Duration::from_millis(2000), 3);
        assert!(!hb.tick(Duration::from_millis(1000)));
        assert!(hb.tick(Duration::from_millis(1000)));
        hb.reset();
        assert!(!hb.tick(Duration::from_millis(500)));
    }

    #[test]
    fn stays_due_until_reset() {
        let mut hb = HeartbeatMonitor::new(Duration::from_millis(2000), 3);
        assert!(hb.tick(Duration::from_millis(2500)));
        // Still due next tick: a skipped (busy) heartbeat must fire again immediately,
        // not wait out a fresh full interval.
        assert!(hb.tick(Duration::from_millis(1)));
        hb.reset();
        assert!(!hb.tick(Duration::from_millis(1)));
    }

    #[test]
    fn threshold_and_reset() {
        let mut hb = HeartbeatMonitor::new(Duration::from_millis(2000), 3);
        assert!(!hb.record_failure());
        assert!(!hb.record_failure());
        assert!(hb.record_failure());
        hb.record_success();
        assert_eq!(hb.fail_count(), 0);
    }
}
