//! Clock synchronization against the authoritative server time
//!
//! The server embeds its current time in every snapshot it emits. From one
//! snapshot the client computes `offset = server_time - local_time_at_receipt`
//! and from then on estimates server time as `local_time + offset`. There is
//! no round-trip latency compensation: the offset is off by the one-way
//! delivery delay, which is an accepted simplification. The offset is also
//! computed once, at the initial snapshot, and never refreshed, so very
//! long-lived sessions will drift with the local clock.

use shared::now_ms;

/// A fixed offset between the local clock and the server clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerClock {
    offset_ms: i64,
}

impl ServerClock {
    /// Derives the offset from a snapshot's server time and the local time
    /// at which it was received.
    pub fn from_snapshot(server_time_ms: u64, local_receipt_ms: u64) -> Self {
        Self {
            offset_ms: server_time_ms as i64 - local_receipt_ms as i64,
        }
    }

    /// Convenience constructor using the local clock for the receipt time.
    pub fn sync(server_time_ms: u64) -> Self {
        Self::from_snapshot(server_time_ms, now_ms())
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms
    }

    /// Estimated server time for a given local time.
    pub fn estimate(&self, local_now_ms: u64) -> u64 {
        (local_now_ms as i64 + self.offset_ms).max(0) as u64
    }

    /// Estimated server time right now.
    pub fn now(&self) -> u64 {
        self.estimate(now_ms())
    }

    /// Milliseconds until a server deadline, saturating at zero.
    pub fn remaining_ms(&self, deadline_ms: u64) -> u64 {
        deadline_ms.saturating_sub(self.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_sign_follows_clock_skew() {
        // Server ahead of local clock
        let ahead = ServerClock::from_snapshot(10_000, 9_000);
        assert_eq!(ahead.offset_ms(), 1000);

        // Server behind local clock
        let behind = ServerClock::from_snapshot(9_000, 10_000);
        assert_eq!(behind.offset_ms(), -1000);

        // In agreement
        let same = ServerClock::from_snapshot(5_000, 5_000);
        assert_eq!(same.offset_ms(), 0);
    }

    #[test]
    fn test_estimate_applies_offset() {
        let clock = ServerClock::from_snapshot(10_000, 9_000);
        assert_eq!(clock.estimate(9_500), 10_500);

        let clock = ServerClock::from_snapshot(9_000, 10_000);
        assert_eq!(clock.estimate(10_500), 9_500);
    }

    #[test]
    fn test_sync_against_local_clock_within_tolerance() {
        // Pretend the server clock runs two seconds ahead of ours
        let server_time = now_ms() + 2_000;
        let clock = ServerClock::sync(server_time);

        // Test tolerance covers the (here negligible) one-way latency error
        let error = (clock.offset_ms() - 2_000).abs();
        assert!(error < 100, "offset error {}ms too large", error);

        let estimated = clock.now();
        let expected = now_ms() + 2_000;
        assert!(estimated.abs_diff(expected) < 100);
    }

    #[test]
    fn test_remaining_saturates_at_zero() {
        let clock = ServerClock::from_snapshot(now_ms(), now_ms());

        let future = now_ms() + 60_000;
        let remaining = clock.remaining_ms(future);
        assert!((59_000..=60_000).contains(&remaining));

        let past = now_ms().saturating_sub(60_000);
        assert_eq!(clock.remaining_ms(past), 0);
    }
}
