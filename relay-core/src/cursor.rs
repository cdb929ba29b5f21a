//! Scan cursor for the change poller.
//!
//! The cursor is a single timestamp (milliseconds since the epoch, the store's
//! native unit) marking the last time the poller scanned. Records strictly
//! newer than it are "new". It only ever moves forward.

/// Monotonic "last scanned at" timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PollCursor {
    last_scan_ms: i64,
}

impl PollCursor {
    /// Create a cursor positioned at `at_ms`.
    pub fn new(at_ms: i64) -> Self {
        Self { last_scan_ms: at_ms }
    }

    /// The current cursor value in milliseconds.
    pub fn value(&self) -> i64 {
        self.last_scan_ms
    }

    /// Whether a record stamped `date_ms` is new relative to this cursor.
    ///
    /// Strict comparison: a record stamped exactly at the cursor was visible
    /// to the scan that produced it.
    pub fn is_newer(&self, date_ms: i64) -> bool {
        date_ms > self.last_scan_ms
    }

    /// Move the cursor to `to_ms` if that is later.
    ///
    /// Returns whether the cursor moved. A clock that steps backwards never
    /// rewinds the cursor.
    pub fn advance(&mut self, to_ms: i64) -> bool {
        if to_ms > self.last_scan_ms {
            self.last_scan_ms = to_ms;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_cursor_holds_value() {
        let cursor = PollCursor::new(1_000);
        assert_eq!(cursor.value(), 1_000);
    }

    #[test]
    fn newer_is_strict() {
        let cursor = PollCursor::new(1_000);
        assert!(!cursor.is_newer(999));
        assert!(!cursor.is_newer(1_000));
        assert!(cursor.is_newer(1_001));
    }

    #[test]
    fn advance_moves_forward() {
        let mut cursor = PollCursor::new(1_000);
        assert!(cursor.advance(6_000));
        assert_eq!(cursor.value(), 6_000);
    }

    #[test]
    fn advance_never_rewinds() {
        let mut cursor = PollCursor::new(5_000);
        assert!(!cursor.advance(4_000));
        assert!(!cursor.advance(5_000));
        assert_eq!(cursor.value(), 5_000);
    }

    #[test]
    fn record_seen_by_one_tick_is_not_new_for_the_next() {
        let mut cursor = PollCursor::new(0);
        let record_date = 2_500;

        assert!(cursor.is_newer(record_date));
        cursor.advance(3_000);
        assert!(!cursor.is_newer(record_date));
    }
}
