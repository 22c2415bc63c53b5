//! Deterministic time for record timestamps

use bnet_core::TimeSource;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;

/// Clock that moves forward by a fixed step on every reading
#[derive(Debug)]
pub struct SteppingClock {
    current: Mutex<DateTime<Utc>>,
    step: Duration,
}

impl SteppingClock {
    /// Clock starting at `start`, advancing `step` per reading
    pub fn new(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            current: Mutex::new(start),
            step,
        }
    }

    /// Move the clock forward without reading it
    pub fn advance(&self, by: Duration) {
        *self.current.lock() += by;
    }

    /// Next value `now` will return
    pub fn peek(&self) -> DateTime<Utc> {
        *self.current.lock()
    }
}

impl Default for SteppingClock {
    fn default() -> Self {
        Self::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap(), Duration::seconds(1))
    }
}

impl TimeSource for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let mut current = self.current.lock();
        let now = *current;
        *current = now + self.step;
        now
    }
}
