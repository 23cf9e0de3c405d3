use std::fmt;
use std::sync::Mutex;

use time::{Duration, OffsetDateTime};

/// Source of the current time for token issuance and expiry checks
pub trait Clock: fmt::Debug + Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct FixedClock(Mutex<OffsetDateTime>);

impl FixedClock {
    pub fn new(now: OffsetDateTime) -> Self {
        Self(Mutex::new(now))
    }

    pub fn set(&self, now: OffsetDateTime) {
        *self.0.lock().expect("Locking failed") = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().expect("Locking failed") += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        *self.0.lock().expect("Locking failed")
    }
}
