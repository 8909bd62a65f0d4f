// ⏰ Clock - where "now" comes from
//
// Store timestamps are local wall-clock strings at second precision
// ("YYYY-MM-DD HH:MM:SS", no timezone). Every timestamp that reaches the
// store goes through format_timestamp / parse_timestamp below.

use crate::error::{ParkingError, Result};
use chrono::{Duration, Local, NaiveDateTime, Timelike};
use std::sync::Mutex;

/// Fixed on-disk timestamp format
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
        .map_err(|_| ParkingError::InvalidTimestamp(s.to_string()))
}

/// Drop sub-second precision so in-memory values match what the store holds
pub fn truncate_to_seconds(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_nanosecond(0).unwrap_or(ts)
}

// ============================================================================
// CLOCK SOURCES
// ============================================================================

pub trait Clock: Send + Sync {
    /// Current local time, truncated to whole seconds
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock of the machine running the lot
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        truncate_to_seconds(Local::now().naive_local())
    }
}

/// Clock that only moves when told to (tests, demo receipt)
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(truncate_to_seconds(start)),
        }
    }

    pub fn at(timestamp: &str) -> Result<Self> {
        Ok(Self::new(parse_timestamp(timestamp)?))
    }

    pub fn set(&self, ts: NaiveDateTime) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now = truncate_to_seconds(ts);
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
