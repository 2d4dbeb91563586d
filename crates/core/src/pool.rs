//! Pool keys: non-overlapping 12-hour windows identified by `(day, period)`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

pub const SECONDS_PER_DAY: u64 = 86_400;
pub const PERIOD_SECONDS: u64 = 43_200;
/// Grace after a period ends before its pool may be processed.
pub const READY_DELAY_SECS: u64 = 1_800;
/// Largest day whose ready time still fits in a `u64` timestamp.
pub const MAX_DAY: u64 = (u64::MAX - SECONDS_PER_DAY - READY_DELAY_SECS) / SECONDS_PER_DAY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolKey {
    pub day: u64,
    pub period: u8,
}

impl PoolKey {
    pub fn new(day: u64, period: u8) -> Result<Self, CoreError> {
        if period > 1 {
            return Err(CoreError::InvalidPeriod(period));
        }
        if day > MAX_DAY {
            return Err(CoreError::InvalidPoolKey(format!("day {day} is out of range")));
        }
        Ok(Self { day, period })
    }

    /// The pool whose window contains `timestamp`.
    pub fn from_timestamp(timestamp: u64) -> Self {
        Self {
            day: timestamp / SECONDS_PER_DAY,
            period: ((timestamp % SECONDS_PER_DAY) / PERIOD_SECONDS) as u8,
        }
    }

    // Saturating: keys built through `new` never reach the bound, but
    // deserialized or timestamp-derived ones may.
    pub fn start(&self) -> u64 {
        self.day
            .saturating_mul(SECONDS_PER_DAY)
            .saturating_add(self.period as u64 * PERIOD_SECONDS)
    }

    pub fn end(&self) -> u64 {
        self.start().saturating_add(PERIOD_SECONDS)
    }

    pub fn ready_time(&self) -> u64 {
        self.end().saturating_add(READY_DELAY_SECS)
    }

    /// Seconds left before the pool may be processed, `None` once ready.
    pub fn seconds_until_ready(&self, now: u64) -> Option<u64> {
        let ready = self.ready_time();
        (now < ready).then(|| ready - now)
    }

    /// The most recent pool whose ready time has passed at `now`.
    pub fn latest_ready(now: u64) -> Option<Self> {
        now.checked_sub(PERIOD_SECONDS + READY_DELAY_SECS)
            .map(Self::from_timestamp)
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.day, self.period)
    }
}

impl FromStr for PoolKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (day, period) = s
            .split_once(':')
            .ok_or_else(|| CoreError::InvalidPoolKey(s.to_string()))?;
        let day = day
            .trim()
            .parse::<u64>()
            .map_err(|_| CoreError::InvalidPoolKey(s.to_string()))?;
        let period = period
            .trim()
            .parse::<u8>()
            .map_err(|_| CoreError::InvalidPoolKey(s.to_string()))?;
        Self::new(day, period)
    }
}
