//! Per-test attempt accounting with an exponential backoff policy.
//!
//! Every permitted attempt increments a persisted counter and stamps the
//! attempt time. The next attempt must wait `schedule[min(attempts, len - 1)]`
//! after the previous permitted one. Rejected attempts are free: they change
//! neither the counter nor the timestamp. All state lives in the store, so the
//! policy carries over between invocations. The limiter never sleeps.

use std::cell::Cell;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::GradeError;
use crate::storage::SharedStore;

const ATTEMPTS_FIELD: &str = "attempts";
const LAST_ATTEMPT_FIELD: &str = "last_attempt";

/// Default cooldowns, in seconds, indexed by the number of attempts so far.
pub const DEFAULT_BACKOFF_SECS: [u64; 8] = [0, 0, 0, 30, 60, 120, 300, 600];

// ============================================================================
// CLOCK - injectable time source
// ============================================================================

pub trait Clock {
    fn now(&self) -> SystemTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<SystemTime>,
}

impl ManualClock {
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(UNIX_EPOCH + Duration::from_secs(1_000_000_000))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        self.now.get()
    }
}

// ============================================================================
// BACKOFF SCHEDULE
// ============================================================================

/// A non-empty, non-decreasing list of cooldowns; the last entry repeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    schedule: Vec<Duration>,
}

impl Backoff {
    pub fn new(schedule: Vec<Duration>) -> Result<Self, GradeError> {
        if schedule.is_empty() {
            return Err(GradeError::InvalidBackoff {
                reason: "schedule must have at least one entry".into(),
            });
        }
        if let Some(pos) = schedule.windows(2).position(|w| w[1] < w[0]) {
            return Err(GradeError::InvalidBackoff {
                reason: format!(
                    "entry {} ({:?}) is shorter than entry {} ({:?})",
                    pos + 1,
                    schedule[pos + 1],
                    pos,
                    schedule[pos]
                ),
            });
        }
        Ok(Self { schedule })
    }

    pub fn from_secs(secs: &[u64]) -> Result<Self, GradeError> {
        Self::new(secs.iter().map(|s| Duration::from_secs(*s)).collect())
    }

    /// Required wait after `attempts` permitted attempts.
    pub fn cooldown(&self, attempts: u64) -> Duration {
        let last = self.schedule.len() - 1;
        let index = usize::try_from(attempts).map_or(last, |a| a.min(last));
        self.schedule[index]
    }

    pub fn schedule(&self) -> &[Duration] {
        &self.schedule
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            schedule: DEFAULT_BACKOFF_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        }
    }
}

// ============================================================================
// ATTEMPT RECORDS
// ============================================================================

/// Persisted attempt history of one test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub attempts: u64,
    /// Milliseconds since the Unix epoch of the last permitted attempt.
    pub last_attempt_ms: u64,
}

impl AttemptRecord {
    pub fn last_attempt(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.last_attempt_ms)
    }

    /// Time left before another attempt is permitted.
    pub fn cooldown_remaining(&self, backoff: &Backoff, now: SystemTime) -> Duration {
        let elapsed = now
            .duration_since(self.last_attempt())
            .unwrap_or(Duration::ZERO);
        backoff.cooldown(self.attempts).saturating_sub(elapsed)
    }
}

/// Rounds up so the stored anchor is never earlier than the real attempt.
fn millis_since_epoch(time: SystemTime) -> u64 {
    let since = time.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
    u64::try_from(since.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

// ============================================================================
// RATE LIMITER
// ============================================================================

pub struct RateLimiter {
    backoff: Backoff,
    store: SharedStore,
}

impl RateLimiter {
    pub fn new(backoff: Backoff, store: SharedStore) -> Self {
        Self { backoff, store }
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Current record for `test_name`, defaulting to no attempts at the epoch.
    pub fn record(&self, test_name: &str) -> AttemptRecord {
        let store = self.store.borrow();
        AttemptRecord {
            attempts: store.get(test_name, ATTEMPTS_FIELD, 0u64),
            last_attempt_ms: store.get(test_name, LAST_ATTEMPT_FIELD, 0u64),
        }
    }

    /// Admits or rejects an attempt at `test_name` made at `now`.
    ///
    /// On admission the incremented record is persisted and returned. On
    /// rejection nothing is written.
    pub fn guard(&self, test_name: &str, now: SystemTime) -> Result<AttemptRecord, GradeError> {
        let record = self.record(test_name);
        let remaining = record.cooldown_remaining(&self.backoff, now);
        if !remaining.is_zero() {
            debug!(
                test = test_name,
                attempts = record.attempts,
                remaining_ms = remaining.as_millis() as u64,
                "attempt rejected"
            );
            return Err(GradeError::RateLimited {
                test: test_name.to_string(),
                remaining,
                attempts: record.attempts,
            });
        }

        let admitted = AttemptRecord {
            attempts: record.attempts + 1,
            last_attempt_ms: millis_since_epoch(now),
        };
        let mut store = self.store.borrow_mut();
        for (field, value) in [
            (LAST_ATTEMPT_FIELD, admitted.last_attempt_ms),
            (ATTEMPTS_FIELD, admitted.attempts),
        ] {
            if let Err(e) = store.store(test_name, field, value) {
                warn!(test = test_name, field, error = %e, "could not persist attempt");
            }
        }
        info!(test = test_name, attempts = admitted.attempts, "attempt admitted");
        Ok(admitted)
    }

    /// Forgets the attempt history of `test_name`.
    pub fn reset(&self, test_name: &str) -> Result<(), GradeError> {
        let mut store = self.store.borrow_mut();
        store.remove(test_name, ATTEMPTS_FIELD)?;
        store.remove(test_name, LAST_ATTEMPT_FIELD)?;
        Ok(())
    }
}
