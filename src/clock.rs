//! Time sources
//!
//! The pipeline needs two readings: wall-clock time for record timestamps
//! and a monotonic millisecond counter for the hop schedule. Acquiring the
//! wall clock (NTP, RTC) happens outside this crate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::types::Timestamp;

/// Source of wall-clock and monotonic time.
pub trait Clock: Send + Sync + 'static {
    /// Current wall-clock time, used to stamp captured frames.
    fn wall_time(&self) -> Timestamp;

    /// Milliseconds since an arbitrary fixed point; never goes backwards.
    fn monotonic_millis(&self) -> u64;
}

/// Clock backed by the operating system.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn wall_time(&self) -> Timestamp {
        // A wall clock set before 1970 means time was never acquired; stamp as epoch.
        let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Timestamp::from_unix_duration(since_epoch)
    }

    fn monotonic_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Simulated clock that only moves when told to.
///
/// Wall and monotonic time advance together; the wall clock starts at the
/// given epoch offset and the monotonic counter at zero.
#[derive(Debug)]
pub struct ManualClock {
    wall_micros: AtomicU64,
    mono_micros: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Duration) -> Self {
        Self {
            wall_micros: AtomicU64::new(start.as_micros() as u64),
            mono_micros: AtomicU64::new(0),
        }
    }

    /// Move both clocks forward.
    pub fn advance(&self, by: Duration) {
        let micros = by.as_micros() as u64;
        self.wall_micros.fetch_add(micros, Ordering::SeqCst);
        self.mono_micros.fetch_add(micros, Ordering::SeqCst);
    }

    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }
}

impl Clock for ManualClock {
    fn wall_time(&self) -> Timestamp {
        Timestamp::from_unix_duration(Duration::from_micros(
            self.wall_micros.load(Ordering::SeqCst),
        ))
    }

    fn monotonic_millis(&self) -> u64 {
        self.mono_micros.load(Ordering::SeqCst) / 1000
    }
}
