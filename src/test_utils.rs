//! Test utilities shared by unit tests, integration tests and benchmarks
//!
//! Builders for synthetic 802.11 frames and capture files, plus an in-memory
//! session harness with a manual clock and an event recorder.

#![cfg(any(test, feature = "benchmark"))]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::clock::ManualClock;
use crate::config::CaptureConfig;
use crate::pcap::{ByteOrder, GlobalHeader, write_record};
use crate::reporter::StatusReporter;
use crate::session::CaptureSession;
use crate::storage::MemoryStorage;
use crate::types::{CapturedFrame, StatusEvent, Timestamp};

/// Wall time the harness clock starts at: 2024-01-01T00:00:00Z.
pub const HARNESS_EPOCH_SECS: u64 = 1_704_067_200;

/// Reporter that keeps every event for later assertions.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<StatusEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Events matching `predicate`, in emission order.
    pub fn count(&self, predicate: impl Fn(&StatusEvent) -> bool) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).iter().filter(|e| predicate(e)).count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl StatusReporter for EventLog {
    fn report(&self, event: &StatusEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event.clone());
    }
}

/// Beacon-like management frame of exactly `len` bytes whose body encodes `seq`.
pub fn synthetic_frame(seq: u32, len: usize) -> Vec<u8> {
    let mut frame = Vec::with_capacity(len);
    // Frame control: management, beacon subtype.
    frame.extend_from_slice(&[0x80, 0x00]);
    frame.extend_from_slice(&seq.to_le_bytes());
    frame.extend((0..len.saturating_sub(frame.len())).map(|i| (i as u32).wrapping_add(seq) as u8));
    frame.truncate(len);
    frame
}

/// Complete capture image holding `frames`, each stamped one millisecond apart.
pub fn capture_bytes(order: ByteOrder, start: Timestamp, frames: &[Vec<u8>]) -> Vec<u8> {
    let mut data = GlobalHeader::new(crate::pcap::DEFAULT_SNAPLEN, order).encode();
    for (i, payload) in frames.iter().enumerate() {
        let offset = i as u32 * 1_000;
        let ts = Timestamp::new(start.seconds(), start.micros() + offset);
        write_record(&mut data, &CapturedFrame::new(ts, payload), order);
    }
    data
}

/// Write a capture file under `dir` and return its path.
pub fn write_capture_file(dir: &Path, name: &str, frames: &[Vec<u8>]) -> std::io::Result<PathBuf> {
    let path = dir.join(name);
    let start = Timestamp::new(HARNESS_EPOCH_SECS as u32, 0);
    std::fs::write(&path, capture_bytes(ByteOrder::Little, start, frames))?;
    Ok(path)
}

/// Session over in-memory storage with handles for driving and observing it.
pub struct SessionHarness {
    pub session: Arc<CaptureSession<MemoryStorage>>,
    pub storage: MemoryStorage,
    pub clock: Arc<ManualClock>,
    pub events: Arc<EventLog>,
}

impl SessionHarness {
    pub fn new(config: &CaptureConfig) -> Self {
        Self::with_storage(config, MemoryStorage::new())
    }

    pub fn with_storage(config: &CaptureConfig, storage: MemoryStorage) -> Self {
        let clock = Arc::new(ManualClock::new(Duration::from_secs(HARNESS_EPOCH_SECS)));
        let events = Arc::new(EventLog::new());
        let session =
            Arc::new(CaptureSession::new(config, storage.clone(), clock.clone(), events.clone()));
        Self { session, storage, clock, events }
    }

    /// Run `n` ticks, advancing the clock one second before each.
    pub fn ticks(&self, n: u32) {
        for _ in 0..n {
            self.clock.advance(Duration::from_secs(1));
            self.session.on_tick();
        }
    }
}
