//! Replay provider for capture files

use std::path::Path;
use tokio::time::Duration;
use tracing::{debug, info, trace};

use crate::pcap::PcapReader;
use crate::{CaptureError, Result};
use crate::provider::FrameProvider;
use crate::types::Timestamp;

/// Gaps longer than this are shortened so an idle stretch in a capture does not stall replay.
pub const DEFAULT_MAX_GAP: Duration = Duration::from_secs(2);

/// Replays a pcap file, spacing frames by their recorded timestamps
pub struct ReplayProvider {
    /// Capture file reader
    reader: PcapReader,

    /// Label for logs
    source: String,

    /// Playback speed multiplier (1.0 = recorded pace, 2.0 = double speed)
    speed: f64,

    /// Longest pause between two frames
    max_gap: Duration,

    /// Timestamp of the previously delivered record
    previous: Option<Timestamp>,
}

impl ReplayProvider {
    /// Create a new replay provider from a capture file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = path.as_ref().display().to_string();
        let reader = PcapReader::open(&path).map_err(|e| {
            CaptureError::provider_failed_with_source(format!("cannot replay {}", source), Box::new(e))
        })?;
        info!("Opened capture {}: {} records", source, reader.total_records());
        Ok(Self::from_reader(reader, source))
    }

    /// Replay an already opened reader
    pub fn from_reader(reader: PcapReader, source: impl Into<String>) -> Self {
        Self { reader, source: source.into(), speed: 1.0, max_gap: DEFAULT_MAX_GAP, previous: None }
    }

    /// Set playback speed. Non-finite values are ignored.
    pub fn set_speed(&mut self, speed: f64) {
        if !speed.is_finite() {
            debug!("Ignoring playback speed {}", speed);
            return;
        }
        self.speed = speed.clamp(0.1, 10.0);
        debug!("Playback speed set to {}x", self.speed);
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Cap the pause between consecutive frames
    pub fn set_max_gap(&mut self, max_gap: Duration) {
        self.max_gap = max_gap;
    }

    /// Restart from the first record
    pub fn rewind(&mut self) {
        self.reader.rewind();
        self.previous = None;
    }

    pub fn total_records(&self) -> usize {
        self.reader.total_records()
    }

    pub fn current_record(&self) -> usize {
        self.reader.current_record()
    }

    fn pause_before(&self, timestamp: Timestamp) -> Duration {
        let Some(previous) = self.previous else {
            return Duration::ZERO;
        };
        let gap = timestamp.saturating_duration_since(previous).min(self.max_gap);
        gap.div_f64(self.speed)
    }
}

#[async_trait::async_trait]
impl FrameProvider for ReplayProvider {
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(record) = self.reader.read_next_record()? else {
            debug!("Reached end of replay");
            return Ok(None);
        };

        let pause = self.pause_before(record.timestamp);
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        self.previous = Some(record.timestamp);

        trace!(
            "Record {}/{}: {} bytes",
            self.reader.current_record(),
            self.reader.total_records(),
            record.data.len()
        );

        Ok(Some(record.data))
    }

    fn source(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcap::ByteOrder;
    use crate::test_utils::{capture_bytes, synthetic_frame, write_capture_file};
    use std::error::Error;
    use tempfile::tempdir;

    fn provider(frames: usize) -> ReplayProvider {
        let frames: Vec<Vec<u8>> = (0..frames as u32).map(|n| synthetic_frame(n, 40)).collect();
        let data = capture_bytes(ByteOrder::Little, Timestamp::new(100, 0), &frames);
        let reader = PcapReader::from_bytes(data).expect("valid capture");
        ReplayProvider::from_reader(reader, "test.pcap")
    }

    #[tokio::test(start_paused = true)]
    async fn replays_every_record_in_order() {
        let mut provider = provider(3);
        let mut seen = Vec::new();
        while let Some(frame) = provider.next_frame().await.unwrap() {
            seen.push(frame);
        }
        assert_eq!(seen, (0..3).map(|n| synthetic_frame(n, 40)).collect::<Vec<_>>());
        assert_eq!(provider.current_record(), 3);

        provider.rewind();
        assert_eq!(provider.next_frame().await.unwrap(), Some(synthetic_frame(0, 40)));
    }

    #[tokio::test(start_paused = true)]
    async fn paces_by_recorded_gaps() {
        let mut provider = provider(3);
        let start = tokio::time::Instant::now();
        while provider.next_frame().await.unwrap().is_some() {}
        // Records are one millisecond apart.
        assert_eq!(start.elapsed(), Duration::from_millis(2));
    }

    #[tokio::test(start_paused = true)]
    async fn speed_scales_pacing() {
        let mut provider = provider(3);
        provider.set_speed(0.5);
        let start = tokio::time::Instant::now();
        while provider.next_frame().await.unwrap().is_some() {}
        assert_eq!(start.elapsed(), Duration::from_millis(4));
    }

    #[test]
    fn speed_is_clamped() {
        let mut provider = provider(1);
        provider.set_speed(100.0);
        assert_eq!(provider.speed(), 10.0);
        provider.set_speed(0.0);
        assert_eq!(provider.speed(), 0.1);
    }

    #[test]
    fn non_finite_speed_keeps_previous_setting() {
        let mut provider = provider(1);
        provider.set_speed(2.0);
        provider.set_speed(f64::NAN);
        assert_eq!(provider.speed(), 2.0);
        provider.set_speed(f64::INFINITY);
        assert_eq!(provider.speed(), 2.0);
        assert_eq!(provider.pause_before(Timestamp::new(0, 0)), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn replays_a_file_on_disk() {
        let dir = tempdir().unwrap();
        let frames: Vec<Vec<u8>> = (0..4).map(|n| synthetic_frame(n, 64)).collect();
        let path = write_capture_file(dir.path(), "saved.pcap", &frames).unwrap();

        let mut provider = ReplayProvider::new(&path).unwrap();
        assert_eq!(provider.total_records(), 4);
        assert_eq!(provider.source(), path.display().to_string());
        let mut seen = Vec::new();
        while let Some(frame) = provider.next_frame().await.unwrap() {
            seen.push(frame);
        }
        assert_eq!(seen, frames);
    }

    #[test]
    fn unreadable_file_is_a_provider_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"not a capture").unwrap();

        let err = ReplayProvider::new(&path).err().expect("open should fail");
        assert!(matches!(err, CaptureError::Provider { .. }));
        assert!(err.source().is_some());
        assert!(!err.is_recoverable());

        let missing = ReplayProvider::new(dir.path().join("absent.pcap")).err().expect("missing file");
        assert!(matches!(missing, CaptureError::Provider { .. }));
    }

    #[test]
    fn long_gaps_are_capped() {
        let mut provider = provider(1);
        provider.set_max_gap(Duration::from_millis(5));
        provider.previous = Some(Timestamp::new(0, 0));
        assert_eq!(provider.pause_before(Timestamp::new(3_600, 0)), Duration::from_millis(5));
    }
}
