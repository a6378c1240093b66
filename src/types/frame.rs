//! Captured frame types

use std::time::Duration;

use serde::{Deserialize, Serialize};

const MICROS_PER_SECOND: u32 = 1_000_000;

/// Wall-clock arrival time of a frame, split the way pcap records store it.
///
/// `micros` is always below one million; construction carries any excess
/// into `seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    seconds: u32,
    micros: u32,
}

impl Timestamp {
    /// Build a timestamp, normalizing a microsecond reading of one second or more.
    pub fn new(seconds: u32, micros: u32) -> Self {
        Self {
            seconds: seconds.wrapping_add(micros / MICROS_PER_SECOND),
            micros: micros % MICROS_PER_SECOND,
        }
    }

    /// Build a timestamp from a duration since the Unix epoch.
    ///
    /// Seconds wrap at `u32::MAX` as the classic pcap format requires.
    pub fn from_unix_duration(since_epoch: Duration) -> Self {
        Self::new(since_epoch.as_secs() as u32, since_epoch.subsec_micros())
    }

    pub fn seconds(&self) -> u32 {
        self.seconds
    }

    pub fn micros(&self) -> u32 {
        self.micros
    }

    /// Time elapsed since `earlier`, zero if `earlier` is not before `self`.
    pub fn saturating_duration_since(&self, earlier: Timestamp) -> Duration {
        let to_micros = |t: &Timestamp| u64::from(t.seconds) * u64::from(MICROS_PER_SECOND) + u64::from(t.micros);
        Duration::from_micros(to_micros(self).saturating_sub(to_micros(&earlier)))
    }
}

/// One promiscuous-mode observation.
///
/// The payload is borrowed from the radio driver for the duration of the
/// callback only; the frame is encoded immediately and never retained.
#[derive(Debug, Clone, Copy)]
pub struct CapturedFrame<'a> {
    timestamp: Timestamp,
    payload: &'a [u8],
}

impl<'a> CapturedFrame<'a> {
    pub fn new(timestamp: Timestamp, payload: &'a [u8]) -> Self {
        Self { timestamp, payload }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn timestamp_seconds(&self) -> u32 {
        self.timestamp.seconds
    }

    pub fn timestamp_micros(&self) -> u32 {
        self.timestamp.micros
    }

    /// Number of payload bytes captured.
    pub fn capture_length(&self) -> u32 {
        self.payload.len() as u32
    }

    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn micros_always_below_one_second(seconds in any::<u32>(), micros in any::<u32>()) {
            let ts = Timestamp::new(seconds, micros);
            prop_assert!(ts.micros() < MICROS_PER_SECOND);
            prop_assert_eq!(ts.seconds(), seconds.wrapping_add(micros / MICROS_PER_SECOND));
        }
    }

    #[test]
    fn in_range_micros_are_untouched() {
        let ts = Timestamp::new(1_700_000_000, 999_999);
        assert_eq!(ts.seconds(), 1_700_000_000);
        assert_eq!(ts.micros(), 999_999);
    }

    #[test]
    fn overflowing_micros_carry_into_seconds() {
        let ts = Timestamp::new(10, 2_500_000);
        assert_eq!(ts.seconds(), 12);
        assert_eq!(ts.micros(), 500_000);
    }

    #[test]
    fn from_unix_duration_splits_subsecond_part() {
        let ts = Timestamp::from_unix_duration(Duration::new(42, 123_456_789));
        assert_eq!(ts.seconds(), 42);
        assert_eq!(ts.micros(), 123_456);
    }

    #[test]
    fn duration_between_timestamps() {
        let earlier = Timestamp::new(10, 900_000);
        let later = Timestamp::new(11, 100_000);
        assert_eq!(later.saturating_duration_since(earlier), Duration::from_millis(200));
        assert_eq!(earlier.saturating_duration_since(later), Duration::ZERO);
    }

    #[test]
    fn frame_length_tracks_payload() {
        let payload = [0x80u8, 0x00, 0x00, 0x00];
        let frame = CapturedFrame::new(Timestamp::new(1, 2), &payload);
        assert_eq!(frame.capture_length(), 4);
        assert_eq!(frame.timestamp_seconds(), 1);
        assert_eq!(frame.timestamp_micros(), 2);
        assert_eq!(frame.payload(), &payload);
    }
}
