//! Core types for the capture pipeline.
//!
//! - [`CapturedFrame`] borrows one frame from the radio together with its [`Timestamp`]
//! - [`Channel`] is a validated 2.4 GHz channel number
//! - [`StatusEvent`] is what the status display sees
//! - [`SessionState`] and [`CaptureStats`] describe a running session
//!
//! ```rust
//! use airsniff::types::{CapturedFrame, Timestamp};
//!
//! let payload = [0x80, 0x00, 0x00, 0x00];
//! let frame = CapturedFrame::new(Timestamp::new(1_700_000_000, 1_250_000), &payload);
//! assert_eq!(frame.timestamp_seconds(), 1_700_000_001);
//! assert_eq!(frame.timestamp_micros(), 250_000);
//! assert_eq!(frame.capture_length(), 4);
//! ```

mod channel;
mod event;
mod frame;
mod stats;

pub use channel::Channel;
pub use event::{CardKind, MediaInfo, StatusEvent};
pub use frame::{CapturedFrame, Timestamp};
pub use stats::{CaptureStats, SessionState};
