//! Session state and counters

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a [`crate::CaptureSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No file open.
    Idle,
    /// File open and accepting records.
    Active,
    /// Closing the current file and opening the next.
    Rotating,
    /// Storage failed; only `reset()` leaves this state.
    Faulted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Active => "active",
            SessionState::Rotating => "rotating",
            SessionState::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

/// Point-in-time snapshot of session counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureStats {
    pub state: SessionState,
    /// Records written to storage across all files.
    pub records_written: u64,
    /// Frames discarded because the session was not active.
    pub frames_dropped: u64,
    /// Frames discarded because they exceed the snapshot length.
    pub frames_oversize: u64,
    /// Bytes written to storage, headers included.
    pub bytes_written: u64,
    /// Files created since the session was built.
    pub files_opened: u64,
}
