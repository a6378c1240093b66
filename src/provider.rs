//! Provider trait for frame sources

use crate::Result;

/// Asynchronous source of raw 802.11 frames.
///
/// Providers stand in for the radio's receive context when frames come from
/// somewhere async: a replayed capture, or a channel fed by a driver thread.
/// The driver's pump task hands each payload to the session's
/// [`crate::radio::FrameSink`], which stamps it with the current wall time.
#[async_trait::async_trait]
pub trait FrameProvider: Send + 'static {
    /// Get the next frame payload
    ///
    /// Returns:
    /// - `Ok(Some(payload))` - New frame available
    /// - `Ok(None)` - Source exhausted (normal termination)
    /// - `Err(e)` - Error occurred; the pump backs off and retries
    ///
    /// Each provider handles its own pacing.
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>>;

    /// Short label used in logs, e.g. a file name.
    fn source(&self) -> &str;
}
