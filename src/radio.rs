//! Radio boundary
//!
//! Two narrow traits separate the pipeline from the radio driver. The
//! scheduler tunes the radio through [`Radio`]; the driver hands every
//! promiscuous-mode frame to a [`FrameSink`] from its own receive context.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use crate::types::Channel;
use crate::{CaptureError, Result};

/// Channel control over a radio already in promiscuous mode.
pub trait Radio: Send + 'static {
    fn set_channel(&mut self, channel: Channel) -> Result<()>;
}

/// Receiver of promiscuous-mode frames.
///
/// Called from the radio's receive context, possibly concurrently with the
/// foreground loop. `payload` is only valid for the duration of the call.
/// Implementations must return quickly and never perform storage I/O.
pub trait FrameSink: Send + Sync {
    fn on_frame_ready(&self, payload: &[u8]);
}

impl<T: FrameSink + ?Sized> FrameSink for Arc<T> {
    fn on_frame_ready(&self, payload: &[u8]) {
        (**self).on_frame_ready(payload)
    }
}

/// Host-side radio that only remembers what it was told.
///
/// Clones share state, so a test can watch the channel while the scheduler
/// owns the radio.
#[derive(Debug, Clone, Default)]
pub struct SimulatedRadio {
    inner: Arc<SimulatedState>,
}

#[derive(Debug, Default)]
struct SimulatedState {
    channel: AtomicU8,
    changes: AtomicU64,
    fail: AtomicBool,
}

impl SimulatedRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last channel applied, `None` before the first `set_channel`.
    pub fn channel(&self) -> Option<Channel> {
        Channel::new(self.inner.channel.load(Ordering::SeqCst))
    }

    /// Successful channel changes so far.
    pub fn changes(&self) -> u64 {
        self.inner.changes.load(Ordering::SeqCst)
    }

    /// Make subsequent `set_channel` calls fail.
    pub fn set_failing(&self, fail: bool) {
        self.inner.fail.store(fail, Ordering::SeqCst);
    }
}

impl Radio for SimulatedRadio {
    fn set_channel(&mut self, channel: Channel) -> Result<()> {
        if self.inner.fail.load(Ordering::SeqCst) {
            return Err(CaptureError::radio("set_channel", "radio busy"));
        }
        self.inner.channel.store(channel.number(), Ordering::SeqCst);
        self.inner.changes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
