//! Channel hopping
//!
//! Cycles the radio through channels 1..=max on a fixed interval. Hopping is
//! best effort: a rejected channel change only costs coverage, so failures
//! are logged and the schedule carries on. Nothing here looks at the capture
//! session.

use tracing::{debug, info};

use crate::Result;
use crate::config::CaptureConfig;
use crate::radio::Radio;
use crate::types::Channel;

/// Current channel and when it was last changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelState {
    pub channel: Channel,
    pub last_hop_millis: u64,
}

pub struct ChannelScheduler<R: Radio> {
    radio: R,
    state: ChannelState,
    max_channel: Channel,
    hop_interval_ms: u64,
    enabled: bool,
    hops: u64,
}

impl<R: Radio> ChannelScheduler<R> {
    /// Build a scheduler whose first hop is due one interval after `now_millis`.
    pub fn new(config: &CaptureConfig, radio: R, now_millis: u64) -> Self {
        Self {
            radio,
            state: ChannelState { channel: config.channel, last_hop_millis: now_millis },
            max_channel: config.max_channel,
            hop_interval_ms: config.hop_interval_ms,
            enabled: config.channel_hopping,
            hops: 0,
        }
    }

    /// Tune the radio to the starting channel. Unlike hops, this must succeed.
    pub fn start(&mut self) -> Result<()> {
        self.radio.set_channel(self.state.channel)?;
        info!(channel = %self.state.channel, hopping = self.enabled, "Radio tuned");
        Ok(())
    }

    /// Advance the channel if a full hop interval has passed. Returns whether a hop happened.
    pub fn on_tick(&mut self, now_millis: u64) -> bool {
        if !self.enabled {
            return false;
        }

        if now_millis.saturating_sub(self.state.last_hop_millis) < self.hop_interval_ms {
            return false;
        }

        let next = self.state.channel.next_wrapping(self.max_channel);
        if let Err(e) = self.radio.set_channel(next) {
            debug!("Channel change to {} failed, continuing: {}", next, e);
        }

        // Stay on the original cadence when a tick is only a little late.
        let elapsed = now_millis.saturating_sub(self.state.last_hop_millis);
        let last_hop_millis = if elapsed < 2 * self.hop_interval_ms {
            self.state.last_hop_millis + self.hop_interval_ms
        } else {
            now_millis
        };
        self.state = ChannelState { channel: next, last_hop_millis };
        self.hops += 1;
        true
    }

    pub fn channel(&self) -> Channel {
        self.state.channel
    }

    pub fn is_hopping(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Hops performed since construction.
    pub fn hops(&self) -> u64 {
        self.hops
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }
}
