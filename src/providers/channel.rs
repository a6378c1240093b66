//! Channel-fed provider for frames pushed from a driver thread

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::Result;
use crate::provider::FrameProvider;
use crate::radio::FrameSink;

/// Sending half handed to the radio driver. Never blocks.
#[derive(Debug, Clone)]
pub struct FrameInjector {
    tx: mpsc::Sender<Vec<u8>>,
    dropped: Arc<AtomicU64>,
}

impl FrameInjector {
    /// Queue a copy of `payload`. Returns `false` if the queue was full or closed.
    pub fn inject(&self, payload: &[u8]) -> bool {
        match self.tx.try_send(payload.to_vec()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("Frame queue full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Frames lost to a full queue.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl FrameSink for FrameInjector {
    fn on_frame_ready(&self, payload: &[u8]) {
        self.inject(payload);
    }
}

/// Receives frames from [`FrameInjector`]s until every injector is dropped
pub struct ChannelProvider {
    rx: mpsc::Receiver<Vec<u8>>,
    source: String,
}

impl ChannelProvider {
    /// Create a provider and its injector with room for `capacity` queued frames
    pub fn new(capacity: usize) -> (FrameInjector, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let injector = FrameInjector { tx, dropped: Arc::new(AtomicU64::new(0)) };
        (injector, Self { rx, source: "radio".to_string() })
    }

}

#[async_trait::async_trait]
impl FrameProvider for ChannelProvider {
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let frame = self.rx.recv().await;
        if frame.is_none() {
            debug!("All injectors for {} dropped", self.source);
        }
        Ok(frame)
    }

    fn source(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_until_injectors_drop() {
        let (injector, mut provider) = ChannelProvider::new(4);
        let second = injector.clone();
        assert!(injector.inject(b"one"));
        second.on_frame_ready(b"two");
        drop(injector);
        drop(second);

        assert_eq!(provider.next_frame().await.unwrap(), Some(b"one".to_vec()));
        assert_eq!(provider.next_frame().await.unwrap(), Some(b"two".to_vec()));
        assert_eq!(provider.next_frame().await.unwrap(), None);
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let (injector, _provider) = ChannelProvider::new(2);
        assert!(injector.inject(b"a"));
        assert!(injector.inject(b"b"));
        assert!(!injector.inject(b"c"));
        assert_eq!(injector.dropped(), 1);
    }

    #[test]
    fn closed_queue_is_not_counted_as_full() {
        let (injector, provider) = ChannelProvider::new(2);
        drop(provider);
        assert!(!injector.inject(b"a"));
        assert_eq!(injector.dropped(), 0);
    }
}
