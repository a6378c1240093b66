//! Driver spawns and manages the capture's background tasks

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::clock::Clock;
use crate::config::CaptureConfig;
use crate::provider::FrameProvider;
use crate::radio::{FrameSink, Radio};
use crate::scheduler::ChannelScheduler;
use crate::session::{CaptureSession, TickOutcome};
use crate::storage::StorageBackend;
use crate::types::Channel;

/// Handles to the spawned tasks
pub struct DriverHandle {
    /// Channel the radio is tuned to, updated on every hop
    pub channel: watch::Receiver<Channel>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl DriverHandle {
    /// Run a pump task for `provider` under the same cancellation token
    pub fn attach<P: FrameProvider>(&mut self, provider: P, sink: Arc<dyn FrameSink>) {
        let cancel = self.cancel.clone();
        self.tasks.push(tokio::spawn(async move {
            Driver::pump_task(provider, sink, cancel).await;
        }));
    }

    /// Cancel every task and wait for them to finish
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Driver task ended abnormally: {}", e);
            }
        }
    }
}

/// Driver spawns and manages the capture's background tasks
///
/// The tick task counts seconds against the session and runs its storage
/// I/O on the blocking pool. The hop task owns the channel scheduler. Both
/// stop when the token is cancelled.
pub struct Driver;

impl Driver {
    /// Spawn tick and hop tasks for a session whose first file is already open
    pub fn spawn<S, R>(
        session: Arc<CaptureSession<S>>,
        scheduler: ChannelScheduler<R>,
        clock: Arc<dyn Clock>,
        config: &CaptureConfig,
    ) -> DriverHandle
    where
        S: StorageBackend,
        R: Radio,
    {
        let (channel_tx, channel_rx) = watch::channel(scheduler.channel());
        let cancel = CancellationToken::new();
        let mut tasks = Vec::with_capacity(3);

        let tick_cancel = cancel.clone();
        let tick_interval = config.tick_interval();
        tasks.push(tokio::spawn(async move {
            Self::tick_task(session, tick_interval, tick_cancel).await;
        }));

        if scheduler.is_hopping() {
            let hop_cancel = cancel.clone();
            let hop_interval = config.hop_interval();
            tasks.push(tokio::spawn(async move {
                Self::hop_task(scheduler, clock, hop_interval, channel_tx, hop_cancel).await;
            }));
        } else {
            debug!("Channel hopping disabled, staying on {}", scheduler.channel());
        }

        DriverHandle { channel: channel_rx, cancel, tasks }
    }

    /// Tick task - one session tick per interval
    async fn tick_task<S>(session: Arc<CaptureSession<S>>, period: Duration, cancel: CancellationToken)
    where
        S: StorageBackend,
    {
        info!("Tick task started ({:?} period)", period);
        let mut ticker = interval_at(Instant::now() + period, period);
        let mut ticks = 0u64;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Tick task cancelled");
                    break;
                }
                _ = ticker.tick() => {}
            }

            ticks += 1;
            let session = Arc::clone(&session);
            match tokio::task::spawn_blocking(move || session.on_tick()).await {
                Ok(TickOutcome::Rotated { closed, opened }) => {
                    debug!("Tick {}: rotated {} -> {}", ticks, closed.display(), opened.display());
                }
                Ok(TickOutcome::Faulted) => {
                    warn!("Tick {}: session faulted", ticks);
                }
                Ok(outcome) => trace!("Tick {}: {:?}", ticks, outcome),
                Err(e) => {
                    error!("Session tick panicked or was cancelled: {}", e);
                    break;
                }
            }
        }

        info!("Tick task ended after {} ticks", ticks);
    }

    /// Hop task - advances the radio channel on the hop interval
    async fn hop_task<R>(
        mut scheduler: ChannelScheduler<R>,
        clock: Arc<dyn Clock>,
        period: Duration,
        channel_tx: watch::Sender<Channel>,
        cancel: CancellationToken,
    ) where
        R: Radio,
    {
        info!("Hop task started on {}", scheduler.channel());
        let mut ticker = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Hop task cancelled");
                    break;
                }
                _ = ticker.tick() => {}
            }

            if scheduler.on_tick(clock.monotonic_millis()) {
                trace!("Hopped to {}", scheduler.channel());
                // Nobody watching is fine.
                let _ = channel_tx.send(scheduler.channel());
            }
        }

        info!("Hop task ended after {} hops", scheduler.hops());
    }

    /// Pump task - moves frames from a provider into the sink
    async fn pump_task<P>(mut provider: P, sink: Arc<dyn FrameSink>, cancel: CancellationToken)
    where
        P: FrameProvider,
    {
        info!("Pump task started for {}", provider.source());
        let mut frame_count = 0u64;
        let mut error_count = 0u32;
        const MAX_ERRORS: u32 = 10;

        loop {
            // Use select to allow cancellation during provider.next_frame()
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Pump cancelled during read");
                    break;
                }
                result = provider.next_frame() => result,
            };

            match result {
                Ok(Some(payload)) => {
                    frame_count += 1;
                    error_count = 0;
                    trace!("Frame {}: {} bytes", frame_count, payload.len());
                    sink.on_frame_ready(&payload);
                }
                Ok(None) => {
                    info!("Provider {} ended after {} frames", provider.source(), frame_count);
                    break;
                }
                Err(e) => {
                    // Provider error - don't crash on transient failures
                    error_count += 1;
                    error!("Provider error ({}/{}): {}", error_count, MAX_ERRORS, e);

                    if error_count >= MAX_ERRORS {
                        error!("Too many provider errors, stopping pump");
                        break;
                    }

                    // Exponential backoff: 100ms, 200ms, 400ms, ...
                    let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        info!("Pump task ended (delivered {} frames)", frame_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ChannelProvider;
    use crate::radio::SimulatedRadio;
    use crate::test_utils::{SessionHarness, synthetic_frame};
    use crate::types::SessionState;
    use crate::{CaptureError, Result};

    fn config() -> CaptureConfig {
        CaptureConfig { base_name: "cap".to_string(), ..CaptureConfig::default() }
    }

    struct FailingProvider;

    #[async_trait::async_trait]
    impl FrameProvider for FailingProvider {
        async fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
            Err(CaptureError::radio("receive", "rx ring overflow"))
        }

        fn source(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_drive_rotation() {
        let h = SessionHarness::new(&config());
        h.session.rotate().unwrap();
        let scheduler = ChannelScheduler::new(&config(), SimulatedRadio::new(), 0);
        let handle = Driver::spawn(h.session.clone(), scheduler, h.clock.clone(), &config());

        tokio::time::sleep(Duration::from_millis(31_500)).await;
        assert_eq!(h.session.current_path().unwrap().to_str(), Some("cap_0.pcap"));
        assert_eq!(h.session.state(), SessionState::Active);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn hop_task_publishes_channel() {
        let h = SessionHarness::new(&config());
        let radio = SimulatedRadio::new();
        let mut scheduler = ChannelScheduler::new(&config(), radio.clone(), 0);
        scheduler.start().unwrap();
        let mut handle = Driver::spawn(h.session.clone(), scheduler, h.clock.clone(), &config());

        for expected in 2..=4u8 {
            h.clock.advance_millis(214);
            handle.channel.changed().await.unwrap();
            assert_eq!(handle.channel.borrow().number(), expected);
        }
        assert_eq!(radio.channel().map(Channel::number), Some(4));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn late_hop_tick_does_not_skip_the_next_hop() {
        let h = SessionHarness::new(&config());
        let radio = SimulatedRadio::new();
        let mut scheduler = ChannelScheduler::new(&config(), radio.clone(), 0);
        scheduler.start().unwrap();
        let mut handle = Driver::spawn(h.session.clone(), scheduler, h.clock.clone(), &config());

        // Clock readings at 215, 428, 643: each tick lands a little off the boundary.
        for (step, expected) in [(215, 2u8), (213, 3), (215, 4)] {
            h.clock.advance_millis(step);
            tokio::time::timeout(Duration::from_secs(5), handle.channel.changed())
                .await
                .expect("hop within one interval")
                .unwrap();
            assert_eq!(handle.channel.borrow().number(), expected);
        }
        assert_eq!(radio.channel().map(Channel::number), Some(4));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn pump_feeds_the_session() {
        let h = SessionHarness::new(&config());
        h.session.rotate().unwrap();
        let scheduler = ChannelScheduler::new(&config(), SimulatedRadio::new(), 0);
        let mut handle = Driver::spawn(h.session.clone(), scheduler, h.clock.clone(), &config());

        let (injector, provider) = ChannelProvider::new(16);
        handle.attach(provider, h.session.clone());
        for n in 0..5 {
            assert!(injector.inject(&synthetic_frame(n, 48)));
        }
        drop(injector);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(h.session.stats().records_written, 5);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn pump_gives_up_after_repeated_errors() {
        let sink = Arc::new(ChannelProvider::new(1).0);
        let provider = FailingProvider;
        let cancel = CancellationToken::new();

        let task = tokio::spawn(Driver::pump_task(provider, sink, cancel));
        tokio::time::timeout(Duration::from_secs(60), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancellation_stops_a_blocked_pump() {
        let (injector, provider) = ChannelProvider::new(1);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Driver::pump_task(provider, Arc::new(injector.clone()), cancel.clone()));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }
}
