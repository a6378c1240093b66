//! Running capture appliance
//!
//! Wires storage, radio, session and driver together in the appliance's
//! startup order: check the card, open the first file, tune the radio, then
//! start ticking and hopping.

use futures::{Stream, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::CaptureConfig;
use crate::driver::{Driver, DriverHandle};
use crate::provider::FrameProvider;
use crate::radio::{FrameSink, Radio};
use crate::reporter::{BroadcastReporter, Fanout, StatusReporter};
use crate::scheduler::ChannelScheduler;
use crate::session::CaptureSession;
use crate::storage::StorageBackend;
use crate::types::{CaptureStats, Channel, MediaInfo, SessionState, StatusEvent};
use crate::{CaptureError, Result};

/// Events buffered per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 64;

/// A started capture: the first file is open and background tasks are running.
pub struct Sniffer<S: StorageBackend> {
    session: Arc<CaptureSession<S>>,
    events: BroadcastReporter,
    media: MediaInfo,
    driver: Option<DriverHandle>,
}

impl<S: StorageBackend> Sniffer<S> {
    /// Start capturing with the system clock.
    ///
    /// Must be called inside a tokio runtime. Fails without creating a
    /// session if the card is absent.
    pub async fn start<R: Radio>(
        config: CaptureConfig,
        storage: S,
        radio: R,
        reporter: Arc<dyn StatusReporter>,
    ) -> Result<Self> {
        Self::start_with_clock(config, storage, radio, Arc::new(SystemClock::new()), reporter).await
    }

    /// Start capturing with an explicit clock.
    pub async fn start_with_clock<R: Radio>(
        config: CaptureConfig,
        storage: S,
        radio: R,
        clock: Arc<dyn Clock>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Result<Self> {
        config.validate()?;

        let events = BroadcastReporter::new(EVENT_CAPACITY);
        let reporter: Arc<dyn StatusReporter> =
            Arc::new(Fanout::new().with(reporter).with(Arc::new(events.clone())));

        let media = match storage.media() {
            Ok(media) => media,
            Err(e) => {
                let reason = match &e {
                    CaptureError::MediaAbsent { reason } => reason.clone(),
                    other => other.to_string(),
                };
                reporter.report(&StatusEvent::CardError { reason });
                return Err(e);
            }
        };
        info!("Card detected: {} {}MB", media.kind, media.size_mb());
        reporter.report(&StatusEvent::CardDetected { kind: media.kind, size_mb: media.size_mb() });

        let session =
            Arc::new(CaptureSession::new(&config, storage, Arc::clone(&clock), Arc::clone(&reporter)));
        session.rotate()?;

        let mut scheduler = ChannelScheduler::new(&config, radio, clock.monotonic_millis());
        if let Err(e) = scheduler.start() {
            if let Err(close_err) = session.close() {
                debug!("Close after radio failure: {}", close_err);
            }
            return Err(e);
        }

        reporter.report(&StatusEvent::CaptureStarted { channel: scheduler.channel() });
        let driver = Driver::spawn(Arc::clone(&session), scheduler, clock, &config);

        Ok(Self { session, events, media, driver: Some(driver) })
    }

    /// Frame callback target for the radio's receive context.
    pub fn sink(&self) -> Arc<dyn FrameSink> {
        self.session.clone()
    }

    /// Feed frames from an async source into the session.
    pub fn attach<P: FrameProvider>(&mut self, provider: P) {
        let sink = self.sink();
        match self.driver.as_mut() {
            Some(driver) => driver.attach(provider, sink),
            None => warn!("Capture stopped, ignoring provider {}", provider.source()),
        }
    }

    pub fn session(&self) -> &Arc<CaptureSession<S>> {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn stats(&self) -> CaptureStats {
        self.session.stats()
    }

    pub fn media(&self) -> MediaInfo {
        self.media
    }

    /// Channel the radio is currently tuned to.
    pub fn channel(&self) -> Option<Channel> {
        self.driver.as_ref().map(|driver| *driver.channel.borrow())
    }

    /// Status events emitted from now on. Lagging subscribers skip ahead.
    pub fn events(&self) -> impl Stream<Item = StatusEvent> + 'static {
        BroadcastStream::new(self.events.subscribe()).filter_map(|event| async move {
            match event {
                Ok(event) => Some(event),
                Err(BroadcastStreamRecvError::Lagged(n)) => {
                    debug!("Event subscriber lagged by {} events", n);
                    None
                }
            }
        })
    }

    /// Clear a fault and open a fresh file.
    pub fn recover(&self) -> Result<PathBuf> {
        self.session.reset();
        self.session.rotate()
    }

    /// Stop background tasks and close the open file.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(driver) = self.driver.take() {
            driver.shutdown().await;
        }
        match self.session.state() {
            SessionState::Faulted => Ok(()),
            _ => self.session.close(),
        }
    }
}

impl<S: StorageBackend> Drop for Sniffer<S> {
    fn drop(&mut self) {
        debug!("Dropping sniffer");
        // Cancel tasks on drop for clean shutdown
        if let Some(driver) = &self.driver {
            driver.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::radio::SimulatedRadio;
    use crate::storage::MemoryStorage;
    use crate::test_utils::{EventLog, synthetic_frame};
    use crate::types::CardKind;
    use std::time::Duration;

    fn config() -> CaptureConfig {
        CaptureConfig { base_name: "cap".to_string(), ..CaptureConfig::default() }
    }

    fn card() -> MediaInfo {
        MediaInfo { kind: CardKind::Sdhc, size_bytes: 7_948_206_080 }
    }

    async fn start(
        storage: MemoryStorage,
        radio: SimulatedRadio,
    ) -> (Result<Sniffer<MemoryStorage>>, Arc<EventLog>) {
        let log = Arc::new(EventLog::new());
        let clock = Arc::new(ManualClock::new(Duration::from_secs(1_700_000_000)));
        let sniffer = Sniffer::start_with_clock(config(), storage, radio, clock, log.clone()).await;
        (sniffer, log)
    }

    #[tokio::test(start_paused = true)]
    async fn startup_sequence_emits_events_in_order() {
        let storage = MemoryStorage::new().with_media(card());
        let radio = SimulatedRadio::new();
        let (sniffer, log) = start(storage.clone(), radio.clone()).await;
        let sniffer = sniffer.unwrap();

        assert_eq!(
            log.events(),
            vec![
                StatusEvent::CardDetected { kind: CardKind::Sdhc, size_mb: 7580 },
                StatusEvent::FileOpened { path: "cap.pcap".into() },
                StatusEvent::CaptureStarted { channel: Channel::FIRST },
            ]
        );
        assert_eq!(sniffer.state(), SessionState::Active);
        assert_eq!(radio.channel(), Some(Channel::FIRST));
        assert_eq!(storage.open_files(), vec![PathBuf::from("cap.pcap")]);

        sniffer.stop().await.unwrap();
        assert!(storage.open_files().is_empty());
    }

    #[tokio::test]
    async fn missing_card_stops_startup() {
        let storage = MemoryStorage::new();
        storage.eject();
        let (sniffer, log) = start(storage.clone(), SimulatedRadio::new()).await;

        assert!(matches!(sniffer, Err(CaptureError::MediaAbsent { .. })));
        assert_eq!(log.events(), vec![StatusEvent::CardError { reason: "No SD card attached".into() }]);
        assert!(storage.file_names().is_empty());
    }

    #[tokio::test]
    async fn radio_failure_closes_the_first_file() {
        let storage = MemoryStorage::new();
        let radio = SimulatedRadio::new();
        radio.set_failing(true);
        let (sniffer, _log) = start(storage.clone(), radio).await;

        assert!(matches!(sniffer, Err(CaptureError::Radio { .. })));
        assert!(storage.open_files().is_empty());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_first() {
        let storage = MemoryStorage::new();
        let log = Arc::new(EventLog::new());
        let bad = CaptureConfig { snaplen: 0, ..config() };
        let result = Sniffer::start(bad, storage, SimulatedRadio::new(), log.clone()).await;

        assert!(matches!(result, Err(CaptureError::Config { .. })));
        assert!(log.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn events_stream_sees_rotation() {
        let storage = MemoryStorage::new();
        let (sniffer, _log) = start(storage.clone(), SimulatedRadio::new()).await;
        let sniffer = sniffer.unwrap();
        let mut events = Box::pin(sniffer.events());

        sniffer.sink().on_frame_ready(&synthetic_frame(1, 64));
        assert_eq!(events.next().await, Some(StatusEvent::FileSaved { path: "cap.pcap".into() }));
        assert_eq!(events.next().await, Some(StatusEvent::FileOpened { path: "cap_0.pcap".into() }));
        assert_eq!(sniffer.stats().records_written, 1);

        sniffer.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn recover_after_card_fault() {
        let storage = MemoryStorage::new();
        let (sniffer, log) = start(storage.clone(), SimulatedRadio::new()).await;
        let sniffer = sniffer.unwrap();

        storage.set_fail_writes(true);
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(sniffer.state(), SessionState::Faulted);
        assert_eq!(log.count(|e| matches!(e, StatusEvent::CaptureFault { .. })), 1);

        storage.set_fail_writes(false);
        assert_eq!(sniffer.recover().unwrap(), PathBuf::from("cap_0.pcap"));
        assert_eq!(sniffer.state(), SessionState::Active);
        sniffer.stop().await.unwrap();
    }
}
