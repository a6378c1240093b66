//! Capture session
//!
//! Owns the open capture file and moves it through
//! `Idle -> Active -> Rotating -> Active ...`, with `Faulted` reachable from
//! any I/O step. Two locks split the work:
//!
//! - the *ingest* lock guards the state and a pending record buffer. The
//!   radio's receive context takes it only long enough to check the state and
//!   append one encoded record.
//! - the *file* lock guards the storage backend and the open writer. Only the
//!   foreground (ticks, rotation, reset) takes it, always before the ingest
//!   lock, and all storage I/O happens under it.
//!
//! Pending records are drained to storage on the flush interval and before a
//! file is closed, so a frame arriving during rotation is either in the old
//! file or dropped, never in both and never split.

mod naming;


pub use naming::{CAPTURE_EXTENSION, candidate_name, next_free_path};

use std::io::Write;
use std::mem;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, trace, warn};

use crate::clock::Clock;
use crate::config::CaptureConfig;
use crate::pcap::{ByteOrder, GlobalHeader, write_record};
use crate::reporter::StatusReporter;
use crate::storage::StorageBackend;
use crate::types::{CaptureStats, CapturedFrame, SessionState, StatusEvent};
use crate::{CaptureError, Result};

/// What a tick did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No file open; nothing counted.
    Inactive,
    /// Second counted against the open file.
    Elapsed { elapsed_seconds: u32 },
    /// Budget exceeded; `closed` was saved and `opened` is now receiving records.
    Rotated { closed: PathBuf, opened: PathBuf },
    /// A storage operation failed during this tick.
    Faulted,
}

/// Which status event announces a fault.
#[derive(Debug, Clone, Copy)]
enum FaultKind {
    /// Writing to or closing an open file.
    Capture,
    /// Naming or creating a new file.
    Card,
}

struct Ingest {
    state: SessionState,
    pending: Vec<u8>,
    pending_records: u64,
}

struct OpenFile<W> {
    path: PathBuf,
    writer: W,
    elapsed_seconds: u32,
    ticks_since_flush: u32,
    records: u64,
}

struct FileSlot<S: StorageBackend> {
    storage: S,
    open: Option<OpenFile<S::Writer>>,
    fault: Option<String>,
    spare: Vec<u8>,
}

#[derive(Default)]
struct Counters {
    records_written: AtomicU64,
    frames_dropped: AtomicU64,
    frames_oversize: AtomicU64,
    bytes_written: AtomicU64,
    files_opened: AtomicU64,
}

/// Time-rotated pcap writer fed from the radio's receive context.
pub struct CaptureSession<S: StorageBackend> {
    base_name: String,
    rotation_budget_secs: u32,
    flush_interval_secs: u32,
    snaplen: u32,
    byte_order: ByteOrder,
    max_probe: u32,
    clock: Arc<dyn Clock>,
    reporter: Arc<dyn StatusReporter>,
    ingest: Mutex<Ingest>,
    file: Mutex<FileSlot<S>>,
    counters: Counters,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: StorageBackend> CaptureSession<S> {
    /// Build an idle session. No file is opened until [`rotate`](Self::rotate).
    pub fn new(
        config: &CaptureConfig,
        storage: S,
        clock: Arc<dyn Clock>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        Self {
            base_name: config.base_name.clone(),
            rotation_budget_secs: config.rotation_budget_secs,
            flush_interval_secs: config.flush_interval_secs.max(1),
            snaplen: config.snaplen,
            byte_order: config.byte_order,
            max_probe: config.max_probe,
            clock,
            reporter,
            ingest: Mutex::new(Ingest {
                state: SessionState::Idle,
                pending: Vec::new(),
                pending_records: 0,
            }),
            file: Mutex::new(FileSlot { storage, open: None, fault: None, spare: Vec::new() }),
            counters: Counters::default(),
        }
    }

    /// Stamp `payload` with the current wall time and ingest it.
    pub fn on_frame_ready(&self, payload: &[u8]) -> bool {
        let timestamp = self.clock.wall_time();
        self.ingest(&CapturedFrame::new(timestamp, payload))
    }

    /// Queue one record for the open file. Returns whether it was accepted.
    ///
    /// Safe to call from any thread. Never touches storage.
    pub fn ingest(&self, frame: &CapturedFrame<'_>) -> bool {
        let mut ingest = lock(&self.ingest);
        if ingest.state != SessionState::Active {
            drop(ingest);
            self.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        if frame.capture_length() > self.snaplen {
            drop(ingest);
            self.counters.frames_oversize.fetch_add(1, Ordering::Relaxed);
            trace!("Dropping {} byte frame over snaplen {}", frame.capture_length(), self.snaplen);
            return false;
        }

        write_record(&mut ingest.pending, frame, self.byte_order);
        ingest.pending_records += 1;
        true
    }

    /// Count one elapsed second against the open file.
    ///
    /// Flushes pending records every `flush_interval_secs` ticks and rotates
    /// once the elapsed count exceeds `rotation_budget_secs`.
    pub fn on_tick(&self) -> TickOutcome {
        let mut slot = lock(&self.file);
        if self.state() != SessionState::Active {
            return TickOutcome::Inactive;
        }

        let (elapsed_seconds, flush_due) = match slot.open.as_mut() {
            Some(open) => {
                open.elapsed_seconds += 1;
                open.ticks_since_flush += 1;
                (open.elapsed_seconds, open.ticks_since_flush >= self.flush_interval_secs)
            }
            None => return TickOutcome::Inactive,
        };

        if flush_due {
            if let Err(e) = self.drain(&mut slot) {
                self.fault(&mut slot, FaultKind::Capture, &e);
                return TickOutcome::Faulted;
            }
        }

        if elapsed_seconds <= self.rotation_budget_secs {
            return TickOutcome::Elapsed { elapsed_seconds };
        }

        debug!("Rotation budget of {}s exceeded", self.rotation_budget_secs);
        let closed = slot.open.as_ref().map(|open| open.path.clone()).unwrap_or_default();
        match self.rotate_locked(&mut slot) {
            Ok(opened) => TickOutcome::Rotated { closed, opened },
            Err(_) => TickOutcome::Faulted,
        }
    }

    /// Close the current file, if any, and open the next free name.
    ///
    /// Refused without touching storage while the session is faulted.
    pub fn rotate(&self) -> Result<PathBuf> {
        let mut slot = lock(&self.file);
        self.rotate_locked(&mut slot)
    }

    /// Drain pending records and close the open file, leaving the session idle.
    pub fn close(&self) -> Result<()> {
        let mut slot = lock(&self.file);
        if self.state() == SessionState::Faulted {
            return Err(CaptureError::session_faulted(slot.fault.clone().unwrap_or_default()));
        }

        self.set_state(SessionState::Rotating);
        if let Err(e) = self.finish_open_file(&mut slot) {
            self.fault(&mut slot, FaultKind::Capture, &e);
            return Err(e);
        }
        self.set_state(SessionState::Idle);
        Ok(())
    }

    /// Clear a fault and return to `Idle`. The next `rotate()` opens a fresh file.
    pub fn reset(&self) {
        let mut slot = lock(&self.file);
        if let Some(open) = slot.open.take() {
            if let Err(e) = slot.storage.close(open.writer) {
                debug!("Discarding {} on reset: {}", open.path.display(), e);
            }
        }

        let previous = slot.fault.take();
        {
            let mut ingest = lock(&self.ingest);
            ingest.state = SessionState::Idle;
            ingest.pending.clear();
            ingest.pending_records = 0;
        }

        match previous {
            Some(reason) => info!("Session reset after fault: {}", reason),
            None => info!("Session reset"),
        }
    }

    pub fn state(&self) -> SessionState {
        lock(&self.ingest).state
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            state: self.state(),
            records_written: self.counters.records_written.load(Ordering::Relaxed),
            frames_dropped: self.counters.frames_dropped.load(Ordering::Relaxed),
            frames_oversize: self.counters.frames_oversize.load(Ordering::Relaxed),
            bytes_written: self.counters.bytes_written.load(Ordering::Relaxed),
            files_opened: self.counters.files_opened.load(Ordering::Relaxed),
        }
    }

    /// Path of the file currently receiving records.
    pub fn current_path(&self) -> Option<PathBuf> {
        lock(&self.file).open.as_ref().map(|open| open.path.clone())
    }

    /// Seconds counted against the open file, 0 when none is open.
    pub fn elapsed_seconds(&self) -> u32 {
        lock(&self.file).open.as_ref().map_or(0, |open| open.elapsed_seconds)
    }

    /// Records written to the open file so far, excluding pending ones.
    pub fn file_records(&self) -> u64 {
        lock(&self.file).open.as_ref().map_or(0, |open| open.records)
    }

    /// Reason for the current fault, if faulted.
    pub fn fault_reason(&self) -> Option<String> {
        lock(&self.file).fault.clone()
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Run `f` against the storage backend, e.g. to inspect the card.
    pub fn with_storage<T>(&self, f: impl FnOnce(&S) -> T) -> T {
        f(&lock(&self.file).storage)
    }

    fn set_state(&self, state: SessionState) {
        lock(&self.ingest).state = state;
    }

    fn rotate_locked(&self, slot: &mut FileSlot<S>) -> Result<PathBuf> {
        if self.state() == SessionState::Faulted {
            let reason = slot.fault.clone().unwrap_or_default();
            warn!("Rotate refused, session faulted: {}", reason);
            return Err(CaptureError::session_faulted(reason));
        }

        self.set_state(SessionState::Rotating);

        if let Err(e) = self.finish_open_file(slot) {
            self.fault(slot, FaultKind::Capture, &e);
            return Err(e);
        }

        match self.open_next(slot) {
            Ok(path) => {
                self.set_state(SessionState::Active);
                info!("Opened {}", path.display());
                self.reporter.report(&StatusEvent::FileOpened { path: path.display().to_string() });
                Ok(path)
            }
            Err(e) => {
                self.fault(slot, FaultKind::Card, &e);
                Err(e)
            }
        }
    }

    /// Drain and close the open file, announcing it as saved.
    fn finish_open_file(&self, slot: &mut FileSlot<S>) -> Result<()> {
        if slot.open.is_none() {
            return Ok(());
        }

        self.drain(slot)?;

        let Some(open) = slot.open.take() else {
            return Ok(());
        };
        let OpenFile { path, writer, records, .. } = open;
        slot.storage.close(writer).map_err(|e| CaptureError::write_error(&path, e))?;

        info!("Saved {} with {} records", path.display(), records);
        self.reporter.report(&StatusEvent::FileSaved { path: path.display().to_string() });
        Ok(())
    }

    fn open_next(&self, slot: &mut FileSlot<S>) -> Result<PathBuf> {
        let path = next_free_path(&slot.storage, &self.base_name, self.max_probe)?;
        let mut writer =
            slot.storage.create(&path).map_err(|e| CaptureError::storage_error(&path, e))?;

        let header = GlobalHeader::new(self.snaplen, self.byte_order).encode();
        if let Err(e) = writer.write_all(&header).and_then(|()| writer.flush()) {
            if let Err(close_err) = slot.storage.close(writer) {
                debug!("Close after failed header write: {}", close_err);
            }
            return Err(CaptureError::write_error(&path, e));
        }

        self.counters.files_opened.fetch_add(1, Ordering::Relaxed);
        self.counters.bytes_written.fetch_add(header.len() as u64, Ordering::Relaxed);
        slot.open = Some(OpenFile {
            path: path.clone(),
            writer,
            elapsed_seconds: 0,
            ticks_since_flush: 0,
            records: 0,
        });
        Ok(path)
    }

    /// Write pending records to the open file and flush it.
    fn drain(&self, slot: &mut FileSlot<S>) -> Result<()> {
        let FileSlot { open, spare, .. } = slot;
        let Some(open) = open.as_mut() else {
            return Ok(());
        };
        open.ticks_since_flush = 0;

        let (mut bytes, records) = {
            let mut ingest = lock(&self.ingest);
            let records = mem::take(&mut ingest.pending_records);
            (mem::replace(&mut ingest.pending, mem::take(spare)), records)
        };

        if !bytes.is_empty() {
            open.writer.write_all(&bytes).map_err(|e| CaptureError::write_error(&open.path, e))?;
        }
        open.writer.flush().map_err(|e| CaptureError::write_error(&open.path, e))?;

        if records > 0 {
            trace!("Drained {} records to {}", records, open.path.display());
        }
        open.records += records;
        self.counters.records_written.fetch_add(records, Ordering::Relaxed);
        self.counters.bytes_written.fetch_add(bytes.len() as u64, Ordering::Relaxed);

        bytes.clear();
        *spare = bytes;
        Ok(())
    }

    fn fault(&self, slot: &mut FileSlot<S>, kind: FaultKind, cause: &CaptureError) {
        {
            let mut ingest = lock(&self.ingest);
            ingest.state = SessionState::Faulted;
            ingest.pending.clear();
            ingest.pending_records = 0;
        }

        if let Some(open) = slot.open.take() {
            if let Err(e) = slot.storage.close(open.writer) {
                debug!("Close of faulted {} failed: {}", open.path.display(), e);
            }
        }

        let reason = describe(cause);
        error!("Capture faulted: {}", reason);
        slot.fault = Some(reason.clone());

        let event = match kind {
            FaultKind::Capture => StatusEvent::CaptureFault { reason },
            FaultKind::Card => StatusEvent::CardError { reason },
        };
        self.reporter.report(&event);
    }
}

impl<S: StorageBackend> crate::radio::FrameSink for CaptureSession<S> {
    fn on_frame_ready(&self, payload: &[u8]) {
        CaptureSession::on_frame_ready(self, payload);
    }
}

impl<S: StorageBackend> std::fmt::Debug for CaptureSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("base_name", &self.base_name)
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Error text including its source, e.g. "Write to cap.pcap failed: card removed".
fn describe(err: &CaptureError) -> String {
    match std::error::Error::source(err) {
        Some(source) => format!("{}: {}", err, source),
        None => err.to_string(),
    }
}
