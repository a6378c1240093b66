//! Status event reporting
//!
//! The session and startup sequence emit [`StatusEvent`]s without waiting
//! on whoever consumes them. Reporters here cover the common sinks: the
//! tracing log, a broadcast channel for async consumers, and a bounded
//! scrolling log matching the appliance's display.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::CaptureConfig;
use crate::types::StatusEvent;

/// Fire-and-forget sink for lifecycle events. Must not block.
pub trait StatusReporter: Send + Sync + 'static {
    fn report(&self, event: &StatusEvent);
}

impl<T: StatusReporter + ?Sized> StatusReporter for Arc<T> {
    fn report(&self, event: &StatusEvent) {
        (**self).report(event)
    }
}

/// Writes events to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl StatusReporter for TracingReporter {
    fn report(&self, event: &StatusEvent) {
        match event {
            StatusEvent::CaptureFault { .. } => error!(%event, "status"),
            StatusEvent::CardError { .. } => warn!(%event, "status"),
            _ => info!(%event, "status"),
        }
    }
}

/// Publishes events on a tokio broadcast channel.
///
/// Slow subscribers lag and lose old events rather than blocking the sender.
#[derive(Debug, Clone)]
pub struct BroadcastReporter {
    tx: broadcast::Sender<StatusEvent>,
}

impl BroadcastReporter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }
}

impl StatusReporter for BroadcastReporter {
    fn report(&self, event: &StatusEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event.clone());
    }
}

/// Bounded log of display lines; the oldest line scrolls off the top.
#[derive(Debug)]
pub struct ScrollLog {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl ScrollLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { lines: Mutex::new(VecDeque::with_capacity(capacity)), capacity }
    }

    /// Sized to the display's `scroll_lines`.
    pub fn for_display(config: &CaptureConfig) -> Self {
        Self::new(config.scroll_lines)
    }

    /// Append a free-form line, e.g. the title shown at power-on.
    pub fn push_line(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// Visible lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).iter().cloned().collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl StatusReporter for ScrollLog {
    fn report(&self, event: &StatusEvent) {
        self.push_line(event.display_line());
    }
}

/// Forwards each event to several reporters in order.
#[derive(Default, Clone)]
pub struct Fanout {
    reporters: Vec<Arc<dyn StatusReporter>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: Arc<dyn StatusReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl StatusReporter for Fanout {
    fn report(&self, event: &StatusEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}
