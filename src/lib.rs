//! Promiscuous-mode 802.11 capture to rotating pcap files.
//!
//! airsniff turns a radio in promiscuous mode into a standalone capture
//! appliance: every frame the radio hands over is appended to a classic pcap
//! file on removable storage, files rotate on a fixed time budget without
//! ever overwriting an earlier capture, and the radio hops across channels
//! so one device covers the whole band.
//!
//! # Features
//!
//! - **Non-blocking ingest**: the radio's receive context only copies into a
//!   pending buffer; storage I/O stays on the foreground
//! - **Collision-free rotation**: `base.pcap`, `base_0.pcap`, `base_1.pcap`, ...
//! - **Fault containment**: a failed write faults the session once, with one
//!   status event, until it is reset
//! - **Channel hopping**: configurable interval and channel range
//!
//! ## Example
//!
//! ```rust,no_run
//! use airsniff::{CaptureConfig, Sniffer, TracingReporter};
//! use airsniff::radio::SimulatedRadio;
//! use airsniff::storage::DirectoryStorage;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> airsniff::Result<()> {
//!     let config = CaptureConfig::from_file("airsniff.yaml")?;
//!     let storage = DirectoryStorage::new("/sdcard");
//!     let sniffer =
//!         Sniffer::start(config, storage, SimulatedRadio::new(), Arc::new(TracingReporter)).await?;
//!
//!     // Hand `sniffer.sink()` to the radio driver's receive callback.
//!     let _sink = sniffer.sink();
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(600)).await;
//!     sniffer.stop().await
//! }
//! ```

// Core types and error handling
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Capture pipeline
pub mod clock;
pub mod config;
pub mod pcap;
pub mod radio;
pub mod reporter;
pub mod scheduler;
pub mod session;
pub mod storage;

// Task orchestration
pub mod driver;
pub mod provider;
pub mod providers;
mod sniffer;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use config::CaptureConfig;
pub use pcap::PcapReader;
pub use reporter::{BroadcastReporter, Fanout, ScrollLog, StatusReporter, TracingReporter};
pub use session::{CaptureSession, TickOutcome};
pub use sniffer::Sniffer;
