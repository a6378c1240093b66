//! Error types for the capture pipeline.
//!
//! Every fault the pipeline can hit is represented here. Inside the capture
//! session most of these never escape: a storage failure is turned into a
//! `Faulted` state plus a status event, and the error value is only returned
//! to foreground callers (startup, `rotate()`, `reset()`).
//!
//! ## Error Categories
//!
//! - **Storage Errors**: media absent, file creation or write failures
//! - **Session Errors**: operations refused because the session is faulted
//! - **Parse Errors**: malformed capture files read back by [`crate::pcap::PcapReader`]
//! - **Config Errors**: invalid values in [`crate::CaptureConfig`]
//! - **Radio Errors**: channel changes rejected by the radio driver
//!
//! ## Recovery
//!
//! ```rust
//! use airsniff::CaptureError;
//!
//! let error = CaptureError::media_absent("No SD card attached");
//! if error.is_recoverable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for capture operations.
pub type Result<T, E = CaptureError> = std::result::Result<T, E>;

/// Main error type for capture operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CaptureError {
    #[error("Storage error on {path}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage media unavailable: {reason}")]
    MediaAbsent { reason: String },

    #[error("Write to {path} failed")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No free file name for '{base}' after {attempts} attempts")]
    NoFreeFileName { base: String, attempts: u32 },

    #[error("Capture session is faulted: {reason}")]
    SessionFaulted { reason: String },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Invalid configuration for '{field}': {details}")]
    Config { field: String, details: String },

    #[error("Radio operation '{operation}' failed: {reason}")]
    Radio { operation: String, reason: String },

    #[error("Frame provider failed: {reason}")]
    Provider {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl CaptureError {
    /// Returns whether an external `reset()` followed by `rotate()` may clear this error.
    pub fn is_recoverable(&self) -> bool {
        match self {
            CaptureError::Storage { .. } => true,
            CaptureError::MediaAbsent { .. } => true,
            CaptureError::Write { .. } => true,
            CaptureError::NoFreeFileName { .. } => true,
            CaptureError::SessionFaulted { .. } => true,
            CaptureError::Radio { .. } => true,
            CaptureError::Provider { .. } => false,
            CaptureError::Parse { .. } => false,
            CaptureError::Config { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            CaptureError::Storage { .. } | CaptureError::Write { .. } => vec![
                "Check that the card is still inserted",
                "Ensure the card has free space",
                "Remount the card and reset the session",
            ],
            CaptureError::MediaAbsent { .. } => vec![
                "Insert an SD card",
                "Check the card is formatted with a supported filesystem",
                "Restart capture once the card is mounted",
            ],
            CaptureError::NoFreeFileName { .. } => vec![
                "Move old capture files off the card",
                "Choose a different base file name",
            ],
            CaptureError::SessionFaulted { .. } => vec![
                "Reset the session after fixing the storage problem",
                "Remount the card before resetting",
            ],
            CaptureError::Parse { .. } => vec![
                "Check the file is a classic pcap capture",
                "The file may have been truncated by a power loss",
            ],
            CaptureError::Config { .. } => vec![
                "Fix the configuration value and restart",
                "Remove the field to fall back to its default",
            ],
            CaptureError::Radio { .. } => vec![
                "Check the channel is valid for the radio's region",
                "Verify the radio is in promiscuous mode",
            ],
            CaptureError::Provider { .. } => vec![
                "Check the frame source is still available",
                "Restart the provider",
            ],
        }
    }

    /// Helper constructor for storage errors with path context.
    pub fn storage_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CaptureError::Storage { path: path.into(), source }
    }

    /// Helper constructor for write errors with path context.
    pub fn write_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CaptureError::Write { path: path.into(), source }
    }

    /// Helper constructor for missing media.
    pub fn media_absent(reason: impl Into<String>) -> Self {
        CaptureError::MediaAbsent { reason: reason.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(field: impl Into<String>, details: impl Into<String>) -> Self {
        CaptureError::Config { field: field.into(), details: details.into() }
    }

    /// Helper constructor for parse errors.
    pub fn parse(context: impl Into<String>, details: impl Into<String>) -> Self {
        CaptureError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for radio errors.
    pub fn radio(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        CaptureError::Radio { operation: operation.into(), reason: reason.into() }
    }

    /// Helper constructor for faulted-session refusals.
    pub fn session_faulted(reason: impl Into<String>) -> Self {
        CaptureError::SessionFaulted { reason: reason.into() }
    }

    /// Helper constructor for provider errors with source.
    pub fn provider_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        CaptureError::Provider { reason: reason.into(), source: Some(source) }
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::Storage { path: PathBuf::from("<unknown>"), source: err }
    }
}

impl From<serde_yaml_ng::Error> for CaptureError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        CaptureError::Config { field: "<document>".to_string(), details: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn error_messages_carry_their_context(
            reason in ".*",
            field in "\\w+",
            base in "[a-z]{1,8}",
            attempts in 1u32..100_000u32,
        ) {
            let media = CaptureError::media_absent(reason.clone());
            prop_assert!(media.to_string().contains(&reason));

            let config = CaptureError::config(field.clone(), "bad");
            prop_assert!(config.to_string().contains(&field));

            let names = CaptureError::NoFreeFileName { base: base.clone(), attempts };
            let msg = names.to_string();
            prop_assert!(msg.contains(&base));
            prop_assert!(msg.contains(&attempts.to_string()));
        }

        #[test]
        fn io_errors_convert_to_storage_errors(reason in ".*") {
            let io_err = std::io::Error::new(std::io::ErrorKind::StorageFull, reason.clone());
            let converted: CaptureError = io_err.into();
            match converted {
                CaptureError::Storage { source, .. } => {
                    prop_assert_eq!(source.to_string(), reason);
                }
                _ => prop_assert!(false, "Expected Storage error from io::Error conversion"),
            }
        }
    }

    #[test]
    fn write_error_exposes_source() {
        let err = CaptureError::write_error(
            "/cap.pcap",
            std::io::Error::new(std::io::ErrorKind::Other, "card removed"),
        );
        let source = std::error::Error::source(&err).expect("write error has a source");
        assert_eq!(source.to_string(), "card removed");
        assert!(err.to_string().contains("/cap.pcap"));
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<CaptureError>();
    }

    #[test]
    fn recovery_classification() {
        assert!(CaptureError::media_absent("none").is_recoverable());
        assert!(CaptureError::session_faulted("write").is_recoverable());
        assert!(!CaptureError::config("snaplen", "zero").is_recoverable());
        assert!(!CaptureError::parse("header", "short").is_recoverable());

        for err in [
            CaptureError::media_absent("none"),
            CaptureError::config("snaplen", "zero"),
            CaptureError::radio("set_channel", "busy"),
        ] {
            let suggestions = err.recovery_suggestions();
            assert!(!suggestions.is_empty());
            assert!(suggestions.iter().all(|s| s.len() > 5));
        }
    }

    #[test]
    fn yaml_errors_become_config_errors() {
        let err = serde_yaml_ng::from_str::<u32>("[not a number").unwrap_err();
        let converted: CaptureError = err.into();
        assert!(matches!(converted, CaptureError::Config { .. }));
    }
}
