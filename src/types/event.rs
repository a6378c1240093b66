//! Lifecycle events surfaced to the status display

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Channel;

/// Kind of removable card reported by the storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardKind {
    Mmc,
    Sdsc,
    Sdhc,
    Unknown,
}

impl fmt::Display for CardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CardKind::Mmc => "MMC",
            CardKind::Sdsc => "SDSC",
            CardKind::Sdhc => "SDHC",
            CardKind::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Mounted media description, reported once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub kind: CardKind,
    pub size_bytes: u64,
}

impl MediaInfo {
    pub fn size_mb(&self) -> u64 {
        self.size_bytes / (1024 * 1024)
    }
}

/// Fire-and-forget notification for the status reporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum StatusEvent {
    /// Card found and mounted at startup.
    CardDetected { kind: CardKind, size_mb: u64 },
    /// Radio is in promiscuous mode and capture has begun.
    CaptureStarted { channel: Channel },
    /// A new capture file was created and its header written.
    FileOpened { path: String },
    /// A capture file was flushed and closed.
    FileSaved { path: String },
    /// A write or flush to the open file failed; the session is faulted.
    CaptureFault { reason: String },
    /// The card is missing, full or refused to create a file.
    CardError { reason: String },
}

impl StatusEvent {
    /// Whether this event signals a fault.
    pub fn is_error(&self) -> bool {
        matches!(self, StatusEvent::CaptureFault { .. } | StatusEvent::CardError { .. })
    }

    /// Short line for the scrolling display.
    pub fn display_line(&self) -> String {
        match self {
            StatusEvent::CardDetected { kind, size_mb } => {
                format!("Card Type: {} {}MB", kind, size_mb)
            }
            StatusEvent::CaptureStarted { channel } => format!("Sniffer started! ch{}", channel),
            StatusEvent::FileOpened { path } => format!("o:{}", path),
            StatusEvent::FileSaved { path } => format!("s:{}", path),
            StatusEvent::CaptureFault { reason } => format!("fault:{}", reason),
            StatusEvent::CardError { reason } => reason.clone(),
        }
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::CardDetected { kind, size_mb } => {
                write!(f, "card detected: {} ({} MB)", kind, size_mb)
            }
            StatusEvent::CaptureStarted { channel } => {
                write!(f, "capture started on channel {}", channel)
            }
            StatusEvent::FileOpened { path } => write!(f, "file opened: {}", path),
            StatusEvent::FileSaved { path } => write!(f, "file saved: {}", path),
            StatusEvent::CaptureFault { reason } => write!(f, "capture fault: {}", reason),
            StatusEvent::CardError { reason } => write!(f, "card error: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lines_match_appliance_format() {
        let opened = StatusEvent::FileOpened { path: "/esp32_3.pcap".to_string() };
        let saved = StatusEvent::FileSaved { path: "/esp32_3.pcap".to_string() };
        assert_eq!(opened.display_line(), "o:/esp32_3.pcap");
        assert_eq!(saved.display_line(), "s:/esp32_3.pcap");

        let card = StatusEvent::CardDetected { kind: CardKind::Sdhc, size_mb: 7580 };
        assert_eq!(card.display_line(), "Card Type: SDHC 7580MB");
    }

    #[test]
    fn error_classification() {
        assert!(StatusEvent::CardError { reason: "full".into() }.is_error());
        assert!(StatusEvent::CaptureFault { reason: "io".into() }.is_error());
        assert!(!StatusEvent::FileSaved { path: "a".into() }.is_error());
    }

    #[test]
    fn serializes_with_kebab_tag() {
        let yaml =
            serde_yaml_ng::to_string(&StatusEvent::FileOpened { path: "cap.pcap".into() }).unwrap();
        assert!(yaml.contains("event: file-opened"));
        assert!(yaml.contains("path: cap.pcap"));
    }

    #[test]
    fn media_size_in_megabytes() {
        let info = MediaInfo { kind: CardKind::Sdsc, size_bytes: 3 * 1024 * 1024 + 17 };
        assert_eq!(info.size_mb(), 3);
    }
}
