//! Capture configuration
//!
//! Everything is fixed at startup. Defaults match the appliance firmware:
//! a new `esp32*.pcap` file every 30 seconds, hopping channels 1 to 11 every
//! 214 ms.
//!
//! ```rust
//! use airsniff::CaptureConfig;
//!
//! let config = CaptureConfig::from_yaml_str("base_name: cap\nrotation_budget_secs: 60\n").unwrap();
//! assert_eq!(config.base_name, "cap");
//! assert_eq!(config.rotation_budget_secs, 60);
//! assert_eq!(config.max_channel.number(), 11);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::pcap::ByteOrder;
use crate::pcap::format::DEFAULT_SNAPLEN;
use crate::types::Channel;
use crate::{CaptureError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureConfig {
    /// File name stem; files are `<base>.pcap`, `<base>_0.pcap`, ...
    pub base_name: String,
    /// Seconds a file stays open; rotation happens once this is exceeded.
    pub rotation_budget_secs: u32,
    /// Ticks between drains of buffered records to storage.
    pub flush_interval_secs: u32,
    /// Channel tuned at startup.
    pub channel: Channel,
    /// Whether to cycle channels at all.
    pub channel_hopping: bool,
    /// Highest channel in the hop cycle; the cycle always starts at 1.
    pub max_channel: Channel,
    pub hop_interval_ms: u64,
    /// Largest frame accepted; also written to the file header.
    pub snaplen: u32,
    pub byte_order: ByteOrder,
    /// Length of one session tick. Anything other than 1000 is for tests.
    pub tick_interval_ms: u64,
    /// Lines kept by the scrolling status log.
    pub scroll_lines: usize,
    /// Upper bound on numbered suffixes tried when looking for a free name.
    pub max_probe: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            base_name: "esp32".to_string(),
            rotation_budget_secs: 30,
            flush_interval_secs: 1,
            channel: Channel::FIRST,
            channel_hopping: true,
            max_channel: Channel::new(11).unwrap_or(Channel::FIRST),
            hop_interval_ms: 214,
            snaplen: DEFAULT_SNAPLEN,
            byte_order: ByteOrder::Little,
            tick_interval_ms: 1000,
            scroll_lines: 19,
            max_probe: 10_000,
        }
    }
}

impl CaptureConfig {
    /// Parse and validate a YAML document; absent fields take defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: CaptureConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        debug!(?config, "Loaded capture configuration");
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let yaml = std::fs::read_to_string(&path)
            .map_err(|e| CaptureError::storage_error(path.as_ref(), e))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_name.is_empty() {
            return Err(CaptureError::config("base_name", "cannot be empty"));
        }

        if self.base_name.contains(['/', '\\']) {
            return Err(CaptureError::config(
                "base_name",
                format!("'{}' must not contain path separators", self.base_name),
            ));
        }

        if self.rotation_budget_secs == 0 {
            return Err(CaptureError::config("rotation_budget_secs", "must be at least 1"));
        }

        if self.flush_interval_secs == 0 {
            return Err(CaptureError::config("flush_interval_secs", "must be at least 1"));
        }

        if self.hop_interval_ms == 0 {
            return Err(CaptureError::config("hop_interval_ms", "must be at least 1"));
        }

        if self.tick_interval_ms == 0 {
            return Err(CaptureError::config("tick_interval_ms", "must be at least 1"));
        }

        if self.channel > self.max_channel {
            return Err(CaptureError::config(
                "channel",
                format!("start channel {} is above max_channel {}", self.channel, self.max_channel),
            ));
        }

        if self.snaplen == 0 {
            return Err(CaptureError::config("snaplen", "must be at least 1"));
        }

        if self.max_probe == 0 {
            return Err(CaptureError::config("max_probe", "must be at least 1"));
        }

        Ok(())
    }

    pub fn hop_interval(&self) -> Duration {
        Duration::from_millis(self.hop_interval_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_firmware() {
        let config = CaptureConfig::default();
        assert_eq!(config.base_name, "esp32");
        assert_eq!(config.rotation_budget_secs, 30);
        assert_eq!(config.hop_interval(), Duration::from_millis(214));
        assert_eq!(config.max_channel.number(), 11);
        assert!(config.channel_hopping);
        config.validate().unwrap();
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = CaptureConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, CaptureConfig::default());
    }

    #[test]
    fn yaml_overrides_fields() {
        let yaml = "base_name: cap\nmax_channel: 13\nbyte_order: big\nchannel_hopping: false\n";
        let config = CaptureConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.base_name, "cap");
        assert_eq!(config.max_channel.number(), 13);
        assert_eq!(config.byte_order, ByteOrder::Big);
        assert!(!config.channel_hopping);
    }

    #[test]
    fn rejects_invalid_values() {
        for yaml in [
            "base_name: ''",
            "base_name: a/b",
            "rotation_budget_secs: 0",
            "flush_interval_secs: 0",
            "hop_interval_ms: 0",
            "snaplen: 0",
            "channel: 12\nmax_channel: 11",
            "max_channel: 15",
            "unknown_field: 1",
        ] {
            let err = CaptureConfig::from_yaml_str(yaml).unwrap_err();
            assert!(matches!(err, CaptureError::Config { .. }), "{yaml}: {err}");
        }
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "base_name: field\nhop_interval_ms: 500").unwrap();
        let config = CaptureConfig::from_file(file.path()).unwrap();
        assert_eq!(config.base_name, "field");
        assert_eq!(config.hop_interval_ms, 500);
    }
}
