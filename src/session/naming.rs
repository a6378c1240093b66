//! Collision-free capture file names

use std::path::PathBuf;
use tracing::debug;

use crate::storage::StorageBackend;
use crate::{CaptureError, Result};

pub const CAPTURE_EXTENSION: &str = "pcap";

/// `base.pcap` for `None`, `base_<n>.pcap` for `Some(n)`.
pub fn candidate_name(base: &str, index: Option<u32>) -> PathBuf {
    match index {
        None => PathBuf::from(format!("{}.{}", base, CAPTURE_EXTENSION)),
        Some(n) => PathBuf::from(format!("{}_{}.{}", base, n, CAPTURE_EXTENSION)),
    }
}

/// First name in `base.pcap`, `base_0.pcap`, `base_1.pcap`, ... that does not exist.
///
/// Gives up after `max_probe` numbered names.
pub fn next_free_path<S: StorageBackend>(storage: &S, base: &str, max_probe: u32) -> Result<PathBuf> {
    let plain = candidate_name(base, None);
    if !storage.exists(&plain) {
        return Ok(plain);
    }

    for n in 0..max_probe {
        let candidate = candidate_name(base, Some(n));
        if !storage.exists(&candidate) {
            debug!("Probed {} names before {}", n + 1, candidate.display());
            return Ok(candidate);
        }
    }

    Err(CaptureError::NoFreeFileName { base: base.to_string(), attempts: max_probe + 1 })
}
