//! Capture files in a mounted directory

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::StorageBackend;
use crate::types::{CardKind, MediaInfo};
use crate::{CaptureError, Result};

/// Writes capture files under a root directory, typically the card's mount point.
#[derive(Debug, Clone)]
pub struct DirectoryStorage {
    root: PathBuf,
    media: MediaInfo,
}

impl DirectoryStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), media: MediaInfo { kind: CardKind::Unknown, size_bytes: 0 } }
    }

    /// Card type and size as reported by the platform's mount layer.
    pub fn with_media_info(mut self, media: MediaInfo) -> Self {
        self.media = media;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl StorageBackend for DirectoryStorage {
    type Writer = BufWriter<File>;

    fn media(&self) -> Result<MediaInfo> {
        match std::fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => Ok(self.media),
            Ok(_) => Err(CaptureError::media_absent(format!(
                "{} is not a directory",
                self.root.display()
            ))),
            Err(e) => Err(CaptureError::media_absent(format!(
                "Card Mount Failed: {}: {}",
                self.root.display(),
                e
            ))),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.root.join(path).exists()
    }

    fn create(&mut self, path: &Path) -> io::Result<Self::Writer> {
        let full = self.root.join(path);
        debug!("Creating {}", full.display());
        let file = OpenOptions::new().write(true).create_new(true).open(full)?;
        Ok(BufWriter::new(file))
    }

    fn close(&mut self, writer: Self::Writer) -> io::Result<()> {
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    }
}
