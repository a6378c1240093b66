//! In-memory storage with fault injection
//!
//! Behaves like a card that can be filled, pulled out or made to fail
//! writes on demand. Clones share the same files, so a test can keep one
//! handle while the session owns another.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::StorageBackend;
use crate::types::{CardKind, MediaInfo};
use crate::{CaptureError, Result};

#[derive(Debug, Default)]
struct MemoryFile {
    data: Vec<u8>,
    open: bool,
}

#[derive(Debug)]
struct MemoryCard {
    files: BTreeMap<PathBuf, MemoryFile>,
    media: Option<MediaInfo>,
    capacity: Option<usize>,
    fail_writes: bool,
    fail_creates: bool,
}

impl MemoryCard {
    fn used(&self) -> usize {
        self.files.values().map(|f| f.data.len()).sum()
    }
}

#[derive(Debug, Clone)]
pub struct MemoryStorage {
    card: Arc<Mutex<MemoryCard>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// An empty, mounted card of unknown type and unbounded capacity.
    pub fn new() -> Self {
        Self {
            card: Arc::new(Mutex::new(MemoryCard {
                files: BTreeMap::new(),
                media: Some(MediaInfo { kind: CardKind::Sdhc, size_bytes: 0 }),
                capacity: None,
                fail_writes: false,
                fail_creates: false,
            })),
        }
    }

    fn card(&self) -> MutexGuard<'_, MemoryCard> {
        self.card.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_media(self, media: MediaInfo) -> Self {
        self.card().media = Some(media);
        self
    }

    /// Simulate pulling the card: creates and writes fail from now on.
    pub fn eject(&self) {
        self.card().media = None;
    }

    pub fn insert(&self, media: MediaInfo) {
        self.card().media = Some(media);
    }

    /// Total bytes the card holds before writes fail with `StorageFull`.
    pub fn set_capacity(&self, bytes: Option<usize>) {
        self.card().capacity = bytes;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.card().fail_writes = fail;
    }

    pub fn set_fail_creates(&self, fail: bool) {
        self.card().fail_creates = fail;
    }

    /// Place a pre-existing closed file on the card.
    pub fn add_file(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        self.card().files.insert(path.into(), MemoryFile { data: data.into(), open: false });
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.card().files.get(path.as_ref()).map(|f| f.data.clone())
    }

    /// All file names, sorted.
    pub fn file_names(&self) -> Vec<PathBuf> {
        self.card().files.keys().cloned().collect()
    }

    /// Files created and not yet closed.
    pub fn open_files(&self) -> Vec<PathBuf> {
        self.card().files.iter().filter(|(_, f)| f.open).map(|(p, _)| p.clone()).collect()
    }
}

impl StorageBackend for MemoryStorage {
    type Writer = MemoryWriter;

    fn media(&self) -> Result<MediaInfo> {
        self.card().media.ok_or_else(|| CaptureError::media_absent("No SD card attached"))
    }

    fn exists(&self, path: &Path) -> bool {
        self.card().files.contains_key(path)
    }

    fn create(&mut self, path: &Path) -> io::Result<Self::Writer> {
        let mut card = self.card();
        if card.media.is_none() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "card removed"));
        }
        if card.fail_creates {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "create refused"));
        }
        if card.files.contains_key(path) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "file exists"));
        }
        card.files.insert(path.to_path_buf(), MemoryFile { data: Vec::new(), open: true });
        Ok(MemoryWriter { path: path.to_path_buf(), card: Arc::clone(&self.card) })
    }

    fn close(&mut self, mut writer: Self::Writer) -> io::Result<()> {
        let flushed = writer.flush();
        // The handle is released even when the final flush fails.
        if let Some(file) = self.card().files.get_mut(&writer.path) {
            file.open = false;
        }
        flushed
    }
}

/// Handle to one open in-memory file.
#[derive(Debug)]
pub struct MemoryWriter {
    path: PathBuf,
    card: Arc<Mutex<MemoryCard>>,
}

impl MemoryWriter {
    fn check(card: &MemoryCard) -> io::Result<()> {
        if card.media.is_none() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "card removed"));
        }
        if card.fail_writes {
            return Err(io::Error::other("injected write failure"));
        }
        Ok(())
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut card = self.card.lock().unwrap_or_else(PoisonError::into_inner);
        Self::check(&card)?;

        if let Some(capacity) = card.capacity {
            if card.used() + buf.len() > capacity {
                return Err(io::Error::new(io::ErrorKind::StorageFull, "card full"));
            }
        }

        let file = card
            .files
            .get_mut(&self.path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file deleted"))?;
        file.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let card = self.card.lock().unwrap_or_else(PoisonError::into_inner);
        Self::check(&card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_files() {
        let storage = MemoryStorage::new();
        let mut owned = storage.clone();

        let mut writer = owned.create(Path::new("a.pcap")).unwrap();
        writer.write_all(b"abc").unwrap();
        assert_eq!(storage.open_files(), vec![PathBuf::from("a.pcap")]);

        owned.close(writer).unwrap();
        assert!(storage.open_files().is_empty());
        assert_eq!(storage.contents("a.pcap").unwrap(), b"abc");
    }

    #[test]
    fn refuses_to_overwrite() {
        let mut storage = MemoryStorage::new();
        storage.add_file("a.pcap", b"old".to_vec());
        let err = storage.create(Path::new("a.pcap")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn capacity_limits_writes() {
        let mut storage = MemoryStorage::new();
        storage.set_capacity(Some(4));
        let mut writer = storage.create(Path::new("a.pcap")).unwrap();
        writer.write_all(b"1234").unwrap();
        let err = writer.write_all(b"5").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::StorageFull);
    }

    #[test]
    fn ejected_card_fails_everything() {
        let mut storage = MemoryStorage::new();
        let mut writer = storage.create(Path::new("a.pcap")).unwrap();
        storage.eject();

        assert!(storage.media().is_err());
        assert!(writer.write_all(b"x").is_err());
        assert!(writer.flush().is_err());
        assert!(storage.create(Path::new("b.pcap")).is_err());
    }

    #[test]
    fn injected_failures() {
        let mut storage = MemoryStorage::new();
        storage.set_fail_creates(true);
        assert!(storage.create(Path::new("a.pcap")).is_err());

        storage.set_fail_creates(false);
        let mut writer = storage.create(Path::new("a.pcap")).unwrap();
        storage.set_fail_writes(true);
        assert!(writer.write_all(b"x").is_err());
    }
}
