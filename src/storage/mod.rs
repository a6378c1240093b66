//! Storage backends for capture files
//!
//! The session only needs a handful of filesystem operations: check the
//! card, test whether a name is taken, create a file that must not already
//! exist, append, flush and close. Mounting and card detection belong to the
//! platform; a backend just reports what it sees.

mod directory;
mod memory;

pub use directory::DirectoryStorage;
pub use memory::{MemoryStorage, MemoryWriter};

use std::io::{self, Write};
use std::path::Path;

use crate::Result;
use crate::types::MediaInfo;

/// Filesystem surface used by [`crate::CaptureSession`].
///
/// Paths are relative to the backend's root; the session never creates
/// subdirectories.
pub trait StorageBackend: Send + 'static {
    /// Open file handle; `write` appends, `flush` makes data durable.
    type Writer: Write + Send + 'static;

    /// Describe the mounted media, or fail with [`crate::CaptureError::MediaAbsent`].
    fn media(&self) -> Result<MediaInfo>;

    fn exists(&self, path: &Path) -> bool;

    /// Create a new file. Must fail rather than truncate an existing file.
    fn create(&mut self, path: &Path) -> io::Result<Self::Writer>;

    /// Final flush and release of a writer.
    fn close(&mut self, writer: Self::Writer) -> io::Result<()>;
}
