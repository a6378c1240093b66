//! Capture file reader
//!
//! Reads classic pcap files back into records. Used to verify what the
//! session wrote and to feed the replay provider.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use airsniff::pcap::PcapReader;
//!
//! fn dump() -> airsniff::Result<()> {
//!     let mut reader = PcapReader::open("esp32_0.pcap")?;
//!     println!("{} records, snaplen {}", reader.total_records(), reader.header().snaplen);
//!
//!     while let Some(record) = reader.read_next_record()? {
//!         println!("{}.{:06} {} bytes",
//!             record.timestamp.seconds(),
//!             record.timestamp.micros(),
//!             record.data.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! The whole file is loaded at construction. A partial record at the end of
//! the file (power lost between flushes) is logged and ignored.

use super::format::{GLOBAL_HEADER_SIZE, GlobalHeader, RECORD_HEADER_SIZE, RecordHeader};
use crate::types::Timestamp;
use crate::{CaptureError, Result};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One record read back from a capture file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcapRecord {
    pub timestamp: Timestamp,
    pub orig_len: u32,
    pub data: Vec<u8>,
}

/// Sequential reader over an in-memory capture file.
pub struct PcapReader {
    data: Vec<u8>,
    path: PathBuf,
    header: GlobalHeader,
    current_position: usize,
    current_record: usize,
    total_records: usize,
    truncated_tail: usize,
}

impl PcapReader {
    /// Open a capture file for reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(&path)
            .map_err(|e| CaptureError::storage_error(path.as_ref(), e))?;

        let mut data = Vec::new();
        file.read_to_end(&mut data).map_err(|e| CaptureError::storage_error(path.as_ref(), e))?;

        Self::from_bytes_with_path(data, path.as_ref().to_path_buf())
    }

    /// Create a reader over bytes already in memory
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Result<Self> {
        Self::from_bytes_with_path(data.into(), PathBuf::from("<memory>"))
    }

    fn from_bytes_with_path(data: Vec<u8>, path: PathBuf) -> Result<Self> {
        let header = GlobalHeader::parse(&data)?;
        header.validate()?;

        let (total_records, complete_end) = scan_records(&data, &header)?;
        let truncated_tail = data.len() - complete_end;
        if truncated_tail > 0 {
            warn!(
                "{}: ignoring {} trailing bytes of an incomplete record",
                path.display(),
                truncated_tail
            );
        }

        debug!("Opened capture {} with {} records", path.display(), total_records);

        Ok(Self {
            data,
            path,
            header,
            current_position: GLOBAL_HEADER_SIZE,
            current_record: 0,
            total_records,
            truncated_tail,
        })
    }

    pub fn header(&self) -> &GlobalHeader {
        &self.header
    }

    /// Number of complete records in the file
    pub fn total_records(&self) -> usize {
        self.total_records
    }

    pub fn current_record(&self) -> usize {
        self.current_record
    }

    /// Bytes of an incomplete final record, 0 for a cleanly closed file
    pub fn truncated_tail(&self) -> usize {
        self.truncated_tail
    }

    pub fn file_path(&self) -> &Path {
        &self.path
    }

    /// Restart reading from the first record
    pub fn rewind(&mut self) {
        self.current_position = GLOBAL_HEADER_SIZE;
        self.current_record = 0;
    }

    /// Read the next record, or `None` past the last complete one
    pub fn read_next_record(&mut self) -> Result<Option<PcapRecord>> {
        if self.current_record >= self.total_records {
            return Ok(None);
        }

        let order = self.header.byte_order;
        let record_header = RecordHeader::parse(&self.data[self.current_position..], order)?;
        let start = self.current_position + RECORD_HEADER_SIZE;
        let end = start + record_header.incl_len as usize;

        let data = self.data.get(start..end).ok_or_else(|| {
            CaptureError::parse(
                "Record reading",
                format!(
                    "Record {} extends beyond data bounds ({} > {})",
                    self.current_record,
                    end,
                    self.data.len()
                ),
            )
        })?;

        let record = PcapRecord {
            timestamp: Timestamp::new(record_header.ts_sec, record_header.ts_usec),
            orig_len: record_header.orig_len,
            data: data.to_vec(),
        };

        self.current_record += 1;
        self.current_position = end;

        Ok(Some(record))
    }

    /// Read every remaining record
    pub fn read_all(&mut self) -> Result<Vec<PcapRecord>> {
        let mut records = Vec::with_capacity(self.total_records - self.current_record);
        while let Some(record) = self.read_next_record()? {
            records.push(record);
        }
        Ok(records)
    }
}

/// Walk the record headers, returning the complete record count and where
/// the last complete record ends.
fn scan_records(data: &[u8], header: &GlobalHeader) -> Result<(usize, usize)> {
    let mut position = GLOBAL_HEADER_SIZE;
    let mut count = 0usize;

    while position + RECORD_HEADER_SIZE <= data.len() {
        let record = RecordHeader::parse(&data[position..], header.byte_order)?;

        if record.ts_usec >= 1_000_000 {
            return Err(CaptureError::parse(
                "Record validation",
                format!("Record {} has microseconds {} out of range", count, record.ts_usec),
            ));
        }

        if record.incl_len > header.snaplen {
            return Err(CaptureError::parse(
                "Record validation",
                format!(
                    "Record {} length {} exceeds snapshot length {}",
                    count, record.incl_len, header.snaplen
                ),
            ));
        }

        let end = position + RECORD_HEADER_SIZE + record.incl_len as usize;
        if end > data.len() {
            break;
        }

        position = end;
        count += 1;
    }

    Ok((count, position))
}
