//! Classic pcap file structures and record encoding
//!
//! ## File Structure
//!
//! 1. **Global Header** (24 bytes) - magic, version, snapshot length, link type
//! 2. **Records** - a 16-byte record header followed by the captured bytes
//!
//! All multi-byte fields use one byte order for the whole file. The magic
//! number is written in that order, so readers detect it from the first four
//! bytes.
//!
//! Useful references:
//! * https://wiki.wireshark.org/Development/LibpcapFileFormat
//! * https://www.tcpdump.org/linktypes.html

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::types::CapturedFrame;
use crate::{CaptureError, Result};

/// Microsecond-resolution pcap magic.
pub const PCAP_MAGIC: u32 = 0xa1b2_c3d4;
/// Nanosecond-resolution magic, recognised only to reject it clearly.
const PCAP_MAGIC_NANOS: u32 = 0xa1b2_3c4d;
pub const VERSION_MAJOR: u16 = 2;
pub const VERSION_MINOR: u16 = 4;
/// `LINKTYPE_IEEE802_11`: raw 802.11 frames without radiotap.
pub const LINKTYPE_IEEE802_11: u32 = 105;
pub const GLOBAL_HEADER_SIZE: usize = 24;
pub const RECORD_HEADER_SIZE: usize = 16;
/// Largest frame the ESP32 promiscuous callback hands over, rounded up.
pub const DEFAULT_SNAPLEN: u32 = 2500;

/// Byte order of every multi-byte field in one capture file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl ByteOrder {
    fn put_u16(self, buf: &mut Vec<u8>, value: u16) {
        match self {
            ByteOrder::Little => buf.extend_from_slice(&value.to_le_bytes()),
            ByteOrder::Big => buf.extend_from_slice(&value.to_be_bytes()),
        }
    }

    fn put_u32(self, buf: &mut Vec<u8>, value: u32) {
        match self {
            ByteOrder::Little => buf.extend_from_slice(&value.to_le_bytes()),
            ByteOrder::Big => buf.extend_from_slice(&value.to_be_bytes()),
        }
    }

    fn read_u16(self, data: &[u8], offset: usize) -> Result<u16> {
        let bytes = field::<2>(data, offset)?;
        Ok(match self {
            ByteOrder::Little => u16::from_le_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
        })
    }

    fn read_u32(self, data: &[u8], offset: usize) -> Result<u32> {
        let bytes = field::<4>(data, offset)?;
        Ok(match self {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        })
    }
}

/// Bounds-checked fixed-size field extraction.
fn field<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N]> {
    data.get(offset..offset + N).and_then(|slice| slice.try_into().ok()).ok_or_else(|| {
        CaptureError::parse(
            "Field parsing",
            format!(
                "Insufficient data for {}-byte field at offset {} (have {})",
                N,
                offset,
                data.len().saturating_sub(offset)
            ),
        )
    })
}

/// pcap global header, written once at the start of each file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalHeader {
    pub version_major: u16,
    pub version_minor: u16,
    pub thiszone: i32,
    pub sigfigs: u32,
    pub snaplen: u32,
    pub network: u32,
    pub byte_order: ByteOrder,
}

impl GlobalHeader {
    /// Header for an 802.11 capture with the given snapshot length.
    pub fn new(snaplen: u32, byte_order: ByteOrder) -> Self {
        Self {
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            thiszone: 0,
            sigfigs: 0,
            snaplen,
            network: LINKTYPE_IEEE802_11,
            byte_order,
        }
    }

    /// Append the 24-byte encoded header to `buf`.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        let order = self.byte_order;
        order.put_u32(buf, PCAP_MAGIC);
        order.put_u16(buf, self.version_major);
        order.put_u16(buf, self.version_minor);
        order.put_u32(buf, self.thiszone as u32);
        order.put_u32(buf, self.sigfigs);
        order.put_u32(buf, self.snaplen);
        order.put_u32(buf, self.network);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(GLOBAL_HEADER_SIZE);
        self.write_to(&mut buf);
        buf
    }

    /// Parse a global header, detecting the byte order from the magic number.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < GLOBAL_HEADER_SIZE {
            return Err(CaptureError::parse(
                "Global header reading",
                format!("Need {} bytes, have {}", GLOBAL_HEADER_SIZE, data.len()),
            ));
        }

        let byte_order = match field::<4>(data, 0)? {
            magic if u32::from_le_bytes(magic) == PCAP_MAGIC => ByteOrder::Little,
            magic if u32::from_be_bytes(magic) == PCAP_MAGIC => ByteOrder::Big,
            magic
                if u32::from_le_bytes(magic) == PCAP_MAGIC_NANOS
                    || u32::from_be_bytes(magic) == PCAP_MAGIC_NANOS =>
            {
                return Err(CaptureError::parse(
                    "Global header magic",
                    "Nanosecond-resolution captures are not supported",
                ));
            }
            magic => {
                return Err(CaptureError::parse(
                    "Global header magic",
                    format!("Unknown magic {:02x?}", magic),
                ));
            }
        };

        let header = Self {
            version_major: byte_order.read_u16(data, 4)?,
            version_minor: byte_order.read_u16(data, 6)?,
            thiszone: byte_order.read_u32(data, 8)? as i32,
            sigfigs: byte_order.read_u32(data, 12)?,
            snaplen: byte_order.read_u32(data, 16)?,
            network: byte_order.read_u32(data, 20)?,
            byte_order,
        };

        trace!(
            "Parsed pcap header: v{}.{}, snaplen={}, network={}, order={:?}",
            header.version_major, header.version_minor, header.snaplen, header.network, byte_order
        );

        Ok(header)
    }

    pub fn validate(&self) -> Result<()> {
        if self.version_major != VERSION_MAJOR {
            return Err(CaptureError::parse(
                "Header validation",
                format!("Unsupported major version {}", self.version_major),
            ));
        }

        if self.snaplen == 0 {
            return Err(CaptureError::parse("Header validation", "Snapshot length cannot be 0"));
        }

        Ok(())
    }
}

/// Per-record header preceding each frame's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub ts_sec: u32,
    pub ts_usec: u32,
    pub incl_len: u32,
    pub orig_len: u32,
}

impl RecordHeader {
    /// Record header for a captured frame. Original length equals captured
    /// length: frames are never truncated.
    pub fn for_frame(frame: &CapturedFrame<'_>) -> Self {
        Self {
            ts_sec: frame.timestamp_seconds(),
            ts_usec: frame.timestamp_micros(),
            incl_len: frame.capture_length(),
            orig_len: frame.capture_length(),
        }
    }

    pub fn write_to(&self, buf: &mut Vec<u8>, order: ByteOrder) {
        order.put_u32(buf, self.ts_sec);
        order.put_u32(buf, self.ts_usec);
        order.put_u32(buf, self.incl_len);
        order.put_u32(buf, self.orig_len);
    }

    pub fn parse(data: &[u8], order: ByteOrder) -> Result<Self> {
        Ok(Self {
            ts_sec: order.read_u32(data, 0)?,
            ts_usec: order.read_u32(data, 4)?,
            incl_len: order.read_u32(data, 8)?,
            orig_len: order.read_u32(data, 12)?,
        })
    }
}

/// Append one encoded record (header + payload) to `buf`.
///
/// Allocates only when `buf` must grow; safe to call from the frame callback.
pub fn write_record(buf: &mut Vec<u8>, frame: &CapturedFrame<'_>, order: ByteOrder) {
    buf.reserve(RECORD_HEADER_SIZE + frame.payload().len());
    RecordHeader::for_frame(frame).write_to(buf, order);
    buf.extend_from_slice(frame.payload());
}

/// Encode one frame as a standalone record.
pub fn encode_record(frame: &CapturedFrame<'_>, order: ByteOrder) -> Vec<u8> {
    let mut buf = Vec::with_capacity(RECORD_HEADER_SIZE + frame.payload().len());
    write_record(&mut buf, frame, order);
    buf
}
