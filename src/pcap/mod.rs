//! pcap container format
//!
//! Encoding of capture records (used by the session on every frame) and a
//! reader for files already on the card.

pub mod format;
pub mod reader;

pub use format::{
    ByteOrder, DEFAULT_SNAPLEN, GLOBAL_HEADER_SIZE, GlobalHeader, LINKTYPE_IEEE802_11, PCAP_MAGIC,
    RECORD_HEADER_SIZE, RecordHeader, encode_record, write_record,
};
pub use reader::{PcapReader, PcapRecord};
