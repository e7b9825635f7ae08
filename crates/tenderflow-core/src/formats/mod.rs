//! # Formats
//!
//! Byte-level encodings. File I/O lives in the binary.

mod persistence;

pub use persistence::{MAX_RECORD_SIZE, RecordHeader, decode_record, encode_record};
