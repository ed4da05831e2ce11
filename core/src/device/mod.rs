//! Device dump decoding and row combination.

pub mod combine;
pub mod record;

pub use combine::combine_records;
pub use record::{decode_record, decode_records, encode_record, DecodeReport, RawRecord, RecordError, RecordHeader};
