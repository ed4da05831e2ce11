use crate::telemetry::LogManager;
use std::fmt;

/// Width of one fixed-layout little-endian device record.
pub const RECORD_WIDTH: usize = 36;

pub const KIND_ACCELEROMETER: u8 = 218;
pub const KIND_MAGNETOMETER: u8 = 219;
pub const KIND_GPS: u8 = 220;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum RecordError {
    #[error("record {index}: expected {} bytes, got {len}", RECORD_WIDTH)]
    Truncated { index: usize, len: usize },
    #[error("record {index}: non-finite value in {kind} payload")]
    NonFinite { index: usize, kind: &'static str },
}

/// Fields common to every record type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordHeader {
    pub index: usize,
    pub marker: u8,
    pub kind: u8,
    pub channel: u8,
    pub subtype: u8,
    pub timestamp: u32,
}

/// One decoded device record, keyed by the discriminant byte.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    Magnetometer {
        header: RecordHeader,
        field: [f64; 3],
        temperature: f32,
    },
    Accelerometer {
        header: RecordHeader,
        acceleration: [f64; 3],
        temperature: f32,
    },
    Gps {
        header: RecordHeader,
        latitude: f64,
        longitude: f64,
        altitude: f64,
        /// Time of day as `hhmmss.sss`.
        gps_time: f32,
    },
    Generic {
        header: RecordHeader,
        payload: [u8; 28],
    },
}

impl RawRecord {
    pub fn header(&self) -> &RecordHeader {
        match self {
            RawRecord::Magnetometer { header, .. }
            | RawRecord::Accelerometer { header, .. }
            | RawRecord::Gps { header, .. }
            | RawRecord::Generic { header, .. } => header,
        }
    }

    pub fn timestamp(&self) -> i64 {
        i64::from(self.header().timestamp)
    }
}

impl fmt::Display for RawRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = self.header();
        let name = match h.kind {
            KIND_ACCELEROMETER => "ACC".to_string(),
            KIND_MAGNETOMETER => "MAG".to_string(),
            KIND_GPS => "GPS".to_string(),
            other => other.to_string(),
        };
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            h.marker, name, h.channel, h.subtype, h.timestamp
        )?;
        match self {
            RawRecord::Magnetometer {
                field, temperature, ..
            } => write!(
                f,
                "\t{}\t{}\t{}\t{}",
                field[0], field[1], field[2], temperature
            ),
            RawRecord::Accelerometer {
                acceleration,
                temperature,
                ..
            } => write!(
                f,
                "\t{}\t{}\t{}\t{}",
                acceleration[0], acceleration[1], acceleration[2], temperature
            ),
            RawRecord::Gps {
                latitude,
                longitude,
                altitude,
                gps_time,
                ..
            } => write!(f, "\t{}\t{}\t{}\t{}", latitude, longitude, altitude, gps_time),
            RawRecord::Generic { .. } => Ok(()),
        }
    }
}

type Decoder = fn(RecordHeader, &[u8; RECORD_WIDTH]) -> Result<RawRecord, RecordError>;

/// Discriminant → decoder; anything else decodes as `Generic`.
const DECODERS: [(u8, Decoder); 3] = [
    (KIND_ACCELEROMETER, decode_accelerometer),
    (KIND_MAGNETOMETER, decode_magnetometer),
    (KIND_GPS, decode_gps),
];

fn read_u32(bytes: &[u8; RECORD_WIDTH], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn read_f32(bytes: &[u8; RECORD_WIDTH], offset: usize) -> f32 {
    f32::from_bits(read_u32(bytes, offset))
}

fn read_f64(bytes: &[u8; RECORD_WIDTH], offset: usize) -> f64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    f64::from_le_bytes(raw)
}

fn read_triple(
    header: &RecordHeader,
    bytes: &[u8; RECORD_WIDTH],
    kind: &'static str,
) -> Result<[f64; 3], RecordError> {
    let values = [read_f64(bytes, 8), read_f64(bytes, 16), read_f64(bytes, 24)];
    if values.iter().all(|v| v.is_finite()) {
        Ok(values)
    } else {
        Err(RecordError::NonFinite {
            index: header.index,
            kind,
        })
    }
}

fn decode_magnetometer(
    header: RecordHeader,
    bytes: &[u8; RECORD_WIDTH],
) -> Result<RawRecord, RecordError> {
    let field = read_triple(&header, bytes, "magnetometer")?;
    Ok(RawRecord::Magnetometer {
        header,
        field,
        temperature: read_f32(bytes, 32),
    })
}

fn decode_accelerometer(
    header: RecordHeader,
    bytes: &[u8; RECORD_WIDTH],
) -> Result<RawRecord, RecordError> {
    let acceleration = read_triple(&header, bytes, "accelerometer")?;
    Ok(RawRecord::Accelerometer {
        header,
        acceleration,
        temperature: read_f32(bytes, 32),
    })
}

fn decode_gps(header: RecordHeader, bytes: &[u8; RECORD_WIDTH]) -> Result<RawRecord, RecordError> {
    let [latitude, longitude, altitude] = read_triple(&header, bytes, "gps")?;
    Ok(RawRecord::Gps {
        header,
        latitude,
        longitude,
        altitude,
        gps_time: read_f32(bytes, 32),
    })
}

fn decode_generic(header: RecordHeader, bytes: &[u8; RECORD_WIDTH]) -> RawRecord {
    let mut payload = [0u8; 28];
    payload.copy_from_slice(&bytes[8..]);
    RawRecord::Generic { header, payload }
}

/// Decodes record number `index` from exactly one record's bytes.
pub fn decode_record(index: usize, bytes: &[u8]) -> Result<RawRecord, RecordError> {
    let bytes: &[u8; RECORD_WIDTH] = bytes.try_into().map_err(|_| RecordError::Truncated {
        index,
        len: bytes.len(),
    })?;
    let header = RecordHeader {
        index,
        marker: bytes[0],
        kind: bytes[1],
        channel: bytes[2],
        subtype: bytes[3],
        timestamp: read_u32(bytes, 4),
    };
    match DECODERS.iter().find(|(kind, _)| *kind == header.kind) {
        Some((_, decode)) => decode(header, bytes),
        None => Ok(decode_generic(header, bytes)),
    }
}

/// Records that decoded plus bookkeeping on what was dropped.
#[derive(Debug, Clone, Default)]
pub struct DecodeReport {
    pub records: Vec<RawRecord>,
    pub skipped: usize,
    pub trailing_bytes: usize,
}

/// Decodes a whole dump. Bad records are skipped; a partial trailing record
/// is discarded.
pub fn decode_records(data: &[u8], log: &LogManager) -> DecodeReport {
    let chunks = data.chunks_exact(RECORD_WIDTH);
    let trailing_bytes = chunks.remainder().len();
    let mut report = DecodeReport {
        records: Vec::with_capacity(data.len() / RECORD_WIDTH),
        skipped: 0,
        trailing_bytes,
    };

    for (index, chunk) in chunks.enumerate() {
        match decode_record(index, chunk) {
            Ok(record) => report.records.push(record),
            Err(err) => {
                log.warn(&format!("skipping record: {}", err));
                report.skipped += 1;
            }
        }
    }

    if trailing_bytes > 0 {
        log.warn(&format!("discarding {} trailing bytes", trailing_bytes));
    }
    log.record(&format!(
        "decoded {} records ({} skipped)",
        report.records.len(),
        report.skipped
    ));
    report
}

/// Encodes a record into its 36-byte layout.
pub fn encode_record(record: &RawRecord) -> [u8; RECORD_WIDTH] {
    let mut bytes = [0u8; RECORD_WIDTH];
    let h = record.header();
    bytes[0] = h.marker;
    bytes[1] = h.kind;
    bytes[2] = h.channel;
    bytes[3] = h.subtype;
    bytes[4..8].copy_from_slice(&h.timestamp.to_le_bytes());

    let payload = match record {
        RawRecord::Magnetometer {
            field, temperature, ..
        } => Some((*field, *temperature)),
        RawRecord::Accelerometer {
            acceleration,
            temperature,
            ..
        } => Some((*acceleration, *temperature)),
        RawRecord::Gps {
            latitude,
            longitude,
            altitude,
            gps_time,
            ..
        } => Some(([*latitude, *longitude, *altitude], *gps_time)),
        RawRecord::Generic { payload, .. } => {
            bytes[8..].copy_from_slice(payload);
            None
        }
    };
    if let Some((values, tail)) = payload {
        for (i, v) in values.iter().enumerate() {
            bytes[8 + i * 8..16 + i * 8].copy_from_slice(&v.to_le_bytes());
        }
        bytes[32..36].copy_from_slice(&tail.to_le_bytes());
    }
    bytes
}
