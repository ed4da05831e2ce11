use crate::dataset::{Dataset, Position, Sample, Schema};
use crate::device::record::RawRecord;
use crate::prelude::{StageConfig, StageError, StageResult};
use crate::telemetry::LogManager;

/// Merges the interleaved device records into one sample per
/// channel-1 magnetometer reading.
///
/// The channel-2 reading with the same timestamp must sit within the
/// neighbouring rows; the accelerometer reading is optional unless
/// `require_accelerometer` is set. GPS fixes attach to the sample within
/// the pairing tolerance or, failing that, become position-only samples.
/// Raw timestamps are rebased so the first sample starts at zero.
pub fn combine_records(
    records: &[RawRecord],
    config: &StageConfig,
    log: &LogManager,
) -> StageResult<Dataset> {
    let tolerance = config.pairing_tolerance_ms;
    let mut samples: Vec<Sample> = Vec::new();

    for (i, record) in records.iter().enumerate() {
        let (header, field, temperature) = match record {
            RawRecord::Magnetometer {
                header,
                field,
                temperature,
            } if header.channel == 1 => (header, field, temperature),
            _ => continue,
        };

        let start = i.saturating_sub(config.pairing_lookbehind);
        let end = (start + config.pairing_span).min(records.len());
        let window = &records[start..end];
        let timestamp = i64::from(header.timestamp);

        let second = window.iter().find_map(|r| match r {
            RawRecord::Magnetometer { header: h, field, .. }
                if h.channel == 2 && h.timestamp == header.timestamp =>
            {
                Some(*field)
            }
            _ => None,
        });
        let second = second.ok_or_else(|| StageError::SensorPairing {
            timestamp,
            detail: format!("no channel-2 magnetometer near record {}", header.index),
        })?;

        let acc = window.iter().find_map(|r| match r {
            RawRecord::Accelerometer { acceleration, .. }
                if (r.timestamp() - timestamp).abs() < tolerance =>
            {
                Some(*acceleration)
            }
            _ => None,
        });
        if acc.is_none() && config.require_accelerometer {
            return Err(StageError::SensorPairing {
                timestamp,
                detail: format!("no accelerometer within {} ms", tolerance),
            });
        }

        let mut sample = Sample::at(timestamp);
        sample.mag1 = Some(*field);
        sample.mag2 = Some(second);
        sample.acc = acc;
        sample.temperature = Some(f64::from(*temperature));
        samples.push(sample);
    }

    let standalone = attach_gps(records, &mut samples, tolerance);
    if standalone > 0 {
        log.detail(&format!(
            "{} GPS fixes had no magnetometer sample within {} ms",
            standalone, tolerance
        ));
    }
    samples.sort_by_key(|s| s.timestamp);

    if let Some(first) = samples.first().map(|s| s.timestamp) {
        for sample in samples.iter_mut() {
            sample.timestamp -= first;
        }
    }

    log.record(&format!(
        "combined {} records into {} samples",
        records.len(),
        samples.len()
    ));
    Ok(Dataset::from_samples(Schema::raw(), samples))
}

/// Walks GPS records and combined samples together with one forward
/// pointer. Returns the number of fixes appended as their own samples.
fn attach_gps(records: &[RawRecord], samples: &mut Vec<Sample>, tolerance: i64) -> usize {
    let mut pointer = 0;
    let mut extra = Vec::new();
    let combined = samples.len();

    for record in records {
        let (timestamp, latitude, longitude, altitude, gps_time) = match record {
            RawRecord::Gps {
                latitude,
                longitude,
                altitude,
                gps_time,
                ..
            } => (
                record.timestamp(),
                *latitude,
                *longitude,
                *altitude,
                f64::from(*gps_time),
            ),
            _ => continue,
        };

        while pointer < combined && samples[pointer].timestamp + tolerance < timestamp {
            pointer += 1;
        }

        let target = if pointer < combined
            && (samples[pointer].timestamp - timestamp).abs() <= tolerance
        {
            &mut samples[pointer]
        } else {
            extra.push(Sample::at(timestamp));
            let last = extra.len() - 1;
            &mut extra[last]
        };
        target.position = Position::fix(latitude, longitude, Some(altitude));
        target.gps_time = Some(gps_time);
    }

    let standalone = extra.len();
    samples.extend(extra);
    standalone
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::record::{
        RecordHeader, KIND_ACCELEROMETER, KIND_GPS, KIND_MAGNETOMETER,
    };

    fn header(kind: u8, channel: u8, timestamp: u32) -> RecordHeader {
        RecordHeader {
            index: 0,
            marker: 0,
            kind,
            channel,
            subtype: 0,
            timestamp,
        }
    }

    fn mag(channel: u8, timestamp: u32, field: [f64; 3]) -> RawRecord {
        RawRecord::Magnetometer {
            header: header(KIND_MAGNETOMETER, channel, timestamp),
            field,
            temperature: 20.0,
        }
    }

    fn gps(timestamp: u32, gps_time: f32) -> RawRecord {
        RawRecord::Gps {
            header: header(KIND_GPS, 0, timestamp),
            latitude: 50.0,
            longitude: 30.0,
            altitude: 100.0,
            gps_time,
        }
    }

    fn acc(timestamp: u32) -> RawRecord {
        RawRecord::Accelerometer {
            header: header(KIND_ACCELEROMETER, 0, timestamp),
            acceleration: [0.0, 0.0, 1.0],
            temperature: 20.0,
        }
    }

    #[test]
    fn pairs_channels_and_accelerometer() {
        let records = vec![
            acc(1001),
            mag(1, 1000, [1.0, 2.0, 3.0]),
            mag(2, 1000, [4.0, 5.0, 6.0]),
            mag(1, 1050, [1.0, 2.0, 3.0]),
            mag(2, 1050, [4.0, 5.0, 6.0]),
        ];
        let data = combine_records(&records, &StageConfig::default(), &LogManager::new()).unwrap();

        assert_eq!(data.len(), 2);
        assert_eq!(data.samples[0].timestamp, 0);
        assert_eq!(data.samples[1].timestamp, 50);
        assert_eq!(data.samples[0].mag2, Some([4.0, 5.0, 6.0]));
        assert_eq!(data.samples[0].acc, Some([0.0, 0.0, 1.0]));
        assert_eq!(data.samples[1].acc, None);
    }

    #[test]
    fn missing_second_channel_is_fatal() {
        let records = vec![mag(1, 1000, [1.0, 0.0, 0.0]), mag(2, 1010, [1.0, 0.0, 0.0])];
        let err = combine_records(&records, &StageConfig::default(), &LogManager::new())
            .unwrap_err();
        assert!(matches!(err, StageError::SensorPairing { timestamp: 1000, .. }));
    }

    #[test]
    fn required_accelerometer_is_enforced() {
        let records = vec![mag(1, 1000, [1.0, 0.0, 0.0]), mag(2, 1000, [1.0, 0.0, 0.0])];
        let config = StageConfig {
            require_accelerometer: true,
            ..Default::default()
        };
        assert!(combine_records(&records, &config, &LogManager::new()).is_err());
    }

    #[test]
    fn gps_attaches_within_tolerance_or_stands_alone() {
        let records = vec![
            gps(0, 120000.0),
            mag(1, 200, [100.0, 0.0, 0.0]),
            mag(2, 200, [100.0, 0.0, 0.0]),
            gps(202, 120000.2),
        ];
        let data = combine_records(&records, &StageConfig::default(), &LogManager::new()).unwrap();

        assert_eq!(data.len(), 2);
        assert_eq!(data.samples[0].timestamp, 0);
        assert!(data.samples[0].mag1.is_none());
        assert_eq!(data.samples[0].gps_time, Some(120000.0));
        assert_eq!(data.samples[1].timestamp, 200);
        assert!(data.samples[1].position.has_fix());
    }
}
