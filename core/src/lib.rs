//! Core processing for drone magnetometer surveys.
//!
//! Raw device records are decoded and combined into samples, then carried
//! through a fixed sequence of stages: calibration, time synchronization,
//! optional external GNSS fusion, frequency reduction, trajectory
//! segmentation, attitude estimation, sensor geometry projection,
//! frequency restoration, spatial interpolation and field processing.
//! Every stage implements [`ProcessingStage`] and takes ownership of the
//! dataset it transforms.

pub mod dataset;
pub mod device;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod telemetry;

pub use dataset::{Dataset, Sample, Schema};
pub use prelude::{
    ProcessingStage, StageConfig, StageError, StageInput, StageMetadata, StageOutput, StageResult,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{combine_records, decode_records, encode_record, RawRecord, RecordHeader};
    use crate::device::record::{KIND_GPS, KIND_MAGNETOMETER};
    use crate::processing::time_sync::utc_millis;
    use crate::processing::{TimeReference, TimeSyncStage, TotalFieldStage};
    use crate::telemetry::LogManager;
    use chrono::{NaiveDate, NaiveTime};

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

    #[test]
    fn raw_records_to_timed_total_field() {
        let records = [
            RawRecord::Gps {
                header: header(KIND_GPS, 0, 0),
                latitude: 50.0,
                longitude: 30.0,
                altitude: 0.0,
                gps_time: 120000.0,
            },
            RawRecord::Magnetometer {
                header: header(KIND_MAGNETOMETER, 1, 200),
                field: [100.0, 0.0, 0.0],
                temperature: 20.0,
            },
            RawRecord::Magnetometer {
                header: header(KIND_MAGNETOMETER, 2, 200),
                field: [100.0, 0.0, 0.0],
                temperature: 20.0,
            },
        ];
        let bytes: Vec<u8> = records.iter().flat_map(encode_record).collect();

        let log = LogManager::new();
        let config = StageConfig::default();
        let report = decode_records(&bytes, &log);
        assert_eq!(report.records.len(), 3);
        let dataset = combine_records(&report.records, &config, &log).unwrap();

        let mut sync = TimeSyncStage::new(TimeReference {
            explicit: Some("20240101_000000.0".into()),
            source_name: None,
        });
        sync.initialize(&config).unwrap();
        let dataset = sync
            .execute(StageInput::new(dataset), &log)
            .unwrap()
            .dataset;

        let mut total = TotalFieldStage::new();
        total.initialize(&config).unwrap();
        let dataset = total
            .execute(StageInput::new(dataset), &log)
            .unwrap()
            .dataset;

        let anchor = utc_millis(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        );
        let sample = dataset.samples.iter().find(|s| s.timestamp == 200).unwrap();
        assert_eq!(sample.utc_timestamp, Some(anchor + 200));
        assert_eq!(sample.total_field, Some(100.0));
        assert_eq!(dataset.samples[0].utc_timestamp, Some(anchor));
    }
}
