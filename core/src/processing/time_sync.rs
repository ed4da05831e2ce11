use crate::dataset::Dataset;
use crate::math::stats::StatsHelper;
use crate::prelude::{
    ProcessingStage, StageConfig, StageError, StageInput, StageMetadata, StageOutput, StageResult,
};
use crate::telemetry::log::LogManager;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Where the survey date may come from, in order of precedence.
#[derive(Debug, Clone, Default)]
pub struct TimeReference {
    /// `YYYYMMDD_HHMMSS.S`; only the date part is used.
    pub explicit: Option<String>,
    /// Source file stem, `YYYYMMDD_HHMMSS_...`.
    pub source_name: Option<String>,
}

impl TimeReference {
    /// First usable date: explicit argument, then file name, then the
    /// dataset's own GPS date column.
    pub fn resolve_date(&self, dataset: &Dataset) -> Option<NaiveDate> {
        self.explicit
            .as_deref()
            .and_then(date_from_prefix)
            .or_else(|| self.source_name.as_deref().and_then(date_from_prefix))
            .or_else(|| {
                dataset
                    .source_name
                    .as_deref()
                    .and_then(date_from_prefix)
            })
            .or(dataset.date)
    }
}

fn date_from_prefix(text: &str) -> Option<NaiveDate> {
    let prefix = text.split('_').next()?;
    NaiveDate::parse_from_str(prefix, "%Y%m%d").ok()
}

/// Decodes a GPS time of day stored as the number `hhmmss.sss`.
pub fn time_of_day(value: f64) -> Option<NaiveTime> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    let whole = value.trunc() as u32;
    let (hours, minutes, seconds) = (whole / 10_000, (whole / 100) % 100, whole % 100);
    let millis = ((value - value.trunc()) * 1000.0).round() as u32;
    let time = NaiveTime::from_hms_opt(hours, minutes, seconds)?;
    Some(time + chrono::Duration::milliseconds(i64::from(millis)))
}

/// Milliseconds since the Unix epoch of `date` at `time`, treated as UTC.
pub fn utc_millis(date: NaiveDate, time: NaiveTime) -> i64 {
    NaiveDateTime::new(date, time).and_utc().timestamp_millis()
}

/// Reconstructs absolute UTC timestamps from the device counter.
pub struct TimeSyncStage {
    reference: TimeReference,
    config: Option<StageConfig>,
}

impl TimeSyncStage {
    pub fn new(reference: TimeReference) -> Self {
        Self {
            reference,
            config: None,
        }
    }
}

impl ProcessingStage for TimeSyncStage {
    fn name(&self) -> &'static str {
        "time_sync"
    }

    fn initialize(&mut self, config: &StageConfig) -> StageResult<()> {
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, input: StageInput, log: &LogManager) -> StageResult<StageOutput> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| StageError::Internal("stage not initialized".into()))?;

        let mut dataset = input.dataset;
        let date = self.reference.resolve_date(&dataset).ok_or_else(|| {
            StageError::MissingReference(
                "no explicit date, dated file name or GPS date column".into(),
            )
        })?;
        dataset.date = Some(date);

        let anchor = dataset.samples.iter().enumerate().find_map(|(i, s)| {
            s.gps_time
                .filter(|t| *t != 0.0)
                .and_then(time_of_day)
                .map(|t| (i, t))
        });

        let mut metadata = StageMetadata::default();
        match anchor {
            Some((index, time)) => {
                let anchor_utc = StatsHelper::round_to_step(utc_millis(date, time), config.tick_ms);
                propagate(&mut dataset, index, anchor_utc);
                log.record(&format!(
                    "anchored row {} (raw {} ms) at UTC {} ms",
                    index, dataset.samples[index].timestamp, anchor_utc
                ));
                metadata.notes.push(format!("anchor row {}", index));
            }
            None if dataset.schema.clock_is_time_of_day() => {
                let midnight = utc_millis(date, NaiveTime::MIN);
                for sample in dataset.samples.iter_mut() {
                    sample.utc_timestamp = Some(midnight + sample.timestamp);
                }
                log.record("no GPS time; raw clock taken as time of day");
                metadata.notes.push("time-of-day clock".to_string());
            }
            None => {
                return Err(StageError::MissingReference(format!(
                    "no valid GPS time in {} samples",
                    dataset.len()
                )));
            }
        }

        Ok(StageOutput::new(dataset, metadata))
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}

/// Walks raw counter deltas forward and backward from the anchor row.
fn propagate(dataset: &mut Dataset, anchor: usize, anchor_utc: i64) {
    let samples = &mut dataset.samples;
    samples[anchor].utc_timestamp = Some(anchor_utc);

    let mut utc = anchor_utc;
    for i in anchor..samples.len().saturating_sub(1) {
        utc += samples[i + 1].timestamp - samples[i].timestamp;
        samples[i + 1].utc_timestamp = Some(utc);
    }

    let mut utc = anchor_utc;
    for i in (1..=anchor).rev() {
        utc -= samples[i].timestamp - samples[i - 1].timestamp;
        samples[i - 1].utc_timestamp = Some(utc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Sample, Schema};

    fn run(dataset: Dataset, reference: TimeReference) -> StageResult<Dataset> {
        let mut stage = TimeSyncStage::new(reference);
        stage.initialize(&StageConfig::default())?;
        let output = stage.execute(StageInput::new(dataset), &LogManager::new())?;
        stage.cleanup();
        Ok(output.dataset)
    }

    fn explicit(date: &str) -> TimeReference {
        TimeReference {
            explicit: Some(date.to_string()),
            source_name: None,
        }
    }

    #[test]
    fn time_of_day_parses_hhmmss_fraction() {
        let t = time_of_day(123456.5).unwrap();
        assert_eq!(t, NaiveTime::from_hms_milli_opt(12, 34, 56, 500).unwrap());
        assert_eq!(time_of_day(0.0), None);
        assert_eq!(time_of_day(256000.0), None);
    }

    #[test]
    fn anchor_propagates_raw_deltas_both_ways() {
        let raw = [0, 50, 100, 160, 200, 250, 330];
        let samples = raw
            .iter()
            .enumerate()
            .map(|(i, &ts)| {
                let mut s = Sample::at(ts);
                if i == 3 {
                    s.gps_time = Some(120000.0);
                }
                s
            })
            .collect();
        let data = run(
            Dataset::from_samples(Schema::raw(), samples),
            explicit("20240101_000000.0"),
        )
        .unwrap();

        let utc: Vec<i64> = data
            .samples
            .iter()
            .map(|s| s.utc_timestamp.unwrap())
            .collect();
        for i in 0..raw.len() - 1 {
            assert_eq!(utc[i + 1] - utc[i], raw[i + 1] - raw[i]);
        }
        let anchor = utc_millis(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        );
        assert_eq!(utc[3], anchor);
    }

    #[test]
    fn anchor_is_rounded_to_tick() {
        let mut s = Sample::at(0);
        s.gps_time = Some(120000.29);
        let data = run(
            Dataset::from_samples(Schema::raw(), vec![s]),
            explicit("20240101_000000.0"),
        )
        .unwrap();
        let noon = utc_millis(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        );
        assert_eq!(data.samples[0].utc_timestamp, Some(noon + 200));
    }

    #[test]
    fn zero_gps_time_is_not_an_anchor() {
        let mut first = Sample::at(0);
        first.gps_time = Some(0.0);
        let mut second = Sample::at(100);
        second.gps_time = Some(100000.0);
        let data = run(
            Dataset::from_samples(Schema::raw(), vec![first, second]),
            explicit("20240101_000000.0"),
        )
        .unwrap();
        let ten = utc_millis(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        );
        assert_eq!(data.samples[0].utc_timestamp, Some(ten - 100));
    }

    #[test]
    fn time_of_day_clock_falls_back_to_midnight() {
        let data = run(
            Dataset::from_samples(Schema::asc(), vec![Sample::at(3_600_000)]),
            explicit("20240101_000000.0"),
        )
        .unwrap();
        let one = utc_millis(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveTime::from_hms_opt(1, 0, 0).unwrap(),
        );
        assert_eq!(data.samples[0].utc_timestamp, Some(one));
    }

    #[test]
    fn missing_date_is_fatal() {
        let err = run(
            Dataset::from_samples(Schema::raw(), vec![Sample::at(0)]),
            TimeReference::default(),
        )
        .unwrap_err();
        assert!(matches!(err, StageError::MissingReference(_)));
    }

    #[test]
    fn raw_clock_without_gps_time_is_fatal() {
        let err = run(
            Dataset::from_samples(Schema::raw(), vec![Sample::at(0)]),
            explicit("20240101_000000.0"),
        )
        .unwrap_err();
        assert!(matches!(err, StageError::MissingReference(_)));
    }

    #[test]
    fn date_precedence() {
        let mut data = Dataset::from_samples(Schema::raw(), vec![]);
        data.date = NaiveDate::from_ymd_opt(2020, 2, 2);
        let by_name = TimeReference {
            explicit: None,
            source_name: Some("20250325_121959_MD-R3_#0055".into()),
        };
        assert_eq!(by_name.resolve_date(&data), NaiveDate::from_ymd_opt(2025, 3, 25));
        assert_eq!(
            TimeReference::default().resolve_date(&data),
            NaiveDate::from_ymd_opt(2020, 2, 2)
        );
    }
}
