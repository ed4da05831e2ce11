use crate::dataset::{Attribute, Dataset, FieldMapping, Sample};
use crate::prelude::{
    ProcessingStage, StageConfig, StageError, StageInput, StageMetadata, StageOutput, StageResult,
};
use crate::processing::geometry::sensor_mapping;
use crate::telemetry::log::LogManager;
use std::collections::{HashMap, HashSet};

/// Keeps only fix-bearing samples when fixes arrive slower than samples.
///
/// The full-rate series is handed back as the output's auxiliary dataset
/// so `FrequencyIncreaseStage` can restore it after geometry projection.
pub struct FrequencyReduceStage {
    config: Option<StageConfig>,
}

impl FrequencyReduceStage {
    pub fn new() -> Self {
        Self { config: None }
    }
}

impl Default for FrequencyReduceStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for FrequencyReduceStage {
    fn name(&self) -> &'static str {
        "frequency_reduce"
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
        let dataset = input.dataset;

        let sample_hz = dataset.column_frequency(Attribute::Timestamp, config.frequency_prefix);
        let fix_hz = dataset.column_frequency(Attribute::Latitude, config.frequency_prefix);
        log.detail(&format!("sample rate {:?} Hz, fix rate {:?} Hz", sample_hz, fix_hz));

        let reduce = matches!((fix_hz, sample_hz), (Some(fix), Some(all)) if fix < all);
        if !reduce {
            log.record("fix rate matches sample rate; nothing to reduce");
            return Ok(StageOutput::new(dataset, StageMetadata::default()));
        }

        let mut reduced = dataset.clone();
        reduced.samples.retain(|s| s.position.has_fix());
        let dropped = dataset.len() - reduced.len();
        log.record(&format!(
            "reduced {} samples to {} fix-bearing samples",
            dataset.len(),
            reduced.len()
        ));

        Ok(StageOutput {
            dataset: reduced,
            auxiliary: Some(dataset),
            metadata: StageMetadata {
                dropped: Some(dropped),
                notes: vec![format!(
                    "{} Hz fixes under {} Hz samples",
                    fix_hz.unwrap_or(0),
                    sample_hz.unwrap_or(0)
                )],
                ..Default::default()
            },
        })
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}

/// Identity of one line as carried onto reinserted rows.
#[derive(Debug, Clone, Copy)]
struct LineTag {
    line_id: u32,
    track_id: Option<u32>,
    sensor_id: Option<u8>,
    track_facing: Option<crate::dataset::Facing>,
    first: i64,
    last: i64,
}

/// Reinserts the full-rate rows dropped by `FrequencyReduceStage` into every
/// projected line whose raw-timestamp span covers them.
pub struct FrequencyIncreaseStage {
    config: Option<StageConfig>,
}

impl FrequencyIncreaseStage {
    pub fn new() -> Self {
        Self { config: None }
    }
}

impl Default for FrequencyIncreaseStage {
    fn default() -> Self {
        Self::new()
    }
}

fn line_tags(dataset: &Dataset) -> Vec<LineTag> {
    let mut tags: Vec<LineTag> = Vec::new();
    let mut index: HashMap<u32, usize> = HashMap::new();
    for sample in &dataset.samples {
        let Some(line_id) = sample.line_id else {
            continue;
        };
        match index.get(&line_id) {
            Some(&i) => {
                let tag = &mut tags[i];
                tag.first = tag.first.min(sample.timestamp);
                tag.last = tag.last.max(sample.timestamp);
            }
            None => {
                index.insert(line_id, tags.len());
                tags.push(LineTag {
                    line_id,
                    track_id: sample.track_id,
                    sensor_id: sample.sensor_id,
                    track_facing: sample.track_facing,
                    first: sample.timestamp,
                    last: sample.timestamp,
                });
            }
        }
    }
    tags.sort_by_key(|t| t.line_id);
    tags
}

impl ProcessingStage for FrequencyIncreaseStage {
    fn name(&self) -> &'static str {
        "frequency_increase"
    }

    fn initialize(&mut self, config: &StageConfig) -> StageResult<()> {
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, input: StageInput, log: &LogManager) -> StageResult<StageOutput> {
        if self.config.is_none() {
            return Err(StageError::Internal("stage not initialized".into()));
        }
        let mut dataset = input.dataset;
        let Some(original) = input.auxiliary else {
            log.record("no retained full-rate series; nothing to reinsert");
            return Ok(StageOutput::new(dataset, StageMetadata::default()));
        };

        let tags = line_tags(&dataset);
        let mut present: HashMap<u32, HashSet<i64>> = HashMap::new();
        for sample in &dataset.samples {
            if let Some(line_id) = sample.line_id {
                present.entry(line_id).or_default().insert(sample.timestamp);
            }
        }

        // A raw timestamp claimed by the spans of two different tracks has
        // no single owner.
        let mut owners: HashMap<i64, HashSet<Option<u32>>> = HashMap::new();
        for tag in &tags {
            for row in &original.samples {
                if row.timestamp >= tag.first && row.timestamp <= tag.last {
                    owners.entry(row.timestamp).or_default().insert(tag.track_id);
                }
            }
        }
        let ambiguous: HashSet<i64> = owners
            .into_iter()
            .filter(|(_, tracks)| tracks.len() > 1)
            .map(|(ts, _)| ts)
            .collect();
        if !ambiguous.is_empty() {
            log.warn(&format!(
                "{} raw timestamps fall inside several tracks; not reinserted",
                ambiguous.len()
            ));
        }

        let mut mappings: HashMap<Option<u8>, FieldMapping> = HashMap::new();
        let mut inserted: Vec<Sample> = Vec::new();
        for tag in &tags {
            let mapping = match mappings.get(&tag.sensor_id) {
                Some(mapping) => mapping.clone(),
                None => {
                    let mapping =
                        sensor_mapping(&original.schema, &dataset.schema, tag.sensor_id.unwrap_or(1))?;
                    mappings.insert(tag.sensor_id, mapping.clone());
                    mapping
                }
            };
            let existing = present.get(&tag.line_id);

            for row in &original.samples {
                let ts = row.timestamp;
                if ts < tag.first || ts > tag.last || ambiguous.contains(&ts) {
                    continue;
                }
                if existing.map_or(false, |set| set.contains(&ts)) {
                    continue;
                }
                let mut sample = mapping.apply(row)?;
                sample.position.clear();
                sample.line_id = Some(tag.line_id);
                sample.track_id = tag.track_id;
                sample.sensor_id = tag.sensor_id;
                sample.track_facing = tag.track_facing;
                inserted.push(sample);
            }
        }

        let count = inserted.len();
        dataset.samples.extend(inserted);
        dataset.sort_by_line();
        log.record(&format!(
            "reinserted {} full-rate rows across {} lines",
            count,
            tags.len()
        ));

        let metadata = StageMetadata {
            dropped: Some(ambiguous.len()),
            notes: vec![format!("{} rows reinserted", count)],
            ..Default::default()
        };
        Ok(StageOutput::new(dataset, metadata))
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Facing, Position, Schema};

    fn full_rate(n: i64) -> Dataset {
        let samples = (0..n)
            .map(|i| {
                let mut s = Sample::at(i * 50);
                s.mag1 = Some([1.0, 0.0, 0.0]);
                s.mag2 = Some([2.0, 0.0, 0.0]);
                if i % 4 == 0 {
                    s.position = Position::fix(50.0, 30.0 + i as f64 * 1e-5, Some(100.0));
                }
                s
            })
            .collect();
        Dataset::from_samples(Schema::raw(), samples)
    }

    fn projected(lines: &[(u32, u32, u8, &[i64])]) -> Dataset {
        let mut samples = Vec::new();
        for &(line_id, track_id, sensor_id, stamps) in lines {
            for &ts in stamps {
                let mut s = Sample::at(ts);
                s.line_id = Some(line_id);
                s.track_id = Some(track_id);
                s.sensor_id = Some(sensor_id);
                s.track_facing = Some(Facing::Forward);
                s.position = Position::fix(50.0, 30.0, Some(100.0));
                samples.push(s);
            }
        }
        Dataset::from_samples(Schema::final_output(), samples)
    }

    #[test]
    fn reduce_keeps_fixes_and_returns_original() {
        let mut stage = FrequencyReduceStage::new();
        stage.initialize(&StageConfig::default()).unwrap();
        let output = stage
            .execute(StageInput::new(full_rate(20)), &LogManager::new())
            .unwrap();

        assert_eq!(output.dataset.len(), 5);
        assert!(output.dataset.samples.iter().all(|s| s.position.has_fix()));
        assert_eq!(output.auxiliary.map(|d| d.len()), Some(20));
        assert_eq!(output.metadata.dropped, Some(15));
    }

    #[test]
    fn reduce_is_noop_when_every_sample_has_a_fix() {
        let mut data = full_rate(8);
        for s in data.samples.iter_mut() {
            s.position = Position::fix(50.0, 30.0, None);
        }
        let mut stage = FrequencyReduceStage::new();
        stage.initialize(&StageConfig::default()).unwrap();
        let output = stage
            .execute(StageInput::new(data), &LogManager::new())
            .unwrap();
        assert_eq!(output.dataset.len(), 8);
        assert!(output.auxiliary.is_none());
    }

    #[test]
    fn increase_fills_line_span_with_sensor_triad() {
        let original = full_rate(20);
        let lines = projected(&[(0, 0, 1, &[0, 200, 400]), (1, 0, 2, &[0, 200, 400])]);

        let mut stage = FrequencyIncreaseStage::new();
        stage.initialize(&StageConfig::default()).unwrap();
        let output = stage
            .execute(
                StageInput::with_auxiliary(lines, Some(original)),
                &LogManager::new(),
            )
            .unwrap();
        let data = output.dataset;

        // Span 0..=400 at 50 ms holds 9 rows per line.
        assert_eq!(data.len(), 18);
        let line0: Vec<_> = data.samples.iter().filter(|s| s.line_id == Some(0)).collect();
        assert_eq!(line0.len(), 9);
        assert!(line0.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

        let reinserted = data
            .samples
            .iter()
            .find(|s| s.line_id == Some(1) && s.timestamp == 50)
            .unwrap();
        assert_eq!(reinserted.mag1, Some([2.0, 0.0, 0.0]));
        assert_eq!(reinserted.sensor_id, Some(2));
        assert_eq!(reinserted.track_facing, Some(Facing::Forward));
        assert!(!reinserted.position.has_fix());
    }

    #[test]
    fn overlapping_track_spans_are_not_reinserted() {
        let original = full_rate(20);
        let lines = projected(&[(0, 0, 1, &[0, 200]), (2, 1, 1, &[150, 400])]);

        let mut stage = FrequencyIncreaseStage::new();
        stage.initialize(&StageConfig::default()).unwrap();
        let output = stage
            .execute(
                StageInput::with_auxiliary(lines, Some(original)),
                &LogManager::new(),
            )
            .unwrap();

        // 150 and 200 are in both spans; 150 is already a projected row of line 2.
        assert_eq!(output.metadata.dropped, Some(2));
        assert!(!output
            .dataset
            .samples
            .iter()
            .any(|s| s.line_id == Some(0) && s.timestamp == 150));
    }
}
