use crate::dataset::{Attribute, Dataset, Facing, FieldMapping, Sample, Schema};
use crate::math::angles::wrap_360;
use crate::math::geodesy;
use crate::prelude::{
    ProcessingStage, StageConfig, StageError, StageInput, StageMetadata, StageOutput, StageResult,
};
use crate::telemetry::log::LogManager;
use std::collections::BTreeMap;

/// Line id of one sensor's half of a track.
pub fn line_id(track_id: u32, sensor_id: u8) -> u32 {
    2 * track_id + u32::from(sensor_id == 2)
}

/// Mapping that carries one sensor's attributes into `destination`.
///
/// Sensor 2 rows take the second magnetometer triad when the source has one.
pub fn sensor_mapping(source: &Schema, destination: &Schema, sensor_id: u8) -> StageResult<FieldMapping> {
    if sensor_id == 2 && source.defines(Attribute::Mag2) {
        FieldMapping::new(source, destination, &[(Attribute::Mag2, Attribute::Mag1)])
    } else {
        FieldMapping::new(source, destination, &[])
    }
}

/// `(sensor1, sensor2)` bearings for a track heading and facing.
pub fn sensor_bearings(heading: f64, facing: Facing) -> Option<(f64, f64)> {
    let left = wrap_360(heading - 90.0);
    let right = wrap_360(heading + 90.0);
    match facing {
        Facing::Forward => Some((left, right)),
        Facing::Backward => Some((right, left)),
        Facing::Ambiguous => None,
    }
}

/// Projects each vehicle fix onto the two magnetometer positions and emits
/// one final-schema row per sensor.
pub struct SensorGeometryStage {
    destination: Schema,
    config: Option<StageConfig>,
}

impl SensorGeometryStage {
    pub fn new() -> Self {
        Self {
            destination: Schema::final_output(),
            config: None,
        }
    }
}

impl Default for SensorGeometryStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for SensorGeometryStage {
    fn name(&self) -> &'static str {
        "sensor_geometry"
    }

    fn initialize(&mut self, config: &StageConfig) -> StageResult<()> {
        if config.sensor_offset < 0.0 {
            return Err(StageError::InvalidInput("sensor offset must be non-negative".into()));
        }
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, input: StageInput, log: &LogManager) -> StageResult<StageOutput> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| StageError::Internal("stage not initialized".into()))?;
        let source = input.dataset;
        let mappings = [
            sensor_mapping(&source.schema, &self.destination, 1)?,
            sensor_mapping(&source.schema, &self.destination, 2)?,
        ];

        let mut tracks: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (row, sample) in source.samples.iter().enumerate() {
            if let Some(track) = sample.track_id {
                tracks.entry(track).or_default().push(row);
            }
        }

        let mut output: Vec<Sample> = Vec::with_capacity(source.len() * 2);
        let mut skipped = Vec::new();
        for (&track, rows) in &tracks {
            let first = rows[0];
            let facing = source.samples[first]
                .track_facing
                .ok_or_else(|| StageError::Geometry {
                    index: first,
                    detail: format!("track {} has no facing", track),
                })?;
            if facing == Facing::Ambiguous {
                skipped.push(track);
                continue;
            }

            let mut halves: [Vec<Sample>; 2] = [Vec::with_capacity(rows.len()), Vec::with_capacity(rows.len())];
            for &row in rows {
                let sample = &source.samples[row];
                let heading = sample.heading.ok_or_else(|| StageError::Geometry {
                    index: row,
                    detail: "tracked sample without heading".into(),
                })?;
                let (lat, lon) = sample.position.lat_lon().ok_or_else(|| StageError::Geometry {
                    index: row,
                    detail: "tracked sample without fix".into(),
                })?;
                let bearings = sensor_bearings(heading, facing).ok_or_else(|| StageError::Geometry {
                    index: row,
                    detail: "ambiguous facing reached projection".into(),
                })?;

                for (k, bearing) in [bearings.0, bearings.1].into_iter().enumerate() {
                    let sensor_id = k as u8 + 1;
                    let (s_lat, s_lon) = geodesy::direct(lat, lon, bearing, config.sensor_offset);
                    let mut row_out = mappings[k].apply(sample)?;
                    row_out.position.lat = Some(s_lat);
                    row_out.position.lon = Some(s_lon);
                    row_out.position.alt = sample.position.alt;
                    row_out.sensor_id = Some(sensor_id);
                    row_out.track_id = Some(track);
                    row_out.track_facing = Some(facing);
                    row_out.line_id = Some(line_id(track, sensor_id));
                    halves[k].push(row_out);
                }
            }
            let [first_half, second_half] = halves;
            output.extend(first_half);
            output.extend(second_half);
        }

        if !skipped.is_empty() {
            log.warn(&format!("skipped tracks with ambiguous facing: {:?}", skipped));
        }
        log.record(&format!(
            "projected {} tracks into {} sensor rows",
            tracks.len() - skipped.len(),
            output.len()
        ));

        let mut dataset = Dataset::from_samples(self.destination.clone(), output);
        dataset.date = source.date;
        dataset.source_name = source.source_name;
        dataset.sort_by_line();

        let metadata = StageMetadata {
            track_count: Some(tracks.len() - skipped.len()),
            dropped: Some(skipped.len()),
            notes: skipped
                .iter()
                .map(|t| format!("track {} skipped: ambiguous facing", t))
                .collect(),
            ..Default::default()
        };
        Ok(StageOutput {
            dataset,
            auxiliary: input.auxiliary,
            metadata,
        })
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Position;
    use approx::assert_abs_diff_eq;

    fn tracked(track: u32, facing: Option<Facing>, n: usize) -> Vec<Sample> {
        (0..n)
            .map(|k| {
                let mut s = Sample::at((track as usize * 100 + k) as i64 * 200);
                s.position = Position::fix(50.0 + k as f64 * 1e-4, 30.0, Some(120.0));
                s.heading = Some(0.0);
                s.track_id = Some(track);
                s.track_facing = facing;
                s.mag1 = Some([1.0, 0.0, 0.0]);
                s.mag2 = Some([2.0, 0.0, 0.0]);
                s
            })
            .collect()
    }

    fn run(samples: Vec<Sample>) -> StageResult<StageOutput> {
        let mut stage = SensorGeometryStage::new();
        stage.initialize(&StageConfig::default())?;
        stage.execute(
            StageInput::new(Dataset::from_samples(Schema::raw(), samples)),
            &LogManager::new(),
        )
    }

    #[test]
    fn line_ids_pair_sensors_per_track() {
        assert_eq!(line_id(0, 1), 0);
        assert_eq!(line_id(0, 2), 1);
        assert_eq!(line_id(3, 2), 7);
    }

    #[test]
    fn backward_facing_swaps_sides() {
        assert_eq!(sensor_bearings(0.0, Facing::Forward), Some((270.0, 90.0)));
        assert_eq!(sensor_bearings(0.0, Facing::Backward), Some((90.0, 270.0)));
        assert_eq!(sensor_bearings(0.0, Facing::Ambiguous), None);
    }

    #[test]
    fn forward_track_puts_sensor_one_on_the_left() {
        let output = run(tracked(0, Some(Facing::Forward), 4)).unwrap();
        let data = output.dataset;
        assert_eq!(data.schema.variant, crate::dataset::SchemaVariant::Final);
        assert_eq!(data.len(), 8);
        assert_eq!(data.line_ids(), vec![0, 1]);

        let s1 = &data.samples[0];
        let s2 = &data.samples[4];
        assert_eq!((s1.sensor_id, s2.sensor_id), (Some(1), Some(2)));
        assert!(s1.position.lon.unwrap() < 30.0);
        assert!(s2.position.lon.unwrap() > 30.0);
        let spacing = geodesy::distance(
            s1.position.lat.unwrap(),
            s1.position.lon.unwrap(),
            s2.position.lat.unwrap(),
            s2.position.lon.unwrap(),
        );
        assert_abs_diff_eq!(spacing, 1.0, epsilon = 1e-6);
        assert_eq!(s1.position.alt, Some(120.0));
        assert_eq!(s1.mag1, Some([1.0, 0.0, 0.0]));
        assert_eq!(s2.mag1, Some([2.0, 0.0, 0.0]));
    }

    #[test]
    fn ambiguous_track_is_skipped_whole() {
        let mut samples = tracked(0, Some(Facing::Ambiguous), 3);
        samples.extend(tracked(1, Some(Facing::Backward), 3));
        let output = run(samples).unwrap();

        assert_eq!(output.dataset.line_ids(), vec![2, 3]);
        assert_eq!(output.metadata.dropped, Some(1));
        let s1 = &output.dataset.samples[0];
        assert!(s1.position.lon.unwrap() > 30.0);
    }

    #[test]
    fn missing_track_facing_is_a_geometry_error() {
        let err = run(tracked(0, None, 2)).unwrap_err();
        assert!(matches!(err, StageError::Geometry { index: 0, .. }));
    }
}
