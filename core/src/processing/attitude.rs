use crate::dataset::Facing;
use crate::math::angles::wrap_360;
use crate::math::geomagnetic::GeomagneticReference;
use crate::prelude::{
    ProcessingStage, StageConfig, StageError, StageInput, StageMetadata, StageOutput, StageResult,
};
use crate::telemetry::log::LogManager;
use std::collections::BTreeMap;

/// Magnetic heading of the body frame, `atan2(By, Bx)` in `[0, 360)`.
pub fn body_heading(field: [f64; 3]) -> f64 {
    wrap_360(field[1].atan2(field[0]).to_degrees())
}

pub fn yaw(reference_heading: f64, body_heading: f64) -> f64 {
    wrap_360(reference_heading - body_heading)
}

/// Classifies the agreement between travel heading and yaw.
pub fn facing_for(heading: f64, yaw: f64, max_deviation: f64) -> Facing {
    let (a, b) = if heading > yaw { (yaw, heading) } else { (heading, yaw) };
    let first = b - a;
    let second = 360.0 - first;

    if first <= max_deviation || second <= max_deviation {
        Facing::Forward
    } else if (first - 180.0).abs() <= max_deviation || (second - 180.0).abs() <= max_deviation {
        Facing::Backward
    } else {
        Facing::Ambiguous
    }
}

/// Majority facing of a track, or `Ambiguous` when the most common value
/// does not exceed `threshold` of the samples.
pub fn track_facing(facings: &[Facing], threshold: f64) -> Facing {
    if facings.is_empty() {
        return Facing::Ambiguous;
    }
    let mut counts: BTreeMap<i8, usize> = BTreeMap::new();
    for facing in facings {
        *counts.entry(facing.as_i8()).or_default() += 1;
    }
    let (mode, count) = facings
        .iter()
        .map(|f| (*f, counts[&f.as_i8()]))
        .max_by_key(|&(_, count)| count)
        .unwrap_or((Facing::Ambiguous, 0));

    if count as f64 / facings.len() as f64 > threshold {
        mode
    } else {
        Facing::Ambiguous
    }
}

/// Derives yaw from the primary magnetometer against a geomagnetic
/// reference, then per-sample and per-track facing.
pub struct AttitudeStage {
    reference: Box<dyn GeomagneticReference>,
    config: Option<StageConfig>,
}

impl AttitudeStage {
    pub fn new(reference: Box<dyn GeomagneticReference>) -> Self {
        Self {
            reference,
            config: None,
        }
    }
}

impl ProcessingStage for AttitudeStage {
    fn name(&self) -> &'static str {
        "attitude"
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
        let date = dataset.date.ok_or_else(|| {
            StageError::MissingReference("survey date unknown; run time sync first".into())
        })?;

        for sample in dataset.samples.iter_mut() {
            sample.yaw = match (sample.mag1, sample.position.lat_lon()) {
                (Some(field), Some((lat, lon))) => {
                    let reference = self.reference.horizontal_azimuth(date, lat, lon)?;
                    Some(yaw(reference, body_heading(field)))
                }
                _ => None,
            };
            let heading = sample.heading;
            sample.facing = sample.yaw.map(|y| match heading {
                Some(h) => facing_for(h, y, config.max_facing_deviation),
                None => Facing::Ambiguous,
            });
        }

        // Position-only samples carry no yaw and do not vote.
        let mut per_track: BTreeMap<u32, Vec<Facing>> = BTreeMap::new();
        for sample in &dataset.samples {
            if let Some(track) = sample.track_id {
                let votes = per_track.entry(track).or_default();
                votes.extend(sample.facing);
            }
        }
        let decided: BTreeMap<u32, Facing> = per_track
            .iter()
            .map(|(&track, facings)| (track, track_facing(facings, config.track_facing_threshold)))
            .collect();
        for sample in dataset.samples.iter_mut() {
            sample.track_facing = sample.track_id.and_then(|t| decided.get(&t).copied());
        }

        let ambiguous: Vec<u32> = decided
            .iter()
            .filter(|(_, f)| **f == Facing::Ambiguous)
            .map(|(t, _)| *t)
            .collect();
        if !ambiguous.is_empty() {
            log.warn(&format!("tracks with ambiguous facing: {:?}", ambiguous));
        }
        log.record(&format!(
            "facing decided for {} tracks ({} ambiguous)",
            decided.len(),
            ambiguous.len()
        ));

        let metadata = StageMetadata {
            track_count: Some(decided.len()),
            notes: ambiguous
                .iter()
                .map(|t| format!("track {} facing ambiguous", t))
                .collect(),
            ..Default::default()
        };
        Ok(StageOutput::new(dataset, metadata))
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}
