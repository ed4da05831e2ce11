use crate::dataset::Sample;
use crate::math::geodesy;
use crate::math::stats::StatsHelper;
use crate::prelude::{
    ProcessingStage, StageConfig, StageError, StageInput, StageMetadata, StageOutput, StageResult,
};
use crate::telemetry::log::LogManager;
use std::collections::BTreeMap;

const COORDINATE_DECIMALS: i32 = 9;
const ALTITUDE_DECIMALS: i32 = 2;

/// Fraction of the way from `t1` to `t2` at which `t` lies.
pub fn interpolation_coefficient(t: i64, t1: i64, t2: i64) -> StageResult<f64> {
    if t1 == t2 || t < t1 || t > t2 {
        return Err(StageError::InterpolationBounds { t, t1, t2 });
    }
    Ok((t - t1) as f64 / (t2 - t1) as f64)
}

/// Point reached after `k` of the geodesic from `p1` to `p2`.
pub fn interpolate_position(p1: (f64, f64), p2: (f64, f64), k: f64) -> (f64, f64) {
    let (total, azimuth) = geodesy::inverse(p1.0, p1.1, p2.0, p2.1);
    geodesy::direct(p1.0, p1.1, azimuth, k * total)
}

fn round_coordinates(sample: &mut Sample) {
    sample.position.lat = sample
        .position
        .lat
        .map(|v| StatsHelper::round_to(v, COORDINATE_DECIMALS));
    sample.position.lon = sample
        .position
        .lon
        .map(|v| StatsHelper::round_to(v, COORDINATE_DECIMALS));
}

/// Fills positions along one line, ordered by raw timestamp. Rows before
/// the first or after the last fix are dropped. Returns `None` when the
/// line has no fix at all.
pub fn interpolate_line(mut rows: Vec<Sample>) -> StageResult<Option<Vec<Sample>>> {
    rows.sort_by_key(|s| s.timestamp);
    let fixes: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, s)| s.position.has_fix())
        .map(|(i, _)| i)
        .collect();
    let (Some(&first), Some(&last)) = (fixes.first(), fixes.last()) else {
        return Ok(None);
    };

    let mut rows: Vec<Sample> = rows.drain(first..=last).collect();
    let fixes: Vec<usize> = fixes.iter().map(|i| i - first).collect();

    for pair in fixes.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let (p1, p2) = match (rows[a].position.lat_lon(), rows[b].position.lat_lon()) {
            (Some(p1), Some(p2)) => (p1, p2),
            _ => continue,
        };
        let (t1, t2) = (rows[a].timestamp, rows[b].timestamp);
        let (alt1, alt2) = (rows[a].position.alt, rows[b].position.alt);

        for row in rows[a + 1..b].iter_mut() {
            let k = interpolation_coefficient(row.timestamp, t1, t2)?;
            let (lat, lon) = interpolate_position(p1, p2, k);
            row.position.lat = Some(lat);
            row.position.lon = Some(lon);
            row.position.alt = match (alt1, alt2) {
                (Some(a1), Some(a2)) => {
                    Some(StatsHelper::round_to((1.0 - k) * a1 + k * a2, ALTITUDE_DECIMALS))
                }
                _ => None,
            };
        }
    }

    rows.iter_mut().for_each(round_coordinates);
    Ok(Some(rows))
}

/// Geodesic time interpolation of sensor positions, line by line.
pub struct InterpolationStage {
    config: Option<StageConfig>,
}

impl InterpolationStage {
    pub fn new() -> Self {
        Self { config: None }
    }
}

impl Default for InterpolationStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for InterpolationStage {
    fn name(&self) -> &'static str {
        "interpolation"
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
        let rows_in = dataset.len();

        let mut lines: BTreeMap<u32, Vec<Sample>> = BTreeMap::new();
        for sample in dataset.samples.drain(..) {
            if let Some(line) = sample.line_id {
                lines.entry(line).or_default().push(sample);
            }
        }

        let mut empty_lines = Vec::new();
        let line_count = lines.len();
        for (line, rows) in lines {
            match interpolate_line(rows)? {
                Some(rows) => dataset.samples.extend(rows),
                None => empty_lines.push(line),
            }
        }
        if !empty_lines.is_empty() {
            log.warn(&format!("lines without any fix dropped: {:?}", empty_lines));
        }

        let dropped = rows_in - dataset.len();
        log.record(&format!(
            "interpolated {} lines, {} rows kept, {} outside fix span",
            line_count,
            dataset.len(),
            dropped
        ));
        let metadata = StageMetadata {
            dropped: Some(dropped),
            ..Default::default()
        };
        Ok(StageOutput::new(dataset, metadata))
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}
