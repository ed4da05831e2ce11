use crate::math::angles::heading_diff;
use crate::math::geodesy;
use crate::prelude::{
    ProcessingStage, StageConfig, StageError, StageInput, StageMetadata, StageOutput, StageResult,
};
use crate::telemetry::log::LogManager;

/// Result of one segmentation scan, indexed like the input points.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub track_ids: Vec<Option<u32>>,
    pub headings: Vec<Option<f64>>,
    pub track_count: u32,
}

/// Greedy heading scan over `(lat, lon)` points.
///
/// A candidate segment starting at `i` grows while the azimuth of each step
/// `(j, j + 1)` stays within `max_angle_diff` of the first step `(i, i + 1)`.
/// The candidate `[i, j)` becomes a track only if its first and last members
/// lie at least `min_len` metres apart.
pub fn segment_by_heading(points: &[(f64, f64)], max_angle_diff: f64, min_len: f64) -> Segmentation {
    let n = points.len();
    let mut track_ids = vec![None; n];
    let mut headings = vec![None; n];
    let mut track = 0u32;

    let step = |k: usize| {
        let (lat1, lon1) = points[k];
        let (lat2, lon2) = points[k + 1];
        geodesy::azimuth(lat1, lon1, lat2, lon2)
    };

    let mut i = 0;
    while i + 1 < n {
        let reference = step(i);
        let mut j = i + 1;
        while j + 1 < n {
            let current = step(j);
            if j == i + 1 {
                headings[i] = Some(reference);
            }
            headings[j] = Some(current);
            if heading_diff(reference, current) > max_angle_diff {
                break;
            }
            j += 1;
        }

        let (lat1, lon1) = points[i];
        let (lat2, lon2) = points[j - 1];
        if geodesy::distance(lat1, lon1, lat2, lon2) >= min_len {
            for id in track_ids[i..j].iter_mut() {
                *id = Some(track);
            }
            track += 1;
        }
        i = j;
    }

    Segmentation {
        track_ids,
        headings,
        track_count: track,
    }
}

/// Splits the fix-bearing trajectory into straight tracks and drops every
/// sample left outside a track.
pub struct SegmentationStage {
    config: Option<StageConfig>,
}

impl SegmentationStage {
    pub fn new() -> Self {
        Self { config: None }
    }
}

impl Default for SegmentationStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for SegmentationStage {
    fn name(&self) -> &'static str {
        "segmentation"
    }

    fn initialize(&mut self, config: &StageConfig) -> StageResult<()> {
        if config.max_angle_diff < 0.0 || config.min_segment_len < 0.0 {
            return Err(StageError::InvalidInput(
                "segmentation thresholds must be non-negative".into(),
            ));
        }
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, input: StageInput, log: &LogManager) -> StageResult<StageOutput> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| StageError::Internal("stage not initialized".into()))?;
        let mut dataset = input.dataset;
        let rows_in = dataset.len();

        let (indices, points): (Vec<usize>, Vec<(f64, f64)>) = dataset
            .samples
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.position.lat_lon().map(|p| (i, p)))
            .unzip();
        if indices.len() < rows_in {
            log.detail(&format!(
                "{} samples without a fix are left out of the scan",
                rows_in - indices.len()
            ));
        }

        let scan = segment_by_heading(&points, config.max_angle_diff, config.min_segment_len);
        for sample in dataset.samples.iter_mut() {
            sample.track_id = None;
        }
        for (k, &row) in indices.iter().enumerate() {
            let sample = &mut dataset.samples[row];
            sample.track_id = scan.track_ids[k];
            sample.heading = scan.headings[k];
        }

        dataset.samples.retain(|s| s.track_id.is_some());
        let dropped = rows_in - dataset.len();
        log.record(&format!(
            "{} tracks over {} samples ({} untracked samples dropped)",
            scan.track_count,
            dataset.len(),
            dropped
        ));

        let metadata = StageMetadata {
            track_count: Some(scan.track_count as usize),
            dropped: Some(dropped),
            ..Default::default()
        };
        Ok(StageOutput::new(dataset, metadata))
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}
