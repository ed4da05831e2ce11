use crate::dataset::{Attribute, FieldMapping};
use crate::prelude::{
    ProcessingStage, StageConfig, StageError, StageInput, StageMetadata, StageOutput, StageResult,
};
use crate::telemetry::log::LogManager;

const POSITION: [Attribute; 3] = [Attribute::Latitude, Attribute::Longitude, Attribute::Altitude];

/// Index of the main-series timestamp closest to `target`, advancing
/// `pointer` monotonically across calls.
pub fn nearest_forward(main: &[Option<i64>], pointer: &mut usize, target: i64) -> Option<(usize, i64)> {
    if main.is_empty() {
        return None;
    }
    while *pointer + 1 < main.len() && main[*pointer + 1].map_or(true, |t| t < target) {
        *pointer += 1;
    }

    [*pointer, *pointer + 1]
        .into_iter()
        .filter(|&i| i < main.len())
        .filter_map(|i| main[i].map(|t| (i, (t - target).abs())))
        .min_by_key(|&(_, diff)| diff)
}

/// Replaces the main series' positions with the external fixes matched by
/// nearest UTC timestamp.
pub struct GnssFusionStage {
    config: Option<StageConfig>,
}

impl GnssFusionStage {
    pub fn new() -> Self {
        Self { config: None }
    }
}

impl Default for GnssFusionStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for GnssFusionStage {
    fn name(&self) -> &'static str {
        "gnss_fusion"
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
        let external = input
            .auxiliary
            .ok_or_else(|| StageError::InvalidInput("no external GNSS series supplied".into()))?;

        let mut dataset = input.dataset;
        let mapping =
            FieldMapping::new(&external.schema, &dataset.schema, &[])?.restricted_to(&POSITION);

        for sample in dataset.samples.iter_mut() {
            sample.position.clear();
            sample.gps_time = None;
        }

        let main: Vec<Option<i64>> = dataset.samples.iter().map(|s| s.utc_timestamp).collect();
        let mut pointer = 0;
        let mut matched = 0;
        let mut rejected = 0;

        for fix in external.samples.iter() {
            let Some(ts) = fix.utc_timestamp else {
                continue;
            };
            match nearest_forward(&main, &mut pointer, ts) {
                Some((index, diff)) if diff <= config.gnss_max_diff_ms => {
                    mapping.overlay(fix, &mut dataset.samples[index])?;
                    matched += 1;
                }
                _ => rejected += 1,
            }
        }

        log.record(&format!(
            "matched {} external fixes ({} outside {} ms)",
            matched, rejected, config.gnss_max_diff_ms
        ));
        let metadata = StageMetadata {
            dropped: Some(rejected),
            notes: vec![format!("{} external fixes applied", matched)],
            ..Default::default()
        };
        Ok(StageOutput::new(dataset, metadata))
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}
