use crate::dataset::Dataset;
use crate::telemetry::LogManager;
use serde::{Deserialize, Serialize};

/// Shared configuration for each processing stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Device clock quantum the UTC anchor is rounded to.
    pub tick_ms: i64,
    /// Largest accepted time difference when matching external GNSS fixes.
    pub gnss_max_diff_ms: i64,
    pub max_angle_diff: f64,
    pub min_segment_len: f64,
    pub max_facing_deviation: f64,
    /// Relative frequency the dominant facing must exceed to classify a track.
    pub track_facing_threshold: f64,
    /// Lateral distance (m) from the vehicle centerline to each magnetometer.
    pub sensor_offset: f64,
    /// Spatial correlation length (m) used to size the residual window.
    pub correlation_length: f64,
    pub velocity_samples: usize,
    pub frequency_prefix: usize,
    pub pairing_tolerance_ms: i64,
    pub pairing_lookbehind: usize,
    pub pairing_span: usize,
    pub require_accelerometer: bool,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            tick_ms: 200,
            gnss_max_diff_ms: 8,
            max_angle_diff: 30.0,
            min_segment_len: 10.0,
            max_facing_deviation: 30.0,
            track_facing_threshold: 0.9,
            sensor_offset: 0.5,
            correlation_length: 15.0,
            velocity_samples: 12_000,
            frequency_prefix: 1_000,
            pairing_tolerance_ms: 3,
            pairing_lookbehind: 3,
            pairing_span: 6,
            require_accelerometer: false,
        }
    }
}

/// Input payload for a processing stage.
///
/// The dataset is moved into the stage; `auxiliary` carries a second series
/// for stages that need one (external GNSS fixes, the retained full-rate
/// series).
#[derive(Debug, Clone)]
pub struct StageInput {
    pub dataset: Dataset,
    pub auxiliary: Option<Dataset>,
}

impl StageInput {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            dataset,
            auxiliary: None,
        }
    }

    pub fn with_auxiliary(dataset: Dataset, auxiliary: Option<Dataset>) -> Self {
        Self { dataset, auxiliary }
    }
}

/// Output produced by each stage.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub dataset: Dataset,
    pub auxiliary: Option<Dataset>,
    pub metadata: StageMetadata,
}

impl StageOutput {
    pub fn new(dataset: Dataset, metadata: StageMetadata) -> Self {
        Self {
            dataset,
            auxiliary: None,
            metadata,
        }
    }
}

/// Metadata used for chaining stages and telemetry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageMetadata {
    pub track_count: Option<usize>,
    pub window_size: Option<usize>,
    pub dropped: Option<usize>,
    pub notes: Vec<String>,
}

/// Common error type for stage execution.
#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error("missing time reference: {0}")]
    MissingReference(String),
    #[error("sensor pairing failed at raw timestamp {timestamp}: {detail}")]
    SensorPairing { timestamp: i64, detail: String },
    #[error("geometry invariant violated at row {index}: {detail}")]
    Geometry { index: usize, detail: String },
    #[error("interpolation time {t} outside bracket [{t1}, {t2}]")]
    InterpolationBounds { t: i64, t1: i64, t2: i64 },
    #[error("cannot estimate vehicle speed: {0}")]
    Velocity(String),
    #[error("calibration document invalid: {0}")]
    Calibration(String),
    #[error("geomagnetic reference model failed: {0}")]
    ReferenceModel(String),
    #[error("schema violation: {0}")]
    Schema(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("internal failure: {0}")]
    Internal(String),
}

pub type StageResult<T> = Result<T, StageError>;

/// Trait describing one step of the preprocessing pipeline.
pub trait ProcessingStage {
    fn name(&self) -> &'static str;
    fn initialize(&mut self, config: &StageConfig) -> StageResult<()>;
    fn execute(&mut self, input: StageInput, log: &LogManager) -> StageResult<StageOutput>;
    fn cleanup(&mut self);
}
