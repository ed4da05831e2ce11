use crate::dataset::{Attribute, Dataset};
use crate::math::geodesy;
use crate::math::stats::StatsHelper;
use crate::prelude::{
    ProcessingStage, StageConfig, StageError, StageInput, StageMetadata, StageOutput, StageResult,
};
use crate::processing::geometry::line_id;
use crate::telemetry::log::LogManager;

pub fn total_field(field: [f64; 3]) -> f64 {
    let [x, y, z] = field;
    StatsHelper::round_to((x * x + y * y + z * z).sqrt(), 2)
}

/// Writes the rounded norm of the primary triad into every sample.
pub struct TotalFieldStage {
    config: Option<StageConfig>,
}

impl TotalFieldStage {
    pub fn new() -> Self {
        Self { config: None }
    }
}

impl Default for TotalFieldStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for TotalFieldStage {
    fn name(&self) -> &'static str {
        "total_field"
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
        let mut missing = 0;
        for sample in dataset.samples.iter_mut() {
            sample.total_field = sample.mag1.map(total_field);
            if sample.total_field.is_none() {
                missing += 1;
            }
        }
        if missing > 0 {
            log.warn(&format!("{} samples have no magnetometer triad", missing));
        }
        log.record(&format!("total field computed for {} samples", dataset.len() - missing));
        Ok(StageOutput::new(dataset, StageMetadata::default()))
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}

/// Mean speed in metres per millisecond over consecutive fixes.
/// Pairs sharing a timestamp are skipped.
pub fn mean_speed(points: &[(i64, f64, f64)]) -> Option<f64> {
    let speeds: Vec<f64> = points
        .windows(2)
        .filter_map(|w| {
            let (t1, lat1, lon1) = w[0];
            let (t2, lat2, lon2) = w[1];
            if t2 == t1 {
                return None;
            }
            Some(geodesy::distance(lat1, lon1, lat2, lon2) / (t2 - t1) as f64)
        })
        .collect();
    StatsHelper::mean(&speeds)
}

/// Average vehicle speed (m/ms) across tracks, each estimated from the
/// first `prefix` samples of its sensor-1 line.
pub fn survey_speed(dataset: &Dataset, prefix: usize) -> StageResult<f64> {
    let mut speeds = Vec::new();
    for track in dataset.track_ids() {
        let line = line_id(track, 1);
        let points: Vec<(i64, f64, f64)> = dataset
            .samples
            .iter()
            .filter(|s| s.line_id == Some(line))
            .take(prefix)
            .filter_map(|s| {
                let (lat, lon) = s.position.lat_lon()?;
                Some((s.utc_timestamp?, lat, lon))
            })
            .collect();
        if let Some(speed) = mean_speed(&points) {
            speeds.push(speed);
        }
    }
    StatsHelper::mean(&speeds)
        .ok_or_else(|| StageError::Velocity("no track has two timed fixes".into()))
}

/// Number of samples spanning `correlation_length` metres at `speed`
/// (m/ms) when sampled every `period_ms`.
pub fn window_size(correlation_length: f64, speed: f64, period_ms: f64) -> StageResult<usize> {
    if !(speed > 0.0) || !speed.is_finite() {
        return Err(StageError::Velocity(format!("unusable speed {} m/ms", speed)));
    }
    if !(period_ms > 0.0) {
        return Err(StageError::Velocity(format!("unusable period {} ms", period_ms)));
    }
    let delta_ms = correlation_length / speed;
    Ok(((delta_ms / period_ms).ceil() as usize).max(1))
}

/// Total field minus a running trend, rounded to 0.01.
///
/// The trend is the median of a centred window of `2 * (window / 2) + 1`
/// values. The first `window / 2` values take the mean of the first
/// `window` values instead, and the tail takes the median of the last
/// `window` values.
pub fn residual_series(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    let window = window.max(1).min(n);
    let half = window / 2;
    let mut trend = Vec::with_capacity(n);

    let head = StatsHelper::mean(&values[..window]).unwrap_or(0.0);
    trend.extend(std::iter::repeat(head).take(half.min(n)));

    let mut i = half;
    while i + half < n {
        let centred = &values[i - half..=i + half];
        trend.push(StatsHelper::median(centred).unwrap_or(values[i]));
        i += 1;
    }

    let tail = StatsHelper::median(&values[n - window..]).unwrap_or(0.0);
    while trend.len() < n {
        trend.push(tail);
    }

    values
        .iter()
        .zip(trend)
        .map(|(value, trend)| StatsHelper::round_to(value - trend, 2))
        .collect()
}

/// Subtracts the per-sensor trend from the total field. The trend window
/// follows from vehicle speed and the spatial correlation length.
pub struct ResidualFieldStage {
    config: Option<StageConfig>,
}

impl ResidualFieldStage {
    pub fn new() -> Self {
        Self { config: None }
    }
}

impl Default for ResidualFieldStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for ResidualFieldStage {
    fn name(&self) -> &'static str {
        "residual_field"
    }

    fn initialize(&mut self, config: &StageConfig) -> StageResult<()> {
        if config.correlation_length <= 0.0 {
            return Err(StageError::InvalidInput(
                "correlation length must be positive".into(),
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

        let speed = survey_speed(&dataset, config.velocity_samples)?;
        let hz = dataset
            .column_frequency(Attribute::Timestamp, config.frequency_prefix)
            .ok_or_else(|| StageError::Velocity("sampling period undetermined".into()))?;
        let period_ms = 1000.0 / f64::from(hz);
        let window = window_size(config.correlation_length, speed, period_ms)?;
        log.detail(&format!(
            "speed {:.3} m/s, period {:.1} ms, window {} samples",
            speed * 1000.0,
            period_ms,
            window
        ));

        for sensor in [1u8, 2] {
            let rows: Vec<usize> = dataset
                .samples
                .iter()
                .enumerate()
                .filter(|(_, s)| s.sensor_id == Some(sensor) && s.total_field.is_some())
                .map(|(i, _)| i)
                .collect();
            let values: Vec<f64> = rows
                .iter()
                .filter_map(|&i| dataset.samples[i].total_field)
                .collect();
            let residuals = residual_series(&values, window);
            for (&row, residual) in rows.iter().zip(residuals) {
                dataset.samples[row].residual_field = Some(residual);
            }
        }

        log.record(&format!("residual field computed with window {}", window));
        let metadata = StageMetadata {
            window_size: Some(window),
            ..Default::default()
        };
        Ok(StageOutput::new(dataset, metadata))
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}
