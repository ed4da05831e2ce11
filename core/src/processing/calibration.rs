use crate::math::matrix::MatrixHelper;
use crate::math::stats::StatsHelper;
use crate::prelude::{
    ProcessingStage, StageConfig, StageError, StageInput, StageMetadata, StageOutput, StageResult,
};
use crate::telemetry::log::LogManager;
use ndarray::{Array1, Array2};

const MATRIX_HEADER: &str = ".KorrMatrix:";
const OFFSET_HEADER: &str = ".OffsetKorr:";

/// Per-sensor correction: `corrected = matrix · (raw + offset)`.
#[derive(Debug, Clone, PartialEq)]
pub struct MagCalibration {
    pub matrix: Array2<f64>,
    pub offset: Array1<f64>,
}

impl MagCalibration {
    pub fn apply(&self, raw: [f64; 3]) -> [f64; 3] {
        let corrected = MatrixHelper::correct(&self.matrix, &self.offset, raw);
        corrected.map(|v| StatsHelper::round_to(v, 2))
    }
}

fn parse_slash_separated(line: &str, line_no: usize) -> StageResult<Vec<f64>> {
    line.split('/')
        .map(|part| {
            part.trim().parse::<f64>().map_err(|e| {
                StageError::Calibration(format!("line {}: '{}': {}", line_no + 1, part.trim(), e))
            })
        })
        .collect()
}

fn parse_triple(line: &str, line_no: usize) -> StageResult<Vec<f64>> {
    let values = parse_slash_separated(line, line_no)?;
    if values.len() != 3 {
        return Err(StageError::Calibration(format!(
            "line {}: expected 3 values, got {}",
            line_no + 1,
            values.len()
        )));
    }
    Ok(values)
}

/// Reads every `.KorrMatrix:`/`.OffsetKorr:` block of a system-info
/// document, pairing them up in order of appearance.
pub fn parse_calibrations(document: &str) -> StageResult<Vec<MagCalibration>> {
    let lines: Vec<&str> = document.lines().collect();
    let mut matrices = Vec::new();
    let mut offsets = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        match lines[i].trim() {
            MATRIX_HEADER => {
                if i + 3 >= lines.len() {
                    return Err(StageError::Calibration(format!(
                        "not enough lines after {} at line {}",
                        MATRIX_HEADER,
                        i + 1
                    )));
                }
                let mut flat = Vec::with_capacity(9);
                for row in 1..=3 {
                    flat.extend(parse_triple(lines[i + row], i + row)?);
                }
                let matrix = Array2::from_shape_vec((3, 3), flat)
                    .map_err(|e| StageError::Calibration(e.to_string()))?;
                matrices.push(matrix);
                i += 4;
            }
            OFFSET_HEADER => {
                if i + 1 >= lines.len() {
                    return Err(StageError::Calibration(format!(
                        "not enough lines after {} at line {}",
                        OFFSET_HEADER,
                        i + 1
                    )));
                }
                offsets.push(Array1::from_vec(parse_triple(lines[i + 1], i + 1)?));
                i += 2;
            }
            _ => i += 1,
        }
    }

    if matrices.len() != offsets.len() {
        return Err(StageError::Calibration(format!(
            "{} correction matrices but {} offsets",
            matrices.len(),
            offsets.len()
        )));
    }

    Ok(matrices
        .into_iter()
        .zip(offsets)
        .map(|(matrix, offset)| MagCalibration { matrix, offset })
        .collect())
}

/// Applies the two magnetometer corrections in place.
pub struct CalibrationStage {
    sensors: Vec<MagCalibration>,
    config: Option<StageConfig>,
}

impl CalibrationStage {
    pub fn new(sensors: Vec<MagCalibration>) -> Self {
        Self {
            sensors,
            config: None,
        }
    }

    pub fn from_document(document: &str) -> StageResult<Self> {
        Ok(Self::new(parse_calibrations(document)?))
    }
}

impl ProcessingStage for CalibrationStage {
    fn name(&self) -> &'static str {
        "calibration"
    }

    fn initialize(&mut self, config: &StageConfig) -> StageResult<()> {
        if self.sensors.len() < 2 {
            return Err(StageError::Calibration(format!(
                "two magnetometer corrections required, found {}",
                self.sensors.len()
            )));
        }
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, input: StageInput, log: &LogManager) -> StageResult<StageOutput> {
        if self.config.is_none() {
            return Err(StageError::Internal("stage not initialized".into()));
        }
        let mut dataset = input.dataset;
        let (first, second) = (&self.sensors[0], &self.sensors[1]);

        let mut corrected = 0;
        for sample in dataset.samples.iter_mut() {
            if let Some(raw) = sample.mag1 {
                sample.mag1 = Some(first.apply(raw));
                corrected += 1;
            }
            if let Some(raw) = sample.mag2 {
                sample.mag2 = Some(second.apply(raw));
            }
        }

        log.record(&format!("calibrated {} magnetometer samples", corrected));
        Ok(StageOutput::new(dataset, StageMetadata::default()))
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Dataset, Sample, Schema};

    const DOCUMENT: &str = "\
[Sensor1]
.KorrMatrix:
 1.0 / 0.0 / 0.0
 0.0 / 2.0 / 0.0
 0.0 / 0.0 / 1.0
.OffsetKorr:
 10.0 / 0.0 / -5.0
[Sensor2]
.KorrMatrix:
1/0/0
0/1/0
0/0/1
.OffsetKorr:
0 / 0 / 0
";

    #[test]
    fn parses_blocks_in_order() {
        let sensors = parse_calibrations(DOCUMENT).unwrap();
        assert_eq!(sensors.len(), 2);
        assert_eq!(sensors[0].matrix[[1, 1]], 2.0);
        assert_eq!(sensors[0].offset[2], -5.0);
    }

    #[test]
    fn mismatched_block_counts_are_rejected() {
        let doc = ".KorrMatrix:\n1/0/0\n0/1/0\n0/0/1\n";
        assert!(matches!(
            parse_calibrations(doc),
            Err(StageError::Calibration(_))
        ));
    }

    #[test]
    fn truncated_matrix_is_rejected() {
        assert!(parse_calibrations(".KorrMatrix:\n1/0/0\n").is_err());
    }

    #[test]
    fn stage_corrects_both_sensors() {
        let mut stage = CalibrationStage::from_document(DOCUMENT).unwrap();
        stage.initialize(&StageConfig::default()).unwrap();

        let mut sample = Sample::at(0);
        sample.mag1 = Some([1.0, 1.0, 1.0]);
        sample.mag2 = Some([3.333, 1.0, 1.0]);
        let data = Dataset::from_samples(Schema::raw(), vec![sample]);

        let output = stage
            .execute(StageInput::new(data), &LogManager::new())
            .unwrap();
        let s = &output.dataset.samples[0];
        assert_eq!(s.mag1, Some([11.0, 2.0, -4.0]));
        assert_eq!(s.mag2, Some([3.33, 1.0, 1.0]));
        stage.cleanup();
    }

    #[test]
    fn single_sensor_document_fails_initialization() {
        let doc = ".KorrMatrix:\n1/0/0\n0/1/0\n0/0/1\n.OffsetKorr:\n0/0/0\n";
        let mut stage = CalibrationStage::from_document(doc).unwrap();
        assert!(stage.initialize(&StageConfig::default()).is_err());
    }
}
