use crate::generator::profile::{build_survey, GeneratorConfig};
use crate::io::csv::{read_dataset, write_dataset};
use crate::io::mdd::convert_mdd;
use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use magcore::dataset::{Dataset, Schema};
use magcore::device::combine_records;
use magcore::math::geomagnetic::WorldMagneticModel;
use magcore::prelude::{ProcessingStage, StageInput, StageOutput};
use magcore::processing::calibration::{parse_calibrations, MagCalibration};
use magcore::processing::{
    AttitudeStage, CalibrationStage, FrequencyIncreaseStage, FrequencyReduceStage,
    GnssFusionStage, InterpolationStage, ResidualFieldStage, SegmentationStage,
    SensorGeometryStage, TimeReference, TimeSyncStage, TotalFieldStage,
};
use magcore::telemetry::{LogManager, MetricsRecorder, MetricsSnapshot};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Where a run's samples come from.
#[derive(Debug, Clone)]
pub enum Source {
    Mdd(PathBuf),
    Csv(PathBuf),
    Synthetic(GeneratorConfig),
}

pub struct RunInputs {
    pub dataset: Dataset,
    pub calibrations: Option<Vec<MagCalibration>>,
    pub external: Option<Dataset>,
    pub reference: TimeReference,
}

pub struct WorkflowResult {
    pub dataset: Dataset,
    pub track_count: Option<usize>,
    pub window_size: Option<usize>,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub source: String,
    pub output: PathBuf,
    pub rows: usize,
    pub track_count: Option<usize>,
    pub window_size: Option<usize>,
    pub metrics: MetricsSnapshot,
}

/// `<stem>_prep.csv` beside the source unless `explicit` is given; `_eg`
/// marks output built on external GNSS fixes.
pub fn output_path(source: &Path, explicit: Option<&Path>, external: bool) -> PathBuf {
    let base = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let stem = source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "survey".to_string());
            source.with_file_name(format!("{}_prep.csv", stem))
        }
    };
    if !external {
        return base;
    }
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    base.with_file_name(format!("{}_eg.csv", stem))
}

fn summary_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!("{}_summary.json", stem))
}

fn schema_for(path: &Path) -> Schema {
    match path.extension().and_then(|e| e.to_str()) {
        Some("asc") => Schema::asc(),
        _ => Schema::raw(),
    }
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    fn run_stage(
        &self,
        stage: &mut dyn ProcessingStage,
        input: StageInput,
        metrics: &mut MetricsRecorder,
        log: &LogManager,
    ) -> anyhow::Result<StageOutput> {
        let name = stage.name();
        let stage_config = self.config.to_stage_config();
        stage
            .initialize(&stage_config)
            .with_context(|| format!("initializing {} stage", name))?;

        let rows_in = input.dataset.len();
        let result = stage.execute(input, &log.scoped(name));
        stage.cleanup();

        match result {
            Ok(output) => {
                metrics.record_stage(name, rows_in, output.dataset.len(), &output.metadata.notes);
                Ok(output)
            }
            Err(err) => {
                metrics.record_error();
                Err(anyhow::Error::new(err).context(format!("executing {} stage", name)))
            }
        }
    }

    /// Runs the stage sequence over one combined dataset.
    pub fn execute(&self, inputs: RunInputs) -> anyhow::Result<WorkflowResult> {
        let log = LogManager::new();
        let mut metrics = MetricsRecorder::new();
        let mut dataset = inputs.dataset;

        if let Some(calibrations) = inputs.calibrations {
            let mut stage = CalibrationStage::new(calibrations);
            dataset = self
                .run_stage(&mut stage, StageInput::new(dataset), &mut metrics, &log)?
                .dataset;
        }

        let mut time_sync = TimeSyncStage::new(inputs.reference);
        dataset = self
            .run_stage(&mut time_sync, StageInput::new(dataset), &mut metrics, &log)?
            .dataset;

        if let Some(external) = inputs.external {
            let mut fusion = GnssFusionStage::new();
            dataset = self
                .run_stage(
                    &mut fusion,
                    StageInput::with_auxiliary(dataset, Some(external)),
                    &mut metrics,
                    &log,
                )?
                .dataset;
        }

        let reduced = self.run_stage(
            &mut FrequencyReduceStage::new(),
            StageInput::new(dataset),
            &mut metrics,
            &log,
        )?;
        let retained = reduced.auxiliary;

        let segmented = self.run_stage(
            &mut SegmentationStage::new(),
            StageInput::new(reduced.dataset),
            &mut metrics,
            &log,
        )?;
        let track_count = segmented.metadata.track_count;

        let mut attitude = AttitudeStage::new(Box::new(WorldMagneticModel));
        dataset = self
            .run_stage(&mut attitude, StageInput::new(segmented.dataset), &mut metrics, &log)?
            .dataset;

        dataset = self
            .run_stage(
                &mut SensorGeometryStage::new(),
                StageInput::new(dataset),
                &mut metrics,
                &log,
            )?
            .dataset;

        dataset = self
            .run_stage(
                &mut FrequencyIncreaseStage::new(),
                StageInput::with_auxiliary(dataset, retained),
                &mut metrics,
                &log,
            )?
            .dataset;

        dataset = self
            .run_stage(
                &mut InterpolationStage::new(),
                StageInput::new(dataset),
                &mut metrics,
                &log,
            )?
            .dataset;

        dataset = self
            .run_stage(
                &mut TotalFieldStage::new(),
                StageInput::new(dataset),
                &mut metrics,
                &log,
            )?
            .dataset;

        let residual = self.run_stage(
            &mut ResidualFieldStage::new(),
            StageInput::new(dataset),
            &mut metrics,
            &log,
        )?;

        Ok(WorkflowResult {
            dataset: residual.dataset,
            track_count,
            window_size: residual.metadata.window_size,
            metrics: metrics.snapshot(),
        })
    }

    /// Loads `source`, runs the pipeline and writes the final CSV and its
    /// JSON summary.
    pub fn process(&self, source: &Source, output: Option<&Path>) -> anyhow::Result<RunSummary> {
        let stage_config = self.config.to_stage_config();
        let mut explicit = self.config.datetime.clone();

        let (dataset, source_path) = match source {
            Source::Mdd(path) => {
                let conversion = convert_mdd(path, &stage_config, self.config.save_original_format)?;
                log::info!("combined rows saved to {}", conversion.combined_path.display());
                (conversion.dataset, conversion.combined_path)
            }
            Source::Csv(path) => {
                let dataset = read_dataset(path, schema_for(path), self.config.delimiter_byte()?)?;
                (dataset, path.clone())
            }
            Source::Synthetic(generator) => {
                let survey = build_survey(generator)?;
                let log = LogManager::new().scoped("combine");
                let mut dataset = combine_records(&survey.records, &stage_config, &log)
                    .context("combining synthetic records")?;
                let name = format!("{}_synthetic", survey.datetime.replace('.', ""));
                dataset.source_name = Some(name.clone());
                explicit = explicit.or(Some(survey.datetime));
                (dataset, PathBuf::from(format!("{}.csv", name)))
            }
        };

        let calibrations = match &self.config.systeminfo_filepath {
            Some(path) => {
                let document = fs::read_to_string(path)
                    .with_context(|| format!("reading system info {}", path.display()))?;
                Some(
                    parse_calibrations(&document)
                        .with_context(|| format!("parsing system info {}", path.display()))?,
                )
            }
            None => None,
        };

        let external = match &self.config.gnss {
            Some(path) => Some(read_dataset(path, Schema::external_gnss(), None)?),
            None => None,
        };
        let uses_external = external.is_some();

        let reference = TimeReference {
            explicit,
            source_name: source_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned()),
        };

        let result = self
            .execute(RunInputs {
                dataset,
                calibrations,
                external,
                reference,
            })
            .with_context(|| format!("processing {}", source_path.display()))?;

        let explicit_output = output.map(Path::to_path_buf).or_else(|| self.config.output.clone());
        let output = output_path(&source_path, explicit_output.as_deref(), uses_external);
        write_dataset(&output, &result.dataset, Some(b';'))?;

        let summary = RunSummary {
            source: source_path.display().to_string(),
            output: output.clone(),
            rows: result.dataset.len(),
            track_count: result.track_count,
            window_size: result.window_size,
            metrics: result.metrics,
        };
        let summary_file = summary_path(&output);
        let json = serde_json::to_string_pretty(&summary).context("serializing run summary")?;
        fs::write(&summary_file, json)
            .with_context(|| format!("writing {}", summary_file.display()))?;
        log::info!(
            "{} rows written to {} ({} tracks)",
            summary.rows,
            output.display(),
            summary.track_count.unwrap_or(0)
        );
        Ok(summary)
    }
}
