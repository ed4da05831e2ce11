use crate::io::csv::write_dataset;
use anyhow::Context;
use magcore::dataset::Dataset;
use magcore::device::{combine_records, decode_records, RawRecord};
use magcore::telemetry::LogManager;
use magcore::StageConfig;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Files produced by one device dump conversion.
pub struct MddConversion {
    pub dataset: Dataset,
    pub combined_path: PathBuf,
    pub original_path: Option<PathBuf>,
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}{}", stem, suffix))
}

fn write_original_format(path: &Path, records: &[RawRecord]) -> anyhow::Result<()> {
    let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for record in records {
        writeln!(out, "{}", record)?;
    }
    out.flush()?;
    Ok(())
}

/// Decodes a binary device dump, combines its records into samples and
/// writes `<stem>_RF.csv` (plus `<stem>_OF.csv` when asked) beside it.
pub fn convert_mdd(path: &Path, config: &StageConfig, save_original: bool) -> anyhow::Result<MddConversion> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let log = LogManager::new().scoped("decoder");
    let report = decode_records(&bytes, &log);
    log::info!(
        "{}: {} records decoded, {} skipped",
        path.display(),
        report.records.len(),
        report.skipped
    );

    let original_path = if save_original {
        let target = sibling(path, "_OF.csv");
        write_original_format(&target, &report.records)?;
        Some(target)
    } else {
        None
    };

    let mut dataset = combine_records(&report.records, config, &log.scoped("combine"))
        .with_context(|| format!("combining records of {}", path.display()))?;
    let combined_path = sibling(path, "_RF.csv");
    write_dataset(&combined_path, &dataset, None)?;
    dataset.source_name = combined_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned());

    Ok(MddConversion {
        dataset,
        combined_path,
        original_path,
    })
}
