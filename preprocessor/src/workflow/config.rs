use anyhow::{anyhow, Context};
use magcore::prelude::StageConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub mdd: Option<PathBuf>,
    pub src: Option<PathBuf>,
    pub output: Option<PathBuf>,
    /// Source CSV delimiter; the schema default when absent.
    pub delimiter: Option<String>,
    pub systeminfo_filepath: Option<PathBuf>,
    /// `YYYYMMDD_HHMMSS.S`
    pub datetime: Option<String>,
    pub gnss: Option<PathBuf>,
    pub mdd_dir: Option<PathBuf>,
    pub save_original_format: bool,
    pub stages: StageConfig,
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn to_stage_config(&self) -> StageConfig {
        self.stages.clone()
    }

    /// Single-byte delimiter for the source CSV, if one is configured.
    pub fn delimiter_byte(&self) -> anyhow::Result<Option<u8>> {
        let Some(text) = self.delimiter.as_deref() else {
            return Ok(None);
        };
        let text = match text {
            "\\t" | "tab" => "\t",
            other => other,
        };
        match text.as_bytes() {
            [byte] => Ok(Some(*byte)),
            _ => Err(anyhow!("delimiter must be a single byte, got '{}'", text)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn config_load_reads_yaml_with_stage_overrides() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"src: data/20250325_121959_RF.csv\ndelimiter: ';'\ngnss: null\nstages:\n  max_angle_diff: 25.0\n  correlation_length: 20.0\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();

        assert_eq!(cfg.src, Some(PathBuf::from("data/20250325_121959_RF.csv")));
        assert_eq!(cfg.delimiter_byte().unwrap(), Some(b';'));
        assert!(cfg.gnss.is_none());
        let stages = cfg.to_stage_config();
        assert_eq!(stages.max_angle_diff, 25.0);
        assert_eq!(stages.correlation_length, 20.0);
        assert_eq!(stages.tick_ms, 200);
    }

    #[test]
    fn empty_yaml_gives_defaults() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"{}\n").unwrap();
        let cfg = WorkflowConfig::load(temp.path()).unwrap();
        assert!(cfg.mdd.is_none());
        assert_eq!(cfg.stages.min_segment_len, 10.0);
    }

    #[test]
    fn delimiter_must_be_one_byte() {
        let cfg = WorkflowConfig {
            delimiter: Some(";;".into()),
            ..Default::default()
        };
        assert!(cfg.delimiter_byte().is_err());
        let tab = WorkflowConfig {
            delimiter: Some("\\t".into()),
            ..Default::default()
        };
        assert_eq!(tab.delimiter_byte().unwrap(), Some(b'\t'));
    }
}
