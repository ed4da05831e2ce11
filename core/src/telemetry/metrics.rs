use serde::Serialize;

/// Per-stage row accounting collected by the runner.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StageMetric {
    pub stage: String,
    pub rows_in: usize,
    pub rows_out: usize,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub stages: Vec<StageMetric>,
    pub errors: usize,
}

pub struct MetricsRecorder {
    inner: MetricsSnapshot,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: MetricsSnapshot::default(),
        }
    }

    pub fn record_stage(&mut self, stage: &str, rows_in: usize, rows_out: usize, notes: &[String]) {
        self.inner.stages.push(StageMetric {
            stage: stage.to_string(),
            rows_in,
            rows_out,
            notes: notes.to_vec(),
        });
    }

    pub fn record_error(&mut self) {
        self.inner.errors += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.clone()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_keeps_stage_order() {
        let mut metrics = MetricsRecorder::new();
        metrics.record_stage("time_sync", 10, 10, &[]);
        metrics.record_stage("frequency_reduce", 10, 4, &["reduced".to_string()]);
        metrics.record_error();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.stages.len(), 2);
        assert_eq!(snapshot.stages[1].rows_out, 4);
        assert_eq!(snapshot.errors, 1);
    }
}
