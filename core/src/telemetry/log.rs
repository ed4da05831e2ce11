use log::{debug, info, warn};

/// Log sink handed to every stage so the core keeps no process-wide state.
///
/// Records are forwarded to the `log` facade under a per-stage target.
#[derive(Debug, Clone)]
pub struct LogManager {
    target: String,
}

impl LogManager {
    pub fn new() -> Self {
        Self {
            target: "magcore".to_string(),
        }
    }

    /// Sink scoped to one stage, e.g. `magcore::segmentation`.
    pub fn scoped(&self, stage: &str) -> Self {
        Self {
            target: format!("{}::{}", self.target, stage),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn record(&self, message: &str) {
        info!(target: self.target.as_str(), "{}", message);
    }

    pub fn detail(&self, message: &str) {
        debug!(target: self.target.as_str(), "{}", message);
    }

    pub fn warn(&self, message: &str) {
        warn!(target: self.target.as_str(), "{}", message);
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_target_nests_stage_name() {
        let log = LogManager::new().scoped("time_sync");
        assert_eq!(log.target(), "magcore::time_sync");
    }
}
