use super::StageName;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct StageMetrics {
    pub name: StageName,
    pub skipped: bool,
    pub duration_ms: u128,
}

impl StageMetrics {
    pub(crate) fn skipped(name: StageName) -> Self {
        Self {
            name,
            skipped: true,
            duration_ms: 0,
        }
    }

    pub(crate) fn ran(name: StageName, started: Instant) -> Self {
        Self {
            name,
            skipped: false,
            duration_ms: started.elapsed().as_millis(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_duration_ms: u128,
    pub stages: Vec<StageMetrics>,
}

impl PipelineMetrics {
    /// Stages that actually executed, in execution order.
    pub fn executed(&self) -> Vec<StageName> {
        self.stages
            .iter()
            .filter(|s| !s.skipped)
            .map(|s| s.name)
            .collect()
    }

    pub fn stage_duration_ms(&self, name: StageName) -> Option<u128> {
        self.stages
            .iter()
            .find(|s| s.name == name && !s.skipped)
            .map(|s| s.duration_ms)
    }
}
