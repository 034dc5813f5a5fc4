//! Ordered spawn/destroy stages.
//!
//! ```text
//! spawn:   Infrastructure → Instance → Subsystem → SecurityDatabases
//!          → SlotSubstitution → SELinux → Configuration → Finalization
//! destroy: the same list, last to first
//! ```
//!
//! The order is data: [`DeployPipeline::standard`] builds the list and
//! [`DeployPipeline::names`] exposes it. Partial runs are expressed by skip
//! flags, never by a different list: `pki_skip_installation` skips every
//! stage before Configuration and `pki_skip_configuration` skips
//! Configuration. Finalization always runs.

mod context;
mod metrics;
pub mod stages;
mod teardown;

pub use context::DeploymentContext;
pub use metrics::{PipelineMetrics, StageMetrics};
pub use teardown::{Scope, classify};

use crate::params::ScenarioFlags;
use async_trait::async_trait;
use pkideploy_shared::errors::DeployResult;
use std::fmt;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageName {
    Infrastructure,
    Instance,
    Subsystem,
    SecurityDatabases,
    SlotSubstitution,
    Selinux,
    Configuration,
    Finalization,
}

impl StageName {
    pub fn as_str(self) -> &'static str {
        match self {
            StageName::Infrastructure => "infrastructure",
            StageName::Instance => "instance",
            StageName::Subsystem => "subsystem",
            StageName::SecurityDatabases => "security_databases",
            StageName::SlotSubstitution => "slot_substitution",
            StageName::Selinux => "selinux",
            StageName::Configuration => "configuration",
            StageName::Finalization => "finalization",
        }
    }

    /// Whether the scenario turns this stage's spawn into a no-op.
    pub fn skipped_by(self, scenario: &ScenarioFlags) -> bool {
        match self {
            StageName::Infrastructure
            | StageName::Instance
            | StageName::Subsystem
            | StageName::SecurityDatabases
            | StageName::SlotSubstitution
            | StageName::Selinux => scenario.skip_installation,
            StageName::Configuration => scenario.skip_configuration,
            StageName::Finalization => false,
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named unit of the pipeline.
#[async_trait]
pub trait DeployStage: Send + Sync {
    fn name(&self) -> StageName;

    async fn spawn(&self, ctx: &mut DeploymentContext) -> DeployResult<()>;

    async fn destroy(&self, ctx: &mut DeploymentContext) -> DeployResult<()>;
}

pub type BoxedStage = Box<dyn DeployStage>;

pub struct DeployPipeline {
    stages: Vec<BoxedStage>,
}

impl DeployPipeline {
    pub fn new(stages: Vec<BoxedStage>) -> Self {
        Self { stages }
    }

    /// The eight product stages in spawn order.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(stages::Infrastructure),
            Box::new(stages::Instance),
            Box::new(stages::Subsystem),
            Box::new(stages::SecurityDatabases),
            Box::new(stages::SlotSubstitution),
            Box::new(stages::Selinux),
            Box::new(stages::Configuration),
            Box::new(stages::Finalization),
        ])
    }

    pub fn names(&self) -> Vec<StageName> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order. The first failing stage aborts the run.
    pub async fn spawn(&self, ctx: &mut DeploymentContext) -> DeployResult<PipelineMetrics> {
        let total_start = Instant::now();
        let mut stage_metrics = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let name = stage.name();
            if name.skipped_by(&ctx.params.scenario) {
                tracing::info!(stage = %name, "Skipping stage");
                stage_metrics.push(StageMetrics::skipped(name));
                continue;
            }

            tracing::info!(stage = %name, "Spawning");
            let stage_start = Instant::now();
            if let Err(e) = stage.spawn(ctx).await {
                tracing::error!(stage = %name, error = %e, "Stage failed");
                return Err(e);
            }
            stage_metrics.push(StageMetrics::ran(name, stage_start));
        }

        Ok(PipelineMetrics {
            total_duration_ms: total_start.elapsed().as_millis(),
            stages: stage_metrics,
        })
    }

    /// Run every stage's destroy, last stage first.
    pub async fn destroy(&self, ctx: &mut DeploymentContext) -> DeployResult<PipelineMetrics> {
        let total_start = Instant::now();
        let mut stage_metrics = Vec::with_capacity(self.stages.len());

        for stage in self.stages.iter().rev() {
            let name = stage.name();
            tracing::info!(stage = %name, "Destroying");
            let stage_start = Instant::now();
            if let Err(e) = stage.destroy(ctx).await {
                tracing::error!(stage = %name, error = %e, "Stage failed");
                return Err(e);
            }
            stage_metrics.push(StageMetrics::ran(name, stage_start));
        }

        Ok(PipelineMetrics {
            total_duration_ms: total_start.elapsed().as_millis(),
            stages: stage_metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_order() {
        assert_eq!(
            DeployPipeline::standard().names(),
            vec![
                StageName::Infrastructure,
                StageName::Instance,
                StageName::Subsystem,
                StageName::SecurityDatabases,
                StageName::SlotSubstitution,
                StageName::Selinux,
                StageName::Configuration,
                StageName::Finalization,
            ]
        );
    }

    #[test]
    fn test_skip_flags() {
        let layout_only = ScenarioFlags {
            skip_configuration: true,
            ..Default::default()
        };
        let config_only = ScenarioFlags {
            skip_installation: true,
            ..Default::default()
        };

        let names = DeployPipeline::standard().names();
        let skipped = |flags: &ScenarioFlags| -> Vec<StageName> {
            names
                .iter()
                .copied()
                .filter(|n| n.skipped_by(flags))
                .collect()
        };

        assert_eq!(skipped(&layout_only), vec![StageName::Configuration]);
        assert_eq!(skipped(&config_only).len(), 6);
        assert!(!StageName::Finalization.skipped_by(&config_only));
        assert!(skipped(&ScenarioFlags::default()).is_empty());
    }
}
