//! Entry points tying resolution, validation and the pipeline together.

use crate::config::{IniDocument, ParameterStore};
use crate::manifest::ManifestLedger;
use crate::namespace::CollisionGuard;
use crate::params::{self, DeployMode, DeploymentLayout, ScenarioFlags, preflight};
use crate::pipeline::{DeployPipeline, DeploymentContext, PipelineMetrics};
use crate::process::{ProcessRunner, SystemRunner};
use crate::types::Subsystem;
use pkideploy_shared::errors::{DeployError, DeployResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Inputs of one `spawn`.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub default_config: PathBuf,
    pub user_config: Option<PathBuf>,
    pub slots_config: PathBuf,
    pub subsystem: Subsystem,
    /// `key=value` pairs applied on top of the subsystem section.
    pub overrides: Vec<(String, String)>,
    /// This run's log file, mentioned when the run finishes.
    pub log_file: Option<PathBuf>,
}

/// Inputs of one `destroy`.
#[derive(Debug, Clone)]
pub struct DestroyRequest {
    pub default_config: PathBuf,
    pub subsystem: Subsystem,
    pub instance_name: String,
    pub overrides: Vec<(String, String)>,
    pub remove_logs: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnOutcome {
    Finalized,
    /// External CA or standalone step one: CSRs written, awaiting signing.
    StepOneComplete { csr_paths: Vec<PathBuf> },
}

#[derive(Debug, Clone)]
pub struct SpawnReport {
    pub outcome: SpawnOutcome,
    pub instance_name: String,
    pub manifest_path: PathBuf,
    pub metrics: PipelineMetrics,
}

#[derive(Debug, Clone)]
pub struct DestroyReport {
    pub instance_name: String,
    /// Records found in the persisted manifest.
    pub records: usize,
    pub metrics: PipelineMetrics,
}

pub struct Deployer {
    runner: Arc<dyn ProcessRunner>,
    pipeline: DeployPipeline,
    startup_poll: Option<Duration>,
}

impl Default for Deployer {
    fn default() -> Self {
        Self::new(Arc::new(SystemRunner))
    }
}

impl Deployer {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            pipeline: DeployPipeline::standard(),
            startup_poll: None,
        }
    }

    /// Override the status poll interval used while waiting for startup.
    pub fn with_startup_poll(mut self, poll: Duration) -> Self {
        self.startup_poll = Some(poll);
        self
    }

    /// Install one subsystem.
    ///
    /// Every configuration and collision check runs before the first stage,
    /// so a failure of that kind leaves the filesystem untouched.
    pub async fn spawn(&self, request: SpawnRequest) -> DeployResult<SpawnReport> {
        let mut store = ParameterStore::resolve(
            &request.default_config,
            request.user_config.as_deref(),
            request.subsystem,
            &request.overrides,
        )?;
        if let Some(log_file) = &request.log_file {
            store.insert("pki_log_file", log_file.display().to_string());
        }
        let scenario = ScenarioFlags::from_store(&store)?;
        scenario.validate(request.subsystem)?;

        let slots = IniDocument::load(&request.slots_config)?;
        let params = params::derive(store, scenario, DeployMode::Spawn, &slots)?;
        preflight::validate(&params)?;

        if scenario.skip_installation {
            tracing::info!("Installation skipped; not checking for collisions");
        } else {
            CollisionGuard::new(&params.layout).check()?;
        }

        let manifest_path = params.layout.manifest_path();
        let persisted = if scenario.skip_installation && manifest_path.exists() {
            ManifestLedger::load(&manifest_path)?
        } else {
            Vec::new()
        };
        let instance_name = params.layout.instance_name().to_string();

        let mut ctx = self.context(params).with_persisted_manifest(persisted);
        let metrics = self.pipeline.spawn(&mut ctx).await?;

        let outcome = if ctx.step_one_complete {
            SpawnOutcome::StepOneComplete {
                csr_paths: std::mem::take(&mut ctx.csr_paths),
            }
        } else {
            SpawnOutcome::Finalized
        };
        Ok(SpawnReport {
            outcome,
            instance_name,
            manifest_path,
            metrics,
        })
    }

    /// Remove one subsystem installed by an earlier [`spawn`](Self::spawn).
    pub async fn destroy(&self, request: DestroyRequest) -> DeployResult<DestroyReport> {
        let mut overrides = request.overrides.clone();
        overrides.push(("pki_instance_name".into(), request.instance_name.clone()));

        let probe = ParameterStore::resolve(
            &request.default_config,
            None,
            request.subsystem,
            &overrides,
        )?;
        let layout = DeploymentLayout::from_store(&probe)?;
        if !layout.subsystem_path().exists() {
            return Err(DeployError::config(format!(
                "no {} subsystem in instance '{}' ({} does not exist)",
                request.subsystem,
                request.instance_name,
                layout.subsystem_path().display()
            )));
        }

        let replica = layout.deployment_replica_path();
        let replica = replica.exists().then_some(replica);
        if replica.is_none() {
            tracing::warn!("No deployment replica; destroying with default parameters");
        }
        let store = ParameterStore::resolve(
            &request.default_config,
            replica.as_deref(),
            request.subsystem,
            &overrides,
        )?;
        let scenario = ScenarioFlags::from_store(&store)?;
        let params = params::derive(store, scenario, DeployMode::Destroy, &IniDocument::default())?;

        let manifest_path = params.layout.manifest_path();
        let records = if manifest_path.exists() {
            ManifestLedger::load(&manifest_path)?
        } else {
            tracing::warn!(path = %manifest_path.display(), "No manifest; removing well-known paths only");
            Vec::new()
        };
        let record_count = records.len();

        let mut ctx = self
            .context(params)
            .with_persisted_manifest(records)
            .with_remove_logs(request.remove_logs);
        let metrics = self.pipeline.destroy(&mut ctx).await?;

        Ok(DestroyReport {
            instance_name: request.instance_name,
            records: record_count,
            metrics,
        })
    }

    fn context(&self, params: params::DeploymentParams) -> DeploymentContext {
        let ctx = DeploymentContext::new(params, Arc::clone(&self.runner));
        match self.startup_poll {
            Some(poll) => ctx.with_startup_poll(poll),
            None => ctx,
        }
    }
}
