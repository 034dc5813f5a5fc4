use crate::fs::FsRecorder;
use crate::manifest::{ManifestLedger, ManifestRecord};
use crate::params::DeploymentParams;
use crate::process::ProcessRunner;
use crate::types::Subsystem;
use pkideploy_shared::constants::startup;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Everything a stage reads or writes during one run.
pub struct DeploymentContext {
    pub params: DeploymentParams,
    pub runner: Arc<dyn ProcessRunner>,
    /// Records of objects created by this run.
    pub ledger: ManifestLedger,
    /// Manifest written by an earlier run of the same subsystem.
    pub persisted_manifest: Vec<ManifestRecord>,
    /// Other subsystems present under the instance when the run started.
    pub siblings: Vec<Subsystem>,
    pub remove_logs: bool,
    pub startup_poll: Duration,
    pub install_token: Option<String>,
    /// Set once the configuration request has been accepted.
    pub configured: bool,
    pub step_one_complete: bool,
    pub csr_paths: Vec<PathBuf>,
}

impl DeploymentContext {
    pub fn new(params: DeploymentParams, runner: Arc<dyn ProcessRunner>) -> Self {
        let layout = &params.layout;
        let siblings: Vec<Subsystem> = Subsystem::ALL
            .into_iter()
            .filter(|s| *s != layout.subsystem() && layout.subsystem_path_for(*s).exists())
            .collect();
        tracing::debug!(?siblings, "Existing subsystems in instance");

        Self {
            params,
            runner,
            ledger: ManifestLedger::new(),
            persisted_manifest: Vec::new(),
            siblings,
            remove_logs: false,
            startup_poll: Duration::from_secs(startup::POLL_INTERVAL_SECS),
            install_token: None,
            configured: false,
            step_one_complete: false,
            csr_paths: Vec::new(),
        }
    }

    pub fn with_persisted_manifest(mut self, records: Vec<ManifestRecord>) -> Self {
        self.persisted_manifest = records;
        self
    }

    pub fn with_remove_logs(mut self, remove_logs: bool) -> Self {
        self.remove_logs = remove_logs;
        self
    }

    pub fn with_startup_poll(mut self, poll: Duration) -> Self {
        self.startup_poll = poll;
        self
    }

    /// No other subsystem lives in the instance, so instance-wide resources
    /// are created on spawn and removed on destroy.
    pub fn owns_instance(&self) -> bool {
        self.siblings.is_empty()
    }

    pub fn runner(&self) -> Arc<dyn ProcessRunner> {
        Arc::clone(&self.runner)
    }

    /// Parameters plus a recorder appending to this run's ledger.
    pub fn recorder(&mut self) -> (&DeploymentParams, FsRecorder<'_>) {
        (
            &self.params,
            FsRecorder::new(&self.params.identity, &mut self.ledger),
        )
    }
}
