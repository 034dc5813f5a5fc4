//! PKI Deploy - installer and uninstaller engine
//!
//! Lays out, configures and removes CA, KRA, OCSP, TKS and TPS subsystem
//! instances. A [`Deployer`] resolves the layered configuration, validates
//! it, and drives the stage pipeline forward (`spawn`) or in reverse
//! (`destroy`). Every filesystem object a spawn creates is recorded in the
//! subsystem manifest so destroy can undo exactly that.

pub mod config;
pub mod deployer;
pub mod fs;
pub mod manifest;
pub mod namespace;
pub mod params;
pub mod pipeline;
pub mod process;
pub mod remote;
pub mod security_domain;
pub mod template;
pub mod types;
pub mod util;

pub use config::{IniDocument, ParameterStore};
pub use deployer::{
    DestroyReport, DestroyRequest, Deployer, SpawnOutcome, SpawnReport, SpawnRequest,
};
pub use manifest::{EntryKind, ManifestLedger, ManifestRecord};
pub use namespace::CollisionGuard;
pub use params::{DeployMode, DeploymentLayout, DeploymentParams, ScenarioFlags};
pub use pipeline::{DeployPipeline, DeployStage, PipelineMetrics, StageMetrics, StageName};
pub use process::{CommandSpec, ProcessOutput, ProcessRunner, SystemRunner};
pub use security_domain::{DeregisterOutcome, DomainEndpoint, DomainMember, SecurityDomainClient};
pub use types::{SecurityDomainType, Subsystem, WebServer};

pub use pkideploy_shared::{Criticality, DeployError, DeployResult};
