//! Shared fixtures for pkideploy integration tests.
//!
//! A [`DeployRoot`] is a throwaway deployment root with the bundled default
//! configuration pointed into it and a minimal set of shared templates.
//! [`RecordingRunner`] stands in for every external tool, and
//! [`FsSnapshot`] captures a tree so tests can compare before and after.

mod root;
mod runner;
mod snapshot;

pub use root::{DeployRoot, TemplateSet};
pub use runner::RecordingRunner;
pub use snapshot::{FsSnapshot, NodeKind};

/// Default configuration shipped with the engine.
pub const BUNDLED_DEFAULTS: &str = include_str!("../../pkideploy/share/default.cfg");

/// Slot file shipped with the engine.
pub const BUNDLED_SLOTS: &str = include_str!("../../pkideploy/share/slots.cfg");
