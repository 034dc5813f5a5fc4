//! Manifest-driven removal for the destroy half of the layout stages.

use super::DeploymentContext;
use crate::fs::{remove_path, remove_recorded};
use crate::params::DeploymentLayout;
use pkideploy_shared::errors::DeployResult;
use std::path::{Path, PathBuf};

/// Which layout stage owns a recorded object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Infrastructure,
    Instance,
    Subsystem,
}

/// Assign a manifest path to the stage that removes it.
///
/// Subsystem trees win over everything, then the base roots and their
/// ancestors, then the instance trees and the files the instance drops
/// outside them. Anything else belongs to the subsystem.
pub fn classify(path: &Path, layout: &DeploymentLayout) -> Scope {
    if layout.subsystem_roots().iter().any(|root| path.starts_with(root)) {
        return Scope::Subsystem;
    }
    if layout
        .infrastructure_roots()
        .iter()
        .any(|root| root.starts_with(path))
    {
        return Scope::Infrastructure;
    }

    let roots = layout.instance_roots();
    let anchors = [
        layout.systemd_wants_link(),
        layout.sysconfig_instance_file(),
        layout.client_path(),
    ];
    if roots.iter().any(|root| path.starts_with(root))
        || anchors.iter().chain(roots.iter()).any(|anchor| anchor.starts_with(path))
    {
        return Scope::Instance;
    }
    Scope::Subsystem
}

/// Remove this run's manifest records for `scope`, newest first.
pub(crate) fn remove_scope(ctx: &DeploymentContext, scope: Scope) -> DeployResult<usize> {
    let layout = &ctx.params.layout;
    let log_root = layout.instance_log_path();
    let mut removed = 0;

    for record in ctx.persisted_manifest.iter().rev() {
        if classify(&record.name, layout) != scope {
            continue;
        }
        if !ctx.remove_logs && record.name.starts_with(&log_root) {
            continue;
        }
        if remove_recorded(record)? {
            removed += 1;
        }
    }
    tracing::debug!(?scope, removed, "Removed recorded objects");
    Ok(removed)
}

/// Remove well-known trees regardless of what the manifest says.
pub(crate) fn remove_trees(paths: &[PathBuf]) -> DeployResult<()> {
    for path in paths {
        remove_path(path)?;
    }
    Ok(())
}
