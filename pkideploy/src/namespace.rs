//! Pre-flight detection of instance namespace collisions.

use crate::params::DeploymentLayout;
use crate::types::WebServer;
use pkideploy_shared::constants::reserved_names;
use pkideploy_shared::errors::{DeployError, DeployResult};
use std::path::Path;

/// Read-only probe run before any stage.
pub struct CollisionGuard<'a> {
    layout: &'a DeploymentLayout,
}

impl<'a> CollisionGuard<'a> {
    pub fn new(layout: &'a DeploymentLayout) -> Self {
        Self { layout }
    }

    pub fn check(&self) -> DeployResult<()> {
        self.check_paths()?;
        check_reserved(
            self.layout.instance_name(),
            self.layout.subsystem().web_server(),
        )?;
        tracing::debug!(instance = self.layout.instance_name(), "No namespace collisions");
        Ok(())
    }

    fn check_paths(&self) -> DeployResult<()> {
        let layout = self.layout;

        if layout.instance_path().exists() {
            // Adding a subsystem to an instance is fine; re-adding one is not
            collide_if_both(
                &layout.instance_path(),
                &layout.subsystem_path(),
                "subsystem already exists in instance",
            )?;
        } else {
            let sysconfig = layout.sysconfig_instance_file();
            if sysconfig.exists() {
                return Err(collision(&sysconfig, "instance environment file already exists"));
            }
            for cgroup in layout.cgroup_service_paths() {
                if cgroup.exists() {
                    return Err(collision(&cgroup, "service control group already exists"));
                }
            }
        }

        collide_if_both(
            &layout.instance_log_path(),
            &layout.subsystem_log_path(),
            "subsystem log directory already exists",
        )?;
        collide_if_both(
            &layout.instance_configuration_path(),
            &layout.subsystem_configuration_path(),
            "subsystem configuration directory already exists",
        )?;
        collide_if_both(
            &layout.instance_registry_path(),
            &layout.subsystem_registry_path(),
            "subsystem registry already exists",
        )
    }
}

/// Reject instance names that would shadow product directories.
pub fn check_reserved(instance_name: &str, web_server: WebServer) -> DeployResult<()> {
    let registry = match web_server {
        WebServer::Apache => reserved_names::APACHE_REGISTRY,
        WebServer::Tomcat => reserved_names::TOMCAT_REGISTRY,
    };
    let layers = [
        (reserved_names::BASE, "base"),
        (reserved_names::CONFIGURATION, "configuration"),
        (registry, "registry"),
    ];

    for (names, layer) in layers {
        if names.contains(&instance_name) {
            return Err(DeployError::Collision(format!(
                "instance name '{instance_name}' is reserved under the {layer} root"
            )));
        }
    }
    Ok(())
}

fn collide_if_both(instance: &Path, subsystem: &Path, what: &str) -> DeployResult<()> {
    if instance.exists() && subsystem.exists() {
        return Err(collision(subsystem, what));
    }
    Ok(())
}

fn collision(path: &Path, what: &str) -> DeployError {
    DeployError::Collision(format!("{what}: {}", path.display()))
}
