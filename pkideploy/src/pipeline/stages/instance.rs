//! Instance-wide layout, created by the first subsystem only.

use crate::pipeline::teardown::{self, Scope};
use crate::pipeline::{DeployStage, DeploymentContext, StageName};
use async_trait::async_trait;
use pkideploy_shared::constants::permissions;
use pkideploy_shared::errors::DeployResult;

pub struct Instance;

#[async_trait]
impl DeployStage for Instance {
    fn name(&self) -> StageName {
        StageName::Instance
    }

    async fn spawn(&self, ctx: &mut DeploymentContext) -> DeployResult<()> {
        if !ctx.owns_instance() {
            tracing::info!(
                instance = ctx.params.layout.instance_name(),
                siblings = ?ctx.siblings,
                "Instance already laid out; skipping instance-wide resources"
            );
            return Ok(());
        }

        let (params, mut fs) = ctx.recorder();
        let layout = &params.layout;

        for dir in [
            layout.instance_path(),
            layout.instance_configuration_path(),
            layout.instance_log_path(),
            layout.instance_registry_path(),
            layout.webapps_path(),
            layout.work_path(),
            layout.temp_path(),
            layout.lib_path(),
            layout.database_path(),
        ] {
            fs.create_dir(&dir, permissions::DIR)?;
        }

        fs.copy_tree(&layout.shared_webapps_template_dir(), &layout.webapps_path())?;

        fs.symlink(layout.systemd_unit_file(), &layout.systemd_wants_link())?;
        fs.symlink(
            &layout.instance_configuration_path(),
            &layout.instance_conf_link(),
        )?;
        fs.symlink(&layout.instance_log_path(), &layout.instance_logs_link())?;
        fs.symlink(&layout.database_path(), &layout.instance_alias_link())?;

        tracing::info!(path = %layout.instance_path().display(), "Created instance");
        Ok(())
    }

    async fn destroy(&self, ctx: &mut DeploymentContext) -> DeployResult<()> {
        if !ctx.owns_instance() {
            tracing::info!(
                siblings = ?ctx.siblings,
                "Other subsystems remain; keeping instance"
            );
            return Ok(());
        }

        teardown::remove_scope(ctx, Scope::Instance)?;

        let layout = &ctx.params.layout;
        let mut trees = vec![
            layout.instance_path(),
            layout.instance_configuration_path(),
            layout.instance_registry_path(),
            layout.systemd_wants_link(),
            layout.sysconfig_instance_file(),
        ];
        if ctx.remove_logs {
            trees.push(layout.instance_log_path());
        }
        teardown::remove_trees(&trees)?;

        tracing::info!(instance = layout.instance_name(), "Removed instance");
        Ok(())
    }
}
