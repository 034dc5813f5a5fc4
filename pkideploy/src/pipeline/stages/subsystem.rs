//! Directories, profiles, webapp and links of one subsystem.

use crate::pipeline::teardown::{self, Scope};
use crate::pipeline::{DeployStage, DeploymentContext, StageName};
use async_trait::async_trait;
use pkideploy_shared::constants::permissions;
use pkideploy_shared::errors::DeployResult;

pub struct Subsystem;

#[async_trait]
impl DeployStage for Subsystem {
    fn name(&self) -> StageName {
        StageName::Subsystem
    }

    async fn spawn(&self, ctx: &mut DeploymentContext) -> DeployResult<()> {
        let (params, mut fs) = ctx.recorder();
        let layout = &params.layout;

        for dir in [
            layout.subsystem_path(),
            layout.subsystem_configuration_path(),
            layout.subsystem_log_path(),
            layout.subsystem_archive_log_path(),
            layout.subsystem_signed_audit_log_path(),
            layout.subsystem_registry_path(),
        ] {
            fs.create_dir(&dir, permissions::DIR)?;
        }

        fs.copy_tree(
            &layout.subsystem_profiles_template_dir(),
            &layout.subsystem_profiles_path(),
        )?;
        fs.copy_tree(
            &layout.subsystem_webapp_template_dir(),
            &layout.webapp_subsystem_path(),
        )?;

        fs.symlink(
            &layout.subsystem_configuration_path(),
            &layout.subsystem_conf_link(),
        )?;
        fs.symlink(&layout.subsystem_log_path(), &layout.subsystem_logs_link())?;
        fs.symlink(
            &layout.subsystem_registry_path(),
            &layout.subsystem_registry_link(),
        )?;
        fs.symlink(&layout.database_path(), &layout.subsystem_alias_link())?;

        tracing::info!(
            subsystem = %layout.subsystem(),
            path = %layout.subsystem_path().display(),
            "Created subsystem"
        );
        Ok(())
    }

    async fn destroy(&self, ctx: &mut DeploymentContext) -> DeployResult<()> {
        teardown::remove_scope(ctx, Scope::Subsystem)?;

        let layout = &ctx.params.layout;
        let mut trees = vec![
            layout.subsystem_path(),
            layout.webapp_subsystem_path(),
            layout.subsystem_configuration_path(),
            layout.subsystem_registry_path(),
        ];
        if ctx.remove_logs {
            trees.push(layout.subsystem_log_path());
        }
        teardown::remove_trees(&trees)?;

        tracing::info!(subsystem = %layout.subsystem(), "Removed subsystem");
        Ok(())
    }
}
