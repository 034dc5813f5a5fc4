//! Instance-specific files generated from shared templates.

use crate::params::layout::names;
use crate::pipeline::{DeployStage, DeploymentContext, StageName};
use crate::template;
use async_trait::async_trait;
use pkideploy_shared::constants::permissions;
use pkideploy_shared::errors::DeployResult;
use std::path::PathBuf;

pub struct SlotSubstitution;

#[async_trait]
impl DeployStage for SlotSubstitution {
    fn name(&self) -> StageName {
        StageName::SlotSubstitution
    }

    async fn spawn(&self, ctx: &mut DeploymentContext) -> DeployResult<()> {
        let owns_instance = ctx.owns_instance();
        let (params, mut fs) = ctx.recorder();
        let layout = &params.layout;
        let slots = &params.slots;

        let mut copies: Vec<(PathBuf, PathBuf)> = Vec::new();
        if owns_instance {
            let conf = layout.server_template_dir();
            let etc = layout.server_etc_template_dir();
            copies.extend([
                (conf.join(names::SERVER_XML), layout.target_server_xml()),
                (
                    conf.join(names::CATALINA_PROPERTIES),
                    layout.target_catalina_properties(),
                ),
                (conf.join(names::TOMCAT_CONF), layout.target_tomcat_conf()),
                (
                    etc.join(names::SYSCONFIG_TEMPLATE),
                    layout.sysconfig_instance_file(),
                ),
                (
                    etc.join(names::REGISTRY_TEMPLATE),
                    layout.instance_registry_file(),
                ),
            ]);
        }
        copies.push((
            layout.subsystem_template_dir().join(names::CS_CFG),
            layout.target_cs_cfg(),
        ));

        for (src, dst) in &copies {
            fs.copy_with_substitution(src, dst, slots, permissions::FILE, false)?;
        }

        // Already copied with the webapp tree; only their tokens change
        for path in [layout.target_web_xml(), layout.target_velocity_properties()] {
            if path.exists() {
                template::apply_in_place(&path, slots)?;
            }
        }

        tracing::info!(files = copies.len(), "Generated files from templates");
        Ok(())
    }

    async fn destroy(&self, _ctx: &mut DeploymentContext) -> DeployResult<()> {
        tracing::debug!("Generated files are removed with their directories");
        Ok(())
    }
}
