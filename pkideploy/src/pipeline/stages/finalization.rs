//! Service enablement, the deployment replica and the manifest.

use crate::pipeline::{DeployStage, DeploymentContext, StageName};
use crate::process::tools::Systemd;
use async_trait::async_trait;
use pkideploy_shared::constants::permissions;
use pkideploy_shared::errors::DeployResult;

const TARGET_UNIT: &str = "pki-tomcatd.target";

pub struct Finalization;

#[async_trait]
impl DeployStage for Finalization {
    fn name(&self) -> StageName {
        StageName::Finalization
    }

    async fn spawn(&self, ctx: &mut DeploymentContext) -> DeployResult<()> {
        let runner = ctx.runner();
        let systemd = Systemd::new(runner.as_ref());

        if !ctx.step_one_complete {
            systemd.enable(TARGET_UNIT).await?;
            let restart = ctx
                .params
                .store
                .get_bool("pki_restart_configured_instance")?;
            if restart && ctx.configured {
                systemd
                    .restart(&ctx.params.layout.systemd_service_name())
                    .await?;
            }
        }

        {
            let (params, mut fs) = ctx.recorder();
            fs.write_file(
                &params.layout.deployment_replica_path(),
                &params.store.redacted_user_config(),
                permissions::FILE,
            )?;
        }

        if ctx.params.scenario.skip_installation {
            // Keep what the installing run recorded
            let earlier = std::mem::take(&mut ctx.persisted_manifest);
            ctx.ledger.prepend_existing(earlier);
        }

        let manifest = ctx.params.layout.manifest_path();
        ctx.ledger.flush(&manifest)?;

        tracing::info!(
            records = ctx.ledger.len(),
            manifest = %manifest.display(),
            log = ctx.params.store.get_non_empty("pki_log_file").unwrap_or("-"),
            "Deployment finalized"
        );
        Ok(())
    }

    async fn destroy(&self, ctx: &mut DeploymentContext) -> DeployResult<()> {
        tracing::debug!(
            records = ctx.persisted_manifest.len(),
            "Replica and manifest are removed with the subsystem registry"
        );
        Ok(())
    }
}
