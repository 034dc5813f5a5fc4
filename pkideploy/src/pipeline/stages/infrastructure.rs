//! Base roots shared by every instance on the host.

use crate::fs::remove_empty_dir;
use crate::pipeline::teardown::{self, Scope};
use crate::pipeline::{DeployStage, DeploymentContext, StageName};
use async_trait::async_trait;
use pkideploy_shared::constants::permissions;
use pkideploy_shared::errors::DeployResult;
use std::cmp::Reverse;

pub struct Infrastructure;

#[async_trait]
impl DeployStage for Infrastructure {
    fn name(&self) -> StageName {
        StageName::Infrastructure
    }

    async fn spawn(&self, ctx: &mut DeploymentContext) -> DeployResult<()> {
        let (params, mut fs) = ctx.recorder();
        for root in params.layout.infrastructure_roots() {
            fs.create_dir(&root, permissions::DIR)?;
        }
        Ok(())
    }

    /// Base roots are recorded by the run that created them and removed once
    /// empty. That run may not be the last subsystem to leave, so the last
    /// one also sweeps whichever roots ended up empty.
    async fn destroy(&self, ctx: &mut DeploymentContext) -> DeployResult<()> {
        teardown::remove_scope(ctx, Scope::Infrastructure)?;
        if !ctx.owns_instance() {
            return Ok(());
        }

        let mut roots = ctx.params.layout.infrastructure_roots();
        roots.sort_by_key(|root| Reverse(root.components().count()));
        for root in roots {
            if remove_empty_dir(&root)? {
                tracing::debug!(path = %root.display(), "Removed empty base root");
            }
        }
        Ok(())
    }
}
