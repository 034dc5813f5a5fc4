//! Shared NSS database and its password file.

use crate::params::layout::names;
use crate::pipeline::{DeployStage, DeploymentContext, StageName};
use crate::process::tools::{Certutil, Pk12util, secret_file};
use async_trait::async_trait;
use pkideploy_shared::constants::permissions;
use pkideploy_shared::errors::DeployResult;
use std::path::Path;

pub struct SecurityDatabases;

#[async_trait]
impl DeployStage for SecurityDatabases {
    fn name(&self) -> StageName {
        StageName::SecurityDatabases
    }

    async fn spawn(&self, ctx: &mut DeploymentContext) -> DeployResult<()> {
        let runner = ctx.runner();
        let (params, mut fs) = ctx.recorder();
        let layout = &params.layout;
        let pin = params.store.get("pki_pin")?;

        let password_conf = layout.password_conf();
        if !password_conf.exists() {
            fs.write_file(
                &password_conf,
                &format!("internal={pin}\n"),
                permissions::SECURITY_DATABASE,
            )?;
        }

        let database = layout.database_path();
        fs.create_dir(&database, permissions::DIR)?;
        let pin_file = secret_file(pin)?;

        if database.join(names::NSS_DB_FILES[0]).exists() {
            tracing::info!(path = %database.display(), "Security database already exists");
        } else {
            Certutil::new(runner.as_ref())
                .create_database(&database, pin_file.path())
                .await?;
            for file in names::NSS_DB_FILES {
                let path = database.join(file);
                if path.exists() {
                    fs.adopt(&path, permissions::SECURITY_DATABASE)?;
                } else {
                    tracing::warn!(path = %path.display(), "Security database file not found after creation");
                }
            }
            tracing::info!(path = %database.display(), "Created security database");
        }

        if params.scenario.clone {
            let p12 = params.store.get("pki_clone_pkcs12_path")?;
            let p12_password = params.store.get("pki_clone_pkcs12_password")?;
            Pk12util::new(runner.as_ref())
                .import(&database, pin_file.path(), Path::new(p12), p12_password)
                .await?;
            tracing::info!(bundle = p12, "Imported clone PKCS#12 bundle");
        }
        Ok(())
    }

    async fn destroy(&self, _ctx: &mut DeploymentContext) -> DeployResult<()> {
        tracing::debug!("Security databases are removed with the instance");
        Ok(())
    }
}
