//! File context and port labels.

use crate::params::DeploymentParams;
use crate::pipeline::{DeployStage, DeploymentContext, StageName};
use crate::process::tools;
use async_trait::async_trait;
use pkideploy_shared::constants::selinux;
use pkideploy_shared::errors::{Criticality, DeployResult};
use std::path::Path;

const PORT_KEYS: &[&str] = &[
    "pki_http_port",
    "pki_https_port",
    "pki_ajp_port",
    "pki_tomcat_server_port",
];

pub struct Selinux;

/// `semanage import` script adding (or deleting) the instance's labels.
///
/// Ports already labelled by the base policy are left alone.
pub fn policy_script(params: &DeploymentParams, add: bool) -> DeployResult<String> {
    let layout = &params.layout;
    let op = if add { "-a" } else { "-d" };

    let fcontext = |context: &str, path: &Path| {
        if add {
            format!("fcontext {op} -t {context} '{}(/.*)?'", path.display())
        } else {
            format!("fcontext {op} '{}(/.*)?'", path.display())
        }
    };
    let mut lines = vec![
        fcontext(selinux::INSTANCE_CONTEXT, &layout.instance_path()),
        fcontext(selinux::CONFIG_CONTEXT, &layout.instance_configuration_path()),
        fcontext(selinux::LOG_CONTEXT, &layout.instance_log_path()),
        fcontext(selinux::CERT_CONTEXT, &layout.database_path()),
    ];

    for key in PORT_KEYS {
        let port: u16 = params.store.get_parsed(key)?;
        if selinux::DEFAULT_PORTS.contains(&port) {
            continue;
        }
        if add {
            lines.push(format!("port {op} -t {} -p tcp {port}", selinux::PORT_CONTEXT));
        } else {
            lines.push(format!("port {op} -p tcp {port}"));
        }
    }

    let mut script = lines.join("\n");
    script.push('\n');
    Ok(script)
}

#[async_trait]
impl DeployStage for Selinux {
    fn name(&self) -> StageName {
        StageName::Selinux
    }

    async fn spawn(&self, ctx: &mut DeploymentContext) -> DeployResult<()> {
        let runner = ctx.runner();
        let tool = tools::Selinux::new(runner.as_ref());
        if !tool.is_enabled().await {
            tracing::info!("SELinux disabled; skipping labels");
            return Ok(());
        }

        let layout = &ctx.params.layout;
        if ctx.owns_instance() {
            let script = policy_script(&ctx.params, true)?;
            tool.import_with_retry(&script).await?;
        }

        tool.restorecon(&[
            &layout.instance_path(),
            &layout.instance_configuration_path(),
            &layout.instance_log_path(),
        ])
        .await?;
        tracing::info!("Applied SELinux labels");
        Ok(())
    }

    async fn destroy(&self, ctx: &mut DeploymentContext) -> DeployResult<()> {
        if !ctx.owns_instance() {
            return Ok(());
        }
        let runner = ctx.runner();
        let tool = tools::Selinux::new(runner.as_ref());
        if !tool.is_enabled().await {
            return Ok(());
        }

        let script = policy_script(&ctx.params, false)?;
        Criticality::BestEffort.absorb(
            tool.import_with_retry(&script).await,
            "removing SELinux labels",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IniDocument, ParameterStore};
    use crate::params::{DeployMode, ScenarioFlags, derive};
    use crate::types::Subsystem;

    fn params(https_port: u16) -> DeploymentParams {
        let defaults = IniDocument::parse(
            &format!(
                "\
[DEFAULT]
pki_instance_name = pki-tomcat
pki_hostname = pki.example.com
pki_path = /var/lib/pki
pki_log_path = /var/log/pki
pki_configuration_path = /etc/pki
pki_registry_path = /etc/sysconfig/pki
pki_share_path = /usr/share/pki
pki_systemd_path = /etc/systemd/system
pki_systemd_unit_file = /usr/lib/systemd/system/pki-tomcatd@.service
pki_sysconfig_path = /etc/sysconfig
pki_cgroup_path = /sys/fs/cgroup
pki_client_dir = /root/.dogtag
pki_user = pkiuser
pki_group = pkiuser
pki_uid = 17
pki_gid = 17
pki_http_port = 8080
pki_https_port = {https_port}
pki_ajp_port = 8009
pki_tomcat_server_port = 8005
"
            ),
            "test",
        )
        .unwrap();
        let mut store =
            ParameterStore::from_documents(defaults, IniDocument::default(), Subsystem::Tks, &[])
                .unwrap();
        for tag in crate::params::CertTag::ALL {
            for field in ["key_algorithm", "key_type", "nickname", "subject_dn", "token"] {
                store.insert(format!("pki_{tag}_{field}"), "x");
            }
            store.insert(format!("pki_{tag}_key_size"), "2048");
        }
        let scenario = ScenarioFlags::from_store(&store).unwrap();
        derive(store, scenario, DeployMode::Destroy, &IniDocument::default()).unwrap()
    }

    #[test]
    fn test_add_script_labels_paths_and_custom_ports() {
        let script = policy_script(&params(18443), true).unwrap();
        assert!(script.contains("fcontext -a -t pki_tomcat_var_lib_t '/var/lib/pki/pki-tomcat(/.*)?'"));
        assert!(script.contains("fcontext -a -t pki_tomcat_cert_t '/etc/pki/pki-tomcat/alias(/.*)?'"));
        assert!(script.contains("port -a -t http_port_t -p tcp 18443"));
        assert!(!script.contains("tcp 8080"));
    }

    #[test]
    fn test_delete_script_mirrors_add() {
        let script = policy_script(&params(8443), false).unwrap();
        assert!(script.contains("fcontext -d '/var/log/pki/pki-tomcat(/.*)?'"));
        assert!(!script.contains("port "));
        assert_eq!(script.lines().count(), 4);
    }
}
