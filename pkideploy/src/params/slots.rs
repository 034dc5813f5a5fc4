//! Template slot values and the token map built from them.

use super::identity::Identity;
use super::layout::DeploymentLayout;
use crate::config::{IniDocument, ParameterStore};
use crate::types::WebServer;
use pkideploy_shared::errors::{DeployError, DeployResult};

/// Compute every `PKI_*_SLOT` value and record it in the store.
pub fn publish_slot_values(
    store: &mut ParameterStore,
    layout: &DeploymentLayout,
    identity: &Identity,
    pin: &str,
) -> DeployResult<()> {
    let https = store.get("pki_https_port")?.to_string();
    let hostname = store.get("pki_hostname")?.to_string();
    let security_manager = if store.get_bool("pki_security_manager")? {
        "-security"
    } else {
        ""
    };

    let values = [
        (
            "PKI_INSTALL_TIME_SLOT",
            chrono::Local::now().format("%a %b %e %H:%M:%S %Y").to_string(),
        ),
        ("PKI_ADMIN_SECURE_PORT_SLOT", https.clone()),
        ("PKI_AGENT_SECURE_PORT_SLOT", https.clone()),
        ("PKI_EE_SECURE_PORT_SLOT", https.clone()),
        ("PKI_EE_SECURE_CLIENT_AUTH_PORT_SLOT", https),
        ("PKI_UNSECURE_PORT_SLOT", store.get("pki_http_port")?.to_string()),
        ("PKI_AJP_PORT_SLOT", store.get("pki_ajp_port")?.to_string()),
        (
            "PKI_TOMCAT_SERVER_PORT_SLOT",
            store.get("pki_tomcat_server_port")?.to_string(),
        ),
        (
            "PKI_PROXY_SECURE_PORT_SLOT",
            store.get("pki_proxy_https_port")?.to_string(),
        ),
        (
            "PKI_PROXY_UNSECURE_PORT_SLOT",
            store.get("pki_proxy_http_port")?.to_string(),
        ),
        ("PKI_HOSTNAME_SLOT", hostname.clone()),
        ("PKI_MACHINE_NAME_SLOT", hostname),
        ("PKI_INSTANCE_NAME_SLOT", layout.instance_name().to_string()),
        ("PKI_INSTANCE_PATH_SLOT", display(layout.instance_path())),
        (
            "PKI_INSTANCE_CONFIGURATION_PATH_SLOT",
            display(layout.instance_configuration_path()),
        ),
        ("PKI_INSTANCE_LOG_PATH_SLOT", display(layout.instance_log_path())),
        (
            "PKI_SUBSYSTEM_TYPE_SLOT",
            layout.subsystem().dir_name().to_string(),
        ),
        ("PKI_USER_SLOT", identity.user.clone()),
        ("PKI_GROUP_SLOT", identity.group.clone()),
        ("PKI_CERT_DB_PATH_SLOT", display(layout.database_path())),
        ("PKI_SECURITY_MANAGER_SLOT", security_manager.to_string()),
        ("PKI_SYSTEMD_SERVICENAME_SLOT", layout.systemd_service_name()),
        ("PKI_WEBAPPS_NAME_SLOT", "webapps".to_string()),
        ("PKI_TMPDIR_SLOT", display(layout.temp_path())),
        ("PKI_RANDOM_NUMBER_SLOT", pin.to_string()),
    ];

    for (key, value) in values {
        store.insert(key, value);
    }
    store.mark_sensitive("PKI_RANDOM_NUMBER_SLOT");
    Ok(())
}

fn display(path: std::path::PathBuf) -> String {
    path.display().to_string()
}

/// Token → value pairs applied by the template substitutor.
///
/// Built once per run and never modified afterwards.
#[derive(Debug, Clone, Default)]
pub struct SlotMap {
    entries: Vec<(String, String)>,
}

impl SlotMap {
    /// Pair every slot listed for `web_server` in the slots file with its value.
    pub fn build(
        slots: &IniDocument,
        web_server: WebServer,
        store: &ParameterStore,
    ) -> DeployResult<Self> {
        let section = slots.section(web_server.section()).ok_or_else(|| {
            DeployError::config(format!(
                "slots file has no [{}] section",
                web_server.section()
            ))
        })?;

        let mut entries = Vec::with_capacity(section.len());
        for (slot, token) in section {
            let value = store.get(slot)?;
            if !token.is_empty() {
                entries.push((token.clone(), value.to_string()));
            }
        }
        tracing::debug!(count = entries.len(), "Built slot map");
        Ok(Self { entries })
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        Self { entries }
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| t == token)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace every token occurrence in one pass; inserted values are not rescanned.
    pub fn apply(&self, line: &str) -> String {
        let mut out = String::with_capacity(line.len());
        let mut rest = line;

        'scan: while let Some(ch) = rest.chars().next() {
            for (token, value) in &self.entries {
                if let Some(after) = rest.strip_prefix(token.as_str()) {
                    out.push_str(value);
                    rest = after;
                    continue 'scan;
                }
            }
            out.push(ch);
            rest = &rest[ch.len_utf8()..];
        }
        out
    }
}
