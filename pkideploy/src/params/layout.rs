//! Filesystem layout of an instance and its subsystems.
//!
//! Every path is a concatenation of a handful of configurable roots, the
//! instance name and the subsystem directory name. Nothing here touches the
//! filesystem.

use crate::config::ParameterStore;
use crate::types::Subsystem;
use pkideploy_shared::errors::DeployResult;
use std::path::{Path, PathBuf};

/// Directory and file names inside an instance.
pub mod names {
    pub const ALIAS_DIR: &str = "alias";
    pub const CONF_DIR: &str = "conf";
    pub const LOGS_DIR: &str = "logs";
    pub const REGISTRY_DIR: &str = "registry";
    pub const WEBAPPS_DIR: &str = "webapps";
    pub const WORK_DIR: &str = "work";
    pub const TEMP_DIR: &str = "temp";
    pub const LIB_DIR: &str = "lib";
    pub const PROFILES_DIR: &str = "profiles";
    pub const TOMCAT_REGISTRY_DIR: &str = "tomcat";
    pub const ARCHIVE_LOG_DIR: &str = "archive";
    pub const SIGNED_AUDIT_LOG_DIR: &str = "signedAudit";

    pub const CS_CFG: &str = "CS.cfg";
    pub const SERVER_XML: &str = "server.xml";
    pub const CATALINA_PROPERTIES: &str = "catalina.properties";
    pub const TOMCAT_CONF: &str = "tomcat.conf";
    pub const PASSWORD_CONF: &str = "password.conf";
    pub const WEB_INF: &str = "WEB-INF";
    pub const WEB_XML: &str = "web.xml";
    pub const VELOCITY_PROPERTIES: &str = "velocity.properties";
    pub const MANIFEST: &str = "manifest";
    pub const DEPLOYMENT_REPLICA: &str = "deployment.cfg";
    pub const SYSCONFIG_TEMPLATE: &str = "tomcat.sysconfig";
    pub const REGISTRY_TEMPLATE: &str = "registry.cfg";
    pub const SYSTEMD_WANTS_DIR: &str = "pki-tomcatd.target.wants";
    pub const CLIENT_ADMIN_P12: &str = "ca_admin_cert.p12";
    pub const CLIENT_ADMIN_CERT: &str = "ca_admin.cert";

    /// Files an NSS database consists of.
    pub const NSS_DB_FILES: &[&str] = &["cert9.db", "key4.db", "pkcs11.txt"];
}

/// Resolved paths for one subsystem of one instance.
#[derive(Clone, Debug)]
pub struct DeploymentLayout {
    subsystem: Subsystem,
    instance_name: String,
    base_path: PathBuf,
    log_root: PathBuf,
    configuration_root: PathBuf,
    registry_root: PathBuf,
    share_path: PathBuf,
    systemd_path: PathBuf,
    systemd_unit_file: PathBuf,
    sysconfig_path: PathBuf,
    cgroup_path: PathBuf,
    client_root: PathBuf,
}

impl DeploymentLayout {
    pub fn from_store(store: &ParameterStore) -> DeployResult<Self> {
        let prefix = PathBuf::from(store.get_non_empty("pki_root_prefix").unwrap_or("/"));
        let root = |key: &str| -> DeployResult<PathBuf> { Ok(rooted(&prefix, store.get(key)?)) };

        Ok(Self {
            subsystem: store.subsystem(),
            instance_name: store.get("pki_instance_name")?.to_string(),
            base_path: root("pki_path")?,
            log_root: root("pki_log_path")?,
            configuration_root: root("pki_configuration_path")?,
            registry_root: root("pki_registry_path")?,
            share_path: root("pki_share_path")?,
            systemd_path: root("pki_systemd_path")?,
            systemd_unit_file: root("pki_systemd_unit_file")?,
            sysconfig_path: root("pki_sysconfig_path")?,
            cgroup_path: root("pki_cgroup_path")?,
            client_root: root("pki_client_dir")?,
        })
    }

    pub fn subsystem(&self) -> Subsystem {
        self.subsystem
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn systemd_service_name(&self) -> String {
        format!("pki-tomcatd@{}.service", self.instance_name)
    }

    // ------------------------------------------------------------------
    // Base roots shared by every instance
    // ------------------------------------------------------------------

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn log_root(&self) -> &Path {
        &self.log_root
    }

    pub fn configuration_root(&self) -> &Path {
        &self.configuration_root
    }

    pub fn registry_root(&self) -> &Path {
        &self.registry_root
    }

    /// `<registry>/tomcat`
    pub fn tomcat_registry_root(&self) -> PathBuf {
        self.registry_root.join(names::TOMCAT_REGISTRY_DIR)
    }

    pub fn infrastructure_roots(&self) -> Vec<PathBuf> {
        vec![
            self.base_path.clone(),
            self.log_root.clone(),
            self.configuration_root.clone(),
            self.registry_root.clone(),
            self.tomcat_registry_root(),
        ]
    }

    // ------------------------------------------------------------------
    // Instance
    // ------------------------------------------------------------------

    pub fn instance_path(&self) -> PathBuf {
        self.base_path.join(&self.instance_name)
    }

    pub fn instance_log_path(&self) -> PathBuf {
        self.log_root.join(&self.instance_name)
    }

    pub fn instance_configuration_path(&self) -> PathBuf {
        self.configuration_root.join(&self.instance_name)
    }

    pub fn instance_registry_path(&self) -> PathBuf {
        self.tomcat_registry_root().join(&self.instance_name)
    }

    /// Shared NSS database for every subsystem of the instance.
    pub fn database_path(&self) -> PathBuf {
        self.instance_configuration_path().join(names::ALIAS_DIR)
    }

    pub fn password_conf(&self) -> PathBuf {
        self.instance_configuration_path().join(names::PASSWORD_CONF)
    }

    pub fn webapps_path(&self) -> PathBuf {
        self.instance_path().join(names::WEBAPPS_DIR)
    }

    pub fn work_path(&self) -> PathBuf {
        self.instance_path().join(names::WORK_DIR)
    }

    pub fn temp_path(&self) -> PathBuf {
        self.instance_path().join(names::TEMP_DIR)
    }

    pub fn lib_path(&self) -> PathBuf {
        self.instance_path().join(names::LIB_DIR)
    }

    pub fn instance_conf_link(&self) -> PathBuf {
        self.instance_path().join(names::CONF_DIR)
    }

    pub fn instance_logs_link(&self) -> PathBuf {
        self.instance_path().join(names::LOGS_DIR)
    }

    pub fn instance_alias_link(&self) -> PathBuf {
        self.instance_path().join(names::ALIAS_DIR)
    }

    pub fn target_server_xml(&self) -> PathBuf {
        self.instance_configuration_path().join(names::SERVER_XML)
    }

    pub fn target_catalina_properties(&self) -> PathBuf {
        self.instance_configuration_path()
            .join(names::CATALINA_PROPERTIES)
    }

    pub fn target_tomcat_conf(&self) -> PathBuf {
        self.instance_configuration_path().join(names::TOMCAT_CONF)
    }

    /// Registry entry naming the instance: `<registry>/tomcat/<name>/<name>`.
    pub fn instance_registry_file(&self) -> PathBuf {
        self.instance_registry_path().join(&self.instance_name)
    }

    /// Environment file read by the service unit.
    pub fn sysconfig_instance_file(&self) -> PathBuf {
        self.sysconfig_path.join(&self.instance_name)
    }

    pub fn systemd_wants_dir(&self) -> PathBuf {
        self.systemd_path.join(names::SYSTEMD_WANTS_DIR)
    }

    pub fn systemd_wants_link(&self) -> PathBuf {
        self.systemd_wants_dir().join(self.systemd_service_name())
    }

    pub fn systemd_unit_file(&self) -> &Path {
        &self.systemd_unit_file
    }

    pub fn cgroup_service_paths(&self) -> Vec<PathBuf> {
        let service = self.systemd_service_name();
        vec![
            self.cgroup_path.join("systemd/system").join(&service),
            self.cgroup_path.join("cpu,cpuacct/system").join(&service),
        ]
    }

    pub fn client_path(&self) -> PathBuf {
        self.client_root.join(&self.instance_name)
    }

    pub fn client_database_path(&self) -> PathBuf {
        self.client_path().join(names::ALIAS_DIR)
    }

    pub fn client_admin_p12(&self) -> PathBuf {
        self.client_path().join(names::CLIENT_ADMIN_P12)
    }

    pub fn client_admin_cert(&self) -> PathBuf {
        self.client_path().join(names::CLIENT_ADMIN_CERT)
    }

    pub fn instance_roots(&self) -> Vec<PathBuf> {
        vec![
            self.instance_path(),
            self.instance_configuration_path(),
            self.instance_log_path(),
            self.instance_registry_path(),
            self.client_path(),
        ]
    }

    // ------------------------------------------------------------------
    // Subsystem
    // ------------------------------------------------------------------

    pub fn subsystem_path(&self) -> PathBuf {
        self.subsystem_path_for(self.subsystem)
    }

    /// Path a sibling subsystem would occupy under the same instance.
    pub fn subsystem_path_for(&self, subsystem: Subsystem) -> PathBuf {
        self.instance_path().join(subsystem.dir_name())
    }

    pub fn subsystem_log_path(&self) -> PathBuf {
        self.instance_log_path().join(self.subsystem.dir_name())
    }

    pub fn subsystem_archive_log_path(&self) -> PathBuf {
        self.subsystem_log_path().join(names::ARCHIVE_LOG_DIR)
    }

    pub fn subsystem_signed_audit_log_path(&self) -> PathBuf {
        self.subsystem_log_path().join(names::SIGNED_AUDIT_LOG_DIR)
    }

    pub fn subsystem_configuration_path(&self) -> PathBuf {
        self.instance_configuration_path()
            .join(self.subsystem.dir_name())
    }

    pub fn subsystem_registry_path(&self) -> PathBuf {
        self.instance_registry_path().join(self.subsystem.dir_name())
    }

    pub fn subsystem_conf_link(&self) -> PathBuf {
        self.subsystem_path().join(names::CONF_DIR)
    }

    pub fn subsystem_logs_link(&self) -> PathBuf {
        self.subsystem_path().join(names::LOGS_DIR)
    }

    pub fn subsystem_registry_link(&self) -> PathBuf {
        self.subsystem_path().join(names::REGISTRY_DIR)
    }

    pub fn subsystem_alias_link(&self) -> PathBuf {
        self.subsystem_path().join(names::ALIAS_DIR)
    }

    pub fn subsystem_profiles_path(&self) -> PathBuf {
        self.subsystem_path()
            .join(names::PROFILES_DIR)
            .join(self.subsystem.dir_name())
    }

    pub fn webapp_subsystem_path(&self) -> PathBuf {
        self.webapps_path().join(self.subsystem.dir_name())
    }

    pub fn target_web_xml(&self) -> PathBuf {
        self.webapp_subsystem_path()
            .join(names::WEB_INF)
            .join(names::WEB_XML)
    }

    pub fn target_velocity_properties(&self) -> PathBuf {
        self.webapp_subsystem_path()
            .join(names::WEB_INF)
            .join(names::VELOCITY_PROPERTIES)
    }

    pub fn target_cs_cfg(&self) -> PathBuf {
        self.subsystem_configuration_path().join(names::CS_CFG)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.subsystem_registry_path().join(names::MANIFEST)
    }

    pub fn deployment_replica_path(&self) -> PathBuf {
        self.subsystem_registry_path()
            .join(names::DEPLOYMENT_REPLICA)
    }

    pub fn subsystem_roots(&self) -> Vec<PathBuf> {
        vec![
            self.subsystem_path(),
            self.subsystem_configuration_path(),
            self.subsystem_log_path(),
            self.subsystem_registry_path(),
            self.webapp_subsystem_path(),
        ]
    }

    // ------------------------------------------------------------------
    // Shared templates
    // ------------------------------------------------------------------

    pub fn share_path(&self) -> &Path {
        &self.share_path
    }

    /// `<share>/server/conf`: instance-wide Tomcat templates.
    pub fn server_template_dir(&self) -> PathBuf {
        self.share_path.join("server").join(names::CONF_DIR)
    }

    /// `<share>/server/etc`: sysconfig and registry templates.
    pub fn server_etc_template_dir(&self) -> PathBuf {
        self.share_path.join("server").join("etc")
    }

    /// `<share>/server/webapps`: webapps shared by every subsystem.
    pub fn shared_webapps_template_dir(&self) -> PathBuf {
        self.share_path.join("server").join(names::WEBAPPS_DIR)
    }

    pub fn subsystem_template_dir(&self) -> PathBuf {
        self.share_path
            .join(self.subsystem.dir_name())
            .join(names::CONF_DIR)
    }

    pub fn subsystem_profiles_template_dir(&self) -> PathBuf {
        self.share_path
            .join(self.subsystem.dir_name())
            .join(names::PROFILES_DIR)
            .join(self.subsystem.dir_name())
    }

    pub fn subsystem_webapp_template_dir(&self) -> PathBuf {
        self.share_path
            .join(self.subsystem.dir_name())
            .join(names::WEBAPPS_DIR)
            .join(self.subsystem.dir_name())
    }

    /// Derived path keys made visible to the rest of the parameter space.
    pub fn publish(&self, store: &mut ParameterStore) {
        let entries = [
            ("pki_instance_path", self.instance_path()),
            ("pki_instance_log_path", self.instance_log_path()),
            (
                "pki_instance_configuration_path",
                self.instance_configuration_path(),
            ),
            ("pki_instance_registry_path", self.instance_registry_path()),
            ("pki_subsystem_path", self.subsystem_path()),
            ("pki_subsystem_log_path", self.subsystem_log_path()),
            (
                "pki_subsystem_configuration_path",
                self.subsystem_configuration_path(),
            ),
            ("pki_subsystem_registry_path", self.subsystem_registry_path()),
            ("pki_database_path", self.database_path()),
            ("pki_shared_password_conf", self.password_conf()),
            ("pki_target_cs_cfg", self.target_cs_cfg()),
            ("pki_manifest", self.manifest_path()),
            (
                "pki_user_deployment_cfg_replica",
                self.deployment_replica_path(),
            ),
            ("pki_client_database_dir", self.client_database_path()),
            ("pki_client_admin_cert_p12", self.client_admin_p12()),
        ];
        for (key, path) in entries {
            store.insert(key, path.display().to_string());
        }
    }
}

/// Re-root an absolute configured path under `prefix`.
fn rooted(prefix: &Path, configured: &str) -> PathBuf {
    let relative = configured.trim_start_matches('/');
    prefix.join(relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IniDocument;

    fn store(prefix: &str, subsystem: Subsystem) -> ParameterStore {
        let defaults = IniDocument::parse(
            &format!(
                "\
[DEFAULT]
pki_root_prefix = {prefix}
pki_instance_name = pki-tomcat
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
"
            ),
            "test",
        )
        .unwrap();
        ParameterStore::from_documents(defaults, IniDocument::default(), subsystem, &[]).unwrap()
    }

    #[test]
    fn test_system_paths_without_prefix() {
        let layout = DeploymentLayout::from_store(&store("", Subsystem::Ca)).unwrap();
        assert_eq!(layout.instance_path(), PathBuf::from("/var/lib/pki/pki-tomcat"));
        assert_eq!(
            layout.subsystem_path(),
            PathBuf::from("/var/lib/pki/pki-tomcat/ca")
        );
        assert_eq!(
            layout.subsystem_registry_path(),
            PathBuf::from("/etc/sysconfig/pki/tomcat/pki-tomcat/ca")
        );
        assert_eq!(
            layout.database_path(),
            PathBuf::from("/etc/pki/pki-tomcat/alias")
        );
        assert_eq!(
            layout.systemd_wants_link(),
            PathBuf::from(
                "/etc/systemd/system/pki-tomcatd.target.wants/pki-tomcatd@pki-tomcat.service"
            )
        );
    }

    #[test]
    fn test_prefix_reroots_everything() {
        let layout = DeploymentLayout::from_store(&store("/tmp/root", Subsystem::Kra)).unwrap();
        assert_eq!(
            layout.target_cs_cfg(),
            PathBuf::from("/tmp/root/etc/pki/pki-tomcat/kra/CS.cfg")
        );
        assert_eq!(
            layout.subsystem_webapp_template_dir(),
            PathBuf::from("/tmp/root/usr/share/pki/kra/webapps/kra")
        );
        for path in layout
            .instance_roots()
            .into_iter()
            .chain(layout.subsystem_roots())
            .chain(layout.infrastructure_roots())
        {
            assert!(path.starts_with("/tmp/root"), "{}", path.display());
        }
    }

    #[test]
    fn test_publish_exposes_paths() {
        let mut store = store("", Subsystem::Ocsp);
        let layout = DeploymentLayout::from_store(&store).unwrap();
        layout.publish(&mut store);
        assert_eq!(
            store.get("pki_manifest").unwrap(),
            "/etc/sysconfig/pki/tomcat/pki-tomcat/ocsp/manifest"
        );
    }
}
