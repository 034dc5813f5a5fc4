use crate::snapshot::FsSnapshot;
use crate::{BUNDLED_DEFAULTS, BUNDLED_SLOTS};
use pkideploy::params::Identity;
use pkideploy::{DeploymentLayout, DestroyRequest, ParameterStore, SpawnRequest, Subsystem};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Shared templates written under `<prefix>/usr/share/pki`, keyed by path
/// relative to the share root.
pub struct TemplateSet;

impl TemplateSet {
    pub const SERVER_XML: &'static str = "<Server port=\"[TOMCAT_SERVER_PORT]\">\n\
  <Connector port=\"[PKI_UNSECURE_PORT]\"/>\n\
  <Connector port=\"[PKI_EE_SECURE_PORT]\" certdb=\"[PKI_CERT_DB_PATH]\"/>\n\
</Server>\n";

    pub const CATALINA_PROPERTIES: &'static str = "java.io.tmpdir=[PKI_TMPDIR]\n";

    pub const TOMCAT_CONF: &'static str = "TOMCAT_USER=\"[PKI_USER]\"\n\
TOMCAT_GROUP=\"[PKI_GROUP]\"\n\
SECURITY_MANAGER=\"[PKI_SECURITY_MANAGER]\"\n";

    pub const SYSCONFIG: &'static str = "PKI_INSTANCE_NAME=[PKI_INSTANCE_NAME]\n\
SERVICE=[PKI_SYSTEMD_SERVICENAME]\n";

    pub const REGISTRY: &'static str = "PKI_INSTANCE_PATH=[PKI_INSTANCE_PATH]\n";

    /// Profiles are copied verbatim, so this token must survive.
    pub const PROFILE: &'static str = "desc=Issued by [PKI_HOSTNAME]\n";

    pub const WEB_XML: &'static str =
        "<web-app><param-value>[PKI_INSTANCE_NAME]</param-value></web-app>\n";

    pub const VELOCITY: &'static str = "file.resource.loader.path=[PKI_INSTANCE_PATH]/conf\n";

    fn cs_cfg(subsystem: Subsystem) -> String {
        format!(
            "cs.type={}\n\
machineName=[PKI_MACHINE_NAME]\n\
instanceRoot=[PKI_INSTANCE_PATH]\n\
preop.pin=[PKI_RANDOM_NUMBER]\n\
service.securityDomainPort=[PKI_EE_SECURE_PORT]\n",
            subsystem.as_str()
        )
    }

    /// Write every template a spawn of any subsystem reads.
    pub fn write(share: &Path) {
        let files: Vec<(PathBuf, String)> = vec![
            ("server/conf/server.xml".into(), Self::SERVER_XML.into()),
            (
                "server/conf/catalina.properties".into(),
                Self::CATALINA_PROPERTIES.into(),
            ),
            ("server/conf/tomcat.conf".into(), Self::TOMCAT_CONF.into()),
            ("server/etc/tomcat.sysconfig".into(), Self::SYSCONFIG.into()),
            ("server/etc/registry.cfg".into(), Self::REGISTRY.into()),
            ("server/webapps/ROOT/index.html".into(), "<html/>\n".into()),
        ];
        for (relative, contents) in files {
            write_file(&share.join(relative), &contents);
        }

        for subsystem in Subsystem::ALL {
            let dir = subsystem.dir_name();
            let base = share.join(dir);
            write_file(&base.join("conf/CS.cfg"), &Self::cs_cfg(subsystem));
            write_file(
                &base.join(format!("profiles/{dir}/userCert.cfg")),
                Self::PROFILE,
            );
            let webapp = base.join(format!("webapps/{dir}"));
            write_file(&webapp.join("WEB-INF/web.xml"), Self::WEB_XML);
            write_file(&webapp.join("WEB-INF/velocity.properties"), Self::VELOCITY);
            write_file(&webapp.join("index.jsp"), "<%-- [PKI_HOSTNAME] --%>\n");
        }
    }
}

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create template directory");
    }
    fs::write(path, contents).expect("write template");
}

/// Throwaway deployment root.
///
/// Every system path of the bundled defaults is re-rooted under
/// [`prefix`](Self::prefix), and the deployment identity is the current
/// user, so a full spawn and destroy run without privileges.
pub struct DeployRoot {
    _dir: TempDir,
    prefix: PathBuf,
    config_dir: PathBuf,
    default_config: PathBuf,
    slots_config: PathBuf,
    identity: Identity,
}

impl DeployRoot {
    pub const INSTANCE: &'static str = "pki-tomcat";
    pub const HOSTNAME: &'static str = "pki.example.com";

    pub fn new() -> Self {
        Self::with_defaults("")
    }

    /// Like [`new`](Self::new), with `extra` appended to the default file.
    pub fn with_defaults(extra: &str) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let prefix = dir.path().join("root");
        let config_dir = dir.path().join("cfg");
        fs::create_dir_all(&prefix).expect("create prefix");
        fs::create_dir_all(&config_dir).expect("create config dir");

        TemplateSet::write(&prefix.join("usr/share/pki"));

        let identity = Identity::current().expect("resolve current identity");
        let defaults = format!(
            "{BUNDLED_DEFAULTS}\n\
[DEFAULT]\n\
pki_root_prefix = {prefix}\n\
pki_hostname = {host}\n\
pki_user = {user}\n\
pki_group = {group}\n\
pki_uid = {uid}\n\
pki_gid = {gid}\n\
pki_startup_timeout = 5\n\
{extra}\n",
            prefix = prefix.display(),
            host = Self::HOSTNAME,
            user = identity.user,
            group = identity.group,
            uid = identity.uid,
            gid = identity.gid,
        );
        let default_config = config_dir.join("default.cfg");
        fs::write(&default_config, defaults).expect("write default.cfg");
        let slots_config = config_dir.join("slots.cfg");
        fs::write(&slots_config, BUNDLED_SLOTS).expect("write slots.cfg");

        Self {
            _dir: dir,
            prefix,
            config_dir,
            default_config,
            slots_config,
            identity,
        }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// `absolute` re-rooted under the prefix.
    pub fn path(&self, absolute: &str) -> PathBuf {
        self.prefix.join(absolute.trim_start_matches('/'))
    }

    pub fn default_config(&self) -> &Path {
        &self.default_config
    }

    pub fn slots_config(&self) -> &Path {
        &self.slots_config
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Write an operator configuration file next to the defaults.
    pub fn user_config(&self, name: &str, text: &str) -> PathBuf {
        let path = self.config_dir.join(name);
        fs::write(&path, text).expect("write user config");
        path
    }

    pub fn spawn_request(&self, subsystem: Subsystem, user_config: Option<PathBuf>) -> SpawnRequest {
        SpawnRequest {
            default_config: self.default_config.clone(),
            user_config,
            slots_config: self.slots_config.clone(),
            subsystem,
            overrides: Vec::new(),
            log_file: None,
        }
    }

    /// Destroy request removing logs too, so a destroy leaves nothing behind.
    pub fn destroy_request(&self, subsystem: Subsystem) -> DestroyRequest {
        DestroyRequest {
            default_config: self.default_config.clone(),
            subsystem,
            instance_name: Self::INSTANCE.to_string(),
            overrides: Vec::new(),
            remove_logs: true,
        }
    }

    /// Layout the default configuration resolves to for `subsystem`.
    pub fn layout(&self, subsystem: Subsystem) -> DeploymentLayout {
        let store = ParameterStore::resolve(&self.default_config, None, subsystem, &[])
            .expect("resolve defaults");
        DeploymentLayout::from_store(&store).expect("layout")
    }

    pub fn snapshot(&self) -> FsSnapshot {
        FsSnapshot::capture(&self.prefix)
    }
}

impl Default for DeployRoot {
    fn default() -> Self {
        Self::new()
    }
}
