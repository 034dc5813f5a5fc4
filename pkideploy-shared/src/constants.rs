//! Product constants shared by the engine and the CLI.

/// Subsystem families and the web server each one runs under.
pub mod subsystems {
    /// Every subsystem this product knows about.
    pub const ALL: &[&str] = &["CA", "KRA", "OCSP", "RA", "TKS", "TPS"];

    /// Subsystems served by Apache.
    pub const APACHE: &[&str] = &["RA"];

    /// Subsystems served by Tomcat.
    pub const TOMCAT: &[&str] = &["CA", "KRA", "OCSP", "TKS", "TPS"];
}

/// Instance names that would shadow product directories.
pub mod reserved_names {
    /// Names used directly under the base instance root.
    pub const BASE: &[&str] = &[
        "alias", "bin", "ca", "common", "conf", "kra", "lib", "logs", "ocsp", "temp", "tks", "tps",
        "webapps", "work",
    ];

    /// Names used directly under the configuration root.
    pub const CONFIGURATION: &[&str] = &["CA", "java", "nssdb", "rpm-gpg", "rsyslog", "tls"];

    /// Names used under the Apache registry root.
    pub const APACHE_REGISTRY: &[&str] = &["ra"];

    /// Names used under the Tomcat registry root.
    pub const TOMCAT_REGISTRY: &[&str] = &["ca", "kra", "ocsp", "tks", "tps"];
}

/// Default permission bits for created objects.
pub mod permissions {
    pub const DIR: u32 = 0o770;
    pub const EXE: u32 = 0o770;
    pub const FILE: u32 = 0o660;
    pub const SECURITY_DATABASE: u32 = 0o600;
    pub const SGID_DIR: u32 = 0o2770;
    pub const SYMLINK: u32 = 0o777;
}

/// SELinux labelling.
pub mod selinux {
    /// Attempts made when the policy transaction is held by someone else.
    pub const TRANSACTION_ATTEMPTS: u32 = 10;

    /// Fixed delay between transaction attempts, in seconds.
    pub const TRANSACTION_BACKOFF_SECS: u64 = 5;

    /// Message emitted when another process holds the policy transaction.
    pub const TRANSACTION_BUSY: &str = "Could not start semanage transaction";

    pub const INSTANCE_CONTEXT: &str = "pki_tomcat_var_lib_t";
    pub const CONFIG_CONTEXT: &str = "pki_tomcat_etc_rw_t";
    pub const LOG_CONTEXT: &str = "pki_tomcat_log_t";
    pub const CERT_CONTEXT: &str = "pki_tomcat_cert_t";
    pub const PORT_CONTEXT: &str = "http_port_t";

    /// Ports the base policy already labels.
    pub const DEFAULT_PORTS: &[u16] = &[8005, 8009, 8080, 8443];
}

/// Server startup polling.
pub mod startup {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
    pub const POLL_INTERVAL_SECS: u64 = 1;

    /// Status string reported by a subsystem that is ready for requests.
    pub const RUNNING: &str = "running";
}

/// Secret handling.
pub mod secrets {
    /// Length of the generated one-time pin and random database passwords.
    pub const TOKEN_LEN: usize = 20;

    /// Replacement text for sensitive values in logs and persisted replicas.
    pub const MASK: &str = "XXXXXXXX";
}

/// Legacy security domain responses.
pub mod domain_status {
    pub const SUCCESS: &str = "0";
    pub const FAILURE: &str = "1";
}

/// Names of the external tools the engine drives.
pub mod tools {
    pub const CERTUTIL: &str = "certutil";
    pub const PK12UTIL: &str = "pk12util";
    pub const SYSTEMCTL: &str = "systemctl";
    pub const SEMANAGE: &str = "semanage";
    pub const RESTORECON: &str = "restorecon";
    pub const SELINUXENABLED: &str = "selinuxenabled";
    pub const SSLGET: &str = "sslget";
    pub const PKI: &str = "pki";
}

/// Locations of the bundled configuration and of run logs.
pub mod files {
    /// Directory holding the default configuration and the slot file.
    pub const SHARE_DIR: &str = "/usr/share/pki/deployment/config";
    pub const DEFAULT_CONFIG: &str = "default.cfg";
    pub const SLOTS_CONFIG: &str = "slots.cfg";

    /// Where each run writes its log file.
    pub const LOG_DIR: &str = "/var/log/pki";
}
