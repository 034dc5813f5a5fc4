//! Core identifiers used across the engine.

use pkideploy_shared::constants::subsystems;
use pkideploy_shared::errors::{DeployError, DeployResult};
use std::fmt;
use std::str::FromStr;

/// A deployable subsystem type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Ca,
    Kra,
    Ocsp,
    Tks,
    Tps,
}

impl Subsystem {
    pub const ALL: [Subsystem; 5] = [
        Subsystem::Ca,
        Subsystem::Kra,
        Subsystem::Ocsp,
        Subsystem::Tks,
        Subsystem::Tps,
    ];

    /// Configuration section name, e.g. `CA`.
    pub fn as_str(self) -> &'static str {
        match self {
            Subsystem::Ca => "CA",
            Subsystem::Kra => "KRA",
            Subsystem::Ocsp => "OCSP",
            Subsystem::Tks => "TKS",
            Subsystem::Tps => "TPS",
        }
    }

    /// Directory and URL component, e.g. `ca`.
    pub fn dir_name(self) -> &'static str {
        match self {
            Subsystem::Ca => "ca",
            Subsystem::Kra => "kra",
            Subsystem::Ocsp => "ocsp",
            Subsystem::Tks => "tks",
            Subsystem::Tps => "tps",
        }
    }

    pub fn web_server(self) -> WebServer {
        WebServer::for_subsystem(self.as_str())
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subsystem {
    type Err = DeployError;

    fn from_str(s: &str) -> DeployResult<Self> {
        Subsystem::ALL
            .into_iter()
            .find(|sub| sub.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                DeployError::config(format!(
                    "unsupported subsystem '{s}' (expected one of CA, KRA, OCSP, TKS, TPS)"
                ))
            })
    }
}

/// Web server hosting a subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebServer {
    Apache,
    Tomcat,
}

impl WebServer {
    /// Classify a subsystem name; unknown names default to Tomcat.
    pub fn for_subsystem(name: &str) -> Self {
        if subsystems::APACHE
            .iter()
            .any(|s| s.eq_ignore_ascii_case(name))
        {
            WebServer::Apache
        } else {
            WebServer::Tomcat
        }
    }

    /// Name of the configuration section holding web-server keys.
    pub fn section(self) -> &'static str {
        match self {
            WebServer::Apache => "Apache",
            WebServer::Tomcat => "Tomcat",
        }
    }
}

/// Whether the instance joins an existing security domain or hosts a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityDomainType {
    Existing,
    New,
}

impl SecurityDomainType {
    pub fn as_str(self) -> &'static str {
        match self {
            SecurityDomainType::Existing => "existing",
            SecurityDomainType::New => "new",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subsystem_parse_case_insensitive() {
        assert_eq!("kra".parse::<Subsystem>().unwrap(), Subsystem::Kra);
        assert_eq!("OCSP".parse::<Subsystem>().unwrap(), Subsystem::Ocsp);
        assert!("RA".parse::<Subsystem>().is_err());
    }

    #[test]
    fn test_web_server_classification() {
        assert_eq!(WebServer::for_subsystem("RA"), WebServer::Apache);
        assert_eq!(WebServer::for_subsystem("CA"), WebServer::Tomcat);
        assert_eq!(Subsystem::Tps.web_server(), WebServer::Tomcat);
    }
}
