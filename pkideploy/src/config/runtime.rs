//! Reader for a subsystem's flat runtime configuration (`CS.cfg`).

use pkideploy_shared::errors::{DeployError, DeployResult};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    entries: BTreeMap<String, String>,
}

impl RuntimeConfig {
    pub fn load(path: &Path) -> DeployResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DeployError::config(format!(
                "cannot read runtime configuration {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cs_cfg() {
        let cfg = RuntimeConfig::parse(
            "# comment\npreop.pin=abc123\nsecuritydomain.host = ca.example.com\nempty=\n",
        );
        assert_eq!(cfg.get("preop.pin"), Some("abc123"));
        assert_eq!(cfg.get("securitydomain.host"), Some("ca.example.com"));
        assert_eq!(cfg.get("empty"), None);
        assert_eq!(cfg.get("absent"), None);
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = RuntimeConfig::load(Path::new("/nonexistent/CS.cfg")).unwrap_err();
        assert!(err.is_preflight());
    }
}
