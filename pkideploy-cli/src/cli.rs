use clap::{Args, Parser, Subcommand};
use pkideploy::Subsystem;
use pkideploy_shared::constants::files;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pkideploy")]
#[command(version, about = "Install and remove PKI subsystem instances", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalFlags,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install a subsystem, creating its instance if needed
    Spawn(crate::commands::spawn::SpawnArgs),

    /// Remove a subsystem, and its instance once nothing else uses it
    Destroy(crate::commands::destroy::DestroyArgs),
}

#[derive(Args, Debug)]
pub struct GlobalFlags {
    /// Directory holding the bundled default.cfg and slots.cfg
    #[arg(long, global = true, env = "PKIDEPLOY_SHARE_DIR", default_value = files::SHARE_DIR)]
    pub share_dir: PathBuf,

    /// Default configuration file (overrides the one in the share directory)
    #[arg(long, global = true)]
    pub defaults: Option<PathBuf>,

    /// Slot substitution file (overrides the one in the share directory)
    #[arg(long, global = true)]
    pub slots: Option<PathBuf>,

    /// Directory for this run's log file
    #[arg(long, global = true, default_value = files::LOG_DIR)]
    pub log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

impl GlobalFlags {
    pub fn default_config(&self) -> PathBuf {
        self.defaults
            .clone()
            .unwrap_or_else(|| self.share_dir.join(files::DEFAULT_CONFIG))
    }

    pub fn slots_config(&self) -> PathBuf {
        self.slots
            .clone()
            .unwrap_or_else(|| self.share_dir.join(files::SLOTS_CONFIG))
    }

    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.log_level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Subsystem argument, accepted in any case.
pub fn parse_subsystem(s: &str) -> Result<Subsystem, String> {
    s.parse().map_err(|e: pkideploy::DeployError| e.to_string())
}

/// `key=value` override.
pub fn parse_override(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_override() {
        assert_eq!(
            parse_override("pki_https_port = 18443").unwrap(),
            ("pki_https_port".to_string(), "18443".to_string())
        );
        assert_eq!(
            parse_override("pki_admin_password=a=b").unwrap().1,
            "a=b"
        );
        assert!(parse_override("pki_https_port").is_err());
        assert!(parse_override("=x").is_err());
    }

    #[test]
    fn test_parse_subsystem_any_case() {
        assert_eq!(parse_subsystem("kra").unwrap(), Subsystem::Kra);
        assert!(parse_subsystem("RA").is_err());
    }

    #[test]
    fn test_share_dir_fallbacks() {
        let cli = Cli::parse_from([
            "pkideploy",
            "--share-dir",
            "/opt/share",
            "--slots",
            "/tmp/slots.cfg",
            "destroy",
            "-s",
            "CA",
        ]);
        assert_eq!(cli.global.default_config(), PathBuf::from("/opt/share/default.cfg"));
        assert_eq!(cli.global.slots_config(), PathBuf::from("/tmp/slots.cfg"));
    }
}
