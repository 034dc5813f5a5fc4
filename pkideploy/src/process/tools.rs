//! Argument builders for the tools the stages drive.

use super::{CommandSpec, ProcessOutput, ProcessRunner, run_checked};
use pkideploy_shared::constants::{selinux, tools};
use pkideploy_shared::errors::{DeployError, DeployResult};
use regex::Regex;
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use tempfile::NamedTempFile;

static INSTALL_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Install token: "(.*)""#).expect("install token pattern is valid")
});

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

/// Write a secret to a private temporary file for tools that read passwords
/// from a file. The file is removed when dropped.
pub fn secret_file(secret: &str) -> DeployResult<NamedTempFile> {
    let mut file = NamedTempFile::new().map_err(|e| DeployError::fs(std::env::temp_dir(), e))?;
    file.write_all(secret.as_bytes())
        .map_err(|e| DeployError::fs(file.path(), e))?;
    file.flush().map_err(|e| DeployError::fs(file.path(), e))?;
    Ok(file)
}

/// NSS database management.
pub struct Certutil<'a> {
    runner: &'a dyn ProcessRunner,
}

impl<'a> Certutil<'a> {
    pub fn new(runner: &'a dyn ProcessRunner) -> Self {
        Self { runner }
    }

    pub async fn create_database(&self, db: &Path, password_file: &Path) -> DeployResult<()> {
        let cmd = CommandSpec::new(tools::CERTUTIL)
            .arg("-N")
            .args(["-d", &path_arg(db)])
            .args(["-f", &path_arg(password_file)]);
        run_checked(self.runner, &cmd).await.map(drop)
    }

    pub async fn import_cert(
        &self,
        db: &Path,
        password_file: &Path,
        nickname: &str,
        trust: &str,
        cert_file: &Path,
    ) -> DeployResult<()> {
        let cmd = CommandSpec::new(tools::CERTUTIL)
            .arg("-A")
            .args(["-d", &path_arg(db)])
            .args(["-f", &path_arg(password_file)])
            .args(["-n", nickname])
            .args(["-t", trust])
            .args(["-i", &path_arg(cert_file)]);
        run_checked(self.runner, &cmd).await.map(drop)
    }
}

/// PKCS#12 import and export.
pub struct Pk12util<'a> {
    runner: &'a dyn ProcessRunner,
}

impl<'a> Pk12util<'a> {
    pub fn new(runner: &'a dyn ProcessRunner) -> Self {
        Self { runner }
    }

    pub async fn import(
        &self,
        db: &Path,
        db_password_file: &Path,
        p12: &Path,
        p12_password: &str,
    ) -> DeployResult<()> {
        let p12_password_file = secret_file(p12_password)?;
        let cmd = CommandSpec::new(tools::PK12UTIL)
            .args(["-d", &path_arg(db)])
            .args(["-k", &path_arg(db_password_file)])
            .args(["-i", &path_arg(p12)])
            .args(["-w", &path_arg(p12_password_file.path())]);
        run_checked(self.runner, &cmd).await.map(drop)
    }

    pub async fn export(
        &self,
        db: &Path,
        db_password_file: &Path,
        nickname: &str,
        p12: &Path,
        p12_password: &str,
    ) -> DeployResult<()> {
        let p12_password_file = secret_file(p12_password)?;
        let cmd = CommandSpec::new(tools::PK12UTIL)
            .args(["-d", &path_arg(db)])
            .args(["-k", &path_arg(db_password_file)])
            .args(["-n", nickname])
            .args(["-o", &path_arg(p12)])
            .args(["-w", &path_arg(p12_password_file.path())]);
        run_checked(self.runner, &cmd).await.map(drop)
    }
}

/// Service manager verbs.
pub struct Systemd<'a> {
    runner: &'a dyn ProcessRunner,
}

impl<'a> Systemd<'a> {
    pub fn new(runner: &'a dyn ProcessRunner) -> Self {
        Self { runner }
    }

    async fn verb(&self, verb: &str, unit: &str) -> DeployResult<()> {
        tracing::info!(unit, "systemctl {verb}");
        let cmd = CommandSpec::new(tools::SYSTEMCTL).args([verb, unit]);
        run_checked(self.runner, &cmd).await.map(drop)
    }

    pub async fn start(&self, unit: &str) -> DeployResult<()> {
        self.verb("start", unit).await
    }

    pub async fn stop(&self, unit: &str) -> DeployResult<()> {
        self.verb("stop", unit).await
    }

    pub async fn restart(&self, unit: &str) -> DeployResult<()> {
        self.verb("restart", unit).await
    }

    pub async fn enable(&self, unit: &str) -> DeployResult<()> {
        self.verb("enable", unit).await
    }
}

/// SELinux labelling tools.
pub struct Selinux<'a> {
    runner: &'a dyn ProcessRunner,
}

impl<'a> Selinux<'a> {
    pub fn new(runner: &'a dyn ProcessRunner) -> Self {
        Self { runner }
    }

    pub async fn is_enabled(&self) -> bool {
        let cmd = CommandSpec::new(tools::SELINUXENABLED);
        match self.runner.run(&cmd).await {
            Ok(output) => output.success(),
            Err(e) => {
                tracing::debug!(error = %e, "selinuxenabled unavailable; treating SELinux as disabled");
                false
            }
        }
    }

    /// Apply a batch of policy changes in one transaction. Exit status is
    /// left to the caller, which decides whether to retry.
    pub async fn import(&self, script: &str) -> DeployResult<ProcessOutput> {
        let cmd = CommandSpec::new(tools::SEMANAGE).arg("import").stdin(script);
        self.runner.run(&cmd).await
    }

    /// [`import`](Self::import), retried while another process holds the
    /// policy transaction. Any other failure is returned immediately.
    pub async fn import_with_retry(&self, script: &str) -> DeployResult<()> {
        let backoff = Duration::from_secs(selinux::TRANSACTION_BACKOFF_SECS);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let output = self.import(script).await?;
            if output.success() {
                return Ok(());
            }

            let stderr = output.stderr.trim().to_string();
            if !stderr.contains(selinux::TRANSACTION_BUSY) {
                return Err(DeployError::Subprocess {
                    program: tools::SEMANAGE.to_string(),
                    code: output.code,
                    stderr,
                });
            }
            if attempt >= selinux::TRANSACTION_ATTEMPTS {
                return Err(DeployError::RetryExhausted {
                    attempts: attempt,
                    message: stderr,
                });
            }
            tracing::warn!(attempt, "SELinux policy transaction busy; retrying");
            tokio::time::sleep(backoff).await;
        }
    }

    pub async fn restorecon(&self, paths: &[&Path]) -> DeployResult<()> {
        let cmd = CommandSpec::new(tools::RESTORECON)
            .arg("-R")
            .args(paths.iter().map(|p| path_arg(p)));
        run_checked(self.runner, &cmd).await.map(drop)
    }
}

/// HTTPS GET with client-certificate authentication.
pub struct Sslget<'a> {
    runner: &'a dyn ProcessRunner,
}

/// Client-certificate credentials for the agent port.
#[derive(Debug, Clone)]
pub struct AgentCredentials {
    pub database: std::path::PathBuf,
    pub password: String,
    pub nickname: String,
}

impl<'a> Sslget<'a> {
    pub fn new(runner: &'a dyn ProcessRunner) -> Self {
        Self { runner }
    }

    pub async fn post(
        &self,
        credentials: &AgentCredentials,
        params: &str,
        servlet: &str,
        host_port: &str,
    ) -> DeployResult<String> {
        let cmd = CommandSpec::new(tools::SSLGET)
            .args(["-n", &credentials.nickname])
            .arg("-p")
            .secret_arg(credentials.password.clone())
            .args(["-d", &path_arg(&credentials.database)])
            .args(["-e", params])
            .arg("-v")
            .args(["-r", servlet])
            .arg(host_port);
        run_checked(self.runner, &cmd).await.map(|out| out.stdout)
    }
}

/// The `pki` command-line client.
pub struct PkiCli<'a> {
    runner: &'a dyn ProcessRunner,
}

/// Where and as whom to request an install token.
#[derive(Debug, Clone)]
pub struct TokenRequest<'r> {
    pub client_database: &'r Path,
    pub client_password: &'r str,
    pub domain_host: &'r str,
    pub domain_port: &'r str,
    pub user: &'r str,
    pub password: &'r str,
    pub hostname: &'r str,
    pub subsystem: &'r str,
}

impl<'a> PkiCli<'a> {
    pub fn new(runner: &'a dyn ProcessRunner) -> Self {
        Self { runner }
    }

    pub async fn install_token(&self, request: &TokenRequest<'_>) -> DeployResult<String> {
        let cmd = CommandSpec::new(tools::PKI)
            .args(["-d", &path_arg(request.client_database)])
            .arg("-c")
            .secret_arg(request.client_password)
            .args(["-P", "https", "-h", request.domain_host, "-p", request.domain_port])
            .args(["-u", request.user])
            .arg("-w")
            .secret_arg(request.password)
            .arg("securitydomain-get-install-token")
            .args(["--hostname", request.hostname])
            .args(["--subsystem", request.subsystem]);
        let output = run_checked(self.runner, &cmd).await?;
        parse_install_token(&output.stdout)
    }
}

/// Scrape the token out of `pki securitydomain-get-install-token` output.
pub fn parse_install_token(output: &str) -> DeployResult<String> {
    INSTALL_TOKEN
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            DeployError::RemoteProtocol("no install token in security domain response".into())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_install_token() {
        let out = "  Install token: \"-8523786524795329513\"\n  Hostname: pki.example.com\n";
        assert_eq!(parse_install_token(out).unwrap(), "-8523786524795329513");
    }

    #[test]
    fn test_parse_install_token_missing() {
        let err = parse_install_token("Hostname: pki.example.com").unwrap_err();
        assert!(matches!(err, DeployError::RemoteProtocol(_)));
        assert!(parse_install_token("Install token: \"\"").is_err());
    }

    #[test]
    fn test_secret_file_holds_secret() {
        let file = secret_file("s3cret").unwrap();
        assert_eq!(std::fs::read_to_string(file.path()).unwrap(), "s3cret");
    }
}
