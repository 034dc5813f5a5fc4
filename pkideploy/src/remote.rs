//! REST client for the subsystem being deployed.

use crate::params::CertTag;
use crate::types::Subsystem;
use pkideploy_shared::constants::startup;
use pkideploy_shared::errors::{DeployError, DeployResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Build an HTTPS client trusting `ca_bundle`, or any certificate when no
/// bundle is configured (the server's own certificate is freshly issued).
pub fn http_client(ca_bundle: Option<&Path>) -> DeployResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().use_rustls_tls();
    match ca_bundle {
        Some(path) => {
            let pem = std::fs::read(path).map_err(|e| DeployError::fs(path, e))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| DeployError::config(format!("invalid CA bundle {}: {e}", path.display())))?;
            builder = builder.add_root_certificate(cert);
        }
        None => {
            tracing::warn!("No CA bundle configured; server certificates will not be verified");
            builder = builder.danger_accept_invalid_certs(true);
        }
    }
    builder
        .build()
        .map_err(|e| DeployError::Http(format!("failed to build HTTP client: {e}")))
}

#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    #[serde(rename = "Response")]
    response: StatusBody,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    #[serde(rename = "Status")]
    status: String,
}

/// One system certificate in a configuration request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemCertData {
    pub tag: CertTag,
    pub nickname: String,
    pub key_algorithm: String,
    pub key_size: String,
    pub key_type: String,
    #[serde(rename = "subjectDN")]
    pub subject_dn: String,
    pub token: String,
    /// Externally signed certificate (step two).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationRequest {
    pub pin: String,
    pub subsystem_name: String,
    pub security_domain_type: String,
    pub security_domain_uri: String,
    pub security_domain_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_token: Option<String>,
    pub is_clone: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clone_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hierarchy: Option<String>,
    pub external: bool,
    pub stand_alone: bool,
    pub step_two: bool,
    pub ds_host: String,
    pub ds_port: String,
    #[serde(rename = "baseDN")]
    pub base_dn: String,
    #[serde(rename = "bindDN")]
    pub bind_dn: String,
    #[serde(rename = "bindpwd")]
    pub bind_password: String,
    pub database: String,
    pub secure_conn: bool,
    pub system_certs: Vec<SystemCertData>,
    #[serde(rename = "adminUID")]
    pub admin_uid: String,
    pub admin_password: String,
    pub admin_email: String,
    pub admin_name: String,
    #[serde(rename = "adminSubjectDN")]
    pub admin_subject_dn: String,
    pub admin_key_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemCertResponse {
    pub tag: String,
    #[serde(default)]
    pub request: Option<String>,
    #[serde(default)]
    pub cert: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminCertResponse {
    pub cert: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationResponse {
    #[serde(default)]
    pub system_certs: Vec<SystemCertResponse>,
    #[serde(default)]
    pub admin_cert: Option<AdminCertResponse>,
}

/// Status and configuration endpoints of one subsystem.
#[derive(Debug, Clone)]
pub struct RemoteSubsystem {
    client: reqwest::Client,
    base_url: String,
    subsystem: Subsystem,
}

impl RemoteSubsystem {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, subsystem: Subsystem) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            subsystem,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, suffix: &str) -> String {
        let sub = self.subsystem.dir_name();
        format!("{}/{sub}/{suffix}", self.base_url)
    }

    /// Current server status string, e.g. `running`.
    pub async fn status(&self) -> DeployResult<String> {
        let sub = self.subsystem.dir_name();
        let response = self
            .client
            .get(self.url(&format!("admin/{sub}/getStatus")))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| DeployError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DeployError::Http(format!(
                "status request returned {}",
                response.status()
            )));
        }
        let envelope: StatusEnvelope = response
            .json()
            .await
            .map_err(|e| DeployError::RemoteProtocol(format!("malformed status response: {e}")))?;
        Ok(envelope.response.status)
    }

    /// Poll [`status`](Self::status) until the server reports running.
    pub async fn wait_for_startup(&self, timeout: Duration, poll: Duration) -> DeployResult<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.status().await {
                Ok(status) if status == startup::RUNNING => {
                    tracing::info!(url = %self.base_url, "Server is running");
                    return Ok(());
                }
                Ok(status) => tracing::debug!(%status, "Server not ready"),
                Err(e) => tracing::debug!(error = %e, "Server not reachable yet"),
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(DeployError::Http(format!(
                    "server at {} did not start within {}s",
                    self.base_url,
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(poll).await;
        }
    }

    pub async fn configure(
        &self,
        request: &ConfigurationRequest,
    ) -> DeployResult<ConfigurationResponse> {
        tracing::info!(subsystem = %self.subsystem, "Submitting configuration request");
        let response = self
            .client
            .post(self.url("rest/installer/configure"))
            .json(request)
            .send()
            .await
            .map_err(|e| DeployError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeployError::RemoteProtocol(format!(
                "configuration request rejected ({status}): {body}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| DeployError::RemoteProtocol(format!("malformed configuration response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_field_names() {
        let request = ConfigurationRequest {
            pin: "p".into(),
            subsystem_name: "CA pki.example.com 8443".into(),
            security_domain_type: "new".into(),
            security_domain_uri: "https://pki.example.com:8443".into(),
            security_domain_name: "Example".into(),
            install_token: None,
            is_clone: false,
            clone_uri: None,
            hierarchy: Some("root".into()),
            external: false,
            stand_alone: false,
            step_two: false,
            ds_host: "ds".into(),
            ds_port: "389".into(),
            base_dn: "o=pki".into(),
            bind_dn: "cn=Directory Manager".into(),
            bind_password: "x".into(),
            database: "ca".into(),
            secure_conn: false,
            system_certs: vec![SystemCertData {
                tag: CertTag::SslServer,
                nickname: "Server-Cert".into(),
                key_algorithm: "SHA256withRSA".into(),
                key_size: "2048".into(),
                key_type: "rsa".into(),
                subject_dn: "cn=pki".into(),
                token: "internal".into(),
                cert: None,
            }],
            admin_uid: "caadmin".into(),
            admin_password: "y".into(),
            admin_email: "caadmin@example.com".into(),
            admin_name: "CA Admin".into(),
            admin_subject_dn: "cn=CA Admin".into(),
            admin_key_type: "rsa".into(),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["securityDomainType"], "new");
        assert_eq!(json["baseDN"], "o=pki");
        assert_eq!(json["bindpwd"], "x");
        assert_eq!(json["systemCerts"][0]["tag"], "ssl_server");
        assert_eq!(json["systemCerts"][0]["subjectDN"], "cn=pki");
        assert!(json.get("installToken").is_none());
        assert!(json["systemCerts"][0].get("cert").is_none());
    }

    #[test]
    fn test_response_tolerates_missing_fields() {
        let response: ConfigurationResponse =
            serde_json::from_str(r#"{"systemCerts":[{"tag":"ca_signing","request":"MIIB"}]}"#)
                .unwrap();
        assert_eq!(response.system_certs[0].request.as_deref(), Some("MIIB"));
        assert!(response.admin_cert.is_none());
    }
}
