//! Security domain membership: install tokens and deregistration.
//!
//! Deregistration first tries the token-authenticated admin servlet. When no
//! token is available, or the admin port does not answer with a well-formed
//! reply (unreachable, or an HTTP error status), it falls back to the agent
//! servlet authenticated by the subsystem certificate and driven through
//! `sslget`. Both return the same legacy XML reply. A parsed `<Status>`
//! other than success is final.

use crate::process::ProcessRunner;
use crate::process::tools::{AgentCredentials, PkiCli, Sslget, TokenRequest};
use pkideploy_shared::constants::domain_status;
use pkideploy_shared::errors::{Criticality, DeployError, DeployResult};
use regex::Regex;
use std::sync::LazyLock;

const ADMIN_UPDATE_SERVLET: &str = "/ca/admin/ca/updateDomainXML";
const AGENT_UPDATE_SERVLET: &str = "/ca/agent/ca/updateDomainXML";

static STATUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Status>\s*([^<]*?)\s*</Status>").expect("status pattern is valid"));
static ERROR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<Error>\s*(.*?)\s*</Error>").expect("error pattern is valid"));

/// How the subsystem is listed in the domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainMember {
    /// Subsystem type, e.g. `KRA`.
    pub subsystem_type: String,
    /// Listing name, e.g. `KRA pki.example.com 8443`.
    pub name: String,
    pub host: String,
    pub secure_port: String,
}

impl DomainMember {
    pub fn list_name(&self) -> String {
        format!("{}List", self.subsystem_type)
    }

    fn update_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            ("type", self.subsystem_type.clone()),
            ("list", self.list_name()),
            ("host", self.host.clone()),
            ("sport", self.secure_port.clone()),
            ("dm", "false".to_string()),
            ("ops", "remove".to_string()),
        ]
    }
}

/// Where the domain authority listens.
#[derive(Debug, Clone)]
pub struct DomainEndpoint {
    /// Base URL of the admin port, e.g. `https://ca.example.com:8443`.
    pub admin_url: String,
    /// `host:port` of the agent port.
    pub agent_host_port: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeregisterOutcome {
    Removed,
    /// Tolerated failure, with the reason.
    Failed(String),
    /// Nothing to deregister from.
    Skipped,
}

pub struct SecurityDomainClient<'a> {
    http: reqwest::Client,
    runner: &'a dyn ProcessRunner,
}

impl<'a> SecurityDomainClient<'a> {
    pub fn new(http: reqwest::Client, runner: &'a dyn ProcessRunner) -> Self {
        Self { http, runner }
    }

    /// Obtain an install token with the domain admin's credentials.
    pub async fn register(&self, request: &TokenRequest<'_>) -> DeployResult<String> {
        let token = PkiCli::new(self.runner).install_token(request).await?;
        tracing::info!(host = request.domain_host, "Obtained security domain install token");
        Ok(token)
    }

    pub async fn deregister(
        &self,
        member: &DomainMember,
        endpoint: &DomainEndpoint,
        install_token: Option<&str>,
        agent: &AgentCredentials,
        criticality: Criticality,
    ) -> DeployResult<DeregisterOutcome> {
        let reply = match install_token {
            Some(token) => match self.update_via_admin(member, endpoint, token).await {
                Err(DeployError::Http(reason)) => {
                    tracing::warn!(%reason, "Admin port update failed; falling back to agent port");
                    self.update_via_agent(member, endpoint, agent).await
                }
                other => other,
            },
            None => self.update_via_agent(member, endpoint, agent).await,
        };

        match reply.and_then(|body| parse_update_reply(&body)) {
            Ok(()) => {
                tracing::info!(member = %member.name, "Removed from security domain");
                Ok(DeregisterOutcome::Removed)
            }
            Err(e) if criticality.is_critical() => Err(e),
            Err(e) => {
                tracing::error!(member = %member.name, error = %e, "Security domain deregistration failed");
                Ok(DeregisterOutcome::Failed(e.to_string()))
            }
        }
    }

    async fn update_via_admin(
        &self,
        member: &DomainMember,
        endpoint: &DomainEndpoint,
        token: &str,
    ) -> DeployResult<String> {
        let mut form = member.update_params();
        form.push(("sessionID", token.to_string()));

        let url = format!(
            "{}{ADMIN_UPDATE_SERVLET}",
            endpoint.admin_url.trim_end_matches('/')
        );
        tracing::debug!(%url, "Updating security domain through admin port");

        let response = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| DeployError::Http(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DeployError::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(DeployError::Http(format!(
                "security domain update returned {status}"
            )));
        }
        Ok(body)
    }

    async fn update_via_agent(
        &self,
        member: &DomainMember,
        endpoint: &DomainEndpoint,
        agent: &AgentCredentials,
    ) -> DeployResult<String> {
        let params = encode_form(&member.update_params())?;
        tracing::debug!(target_host = %endpoint.agent_host_port, "Updating security domain through agent port");
        Sslget::new(self.runner)
            .post(agent, &params, AGENT_UPDATE_SERVLET, &endpoint.agent_host_port)
            .await
    }
}

/// `0` in `<Status>` is success; anything else, or no status, is a failure.
pub fn parse_update_reply(body: &str) -> DeployResult<()> {
    let status = STATUS
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| {
            DeployError::RemoteProtocol("security domain reply has no <Status> element".into())
        })?;

    if status == domain_status::SUCCESS {
        return Ok(());
    }
    let detail = ERROR
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| format!("status {status}"));
    Err(DeployError::RemoteProtocol(format!(
        "security domain update failed: {detail}"
    )))
}

fn encode_form(pairs: &[(&str, String)]) -> DeployResult<String> {
    let mut url = reqwest::Url::parse("https://localhost/")
        .map_err(|e| DeployError::Internal(format!("form encoder: {e}")))?;
    url.query_pairs_mut()
        .extend_pairs(pairs.iter().map(|(k, v)| (*k, v.as_str())));
    Ok(url.query().unwrap_or_default().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success() {
        assert!(parse_update_reply("<XMLResponse><Status>0</Status></XMLResponse>").is_ok());
    }

    #[test]
    fn test_parse_failure_carries_error_text() {
        let err = parse_update_reply(
            "<XMLResponse><Status>1</Status><Error>not a member</Error></XMLResponse>",
        )
        .unwrap_err();
        assert!(err.to_string().contains("not a member"));
    }

    #[test]
    fn test_parse_missing_status() {
        assert!(parse_update_reply("HTTP/1.1 500 Internal Server Error").is_err());
        assert_eq!(domain_status::FAILURE, "1");
    }

    #[test]
    fn test_encode_form() {
        let member = DomainMember {
            subsystem_type: "KRA".into(),
            name: "KRA pki.example.com 8443".into(),
            host: "pki.example.com".into(),
            secure_port: "8443".into(),
        };
        let encoded = encode_form(&member.update_params()).unwrap();
        assert!(encoded.starts_with("name=KRA+pki.example.com+8443&type=KRA&list=KRAList"));
        assert!(encoded.ends_with("dm=false&ops=remove"));
    }
}
