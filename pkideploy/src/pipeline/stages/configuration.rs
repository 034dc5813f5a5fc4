//! Server startup, the configuration request, and domain membership.
//!
//! Spawn starts the server, waits for it, optionally obtains an install
//! token and submits the configuration request. External CA and
//! standalone deployments stop after step one with the CSRs on disk;
//! otherwise the issued admin certificate is imported into the client
//! database and exported as PKCS#12.
//!
//! Destroy deregisters from the security domain and stops the server,
//! both best effort.

use crate::config::RuntimeConfig;
use crate::params::layout::names;
use crate::params::{CertTag, DeploymentParams};
use crate::pipeline::{DeployStage, DeploymentContext, StageName};
use crate::process::ProcessRunner;
use crate::process::tools::{
    AgentCredentials, Certutil, Pk12util, Systemd, TokenRequest, secret_file,
};
use crate::remote::{
    ConfigurationRequest, ConfigurationResponse, RemoteSubsystem, SystemCertData, http_client,
};
use crate::security_domain::{
    DeregisterOutcome, DomainEndpoint, DomainMember, SecurityDomainClient,
};
use crate::types::{SecurityDomainType, Subsystem};
use async_trait::async_trait;
use pkideploy_shared::constants::permissions;
use pkideploy_shared::errors::{Criticality, DeployError, DeployResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct Configuration;

#[async_trait]
impl DeployStage for Configuration {
    fn name(&self) -> StageName {
        StageName::Configuration
    }

    async fn spawn(&self, ctx: &mut DeploymentContext) -> DeployResult<()> {
        let runner = ctx.runner();
        let (token, response) = {
            let params = &ctx.params;
            let layout = &params.layout;

            Systemd::new(runner.as_ref())
                .start(&layout.systemd_service_name())
                .await?;

            let http = http_client(ca_bundle(params).as_deref())?;
            let remote = RemoteSubsystem::new(http.clone(), server_url(params)?, layout.subsystem());
            let timeout = Duration::from_secs(params.store.get_parsed("pki_startup_timeout")?);
            remote.wait_for_startup(timeout, ctx.startup_poll).await?;

            let token = match params.security_domain_type {
                SecurityDomainType::Existing => {
                    let client_password = params.store.get("pki_client_database_password")?;
                    let domain_password = params.store.get("pki_security_domain_password")?;
                    let request = token_request(params, client_password, domain_password)?;
                    let client = SecurityDomainClient::new(http, runner.as_ref());
                    Some(client.register(&request).await?)
                }
                SecurityDomainType::New => None,
            };

            let request = build_configuration_request(params, token.clone())?;
            (token, remote.configure(&request).await?)
        };
        ctx.install_token = token;

        if ctx.params.scenario.is_step_one() {
            ctx.csr_paths = persist_csrs(ctx, &response)?;
            ctx.step_one_complete = true;
            tracing::info!(count = ctx.csr_paths.len(), "Wrote certificate signing requests");
            return Ok(());
        }

        ctx.configured = true;
        match response.admin_cert {
            Some(admin) => import_admin_cert(ctx, &admin.cert).await?,
            None => tracing::info!("No admin certificate issued"),
        }
        Ok(())
    }

    async fn destroy(&self, ctx: &mut DeploymentContext) -> DeployResult<()> {
        let runner = ctx.runner();
        let params = &ctx.params;

        let outcome = Criticality::BestEffort
            .absorb(deregister(params, runner.as_ref()).await, "security domain deregistration")?;
        if let Some(outcome) = outcome {
            tracing::info!(?outcome, "Security domain membership updated");
        }

        if ctx.owns_instance() {
            let service = params.layout.systemd_service_name();
            Criticality::BestEffort.absorb(
                Systemd::new(runner.as_ref()).stop(&service).await,
                "stopping the server",
            )?;
        } else {
            tracing::info!(siblings = ?ctx.siblings, "Other subsystems remain; leaving server running");
        }
        Ok(())
    }
}

fn server_url(params: &DeploymentParams) -> DeployResult<String> {
    if let Some(url) = params.store.get_non_empty("pki_server_url") {
        return Ok(url.to_string());
    }
    Ok(format!(
        "https://{}:{}",
        params.store.get("pki_hostname")?,
        params.store.get("pki_https_port")?
    ))
}

fn ca_bundle(params: &DeploymentParams) -> Option<PathBuf> {
    params
        .store
        .get_non_empty("pki_server_ca_bundle")
        .map(PathBuf::from)
}

fn token_request<'a>(
    params: &'a DeploymentParams,
    client_password: &'a str,
    domain_password: &'a str,
) -> DeployResult<TokenRequest<'a>> {
    let store = &params.store;
    Ok(TokenRequest {
        client_database: Path::new(store.get("pki_client_database_dir")?),
        client_password,
        domain_host: store.get("pki_security_domain_hostname")?,
        domain_port: store.get("pki_security_domain_https_port")?,
        user: store.get("pki_security_domain_user")?,
        password: domain_password,
        hostname: store.get("pki_hostname")?,
        subsystem: params.layout.subsystem().as_str(),
    })
}

/// Assemble the request body for `rest/installer/configure`.
///
/// On step two the externally signed certificates are read from disk.
pub fn build_configuration_request(
    params: &DeploymentParams,
    install_token: Option<String>,
) -> DeployResult<ConfigurationRequest> {
    let store = &params.store;
    let scenario = &params.scenario;
    let subsystem = params.layout.subsystem();
    let hostname = store.get("pki_hostname")?;
    let https_port = store.get("pki_https_port")?;

    let security_domain_uri = match params.security_domain_type {
        SecurityDomainType::New => format!("https://{hostname}:{https_port}"),
        SecurityDomainType::Existing => match store.get_non_empty("pki_security_domain_uri") {
            Some(uri) => uri.to_string(),
            None => format!(
                "https://{}:{}",
                store.get("pki_security_domain_hostname")?,
                store.get("pki_security_domain_https_port")?
            ),
        },
    };

    let hierarchy = (subsystem == Subsystem::Ca).then(|| {
        if scenario.external || scenario.subordinate {
            "join".to_string()
        } else {
            "root".to_string()
        }
    });

    let secure_conn = store.get_bool("pki_ds_secure_connection")?;
    let ds_port = if secure_conn {
        store.get("pki_ds_ldaps_port")?
    } else {
        store.get("pki_ds_ldap_port")?
    };

    let mut system_certs = Vec::with_capacity(params.certs.len());
    for spec in params.certs.iter() {
        let cert = if scenario.is_step_two() {
            signed_cert_path(params, spec.tag, spec.cert_path.as_deref())?
                .map(|path| read_pem(&path))
                .transpose()?
        } else {
            None
        };
        system_certs.push(SystemCertData {
            tag: spec.tag,
            nickname: spec.nickname.clone(),
            key_algorithm: spec.key_algorithm.clone(),
            key_size: spec.key_size.to_string(),
            key_type: spec.key_type.clone(),
            subject_dn: spec.subject_dn.clone(),
            token: spec.token.clone(),
            cert,
        });
    }

    Ok(ConfigurationRequest {
        pin: store.get("pki_one_time_pin")?.to_string(),
        subsystem_name: format!("{} {hostname} {https_port}", subsystem.as_str()),
        security_domain_type: params.security_domain_type.as_str().to_string(),
        security_domain_uri,
        security_domain_name: store.get("pki_security_domain_name")?.to_string(),
        install_token,
        is_clone: scenario.clone,
        clone_uri: store.get_non_empty("pki_clone_uri").map(str::to_string),
        hierarchy,
        external: scenario.external,
        stand_alone: scenario.standalone,
        step_two: scenario.is_step_two(),
        ds_host: store.get("pki_ds_hostname")?.to_string(),
        ds_port: ds_port.to_string(),
        base_dn: store.get("pki_ds_base_dn")?.to_string(),
        bind_dn: store.get("pki_ds_bind_dn")?.to_string(),
        bind_password: store.get_secret("pki_ds_password").unwrap_or_default().to_string(),
        database: store.get("pki_ds_database")?.to_string(),
        secure_conn,
        system_certs,
        admin_uid: store.get("pki_admin_uid")?.to_string(),
        admin_password: store
            .get_secret("pki_admin_password")
            .unwrap_or_default()
            .to_string(),
        admin_email: store.get("pki_admin_email")?.to_string(),
        admin_name: store.get("pki_admin_name")?.to_string(),
        admin_subject_dn: store.get("pki_admin_subject_dn")?.to_string(),
        admin_key_type: store.get("pki_admin_key_type")?.to_string(),
    })
}

/// Where step two finds the signed certificate for `tag`, if anywhere.
fn signed_cert_path(
    params: &DeploymentParams,
    tag: CertTag,
    configured: Option<&Path>,
) -> DeployResult<Option<PathBuf>> {
    if params.scenario.external && tag == CertTag::CaSigning {
        let path = params.store.get("pki_external_ca_cert_path")?;
        return Ok(Some(PathBuf::from(path)));
    }
    Ok(configured.map(Path::to_path_buf))
}

fn read_pem(path: &Path) -> DeployResult<String> {
    std::fs::read_to_string(path)
        .map(|text| text.trim().to_string())
        .map_err(|e| DeployError::fs(path, e))
}

/// Wrap base64 in PEM armor unless it already is PEM.
fn pem_wrap(label: &str, body: &str) -> String {
    let body = body.trim();
    if body.starts_with("-----BEGIN") {
        return format!("{body}\n");
    }
    format!("-----BEGIN {label}-----\n{body}\n-----END {label}-----\n")
}

fn persist_csrs(
    ctx: &mut DeploymentContext,
    response: &ConfigurationResponse,
) -> DeployResult<Vec<PathBuf>> {
    let (params, mut fs) = ctx.recorder();
    let mut written = Vec::new();

    for cert in &response.system_certs {
        let Some(request) = cert.request.as_deref() else {
            continue;
        };
        let tag: CertTag = cert.tag.parse()?;
        let spec = params.certs.get(tag).ok_or_else(|| {
            DeployError::RemoteProtocol(format!("unexpected certificate request for '{tag}'"))
        })?;
        fs.write_file(
            &spec.csr_path,
            &pem_wrap("CERTIFICATE REQUEST", request),
            permissions::FILE,
        )?;
        tracing::debug!(%tag, path = %spec.csr_path.display(), "Saved CSR");
        written.push(spec.csr_path.clone());
    }

    if written.is_empty() {
        return Err(DeployError::RemoteProtocol(
            "step one response carried no certificate requests".into(),
        ));
    }
    Ok(written)
}

async fn import_admin_cert(ctx: &mut DeploymentContext, cert: &str) -> DeployResult<()> {
    let runner = ctx.runner();
    let (params, mut fs) = ctx.recorder();
    let layout = &params.layout;
    let store = &params.store;

    let client_db = layout.client_database_path();
    fs.create_dir(&client_db, permissions::DIR)?;
    let cert_file = layout.client_admin_cert();
    fs.write_file(&cert_file, &pem_wrap("CERTIFICATE", cert), permissions::FILE)?;

    let password_file = secret_file(store.get("pki_client_database_password")?)?;
    let certutil = Certutil::new(runner.as_ref());
    if !client_db.join(names::NSS_DB_FILES[0]).exists() {
        certutil.create_database(&client_db, password_file.path()).await?;
        for file in names::NSS_DB_FILES {
            let path = client_db.join(file);
            if path.exists() {
                fs.adopt(&path, permissions::SECURITY_DATABASE)?;
            }
        }
    }

    let nickname = store.get("pki_admin_nickname")?;
    certutil
        .import_cert(&client_db, password_file.path(), nickname, "u,u,u", &cert_file)
        .await?;

    let p12 = layout.client_admin_p12();
    let existed = p12.exists();
    Pk12util::new(runner.as_ref())
        .export(
            &client_db,
            password_file.path(),
            nickname,
            &p12,
            store.get("pki_client_pkcs12_password")?,
        )
        .await?;
    if !existed && p12.exists() {
        fs.adopt(&p12, permissions::SECURITY_DATABASE)?;
    }

    tracing::info!(path = %p12.display(), "Exported admin certificate");
    Ok(())
}

/// Remove this subsystem from the security domain it joined.
async fn deregister(
    params: &DeploymentParams,
    runner: &dyn ProcessRunner,
) -> DeployResult<DeregisterOutcome> {
    let layout = &params.layout;
    let cs_path = layout.target_cs_cfg();
    if !cs_path.exists() {
        tracing::warn!(path = %cs_path.display(), "No runtime configuration; cannot deregister");
        return Ok(DeregisterOutcome::Skipped);
    }
    let cs = RuntimeConfig::load(&cs_path)?;

    if layout.subsystem() == Subsystem::Ca && cs.get("securitydomain.select") == Some("new") {
        tracing::info!("This CA hosts the security domain; nothing to deregister");
        return Ok(DeregisterOutcome::Skipped);
    }

    let field = |key: &str| -> DeployResult<String> {
        cs.get(key).map(str::to_string).ok_or_else(|| {
            DeployError::config(format!("{} lacks '{key}'", cs_path.display()))
        })
    };
    let domain_host = field("securitydomain.host")?;
    let kind = field("cs.type")?;
    let machine = field("machineName")?;
    let secure_port = field("service.securityDomainPort")?;

    let member = DomainMember {
        name: format!("{kind} {machine} {secure_port}"),
        subsystem_type: kind,
        host: machine,
        secure_port,
    };
    let endpoint = DomainEndpoint {
        admin_url: format!(
            "https://{domain_host}:{}",
            field("securitydomain.httpsadminport")?
        ),
        agent_host_port: format!("{domain_host}:{}", field("securitydomain.httpsagentport")?),
    };

    let database_password = RuntimeConfig::load(&layout.password_conf())?
        .get("internal")
        .map(str::to_string)
        .ok_or_else(|| {
            DeployError::config(format!(
                "{} has no internal token password",
                layout.password_conf().display()
            ))
        })?;
    let agent = AgentCredentials {
        database: layout.database_path(),
        password: database_password,
        nickname: format!("subsystemCert cert-{}", layout.instance_name()),
    };

    let http = http_client(ca_bundle(params).as_deref())?;
    let client = SecurityDomainClient::new(http, runner);

    let token = match (
        params.store.get_secret("pki_client_database_password"),
        params.store.get_secret("pki_security_domain_password"),
    ) {
        (Some(client_password), Some(domain_password)) => {
            let request = token_request(params, client_password, domain_password)?;
            Criticality::BestEffort.absorb(client.register(&request).await, "install token request")?
        }
        _ => None,
    };

    client
        .deregister(
            &member,
            &endpoint,
            token.as_deref(),
            &agent,
            Criticality::BestEffort,
        )
        .await
}
