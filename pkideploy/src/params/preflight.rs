//! Validation run after derivation and before any stage mutates anything.

use super::DeploymentParams;
use crate::types::{SecurityDomainType, Subsystem};
use pkideploy_shared::errors::{DeployError, DeployResult};
use std::collections::BTreeSet;
use std::path::Path;

/// Keys the spawn stages read by name.
pub const REQUIRED_KEYS: &[&str] = &[
    "pki_instance_name",
    "pki_hostname",
    "pki_http_port",
    "pki_https_port",
    "pki_ajp_port",
    "pki_tomcat_server_port",
    "pki_proxy_http_port",
    "pki_proxy_https_port",
    "pki_security_manager",
    "pki_admin_uid",
    "pki_admin_name",
    "pki_admin_email",
    "pki_admin_subject_dn",
    "pki_admin_nickname",
    "pki_admin_key_type",
    "pki_ds_hostname",
    "pki_ds_ldap_port",
    "pki_ds_ldaps_port",
    "pki_ds_base_dn",
    "pki_ds_bind_dn",
    "pki_ds_database",
    "pki_ds_secure_connection",
    "pki_security_domain_name",
    "pki_security_domain_hostname",
    "pki_security_domain_https_port",
    "pki_security_domain_user",
    "pki_startup_timeout",
    "pki_restart_configured_instance",
];

const TOMCAT_PORT_KEYS: &[&str] = &[
    "pki_http_port",
    "pki_https_port",
    "pki_ajp_port",
    "pki_tomcat_server_port",
];

/// Run every spawn pre-flight check.
pub fn validate(params: &DeploymentParams) -> DeployResult<()> {
    params.store.require(REQUIRED_KEYS)?;
    params.scenario.validate(params.layout.subsystem())?;
    validate_sensitive_data(params)?;
    validate_predefined_artifacts(params)?;
    validate_ports(params)?;
    validate_ds_connection(params)?;
    tracing::debug!("Pre-flight validation passed");
    Ok(())
}

fn validate_sensitive_data(params: &DeploymentParams) -> DeployResult<()> {
    let scenario = &params.scenario;
    let configures = !scenario.skip_configuration;
    let completes = configures && !scenario.is_step_one();

    let mut needed = Vec::new();
    if completes {
        needed.push("pki_admin_password");
        needed.push("pki_client_pkcs12_password");
    }
    if configures {
        needed.push("pki_ds_password");
        if params.security_domain_type == SecurityDomainType::Existing {
            needed.push("pki_security_domain_password");
        }
    }
    if scenario.clone {
        needed.push("pki_clone_pkcs12_password");
    }

    for key in needed {
        if params.store.get_secret(key).is_none() {
            return Err(DeployError::config(format!(
                "'{key}' must be supplied for this deployment"
            )));
        }
    }
    Ok(())
}

fn validate_predefined_artifacts(params: &DeploymentParams) -> DeployResult<()> {
    let scenario = &params.scenario;
    let store = &params.store;

    if scenario.clone {
        require_file(store.get("pki_clone_pkcs12_path")?, "pki_clone_pkcs12_path")?;
        if store.get_non_empty("pki_clone_uri").is_none() {
            return Err(DeployError::config("clones require 'pki_clone_uri'"));
        }
    }

    if scenario.is_step_two() && scenario.external && params.layout.subsystem() == Subsystem::Ca {
        require_file(
            store.get("pki_external_ca_cert_path")?,
            "pki_external_ca_cert_path",
        )?;
        require_file(
            store.get("pki_external_ca_cert_chain_path")?,
            "pki_external_ca_cert_chain_path",
        )?;
    }

    if scenario.is_step_two() && scenario.standalone {
        for spec in params.certs.iter() {
            let key = format!("pki_{}_cert_path", spec.tag);
            let path = spec.cert_path.as_deref().ok_or_else(|| {
                DeployError::config(format!("standalone step two requires '{key}'"))
            })?;
            require_file(&path.to_string_lossy(), &key)?;
        }
    }
    Ok(())
}

fn validate_ports(params: &DeploymentParams) -> DeployResult<()> {
    let mut seen = BTreeSet::new();
    for key in TOMCAT_PORT_KEYS {
        let port: u16 = params.store.get_parsed(key)?;
        if port == 0 {
            return Err(DeployError::config(format!("'{key}' must not be 0")));
        }
        if !seen.insert(port) {
            return Err(DeployError::config(format!(
                "port {port} ('{key}') is assigned more than once"
            )));
        }
    }
    Ok(())
}

fn validate_ds_connection(params: &DeploymentParams) -> DeployResult<()> {
    if !params.store.get_bool("pki_ds_secure_connection")? {
        return Ok(());
    }
    let pem = params
        .store
        .get_non_empty("pki_ds_secure_connection_ca_pem_file")
        .ok_or_else(|| {
            DeployError::config(
                "pki_ds_secure_connection requires 'pki_ds_secure_connection_ca_pem_file'",
            )
        })?;
    require_file(pem, "pki_ds_secure_connection_ca_pem_file")
}

fn require_file(path: &str, key: &str) -> DeployResult<()> {
    if path.trim().is_empty() || !Path::new(path).is_file() {
        return Err(DeployError::config(format!(
            "'{key}' points at '{path}', which is not an existing file"
        )));
    }
    Ok(())
}

