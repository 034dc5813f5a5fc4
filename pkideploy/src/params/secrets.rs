//! One-time pin and generated database passwords.

use super::scenario::ScenarioFlags;
use crate::config::{ParameterStore, RuntimeConfig};
use pkideploy_shared::constants::secrets::TOKEN_LEN;
use pkideploy_shared::errors::{DeployError, DeployResult};
use rand::distr::{Alphanumeric, SampleString};
use std::path::Path;

pub fn random_token() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), TOKEN_LEN)
}

/// Pin guarding the configuration URL.
///
/// Step two and configuration-only runs must reuse the pin step one wrote
/// into `CS.cfg`; a fresh pin would invalidate the URL already handed out.
pub fn one_time_pin(scenario: &ScenarioFlags, cs_cfg: &Path) -> DeployResult<String> {
    let reuse = scenario.is_step_two()
        || (scenario.skip_installation && !scenario.skip_configuration);
    if !reuse {
        return Ok(random_token());
    }

    RuntimeConfig::load(cs_cfg)?
        .get("preop.pin")
        .map(str::to_string)
        .ok_or_else(|| {
            DeployError::config(format!(
                "no preop.pin in {}; the instance must be installed first",
                cs_cfg.display()
            ))
        })
}

/// Password of the shared NSS database.
///
/// Once `password.conf` exists the database already has a password, and
/// every later subsystem of the instance must use it. Otherwise the
/// operator's `pki_pin` wins over a random one.
pub fn database_pin(
    store: &ParameterStore,
    scenario: &ScenarioFlags,
    password_conf: &Path,
) -> DeployResult<String> {
    if password_conf.exists() {
        return read_internal_password(password_conf);
    }
    if let Some(pin) = store.get_secret("pki_pin") {
        return Ok(pin.to_string());
    }
    if scenario.skip_installation {
        return Err(DeployError::config(format!(
            "{} does not exist; the instance must be installed first",
            password_conf.display()
        )));
    }
    Ok(random_token())
}

fn read_internal_password(password_conf: &Path) -> DeployResult<String> {
    RuntimeConfig::load(password_conf)?
        .get("internal")
        .map(str::to_string)
        .ok_or_else(|| {
            DeployError::config(format!(
                "no internal token password in {}",
                password_conf.display()
            ))
        })
}

pub fn client_database_password(store: &ParameterStore) -> String {
    store
        .get_secret("pki_client_database_password")
        .map(str::to_string)
        .unwrap_or_else(random_token)
}
