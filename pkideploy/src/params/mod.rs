//! Derivation of the full parameter space from a resolved store.
//!
//! [`derive`] fills in everything the stages consume: layout paths, the
//! owning identity, the security domain mode, the certificate table,
//! secrets and slot values. It reads a few files of an existing instance
//! (step two and configuration-only runs) but never writes anything.

pub mod certs;
pub mod identity;
pub mod layout;
pub mod preflight;
pub mod scenario;
pub mod secrets;
pub mod slots;

pub use certs::{CertSpec, CertTable, CertTag};
pub use identity::Identity;
pub use layout::DeploymentLayout;
pub use scenario::ScenarioFlags;
pub use slots::SlotMap;

use crate::config::{IniDocument, ParameterStore};
use crate::types::SecurityDomainType;
use pkideploy_shared::errors::DeployResult;

/// Which half of the lifecycle the parameters are derived for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployMode {
    Spawn,
    Destroy,
}

impl DeployMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DeployMode::Spawn => "spawn",
            DeployMode::Destroy => "destroy",
        }
    }
}

/// The fully derived context every stage receives.
#[derive(Debug, Clone)]
pub struct DeploymentParams {
    pub store: ParameterStore,
    pub scenario: ScenarioFlags,
    pub mode: DeployMode,
    pub layout: DeploymentLayout,
    pub identity: Identity,
    pub security_domain_type: SecurityDomainType,
    pub certs: CertTable,
    /// Empty when destroying.
    pub slots: SlotMap,
}

/// Derive every key the pipeline consumes.
///
/// `slots` is only consulted when spawning.
pub fn derive(
    mut store: ParameterStore,
    scenario: ScenarioFlags,
    mode: DeployMode,
    slots: &IniDocument,
) -> DeployResult<DeploymentParams> {
    seed_hostname(&mut store)?;

    let subsystem = store.subsystem();
    let layout = DeploymentLayout::from_store(&store)?;
    layout.publish(&mut store);

    let identity = Identity::resolve(&store)?;
    store.insert("pki_uid", identity.uid.to_string());
    store.insert("pki_gid", identity.gid.to_string());

    let security_domain_type = scenario.security_domain_type(subsystem);
    store.insert("pki_security_domain_type", security_domain_type.as_str());

    let certs = CertTable::build(&store, subsystem, &layout.subsystem_configuration_path())?;

    let slot_map = match mode {
        DeployMode::Spawn => {
            let pin = secrets::one_time_pin(&scenario, &layout.target_cs_cfg())?;
            let db_pin = secrets::database_pin(&store, &scenario, &layout.password_conf())?;
            let client_password = secrets::client_database_password(&store);
            for (key, value) in [
                ("pki_one_time_pin", pin.as_str()),
                ("pki_pin", db_pin.as_str()),
                ("pki_client_database_password", client_password.as_str()),
            ] {
                store.insert(key, value);
                store.mark_sensitive(key);
            }

            slots::publish_slot_values(&mut store, &layout, &identity, &pin)?;
            SlotMap::build(slots, subsystem.web_server(), &store)?
        }
        DeployMode::Destroy => SlotMap::default(),
    };

    tracing::info!(
        subsystem = %subsystem,
        instance = layout.instance_name(),
        mode = mode.as_str(),
        security_domain = security_domain_type.as_str(),
        "Derived deployment parameters"
    );

    Ok(DeploymentParams {
        store,
        scenario,
        mode,
        layout,
        identity,
        security_domain_type,
        certs,
        slots: slot_map,
    })
}

/// Fill host-dependent defaults left blank in the configuration.
fn seed_hostname(store: &mut ParameterStore) -> DeployResult<()> {
    let hostname = match store.get_non_empty("pki_hostname") {
        Some(host) => host.to_string(),
        None => nix::unistd::gethostname()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string()),
    };
    let domain = hostname
        .split_once('.')
        .map(|(_, d)| d.to_string())
        .unwrap_or_else(|| hostname.clone());

    store.seed_default("pki_dns_domainname", &domain)?;
    store.seed_default("pki_hostname", &hostname)
}
