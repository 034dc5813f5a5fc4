//! The layered parameter store ("master dictionary").

use super::ini::{DEFAULT_SECTION, IniDocument, Section, interpolate};
use super::parse_bool;
use crate::types::Subsystem;
use pkideploy_shared::constants::secrets;
use pkideploy_shared::errors::{DeployError, DeployResult};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

/// Scenario booleans injected as `"false"` when no layer sets them.
pub const SCENARIO_BOOLEANS: &[&str] = &[
    "pki_clone",
    "pki_external",
    "pki_subordinate",
    "pki_standalone",
    "pki_external_step_two",
    "pki_skip_configuration",
    "pki_skip_installation",
];

/// Flattened view over the default, web-server and subsystem sections.
///
/// Two copies of the configuration are kept: the *working* copy used for
/// interpolation, and the *user* copy holding exactly what the operator
/// supplied. The user copy is what gets persisted (redacted) for a later
/// destroy run.
#[derive(Debug, Clone)]
pub struct ParameterStore {
    subsystem: Subsystem,
    working: IniDocument,
    user: IniDocument,
    master: BTreeMap<String, String>,
    sensitive: BTreeSet<String>,
}

impl ParameterStore {
    /// Read the default file, the optional user file and CLI overrides.
    pub fn resolve(
        default_path: &Path,
        user_path: Option<&Path>,
        subsystem: Subsystem,
        overrides: &[(String, String)],
    ) -> DeployResult<Self> {
        let defaults = IniDocument::load(default_path)?;
        let user = match user_path {
            Some(path) => IniDocument::load(path)?,
            None => IniDocument::default(),
        };
        Self::from_documents(defaults, user, subsystem, overrides)
    }

    pub fn from_documents(
        defaults: IniDocument,
        user: IniDocument,
        subsystem: Subsystem,
        overrides: &[(String, String)],
    ) -> DeployResult<Self> {
        let sensitive = [&defaults, &user]
            .iter()
            .filter_map(|doc| doc.get(DEFAULT_SECTION, "sensitive_parameters"))
            .flat_map(str::split_whitespace)
            .map(str::to_string)
            .collect();

        let mut store = Self {
            subsystem,
            working: defaults,
            user: IniDocument::default(),
            master: BTreeMap::new(),
            sensitive,
        };

        for (section, entries) in user.sections() {
            for (key, value) in entries {
                store.merge_user_value(section, key, value);
            }
        }
        for (key, value) in overrides {
            store.merge_user_value(subsystem.as_str(), key, value);
        }

        store.flatten()?;
        Ok(store)
    }

    /// Set a key in both copies and re-flatten.
    pub fn set_property(&mut self, section: &str, key: &str, value: &str) -> DeployResult<()> {
        self.merge_user_value(section, key, value);
        self.flatten()
    }

    /// Fill a key the defaults leave blank, then re-flatten.
    ///
    /// Seeded values live in the working copy only and never reach the replica.
    pub fn seed_default(&mut self, key: &str, value: &str) -> DeployResult<()> {
        if self.get_non_empty(key).is_some() {
            return Ok(());
        }
        self.working.set(DEFAULT_SECTION, key, value);
        self.flatten()
    }

    pub fn subsystem(&self) -> Subsystem {
        self.subsystem
    }

    pub fn master(&self) -> &BTreeMap<String, String> {
        &self.master
    }

    pub fn user_config(&self) -> &IniDocument {
        &self.user
    }

    pub fn contains(&self, key: &str) -> bool {
        self.master.contains_key(key)
    }

    /// Fetch a key; absence is a fatal configuration error.
    pub fn get(&self, key: &str) -> DeployResult<&str> {
        self.master
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| DeployError::missing_key(key))
    }

    /// Fetch a key that is allowed to be absent or blank.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.master
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Fetch a secret, treating blanks and the persisted mask as absent.
    pub fn get_secret(&self, key: &str) -> Option<&str> {
        self.get_non_empty(key).filter(|v| *v != secrets::MASK)
    }

    pub fn get_bool(&self, key: &str) -> DeployResult<bool> {
        self.get(key).map(parse_bool)
    }

    pub fn get_parsed<T>(&self, key: &str) -> DeployResult<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.get(key)?;
        raw.trim().parse().map_err(|e| {
            DeployError::config(format!("invalid value for '{key}': '{raw}' ({e})"))
        })
    }

    /// Record a derived value. Derived keys survive re-flattening.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.master.insert(key.into(), value.into());
    }

    /// Check that every key in `keys` is present.
    pub fn require(&self, keys: &[&str]) -> DeployResult<()> {
        let missing: Vec<&str> = keys
            .iter()
            .copied()
            .filter(|k| !self.master.contains_key(*k))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DeployError::config(format!(
                "missing configuration keys: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn is_sensitive(&self, key: &str) -> bool {
        self.sensitive.contains(key)
    }

    pub fn mark_sensitive(&mut self, key: &str) {
        self.sensitive.insert(key.to_string());
    }

    /// Value suitable for logging.
    pub fn display_value(&self, key: &str) -> String {
        match self.master.get(key) {
            Some(_) if self.is_sensitive(key) => secrets::MASK.to_string(),
            Some(value) => value.clone(),
            None => "<unset>".to_string(),
        }
    }

    /// The user copy with every sensitive value masked.
    pub fn redacted_user_config(&self) -> String {
        let mut redacted = IniDocument::default();
        for (section, entries) in self.user.sections() {
            for (key, value) in entries {
                let value = if self.is_sensitive(key) {
                    secrets::MASK
                } else {
                    value.as_str()
                };
                redacted.set(section, key, value);
            }
        }
        redacted.render()
    }

    fn merge_user_value(&mut self, section: &str, key: &str, value: &str) {
        self.user.set(section, key, value);
        // Secrets may contain '%' and must never be interpolated
        let working_value = if self.is_sensitive(key) {
            value.replace('%', "%%")
        } else {
            value.to_string()
        };
        self.working.set(section, key, &working_value);
    }

    fn flatten(&mut self) -> DeployResult<()> {
        let layers = [
            DEFAULT_SECTION,
            self.subsystem.web_server().section(),
            self.subsystem.as_str(),
        ];

        // Later layers win; references resolve against the merged view
        let mut view = Section::new();
        for layer in layers {
            if let Some(entries) = self.working.section(layer) {
                view.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        for (key, raw) in &view {
            let value = interpolate(raw, &view)?;
            self.master.insert(key.clone(), value);
        }

        for key in SCENARIO_BOOLEANS {
            self.master
                .entry((*key).to_string())
                .or_insert_with(|| "false".to_string());
        }
        self.master
            .insert("pki_subsystem".into(), self.subsystem.as_str().into());
        self.master
            .insert("pki_subsystem_type".into(), self.subsystem.dir_name().into());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> IniDocument {
        IniDocument::parse(text, "test").unwrap()
    }

    fn defaults() -> IniDocument {
        doc("\
[DEFAULT]
sensitive_parameters = pki_admin_password
pki_instance_name = pki-tomcat
pki_path = /var/lib/pki
pki_instance_path = %(pki_path)s/%(pki_instance_name)s
pki_http_port = 1

[Tomcat]
pki_http_port = 8080

[CA]
pki_admin_uid = caadmin

[KRA]
pki_admin_uid = kraadmin
")
    }

    #[test]
    fn test_layers_override_in_order() {
        let user = doc("[CA]\npki_http_port = 9080\n");
        let store = ParameterStore::from_documents(defaults(), user, Subsystem::Ca, &[]).unwrap();
        assert_eq!(store.get("pki_http_port").unwrap(), "9080");
        assert_eq!(store.get("pki_admin_uid").unwrap(), "caadmin");

        let store =
            ParameterStore::from_documents(defaults(), IniDocument::default(), Subsystem::Kra, &[])
                .unwrap();
        assert_eq!(store.get("pki_http_port").unwrap(), "8080");
        assert_eq!(store.get("pki_admin_uid").unwrap(), "kraadmin");
    }

    #[test]
    fn test_user_override_reaches_interpolation() {
        let user = doc("[DEFAULT]\npki_instance_name = other\n");
        let store = ParameterStore::from_documents(defaults(), user, Subsystem::Ca, &[]).unwrap();
        assert_eq!(store.get("pki_instance_path").unwrap(), "/var/lib/pki/other");
    }

    #[test]
    fn test_cli_overrides_win() {
        let overrides = vec![("pki_http_port".to_string(), "7070".to_string())];
        let store =
            ParameterStore::from_documents(defaults(), IniDocument::default(), Subsystem::Ca, &overrides)
                .unwrap();
        assert_eq!(store.get("pki_http_port").unwrap(), "7070");
    }

    #[test]
    fn test_sensitive_values_escaped_and_redacted() {
        let user = doc("[DEFAULT]\npki_admin_password = 50%(off)s\n");
        let store = ParameterStore::from_documents(defaults(), user, Subsystem::Ca, &[]).unwrap();
        assert_eq!(store.get("pki_admin_password").unwrap(), "50%(off)s");
        assert_eq!(store.display_value("pki_admin_password"), secrets::MASK);

        let replica = store.redacted_user_config();
        assert!(replica.contains(secrets::MASK));
        assert!(!replica.contains("50%"));
    }

    #[test]
    fn test_missing_key_is_fatal() {
        let store =
            ParameterStore::from_documents(defaults(), IniDocument::default(), Subsystem::Ca, &[])
                .unwrap();
        let err = store.get("pki_nonexistent").unwrap_err();
        assert!(err.is_preflight());
        assert!(store.require(&["pki_path", "pki_nonexistent"]).is_err());
        assert!(store.require(&["pki_path"]).is_ok());
    }

    #[test]
    fn test_scenario_booleans_default_false() {
        let store =
            ParameterStore::from_documents(defaults(), IniDocument::default(), Subsystem::Ca, &[])
                .unwrap();
        for key in SCENARIO_BOOLEANS {
            assert!(!store.get_bool(key).unwrap(), "{key} should default to false");
        }
        assert_eq!(store.get("pki_subsystem_type").unwrap(), "ca");
    }

    #[test]
    fn test_set_property_updates_both_copies() {
        let mut store =
            ParameterStore::from_documents(defaults(), IniDocument::default(), Subsystem::Ca, &[])
                .unwrap();
        store.insert("pki_derived", "kept");
        store
            .set_property("DEFAULT", "pki_instance_name", "renamed")
            .unwrap();

        assert_eq!(store.get("pki_instance_path").unwrap(), "/var/lib/pki/renamed");
        assert_eq!(store.get("pki_derived").unwrap(), "kept");
        assert_eq!(
            store.user_config().get("DEFAULT", "pki_instance_name"),
            Some("renamed")
        );
    }

    #[test]
    fn test_masked_secret_treated_as_absent() {
        let user = doc(&format!("[DEFAULT]\npki_admin_password = {}\n", secrets::MASK));
        let store = ParameterStore::from_documents(defaults(), user, Subsystem::Ca, &[]).unwrap();
        assert!(store.get_secret("pki_admin_password").is_none());
    }
}
