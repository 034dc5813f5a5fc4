//! The system account that owns everything an instance creates.

use crate::config::ParameterStore;
use nix::unistd::{Gid, Group, Uid, User};
use pkideploy_shared::errors::{DeployError, DeployResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user: String,
    pub group: String,
    pub uid: u32,
    pub gid: u32,
}

impl Identity {
    /// Resolve `pki_user`/`pki_group` through the system user database.
    ///
    /// Explicit `pki_uid`/`pki_gid` values win over the lookup.
    pub fn resolve(store: &ParameterStore) -> DeployResult<Self> {
        let user = store.get("pki_user")?.to_string();
        let group = store.get("pki_group")?.to_string();

        let uid = match store.get_non_empty("pki_uid") {
            Some(_) => store.get_parsed::<u32>("pki_uid")?,
            None => User::from_name(&user)
                .map_err(|e| DeployError::config(format!("cannot look up user '{user}': {e}")))?
                .ok_or_else(|| DeployError::config(format!("user '{user}' does not exist")))?
                .uid
                .as_raw(),
        };
        let gid = match store.get_non_empty("pki_gid") {
            Some(_) => store.get_parsed::<u32>("pki_gid")?,
            None => Group::from_name(&group)
                .map_err(|e| DeployError::config(format!("cannot look up group '{group}': {e}")))?
                .ok_or_else(|| DeployError::config(format!("group '{group}' does not exist")))?
                .gid
                .as_raw(),
        };

        tracing::debug!(%user, %group, uid, gid, "Resolved deployment identity");
        Ok(Self {
            user,
            group,
            uid,
            gid,
        })
    }

    /// Identity of the running process.
    pub fn current() -> DeployResult<Self> {
        let uid = Uid::current();
        let gid = Gid::current();
        let user = User::from_uid(uid)
            .map_err(|e| DeployError::Internal(format!("cannot look up uid {uid}: {e}")))?
            .map(|u| u.name)
            .unwrap_or_else(|| uid.to_string());
        let group = Group::from_gid(gid)
            .map_err(|e| DeployError::Internal(format!("cannot look up gid {gid}: {e}")))?
            .map(|g| g.name)
            .unwrap_or_else(|| gid.to_string());
        Ok(Self {
            user,
            group,
            uid: uid.as_raw(),
            gid: gid.as_raw(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IniDocument;
    use crate::types::Subsystem;

    fn store(text: &str) -> ParameterStore {
        let defaults = IniDocument::parse(text, "test").unwrap();
        ParameterStore::from_documents(defaults, IniDocument::default(), Subsystem::Ca, &[]).unwrap()
    }

    #[test]
    fn test_explicit_ids_skip_lookup() {
        let store = store(
            "[DEFAULT]\npki_user = nosuchuser\npki_group = nosuchgroup\npki_uid = 17\npki_gid = 18\n",
        );
        let identity = Identity::resolve(&store).unwrap();
        assert_eq!((identity.uid, identity.gid), (17, 18));
        assert_eq!(identity.user, "nosuchuser");
    }

    #[test]
    fn test_unknown_user_is_configuration_error() {
        let store = store("[DEFAULT]\npki_user = no-such-user-xyz\npki_group = root\n");
        let err = Identity::resolve(&store).unwrap_err();
        assert!(err.is_preflight());
    }

    #[test]
    fn test_current_identity_resolves_by_name() {
        let me = Identity::current().unwrap();
        let store = store(&format!(
            "[DEFAULT]\npki_user = {}\npki_group = {}\n",
            me.user, me.group
        ));
        let resolved = Identity::resolve(&store).unwrap();
        assert_eq!(resolved.uid, me.uid);
        assert_eq!(resolved.gid, me.gid);
    }
}
