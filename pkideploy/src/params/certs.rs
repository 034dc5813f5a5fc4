//! System certificate metadata keyed by tag.

use crate::config::ParameterStore;
use crate::types::Subsystem;
use pkideploy_shared::errors::{DeployError, DeployResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertTag {
    CaSigning,
    OcspSigning,
    SslServer,
    Subsystem,
    AuditSigning,
    Transport,
    Storage,
}

impl CertTag {
    pub const ALL: [CertTag; 7] = [
        CertTag::CaSigning,
        CertTag::OcspSigning,
        CertTag::SslServer,
        CertTag::Subsystem,
        CertTag::AuditSigning,
        CertTag::Transport,
        CertTag::Storage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CertTag::CaSigning => "ca_signing",
            CertTag::OcspSigning => "ocsp_signing",
            CertTag::SslServer => "ssl_server",
            CertTag::Subsystem => "subsystem",
            CertTag::AuditSigning => "audit_signing",
            CertTag::Transport => "transport",
            CertTag::Storage => "storage",
        }
    }

    /// System certificates a subsystem needs, in issuance order.
    pub fn required_for(subsystem: Subsystem) -> &'static [CertTag] {
        match subsystem {
            Subsystem::Ca => &[
                CertTag::CaSigning,
                CertTag::OcspSigning,
                CertTag::SslServer,
                CertTag::Subsystem,
                CertTag::AuditSigning,
            ],
            Subsystem::Kra => &[
                CertTag::Storage,
                CertTag::Transport,
                CertTag::SslServer,
                CertTag::Subsystem,
                CertTag::AuditSigning,
            ],
            Subsystem::Ocsp => &[
                CertTag::OcspSigning,
                CertTag::SslServer,
                CertTag::Subsystem,
                CertTag::AuditSigning,
            ],
            Subsystem::Tks | Subsystem::Tps => &[
                CertTag::SslServer,
                CertTag::Subsystem,
                CertTag::AuditSigning,
            ],
        }
    }

    fn key(self, field: &str) -> String {
        format!("pki_{}_{field}", self.as_str())
    }
}

impl fmt::Display for CertTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertTag {
    type Err = DeployError;

    fn from_str(s: &str) -> DeployResult<Self> {
        CertTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| DeployError::RemoteProtocol(format!("unknown certificate tag '{s}'")))
    }
}

/// Key and subject parameters for one system certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertSpec {
    pub tag: CertTag,
    pub key_algorithm: String,
    pub key_size: u32,
    pub key_type: String,
    pub nickname: String,
    pub subject_dn: String,
    pub token: String,
    /// Where step one writes the CSR.
    pub csr_path: PathBuf,
    /// Where step two reads the externally signed certificate.
    pub cert_path: Option<PathBuf>,
}

impl CertSpec {
    fn from_store(store: &ParameterStore, tag: CertTag, default_csr: PathBuf) -> DeployResult<Self> {
        Ok(Self {
            tag,
            key_algorithm: store.get(&tag.key("key_algorithm"))?.to_string(),
            key_size: store.get_parsed(&tag.key("key_size"))?,
            key_type: store.get(&tag.key("key_type"))?.to_string(),
            nickname: store.get(&tag.key("nickname"))?.to_string(),
            subject_dn: store.get(&tag.key("subject_dn"))?.to_string(),
            token: store.get(&tag.key("token"))?.to_string(),
            csr_path: store
                .get_non_empty(&tag.key("csr_path"))
                .map(PathBuf::from)
                .unwrap_or(default_csr),
            cert_path: store.get_non_empty(&tag.key("cert_path")).map(PathBuf::from),
        })
    }
}

/// Typed table of the certificates a subsystem deploys.
#[derive(Debug, Clone, Default)]
pub struct CertTable {
    specs: BTreeMap<CertTag, CertSpec>,
}

impl CertTable {
    /// Build entries for every certificate `subsystem` requires.
    ///
    /// `csr_dir` is the fallback location for CSRs when no explicit
    /// `pki_<tag>_csr_path` is configured.
    pub fn build(
        store: &ParameterStore,
        subsystem: Subsystem,
        csr_dir: &std::path::Path,
    ) -> DeployResult<Self> {
        let specs = CertTag::required_for(subsystem)
            .iter()
            .map(|&tag| {
                let spec = CertSpec::from_store(store, tag, csr_dir.join(format!("{tag}.csr")))?;
                Ok((tag, spec))
            })
            .collect::<DeployResult<_>>()?;
        Ok(Self { specs })
    }

    pub fn get(&self, tag: CertTag) -> Option<&CertSpec> {
        self.specs.get(&tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CertSpec> {
        self.specs.values()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IniDocument;
    use std::path::Path;

    fn store_with_certs(subsystem: Subsystem) -> ParameterStore {
        let mut text = String::from("[DEFAULT]\npki_instance_name = pki-tomcat\n");
        for tag in CertTag::ALL {
            text.push_str(&format!(
                "pki_{tag}_key_algorithm = SHA256withRSA\n\
                 pki_{tag}_key_size = 2048\n\
                 pki_{tag}_key_type = rsa\n\
                 pki_{tag}_nickname = {tag}Cert cert-%(pki_instance_name)s\n\
                 pki_{tag}_subject_dn = cn={tag}\n\
                 pki_{tag}_token = internal\n\
                 pki_{tag}_csr_path =\n"
            ));
        }
        text.push_str("[KRA]\npki_storage_cert_path = /tmp/storage.crt\n");
        let defaults = IniDocument::parse(&text, "test").unwrap();
        ParameterStore::from_documents(defaults, IniDocument::default(), subsystem, &[]).unwrap()
    }

    #[test]
    fn test_required_tags() {
        assert_eq!(CertTag::required_for(Subsystem::Tps).len(), 3);
        assert!(CertTag::required_for(Subsystem::Kra).contains(&CertTag::Transport));
        assert!(!CertTag::required_for(Subsystem::Ocsp).contains(&CertTag::CaSigning));
    }

    #[test]
    fn test_table_resolves_families() {
        let store = store_with_certs(Subsystem::Kra);
        let table = CertTable::build(&store, Subsystem::Kra, Path::new("/conf/kra")).unwrap();
        assert_eq!(table.len(), 5);
        assert!(table.get(CertTag::CaSigning).is_none());

        let storage = table.get(CertTag::Storage).unwrap();
        assert_eq!(storage.key_size, 2048);
        assert_eq!(storage.nickname, "storageCert cert-pki-tomcat");
        assert_eq!(storage.csr_path, PathBuf::from("/conf/kra/storage.csr"));
        assert_eq!(storage.cert_path, Some(PathBuf::from("/tmp/storage.crt")));
    }

    #[test]
    fn test_missing_family_member_is_fatal() {
        let defaults = IniDocument::parse("[DEFAULT]\npki_ssl_server_key_size = 2048\n", "t").unwrap();
        let store =
            ParameterStore::from_documents(defaults, IniDocument::default(), Subsystem::Tks, &[])
                .unwrap();
        let err = CertTable::build(&store, Subsystem::Tks, Path::new("/x")).unwrap_err();
        assert!(err.is_preflight());
    }

    #[test]
    fn test_tag_parse() {
        assert_eq!("audit_signing".parse::<CertTag>().unwrap(), CertTag::AuditSigning);
        assert!("bogus".parse::<CertTag>().is_err());
    }
}
