//! Ledger of every filesystem object a spawn creates.
//!
//! The ledger is persisted as headerless CSV with the column order
//! `name,type,user,group,uid,gid,permissions,acls`. A later destroy run
//! loads it to undo exactly what was created.

use pkideploy_shared::errors::{DeployError, DeployResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntryKind::Directory => "directory",
            EntryKind::File => "file",
            EntryKind::Symlink => "symlink",
        })
    }
}

/// One created filesystem object. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub name: PathBuf,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub user: String,
    pub group: String,
    pub uid: u32,
    pub gid: u32,
    /// Mode bits, written in decimal.
    pub permissions: u32,
    pub acls: String,
}

/// Append-only, insertion-ordered record list.
#[derive(Debug, Clone, Default)]
pub struct ManifestLedger {
    records: Vec<ManifestRecord>,
}

impl ManifestLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: ManifestRecord) {
        tracing::trace!(path = %record.name.display(), kind = %record.kind, "Recorded");
        self.records.push(record);
    }

    /// Records from an earlier run go first.
    pub fn prepend_existing(&mut self, existing: Vec<ManifestRecord>) {
        let mut merged = existing;
        merged.append(&mut self.records);
        self.records = merged;
    }

    pub fn records(&self) -> &[ManifestRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write every record, in insertion order, to `path`.
    pub fn flush(&self, path: &Path) -> DeployResult<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)
            .map_err(|e| DeployError::fs(path, e))?;
        for record in &self.records {
            writer
                .serialize(record)
                .map_err(|e| DeployError::fs(path, e))?;
        }
        writer.flush().map_err(|e| DeployError::fs(path, e))?;

        tracing::info!(path = %path.display(), records = self.records.len(), "Wrote installation manifest");
        Ok(())
    }

    pub fn load(path: &Path) -> DeployResult<Vec<ManifestRecord>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .map_err(|e| DeployError::fs(path, e))?;
        reader
            .deserialize()
            .collect::<Result<Vec<ManifestRecord>, _>>()
            .map_err(|e| DeployError::fs(path, format!("malformed manifest: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(name: &str, kind: EntryKind, permissions: u32) -> ManifestRecord {
        ManifestRecord {
            name: PathBuf::from(name),
            kind,
            user: "pkiuser".into(),
            group: "pkiuser".into(),
            uid: 17,
            gid: 17,
            permissions,
            acls: String::new(),
        }
    }

    #[test]
    fn test_flush_writes_columns_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest");

        let mut ledger = ManifestLedger::new();
        ledger.append(record("/var/lib/pki/pki-tomcat", EntryKind::Directory, 0o770));
        ledger.flush(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text.trim_end(),
            "/var/lib/pki/pki-tomcat,directory,pkiuser,pkiuser,17,17,504,"
        );
    }

    #[test]
    fn test_load_preserves_order_and_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest");

        let originals = vec![
            record("/a", EntryKind::Directory, 0o770),
            record("/a/b, with comma", EntryKind::File, 0o660),
            record("/a/link", EntryKind::Symlink, 0o777),
        ];
        let mut ledger = ManifestLedger::new();
        for r in &originals {
            ledger.append(r.clone());
        }
        ledger.flush(&path).unwrap();

        assert_eq!(ManifestLedger::load(&path).unwrap(), originals);
    }

    #[test]
    fn test_prepend_existing() {
        let mut ledger = ManifestLedger::new();
        ledger.append(record("/new", EntryKind::File, 0o660));
        ledger.prepend_existing(vec![record("/old", EntryKind::File, 0o660)]);
        let names: Vec<_> = ledger.records().iter().map(|r| r.name.clone()).collect();
        assert_eq!(names, vec![PathBuf::from("/old"), PathBuf::from("/new")]);
    }

    #[test]
    fn test_malformed_manifest_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest");
        std::fs::write(&path, "/a,socket,u,g,1,1,420,\n").unwrap();
        assert!(ManifestLedger::load(&path).is_err());
    }
}
