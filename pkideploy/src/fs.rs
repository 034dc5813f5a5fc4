//! Filesystem mutations that leave a trail in the manifest.
//!
//! Every object created through [`FsRecorder`] is owned by the deployment
//! identity, gets its permission bits set explicitly and is appended to the
//! ledger. Objects that already existed are left alone and not recorded, so
//! a destroy only removes what this run created.

use crate::manifest::{EntryKind, ManifestLedger, ManifestRecord};
use crate::params::{Identity, SlotMap};
use crate::template;
use pkideploy_shared::constants::permissions;
use pkideploy_shared::errors::{DeployError, DeployResult};
use std::fs;
use std::os::unix::fs::{PermissionsExt, chown, lchown, symlink};
use std::path::Path;
use walkdir::WalkDir;

pub struct FsRecorder<'a> {
    identity: &'a Identity,
    ledger: &'a mut ManifestLedger,
}

impl<'a> FsRecorder<'a> {
    pub fn new(identity: &'a Identity, ledger: &'a mut ManifestLedger) -> Self {
        Self { identity, ledger }
    }

    /// Create `path` and any missing ancestors, recording each one created.
    pub fn create_dir(&mut self, path: &Path, perms: u32) -> DeployResult<()> {
        let mut missing = Vec::new();
        let mut cursor = Some(path);
        while let Some(dir) = cursor {
            if dir.exists() {
                break;
            }
            missing.push(dir.to_path_buf());
            cursor = dir.parent();
        }
        if missing.is_empty() {
            tracing::debug!(path = %path.display(), "Directory already exists");
            return Ok(());
        }

        for dir in missing.into_iter().rev() {
            fs::create_dir(&dir).map_err(|e| DeployError::fs(&dir, e))?;
            self.finish(&dir, EntryKind::Directory, perms)?;
        }
        Ok(())
    }

    /// Copy a single file without substitution.
    pub fn copy_file(
        &mut self,
        src: &Path,
        dst: &Path,
        perms: u32,
        overwrite: bool,
    ) -> DeployResult<()> {
        let existed = dst.exists();
        if existed && !overwrite {
            tracing::debug!(path = %dst.display(), "Keeping existing file");
            return Ok(());
        }
        if let Some(parent) = dst.parent() {
            self.create_dir(parent, permissions::DIR)?;
        }
        fs::copy(src, dst).map_err(|e| DeployError::fs(dst, format!("copy from {}: {e}", src.display())))?;
        self.settle(dst, EntryKind::File, perms, existed)
    }

    /// Copy a directory tree, recreating symlinks as symlinks.
    pub fn copy_tree(&mut self, src: &Path, dst: &Path) -> DeployResult<()> {
        if !src.is_dir() {
            return Err(DeployError::config(format!(
                "template directory {} does not exist",
                src.display()
            )));
        }

        for entry in WalkDir::new(src).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| DeployError::fs(src, e))?;
            let relative = entry
                .path()
                .strip_prefix(src)
                .map_err(|e| DeployError::Internal(e.to_string()))?;
            let target = if relative.as_os_str().is_empty() {
                dst.to_path_buf()
            } else {
                dst.join(relative)
            };
            let file_type = entry.file_type();

            if file_type.is_dir() {
                self.create_dir(&target, permissions::DIR)?;
            } else if file_type.is_symlink() {
                let link_target =
                    fs::read_link(entry.path()).map_err(|e| DeployError::fs(entry.path(), e))?;
                self.symlink(&link_target, &target)?;
            } else {
                self.copy_file(entry.path(), &target, permissions::FILE, false)?;
            }
        }
        Ok(())
    }

    pub fn symlink(&mut self, target: &Path, link: &Path) -> DeployResult<()> {
        if link.symlink_metadata().is_ok() {
            tracing::debug!(link = %link.display(), "Link already exists");
            return Ok(());
        }
        if let Some(parent) = link.parent() {
            self.create_dir(parent, permissions::DIR)?;
        }
        symlink(target, link).map_err(|e| DeployError::fs(link, e))?;
        self.finish(link, EntryKind::Symlink, permissions::SYMLINK)
    }

    pub fn write_file(&mut self, path: &Path, contents: &str, perms: u32) -> DeployResult<()> {
        let existed = path.exists();
        if let Some(parent) = path.parent() {
            self.create_dir(parent, permissions::DIR)?;
        }
        fs::write(path, contents).map_err(|e| DeployError::fs(path, e))?;
        self.settle(path, EntryKind::File, perms, existed)
    }

    /// Copy a template through the slot map.
    pub fn copy_with_substitution(
        &mut self,
        src: &Path,
        dst: &Path,
        slots: &SlotMap,
        perms: u32,
        overwrite: bool,
    ) -> DeployResult<()> {
        let existed = dst.exists();
        if existed && !overwrite {
            tracing::debug!(path = %dst.display(), "Keeping existing file");
            return Ok(());
        }
        if let Some(parent) = dst.parent() {
            self.create_dir(parent, permissions::DIR)?;
        }
        let record = template::copy_with_substitution(src, dst, slots, self.identity, perms)?;
        if !existed {
            self.ledger.append(record);
        }
        Ok(())
    }

    /// Record a file some external tool created, taking ownership of it.
    pub fn adopt(&mut self, path: &Path, perms: u32) -> DeployResult<()> {
        if !path.exists() {
            return Err(DeployError::fs(path, "expected file was not created"));
        }
        self.finish(path, EntryKind::File, perms)
    }

    fn settle(&mut self, path: &Path, kind: EntryKind, perms: u32, existed: bool) -> DeployResult<()> {
        if existed {
            apply_ownership(path, self.identity, kind, perms)
        } else {
            self.finish(path, kind, perms)
        }
    }

    fn finish(&mut self, path: &Path, kind: EntryKind, perms: u32) -> DeployResult<()> {
        apply_ownership(path, self.identity, kind, perms)?;
        self.ledger.append(record_for(path, kind, self.identity, perms));
        Ok(())
    }
}

pub fn record_for(path: &Path, kind: EntryKind, identity: &Identity, perms: u32) -> ManifestRecord {
    ManifestRecord {
        name: path.to_path_buf(),
        kind,
        user: identity.user.clone(),
        group: identity.group.clone(),
        uid: identity.uid,
        gid: identity.gid,
        permissions: perms,
        acls: String::new(),
    }
}

/// Set owner and mode. Symlinks only get their owner changed.
pub fn apply_ownership(
    path: &Path,
    identity: &Identity,
    kind: EntryKind,
    perms: u32,
) -> DeployResult<()> {
    match kind {
        EntryKind::Symlink => lchown(path, Some(identity.uid), Some(identity.gid))
            .map_err(|e| DeployError::fs(path, format!("lchown: {e}"))),
        EntryKind::Directory | EntryKind::File => {
            chown(path, Some(identity.uid), Some(identity.gid))
                .map_err(|e| DeployError::fs(path, format!("chown: {e}")))?;
            fs::set_permissions(path, fs::Permissions::from_mode(perms))
                .map_err(|e| DeployError::fs(path, format!("chmod: {e}")))
        }
    }
}

/// Undo one manifest record. Directories are only removed when empty.
///
/// Returns whether something was removed.
pub fn remove_recorded(record: &ManifestRecord) -> DeployResult<bool> {
    let path = &record.name;
    let Ok(meta) = path.symlink_metadata() else {
        return Ok(false);
    };

    if meta.is_dir() && record.kind == EntryKind::Directory {
        return remove_empty_dir(path);
    }
    fs::remove_file(path).map_err(|e| DeployError::fs(path, e))?;
    Ok(true)
}

/// Remove `path` if it is an empty directory. Returns whether it was removed.
pub fn remove_empty_dir(path: &Path) -> DeployResult<bool> {
    if !path.is_dir() {
        return Ok(false);
    }
    let empty = fs::read_dir(path)
        .map_err(|e| DeployError::fs(path, e))?
        .next()
        .is_none();
    if !empty {
        tracing::debug!(path = %path.display(), "Leaving non-empty directory");
        return Ok(false);
    }
    fs::remove_dir(path).map_err(|e| DeployError::fs(path, e))?;
    Ok(true)
}

/// Remove a file, symlink or whole tree if present.
pub fn remove_path(path: &Path) -> DeployResult<()> {
    let Ok(meta) = path.symlink_metadata() else {
        return Ok(());
    };
    if meta.is_dir() {
        fs::remove_dir_all(path).map_err(|e| DeployError::fs(path, e))?;
    } else {
        fs::remove_file(path).map_err(|e| DeployError::fs(path, e))?;
    }
    tracing::debug!(path = %path.display(), "Removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::MetadataExt;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Identity) {
        (TempDir::new().unwrap(), Identity::current().unwrap())
    }

    #[test]
    fn test_create_dir_records_created_ancestors_only() {
        let (dir, identity) = setup();
        let mut ledger = ManifestLedger::new();
        let target = dir.path().join("a/b/c");

        FsRecorder::new(&identity, &mut ledger)
            .create_dir(&target, permissions::DIR)
            .unwrap();

        let names: Vec<_> = ledger.records().iter().map(|r| r.name.clone()).collect();
        assert_eq!(
            names,
            vec![dir.path().join("a"), dir.path().join("a/b"), target.clone()]
        );
        assert_eq!(
            fs::metadata(&target).unwrap().mode() & 0o7777,
            permissions::DIR
        );

        // Second call is a no-op
        FsRecorder::new(&identity, &mut ledger)
            .create_dir(&target, permissions::DIR)
            .unwrap();
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn test_copy_tree_preserves_symlinks() {
        let (dir, identity) = setup();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("WEB-INF")).unwrap();
        fs::write(src.join("WEB-INF/web.xml"), "<web/>").unwrap();
        symlink("WEB-INF/web.xml", src.join("link.xml")).unwrap();

        let mut ledger = ManifestLedger::new();
        let dst = dir.path().join("dst");
        FsRecorder::new(&identity, &mut ledger)
            .copy_tree(&src, &dst)
            .unwrap();

        assert_eq!(fs::read_to_string(dst.join("WEB-INF/web.xml")).unwrap(), "<web/>");
        assert!(dst.join("link.xml").symlink_metadata().unwrap().file_type().is_symlink());
        assert!(ledger.records().iter().any(|r| r.kind == EntryKind::Symlink));
        assert_eq!(ledger.len(), 4);
    }

    #[test]
    fn test_existing_file_not_recorded() {
        let (dir, identity) = setup();
        let src = dir.path().join("src.txt");
        let dst = dir.path().join("dst.txt");
        fs::write(&src, "new").unwrap();
        fs::write(&dst, "old").unwrap();

        let mut ledger = ManifestLedger::new();
        let mut recorder = FsRecorder::new(&identity, &mut ledger);
        recorder.copy_file(&src, &dst, permissions::FILE, false).unwrap();
        assert_eq!(fs::read_to_string(&dst).unwrap(), "old");
        recorder.copy_file(&src, &dst, permissions::FILE, true).unwrap();
        assert_eq!(fs::read_to_string(&dst).unwrap(), "new");
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_remove_recorded_keeps_non_empty_dirs() {
        let (dir, identity) = setup();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("stray"), "x").unwrap();

        let record = record_for(&sub, EntryKind::Directory, &identity, permissions::DIR);
        assert!(!remove_recorded(&record).unwrap());
        assert!(sub.exists());

        fs::remove_file(sub.join("stray")).unwrap();
        assert!(remove_recorded(&record).unwrap());
        assert!(!sub.exists());
        assert!(!remove_recorded(&record).unwrap());
    }
}
