//! Slot substitution over template files.

use crate::fs::{apply_ownership, record_for};
use crate::manifest::{EntryKind, ManifestRecord};
use crate::params::{Identity, SlotMap};
use pkideploy_shared::errors::{DeployError, DeployResult};
use std::io::Write;
use std::os::unix::fs::{MetadataExt, fchown};
use std::path::Path;
use tempfile::NamedTempFile;

/// Render `src` through `slots` into `dst`, then set owner and mode.
///
/// Lines are substituted independently; a value containing another slot's
/// token is written as-is.
pub fn copy_with_substitution(
    src: &Path,
    dst: &Path,
    slots: &SlotMap,
    identity: &Identity,
    perms: u32,
) -> DeployResult<ManifestRecord> {
    let text = std::fs::read_to_string(src).map_err(|e| {
        DeployError::config(format!("cannot read template {}: {e}", src.display()))
    })?;
    write_replacing(dst, &substitute(&text, slots), None)?;
    apply_ownership(dst, identity, EntryKind::File, perms)?;

    tracing::debug!(src = %src.display(), dst = %dst.display(), "Copied template with substitution");
    Ok(record_for(dst, EntryKind::File, identity, perms))
}

/// Substitute slots in an already-deployed file, keeping its mode and owner.
pub fn apply_in_place(path: &Path, slots: &SlotMap) -> DeployResult<()> {
    let text = std::fs::read_to_string(path).map_err(|e| DeployError::fs(path, e))?;
    let rendered = substitute(&text, slots);
    if rendered != text {
        let meta = std::fs::metadata(path).map_err(|e| DeployError::fs(path, e))?;
        write_replacing(path, &rendered, Some(&meta))?;
        tracing::debug!(path = %path.display(), "Applied slot substitution in place");
    }
    Ok(())
}

/// Write into a sibling temporary file and rename it over `dst`, so a
/// reader never sees a partially written file. `keep` carries the mode and
/// owner over from the file being replaced.
fn write_replacing(
    dst: &Path,
    contents: &str,
    keep: Option<&std::fs::Metadata>,
) -> DeployResult<()> {
    let dir = dst
        .parent()
        .ok_or_else(|| DeployError::fs(dst, "no parent directory"))?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| DeployError::fs(dir, e))?;
    tmp.write_all(contents.as_bytes())
        .map_err(|e| DeployError::fs(tmp.path(), e))?;

    if let Some(meta) = keep {
        let file = tmp.as_file();
        file.set_permissions(meta.permissions())
            .map_err(|e| DeployError::fs(dst, format!("chmod: {e}")))?;
        fchown(file, Some(meta.uid()), Some(meta.gid()))
            .map_err(|e| DeployError::fs(dst, format!("chown: {e}")))?;
    }

    tmp.persist(dst).map_err(|e| DeployError::fs(dst, e.error))?;
    Ok(())
}

fn substitute(text: &str, slots: &SlotMap) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        out.push_str(&slots.apply(line));
    }
    out
}
