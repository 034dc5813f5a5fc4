use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    File { contents: Vec<u8> },
    Symlink { target: PathBuf },
}

/// Every node under a root, keyed by its path relative to that root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsSnapshot {
    nodes: BTreeMap<PathBuf, NodeKind>,
}

impl FsSnapshot {
    pub fn capture(root: &Path) -> Self {
        let mut nodes = BTreeMap::new();
        for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
            let entry = entry.expect("walk snapshot root");
            let relative = entry
                .path()
                .strip_prefix(root)
                .expect("entry under root")
                .to_path_buf();
            let file_type = entry.file_type();
            let kind = if file_type.is_symlink() {
                NodeKind::Symlink {
                    target: fs::read_link(entry.path()).expect("read link"),
                }
            } else if file_type.is_dir() {
                NodeKind::Directory
            } else {
                NodeKind::File {
                    contents: fs::read(entry.path()).expect("read file"),
                }
            };
            nodes.insert(relative, kind);
        }
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, relative: impl AsRef<Path>) -> bool {
        self.nodes.contains_key(relative.as_ref())
    }

    /// Paths present here but not in `earlier`.
    pub fn added_since(&self, earlier: &FsSnapshot) -> Vec<PathBuf> {
        self.nodes
            .keys()
            .filter(|path| !earlier.nodes.contains_key(*path))
            .cloned()
            .collect()
    }

    /// Paths present in `earlier` but gone or changed here.
    pub fn removed_or_changed_since(&self, earlier: &FsSnapshot) -> Vec<PathBuf> {
        earlier
            .nodes
            .iter()
            .filter(|(path, kind)| self.nodes.get(*path) != Some(*kind))
            .map(|(path, _)| path.clone())
            .collect()
    }
}
