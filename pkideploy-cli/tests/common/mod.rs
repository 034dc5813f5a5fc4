#![allow(dead_code)]

use assert_cmd::Command;
use pkideploy_test_utils::DeployRoot;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

pub struct TestContext {
    pub cmd: Command,
    pub root: DeployRoot,
    logs: TempDir,
}

impl TestContext {
    /// Fresh command sharing this context's deployment root.
    pub fn new_cmd(&self) -> Command {
        command(&self.root, self.logs.path())
    }

    pub fn log_dir(&self) -> &Path {
        self.logs.path()
    }

    /// Log files written so far, by file name.
    pub fn log_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.logs.path())
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn user_config(&self, name: &str, text: &str) -> PathBuf {
        self.root.user_config(name, text)
    }
}

/// Command pointed at `root`'s defaults, logging into `logs`.
fn command(root: &DeployRoot, logs: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pkideploy"));
    cmd.timeout(Duration::from_secs(30));
    cmd.env_remove("RUST_LOG");
    cmd.arg("--defaults").arg(root.default_config());
    cmd.arg("--slots").arg(root.slots_config());
    cmd.arg("--log-dir").arg(logs);
    cmd
}

pub fn pkideploy() -> TestContext {
    let root = DeployRoot::new();
    let logs = TempDir::new().expect("create log dir");
    let cmd = command(&root, logs.path());
    TestContext { cmd, root, logs }
}
