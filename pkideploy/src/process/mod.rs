//! External process boundary.
//!
//! Stages never spawn processes directly; they go through a
//! [`ProcessRunner`] so tests can substitute a recording fake.

pub mod tools;

use async_trait::async_trait;
use pkideploy_shared::constants::secrets;
use pkideploy_shared::errors::{DeployError, DeployResult};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;

/// A command line plus optional stdin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
    /// Argument positions that must never be logged.
    secret_args: Vec<usize>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append an argument that is masked in logs.
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.secret_args.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Command line suitable for logs.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        for (i, arg) in self.args.iter().enumerate() {
            if self.secret_args.contains(&i) {
                parts.push(secrets::MASK.to_string());
            } else {
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run to completion. A non-zero exit is not an error at this level.
    async fn run(&self, cmd: &CommandSpec) -> DeployResult<ProcessOutput>;
}

/// Run and turn a non-zero exit into [`DeployError::Subprocess`].
pub async fn run_checked(
    runner: &dyn ProcessRunner,
    cmd: &CommandSpec,
) -> DeployResult<ProcessOutput> {
    let output = runner.run(cmd).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(DeployError::Subprocess {
            program: cmd.program.clone(),
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        })
    }
}

/// Runs real processes with tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, cmd: &CommandSpec) -> DeployResult<ProcessOutput> {
        tracing::debug!(command = %cmd.display(), "Executing");

        let mut child = tokio::process::Command::new(&cmd.program)
            .args(&cmd.args)
            .stdin(if cmd.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DeployError::Subprocess {
                program: cmd.program.clone(),
                code: None,
                stderr: format!("failed to start: {e}"),
            })?;

        if let (Some(input), Some(mut stdin)) = (&cmd.stdin, child.stdin.take()) {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|e| DeployError::Subprocess {
                    program: cmd.program.clone(),
                    code: None,
                    stderr: format!("failed to write stdin: {e}"),
                })?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| DeployError::Subprocess {
                program: cmd.program.clone(),
                code: None,
                stderr: e.to_string(),
            })?;

        let result = ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(program = %cmd.program, code = ?result.code, "Process exited");
        Ok(result)
    }
}
