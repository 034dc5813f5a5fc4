use async_trait::async_trait;
use parking_lot::Mutex;
use pkideploy::params::layout::names::NSS_DB_FILES;
use pkideploy::{CommandSpec, DeployResult, ProcessOutput, ProcessRunner};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

type Effect = Arc<dyn Fn(&CommandSpec) + Send + Sync>;

/// Fake [`ProcessRunner`] that records every command and answers from a
/// script.
///
/// Responses are queued per program name and consumed in order. Once a
/// program's queue is empty it succeeds with empty output, except
/// `selinuxenabled`, which reports SELinux as disabled unless scripted.
/// Side effects registered with [`on_run`](Self::on_run) stand in for
/// files a real tool would create.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<CommandSpec>>,
    scripted: Mutex<HashMap<String, VecDeque<ProcessOutput>>>,
    effects: Mutex<HashMap<String, Effect>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `output` as the next answer for `program`.
    pub fn respond(&self, program: &str, output: ProcessOutput) -> &Self {
        self.scripted
            .lock()
            .entry(program.to_string())
            .or_default()
            .push_back(output);
        self
    }

    /// Queue the same answer `times` times.
    pub fn respond_times(&self, program: &str, output: ProcessOutput, times: usize) -> &Self {
        for _ in 0..times {
            self.respond(program, output.clone());
        }
        self
    }

    /// Run `effect` on every call to `program`, before it is answered.
    pub fn on_run(
        &self,
        program: &str,
        effect: impl Fn(&CommandSpec) + Send + Sync + 'static,
    ) -> &Self {
        self.effects
            .lock()
            .insert(program.to_string(), Arc::new(effect));
        self
    }

    /// Make `certutil -N -d <dir>` leave the database files in `<dir>`.
    pub fn create_nss_databases(&self) -> &Self {
        self.on_run("certutil", |cmd| {
            if !cmd.args.iter().any(|a| a == "-N") {
                return;
            }
            let Some(dir) = cmd
                .args
                .iter()
                .position(|a| a == "-d")
                .and_then(|i| cmd.args.get(i + 1))
            else {
                return;
            };
            for file in NSS_DB_FILES {
                std::fs::write(Path::new(dir).join(file), "").expect("write NSS database file");
            }
        })
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .iter()
            .filter(|cmd| cmd.program == program)
            .cloned()
            .collect()
    }

    /// Programs in call order, each with its first argument.
    pub fn invocations(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(|cmd| match cmd.args.first() {
                Some(first) => format!("{} {first}", cmd.program),
                None => cmd.program.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl ProcessRunner for RecordingRunner {
    async fn run(&self, cmd: &CommandSpec) -> DeployResult<ProcessOutput> {
        self.calls.lock().push(cmd.clone());
        let effect = self.effects.lock().get(&cmd.program).cloned();
        if let Some(effect) = effect {
            effect(cmd);
        }
        let scripted = self
            .scripted
            .lock()
            .get_mut(&cmd.program)
            .and_then(VecDeque::pop_front);
        Ok(match scripted {
            Some(output) => output,
            None if cmd.program == "selinuxenabled" => ProcessOutput::failed(1, ""),
            None => ProcessOutput::ok(""),
        })
    }
}
