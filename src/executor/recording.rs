use super::{CommandOutput, CommandRunner, CommandSpec};
use crate::error::Result;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct Recorded {
    /// Masked command line.
    pub line: String,
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl Recorded {
    pub fn exposed_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Records every command instead of running it. Commands whose exposed line
/// contains a registered pattern report the configured exit code.
#[derive(Clone, Default)]
pub struct RecordingRunner {
    recorded: Arc<Mutex<Vec<Recorded>>>,
    failures: Arc<Mutex<Vec<(String, i32)>>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, pattern: &str, exit_code: i32) {
        self.failures
            .lock()
            .unwrap()
            .push((pattern.to_string(), exit_code));
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.recorded.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.recorded().iter().map(Recorded::exposed_line).collect()
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.lines().iter().any(|line| line.contains(pattern))
    }
}

impl CommandRunner for RecordingRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let recorded = Recorded {
            line: spec.to_string(),
            program: spec.program().to_string(),
            args: spec.exposed_args().iter().map(|a| a.to_string()).collect(),
            stdin: spec.exposed_stdin().map(str::to_string),
        };
        let exposed = recorded.exposed_line();
        self.recorded.lock().unwrap().push(recorded);

        let failures = self.failures.lock().unwrap();
        if let Some((_, code)) = failures
            .iter()
            .find(|(pattern, _)| exposed.contains(pattern.as_str()))
        {
            return Ok(CommandOutput {
                exit_code: Some(*code),
                stdout: String::new(),
                stderr: format!("simulated failure of {}", spec.program()),
            });
        }
        Ok(CommandOutput::success())
    }
}
