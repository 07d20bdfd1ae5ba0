mod system_runner;

#[cfg(test)]
pub mod recording;

pub use system_runner::SystemRunner;

use crate::error::Result;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::path::{Path, PathBuf};

const MASK: &str = "********";

#[derive(Debug)]
enum Arg {
    Plain(String),
    Secret(SecretString),
}

impl Arg {
    fn expose(&self) -> &str {
        match self {
            Arg::Plain(value) => value,
            Arg::Secret(value) => value.expose_secret(),
        }
    }
}

/// One invocation of an external program.
///
/// Secret arguments and stdin are kept wrapped so the command line can be
/// logged and shown in errors without leaking them.
#[derive(Debug)]
pub struct CommandSpec {
    program: String,
    args: Vec<Arg>,
    env: Vec<(String, String)>,
    current_dir: Option<PathBuf>,
    stdin: Option<SecretString>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
            stdin: None,
        }
    }

    /// `sh -c <script>`, for pipelines the source tools are documented with.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(Arg::Plain(arg.into()));
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args
            .extend(args.into_iter().map(|arg| Arg::Plain(arg.into())));
        self
    }

    /// `prefix` is shown as-is, the value is masked.
    pub fn secret_arg(mut self, prefix: &str, value: &SecretString) -> Self {
        let combined = format!("{}{}", prefix, value.expose_secret());
        self.args.push(Arg::Secret(SecretString::from(combined)));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn stdin(mut self, input: SecretString) -> Self {
        self.stdin = Some(input);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn exposed_args(&self) -> Vec<&str> {
        self.args.iter().map(Arg::expose).collect()
    }

    pub fn exposed_stdin(&self) -> Option<&str> {
        self.stdin.as_ref().map(|input| input.expose_secret())
    }

    pub fn env_vars(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{}={} ", key, value)?;
        }
        f.write_str(&self.program)?;
        for arg in &self.args {
            match arg {
                Arg::Plain(value) => write!(f, " {}", value)?,
                Arg::Secret(_) => write!(f, " {}", MASK)?,
            }
        }
        if self.stdin.is_some() {
            write!(f, " < {}", MASK)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success() -> Self {
        Self {
            exit_code: Some(0),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Last lines of stderr, falling back to stdout, for error messages.
    pub fn tail(&self, lines: usize) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let collected: Vec<&str> = source.trim_end().lines().collect();
        let start = collected.len().saturating_sub(lines);
        collected[start..].join("\n")
    }
}

/// Runs external programs. `Err` only when the program could not be run at
/// all; a non-zero exit is reported through [`CommandOutput::exit_code`].
pub trait CommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}
