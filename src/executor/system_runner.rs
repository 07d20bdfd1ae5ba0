use super::{CommandOutput, CommandRunner, CommandSpec};
use crate::error::{ProvisionError, Result};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;

#[derive(Clone)]
pub struct SystemRunner {
    dry_run: bool,
}

impl SystemRunner {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        if self.dry_run {
            crate::ui::info(format!("Would run: {}", spec));
            return Ok(CommandOutput::success());
        }

        let mut cmd = tokio::process::Command::new(spec.program());
        cmd.args(spec.exposed_args());
        if let Some(dir) = spec.working_dir() {
            cmd.current_dir(dir);
        }
        for (key, value) in spec.env_vars() {
            cmd.env(key, value);
        }

        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(if spec.exposed_stdin().is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd.spawn().map_err(|e| {
            ProvisionError::ExternalTool(format!("Failed to start '{}': {}", spec.program(), e))
        })?;

        if let Some(input) = spec.exposed_stdin() {
            let mut stdin = child.stdin.take().ok_or_else(|| {
                ProvisionError::ExternalTool(format!(
                    "Failed to open stdin for '{}'",
                    spec.program()
                ))
            })?;
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        let result = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !result.is_success() {
            tracing::debug!("'{}' exited with {:?}", spec.program(), result.exit_code);
        }

        Ok(result)
    }
}
