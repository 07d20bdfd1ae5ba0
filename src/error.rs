use crate::models::StepId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Dependency installation failed: {0}")]
    DependencyInstall(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Artifact fetch failed: {0}")]
    ArtifactFetch(String),

    #[error("External tool failed: {0}")]
    ExternalTool(String),

    #[error("Config render failed: {0}")]
    ConfigRender(String),

    #[error("Certificate request failed: {0}")]
    Certificate(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProvisionError {
    pub fn exit_code(&self) -> u8 {
        match self {
            ProvisionError::Io(_) | ProvisionError::Prompt(_) => 1,
            ProvisionError::Precondition(_) => 2,
            ProvisionError::DependencyInstall(_) => 3,
            ProvisionError::Credential(_) => 4,
            ProvisionError::ArtifactFetch(_) => 5,
            ProvisionError::ExternalTool(_) => 6,
            ProvisionError::ConfigRender(_) => 7,
            // Never aborts a run; reported as a warning instead.
            ProvisionError::Certificate(_) => 0,
        }
    }
}

impl From<dialoguer::Error> for ProvisionError {
    fn from(err: dialoguer::Error) -> Self {
        ProvisionError::Prompt(err.to_string())
    }
}

/// The error that ends a run: the failing step and what went wrong in it.
#[derive(Error, Debug)]
#[error("Step '{step}' failed: {source}")]
pub struct StepFailure {
    pub step: StepId,
    #[source]
    pub source: ProvisionError,
}

impl StepFailure {
    pub fn new(step: StepId, source: ProvisionError) -> Self {
        Self { step, source }
    }

    pub fn exit_code(&self) -> u8 {
        self.source.exit_code()
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_per_fatal_class() {
        let errors = [
            ProvisionError::Precondition(String::new()),
            ProvisionError::DependencyInstall(String::new()),
            ProvisionError::Credential(String::new()),
            ProvisionError::ArtifactFetch(String::new()),
            ProvisionError::ExternalTool(String::new()),
            ProvisionError::ConfigRender(String::new()),
        ];
        let mut codes: Vec<u8> = errors.iter().map(ProvisionError::exit_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(codes.iter().all(|code| *code != 0));
    }

    #[test]
    fn step_failure_names_the_step() {
        let failure = StepFailure::new(
            StepId::BootstrapDatabase,
            ProvisionError::Credential("access denied".to_string()),
        );
        let message = failure.to_string();
        assert!(message.contains("bootstrap-database"));
        assert!(message.contains("access denied"));
        assert_eq!(failure.exit_code(), 4);
    }
}
