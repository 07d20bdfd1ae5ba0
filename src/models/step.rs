use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepId {
    Profile,
    Plan,
    UpdateBaseline,
    InstallDependencies,
    BootstrapDatabase,
    FetchArtifacts,
    RenderEnvironment,
    SetupPanel,
    ConfigureWebServer,
    RequestCertificate,
    InstallServices,
    ConfigureFirewall,
    Summarize,
}

impl StepId {
    /// Mutating steps, in execution order.
    pub const PROVISIONING: [StepId; 10] = [
        StepId::UpdateBaseline,
        StepId::InstallDependencies,
        StepId::BootstrapDatabase,
        StepId::FetchArtifacts,
        StepId::RenderEnvironment,
        StepId::SetupPanel,
        StepId::ConfigureWebServer,
        StepId::RequestCertificate,
        StepId::InstallServices,
        StepId::ConfigureFirewall,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StepId::Profile => "profile",
            StepId::Plan => "plan",
            StepId::UpdateBaseline => "update-baseline",
            StepId::InstallDependencies => "install-dependencies",
            StepId::BootstrapDatabase => "bootstrap-database",
            StepId::FetchArtifacts => "fetch-artifacts",
            StepId::RenderEnvironment => "render-environment",
            StepId::SetupPanel => "setup-panel",
            StepId::ConfigureWebServer => "configure-web-server",
            StepId::RequestCertificate => "request-certificate",
            StepId::InstallServices => "install-services",
            StepId::ConfigureFirewall => "configure-firewall",
            StepId::Summarize => "summarize",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            StepId::Profile => "Detecting host",
            StepId::Plan => "Collecting installation choices",
            StepId::UpdateBaseline => "Updating system packages",
            StepId::InstallDependencies => "Installing dependencies",
            StepId::BootstrapDatabase => "Creating database and user",
            StepId::FetchArtifacts => "Downloading release artifacts",
            StepId::RenderEnvironment => "Writing panel environment file",
            StepId::SetupPanel => "Running panel setup commands",
            StepId::ConfigureWebServer => "Configuring web server",
            StepId::RequestCertificate => "Requesting TLS certificate",
            StepId::InstallServices => "Installing service units",
            StepId::ConfigureFirewall => "Configuring firewall",
            StepId::Summarize => "Summarizing",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub step: StepId,
    pub outcome: StepOutcome,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Profiling,
    Planning,
    Provisioning(StepId),
    Summarized,
    Done,
    Cancelled,
    Failed { step: StepId, cause: String },
}

impl RunState {
    pub fn can_transition_to(&self, next: &RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (NotStarted, Profiling) => true,
            (Profiling, Planning) => true,
            (Planning, Provisioning(_)) | (Planning, Cancelled) => true,
            (Provisioning(_), Provisioning(_)) | (Provisioning(_), Summarized) => true,
            (Summarized, Done) => true,
            (Profiling | Planning | Provisioning(_), Failed { .. }) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_path_is_allowed() {
        let path = [
            RunState::NotStarted,
            RunState::Profiling,
            RunState::Planning,
            RunState::Provisioning(StepId::UpdateBaseline),
            RunState::Provisioning(StepId::InstallDependencies),
            RunState::Summarized,
            RunState::Done,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(&pair[1]), "{:?}", pair);
        }
    }

    #[test]
    fn terminal_states_do_not_move() {
        let failed = RunState::Failed {
            step: StepId::SetupPanel,
            cause: "exit 1".to_string(),
        };
        assert!(!failed.can_transition_to(&RunState::Provisioning(StepId::InstallServices)));
        assert!(!RunState::Done.can_transition_to(&RunState::Profiling));
        assert!(!RunState::NotStarted.can_transition_to(&RunState::Provisioning(
            StepId::UpdateBaseline
        )));
    }

    #[test]
    fn summarized_cannot_fail() {
        let failed = RunState::Failed {
            step: StepId::Summarize,
            cause: String::new(),
        };
        assert!(!RunState::Summarized.can_transition_to(&failed));
    }
}
