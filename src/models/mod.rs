pub mod credentials;
pub mod host;
pub mod plan;
pub mod step;

pub use credentials::{Credentials, DATABASE_HOST, DATABASE_PORT};
pub use host::{Arch, Distro, HostProfile, OsFamily};
pub use plan::{
    AgentSettings, Backends, FirewallPort, InstallPlan, PanelSettings, SessionDriver, Target,
    WebServer,
};
pub use step::{RunState, StepId, StepOutcome, StepResult};
