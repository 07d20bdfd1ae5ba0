pub mod database;
pub mod host;
pub mod orchestrator;
pub mod prompt;
pub mod provisioner;
pub mod release;
pub mod render;
pub mod secrets;
pub mod summary;

pub use orchestrator::{RunOutcome, run_installer};
pub use prompt::TerminalPrompter;
