mod config;
mod error;
mod executor;
mod models;
mod os;
mod paths;
mod services;
mod ui;

use crate::config::Config;
use crate::executor::SystemRunner;
use crate::services::{RunOutcome, TerminalPrompter, run_installer};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EXIT_INTERRUPTED: i32 = 130;
const EXIT_BAD_CONFIG: u8 = 2;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "panel_installer=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Ctrl-C ends the run where it stands. Prompts block the main thread, so
/// the handler lives on its own task.
fn trap_interrupt() {
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            ui::error("Interrupted, exiting without cleanup");
            std::process::exit(EXIT_INTERRUPTED);
        }
    });
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    trap_interrupt();

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            ui::error(format!("Invalid configuration: {:#}", err));
            return ExitCode::from(EXIT_BAD_CONFIG);
        }
    };
    tracing::debug!("Loaded config: {:?}", config);

    let runner = SystemRunner::new(config.dry_run);
    let mut prompter = TerminalPrompter;
    match run_installer(&config, runner, &mut prompter, std::env::consts::ARCH).await {
        Ok(RunOutcome::Completed { summary, outputs }) => {
            tracing::debug!("Step results: {:?}", outputs.results);
            ui::block(&summary);
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Cancelled) => ExitCode::SUCCESS,
        Err(failure) => {
            ui::error(failure.to_string());
            ExitCode::from(failure.exit_code())
        }
    }
}
