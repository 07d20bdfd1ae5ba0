//! Run sequencing.
//!
//! A run moves through `NotStarted → Profiling → Planning → Provisioning(step)
//! → Summarized → Done`. The first failing step ends it in `Failed`; nothing
//! already applied is rolled back.

use crate::config::Config;
use crate::error::{ProvisionError, Result, StepFailure};
use crate::executor::CommandRunner;
use crate::models::{HostProfile, RunState, StepId, StepOutcome, StepResult};
use crate::paths::HostPaths;
use crate::services::host;
use crate::services::prompt::{self, Prompter};
use crate::services::provisioner::{ProvisionContext, Provisioner, RunOutputs};
use crate::services::summary;
use crate::ui;

/// Executes provisioning steps against a context.
pub trait StepHandler {
    /// Whether `step` has anything to do for this plan.
    fn applies(&self, step: StepId, ctx: &ProvisionContext) -> bool;

    async fn run_step(&self, step: StepId, ctx: &mut ProvisionContext) -> Result<StepOutcome>;

    /// Exit code of the external command that made the last step fail.
    fn last_exit_code(&self) -> Option<i32> {
        None
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed {
        summary: String,
        outputs: RunOutputs,
    },
    Cancelled,
}

#[derive(Debug)]
pub struct Orchestrator {
    state: RunState,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            state: RunState::NotStarted,
        }
    }

    fn advance(&mut self, next: RunState) {
        if !self.state.can_transition_to(&next) {
            tracing::error!("Unexpected state change {:?} -> {:?}", self.state, next);
        }
        tracing::debug!("Run state: {:?}", next);
        self.state = next;
    }

    fn fail(&mut self, step: StepId, err: ProvisionError) -> StepFailure {
        tracing::debug!("Step {} failed: {}", step, err);
        self.advance(RunState::Failed {
            step,
            cause: err.to_string(),
        });
        StepFailure::new(step, err)
    }

    /// Runs every applicable provisioning step in order, stopping at the
    /// first failure.
    pub async fn provision<H: StepHandler>(
        &mut self,
        handler: &H,
        ctx: &mut ProvisionContext,
    ) -> std::result::Result<(), StepFailure> {
        let view: &ProvisionContext = ctx;
        let total = StepId::PROVISIONING
            .iter()
            .filter(|step| handler.applies(**step, view))
            .count();
        let mut index = 0;

        for step in StepId::PROVISIONING {
            if !handler.applies(step, ctx) {
                tracing::debug!("Skipping {}", step);
                ctx.outputs.results.push(StepResult {
                    step,
                    outcome: StepOutcome::Skipped,
                    exit_code: None,
                });
                continue;
            }

            index += 1;
            self.advance(RunState::Provisioning(step));
            ui::step(index, total, step.title());

            match handler.run_step(step, ctx).await {
                Ok(outcome) => {
                    ctx.outputs.results.push(StepResult {
                        step,
                        outcome,
                        exit_code: None,
                    });
                }
                Err(err) => {
                    ctx.outputs.results.push(StepResult {
                        step,
                        outcome: StepOutcome::Failed,
                        exit_code: handler.last_exit_code(),
                    });
                    return Err(self.fail(step, err));
                }
            }
        }

        Ok(())
    }
}

fn profile_host(config: &Config, machine: &str) -> Result<HostProfile> {
    if config.require_root {
        host::ensure_root()?;
    }
    host::detect_host(&HostPaths::new(&config.host_root), machine)
}

/// One complete installer run: detect the host, collect the plan, provision,
/// then print the summary.
pub async fn run_installer<R, P>(
    config: &Config,
    runner: R,
    prompter: &mut P,
    machine: &str,
) -> std::result::Result<RunOutcome, StepFailure>
where
    R: CommandRunner,
    P: Prompter,
{
    let mut orchestrator = Orchestrator::new();
    if config.dry_run {
        ui::warn(format!(
            "Dry run: no commands are executed, files go under {}",
            config.system_root.display()
        ));
    }

    orchestrator.advance(RunState::Profiling);
    ui::info(StepId::Profile.title());
    let profile =
        profile_host(config, machine).map_err(|err| orchestrator.fail(StepId::Profile, err))?;
    ui::info(format!(
        "{} {} on {}",
        profile.distro, profile.version, profile.arch
    ));

    orchestrator.advance(RunState::Planning);
    let decision = match prompt::collect_plan(prompter, &profile, config) {
        Ok(Some(decision)) => decision,
        Ok(None) => {
            orchestrator.advance(RunState::Cancelled);
            ui::warn("Installation cancelled, nothing was changed");
            return Ok(RunOutcome::Cancelled);
        }
        Err(err) => return Err(orchestrator.fail(StepId::Plan, err)),
    };

    let provisioner = Provisioner::new(config, runner, &profile)
        .map_err(|err| orchestrator.fail(StepId::Plan, err))?;
    let mut ctx = ProvisionContext::new(profile, decision.plan, decision.credentials);
    orchestrator.provision(&provisioner, &mut ctx).await?;

    ui::info(StepId::Summarize.title());
    let summary = summary::render(&ctx, config);
    orchestrator.advance(RunState::Summarized);
    orchestrator.advance(RunState::Done);

    Ok(RunOutcome::Completed {
        summary,
        outputs: ctx.outputs,
    })
}
