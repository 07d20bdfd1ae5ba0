//! Host-mutating steps.
//!
//! [`Provisioner`] turns each provisioning [`StepId`] into commands for the
//! selected [`OsAdapter`] and files under the configured system root. Which
//! steps run, and in what order, is decided by the orchestrator.

use crate::config::Config;
use crate::error::{ProvisionError, Result};
use crate::executor::{CommandOutput, CommandRunner, CommandSpec};
use crate::models::{
    Credentials, DATABASE_HOST, DATABASE_PORT, HostProfile, InstallPlan, PanelSettings, StepId,
    StepOutcome, StepResult, WebServer,
};
use crate::os::{self, OsAdapter, RunAs};
use crate::paths::{HostPaths, WINGS_BINARY, WINGS_CONFIG_DIR};
use crate::services::database;
use crate::services::orchestrator::StepHandler;
use crate::services::release::ReleaseService;
use crate::services::render::{Template, TemplateRenderer};
use crate::ui;
use secrecy::ExposeSecret;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tera::Context;

const QUEUE_WORKER_UNIT: &str = "pteroq.service";
const AGENT_UNIT: &str = "wings.service";
const SCHEDULER_CRON: &str = "pterodactyl";
const OUTPUT_TAIL_LINES: usize = 20;
const ENV_FILE_MODE: u32 = 0o640;
const PRIVATE_FILE_MODE: u32 = 0o600;
const APP_KEY_VAR: &str = "APP_KEY";
const HASHIDS_SALT_VAR: &str = "HASHIDS_SALT";

/// A certificate request and how it ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateOutcome {
    pub domain: String,
    pub issued: bool,
    /// Command to run by hand when issuance failed.
    pub manual_command: Option<String>,
}

/// Values produced while provisioning, read by later steps and the summary.
#[derive(Debug, Default)]
pub struct RunOutputs {
    pub panel_version: Option<String>,
    pub agent_version: Option<String>,
    pub env_backup: Option<PathBuf>,
    /// Files and directories written, in order.
    pub artifacts: Vec<PathBuf>,
    pub certificates: Vec<CertificateOutcome>,
    pub results: Vec<StepResult>,
}

/// Everything a step can see. Profile, plan and credentials are fixed when
/// the context is built.
#[derive(Debug)]
pub struct ProvisionContext {
    profile: HostProfile,
    plan: InstallPlan,
    credentials: Option<Credentials>,
    pub outputs: RunOutputs,
}

impl ProvisionContext {
    pub fn new(profile: HostProfile, plan: InstallPlan, credentials: Option<Credentials>) -> Self {
        Self {
            profile,
            plan,
            credentials,
            outputs: RunOutputs::default(),
        }
    }

    pub fn profile(&self) -> &HostProfile {
        &self.profile
    }

    pub fn plan(&self) -> &InstallPlan {
        &self.plan
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    fn panel(&self) -> Result<(&PanelSettings, &Credentials)> {
        match (self.plan.panel.as_ref(), self.credentials.as_ref()) {
            (Some(panel), Some(credentials)) => Ok((panel, credentials)),
            _ => Err(ProvisionError::Credential(
                "Panel credentials were not collected".to_string(),
            )),
        }
    }
}

pub struct Provisioner<R> {
    runner: R,
    adapter: Box<dyn OsAdapter>,
    paths: HostPaths,
    renderer: TemplateRenderer,
    releases: ReleaseService,
    config: Config,
    last_exit_code: Cell<Option<i32>>,
    written: RefCell<Vec<PathBuf>>,
}

impl<R: CommandRunner> Provisioner<R> {
    pub fn new(config: &Config, runner: R, profile: &HostProfile) -> Result<Self> {
        let adapter = os::adapter_for(profile);
        tracing::info!(
            "Using {} adapter ({})",
            adapter.package_manager_name(),
            profile.distro
        );
        Ok(Self {
            runner,
            adapter,
            paths: HostPaths::new(&config.system_root),
            renderer: TemplateRenderer::from_embedded()?,
            releases: ReleaseService::new(config)?,
            config: config.clone(),
            last_exit_code: Cell::new(None),
            written: RefCell::new(Vec::new()),
        })
    }

    async fn run_checked(
        &self,
        spec: &CommandSpec,
        error: fn(String) -> ProvisionError,
    ) -> Result<CommandOutput> {
        tracing::info!("Running: {}", spec);
        let output = self.runner.run(spec).await?;
        if output.is_success() {
            return Ok(output);
        }

        self.last_exit_code.set(output.exit_code);
        let status = match output.exit_code {
            Some(code) => format!("exit code {}", code),
            None => "termination by signal".to_string(),
        };
        let tail = output.tail(OUTPUT_TAIL_LINES);
        let message = if tail.is_empty() {
            format!("`{}` failed with {}", spec, status)
        } else {
            format!("`{}` failed with {}:\n{}", spec, status, tail)
        };
        Err(error(message))
    }

    async fn run_all(
        &self,
        specs: &[CommandSpec],
        error: fn(String) -> ProvisionError,
    ) -> Result<()> {
        for spec in specs {
            self.run_checked(spec, error).await?;
        }
        Ok(())
    }

    async fn install(&self, packages: &[String]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }
        let spec = self.adapter.install_packages(packages);
        self.run_checked(&spec, ProvisionError::DependencyInstall)
            .await
            .map(|_| ())
    }

    fn panel_dir(&self) -> &str {
        &self.config.panel_dir
    }

    fn run_as(&self, plan: &InstallPlan) -> RunAs {
        self.adapter
            .default_run_as_user(plan.web_server().unwrap_or(WebServer::Nginx))
    }

    fn write_rendered(&self, template: Template, context: &Context, path: &Path) -> Result<()> {
        let rendered = self.renderer.render(template, context)?;
        write_file(path, &rendered)?;
        self.record(path);
        Ok(())
    }

    fn record(&self, path: &Path) {
        tracing::info!("Wrote {}", path.display());
        self.written.borrow_mut().push(path.to_path_buf());
    }

    async fn selinux_enabled(&self) -> bool {
        match self.runner.run(&os::selinux_enabled()).await {
            Ok(output) => output.is_success(),
            Err(err) => {
                tracing::debug!("Cannot query SELinux state: {}", err);
                false
            }
        }
    }

    async fn update_baseline(&self) -> Result<StepOutcome> {
        self.run_all(&self.adapter.update_baseline(), ProvisionError::DependencyInstall)
            .await?;
        Ok(StepOutcome::Success)
    }

    async fn install_dependencies(&self, ctx: &ProvisionContext) -> Result<StepOutcome> {
        let plan = ctx.plan();

        self.run_all(
            &self.adapter.base_repositories(),
            ProvisionError::DependencyInstall,
        )
        .await?;
        let mut packages = self.adapter.base_packages();
        packages.extend(self.adapter.firewall_packages());
        self.install(&packages).await?;

        if let Some(web) = plan.web_server() {
            self.run_all(
                &self.adapter.panel_repositories(),
                ProvisionError::DependencyInstall,
            )
            .await?;
            if let Some(refresh) = self.adapter.refresh_index() {
                self.run_checked(&refresh, ProvisionError::DependencyInstall)
                    .await?;
            }
            self.install(&self.adapter.panel_packages(web)).await?;
            self.run_checked(&os::composer_install(), ProvisionError::DependencyInstall)
                .await?;

            if let Some(pool) = self.adapter.php_fpm_pool() {
                let run_as = self.adapter.default_run_as_user(web);
                let mut context = Context::new();
                context.insert("user", run_as.user);
                context.insert("group", run_as.group);
                context.insert("php_fpm_socket", self.adapter.php_fpm_socket());
                self.write_rendered(Template::PhpFpmPool, &context, &self.paths.resolve(pool))?;
            }

            for service in [
                self.adapter.database_service(),
                self.adapter.redis_service(),
                self.adapter.php_fpm_service(),
            ] {
                self.run_checked(&os::enable_now(service), ProvisionError::DependencyInstall)
                    .await?;
            }
        }

        if plan.wants_certificate() {
            self.install(&self.adapter.certbot_packages(plan.web_server()))
                .await?;
        }

        if plan.target.includes_agent() {
            self.run_all(
                &self.adapter.container_runtime(),
                ProvisionError::DependencyInstall,
            )
            .await?;
            self.run_checked(&os::enable_now("docker"), ProvisionError::DependencyInstall)
                .await?;
            self.run_all(
                &self.adapter.swap_accounting(),
                ProvisionError::DependencyInstall,
            )
            .await?;
        }

        Ok(StepOutcome::Success)
    }

    async fn bootstrap_database(&self, ctx: &ProvisionContext) -> Result<StepOutcome> {
        let (_, credentials) = ctx.panel()?;
        let script = database::setup_script(credentials, &ctx.profile().hostname)?;
        self.run_checked(&database::mysql_command(script), ProvisionError::Credential)
            .await?;

        // The root password changed; later runs log in through this file.
        let mut context = Context::new();
        context.insert(
            "root_password",
            credentials.database_root_password.expose_secret(),
        );
        let rendered = self.renderer.render(Template::RootClientConfig, &context)?;
        let option_file = self.paths.mysql_client_config();
        write_file(&option_file, &rendered)?;
        restrict_permissions(&option_file, PRIVATE_FILE_MODE)?;
        self.record(&option_file);
        Ok(StepOutcome::Success)
    }

    async fn fetch_artifacts(&self, ctx: &mut ProvisionContext) -> Result<StepOutcome> {
        let plan = ctx.plan().clone();

        if plan.target.includes_panel() {
            let version = if self.config.dry_run {
                ui::info("Dry run: skipping panel download");
                self.config.panel_version.clone()
            } else {
                let panel_dir = self.paths.resolve(self.panel_dir());
                match self.config.panel_archive.as_deref() {
                    Some(archive) => {
                        self.releases.install_panel(archive, &panel_dir).await?;
                        self.record(&panel_dir);
                        pinned_or_custom(&self.config.panel_version)
                    }
                    None => {
                        let tag = self
                            .releases
                            .resolve_version(&self.config.panel_repo, &self.config.panel_version)
                            .await?;
                        let url = self.releases.panel_archive_url(&self.config.panel_repo, &tag);
                        self.releases.install_panel(&url, &panel_dir).await?;
                        self.record(&panel_dir);
                        tag
                    }
                }
            };
            tracing::info!("Panel release {}", version);
            ctx.outputs.panel_version = Some(version);
        }

        if plan.target.includes_agent() {
            let suffix = ctx.profile().arch.release_suffix().ok_or_else(|| {
                ProvisionError::Precondition(format!(
                    "Wings is not published for architecture {}",
                    ctx.profile().arch
                ))
            })?;
            fs::create_dir_all(self.paths.wings_config_dir())?;

            let version = if self.config.dry_run {
                ui::info("Dry run: skipping Wings download");
                self.config.wings_version.clone()
            } else {
                let version = match self.config.wings_binary.as_deref() {
                    Some(binary) => {
                        self.releases
                            .install_agent(binary, &self.paths.wings_binary())
                            .await?;
                        pinned_or_custom(&self.config.wings_version)
                    }
                    None => {
                        let tag = self
                            .releases
                            .resolve_version(&self.config.wings_repo, &self.config.wings_version)
                            .await?;
                        let url = self
                            .releases
                            .agent_binary_url(&self.config.wings_repo, &tag, suffix);
                        self.releases
                            .install_agent(&url, &self.paths.wings_binary())
                            .await?;
                        tag
                    }
                };
                self.record(&self.paths.wings_binary());
                version
            };
            tracing::info!("Wings release {}", version);
            ctx.outputs.agent_version = Some(version);
        }

        Ok(StepOutcome::Success)
    }

    fn render_environment(&self, ctx: &mut ProvisionContext) -> Result<StepOutcome> {
        let (panel, credentials) = ctx.panel()?;
        let backends = ctx.plan().backends;
        let env_path = self.paths.resolve(Path::new(self.panel_dir()).join(".env"));

        // Data the panel already encrypted or hashed depends on these two.
        let existing = existing_env_values(&env_path, &[APP_KEY_VAR, HASHIDS_SALT_VAR]);
        let app_key = match existing.get(APP_KEY_VAR) {
            Some(key) => {
                ui::info("Keeping the existing application key");
                key.as_str()
            }
            None => credentials.app_key.expose_secret(),
        };
        let hashids_salt = existing
            .get(HASHIDS_SALT_VAR)
            .map(String::as_str)
            .unwrap_or_else(|| credentials.hashids_salt.expose_secret());

        let mut context = Context::new();
        context.insert("app_key", app_key);
        context.insert("timezone", &ctx.profile().timezone);
        context.insert("app_url", &panel.app_url());
        context.insert("admin_email", &credentials.admin_email);
        context.insert("db_host", DATABASE_HOST);
        context.insert("db_port", &DATABASE_PORT);
        context.insert("db_name", &credentials.database_name);
        context.insert("db_user", &credentials.database_user);
        context.insert("db_password", credentials.database_password.expose_secret());
        context.insert("cache_driver", backends.cache);
        context.insert("queue_driver", backends.queue);
        context.insert("session_driver", backends.session.as_str());
        context.insert("hashids_salt", hashids_salt);
        let rendered = self.renderer.render(Template::PanelEnv, &context)?;

        if env_path.exists() {
            let stamp = chrono::Local::now().format("%Y%m%d%H%M%S");
            let backup = env_path.with_file_name(format!(".env.backup-{}", stamp));
            fs::copy(&env_path, &backup)?;
            ui::warn(format!(
                "Existing environment file saved to {}",
                backup.display()
            ));
            ctx.outputs.env_backup = Some(backup);
        }

        write_file(&env_path, &rendered)?;
        restrict_permissions(&env_path, ENV_FILE_MODE)?;
        self.record(&env_path);
        Ok(StepOutcome::Success)
    }

    async fn setup_panel(&self, ctx: &ProvisionContext) -> Result<StepOutcome> {
        let (panel, credentials) = ctx.panel()?;
        let panel_dir = self.panel_dir();
        let run_as = self.run_as(ctx.plan());

        let commands = [
            CommandSpec::new("composer")
                .args(["install", "--no-dev", "--optimize-autoloader", "--no-interaction"])
                .env("COMPOSER_ALLOW_SUPERUSER", "1")
                .current_dir(panel_dir),
            CommandSpec::new("php")
                .args(["artisan", "migrate", "--seed", "--force"])
                .current_dir(panel_dir),
            CommandSpec::new("php")
                .args(["artisan", "p:user:make"])
                .arg(format!("--email={}", credentials.admin_email))
                .arg(format!("--username={}", credentials.admin_username))
                .arg(format!("--name-first={}", panel.admin_first_name))
                .arg(format!("--name-last={}", panel.admin_last_name))
                .secret_arg("--password=", &credentials.admin_password)
                .args(["--admin=1", "--no-interaction"])
                .current_dir(panel_dir),
            CommandSpec::shell(format!(
                "chmod -R 755 {dir}/storage/* {dir}/bootstrap/cache/",
                dir = panel_dir
            )),
            CommandSpec::new("chown")
                .arg("-R")
                .arg(format!("{}:{}", run_as.user, run_as.group))
                .arg(panel_dir),
        ];
        self.run_all(&commands, ProvisionError::ExternalTool).await?;
        Ok(StepOutcome::Success)
    }

    async fn configure_web_server(&self, ctx: &ProvisionContext) -> Result<StepOutcome> {
        let (panel, _) = ctx.panel()?;
        let web = panel.web_server;
        let layout = self.adapter.vhost_layout(web);

        self.run_all(&self.adapter.web_server_modules(web), ProvisionError::ExternalTool)
            .await?;

        let mut context = Context::new();
        context.insert("domain", &panel.domain);
        context.insert("panel_dir", self.panel_dir());
        context.insert("php_fpm_socket", self.adapter.php_fpm_socket());
        let template = match web {
            WebServer::Nginx => Template::NginxVhost,
            WebServer::Apache => Template::ApacheVhost,
        };
        self.write_rendered(template, &context, &self.paths.resolve(layout.available))?;

        if let Some(enabled) = layout.enabled {
            link_site(layout.available, &self.paths.resolve(enabled))?;
        }
        if let Some(default_site) = layout.default_site {
            remove_if_present(&self.paths.resolve(default_site))?;
        }

        let selinux = self.adapter.selinux_commands();
        if !selinux.is_empty() {
            if self.selinux_enabled().await {
                self.run_all(&selinux, ProvisionError::ExternalTool).await?;
            } else {
                ui::info("SELinux is disabled, leaving its booleans unchanged");
            }
        }
        self.run_checked(
            &self.adapter.web_server_config_test(web),
            ProvisionError::ConfigRender,
        )
        .await?;

        let service = self.adapter.web_server_service(web);
        self.run_checked(&os::enable_now(service), ProvisionError::ExternalTool)
            .await?;
        self.run_checked(&os::systemctl("restart", service), ProvisionError::ExternalTool)
            .await?;
        Ok(StepOutcome::Success)
    }

    async fn request_certificates(&self, ctx: &mut ProvisionContext) -> Result<StepOutcome> {
        let plan = ctx.plan().clone();
        let mut requests = Vec::new();

        if let Some(panel) = plan.panel.as_ref().filter(|panel| panel.request_certificate) {
            let (_, credentials) = ctx.panel()?;
            requests.push(certbot_web(
                panel.web_server,
                &panel.domain,
                &credentials.admin_email,
            ));
        }

        if let Some(domain) = plan.agent_certificate_domain() {
            let email = plan
                .agent
                .as_ref()
                .and_then(|agent| agent.certificate_email.clone())
                .or_else(|| ctx.credentials().map(|c| c.admin_email.clone()))
                .ok_or_else(|| {
                    ProvisionError::Credential(
                        "No email address for the certificate request".to_string(),
                    )
                })?;
            requests.push(certbot_standalone(plan.web_server(), domain, &email));
        }

        if requests.is_empty() {
            return Ok(StepOutcome::Skipped);
        }

        for (domain, spec) in requests {
            let outcome = match self.run_checked(&spec, ProvisionError::Certificate).await {
                Ok(_) => {
                    ui::info(format!("Certificate issued for {}", domain));
                    CertificateOutcome {
                        domain,
                        issued: true,
                        manual_command: None,
                    }
                }
                Err(err) => {
                    ui::warn(err.to_string());
                    ui::warn(format!(
                        "Continuing without TLS for {}. Once DNS points at this host, run:\n    {}",
                        domain, spec
                    ));
                    CertificateOutcome {
                        domain,
                        issued: false,
                        manual_command: Some(spec.to_string()),
                    }
                }
            };
            ctx.outputs.certificates.push(outcome);
        }

        Ok(StepOutcome::Success)
    }

    async fn install_services(&self, ctx: &ProvisionContext) -> Result<StepOutcome> {
        let plan = ctx.plan();

        if plan.target.includes_panel() {
            let run_as = self.run_as(plan);
            let mut context = Context::new();
            context.insert("user", run_as.user);
            context.insert("group", run_as.group);
            context.insert("panel_dir", self.panel_dir());
            context.insert("redis_service", self.adapter.redis_service());
            self.write_rendered(
                Template::QueueWorkerUnit,
                &context,
                &self.paths.systemd_unit(QUEUE_WORKER_UNIT),
            )?;
            self.write_rendered(
                Template::SchedulerCron,
                &context,
                &self.paths.cron_entry(SCHEDULER_CRON),
            )?;
        }

        if plan.target.includes_agent() {
            let mut context = Context::new();
            context.insert("binary", WINGS_BINARY);
            context.insert("config_dir", WINGS_CONFIG_DIR);
            self.write_rendered(
                Template::AgentUnit,
                &context,
                &self.paths.systemd_unit(AGENT_UNIT),
            )?;
        }

        self.run_checked(
            &CommandSpec::new("systemctl").arg("daemon-reload"),
            ProvisionError::ExternalTool,
        )
        .await?;
        if plan.target.includes_panel() {
            self.run_checked(&os::enable_now(QUEUE_WORKER_UNIT), ProvisionError::ExternalTool)
                .await?;
        }
        if plan.target.includes_agent() {
            // Wings cannot start until the node configuration from the panel is in place.
            self.run_checked(&os::systemctl("enable", AGENT_UNIT), ProvisionError::ExternalTool)
                .await?;
        }
        Ok(StepOutcome::Success)
    }

    async fn configure_firewall(&self, ctx: &ProvisionContext) -> Result<StepOutcome> {
        let ports = ctx.plan().firewall_ports();
        self.run_all(&self.adapter.firewall_rules(&ports), ProvisionError::ExternalTool)
            .await?;
        let allowed: Vec<String> = ports.iter().map(|p| format!("{}/tcp", p.port)).collect();
        ui::info(format!("Firewall allows {}", allowed.join(", ")));
        Ok(StepOutcome::Success)
    }
}

impl<R: CommandRunner> StepHandler for Provisioner<R> {
    fn applies(&self, step: StepId, ctx: &ProvisionContext) -> bool {
        let plan = ctx.plan();
        match step {
            StepId::BootstrapDatabase
            | StepId::RenderEnvironment
            | StepId::SetupPanel
            | StepId::ConfigureWebServer => plan.target.includes_panel(),
            StepId::RequestCertificate => plan.wants_certificate(),
            StepId::Profile | StepId::Plan | StepId::Summarize => false,
            _ => true,
        }
    }

    async fn run_step(&self, step: StepId, ctx: &mut ProvisionContext) -> Result<StepOutcome> {
        self.last_exit_code.set(None);
        let outcome = match step {
            StepId::UpdateBaseline => self.update_baseline().await,
            StepId::InstallDependencies => self.install_dependencies(ctx).await,
            StepId::BootstrapDatabase => self.bootstrap_database(ctx).await,
            StepId::FetchArtifacts => self.fetch_artifacts(ctx).await,
            StepId::RenderEnvironment => self.render_environment(ctx),
            StepId::SetupPanel => self.setup_panel(ctx).await,
            StepId::ConfigureWebServer => self.configure_web_server(ctx).await,
            StepId::RequestCertificate => self.request_certificates(ctx).await,
            StepId::InstallServices => self.install_services(ctx).await,
            StepId::ConfigureFirewall => self.configure_firewall(ctx).await,
            StepId::Profile | StepId::Plan | StepId::Summarize => Ok(StepOutcome::Skipped),
        };
        ctx.outputs.artifacts.extend(self.written.take());
        outcome
    }

    fn last_exit_code(&self) -> Option<i32> {
        self.last_exit_code.get()
    }
}

fn pinned_or_custom(requested: &str) -> String {
    if requested.eq_ignore_ascii_case("latest") {
        "custom build".to_string()
    } else {
        requested.to_string()
    }
}

fn certbot_base(domain: &str, email: &str) -> [String; 7] {
    [
        "--non-interactive".to_string(),
        "--agree-tos".to_string(),
        "--no-eff-email".to_string(),
        "-m".to_string(),
        email.to_string(),
        "-d".to_string(),
        domain.to_string(),
    ]
}

fn web_plugin(web: WebServer) -> &'static str {
    match web {
        WebServer::Nginx => "--nginx",
        WebServer::Apache => "--apache",
    }
}

/// Certificate installed into the panel's virtual host, with HTTP redirected.
fn certbot_web(web: WebServer, domain: &str, email: &str) -> (String, CommandSpec) {
    let spec = CommandSpec::new("certbot")
        .arg(web_plugin(web))
        .arg("--redirect")
        .args(certbot_base(domain, email));
    (domain.to_string(), spec)
}

/// Certificate files only, for Wings. Uses the panel's web server when one
/// holds port 80, otherwise a standalone listener.
fn certbot_standalone(web: Option<WebServer>, domain: &str, email: &str) -> (String, CommandSpec) {
    let authenticator = web.map(web_plugin).unwrap_or("--standalone");
    let spec = CommandSpec::new("certbot")
        .arg("certonly")
        .arg(authenticator)
        .args(certbot_base(domain, email));
    (domain.to_string(), spec)
}

/// Non-empty values of `keys` in an existing environment file. A missing or
/// unreadable file yields nothing.
fn existing_env_values(path: &Path, keys: &[&str]) -> HashMap<String, String> {
    let mut values = HashMap::new();
    let entries = match dotenvy::from_path_iter(path) {
        Ok(entries) => entries,
        Err(err) => {
            if !err.not_found() {
                tracing::warn!("Cannot read {}: {}", path.display(), err);
            }
            return values;
        }
    };

    for entry in entries {
        match entry {
            Ok((key, value)) if keys.contains(&key.as_str()) && !value.trim().is_empty() => {
                values.insert(key, value);
            }
            Ok(_) => {}
            Err(err) => tracing::warn!("Skipping line in {}: {}", path.display(), err),
        }
    }
    values
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}

fn restrict_permissions(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = (path, mode);
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(_) => {
            fs::remove_file(path)?;
            tracing::info!("Removed {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Points `link` at the host path `target`, replacing whatever was there.
fn link_site(target: &str, link: &Path) -> Result<()> {
    remove_if_present(link)?;
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)?;
    }
    #[cfg(unix)]
    std::os::unix::fs::symlink(target, link)?;
    #[cfg(not(unix))]
    fs::copy(target, link).map(|_| ())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::recording::RecordingRunner;
    use crate::models::{
        AgentSettings, Arch, Backends, Distro, SessionDriver, Target,
    };
    use secrecy::SecretString;

    fn profile(distro: Distro, version: &str) -> HostProfile {
        HostProfile {
            distro,
            version: version.to_string(),
            codename: None,
            arch: Arch::Amd64,
            timezone: "UTC".to_string(),
            hostname: "node-1".to_string(),
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            database_name: "panel".to_string(),
            database_user: "pterodactyl".to_string(),
            database_password: SecretString::from("DbPassword123456".to_string()),
            database_root_password: SecretString::from("RootPassword1234567".to_string()),
            admin_email: "admin@example.com".to_string(),
            admin_username: "admin".to_string(),
            admin_password: SecretString::from("AdminPassword123".to_string()),
            app_key: SecretString::from("base64:AAAA".to_string()),
            hashids_salt: SecretString::from("saltsaltsaltsaltsalt".to_string()),
            generated_database_password: true,
            generated_admin_password: true,
        }
    }

    fn panel_plan(web: WebServer, certificate: bool) -> InstallPlan {
        InstallPlan {
            target: Target::Panel,
            panel: Some(PanelSettings {
                domain: "panel.example.com".to_string(),
                web_server: web,
                request_certificate: certificate,
                admin_first_name: "Admin".to_string(),
                admin_last_name: "User".to_string(),
            }),
            agent: None,
            backends: Backends::with_session(SessionDriver::Redis),
        }
    }

    fn config(root: &Path) -> Config {
        Config {
            system_root: root.to_path_buf(),
            require_root: false,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn env_file_is_backed_up_before_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("var/www/pterodactyl/.env");
        fs::create_dir_all(env_path.parent().unwrap()).unwrap();
        fs::write(&env_path, "APP_KEY=old").unwrap();

        let profile = profile(Distro::Ubuntu, "22.04");
        let provisioner =
            Provisioner::new(&config(dir.path()), RecordingRunner::new(), &profile).unwrap();
        let mut ctx = ProvisionContext::new(
            profile,
            panel_plan(WebServer::Nginx, false),
            Some(credentials()),
        );

        provisioner
            .run_step(StepId::RenderEnvironment, &mut ctx)
            .await
            .unwrap();

        let backup = ctx.outputs.env_backup.clone().unwrap();
        assert_eq!(fs::read_to_string(backup).unwrap(), "APP_KEY=old");
        let env = fs::read_to_string(&env_path).unwrap();
        assert!(env.contains("DB_PASSWORD=\"DbPassword123456\""));
        assert!(env.contains("APP_URL=http://panel.example.com"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn database_bootstrap_stores_root_login() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new();
        let profile = profile(Distro::Rocky, "8.9");
        let provisioner = Provisioner::new(&config(dir.path()), runner.clone(), &profile).unwrap();
        let mut ctx = ProvisionContext::new(
            profile,
            panel_plan(WebServer::Nginx, false),
            Some(credentials()),
        );

        provisioner
            .run_step(StepId::BootstrapDatabase, &mut ctx)
            .await
            .unwrap();

        let script = runner.recorded()[0].stdin.clone().unwrap();
        assert!(script.contains("ALTER USER 'root'@'localhost' IDENTIFIED BY 'RootPassword1234567';"));
        let option_file = dir.path().join("root/.my.cnf");
        assert_eq!(
            fs::read_to_string(&option_file).unwrap(),
            "[client]\nuser=root\npassword=\"RootPassword1234567\"\n"
        );
        let mode = fs::metadata(&option_file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(ctx.outputs.artifacts.contains(&option_file));
    }

    #[tokio::test]
    async fn failed_database_bootstrap_leaves_root_login_alone() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new();
        runner.fail_on("mysql -u root", 1);
        let profile = profile(Distro::Debian, "12");
        let provisioner = Provisioner::new(&config(dir.path()), runner.clone(), &profile).unwrap();
        let mut ctx = ProvisionContext::new(
            profile,
            panel_plan(WebServer::Nginx, false),
            Some(credentials()),
        );

        let err = provisioner
            .run_step(StepId::BootstrapDatabase, &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Credential(_)));
        assert!(!dir.path().join("root/.my.cnf").exists());
    }

    #[tokio::test]
    async fn rerun_keeps_application_key_and_salt() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("var/www/pterodactyl/.env");
        let profile = profile(Distro::Ubuntu, "22.04");
        let provisioner =
            Provisioner::new(&config(dir.path()), RecordingRunner::new(), &profile).unwrap();

        let mut first = ProvisionContext::new(
            profile.clone(),
            panel_plan(WebServer::Nginx, false),
            Some(credentials()),
        );
        provisioner
            .run_step(StepId::RenderEnvironment, &mut first)
            .await
            .unwrap();
        assert!(first.outputs.env_backup.is_none());

        let mut rerun_credentials = credentials();
        rerun_credentials.app_key = SecretString::from("base64:BBBB".to_string());
        rerun_credentials.hashids_salt = SecretString::from("othersaltothersalt00".to_string());
        rerun_credentials.database_password = SecretString::from("NewDbPassword7890".to_string());
        let mut second = ProvisionContext::new(
            profile,
            panel_plan(WebServer::Nginx, false),
            Some(rerun_credentials),
        );
        provisioner
            .run_step(StepId::RenderEnvironment, &mut second)
            .await
            .unwrap();

        let env = fs::read_to_string(&env_path).unwrap();
        assert!(env.contains("APP_KEY=base64:AAAA\n"));
        assert!(env.contains("HASHIDS_SALT=saltsaltsaltsaltsalt\n"));
        assert!(env.contains("DB_PASSWORD=\"NewDbPassword7890\""));
        assert!(second.outputs.env_backup.is_some());
    }

    #[tokio::test]
    async fn blank_key_in_existing_env_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("var/www/pterodactyl/.env");
        fs::create_dir_all(env_path.parent().unwrap()).unwrap();
        fs::write(&env_path, "APP_KEY=\nHASHIDS_SALT=keptsalt\n").unwrap();

        let profile = profile(Distro::Debian, "12");
        let provisioner =
            Provisioner::new(&config(dir.path()), RecordingRunner::new(), &profile).unwrap();
        let mut ctx = ProvisionContext::new(
            profile,
            panel_plan(WebServer::Nginx, false),
            Some(credentials()),
        );
        provisioner
            .run_step(StepId::RenderEnvironment, &mut ctx)
            .await
            .unwrap();

        let env = fs::read_to_string(&env_path).unwrap();
        assert!(env.contains("APP_KEY=base64:AAAA\n"));
        assert!(env.contains("HASHIDS_SALT=keptsalt\n"));
    }

    #[tokio::test]
    async fn rhel_apache_uses_conf_d_and_selinux() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new();
        let profile = profile(Distro::Rocky, "8.9");
        let provisioner = Provisioner::new(&config(dir.path()), runner.clone(), &profile).unwrap();
        let mut ctx = ProvisionContext::new(
            profile,
            panel_plan(WebServer::Apache, false),
            Some(credentials()),
        );

        provisioner
            .run_step(StepId::ConfigureWebServer, &mut ctx)
            .await
            .unwrap();

        let vhost =
            fs::read_to_string(dir.path().join("etc/httpd/conf.d/pterodactyl.conf")).unwrap();
        assert!(vhost.contains("ServerName panel.example.com"));
        assert!(vhost.contains("proxy:unix:/run/php-fpm/pterodactyl.sock|fcgi://localhost"));
        assert!(runner.ran("setsebool -P httpd_can_network_connect 1"));
        assert!(runner.ran("apachectl configtest"));
        assert!(runner.ran("systemctl restart httpd"));
    }

    #[tokio::test]
    async fn disabled_selinux_leaves_booleans_alone() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new();
        runner.fail_on("selinuxenabled", 1);
        let profile = profile(Distro::Rocky, "8.9");
        let provisioner = Provisioner::new(&config(dir.path()), runner.clone(), &profile).unwrap();
        let mut ctx = ProvisionContext::new(
            profile,
            panel_plan(WebServer::Nginx, false),
            Some(credentials()),
        );

        let outcome = provisioner
            .run_step(StepId::ConfigureWebServer, &mut ctx)
            .await
            .unwrap();
        assert_eq!(outcome, StepOutcome::Success);
        assert!(runner.ran("selinuxenabled"));
        assert!(!runner.ran("setsebool"));
        assert!(runner.ran("nginx -t"));
        assert!(runner.ran("systemctl restart nginx"));
    }

    #[tokio::test]
    async fn debian_has_no_selinux_query() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new();
        let profile = profile(Distro::Debian, "12");
        let provisioner = Provisioner::new(&config(dir.path()), runner.clone(), &profile).unwrap();
        let mut ctx = ProvisionContext::new(
            profile,
            panel_plan(WebServer::Nginx, false),
            Some(credentials()),
        );

        provisioner
            .run_step(StepId::ConfigureWebServer, &mut ctx)
            .await
            .unwrap();
        assert!(!runner.ran("selinuxenabled"));
    }

    #[tokio::test]
    async fn failed_config_test_is_a_render_error_with_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new();
        runner.fail_on("nginx -t", 1);
        let profile = profile(Distro::Debian, "12");
        let provisioner = Provisioner::new(&config(dir.path()), runner.clone(), &profile).unwrap();
        let mut ctx = ProvisionContext::new(
            profile,
            panel_plan(WebServer::Nginx, false),
            Some(credentials()),
        );

        let err = provisioner
            .run_step(StepId::ConfigureWebServer, &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::ConfigRender(_)));
        assert_eq!(provisioner.last_exit_code(), Some(1));
        assert!(!runner.ran("systemctl restart nginx"));
    }

    #[tokio::test]
    async fn certificate_failure_is_recorded_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new();
        runner.fail_on("certbot --nginx", 1);
        let profile = profile(Distro::Ubuntu, "22.04");
        let provisioner = Provisioner::new(&config(dir.path()), runner.clone(), &profile).unwrap();
        let mut ctx = ProvisionContext::new(
            profile,
            panel_plan(WebServer::Nginx, true),
            Some(credentials()),
        );

        let outcome = provisioner
            .run_step(StepId::RequestCertificate, &mut ctx)
            .await
            .unwrap();
        assert_eq!(outcome, StepOutcome::Success);
        let certificate = &ctx.outputs.certificates[0];
        assert_eq!(certificate.domain, "panel.example.com");
        assert!(!certificate.issued);
        assert!(certificate
            .manual_command
            .as_deref()
            .unwrap()
            .starts_with("certbot --nginx --redirect"));
    }

    #[tokio::test]
    async fn agent_only_certificate_uses_standalone() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new();
        let profile = profile(Distro::Ubuntu, "24.04");
        let provisioner = Provisioner::new(&config(dir.path()), runner.clone(), &profile).unwrap();
        let plan = InstallPlan {
            target: Target::Agent,
            panel: None,
            agent: Some(AgentSettings {
                domain: Some("node.example.com".to_string()),
                request_certificate: true,
                certificate_email: Some("ops@example.com".to_string()),
            }),
            backends: Backends::with_session(SessionDriver::Redis),
        };
        let mut ctx = ProvisionContext::new(profile, plan, None);

        assert!(!provisioner.applies(StepId::BootstrapDatabase, &ctx));
        assert!(provisioner.applies(StepId::RequestCertificate, &ctx));
        provisioner
            .run_step(StepId::RequestCertificate, &mut ctx)
            .await
            .unwrap();
        assert!(runner.ran("certbot certonly --standalone"));
        assert!(runner.ran("-m ops@example.com -d node.example.com"));
        assert!(ctx.outputs.certificates[0].issued);
    }

    #[tokio::test]
    async fn rhel_dependencies_render_fpm_pool() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new();
        let profile = profile(Distro::AlmaLinux, "8.10");
        let provisioner = Provisioner::new(&config(dir.path()), runner.clone(), &profile).unwrap();
        let ctx = ProvisionContext::new(
            profile,
            panel_plan(WebServer::Nginx, false),
            Some(credentials()),
        );

        provisioner.install_dependencies(&ctx).await.unwrap();

        let pool =
            fs::read_to_string(dir.path().join("etc/php-fpm.d/www-pterodactyl.conf")).unwrap();
        assert!(pool.contains("user = nginx"));
        assert!(pool.contains("listen = /run/php-fpm/pterodactyl.sock"));
        assert!(runner.ran("dnf module enable -y php:remi-8.1"));
        assert!(runner.ran("systemctl enable --now php-fpm"));
        assert!(!runner.ran("docker"));
    }
}
