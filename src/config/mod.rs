use crate::models::SessionDriver;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "etc/panel-installer/config.json";
const DRY_RUN_ROOT: &str = "panel-installer-dry-run";
const MIN_PASSWORD_LENGTH: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where files are written.
    pub system_root: PathBuf,
    /// Where host facts (`/etc/os-release`, timezone, hostname) are read.
    pub host_root: PathBuf,
    pub dry_run: bool,
    pub require_root: bool,
    pub panel_dir: String,
    pub panel_repo: String,
    pub panel_version: String,
    pub panel_archive: Option<String>,
    pub wings_repo: String,
    pub wings_version: String,
    pub wings_binary: Option<String>,
    pub github_api: String,
    pub github_url: String,
    pub session_driver: SessionDriver,
    pub password_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            system_root: PathBuf::from("/"),
            host_root: PathBuf::from("/"),
            dry_run: false,
            require_root: true,
            panel_dir: "/var/www/pterodactyl".to_string(),
            panel_repo: "pterodactyl/panel".to_string(),
            panel_version: "latest".to_string(),
            panel_archive: None,
            wings_repo: "pterodactyl/wings".to_string(),
            wings_version: "latest".to_string(),
            wings_binary: None,
            github_api: "https://api.github.com".to_string(),
            github_url: "https://github.com".to_string(),
            session_driver: SessionDriver::Redis,
            password_length: 24,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(root) = std::env::var("PANEL_INSTALLER_ROOT") {
            config.system_root = PathBuf::from(&root);
            config.host_root = PathBuf::from(root);
        }

        if let Some(file_config) = Self::from_conf_file(&config.system_root)? {
            config.apply_file(file_config)?;
        }

        config.apply_env()?;
        config.normalize()?;
        Ok(config)
    }

    fn from_conf_file(root: &Path) -> Result<Option<FileConfig>> {
        let path = root.join(CONFIG_FILE);
        if !path.is_file() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let file_config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(Some(file_config))
    }

    fn apply_file(&mut self, file_config: FileConfig) -> Result<()> {
        if let Some(dry_run) = file_config.dry_run {
            self.dry_run = dry_run;
        }
        if let Some(panel_dir) = file_config.panel_dir {
            self.panel_dir = panel_dir;
        }
        if let Some(panel_repo) = file_config.panel_repo {
            self.panel_repo = panel_repo;
        }
        if let Some(panel_version) = file_config.panel_version {
            self.panel_version = panel_version;
        }
        if let Some(panel_archive) = file_config.panel_archive {
            self.panel_archive = Some(panel_archive);
        }
        if let Some(wings_repo) = file_config.wings_repo {
            self.wings_repo = wings_repo;
        }
        if let Some(wings_version) = file_config.wings_version {
            self.wings_version = wings_version;
        }
        if let Some(wings_binary) = file_config.wings_binary {
            self.wings_binary = Some(wings_binary);
        }
        if let Some(session_driver) = file_config.session_driver {
            self.session_driver = parse_session_driver(&session_driver)?;
        }
        if let Some(password_length) = file_config.password_length {
            self.password_length = password_length;
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dry_run) = std::env::var("PANEL_INSTALLER_DRY_RUN") {
            self.dry_run = parse_flag(&dry_run);
        }

        if let Ok(require_root) = std::env::var("PANEL_INSTALLER_REQUIRE_ROOT") {
            self.require_root = parse_flag(&require_root);
        }

        if let Ok(panel_dir) = std::env::var("PANEL_DIR") {
            self.panel_dir = panel_dir;
        }

        if let Ok(version) = std::env::var("PANEL_VERSION") {
            self.panel_version = version;
        }

        if let Ok(archive) = std::env::var("PANEL_ARCHIVE") {
            self.panel_archive = Some(archive);
        }

        if let Ok(version) = std::env::var("WINGS_VERSION") {
            self.wings_version = version;
        }

        if let Ok(binary) = std::env::var("WINGS_BINARY") {
            self.wings_binary = Some(binary);
        }

        if let Ok(api) = std::env::var("GITHUB_API_URL") {
            self.github_api = api;
        }

        if let Ok(url) = std::env::var("GITHUB_URL") {
            self.github_url = url;
        }

        if let Ok(driver) = std::env::var("SESSION_DRIVER") {
            self.session_driver = parse_session_driver(&driver)?;
        }

        Ok(())
    }

    fn normalize(&mut self) -> Result<()> {
        let panel_dir = self.panel_dir.trim();
        if panel_dir.is_empty() {
            anyhow::bail!("panel_dir cannot be empty");
        }
        if !Path::new(panel_dir).is_absolute() {
            anyhow::bail!("panel_dir must be an absolute path");
        }
        if Path::new(panel_dir)
            .components()
            .any(|component| matches!(component, std::path::Component::ParentDir))
        {
            anyhow::bail!("panel_dir cannot contain '..'");
        }
        self.panel_dir = panel_dir.trim_end_matches('/').to_string();

        if self.password_length < MIN_PASSWORD_LENGTH {
            anyhow::bail!(
                "password_length must be at least {}, got {}",
                MIN_PASSWORD_LENGTH,
                self.password_length
            );
        }

        // Dry runs never touch the live filesystem.
        if self.dry_run {
            self.require_root = false;
            if self.system_root == Path::new("/") {
                self.system_root = std::env::current_dir()?.join(DRY_RUN_ROOT);
            }
        }

        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_session_driver(value: &str) -> Result<SessionDriver> {
    SessionDriver::parse(value)
        .with_context(|| format!("Unknown session driver '{}'", value.trim()))
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    dry_run: Option<bool>,
    panel_dir: Option<String>,
    panel_repo: Option<String>,
    panel_version: Option<String>,
    panel_archive: Option<String>,
    wings_repo: Option<String>,
    wings_version: Option<String>,
    wings_binary: Option<String>,
    session_driver: Option<String>,
    password_length: Option<usize>,
}
