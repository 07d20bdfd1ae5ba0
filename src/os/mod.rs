//! Operating-system adapters.
//!
//! Every place the installer behaves differently per OS family goes through
//! [`OsAdapter`]. The adapter is picked once from the [`HostProfile`] and only
//! describes commands and paths; running them is the provisioner's job.

mod debian;
mod rhel;

pub use debian::DebianAdapter;
pub use rhel::RhelAdapter;

use crate::executor::CommandSpec;
use crate::models::{FirewallPort, HostProfile, OsFamily, WebServer};

pub const PHP_VERSION: &str = "8.1";
pub const MARIADB_SETUP_URL: &str = "https://downloads.mariadb.com/MariaDB/mariadb_repo_setup";
pub const COMPOSER_INSTALLER_URL: &str = "https://getcomposer.org/installer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunAs {
    pub user: &'static str,
    pub group: &'static str,
}

/// Where the panel's virtual host lives for one web server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VhostLayout {
    pub available: &'static str,
    /// Symlink that activates `available`, on layouts that split the two.
    pub enabled: Option<&'static str>,
    /// Distribution default site to deactivate.
    pub default_site: Option<&'static str>,
}

pub trait OsAdapter: Send + Sync {
    fn package_manager_name(&self) -> &'static str;

    fn install_packages(&self, packages: &[String]) -> CommandSpec;

    /// Package index refresh after repositories change, where needed.
    fn refresh_index(&self) -> Option<CommandSpec>;

    fn update_baseline(&self) -> Vec<CommandSpec>;

    fn base_repositories(&self) -> Vec<CommandSpec>;

    fn base_packages(&self) -> Vec<String>;

    fn panel_repositories(&self) -> Vec<CommandSpec>;

    fn panel_packages(&self, web: WebServer) -> Vec<String>;

    fn certbot_packages(&self, web: Option<WebServer>) -> Vec<String>;

    fn container_runtime(&self) -> Vec<CommandSpec>;

    /// Kernel flag so container memory limits include swap.
    fn swap_accounting(&self) -> Vec<CommandSpec>;

    fn php_fpm_socket(&self) -> &'static str;

    fn php_fpm_service(&self) -> &'static str;

    /// Pool file the installer renders itself, if the family needs one.
    fn php_fpm_pool(&self) -> Option<&'static str>;

    fn default_run_as_user(&self, web: WebServer) -> RunAs;

    fn web_server_service(&self, web: WebServer) -> &'static str;

    fn redis_service(&self) -> &'static str;

    fn database_service(&self) -> &'static str {
        "mariadb"
    }

    fn vhost_layout(&self, web: WebServer) -> VhostLayout;

    fn web_server_modules(&self, web: WebServer) -> Vec<CommandSpec>;

    fn web_server_config_test(&self, web: WebServer) -> CommandSpec;

    fn selinux_commands(&self) -> Vec<CommandSpec>;

    fn firewall_packages(&self) -> Vec<String>;

    fn firewall_rules(&self, ports: &[FirewallPort]) -> Vec<CommandSpec>;
}

pub fn adapter_for(profile: &HostProfile) -> Box<dyn OsAdapter> {
    match profile.family() {
        OsFamily::Debian => Box::new(DebianAdapter::new(profile)),
        OsFamily::Rhel => Box::new(RhelAdapter::new(profile)),
    }
}

pub fn systemctl(action: &str, unit: &str) -> CommandSpec {
    CommandSpec::new("systemctl").arg(action).arg(unit)
}

pub fn enable_now(unit: &str) -> CommandSpec {
    CommandSpec::new("systemctl").args(["enable", "--now", unit])
}

/// Exits 0 only while SELinux is enabled.
pub fn selinux_enabled() -> CommandSpec {
    CommandSpec::new("selinuxenabled")
}

pub fn composer_install() -> CommandSpec {
    CommandSpec::shell(format!(
        "curl -sS {} | php -- --install-dir=/usr/local/bin --filename=composer",
        COMPOSER_INSTALLER_URL
    ))
}

pub fn mariadb_repo_setup() -> CommandSpec {
    CommandSpec::shell(format!("curl -sS {} | bash", MARIADB_SETUP_URL))
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}
