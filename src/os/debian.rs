use super::{
    OsAdapter, PHP_VERSION, RunAs, VhostLayout, mariadb_repo_setup, to_strings,
};
use crate::executor::CommandSpec;
use crate::models::{Distro, FirewallPort, HostProfile, WebServer};

const ONDREJ_PPA: &str = "ppa:ondrej/php";
const SURY_KEY_URL: &str = "https://packages.sury.org/php/apt.gpg";
const SURY_REPO_URL: &str = "https://packages.sury.org/php/";
const SURY_KEYRING: &str = "/usr/share/keyrings/sury-php.gpg";
const REDIS_KEY_URL: &str = "https://packages.redis.io/gpg";
const REDIS_REPO_URL: &str = "https://packages.redis.io/deb";
const REDIS_KEYRING: &str = "/usr/share/keyrings/redis-archive-keyring.gpg";
const DOCKER_INSTALL_URL: &str = "https://get.docker.com/";
const PHP_EXTENSIONS: [&str; 10] = [
    "common", "cli", "gd", "mysql", "mbstring", "bcmath", "xml", "fpm", "curl", "zip",
];

/// Ubuntu and Debian.
pub struct DebianAdapter {
    distro: Distro,
    major_version: u32,
    codename: String,
}

impl DebianAdapter {
    pub fn new(profile: &HostProfile) -> Self {
        let codename = profile
            .codename
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| default_codename(profile.distro, &profile.version).map(str::to_string))
            .unwrap_or_default();
        Self {
            distro: profile.distro,
            major_version: profile.major_version(),
            codename,
        }
    }

    fn apt_get(&self) -> CommandSpec {
        CommandSpec::new("apt-get").env("DEBIAN_FRONTEND", "noninteractive")
    }

    fn needs_mariadb_repo(&self) -> bool {
        match self.distro {
            Distro::Ubuntu => self.major_version == 20,
            _ => self.major_version == 10,
        }
    }

    fn php_repository(&self) -> CommandSpec {
        match self.distro {
            Distro::Ubuntu => CommandSpec::new("add-apt-repository")
                .env("LC_ALL", "C.UTF-8")
                .args(["-y", ONDREJ_PPA]),
            _ => CommandSpec::shell(format!(
                "curl -fsSL {key} | gpg --dearmor --yes -o {keyring} && \
                 echo \"deb [signed-by={keyring}] {repo} {codename} main\" > /etc/apt/sources.list.d/sury-php.list",
                key = SURY_KEY_URL,
                keyring = SURY_KEYRING,
                repo = SURY_REPO_URL,
                codename = self.codename,
            )),
        }
    }

    fn redis_repository(&self) -> CommandSpec {
        CommandSpec::shell(format!(
            "curl -fsSL {key} | gpg --dearmor --yes -o {keyring} && \
             echo \"deb [signed-by={keyring}] {repo} {codename} main\" > /etc/apt/sources.list.d/redis.list",
            key = REDIS_KEY_URL,
            keyring = REDIS_KEYRING,
            repo = REDIS_REPO_URL,
            codename = self.codename,
        ))
    }
}

fn default_codename(distro: Distro, version: &str) -> Option<&'static str> {
    match (distro, version) {
        (Distro::Ubuntu, "20.04") => Some("focal"),
        (Distro::Ubuntu, "22.04") => Some("jammy"),
        (Distro::Ubuntu, "24.04") => Some("noble"),
        (Distro::Debian, "10") => Some("buster"),
        (Distro::Debian, "11") => Some("bullseye"),
        (Distro::Debian, "12") => Some("bookworm"),
        _ => None,
    }
}

impl OsAdapter for DebianAdapter {
    fn package_manager_name(&self) -> &'static str {
        "apt"
    }

    fn install_packages(&self, packages: &[String]) -> CommandSpec {
        self.apt_get().args(["install", "-y"]).args(packages.iter().cloned())
    }

    fn refresh_index(&self) -> Option<CommandSpec> {
        Some(self.apt_get().arg("update"))
    }

    fn update_baseline(&self) -> Vec<CommandSpec> {
        vec![
            self.apt_get().arg("update"),
            self.apt_get().args(["-y", "upgrade"]),
        ]
    }

    fn base_repositories(&self) -> Vec<CommandSpec> {
        Vec::new()
    }

    fn base_packages(&self) -> Vec<String> {
        let mut packages = to_strings(&[
            "curl",
            "ca-certificates",
            "gnupg",
            "apt-transport-https",
            "tar",
            "unzip",
            "git",
        ]);
        if self.distro == Distro::Ubuntu {
            packages.push("software-properties-common".to_string());
        } else {
            packages.push("lsb-release".to_string());
        }
        packages
    }

    fn panel_repositories(&self) -> Vec<CommandSpec> {
        let mut commands = vec![self.php_repository(), self.redis_repository()];
        if self.needs_mariadb_repo() {
            commands.push(mariadb_repo_setup());
        }
        commands
    }

    fn panel_packages(&self, web: WebServer) -> Vec<String> {
        let mut packages = vec![format!("php{}", PHP_VERSION)];
        packages.extend(
            PHP_EXTENSIONS
                .iter()
                .map(|ext| format!("php{}-{}", PHP_VERSION, ext)),
        );
        packages.extend(to_strings(&["mariadb-server", "redis-server"]));
        packages.push(
            match web {
                WebServer::Nginx => "nginx",
                WebServer::Apache => "apache2",
            }
            .to_string(),
        );
        packages
    }

    fn certbot_packages(&self, web: Option<WebServer>) -> Vec<String> {
        let mut packages = vec!["certbot".to_string()];
        match web {
            Some(WebServer::Nginx) => packages.push("python3-certbot-nginx".to_string()),
            Some(WebServer::Apache) => packages.push("python3-certbot-apache".to_string()),
            None => {}
        }
        packages
    }

    fn container_runtime(&self) -> Vec<CommandSpec> {
        vec![CommandSpec::shell(format!(
            "curl -sSL {} | CHANNEL=stable bash",
            DOCKER_INSTALL_URL
        ))]
    }

    fn swap_accounting(&self) -> Vec<CommandSpec> {
        vec![CommandSpec::shell(
            "if ! grep -q 'swapaccount=1' /etc/default/grub; then \
             sed -i 's/^GRUB_CMDLINE_LINUX_DEFAULT=\"\\(.*\\)\"/GRUB_CMDLINE_LINUX_DEFAULT=\"\\1 swapaccount=1\"/' /etc/default/grub && \
             update-grub; fi",
        )]
    }

    fn php_fpm_socket(&self) -> &'static str {
        "/run/php/php8.1-fpm.sock"
    }

    fn php_fpm_service(&self) -> &'static str {
        "php8.1-fpm"
    }

    fn php_fpm_pool(&self) -> Option<&'static str> {
        None
    }

    fn default_run_as_user(&self, _web: WebServer) -> RunAs {
        RunAs {
            user: "www-data",
            group: "www-data",
        }
    }

    fn web_server_service(&self, web: WebServer) -> &'static str {
        match web {
            WebServer::Nginx => "nginx",
            WebServer::Apache => "apache2",
        }
    }

    fn redis_service(&self) -> &'static str {
        "redis-server"
    }

    fn vhost_layout(&self, web: WebServer) -> VhostLayout {
        match web {
            WebServer::Nginx => VhostLayout {
                available: "/etc/nginx/sites-available/pterodactyl.conf",
                enabled: Some("/etc/nginx/sites-enabled/pterodactyl.conf"),
                default_site: Some("/etc/nginx/sites-enabled/default"),
            },
            WebServer::Apache => VhostLayout {
                available: "/etc/apache2/sites-available/pterodactyl.conf",
                enabled: Some("/etc/apache2/sites-enabled/pterodactyl.conf"),
                default_site: Some("/etc/apache2/sites-enabled/000-default.conf"),
            },
        }
    }

    fn web_server_modules(&self, web: WebServer) -> Vec<CommandSpec> {
        match web {
            WebServer::Nginx => Vec::new(),
            WebServer::Apache => {
                vec![CommandSpec::new("a2enmod").args(["rewrite", "proxy_fcgi", "setenvif"])]
            }
        }
    }

    fn web_server_config_test(&self, web: WebServer) -> CommandSpec {
        match web {
            WebServer::Nginx => CommandSpec::new("nginx").arg("-t"),
            WebServer::Apache => CommandSpec::new("apache2ctl").arg("configtest"),
        }
    }

    fn selinux_commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }

    fn firewall_packages(&self) -> Vec<String> {
        vec!["ufw".to_string()]
    }

    fn firewall_rules(&self, ports: &[FirewallPort]) -> Vec<CommandSpec> {
        let mut commands = vec![
            CommandSpec::new("ufw").args(["default", "deny", "incoming"]),
            CommandSpec::new("ufw").args(["default", "allow", "outgoing"]),
        ];
        commands.extend(
            ports
                .iter()
                .map(|port| CommandSpec::new("ufw").arg("allow").arg(format!("{}/tcp", port.port))),
        );
        commands.push(CommandSpec::new("ufw").args(["--force", "enable"]));
        commands
    }
}
