use super::{OsAdapter, PHP_VERSION, RunAs, VhostLayout, enable_now, to_strings};
use crate::executor::CommandSpec;
use crate::models::{Distro, FirewallPort, HostProfile, WebServer};

const EPEL_RPM_URL: &str = "https://dl.fedoraproject.org/pub/epel/epel-release-latest-8.noarch.rpm";
const REMI_RPM_URL: &str = "https://rpms.remirepo.net/enterprise/remi-release-8.rpm";
const DOCKER_REPO_URL: &str = "https://download.docker.com/linux/centos/docker-ce.repo";
const PHP_PACKAGES: [&str; 14] = [
    "php",
    "php-common",
    "php-fpm",
    "php-cli",
    "php-json",
    "php-mysqlnd",
    "php-gd",
    "php-mbstring",
    "php-pdo",
    "php-zip",
    "php-bcmath",
    "php-dom",
    "php-opcache",
    "php-posix",
];
const SELINUX_BOOLEANS: [&str; 3] = ["httpd_can_network_connect", "httpd_execmem", "httpd_unified"];

/// RHEL 8 and its rebuilds.
pub struct RhelAdapter {
    distro: Distro,
}

impl RhelAdapter {
    pub fn new(profile: &HostProfile) -> Self {
        Self {
            distro: profile.distro,
        }
    }

    fn dnf(&self) -> CommandSpec {
        CommandSpec::new("dnf")
    }
}

impl OsAdapter for RhelAdapter {
    fn package_manager_name(&self) -> &'static str {
        "dnf"
    }

    fn install_packages(&self, packages: &[String]) -> CommandSpec {
        self.dnf().args(["install", "-y"]).args(packages.iter().cloned())
    }

    fn refresh_index(&self) -> Option<CommandSpec> {
        None
    }

    fn update_baseline(&self) -> Vec<CommandSpec> {
        vec![self.dnf().args(["-y", "update"])]
    }

    fn base_repositories(&self) -> Vec<CommandSpec> {
        // RHEL proper does not ship epel-release in its own repositories.
        let epel = match self.distro {
            Distro::Rhel => EPEL_RPM_URL,
            _ => "epel-release",
        };
        vec![self.dnf().args(["install", "-y", epel])]
    }

    fn base_packages(&self) -> Vec<String> {
        to_strings(&[
            "curl",
            "tar",
            "unzip",
            "git",
            "dnf-plugins-core",
            "policycoreutils-python-utils",
        ])
    }

    fn panel_repositories(&self) -> Vec<CommandSpec> {
        vec![
            self.dnf().args(["install", "-y", REMI_RPM_URL]),
            self.dnf().args(["module", "reset", "-y", "php"]),
            self.dnf()
                .args(["module", "enable", "-y"])
                .arg(format!("php:remi-{}", PHP_VERSION)),
        ]
    }

    fn panel_packages(&self, web: WebServer) -> Vec<String> {
        let mut packages = to_strings(&PHP_PACKAGES);
        packages.extend(to_strings(&["mariadb", "mariadb-server", "redis"]));
        packages.push(
            match web {
                WebServer::Nginx => "nginx",
                WebServer::Apache => "httpd",
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
        vec![
            self.dnf()
                .args(["config-manager", "--add-repo", DOCKER_REPO_URL]),
            self.dnf()
                .args(["install", "-y", "docker-ce", "docker-ce-cli", "containerd.io"]),
        ]
    }

    fn swap_accounting(&self) -> Vec<CommandSpec> {
        Vec::new()
    }

    fn php_fpm_socket(&self) -> &'static str {
        "/run/php-fpm/pterodactyl.sock"
    }

    fn php_fpm_service(&self) -> &'static str {
        "php-fpm"
    }

    fn php_fpm_pool(&self) -> Option<&'static str> {
        Some("/etc/php-fpm.d/www-pterodactyl.conf")
    }

    fn default_run_as_user(&self, web: WebServer) -> RunAs {
        match web {
            WebServer::Nginx => RunAs {
                user: "nginx",
                group: "nginx",
            },
            WebServer::Apache => RunAs {
                user: "apache",
                group: "apache",
            },
        }
    }

    fn web_server_service(&self, web: WebServer) -> &'static str {
        match web {
            WebServer::Nginx => "nginx",
            WebServer::Apache => "httpd",
        }
    }

    fn redis_service(&self) -> &'static str {
        "redis"
    }

    fn vhost_layout(&self, web: WebServer) -> VhostLayout {
        match web {
            WebServer::Nginx => VhostLayout {
                available: "/etc/nginx/conf.d/pterodactyl.conf",
                enabled: None,
                default_site: None,
            },
            WebServer::Apache => VhostLayout {
                available: "/etc/httpd/conf.d/pterodactyl.conf",
                enabled: None,
                default_site: None,
            },
        }
    }

    fn web_server_modules(&self, _web: WebServer) -> Vec<CommandSpec> {
        Vec::new()
    }

    fn web_server_config_test(&self, web: WebServer) -> CommandSpec {
        match web {
            WebServer::Nginx => CommandSpec::new("nginx").arg("-t"),
            WebServer::Apache => CommandSpec::new("apachectl").arg("configtest"),
        }
    }

    fn selinux_commands(&self) -> Vec<CommandSpec> {
        SELINUX_BOOLEANS
            .iter()
            .map(|boolean| CommandSpec::new("setsebool").args(["-P", boolean, "1"]))
            .collect()
    }

    fn firewall_packages(&self) -> Vec<String> {
        vec!["firewalld".to_string()]
    }

    fn firewall_rules(&self, ports: &[FirewallPort]) -> Vec<CommandSpec> {
        let mut commands = vec![enable_now("firewalld")];
        commands.extend(ports.iter().map(|port| {
            CommandSpec::new("firewall-cmd")
                .arg("--permanent")
                .arg(format!("--add-port={}/tcp", port.port))
        }));
        commands.push(CommandSpec::new("firewall-cmd").arg("--reload"));
        commands
    }
}
