use std::path::{Path, PathBuf};

const OS_RELEASE: &str = "/etc/os-release";
const TIMEZONE: &str = "/etc/timezone";
const LOCALTIME: &str = "/etc/localtime";
const HOSTNAME: &str = "/etc/hostname";
const SYSTEMD_DIR: &str = "/etc/systemd/system";
const CRON_DIR: &str = "/etc/cron.d";
pub const MYSQL_CLIENT_CONFIG: &str = "/root/.my.cnf";
pub const WINGS_BINARY: &str = "/usr/local/bin/wings";
pub const WINGS_CONFIG_DIR: &str = "/etc/pterodactyl";

/// Maps absolute host paths onto the filesystem root the installer writes to.
///
/// On a real run the root is `/`. Dry runs and tests point it at a scratch
/// directory so every rendered artifact lands somewhere inspectable, while
/// commands handed to external tools keep the absolute host path.
#[derive(Debug, Clone)]
pub struct HostPaths {
    root: PathBuf,
}

impl HostPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, absolute: impl AsRef<Path>) -> PathBuf {
        let absolute = absolute.as_ref();
        let relative = absolute.strip_prefix("/").unwrap_or(absolute);
        self.root.join(relative)
    }

    pub fn os_release(&self) -> PathBuf {
        self.resolve(OS_RELEASE)
    }

    pub fn timezone(&self) -> PathBuf {
        self.resolve(TIMEZONE)
    }

    pub fn localtime(&self) -> PathBuf {
        self.resolve(LOCALTIME)
    }

    pub fn hostname(&self) -> PathBuf {
        self.resolve(HOSTNAME)
    }

    pub fn systemd_unit(&self, name: &str) -> PathBuf {
        self.resolve(Path::new(SYSTEMD_DIR).join(name))
    }

    pub fn cron_entry(&self, name: &str) -> PathBuf {
        self.resolve(Path::new(CRON_DIR).join(name))
    }

    /// Option file the `mysql` client reads when run as root.
    pub fn mysql_client_config(&self) -> PathBuf {
        self.resolve(MYSQL_CLIENT_CONFIG)
    }

    pub fn wings_binary(&self) -> PathBuf {
        self.resolve(WINGS_BINARY)
    }

    pub fn wings_config_dir(&self) -> PathBuf {
        self.resolve(WINGS_CONFIG_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_under_root() {
        let paths = HostPaths::new("/tmp/scratch");
        assert_eq!(
            paths.resolve("/var/www/pterodactyl/.env"),
            PathBuf::from("/tmp/scratch/var/www/pterodactyl/.env")
        );
        assert_eq!(
            paths.systemd_unit("wings.service"),
            PathBuf::from("/tmp/scratch/etc/systemd/system/wings.service")
        );
    }

    #[test]
    fn live_root_is_identity() {
        let paths = HostPaths::new("/");
        assert_eq!(paths.os_release(), PathBuf::from("/etc/os-release"));
    }
}
