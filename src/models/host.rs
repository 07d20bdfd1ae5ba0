use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Debian,
    Rhel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distro {
    Ubuntu,
    Debian,
    Rhel,
    Rocky,
    AlmaLinux,
    CentOs,
}

impl Distro {
    pub fn family(&self) -> OsFamily {
        match self {
            Distro::Ubuntu | Distro::Debian => OsFamily::Debian,
            Distro::Rhel | Distro::Rocky | Distro::AlmaLinux | Distro::CentOs => OsFamily::Rhel,
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "ubuntu" => Some(Distro::Ubuntu),
            "debian" => Some(Distro::Debian),
            "rhel" => Some(Distro::Rhel),
            "rocky" => Some(Distro::Rocky),
            "almalinux" => Some(Distro::AlmaLinux),
            "centos" => Some(Distro::CentOs),
            _ => None,
        }
    }
}

impl fmt::Display for Distro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Distro::Ubuntu => "Ubuntu",
            Distro::Debian => "Debian",
            Distro::Rhel => "RHEL",
            Distro::Rocky => "Rocky Linux",
            Distro::AlmaLinux => "AlmaLinux",
            Distro::CentOs => "CentOS",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arch {
    Amd64,
    Arm64,
    Other(String),
}

impl Arch {
    pub fn from_machine(machine: &str) -> Self {
        match machine {
            "x86_64" | "amd64" => Arch::Amd64,
            "aarch64" | "arm64" => Arch::Arm64,
            other => Arch::Other(other.to_string()),
        }
    }

    /// Suffix used by the agent's release assets.
    pub fn release_suffix(&self) -> Option<&'static str> {
        match self {
            Arch::Amd64 => Some("amd64"),
            Arch::Arm64 => Some("arm64"),
            Arch::Other(_) => None,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arch::Amd64 => f.write_str("amd64"),
            Arch::Arm64 => f.write_str("arm64"),
            Arch::Other(name) => f.write_str(name),
        }
    }
}

/// What the host is. Resolved once before anything is changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostProfile {
    pub distro: Distro,
    pub version: String,
    pub codename: Option<String>,
    pub arch: Arch,
    pub timezone: String,
    pub hostname: String,
}

impl HostProfile {
    pub fn family(&self) -> OsFamily {
        self.distro.family()
    }

    pub fn major_version(&self) -> u32 {
        self.version
            .split('.')
            .next()
            .and_then(|major| major.parse().ok())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn major_version_ignores_minor() {
        let profile = HostProfile {
            distro: Distro::Rocky,
            version: "8.9".to_string(),
            codename: None,
            arch: Arch::Amd64,
            timezone: "UTC".to_string(),
            hostname: "node".to_string(),
        };
        assert_eq!(profile.major_version(), 8);
        assert_eq!(profile.family(), OsFamily::Rhel);
    }

    #[test]
    fn machine_names_map_to_release_suffixes() {
        assert_eq!(Arch::from_machine("x86_64").release_suffix(), Some("amd64"));
        assert_eq!(Arch::from_machine("aarch64").release_suffix(), Some("arm64"));
        assert_eq!(Arch::from_machine("riscv64").release_suffix(), None);
    }
}
