use crate::error::{ProvisionError, Result};
use crate::models::{Arch, Distro, HostProfile};
use crate::paths::HostPaths;
use std::collections::HashMap;
use std::fs;

const SUPPORTED_UBUNTU: [&str; 3] = ["20.04", "22.04", "24.04"];
const SUPPORTED_DEBIAN: [u32; 3] = [10, 11, 12];
const SUPPORTED_RHEL_MAJOR: u32 = 8;

pub fn detect_host(paths: &HostPaths, machine: &str) -> Result<HostProfile> {
    let os_release_path = paths.os_release();
    let content = fs::read_to_string(&os_release_path).map_err(|e| {
        ProvisionError::Precondition(format!(
            "Cannot identify the operating system ({}): {}",
            os_release_path.display(),
            e
        ))
    })?;
    let release = parse_os_release(&content);
    let (distro, version) = classify(&release)?;

    let profile = HostProfile {
        distro,
        version,
        codename: release
            .get("VERSION_CODENAME")
            .filter(|name| !name.is_empty())
            .cloned(),
        arch: Arch::from_machine(machine),
        timezone: detect_timezone(paths),
        hostname: detect_hostname(paths),
    };
    tracing::info!("Detected host: {:?}", profile);
    Ok(profile)
}

pub fn parse_os_release(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            (key.trim().to_string(), value.to_string())
        })
        .collect()
}

pub fn classify(release: &HashMap<String, String>) -> Result<(Distro, String)> {
    let id = release
        .get("ID")
        .map(|id| id.to_ascii_lowercase())
        .unwrap_or_default();
    let version = release.get("VERSION_ID").cloned().unwrap_or_default();
    let pretty = release
        .get("PRETTY_NAME")
        .cloned()
        .unwrap_or_else(|| format!("{} {}", id, version));

    let Some(distro) = Distro::from_id(&id) else {
        return Err(ProvisionError::Precondition(format!(
            "Unsupported operating system: {}",
            pretty
        )));
    };

    let major: u32 = version
        .split('.')
        .next()
        .and_then(|major| major.parse().ok())
        .unwrap_or(0);

    let supported = match distro {
        Distro::Ubuntu => SUPPORTED_UBUNTU.contains(&version.as_str()),
        Distro::Debian => SUPPORTED_DEBIAN.contains(&major),
        Distro::Rhel | Distro::Rocky | Distro::AlmaLinux | Distro::CentOs => {
            major == SUPPORTED_RHEL_MAJOR
        }
    };

    if !supported {
        return Err(ProvisionError::Precondition(format!(
            "Unsupported {} version: {}",
            distro, version
        )));
    }

    Ok((distro, version))
}

/// The installer mutates system state and must run as root.
pub fn ensure_root() -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let uid = fs::metadata("/proc/self")
            .map(|metadata| metadata.uid())
            .map_err(|e| {
                ProvisionError::Precondition(format!("Cannot determine effective user: {}", e))
            })?;
        if uid != 0 {
            return Err(ProvisionError::Precondition(
                "This installer must be run as root".to_string(),
            ));
        }
    }
    Ok(())
}

fn detect_timezone(paths: &HostPaths) -> String {
    if let Ok(content) = fs::read_to_string(paths.timezone()) {
        let zone = content.trim();
        if !zone.is_empty() {
            return zone.to_string();
        }
    }

    if let Ok(target) = fs::read_link(paths.localtime()) {
        let target = target.to_string_lossy();
        if let Some((_, zone)) = target.split_once("zoneinfo/") {
            if !zone.is_empty() {
                return zone.to_string();
            }
        }
    }

    "UTC".to_string()
}

fn detect_hostname(paths: &HostPaths) -> String {
    fs::read_to_string(paths.hostname())
        .ok()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OsFamily;

    fn write_release(root: &std::path::Path, content: &str) {
        fs::create_dir_all(root.join("etc")).unwrap();
        fs::write(root.join("etc/os-release"), content).unwrap();
    }

    #[test]
    fn detects_ubuntu_with_timezone() {
        let dir = tempfile::tempdir().unwrap();
        write_release(
            dir.path(),
            "NAME=\"Ubuntu\"\nID=ubuntu\nVERSION_ID=\"22.04\"\nVERSION_CODENAME=jammy\n",
        );
        fs::write(dir.path().join("etc/timezone"), "Europe/Berlin\n").unwrap();
        fs::write(dir.path().join("etc/hostname"), "panel-host\n").unwrap();

        let profile = detect_host(&HostPaths::new(dir.path()), "x86_64").unwrap();
        assert_eq!(profile.distro, Distro::Ubuntu);
        assert_eq!(profile.family(), OsFamily::Debian);
        assert_eq!(profile.version, "22.04");
        assert_eq!(profile.codename.as_deref(), Some("jammy"));
        assert_eq!(profile.arch, Arch::Amd64);
        assert_eq!(profile.timezone, "Europe/Berlin");
        assert_eq!(profile.hostname, "panel-host");
    }

    #[cfg(unix)]
    #[test]
    fn timezone_falls_back_to_localtime_link() {
        let dir = tempfile::tempdir().unwrap();
        write_release(dir.path(), "ID=rocky\nVERSION_ID=\"8.9\"\n");
        std::os::unix::fs::symlink(
            "/usr/share/zoneinfo/America/New_York",
            dir.path().join("etc/localtime"),
        )
        .unwrap();

        let profile = detect_host(&HostPaths::new(dir.path()), "aarch64").unwrap();
        assert_eq!(profile.family(), OsFamily::Rhel);
        assert_eq!(profile.timezone, "America/New_York");
        assert_eq!(profile.arch, Arch::Arm64);
        assert_eq!(profile.hostname, "localhost");
    }

    #[test]
    fn supported_matrix() {
        let accepted = [
            ("ubuntu", "20.04"),
            ("ubuntu", "22.04"),
            ("ubuntu", "24.04"),
            ("debian", "10"),
            ("debian", "11"),
            ("debian", "12"),
            ("rhel", "8.8"),
            ("rocky", "8.9"),
            ("almalinux", "8.10"),
            ("centos", "8"),
        ];
        for (id, version) in accepted {
            let release = parse_os_release(&format!("ID={}\nVERSION_ID=\"{}\"\n", id, version));
            assert!(classify(&release).is_ok(), "{id} {version}");
        }
    }

    #[test]
    fn rejects_unsupported_hosts() {
        let rejected = [
            ("ubuntu", "18.04"),
            ("ubuntu", "23.10"),
            ("debian", "9"),
            ("rocky", "9.3"),
            ("centos", "7"),
            ("arch", ""),
            ("fedora", "39"),
        ];
        for (id, version) in rejected {
            let release = parse_os_release(&format!("ID={}\nVERSION_ID=\"{}\"\n", id, version));
            let err = classify(&release).unwrap_err();
            assert!(matches!(err, ProvisionError::Precondition(_)), "{id} {version}");
        }
    }

    #[test]
    fn missing_os_release_is_a_precondition_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = detect_host(&HostPaths::new(dir.path()), "x86_64").unwrap_err();
        assert!(matches!(err, ProvisionError::Precondition(_)));
    }
}
