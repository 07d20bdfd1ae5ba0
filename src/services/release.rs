use crate::config::Config;
use crate::error::{ProvisionError, Result};
use semver::Version;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const LATEST: &str = "latest";
const PANEL_ASSET: &str = "panel.tar.gz";
const PRESERVE_ENTRIES: [&str; 1] = [".env"];

#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: String,
}

/// Resolves and downloads upstream release artifacts.
#[derive(Clone)]
pub struct ReleaseService {
    client: reqwest::Client,
    github_api: String,
    github_url: String,
}

impl ReleaseService {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("panel_installer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProvisionError::ArtifactFetch(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            github_api: config.github_api.trim_end_matches('/').to_string(),
            github_url: config.github_url.trim_end_matches('/').to_string(),
        })
    }

    /// Release tag for `requested`, asking upstream when it is `latest`.
    pub async fn resolve_version(&self, repo: &str, requested: &str) -> Result<String> {
        let requested = requested.trim();
        if !requested.eq_ignore_ascii_case(LATEST) {
            return normalize_tag(requested);
        }

        let url = format!("{}/repos/{}/releases/latest", self.github_api, repo);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| {
                ProvisionError::ArtifactFetch(format!("Failed to query {} releases: {}", repo, e))
            })?
            .error_for_status()
            .map_err(|e| {
                ProvisionError::ArtifactFetch(format!("Failed to query {} releases: {}", repo, e))
            })?;
        let release: LatestRelease = response.json().await.map_err(|e| {
            ProvisionError::ArtifactFetch(format!("Invalid release metadata for {}: {}", repo, e))
        })?;
        normalize_tag(&release.tag_name)
    }

    pub fn panel_archive_url(&self, repo: &str, tag: &str) -> String {
        format!(
            "{}/{}/releases/download/{}/{}",
            self.github_url, repo, tag, PANEL_ASSET
        )
    }

    pub fn agent_binary_url(&self, repo: &str, tag: &str, arch_suffix: &str) -> String {
        format!(
            "{}/{}/releases/download/{}/wings_linux_{}",
            self.github_url, repo, tag, arch_suffix
        )
    }

    /// Unpacks the panel release at `source` into `panel_dir`, keeping an
    /// existing environment file in place.
    pub async fn install_panel(&self, source: &str, panel_dir: &Path) -> Result<()> {
        let bytes = self.fetch_bytes(source, "panel archive").await?;

        let parent = panel_dir.parent().ok_or_else(|| {
            ProvisionError::ArtifactFetch(format!(
                "Panel directory has no parent: {}",
                panel_dir.display()
            ))
        })?;
        fs::create_dir_all(parent)?;
        fs::create_dir_all(panel_dir)?;

        let extract_dir = tempfile::Builder::new()
            .prefix(".panel_extract_")
            .tempdir_in(parent)?;
        extract_archive(&bytes, extract_dir.path())?;
        let release_root = detect_archive_root(extract_dir.path())?;
        if !release_root.join("artisan").is_file() {
            return Err(ProvisionError::ArtifactFetch(
                "Panel archive does not contain an artisan entry point".to_string(),
            ));
        }

        apply_release(&release_root, panel_dir)?;
        Ok(())
    }

    pub async fn install_agent(&self, source: &str, destination: &Path) -> Result<()> {
        let bytes = self.fetch_bytes(source, "wings binary").await?;
        if bytes.is_empty() {
            return Err(ProvisionError::ArtifactFetch(
                "Downloaded wings binary is empty".to_string(),
            ));
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(destination, &bytes)?;
        ensure_executable(destination)?;
        Ok(())
    }

    async fn fetch_bytes(&self, url: &str, label: &str) -> Result<Vec<u8>> {
        if let Some(path) = resolve_local_path(url) {
            let bytes = fs::read(&path).map_err(|e| {
                ProvisionError::ArtifactFetch(format!(
                    "Failed to read local {} {}: {}",
                    label,
                    path.display(),
                    e
                ))
            })?;
            return Ok(bytes);
        }

        tracing::debug!("Downloading {} from {}", label, url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProvisionError::ArtifactFetch(format!("Failed to download {}: {}", label, e)))?;
        let response = response
            .error_for_status()
            .map_err(|e| ProvisionError::ArtifactFetch(format!("Failed to download {}: {}", label, e)))?;
        let bytes = response.bytes().await.map_err(|e| {
            ProvisionError::ArtifactFetch(format!("Failed to read {} bytes: {}", label, e))
        })?;

        Ok(bytes.to_vec())
    }
}

fn normalize_tag(tag: &str) -> Result<String> {
    let bare = tag.trim().trim_start_matches('v');
    Version::parse(bare).map_err(|e| {
        ProvisionError::ArtifactFetch(format!("Invalid release version '{}': {}", tag, e))
    })?;
    Ok(format!("v{}", bare))
}

fn extract_archive(bytes: &[u8], target_dir: &Path) -> Result<()> {
    match bytes {
        [0x1f, 0x8b, ..] => extract_tar_gz(bytes, target_dir),
        [b'P', b'K', 0x03, 0x04, ..] => extract_zip(bytes, target_dir),
        _ => Err(ProvisionError::ArtifactFetch(
            "Unrecognized archive format (expected .tar.gz or .zip)".to_string(),
        )),
    }
}

fn extract_tar_gz(bytes: &[u8], target_dir: &Path) -> Result<()> {
    let decoder = flate2::read::GzDecoder::new(io::Cursor::new(bytes));
    let mut archive = tar::Archive::new(decoder);
    archive.set_preserve_ownerships(false);
    archive
        .unpack(target_dir)
        .map_err(|e| ProvisionError::ArtifactFetch(format!("Invalid release archive: {}", e)))
}

fn extract_zip(bytes: &[u8], target_dir: &Path) -> Result<()> {
    let reader = io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(reader)
        .map_err(|e| ProvisionError::ArtifactFetch(format!("Invalid release archive: {}", e)))?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(|e| {
            ProvisionError::ArtifactFetch(format!("Failed to read release archive: {}", e))
        })?;

        let Some(relative_path) = file.enclosed_name() else {
            return Err(ProvisionError::ArtifactFetch(
                "Invalid file path in release archive".to_string(),
            ));
        };

        let out_path = target_dir.join(relative_path);
        if file.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut outfile = fs::File::create(&out_path)?;
        io::copy(&mut file, &mut outfile)?;

        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out_path, fs::Permissions::from_mode(mode))?;
        }
    }

    Ok(())
}

/// Archives that wrap everything in one top-level directory unpack from it.
fn detect_archive_root(extract_dir: &Path) -> Result<PathBuf> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(extract_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == "__MACOSX" || name == ".DS_Store" {
            continue;
        }
        entries.push(entry);
    }

    if entries.len() == 1 {
        let path = entries[0].path();
        if path.is_dir() {
            return Ok(path);
        }
    }

    Ok(extract_dir.to_path_buf())
}

/// Overlays the release onto `panel_dir` file by file. Files the release
/// does not ship (uploads and logs under `storage/`, caches) stay in place.
fn apply_release(release_root: &Path, panel_dir: &Path) -> Result<()> {
    for entry in fs::read_dir(release_root)? {
        let entry = entry?;
        let name = entry.file_name();
        let dest = panel_dir.join(&name);

        if PRESERVE_ENTRIES.contains(&name.to_string_lossy().as_ref()) && dest.exists() {
            continue;
        }
        overlay(&entry.path(), &dest)?;
    }

    Ok(())
}

fn overlay(source: &Path, dest: &Path) -> Result<()> {
    let dest_meta = fs::symlink_metadata(dest).ok();

    if fs::symlink_metadata(source)?.is_dir() {
        if dest_meta.is_some_and(|meta| !meta.is_dir()) {
            fs::remove_file(dest)?;
        }
        fs::create_dir_all(dest)?;
        for entry in fs::read_dir(source)? {
            let entry = entry?;
            overlay(&entry.path(), &dest.join(entry.file_name()))?;
        }
        return Ok(());
    }

    if dest_meta.is_some_and(|meta| meta.is_dir()) {
        fs::remove_dir_all(dest)?;
    }
    move_file(source, dest)
}

fn move_file(source: &Path, dest: &Path) -> Result<()> {
    match fs::rename(source, dest) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(source, dest)?;
            fs::remove_file(source)?;
            Ok(())
        }
        Err(err) => Err(ProvisionError::Io(err)),
    }
}

fn local_path_from_url(url: &str) -> Option<PathBuf> {
    if let Some(path) = url.strip_prefix("file://") {
        let path = path.strip_prefix("localhost/").unwrap_or(path);
        return Some(PathBuf::from(path));
    }
    None
}

fn resolve_local_path(url: &str) -> Option<PathBuf> {
    if let Some(path) = local_path_from_url(url) {
        return Some(path);
    }

    if url.starts_with("http://") || url.starts_with("https://") {
        return None;
    }

    Some(PathBuf::from(url))
}

fn ensure_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}
