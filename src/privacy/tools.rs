//! Tor tool acquisition.
//!
//! Resolution order: explicit configured path, system PATH, a previously
//! extracted bundle in the tools directory, and finally (unless disabled)
//! downloading the platform's tor expert bundle and unpacking it. Any
//! failure along the download/unpack path is a `ToolAcquisition` error and
//! is fatal for the current fallback attempt.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use super::config::TorConfig;
use super::tor::TorError;

/// Pinned tor expert bundle release.
const BUNDLE_VERSION: &str = "14.0.4";

/// Timeout for the bundle download.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

#[cfg(windows)]
const TOR_EXECUTABLE: &str = "tor.exe";

#[cfg(not(windows))]
const TOR_EXECUTABLE: &str = "tor";

/// Bundle archive URL for the current platform.
fn default_bundle_url() -> Result<String, TorError> {
    let platform = if cfg!(target_os = "linux") && cfg!(target_arch = "x86_64") {
        "linux-x86_64"
    } else if cfg!(target_os = "linux") && cfg!(target_arch = "x86") {
        "linux-i686"
    } else if cfg!(target_os = "macos") && cfg!(target_arch = "aarch64") {
        "macos-aarch64"
    } else if cfg!(target_os = "macos") && cfg!(target_arch = "x86_64") {
        "macos-x86_64"
    } else if cfg!(target_os = "windows") && cfg!(target_arch = "x86_64") {
        "windows-x86_64"
    } else if cfg!(target_os = "windows") && cfg!(target_arch = "x86") {
        "windows-i686"
    } else {
        return Err(TorError::ToolAcquisition(
            "no tor expert bundle available for this platform".to_string(),
        ));
    };

    Ok(format!(
        "https://archive.torproject.org/tor-package-archive/torbrowser/{version}/tor-expert-bundle-{platform}-{version}.tar.gz",
        version = BUNDLE_VERSION,
        platform = platform,
    ))
}

/// Locate a usable tor binary, downloading the tool bundle if necessary.
pub async fn ensure_tor_binary(config: &TorConfig) -> Result<PathBuf, TorError> {
    // Explicit path wins, but must exist.
    if let Some(ref path) = config.tor_binary {
        if path.exists() {
            return Ok(path.clone());
        }
        return Err(TorError::ToolAcquisition(format!(
            "configured tor binary not found: {}",
            path.display()
        )));
    }

    // System install.
    if let Ok(path) = which::which(TOR_EXECUTABLE) {
        debug!("using system tor at {}", path.display());
        return Ok(path);
    }

    // Previously extracted bundle.
    let tools_dir = config.tools_dir();
    let extracted_dir = tools_dir.join("extracted");
    if let Some(path) = find_executable(&extracted_dir, TOR_EXECUTABLE) {
        debug!("using extracted tor at {}", path.display());
        return Ok(path);
    }

    if !config.auto_fetch_tools {
        return Err(TorError::ToolAcquisition(
            "tor binary not found and tool download is disabled".to_string(),
        ));
    }

    fetch_and_extract(config, &tools_dir, &extracted_dir).await?;

    find_executable(&extracted_dir, TOR_EXECUTABLE).ok_or_else(|| {
        TorError::ToolAcquisition(format!(
            "tor bundle extracted but no {} executable found under {}",
            TOR_EXECUTABLE,
            extracted_dir.display()
        ))
    })
}

/// Download the bundle archive and unpack it into the tools directory.
async fn fetch_and_extract(
    config: &TorConfig,
    tools_dir: &Path,
    extracted_dir: &Path,
) -> Result<(), TorError> {
    let url = match config.bundle_url {
        Some(ref url) => url.clone(),
        None => default_bundle_url()?,
    };

    fs::create_dir_all(tools_dir).map_err(|e| {
        TorError::ToolAcquisition(format!(
            "failed to create tools directory {}: {}",
            tools_dir.display(),
            e
        ))
    })?;

    info!("downloading tor bundle from {}", url);

    let client = reqwest::Client::builder()
        .user_agent(crate::fetch::USER_AGENT)
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .map_err(|e| TorError::ToolAcquisition(format!("failed to build download client: {}", e)))?;

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| TorError::ToolAcquisition(format!("failed to download {}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(TorError::ToolAcquisition(format!(
            "failed to download {}: server returned {}",
            url,
            response.status()
        )));
    }

    let archive = response
        .bytes()
        .await
        .map_err(|e| TorError::ToolAcquisition(format!("failed to download {}: {}", url, e)))?;

    let archive_path = tools_dir.join("tor-expert-bundle.tar.gz");
    fs::write(&archive_path, &archive).map_err(|e| {
        TorError::ToolAcquisition(format!(
            "failed to write {}: {}",
            archive_path.display(),
            e
        ))
    })?;

    info!(
        "extracting {} to {}",
        archive_path.display(),
        extracted_dir.display()
    );

    // Extraction is blocking filesystem work.
    let archive_path_cloned = archive_path.clone();
    let extracted_dir_cloned = extracted_dir.to_path_buf();
    tokio::task::spawn_blocking(move || extract_tar_gz(&archive_path_cloned, &extracted_dir_cloned))
        .await
        .map_err(|e| TorError::ToolAcquisition(format!("extraction task failed: {}", e)))??;

    Ok(())
}

/// Unpack a .tar.gz archive into `dest`.
fn extract_tar_gz(archive_path: &Path, dest: &Path) -> Result<(), TorError> {
    fs::create_dir_all(dest).map_err(|e| {
        TorError::ToolAcquisition(format!(
            "failed to create extraction directory {}: {}",
            dest.display(),
            e
        ))
    })?;

    let file = fs::File::open(archive_path).map_err(|e| {
        TorError::ToolAcquisition(format!("failed to open {}: {}", archive_path.display(), e))
    })?;

    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);
    archive.unpack(dest).map_err(|e| {
        TorError::ToolAcquisition(format!(
            "failed to extract {}: {}",
            archive_path.display(),
            e
        ))
    })?;

    Ok(())
}

/// Recursively search `dir` for an executable file with the given name.
///
/// Each real directory is visited at most once, so a symlink loop in the
/// extracted tree terminates the search instead of hanging it.
fn find_executable(dir: &Path, name: &str) -> Option<PathBuf> {
    let mut visited = HashSet::new();
    find_executable_inner(dir, name, &mut visited)
}

fn find_executable_inner(
    dir: &Path,
    name: &str,
    visited: &mut HashSet<PathBuf>,
) -> Option<PathBuf> {
    let canonical = fs::canonicalize(dir).ok()?;
    if !visited.insert(canonical) {
        return None;
    }

    let entries = fs::read_dir(dir).ok()?;

    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file()
            && path.file_name() == Some(std::ffi::OsStr::new(name))
            && is_executable(&path)
        {
            return Some(path);
        }
        if path.is_dir() {
            subdirs.push(path);
        }
    }

    subdirs
        .iter()
        .find_map(|sub| find_executable_inner(sub, name, visited))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|meta| meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_configured_binary_is_acquisition_failure() {
        let config = TorConfig {
            tor_binary: Some(PathBuf::from("/nonexistent/tor")),
            ..Default::default()
        };

        let err = ensure_tor_binary(&config).await.unwrap_err();
        assert!(matches!(err, TorError::ToolAcquisition(_)));
        assert!(err.to_string().contains("/nonexistent/tor"));
    }

    #[tokio::test]
    async fn test_fetch_disabled_is_acquisition_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let config = TorConfig {
            tools_dir: Some(tmp.path().to_path_buf()),
            auto_fetch_tools: false,
            ..Default::default()
        };

        // Only meaningful on hosts without a system tor.
        if which::which(TOR_EXECUTABLE).is_ok() {
            return;
        }

        let err = ensure_tor_binary(&config).await.unwrap_err();
        assert!(matches!(err, TorError::ToolAcquisition(_)));
        assert!(err.to_string().contains("download is disabled"));
    }

    #[tokio::test]
    async fn test_explicit_binary_used_without_download() {
        let tmp = tempfile::tempdir().unwrap();
        let binary = tmp.path().join("tor");
        fs::write(&binary, b"#!/bin/sh\n").unwrap();

        let config = TorConfig {
            tor_binary: Some(binary.clone()),
            ..Default::default()
        };

        assert_eq!(ensure_tor_binary(&config).await.unwrap(), binary);
    }

    fn write_executable(path: &Path, contents: &[u8]) {
        fs::write(path, contents).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
        }
    }

    #[test]
    fn test_find_executable_searches_subdirectories() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("bundle").join("tor");
        fs::create_dir_all(&nested).unwrap();
        write_executable(&nested.join("tor"), b"");

        let found = find_executable(tmp.path(), "tor").unwrap();
        assert_eq!(found, nested.join("tor"));
    }

    #[cfg(unix)]
    #[test]
    fn test_find_executable_skips_files_without_exec_bit() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("tor"), b"not a binary").unwrap();

        assert_eq!(find_executable(tmp.path(), "tor"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_find_executable_terminates_on_symlink_loop() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("bundle");
        fs::create_dir_all(&nested).unwrap();
        std::os::unix::fs::symlink(tmp.path(), nested.join("loop")).unwrap();

        assert_eq!(find_executable(tmp.path(), "tor"), None);
    }
}
