//! Fetching tool binaries and release archives into the jx home directory

use anyhow::{Context, Result, anyhow};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tar::Archive;

use crate::utils::progress::DownloadProgress;

pub const GITHUB_API_URL: &str = "https://api.github.com";

/// `$JX_HOME`, falling back to `~/.jx`
pub fn jx_home() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("JX_HOME") {
        if !home.is_empty() {
            return Ok(PathBuf::from(home));
        }
    }
    let home = dirs::home_dir().ok_or_else(|| anyhow!("Could not determine home directory"))?;
    Ok(home.join(".jx"))
}

/// Directory downloaded binaries are placed in; created on demand
pub fn bin_dir() -> Result<PathBuf> {
    ensure_dir(jx_home()?.join("bin"))
}

/// Scratch directory for downloaded archives; created on demand
pub fn cache_dir() -> Result<PathBuf> {
    ensure_dir(jx_home()?.join("cache"))
}

fn ensure_dir(dir: PathBuf) -> Result<PathBuf> {
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    Ok(dir)
}

/// Latest release version of a GitHub repository, leading `v` stripped
pub async fn latest_github_release(owner: &str, repo: &str) -> Result<semver::Version> {
    latest_github_release_from(GITHUB_API_URL, owner, repo).await
}

pub async fn latest_github_release_from(
    api_url: &str,
    owner: &str,
    repo: &str,
) -> Result<semver::Version> {
    let url = format!("{}/repos/{}/{}/releases/latest", api_url, owner, repo);
    let release: serde_json::Value = reqwest::Client::new()
        .get(&url)
        .header("User-Agent", "jx")
        .send()
        .await
        .with_context(|| format!("Failed to fetch latest release of {}/{}", owner, repo))?
        .error_for_status()?
        .json()
        .await?;

    let tag = release["tag_name"]
        .as_str()
        .ok_or_else(|| anyhow!("No tag_name in latest release of {}/{}", owner, repo))?;

    semver::Version::parse(tag.trim_start_matches('v'))
        .with_context(|| format!("Invalid release version {}", tag))
}

/// Download `url` to `path`, replacing any existing file
pub async fn download_file(url: &str, path: &Path) -> Result<()> {
    crate::log_debug!("Downloading {} to {}", url, path.display());
    let name = url.rsplit('/').next().unwrap_or(url);
    let progress = DownloadProgress::new(&format!("Downloading {}", name));
    let result = fetch_to(url, path, &progress).await;
    match &result {
        Ok(()) => progress.finish_with_message(&format!("✓ Downloaded {}", name)),
        Err(_) => progress.finish(),
    }
    result
}

async fn fetch_to(url: &str, path: &Path, progress: &DownloadProgress) -> Result<()> {
    let bytes = reqwest::get(url)
        .await
        .with_context(|| format!("Failed to download {}", url))?
        .error_for_status()
        .with_context(|| format!("Failed to download {}", url))?
        .bytes()
        .await?;

    progress.set_message(&format!("Writing {}", path.display()));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, &bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Mark a downloaded binary executable
pub fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

/// Unpack a `.tar.gz` archive into `dest`
pub fn untar_gz(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)
        .with_context(|| format!("Failed to open archive {}", archive.display()))?;
    Archive::new(GzDecoder::new(file))
        .unpack(dest)
        .with_context(|| format!("Failed to extract {}", archive.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use httpmock::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn test_untar_gz() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("istio.tar.gz");

        let file = File::create(&archive_path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        let data = b"#!/bin/sh\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, "istio-1.0.0/bin/istioctl", &data[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let dest = dir.path().join("out");
        untar_gz(&archive_path, &dest).unwrap();
        assert!(dest.join("istio-1.0.0/bin/istioctl").exists());
    }

    #[test]
    fn test_untar_missing_archive() {
        let dir = tempdir().unwrap();
        assert!(untar_gz(&dir.path().join("nope.tar.gz"), dir.path()).is_err());
    }

    #[tokio::test]
    async fn test_latest_github_release() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/repos/istio/istio/releases/latest");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"tag_name":"v1.2.3"}"#);
        });

        let version = latest_github_release_from(&server.base_url(), "istio", "istio")
            .await
            .unwrap();
        mock.assert();
        assert_eq!(version, semver::Version::new(1, 2, 3));
    }

    #[tokio::test]
    async fn test_download_file() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/glooctl");
            then.status(200).body("binary");
        });

        let dir = tempdir().unwrap();
        let path = dir.path().join("bin/glooctl");
        download_file(&server.url("/glooctl"), &path).await.unwrap();
        make_executable(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "binary");
    }
}
