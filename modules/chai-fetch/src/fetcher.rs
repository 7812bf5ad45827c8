use std::io::Cursor;
use std::path::{Path, PathBuf};

use chrono::Utc;
use flate2::read::GzDecoder;
use tracing::{info, warn};

use crate::error::{FetchError, Result};

/// How to turn a source URL into a directory of extracted files. The three
/// kinds the Fetcher contract (spec.md §6) requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Tarball,
    Gzip,
    GitClone,
}

/// Result of one fetch: where the files landed, and whether this was a
/// fresh download or a reuse of the last fetched snapshot (`FETCH=false`).
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub dir: PathBuf,
    pub reused: bool,
}

/// Ecosystem-agnostic download/unpack abstraction. One instance is shared
/// across pipelines; each call is scoped to a single `(pm_name, source_url)`
/// pair.
#[derive(Clone)]
pub struct Fetcher {
    data_root: PathBuf,
    http: reqwest::Client,
}

impl Fetcher {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Fetch `source_url` for package manager `pm_name`, writing extracted
    /// files under `<data_root>/<pm_name>/<ISO8601-timestamp>/` and flipping
    /// the `latest` symlink only once every file is in place — the symlink
    /// flip is the commit point (spec.md §6).
    pub async fn fetch(&self, pm_name: &str, source_url: &str, kind: FetchKind) -> Result<FetchOutcome> {
        let pm_root = self.data_root.join(pm_name);
        tokio::fs::create_dir_all(&pm_root).await?;

        let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S%.fZ").to_string();
        let target_dir = pm_root.join(&timestamp);
        tokio::fs::create_dir_all(&target_dir).await?;

        info!(pm_name, source_url, kind = ?kind, dir = %target_dir.display(), "Fetching");

        match kind {
            FetchKind::Tarball => self.fetch_tarball(source_url, &target_dir).await?,
            FetchKind::Gzip => self.fetch_gzip(source_url, &target_dir).await?,
            FetchKind::GitClone => self.fetch_git_clone(source_url, &target_dir).await?,
        }

        self.flip_latest(&pm_root, &target_dir).await?;

        info!(pm_name, dir = %target_dir.display(), "Fetch complete");
        Ok(FetchOutcome { dir: target_dir, reused: false })
    }

    /// `FETCH=false`: reuse whatever `latest` currently points at instead of
    /// hitting the network.
    pub async fn reuse_last(&self, pm_name: &str) -> Result<FetchOutcome> {
        let latest = self.data_root.join(pm_name).join("latest");
        let target = tokio::fs::read_link(&latest)
            .await
            .map_err(|_| FetchError::NoPriorFetch(pm_name.to_string()))?;
        Ok(FetchOutcome { dir: target, reused: true })
    }

    /// `NO_CACHE=true`: remove the timestamped directory after a successful
    /// ingest. Never removes the `latest` symlink itself — only the pipeline
    /// that just ingested this snapshot calls this, after `ingest()` commits.
    pub async fn cleanup(&self, dir: &Path) -> Result<()> {
        if dir.exists() {
            tokio::fs::remove_dir_all(dir).await?;
        }
        Ok(())
    }

    async fn fetch_tarball(&self, url: &str, target_dir: &Path) -> Result<()> {
        let bytes = self.download(url).await?;
        let target_dir = target_dir.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let decoder = GzDecoder::new(Cursor::new(bytes));
            let mut archive = tar::Archive::new(decoder);
            archive
                .unpack(&target_dir)
                .map_err(|e| FetchError::Extract(e.to_string()))
        })
        .await
        .map_err(|e| FetchError::Extract(e.to_string()))??;
        Ok(())
    }

    async fn fetch_gzip(&self, url: &str, target_dir: &Path) -> Result<()> {
        let bytes = self.download(url).await?;
        let file_name = url
            .rsplit('/')
            .next()
            .unwrap_or("download")
            .trim_end_matches(".gz")
            .to_string();
        let dest = target_dir.join(file_name);
        let decoded = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            use std::io::Read;
            let mut decoder = GzDecoder::new(Cursor::new(bytes));
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| FetchError::Extract(e.to_string()))?;
            Ok(out)
        })
        .await
        .map_err(|e| FetchError::Extract(e.to_string()))??;
        tokio::fs::write(dest, decoded).await?;
        Ok(())
    }

    async fn fetch_git_clone(&self, url: &str, target_dir: &Path) -> Result<()> {
        let url = url.to_string();
        let target_dir = target_dir.to_path_buf();
        tokio::task::spawn_blocking(move || {
            git2::Repository::clone(&url, &target_dir).map(|_| ())
        })
        .await
        .map_err(|e| FetchError::Extract(e.to_string()))?
        .map_err(|source| FetchError::GitClone { url: url_for_error(&target_dir), source })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http.get(url).send().await.map_err(|source| FetchError::Transient {
            url: url.to_string(),
            source,
        })?;

        if !response.status().is_success() {
            return Err(FetchError::BadStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|source| FetchError::Transient { url: url.to_string(), source })
    }

    /// Atomically point `<pm_root>/latest` at `target_dir`: write a new
    /// symlink under a temp name, then rename over the old one. The rename
    /// is the commit point — readers never observe a half-updated symlink.
    async fn flip_latest(&self, pm_root: &Path, target_dir: &Path) -> Result<()> {
        let latest = pm_root.join("latest");
        let staging = pm_root.join(format!(".latest-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default()));

        tokio::fs::symlink(target_dir, &staging).await?;

        match tokio::fs::rename(&staging, &latest).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Failed to flip latest symlink");
                let _ = tokio::fs::remove_file(&staging).await;
                Err(FetchError::Io(e))
            }
        }
    }
}

fn url_for_error(target_dir: &Path) -> String {
    target_dir.display().to_string()
}
