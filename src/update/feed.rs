//! HTTP JSON feed implementation of the update-client.
//!
//! The feed is a single JSON document describing the latest release:
//!
//! ```json
//! {"version": "1.4.0", "releaseNotes": "…", "releaseDate": "…",
//!  "url": "https://…/app-1.4.0", "sha256": "…", "size": 1048576}
//! ```
//!
//! Only `version` and `url` are required. The document is passed through
//! untouched as the raw payload of `Available` / `NotAvailable` /
//! `Downloaded` events.

use crate::config::UpdateConfig;
use crate::error::{Result, ShellError};
use crate::update::applier::{Installer, StagedUpdate};
use crate::update::client::{EventListener, UpdateClient, UpdateClientEvent};
use crate::update::listeners::{ListenerSet, Subscription};
use crate::update::types::UpdateProgress;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Minimum spacing between two progress reports.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Deserialize)]
struct FeedRelease {
    version: String,
    url: String,
    #[serde(default)]
    sha256: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Default)]
struct FeedState {
    available: Option<(FeedRelease, serde_json::Value)>,
    staged: Option<StagedUpdate>,
}

/// Update-client backed by a JSON release feed.
pub struct FeedUpdateClient {
    feed_url: String,
    current_version: semver::Version,
    http: reqwest::Client,
    staging_dir: PathBuf,
    listeners: ListenerSet<UpdateClientEvent>,
    state: Mutex<FeedState>,
    installer: Arc<dyn Installer>,
    shutdown: CancellationToken,
    auto_install_on_quit: bool,
    downloading: AtomicBool,
}

/// Clears the in-flight download flag when the download ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for FeedUpdateClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedUpdateClient")
            .field("feed_url", &self.feed_url)
            .field("current_version", &self.current_version.to_string())
            .field("staging_dir", &self.staging_dir)
            .finish()
    }
}

impl FeedUpdateClient {
    /// Create a client for `feed_url`.
    ///
    /// `shutdown` is cancelled once `quit_and_install` has applied an update.
    ///
    /// # Errors
    ///
    /// Returns an error if `current_version` is not a valid version or the
    /// HTTP client cannot be built.
    pub fn new(
        feed_url: impl Into<String>,
        current_version: &str,
        installer: Arc<dyn Installer>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let current_version = parse_version(current_version)
            .map_err(|e| ShellError::Config(format!("invalid application version: {e}")))?;
        Ok(Self {
            feed_url: feed_url.into(),
            current_version,
            http: build_http_client(Duration::from_secs(30))?,
            staging_dir: crate::app_dirs::pending_update_dir(),
            listeners: ListenerSet::new(),
            state: Mutex::new(FeedState::default()),
            installer,
            shutdown,
            auto_install_on_quit: false,
            downloading: AtomicBool::new(false),
        })
    }

    /// Build from the `[update]` config section.
    ///
    /// # Errors
    ///
    /// Returns an error if `feed_url` is not configured.
    pub fn from_config(
        config: &UpdateConfig,
        current_version: &str,
        installer: Arc<dyn Installer>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let Some(feed_url) = config.feed_url.as_deref() else {
            return Err(ShellError::Config(
                "update.feed_url is not configured".to_owned(),
            ));
        };
        let client = Self::new(feed_url, current_version, installer, shutdown)?
            .with_timeout(Duration::from_secs(config.request_timeout_secs.max(1)))?
            .with_auto_install_on_quit(config.auto_install_on_quit);
        Ok(client)
    }

    /// Set the HTTP timeout for feed and artifact requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be rebuilt.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = build_http_client(timeout)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_auto_install_on_quit(mut self, enabled: bool) -> Self {
        self.auto_install_on_quit = enabled;
        self
    }

    /// The artifact staged by the last successful download, if any.
    #[must_use]
    pub fn staged_update(&self) -> Option<StagedUpdate> {
        self.state().staged.clone()
    }

    fn state(&self) -> MutexGuard<'_, FeedState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn emit(&self, event: UpdateClientEvent) {
        self.listeners.emit(&event);
    }

    async fn fetch_feed(&self) -> Result<serde_json::Value> {
        let resp = self
            .http
            .get(&self.feed_url)
            .send()
            .await
            .map_err(|e| ShellError::Check(format!("cannot reach update feed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ShellError::Check(format!(
                "update feed returned HTTP {status}"
            )));
        }

        resp.json()
            .await
            .map_err(|e| ShellError::Check(format!("invalid update feed response: {e}")))
    }

    /// Stream the artifact to `dest`, reporting progress. Returns the
    /// lowercase hex SHA-256 of the written bytes.
    async fn stream_artifact(&self, release: &FeedRelease, dest: &Path) -> Result<String> {
        let resp = self
            .http
            .get(&release.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ShellError::Download(format!("cannot fetch update artifact: {e}")))?;

        let total = resp.content_length().or(release.size).unwrap_or(0);
        let mut stream = resp.bytes_stream();
        let mut file = tokio::fs::File::create(dest).await.map_err(|e| {
            ShellError::Download(format!("cannot create {}: {e}", dest.display()))
        })?;

        let mut hasher = Sha256::new();
        let started = Instant::now();
        let mut last_report: Option<Instant> = None;
        let mut reported = 0u64;
        let mut transferred = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| ShellError::Download(format!("download interrupted: {e}")))?;
            file.write_all(&chunk).await.map_err(|e| {
                ShellError::Download(format!("cannot write {}: {e}", dest.display()))
            })?;
            hasher.update(&chunk);
            transferred += chunk.len() as u64;

            if last_report.is_none_or(|t| t.elapsed() >= PROGRESS_INTERVAL) {
                self.report_progress(transferred, total, started);
                last_report = Some(Instant::now());
                reported = transferred;
            }
        }

        file.flush()
            .await
            .map_err(|e| ShellError::Download(format!("cannot flush {}: {e}", dest.display())))?;

        if reported != transferred || last_report.is_none() {
            self.report_progress(transferred, total, started);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }

    fn report_progress(&self, transferred: u64, total: u64, started: Instant) {
        let elapsed = started.elapsed().as_secs_f64().max(1e-3);
        let progress = UpdateProgress::from_bytes(transferred, total, transferred as f64 / elapsed);
        debug!(
            percent = progress.percent,
            transferred, total, "update download progress"
        );
        self.emit(UpdateClientEvent::DownloadProgress(progress));
    }
}

#[async_trait]
impl UpdateClient for FeedUpdateClient {
    fn subscribe(&self, listener: EventListener) -> Subscription {
        self.listeners.subscribe(listener)
    }

    async fn check_for_updates(&self) -> Result<()> {
        self.emit(UpdateClientEvent::Checking);

        let raw = self.fetch_feed().await?;
        let release: FeedRelease = serde_json::from_value(raw.clone())
            .map_err(|e| ShellError::Check(format!("invalid update feed: {e}")))?;
        let remote = parse_version(&release.version).map_err(|e| {
            ShellError::Check(format!("invalid release version `{}`: {e}", release.version))
        })?;

        if remote > self.current_version {
            info!(current = %self.current_version, latest = %remote, "update available");
            self.state().available = Some((release, raw.clone()));
            self.emit(UpdateClientEvent::Available(raw));
        } else {
            info!(current = %self.current_version, "no update available");
            self.state().available = None;
            self.emit(UpdateClientEvent::NotAvailable(raw));
        }
        Ok(())
    }

    /// Downloads into `<name>.part` and renames over the final name only
    /// after verification, so a failed download never touches an artifact
    /// that is already staged. A second call while one is running fails.
    async fn download_update(&self) -> Result<()> {
        let available = self.state().available.clone();
        let Some((release, raw)) = available else {
            return Err(ShellError::Download(
                "no update available to download".to_owned(),
            ));
        };
        let Some(_in_flight) = InFlight::acquire(&self.downloading) else {
            return Err(ShellError::Download(
                "update download already in progress".to_owned(),
            ));
        };

        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(|e| {
                ShellError::Download(format!(
                    "cannot create staging dir {}: {e}",
                    self.staging_dir.display()
                ))
            })?;
        let file_name = artifact_file_name(&release.url, &release.version);
        let dest = self.staging_dir.join(&file_name);
        let partial = self.staging_dir.join(format!("{file_name}.part"));

        info!(version = %release.version, url = %release.url, "downloading update");
        let digest = match self.stream_artifact(&release, &partial).await {
            Ok(digest) => digest,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        if let Some(expected) = release.sha256.as_deref()
            && !expected.trim().eq_ignore_ascii_case(&digest)
        {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(ShellError::Download(format!(
                "checksum mismatch for {}: expected {}, got {digest}",
                release.version,
                expected.trim()
            )));
        }

        if let Err(e) = tokio::fs::rename(&partial, &dest).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(ShellError::Download(format!(
                "cannot move download into place at {}: {e}",
                dest.display()
            )));
        }

        info!(version = %release.version, path = %dest.display(), "update downloaded");
        self.state().staged = Some(StagedUpdate {
            version: release.version.clone(),
            path: dest,
        });
        self.emit(UpdateClientEvent::Downloaded(raw));
        Ok(())
    }

    /// Applies the staged artifact and cancels the shutdown token.
    ///
    /// With nothing staged this is a no-op: it logs a warning and leaves the
    /// application running.
    fn quit_and_install(&self) -> Result<()> {
        let staged = self.state().staged.clone();
        let Some(staged) = staged else {
            warn!("quit_and_install requested with no downloaded update; ignoring");
            return Ok(());
        };

        let result = self.installer.install(&staged)?;
        info!(version = %staged.version, ?result, "update installed; shutting down");
        self.state().staged = None;
        self.shutdown.cancel();
        Ok(())
    }

    fn install_on_quit(&self) -> Result<()> {
        if !self.auto_install_on_quit {
            debug!("install on quit disabled");
            return Ok(());
        }
        let staged = self.state().staged.take();
        if let Some(staged) = staged {
            let result = self.installer.install(&staged)?;
            info!(version = %staged.version, ?result, "update installed on quit");
        }
        Ok(())
    }

    fn current_version(&self) -> String {
        self.current_version.to_string()
    }
}

fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("shellkit/", env!("CARGO_PKG_VERSION"), " (self-update)"))
        .build()
        .map_err(|e| ShellError::Config(format!("cannot build HTTP client: {e}")))
}

/// Parse a release version, accepting a leading `v`.
fn parse_version(raw: &str) -> std::result::Result<semver::Version, semver::Error> {
    let trimmed = raw.trim();
    semver::Version::parse(trimmed.strip_prefix('v').unwrap_or(trimmed))
}

/// Pick a local file name for the artifact from the last URL segment.
fn artifact_file_name(url: &str, version: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(ToOwned::to_owned))
        })
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .unwrap_or_else(|| format!("update-{version}"))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn parse_version_accepts_v_prefix() {
        assert_eq!(
            parse_version("v1.2.0").unwrap(),
            semver::Version::new(1, 2, 0)
        );
        assert_eq!(
            parse_version(" 0.4.1 ").unwrap(),
            semver::Version::new(0, 4, 1)
        );
        assert!(parse_version("1.2").is_err());
    }

    #[test]
    fn prerelease_is_older_than_release() {
        assert!(parse_version("1.0.0-beta.1").unwrap() < parse_version("1.0.0").unwrap());
    }

    #[test]
    fn artifact_file_name_uses_last_segment() {
        assert_eq!(
            artifact_file_name("https://example.com/releases/app-1.2.0.tar.gz", "1.2.0"),
            "app-1.2.0.tar.gz"
        );
    }

    #[test]
    fn artifact_file_name_falls_back_to_version() {
        assert_eq!(
            artifact_file_name("https://example.com/", "1.2.0"),
            "update-1.2.0"
        );
        assert_eq!(artifact_file_name("not a url", "2.0.0"), "update-2.0.0");
    }

    #[test]
    fn feed_release_ignores_unknown_fields() {
        let release: FeedRelease = serde_json::from_value(serde_json::json!({
            "version": "1.0.0",
            "url": "https://example.com/app",
            "releaseNotes": ["not", "a", "string"],
            "channel": "stable"
        }))
        .unwrap();
        assert_eq!(release.version, "1.0.0");
        assert!(release.sha256.is_none());
    }
}
