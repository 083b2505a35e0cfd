//! Artifact provider: ensures the VM images a run needs exist locally and
//! verify against their expected checksums.
//!
//! Two acquisition modes: build (invoke the external image builder per
//! artifact) and download (fetch prebuilt archives from the mirror). A
//! missing or unverified artifact blocks host bring-up; there is no silent
//! fallback between modes.

use async_trait::async_trait;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::Backend;
use crate::collaborators::ImageBuilder;
use crate::errors::{ArtifactError, ArtifactErrorReason, DeployError};

/// The artifacts every run requires, in acquisition order.
pub const ARTIFACT_NAMES: [&str; 2] = ["windows_10", "windows_2016"];

/// Base URL of the prebuilt artifact mirror.
pub const MIRROR_BASE_URL: &str = "https://mirror.labdeploy.net/boxes";

/// Expected MD5 checksum for an artifact, keyed by backend and name.
#[must_use]
pub fn expected_checksum(backend: Backend, artifact: &str) -> Option<&'static str> {
    match (backend, artifact) {
        (Backend::Virtualbox, "windows_10") => Some("5c6e9b47338d3fbad04f5e1c83a74cf8"),
        (Backend::Virtualbox, "windows_2016") => Some("f2a16a4fd4e2a5e1bb6d26e27a1e2c1d"),
        (Backend::Vmware, "windows_10") => Some("c8c30eaa80ed23d85d54e9e6aa8ab3df"),
        (Backend::Vmware, "windows_2016") => Some("9a0fda21c0a62d4b0071e86b6efdbda7"),
        _ => None,
    }
}

/// How artifacts are acquired for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionMode {
    /// Invoke the external image builder per artifact.
    Build,
    /// Download prebuilt archives from the mirror.
    Download,
}

/// Tracks one artifact through acquisition and verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// The artifact name (template name without extension).
    pub name: String,
    /// The checksum the local file must match.
    pub expected_checksum: String,
    /// Where the verified file lives, once acquired.
    pub local_path: Option<PathBuf>,
    /// Whether the artifact has been verified this run.
    pub verified: bool,
}

impl ArtifactRecord {
    /// Creates an unverified record.
    #[must_use]
    pub fn new(name: impl Into<String>, expected_checksum: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expected_checksum: expected_checksum.into(),
            local_path: None,
            verified: false,
        }
    }

    /// The records a run needs for the given backend.
    #[must_use]
    pub fn for_backend(backend: Backend) -> Vec<Self> {
        ARTIFACT_NAMES
            .iter()
            .map(|name| {
                Self::new(*name, expected_checksum(backend, name).unwrap_or_default())
            })
            .collect()
    }
}

/// Downloads an artifact to a local destination.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync + Debug {
    /// Fetches `url` into `dest`, creating the file.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), String>;
}

/// [`ArtifactFetcher`] backed by an HTTPS client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a new HTTP fetcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), String> {
        tracing::info!(url, dest = %dest.display(), "downloading artifact");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| e.to_string())?;
        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        tokio::fs::write(dest, &bytes).await.map_err(|e| e.to_string())
    }
}

/// Ensures required artifacts exist locally and are verified.
#[derive(Debug, Clone)]
pub struct ArtifactProvider {
    mode: AcquisitionMode,
    backend: Backend,
    builder: ImageBuilder,
    fetcher: Arc<dyn ArtifactFetcher>,
    artifact_dir: PathBuf,
}

impl ArtifactProvider {
    /// Creates a new artifact provider.
    #[must_use]
    pub fn new(
        mode: AcquisitionMode,
        backend: Backend,
        builder: ImageBuilder,
        fetcher: Arc<dyn ArtifactFetcher>,
        artifact_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            mode,
            backend,
            builder,
            fetcher,
            artifact_dir: artifact_dir.into(),
        }
    }

    /// Ensures every record is acquired and verified.
    ///
    /// Idempotent: records already marked verified are skipped without any
    /// build or network call.
    pub async fn ensure(&self, records: &mut [ArtifactRecord]) -> Result<(), DeployError> {
        tokio::fs::create_dir_all(&self.artifact_dir).await?;

        for record in records.iter_mut() {
            if record.verified {
                tracing::debug!(artifact = %record.name, "already verified, skipping");
                continue;
            }
            match self.mode {
                AcquisitionMode::Build => self.ensure_built(record).await?,
                AcquisitionMode::Download => self.ensure_downloaded(record).await?,
            }
        }

        Ok(())
    }

    async fn ensure_built(&self, record: &mut ArtifactRecord) -> Result<(), DeployError> {
        tracing::info!(artifact = %record.name, "building image");
        let output = self.builder.build(&record.name, self.backend).await?;
        if !output.success() {
            return Err(ArtifactError::new(
                &record.name,
                ArtifactErrorReason::BuildFailed {
                    exit_signal: output.exit_signal,
                },
            )
            .into());
        }

        let file_name = self.backend.artifact_file_name(&record.name);
        let produced = self.builder.output_dir().join(&file_name);
        let dest = self.artifact_dir.join(&file_name);

        if tokio::fs::try_exists(&produced).await? {
            tokio::fs::rename(&produced, &dest).await?;
        }
        if !tokio::fs::try_exists(&dest).await? {
            return Err(ArtifactError::new(
                &record.name,
                ArtifactErrorReason::MissingAfterBuild { path: dest },
            )
            .into());
        }

        record.local_path = Some(dest);
        record.verified = true;
        Ok(())
    }

    async fn ensure_downloaded(&self, record: &mut ArtifactRecord) -> Result<(), DeployError> {
        let file_name = self.backend.artifact_file_name(&record.name);
        let dest = self.artifact_dir.join(&file_name);

        if tokio::fs::try_exists(&dest).await? {
            let actual = md5_file(&dest).await?;
            if actual == record.expected_checksum {
                tracing::info!(artifact = %record.name, "local copy matches checksum, skipping download");
                record.local_path = Some(dest);
                record.verified = true;
                return Ok(());
            }
            tracing::warn!(artifact = %record.name, "local copy fails checksum, re-downloading");
        }

        let url = format!("{MIRROR_BASE_URL}/{file_name}");
        self.fetcher.fetch(&url, &dest).await.map_err(|detail| {
            ArtifactError::new(&record.name, ArtifactErrorReason::DownloadFailed { detail })
        })?;

        let actual = md5_file(&dest).await?;
        if actual != record.expected_checksum {
            return Err(ArtifactError::new(
                &record.name,
                ArtifactErrorReason::ChecksumMismatch {
                    expected: record.expected_checksum.clone(),
                    actual,
                },
            )
            .into());
        }

        record.local_path = Some(dest);
        record.verified = true;
        Ok(())
    }
}

/// MD5 digest of a byte slice as lowercase hex.
#[must_use]
pub fn md5_hex(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// MD5 digest of a file's contents as lowercase hex.
pub async fn md5_file(path: &Path) -> std::io::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(md5_hex(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockFetcher, ScriptedRunner};
    use crate::exec::CommandOutput;

    fn provider(
        mode: AcquisitionMode,
        runner: Arc<ScriptedRunner>,
        fetcher: Arc<MockFetcher>,
        dir: &Path,
    ) -> ArtifactProvider {
        let builder = ImageBuilder::new(runner, "packer", dir.join("packer"));
        ArtifactProvider::new(mode, Backend::Virtualbox, builder, fetcher, dir.join("boxes"))
    }

    #[tokio::test]
    async fn test_download_skips_matching_local_copy() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedRunner::new());
        let fetcher = Arc::new(MockFetcher::new());

        let boxes = tmp.path().join("boxes");
        std::fs::create_dir_all(&boxes).expect("mkdir");
        std::fs::write(boxes.join("windows_10_virtualbox.box"), b"image bytes").expect("write");

        let mut records = vec![ArtifactRecord::new("windows_10", md5_hex(b"image bytes"))];
        provider(AcquisitionMode::Download, runner, fetcher.clone(), tmp.path())
            .ensure(&mut records)
            .await
            .expect("local copy verifies");

        assert!(records[0].verified);
        assert_eq!(fetcher.fetched_urls().len(), 0);
    }

    #[tokio::test]
    async fn test_download_fetches_missing_artifact() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedRunner::new());
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.serve("windows_10_virtualbox.box", b"image bytes".to_vec());

        let mut records = vec![ArtifactRecord::new("windows_10", md5_hex(b"image bytes"))];
        provider(AcquisitionMode::Download, runner, fetcher.clone(), tmp.path())
            .ensure(&mut records)
            .await
            .expect("download verifies");

        assert!(records[0].verified);
        assert_eq!(
            fetcher.fetched_urls(),
            vec![format!("{MIRROR_BASE_URL}/windows_10_virtualbox.box")]
        );
        assert_eq!(
            records[0].local_path,
            Some(tmp.path().join("boxes/windows_10_virtualbox.box"))
        );
    }

    #[tokio::test]
    async fn test_download_checksum_mismatch_is_fatal() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedRunner::new());
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.serve("windows_10_virtualbox.box", b"corrupted".to_vec());

        let mut records = vec![ArtifactRecord::new("windows_10", md5_hex(b"image bytes"))];
        let err = provider(AcquisitionMode::Download, runner, fetcher, tmp.path())
            .ensure(&mut records)
            .await
            .expect_err("checksum mismatch");

        assert!(matches!(
            err,
            DeployError::Artifact(ArtifactError {
                reason: ArtifactErrorReason::ChecksumMismatch { .. },
                ..
            })
        ));
        assert!(!records[0].verified);
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent_for_verified_records() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedRunner::new());
        let fetcher = Arc::new(MockFetcher::new());

        let mut records = vec![ArtifactRecord {
            name: "windows_10".to_string(),
            expected_checksum: "irrelevant".to_string(),
            local_path: None,
            verified: true,
        }];

        provider(AcquisitionMode::Download, runner.clone(), fetcher.clone(), tmp.path())
            .ensure(&mut records)
            .await
            .expect("verified record skipped");

        assert_eq!(fetcher.fetched_urls().len(), 0);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_build_relocates_produced_artifact() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedRunner::new());
        let fetcher = Arc::new(MockFetcher::new());

        let output_dir = tmp.path().join("packer/output");
        std::fs::create_dir_all(&output_dir).expect("mkdir");
        std::fs::write(output_dir.join("windows_10_virtualbox.box"), b"built").expect("write");

        let mut records = vec![ArtifactRecord::new("windows_10", "")];
        provider(AcquisitionMode::Build, runner.clone(), fetcher, tmp.path())
            .ensure(&mut records)
            .await
            .expect("build succeeds");

        assert!(records[0].verified);
        assert!(tmp.path().join("boxes/windows_10_virtualbox.box").exists());
        assert!(!output_dir.join("windows_10_virtualbox.box").exists());
        assert!(runner.calls()[0].starts_with("packer build -only=virtualbox-iso"));
    }

    #[tokio::test]
    async fn test_build_failure_is_fatal() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("packer build", CommandOutput::failed(1));
        let fetcher = Arc::new(MockFetcher::new());

        let mut records = vec![ArtifactRecord::new("windows_10", "")];
        let err = provider(AcquisitionMode::Build, runner, fetcher, tmp.path())
            .ensure(&mut records)
            .await
            .expect_err("build failed");
        assert!(matches!(
            err,
            DeployError::Artifact(ArtifactError {
                reason: ArtifactErrorReason::BuildFailed { exit_signal: 1 },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_build_missing_output_is_fatal() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedRunner::new());
        let fetcher = Arc::new(MockFetcher::new());

        let mut records = vec![ArtifactRecord::new("windows_10", "")];
        let err = provider(AcquisitionMode::Build, runner, fetcher, tmp.path())
            .ensure(&mut records)
            .await
            .expect_err("no file produced");
        assert!(matches!(
            err,
            DeployError::Artifact(ArtifactError {
                reason: ArtifactErrorReason::MissingAfterBuild { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_records_for_backend_carry_checksums() {
        let records = ArtifactRecord::for_backend(Backend::Vmware);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.expected_checksum.is_empty()));
        assert!(records.iter().all(|r| !r.verified));
    }

    #[test]
    fn test_md5_hex_known_value() {
        // md5 of the empty string.
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }
}
