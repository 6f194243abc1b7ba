//! Fetches and unpacks OpenShift release binaries from the mirror.
//!
//! The mirror publishes `sha256sum.txt` next to every archive. An archive
//! already in the download directory is reused when its digest matches;
//! otherwise it is downloaded again, at most twice.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use stackfleet_config::OpenShiftConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::{FleetError, Result};

pub const SHA256SUMS: &str = "sha256sum.txt";

const DOWNLOAD_ATTEMPTS: u32 = 2;
const HASH_BUFFER: usize = 64 * 1024;

/// Parses `sha256sum` output into a map from file name to hex digest.
pub fn parse_sha256sums(contents: &str) -> BTreeMap<String, String> {
    contents
        .lines()
        .filter_map(|line| {
            let (hash, name) = line.trim().split_once(char::is_whitespace)?;
            // binary-mode entries are prefixed with '*'
            let name = name.trim_start().trim_start_matches('*');
            (!hash.is_empty() && !name.is_empty())
                .then(|| (name.to_string(), hash.to_lowercase()))
        })
        .collect()
}

pub async fn sha256_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone)]
pub struct Toolchain {
    client: reqwest::Client,
    openshift: OpenShiftConfig,
    download_dir: PathBuf,
}

impl Toolchain {
    pub fn new(
        client: reqwest::Client,
        openshift: OpenShiftConfig,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            openshift,
            download_dir: download_dir.into(),
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Makes `binary` available in the download directory and returns its
    /// path.
    pub async fn ensure(&self, binary: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.download_dir).await?;
        let release = self.openshift.release_url();
        let package = self.openshift.package_name(binary);

        let sums_path = self.download_dir.join(SHA256SUMS);
        self.download(&format!("{release}{SHA256SUMS}"), &sums_path)
            .await?;
        let sums = parse_sha256sums(&tokio::fs::read_to_string(&sums_path).await?);
        let expected = sums.get(&package).cloned().ok_or_else(|| {
            FleetError::MissingInput(format!("{package} not listed in {SHA256SUMS}"))
        })?;

        let archive = self.download_dir.join(&package);
        self.verified_archive(&format!("{release}{package}"), &archive, &expected)
            .await?;

        let binary_path = self.download_dir.join(binary);
        if !tokio::fs::try_exists(&binary_path).await? {
            info!(archive = %archive.display(), "extracting release archive");
            let dest = self.download_dir.clone();
            tokio::task::spawn_blocking(move || extract_archive(&archive, &dest))
                .await
                .map_err(std::io::Error::other)??;
        }
        Ok(binary_path)
    }

    async fn verified_archive(
        &self,
        url: &str,
        archive: &Path,
        expected: &str,
    ) -> Result<()> {
        if tokio::fs::try_exists(archive).await?
            && sha256_file(archive).await? == expected
        {
            debug!(archive = %archive.display(), "archive already present");
            return Ok(());
        }

        let mut actual = String::new();
        for attempt in 1..=DOWNLOAD_ATTEMPTS {
            info!(url, attempt, "downloading release archive");
            self.download(url, archive).await?;
            actual = sha256_file(archive).await?;
            if actual == expected {
                return Ok(());
            }
            warn!(
                archive = %archive.display(),
                %expected,
                %actual,
                attempt,
                "checksum mismatch"
            );
        }

        Err(FleetError::ChecksumMismatch {
            file: archive.display().to_string(),
            expected: expected.to_string(),
            actual,
        })
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

fn extract_archive(archive: &Path, dest: &Path) -> std::io::Result<()> {
    let file = std::fs::File::open(archive)?;
    let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(file));
    tar.unpack(dest)
}
