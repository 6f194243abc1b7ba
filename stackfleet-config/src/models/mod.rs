pub mod sources;

use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_INSTALL_BINARY: &str = "openshift-install";
pub const DEFAULT_CLIENT_BINARY: &str = "openshift-client";
pub const DEFAULT_DOWNLOAD_DIR: &str = "/tmp/";
pub const DEFAULT_SCALE_SCRIPT: &str = "./bin/openshift-4-scale-replicas";
pub const DEFAULT_INSTALL_CONFIG: &str = "install-config.yaml";

#[derive(Debug, Clone)]
pub struct Config {
    pub fleet: FleetConfig,
    pub openshift: OpenShiftConfig,
    pub student_template: Option<StudentTemplateLocation>,
    pub secrets: InstallSecrets,
    pub waiter: WaiterConfig,
    pub probe: ProbeConfig,
    pub rebuild: RebuildConfig,
    pub paths: PathsConfig,
    pub log_level: Option<String>,
    pub metadata: ConfigMetadata,
}

/// Fleet identity: names, size and the marker bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetConfig {
    pub cluster_name: String,
    pub num_students: u32,
    pub hosted_zone_name: String,
    pub auth_bucket: String,
    pub create_cloud9_instance: bool,
}

impl FleetConfig {
    /// Name of the EventBridge rule driving the validate pass.
    pub fn validate_rule_name(&self) -> String {
        format!("{}-ValidateEvent", self.cluster_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenShiftConfig {
    pub version: String,
    pub mirror_url: String,
    pub install_binary: String,
    pub client_binary: String,
}

impl OpenShiftConfig {
    /// Directory on the mirror holding the release, always `/`-terminated.
    pub fn release_url(&self) -> String {
        let mut base = self.mirror_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        format!("{base}{}/", self.version)
    }

    /// Archive name the mirror publishes for `binary` on this platform.
    pub fn package_name(&self, binary: &str) -> String {
        format!("{binary}-{}-{}.tar.gz", host_platform(), self.version)
    }
}

fn host_platform() -> &'static str {
    if cfg!(target_os = "macos") {
        "mac"
    } else {
        "linux"
    }
}

/// Where rebuilds fetch the student template when no snapshot exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentTemplateLocation {
    pub bucket: String,
    pub key_prefix: String,
    pub template: String,
}

impl StudentTemplateLocation {
    pub fn url(&self) -> String {
        format!(
            "https://{}.s3.amazonaws.com/{}templates/{}",
            self.bucket, self.key_prefix, self.template
        )
    }
}

#[derive(Clone, Default)]
pub struct InstallSecrets {
    pub pull_secret: Option<String>,
    pub ssh_key: Option<String>,
}

impl std::fmt::Debug for InstallSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallSecrets")
            .field("pull_secret", &self.pull_secret.as_ref().map(|_| "<redacted>"))
            .field("ssh_key", &self.ssh_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Polling policy for stack terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaiterConfig {
    pub poll_interval: Duration,
    /// Consecutive polling errors tolerated before an entry is abandoned.
    pub max_failures: u32,
    /// Wall-clock ceiling for one `await_all` call.
    pub budget: Duration,
    /// Time reserved before the invocation deadline for sending the response.
    pub deadline_margin: Duration,
}

impl Default for WaiterConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            max_failures: 5,
            budget: Duration::from_secs(13 * 60),
            deadline_margin: Duration::from_secs(30),
        }
    }
}

impl WaiterConfig {
    /// The budget actually available when `remaining` time is left in the
    /// invocation.
    pub fn budget_within(&self, remaining: Option<Duration>) -> Duration {
        match remaining {
            Some(remaining) => self
                .budget
                .min(remaining.saturating_sub(self.deadline_margin)),
            None => self.budget,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

/// Backoff used when recreating a stack whose predecessor may still exist.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RebuildConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(20),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathsConfig {
    pub download_dir: PathBuf,
    pub scale_script: PathBuf,
    pub install_config: PathBuf,
    pub webpage_template: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            scale_script: PathBuf::from(DEFAULT_SCALE_SCRIPT),
            install_config: PathBuf::from(DEFAULT_INSTALL_CONFIG),
            webpage_template: None,
        }
    }
}

impl PathsConfig {
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
