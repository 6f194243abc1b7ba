use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as defined in a TOML file.
///
/// Durations are kept as strings and parsed with `humantime` by the loader
/// so a bad value can be reported with its field name.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub waiter: FileWaiterConfig,
    #[serde(default)]
    pub probe: FileProbeConfig,
    #[serde(default)]
    pub rebuild: FileRebuildConfig,
    #[serde(default)]
    pub paths: FilePathsConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileWaiterConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_failures: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_margin: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileProbeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileRebuildConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_delay: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_delay: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_multiplier: Option<f64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FilePathsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_script: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_config: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webpage_template: Option<PathBuf>,
}

/// Environment-derived configuration values.
///
/// Numeric and boolean variables stay raw here; the loader parses them so
/// malformed values become errors instead of silently disappearing.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub cluster_name: Option<String>,
    pub num_students: Option<String>,
    pub hosted_zone_name: Option<String>,
    pub auth_bucket: Option<String>,
    pub create_cloud9_instance: Option<String>,
    pub openshift_version: Option<String>,
    pub openshift_mirror_url: Option<String>,
    pub openshift_install_binary: Option<String>,
    pub openshift_client_binary: Option<String>,
    pub qss3_bucket_name: Option<String>,
    pub qss3_key_prefix: Option<String>,
    pub student_template: Option<String>,
    pub log_level: Option<String>,
    pub pull_secret: Option<String>,
    pub ssh_key: Option<String>,
    pub config_path: Option<PathBuf>,
    pub download_dir: Option<PathBuf>,
    pub scale_script: Option<PathBuf>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name).filter(|value| !value.trim().is_empty())
        };

        Self {
            cluster_name: var("ClusterName"),
            num_students: var("NumStudents"),
            hosted_zone_name: var("HostedZoneName"),
            auth_bucket: var("AuthBucket"),
            create_cloud9_instance: var("CreateCloud9Instance"),
            openshift_version: var("OpenShiftVersion"),
            openshift_mirror_url: var("OpenShiftMirrorURL"),
            openshift_install_binary: var("OpenShiftInstallBinary"),
            openshift_client_binary: var("OpenShiftClientBinary"),
            qss3_bucket_name: var("QSS3BucketName"),
            // An empty prefix is meaningful, so it bypasses the blank filter.
            qss3_key_prefix: lookup("QSS3KeyPrefix"),
            student_template: var("StudentTemplate"),
            log_level: var("LogLevel"),
            pull_secret: var("PULL_SECRET"),
            ssh_key: var("SSH_KEY"),
            config_path: var("STACKFLEET_CONFIG").map(PathBuf::from),
            download_dir: var("STACKFLEET_DOWNLOAD_DIR").map(PathBuf::from),
            scale_script: var("STACKFLEET_SCALE_SCRIPT").map(PathBuf::from),
        }
    }
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
