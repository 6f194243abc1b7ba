pub mod error;

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use self::error::ConfigLoadError;
use crate::{
    models::{
        Config, ConfigMetadata, DEFAULT_CLIENT_BINARY, DEFAULT_INSTALL_BINARY,
        FleetConfig, InstallSecrets, OpenShiftConfig, PathsConfig, ProbeConfig,
        RebuildConfig, StudentTemplateLocation, WaiterConfig,
        sources::{EnvConfig, FileConfig, parse_bool},
    },
    validation::{self, ConfigWarnings},
};

const DEFAULT_CONFIG_LOCATIONS: [&str; 2] =
    ["stackfleet.toml", "config/stackfleet.toml"];

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Loads `.env`, then composes the process environment with the
    /// optional TOML file.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => {
                dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?
            }
        };

        let mut load = self.load_from_env(EnvConfig::gather())?;
        load.config.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Composes a config from an already gathered environment.
    pub fn load_from_env(
        &self,
        env: EnvConfig,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;
        let (config, warnings) =
            self.compose_config(file_config, env, config_path)?;
        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let (path, explicit) = if let Some(path) = &self.options.config_path {
            (path.clone(), true)
        } else if let Some(path) = &env.config_path {
            (path.clone(), true)
        } else if let Some(found) = DEFAULT_CONFIG_LOCATIONS
            .iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.exists())
        {
            (found, false)
        } else {
            return Ok((None, None));
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let contents =
            fs::read_to_string(&path).map_err(|err| ConfigLoadError::Io {
                path: path.clone(),
                source: err,
            })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|err| {
                ConfigLoadError::Parse {
                    path: path.clone(),
                    source: err,
                }
            })?;

        Ok((Some(file_config), Some(path)))
    }

    fn compose_config(
        &self,
        file_config: Option<FileConfig>,
        env: EnvConfig,
        config_path: Option<PathBuf>,
    ) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
        let FileConfig {
            waiter: file_waiter,
            probe: file_probe,
            rebuild: file_rebuild,
            paths: file_paths,
        } = file_config.unwrap_or_default();

        let fleet = FleetConfig {
            cluster_name: required(env.cluster_name, "ClusterName")?,
            num_students: parse_count(env.num_students)?,
            hosted_zone_name: required(env.hosted_zone_name, "HostedZoneName")?,
            auth_bucket: required(env.auth_bucket, "AuthBucket")?,
            create_cloud9_instance: match env.create_cloud9_instance {
                Some(raw) => parse_bool(&raw).ok_or_else(|| {
                    ConfigLoadError::InvalidVariable {
                        name: "CreateCloud9Instance",
                        value: raw.clone(),
                        reason: "expected yes/no or true/false".into(),
                    }
                })?,
                None => false,
            },
        };

        let mirror_url = required(env.openshift_mirror_url, "OpenShiftMirrorURL")?;
        url::Url::parse(&mirror_url).map_err(|source| {
            ConfigLoadError::InvalidMirrorUrl {
                value: mirror_url.clone(),
                source,
            }
        })?;

        let openshift = OpenShiftConfig {
            version: required(env.openshift_version, "OpenShiftVersion")?,
            mirror_url,
            install_binary: env
                .openshift_install_binary
                .unwrap_or_else(|| DEFAULT_INSTALL_BINARY.to_string()),
            client_binary: env
                .openshift_client_binary
                .unwrap_or_else(|| DEFAULT_CLIENT_BINARY.to_string()),
        };

        let student_template = match (env.qss3_bucket_name, env.student_template)
        {
            (Some(bucket), Some(template)) => Some(StudentTemplateLocation {
                bucket,
                key_prefix: env.qss3_key_prefix.unwrap_or_default(),
                template,
            }),
            _ => None,
        };

        let defaults = WaiterConfig::default();
        let waiter = WaiterConfig {
            poll_interval: duration(
                "waiter.poll_interval",
                file_waiter.poll_interval,
                defaults.poll_interval,
            )?,
            max_failures: file_waiter
                .max_failures
                .unwrap_or(defaults.max_failures),
            budget: duration("waiter.budget", file_waiter.budget, defaults.budget)?,
            deadline_margin: duration(
                "waiter.deadline_margin",
                file_waiter.deadline_margin,
                defaults.deadline_margin,
            )?,
        };

        let probe = ProbeConfig {
            timeout: duration(
                "probe.timeout",
                file_probe.timeout,
                ProbeConfig::default().timeout,
            )?,
        };

        let defaults = RebuildConfig::default();
        let rebuild = RebuildConfig {
            max_attempts: file_rebuild
                .max_attempts
                .unwrap_or(defaults.max_attempts),
            initial_delay: duration(
                "rebuild.initial_delay",
                file_rebuild.initial_delay,
                defaults.initial_delay,
            )?,
            max_delay: duration(
                "rebuild.max_delay",
                file_rebuild.max_delay,
                defaults.max_delay,
            )?,
            backoff_multiplier: file_rebuild
                .backoff_multiplier
                .unwrap_or(defaults.backoff_multiplier),
        };

        let defaults = PathsConfig::default();
        let paths = PathsConfig {
            download_dir: env
                .download_dir
                .or(file_paths.download_dir)
                .unwrap_or(defaults.download_dir),
            scale_script: env
                .scale_script
                .or(file_paths.scale_script)
                .unwrap_or(defaults.scale_script),
            install_config: file_paths
                .install_config
                .unwrap_or(defaults.install_config),
            webpage_template: file_paths.webpage_template,
        };

        let config = Config {
            fleet,
            openshift,
            student_template,
            secrets: InstallSecrets {
                pull_secret: env.pull_secret,
                ssh_key: env.ssh_key,
            },
            waiter,
            probe,
            rebuild,
            paths,
            log_level: env.log_level,
            metadata: ConfigMetadata {
                config_path,
                env_file_loaded: false,
            },
        };

        let warnings = validation::apply_guard_rails(&config)?;
        Ok((config, warnings))
    }
}

fn required(
    value: Option<String>,
    name: &'static str,
) -> Result<String, ConfigLoadError> {
    value.ok_or(ConfigLoadError::MissingVariable { name })
}

fn parse_count(raw: Option<String>) -> Result<u32, ConfigLoadError> {
    let raw = required(raw, "NumStudents")?;
    raw.trim()
        .parse()
        .map_err(|err: std::num::ParseIntError| {
            ConfigLoadError::InvalidVariable {
                name: "NumStudents",
                value: raw.clone(),
                reason: err.to_string(),
            }
        })
}

fn duration(
    field: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigLoadError> {
    match raw {
        Some(value) => humantime::parse_duration(&value).map_err(|source| {
            ConfigLoadError::InvalidDuration {
                field,
                value,
                source,
            }
        }),
        None => Ok(default),
    }
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

impl ConfigLoad {
    pub fn config_path(&self) -> Option<&Path> {
        self.config.metadata.config_path.as_deref()
    }
}
