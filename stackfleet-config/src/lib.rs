//! Configuration for the stackfleet director.
//!
//! Settings come from three layers: an optional `.env` file, the process
//! environment (the names the CloudFormation template passes to the
//! function), and an optional TOML file for tuning knobs the template does
//! not expose. The environment always wins over the file.
#![allow(missing_docs)]

pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoader, ConfigLoaderOptions};
pub use loader::error::ConfigLoadError;
pub use models::sources::{EnvConfig, FileConfig};
pub use models::{
    Config, ConfigMetadata, FleetConfig, InstallSecrets, OpenShiftConfig,
    PathsConfig, ProbeConfig, RebuildConfig, StudentTemplateLocation,
    WaiterConfig,
};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
