use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstallerStep {
    Manifests,
    IgnitionConfigs,
}

impl InstallerStep {
    pub fn args(&self) -> [&'static str; 2] {
        match self {
            InstallerStep::Manifests => ["create", "manifests"],
            InstallerStep::IgnitionConfigs => ["create", "ignition-configs"],
        }
    }
}

/// The OpenShift installer, treated as a black box producing files in an
/// assets directory.
#[async_trait]
pub trait InstallerRunner: Send + Sync {
    /// Makes sure the installer binary is present and verified.
    async fn ensure_installed(&self) -> Result<()>;

    async fn run(&self, step: InstallerStep, assets_dir: &Path) -> Result<()>;
}
