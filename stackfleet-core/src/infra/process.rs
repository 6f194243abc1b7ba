//! Subprocess-backed ports: the OpenShift installer and the post-install
//! scaling script.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use stackfleet_model::StudentCluster;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{FleetError, Result};
use crate::ports::{ClusterScaler, InstallerRunner, InstallerStep};
use crate::toolchain::Toolchain;

/// Runs `command` to completion; a non-zero exit becomes an error carrying
/// stderr.
pub async fn run_command(mut command: Command) -> Result<Output> {
    let rendered = format!("{:?}", command.as_std());
    debug!(command = %rendered, "running");
    let output = command.kill_on_drop(true).output().await?;

    if !output.status.success() {
        return Err(FleetError::Command {
            command: rendered,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    debug!(
        command = %rendered,
        stdout = %String::from_utf8_lossy(&output.stdout).trim(),
        "finished"
    );
    Ok(output)
}

#[derive(Debug, Clone)]
pub struct OpenShiftInstaller {
    toolchain: Toolchain,
    binary: String,
}

impl OpenShiftInstaller {
    pub fn new(toolchain: Toolchain, binary: impl Into<String>) -> Self {
        Self {
            toolchain,
            binary: binary.into(),
        }
    }

    fn binary_path(&self) -> PathBuf {
        self.toolchain.download_dir().join(&self.binary)
    }
}

#[async_trait]
impl InstallerRunner for OpenShiftInstaller {
    async fn ensure_installed(&self) -> Result<()> {
        let path = self.toolchain.ensure(&self.binary).await?;
        info!(binary = %path.display(), "installer ready");
        Ok(())
    }

    async fn run(&self, step: InstallerStep, assets_dir: &Path) -> Result<()> {
        let mut command = Command::new(self.binary_path());
        command.args(step.args()).arg("--dir").arg(assets_dir);
        run_command(command).await?;
        Ok(())
    }
}

/// Writes `kubeconfig` next to, never over, the student's assets directory
/// in `dir`.
pub async fn write_kubeconfig(
    dir: &Path,
    student: &StudentCluster,
    kubeconfig: &[u8],
) -> Result<PathBuf> {
    let path = dir.join(format!("{}.kubeconfig", student.name));
    tokio::fs::write(&path, kubeconfig).await?;
    Ok(path)
}

/// Runs the scaling script against a student's kubeconfig.
///
/// The script expects `oc` on `PATH`, so the client is fetched into the
/// download directory on first use and that directory is put in front of
/// `PATH`.
#[derive(Debug)]
pub struct ScaleReplicasScript {
    toolchain: Toolchain,
    client_binary: String,
    script: PathBuf,
    client_ready: OnceCell<PathBuf>,
}

impl ScaleReplicasScript {
    pub fn new(
        toolchain: Toolchain,
        client_binary: impl Into<String>,
        script: impl Into<PathBuf>,
    ) -> Self {
        Self {
            toolchain,
            client_binary: client_binary.into(),
            script: script.into(),
            client_ready: OnceCell::new(),
        }
    }

    fn search_path(&self) -> Result<OsString> {
        let mut paths = vec![self.toolchain.download_dir().to_path_buf()];
        if let Some(existing) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&existing));
        }
        std::env::join_paths(paths).map_err(|err| {
            FleetError::MissingInput(format!("unusable PATH entry: {err}"))
        })
    }
}

#[async_trait]
impl ClusterScaler for ScaleReplicasScript {
    async fn scale(&self, student: &StudentCluster, kubeconfig: &[u8]) -> Result<()> {
        self.client_ready
            .get_or_try_init(|| self.toolchain.ensure(&self.client_binary))
            .await?;

        let kubeconfig_path =
            write_kubeconfig(self.toolchain.download_dir(), student, kubeconfig)
                .await?;

        let mut command = Command::new(&self.script);
        command
            .arg(&kubeconfig_path)
            .env("PATH", self.search_path()?)
            .env("KUBECONFIG", &kubeconfig_path);
        run_command(command).await?;
        info!(cluster = %student.name, "replicas scaled");
        Ok(())
    }
}
