//! Installer assets for every student cluster.
//!
//! For each student the shared `install-config.yaml` is specialised (name,
//! domain, secrets and a per-student slice of the pod and service
//! networks), the installer turns it into ignition configs, and the outputs
//! are uploaded under the student's prefix followed by the `building`
//! marker.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_yaml::Value;
use stackfleet_config::{FleetConfig, InstallSecrets};
use stackfleet_model::{StudentCluster, StudentIndex};
use tracing::{debug, info};

use crate::error::{FleetError, Result};
use crate::markers::{KUBEADMIN_PASSWORD, KUBECONFIG, MarkerStore};
use crate::ports::{InstallerRunner, InstallerStep, PutOptions};

/// Installer outputs uploaded per student, relative to its assets dir.
pub const IGNITION_OUTPUTS: [&str; 4] =
    [KUBECONFIG, KUBEADMIN_PASSWORD, "master.ign", "bootstrap.ign"];

const INSTALL_CONFIG_NAME: &str = "install-config.yaml";

/// Shifts the second octet of `cidr` by `offset`, keeping the prefix length.
pub fn update_cidr(cidr: &str, offset: u32) -> Result<String> {
    let invalid = |reason: &str| {
        FleetError::InstallConfig(format!("cidr {cidr:?}: {reason}"))
    };

    let (address, prefix) = match cidr.split_once('/') {
        Some((address, prefix)) => (address, Some(prefix)),
        None => (cidr, None),
    };
    let mut octets: Vec<u8> = address
        .split('.')
        .map(|octet| octet.parse::<u8>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| invalid("not a dotted IPv4 address"))?;
    if octets.len() != 4 {
        return Err(invalid("expected four octets"));
    }

    octets[1] = u32::from(octets[1])
        .checked_add(offset)
        .and_then(|shifted| u8::try_from(shifted).ok())
        .ok_or_else(|| invalid("student offset overflows the second octet"))?;

    let address = octets
        .iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(".");
    Ok(match prefix {
        Some(prefix) => format!("{address}/{prefix}"),
        None => address,
    })
}

/// Specialises the shared install-config for one student.
pub fn render_install_config(
    template: &str,
    student: &StudentCluster,
    pull_secret: &str,
    ssh_key: &str,
) -> Result<String> {
    let mut config: Value = serde_yaml::from_str(template)?;
    let offset = student.index.get();

    child_mut(&mut config, "metadata")?
        .as_mapping_mut()
        .ok_or_else(|| shape_error("metadata"))?
        .insert(Value::from("name"), Value::from(student.name.as_str()));

    let root = config
        .as_mapping_mut()
        .ok_or_else(|| shape_error("document root"))?;
    root.insert(Value::from("sshKey"), Value::from(ssh_key));
    root.insert(Value::from("pullSecret"), Value::from(pull_secret));
    root.insert(
        Value::from("baseDomain"),
        Value::from(student.hosted_zone.as_str()),
    );

    let networking = child_mut(&mut config, "networking")?;

    let cluster_cidr = first_mut(networking, "clusterNetwork")?
        .get_mut("cidr")
        .ok_or_else(|| shape_error("networking.clusterNetwork[0].cidr"))?;
    *cluster_cidr = shifted(cluster_cidr, offset, "clusterNetwork[0].cidr")?;

    let service = first_mut(networking, "serviceNetwork")?;
    *service = shifted(service, offset, "serviceNetwork[0]")?;

    Ok(serde_yaml::to_string(&config)?)
}

fn shape_error(path: &str) -> FleetError {
    FleetError::InstallConfig(format!("missing or malformed `{path}`"))
}

fn child_mut<'a>(value: &'a mut Value, key: &str) -> Result<&'a mut Value> {
    value.get_mut(key).ok_or_else(|| shape_error(key))
}

fn first_mut<'a>(value: &'a mut Value, key: &str) -> Result<&'a mut Value> {
    value
        .get_mut(key)
        .and_then(Value::as_sequence_mut)
        .and_then(|items| items.first_mut())
        .ok_or_else(|| shape_error(key))
}

fn shifted(value: &Value, offset: u32, path: &str) -> Result<Value> {
    let cidr = value.as_str().ok_or_else(|| shape_error(path))?;
    Ok(Value::from(update_cidr(cidr, offset)?))
}

#[derive(Clone)]
pub struct IgnitionGenerator {
    installer: Arc<dyn InstallerRunner>,
    markers: MarkerStore,
    fleet: FleetConfig,
    install_config: PathBuf,
    work_dir: PathBuf,
}

impl std::fmt::Debug for IgnitionGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IgnitionGenerator")
            .field("installer", &"<dyn InstallerRunner>")
            .field("markers", &self.markers)
            .field("install_config", &self.install_config)
            .field("work_dir", &self.work_dir)
            .finish()
    }
}

impl IgnitionGenerator {
    pub fn new(
        installer: Arc<dyn InstallerRunner>,
        markers: MarkerStore,
        fleet: FleetConfig,
        install_config: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            installer,
            markers,
            fleet,
            install_config: install_config.into(),
            work_dir: work_dir.into(),
        }
    }

    /// Generates and uploads assets for every student, in index order.
    pub async fn generate_all(
        &self,
        secrets: &InstallSecrets,
    ) -> Result<Vec<StudentIndex>> {
        let pull_secret = secrets
            .pull_secret
            .as_deref()
            .ok_or_else(|| FleetError::MissingInput("pull secret".into()))?;
        let ssh_key = secrets
            .ssh_key
            .as_deref()
            .ok_or_else(|| FleetError::MissingInput("SSH key".into()))?;

        self.installer.ensure_installed().await?;
        let template = tokio::fs::read_to_string(&self.install_config).await?;

        let mut generated = Vec::new();
        for index in StudentIndex::range(self.fleet.num_students) {
            let student = StudentCluster::new(
                &self.fleet.cluster_name,
                &self.fleet.hosted_zone_name,
                index,
            );
            let assets = self.work_dir.join(&student.name);
            tokio::fs::create_dir_all(&assets).await?;

            let rendered =
                render_install_config(&template, &student, pull_secret, ssh_key)?;
            tokio::fs::write(assets.join(INSTALL_CONFIG_NAME), rendered).await?;

            info!(cluster = %student.name, "generating manifests");
            self.installer.run(InstallerStep::Manifests, &assets).await?;
            info!(cluster = %student.name, "generating ignition configs");
            self.installer
                .run(InstallerStep::IgnitionConfigs, &assets)
                .await?;

            self.upload_outputs(index, &assets).await?;
            self.markers.mark_building(index).await?;
            generated.push(index);
        }
        Ok(generated)
    }

    async fn upload_outputs(&self, index: StudentIndex, assets: &Path) -> Result<()> {
        let objects = self.markers.objects();
        for relative in IGNITION_OUTPUTS {
            let key = self.markers.student_key(index, relative);
            if objects.exists(&key).await? {
                debug!(%key, "already uploaded; skipping");
                continue;
            }
            let body = tokio::fs::read(assets.join(relative)).await?;
            objects.put(&key, body, PutOptions::private_binary()).await?;
            debug!(%key, "uploaded");
        }
        Ok(())
    }

    /// Empties the auth bucket, installer outputs and markers alike.
    pub async fn teardown(&self) -> Result<usize> {
        let removed = self.markers.objects().delete_all().await?;
        info!(removed, "auth bucket emptied");
        Ok(removed)
    }
}
