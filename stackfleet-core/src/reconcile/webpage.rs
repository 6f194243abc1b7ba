//! The public status page listing every student cluster.

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use minijinja::Environment;
use serde::Serialize;
use stackfleet_model::{MarkerState, StudentCluster};

use crate::error::Result;

/// Object key of the rendered page in the auth bucket.
pub const WEBPAGE_KEY: &str = "workshop.html";

const TEMPLATE_NAME: &str = "clusters.html";
const DEFAULT_TEMPLATE: &str = include_str!("../templates/clusters.html.j2");
const CLOUD9_CONSOLE_URL: &str = "https://console.aws.amazon.com/cloud9";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClusterEntry {
    pub cluster_name: String,
    pub number: u32,
    pub status: &'static str,
    /// Only published once the cluster is complete.
    pub kubeadmin_password: Option<String>,
    pub console_url: String,
    pub api_url: String,
    pub ssh_url: String,
    pub cloud9_url: Option<String>,
}

impl ClusterEntry {
    pub fn new(
        student: &StudentCluster,
        state: MarkerState,
        kubeadmin_password: Option<String>,
        cloud9: bool,
    ) -> Self {
        Self {
            cluster_name: student.name.clone(),
            number: student.index.get(),
            status: state.label(),
            kubeadmin_password: kubeadmin_password
                .filter(|_| state.is_complete()),
            console_url: student.console_url(),
            api_url: student.api_url(),
            ssh_url: student.ssh_host(),
            cloud9_url: cloud9.then(|| CLOUD9_CONSOLE_URL.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusPage {
    pub cluster_name: String,
    pub openshift_version: String,
    pub generated_at: String,
    pub show_cloud9: bool,
    pub clusters: Vec<ClusterEntry>,
}

impl StatusPage {
    pub fn new(
        cluster_name: impl Into<String>,
        openshift_version: impl Into<String>,
        clusters: Vec<ClusterEntry>,
    ) -> Self {
        let show_cloud9 = clusters.iter().any(|c| c.cloud9_url.is_some());
        Self {
            cluster_name: cluster_name.into(),
            openshift_version: openshift_version.into(),
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            show_cloud9,
            clusters,
        }
    }

    pub fn complete_count(&self) -> usize {
        self.clusters
            .iter()
            .filter(|c| c.status == MarkerState::Complete.label())
            .count()
    }
}

#[derive(Debug)]
pub struct WebpageRenderer {
    env: Environment<'static>,
}

impl WebpageRenderer {
    /// Uses the built-in layout unless `override_path` points at a template.
    pub fn new(override_path: Option<&Path>) -> Result<Self> {
        let source = match override_path {
            Some(path) => std::fs::read_to_string(path)?,
            None => DEFAULT_TEMPLATE.to_string(),
        };
        let mut env = Environment::new();
        env.add_template_owned(TEMPLATE_NAME, source)?;
        Ok(Self { env })
    }

    pub fn render(&self, page: &StatusPage) -> Result<String> {
        let template = self.env.get_template(TEMPLATE_NAME)?;
        Ok(template.render(page)?)
    }
}
