use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of one student cluster in the fleet, `0..desired_count`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StudentIndex(pub u32);

impl StudentIndex {
    /// Every index of a fleet of `count` students, ascending.
    pub fn range(count: u32) -> impl DoubleEndedIterator<Item = StudentIndex> {
        (0..count).map(StudentIndex)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StudentIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for StudentIndex {
    fn from(value: u32) -> Self {
        StudentIndex(value)
    }
}

/// Naming for one student's cluster. Downstream DNS and console URLs are
/// derived from the fixed `{cluster}-student{i}` pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StudentCluster {
    pub index: StudentIndex,
    pub name: String,
    pub hosted_zone: String,
}

impl StudentCluster {
    pub fn new(
        cluster_name: &str,
        hosted_zone: &str,
        index: StudentIndex,
    ) -> Self {
        Self {
            index,
            name: student_cluster_name(cluster_name, index),
            hosted_zone: hosted_zone.to_string(),
        }
    }

    pub fn fqdn(&self) -> String {
        format!("{}.{}", self.name, self.hosted_zone)
    }

    pub fn api_url(&self) -> String {
        format!("https://api.{}:6443", self.fqdn())
    }

    pub fn console_url(&self) -> String {
        format!("https://console-openshift-console.apps.{}", self.fqdn())
    }

    pub fn ssh_host(&self) -> String {
        format!("ssh.{}", self.fqdn())
    }

    /// Object-store prefix holding this student's markers and auth files.
    pub fn key_prefix(&self) -> String {
        format!("{}/", self.name)
    }
}

pub fn student_cluster_name(cluster_name: &str, index: StudentIndex) -> String {
    format!("{cluster_name}-student{index}")
}
