use async_trait::async_trait;
use stackfleet_model::StudentCluster;

use crate::error::Result;

/// Result of probing a cluster API endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reachability {
    /// The TLS handshake was rejected for the certificate, which means the
    /// API server answered with its cluster-internal certificate.
    UntrustedCertificate,
    /// A full HTTP exchange happened.
    HttpStatus(u16),
    Unreachable(String),
}

impl Reachability {
    pub fn is_reachable(&self) -> bool {
        !matches!(self, Reachability::Unreachable(_))
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterProbe: Send + Sync {
    async fn probe(&self, api_url: &str) -> Reachability;
}

/// Post-install scaling of a reachable cluster.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterScaler: Send + Sync {
    async fn scale(
        &self,
        student: &StudentCluster,
        kubeconfig: &[u8],
    ) -> Result<()>;
}
