//! Per-student progress persisted as marker objects.
//!
//! Keys live under `{cluster}-student{i}/`. The store only knows how to read
//! and write individual markers; [`MarkerSet::state`] decides what they mean.

use std::sync::Arc;

use stackfleet_model::{
    MarkerKind, MarkerSet, MarkerState, StackRequest, StudentIndex,
    student_cluster_name,
};
use tracing::debug;

use crate::error::Result;
use crate::ports::{ObjectStore, PutOptions};

pub const KUBECONFIG: &str = "auth/kubeconfig";
pub const KUBEADMIN_PASSWORD: &str = "auth/kubeadmin-password";

#[derive(Clone)]
pub struct MarkerStore {
    objects: Arc<dyn ObjectStore>,
    cluster_name: String,
}

impl std::fmt::Debug for MarkerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerStore")
            .field("objects", &"<dyn ObjectStore>")
            .field("cluster_name", &self.cluster_name)
            .finish()
    }
}

impl MarkerStore {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        cluster_name: impl Into<String>,
    ) -> Self {
        Self {
            objects,
            cluster_name: cluster_name.into(),
        }
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Key of `relative` under the student's prefix.
    pub fn student_key(&self, index: StudentIndex, relative: &str) -> String {
        format!(
            "{}/{}",
            student_cluster_name(&self.cluster_name, index),
            relative
        )
    }

    fn marker_key(&self, index: StudentIndex, kind: MarkerKind) -> String {
        self.student_key(index, kind.object_name())
    }

    pub async fn markers(&self, index: StudentIndex) -> Result<MarkerSet> {
        Ok(MarkerSet {
            building: self
                .objects
                .exists(&self.marker_key(index, MarkerKind::Building))
                .await?,
            completed: self
                .objects
                .exists(&self.marker_key(index, MarkerKind::Completed))
                .await?,
            rebuild: self
                .objects
                .exists(&self.marker_key(index, MarkerKind::Rebuild))
                .await?,
        })
    }

    pub async fn state(&self, index: StudentIndex) -> Result<MarkerState> {
        Ok(self.markers(index).await?.state())
    }

    pub async fn mark_building(&self, index: StudentIndex) -> Result<()> {
        self.objects
            .put(
                &self.marker_key(index, MarkerKind::Building),
                b"building".to_vec(),
                PutOptions::private_text(),
            )
            .await
    }

    /// Writes `completed` and drops the markers it supersedes.
    pub async fn mark_complete(&self, index: StudentIndex) -> Result<()> {
        self.objects
            .put(
                &self.marker_key(index, MarkerKind::Completed),
                b"completed".to_vec(),
                PutOptions::private_text(),
            )
            .await?;
        self.objects
            .delete(&self.marker_key(index, MarkerKind::Building))
            .await?;
        self.objects
            .delete(&self.marker_key(index, MarkerKind::Rebuild))
            .await?;
        debug!(student = %index, "student marked complete");
        Ok(())
    }

    pub async fn save_snapshot(
        &self,
        index: StudentIndex,
        request: &StackRequest,
    ) -> Result<()> {
        self.put_request(index, MarkerKind::StackSnapshot, request)
            .await
    }

    pub async fn load_snapshot(
        &self,
        index: StudentIndex,
    ) -> Result<Option<StackRequest>> {
        self.get_request(index, MarkerKind::StackSnapshot).await
    }

    pub async fn save_rebuild(
        &self,
        index: StudentIndex,
        request: &StackRequest,
    ) -> Result<()> {
        self.put_request(index, MarkerKind::Rebuild, request).await
    }

    pub async fn load_rebuild(
        &self,
        index: StudentIndex,
    ) -> Result<Option<StackRequest>> {
        self.get_request(index, MarkerKind::Rebuild).await
    }

    /// Removes every marker of a torn-down student. Installer outputs stay.
    pub async fn clear(&self, index: StudentIndex) -> Result<()> {
        for kind in MarkerKind::ALL {
            self.objects.delete(&self.marker_key(index, kind)).await?;
        }
        debug!(student = %index, "student markers cleared");
        Ok(())
    }

    pub async fn kubeadmin_password(
        &self,
        index: StudentIndex,
    ) -> Result<Option<String>> {
        let body = self
            .objects
            .get(&self.student_key(index, KUBEADMIN_PASSWORD))
            .await?;
        Ok(body.map(|bytes| {
            String::from_utf8_lossy(&bytes).trim().to_string()
        }))
    }

    pub async fn kubeconfig(
        &self,
        index: StudentIndex,
    ) -> Result<Option<Vec<u8>>> {
        self.objects
            .get(&self.student_key(index, KUBECONFIG))
            .await
    }

    async fn put_request(
        &self,
        index: StudentIndex,
        kind: MarkerKind,
        request: &StackRequest,
    ) -> Result<()> {
        let body = serde_json::to_vec(request)?;
        self.objects
            .put(
                &self.marker_key(index, kind),
                body,
                PutOptions::private_json(),
            )
            .await
    }

    async fn get_request(
        &self,
        index: StudentIndex,
        kind: MarkerKind,
    ) -> Result<Option<StackRequest>> {
        match self.objects.get(&self.marker_key(index, kind)).await? {
            Some(body) => Ok(Some(serde_json::from_slice(&body)?)),
            None => Ok(None),
        }
    }
}
