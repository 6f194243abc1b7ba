//! Tear down and recreate student stacks that never became usable.
//!
//! The recreation request comes from, in order of preference: the creation
//! snapshot (`cf_params.json`), the live stack's description pointed at the
//! student template, or the `rebuild` marker left by an earlier attempt.
//! Whatever is chosen is persisted as the `rebuild` marker first, so a pass
//! that dies after the delete can still recreate the stack next time.

use std::sync::Arc;
use stackfleet_config::StudentTemplateLocation;
use stackfleet_model::{
    StackRequest, StackStatus, StudentIndex, student_cluster_name,
};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::Result;
use crate::fleet::{WaitOutcome, Waiter, WaiterEntry};
use crate::markers::MarkerStore;
use crate::ports::StackBackend;
use crate::retry::{RetryConfig, retry_with_backoff};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotSource {
    CreationSnapshot,
    LiveStack,
    RebuildMarker,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub recreated: Vec<StudentIndex>,
    /// Indices left for the next pass, with the reason.
    pub skipped: Vec<(StudentIndex, String)>,
}

struct Candidate {
    index: StudentIndex,
    request: StackRequest,
}

#[derive(Clone)]
pub struct Rebuilder {
    backend: Arc<dyn StackBackend>,
    markers: MarkerStore,
    waiter: Waiter,
    retry: RetryConfig,
    template: Option<StudentTemplateLocation>,
}

impl std::fmt::Debug for Rebuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rebuilder")
            .field("backend", &"<dyn StackBackend>")
            .field("markers", &self.markers)
            .field("retry", &self.retry)
            .field("template", &self.template)
            .finish()
    }
}

impl Rebuilder {
    pub fn new(
        backend: Arc<dyn StackBackend>,
        markers: MarkerStore,
        waiter: Waiter,
        retry: RetryConfig,
        template: Option<StudentTemplateLocation>,
    ) -> Self {
        Self {
            backend,
            markers,
            waiter,
            retry,
            template,
        }
    }

    /// Rebuilds every index in `failed`. Per-index failures are logged and
    /// reported, never propagated. Delete waits stop at `deadline`.
    pub async fn rebuild(
        &self,
        failed: &[StudentIndex],
        deadline: Instant,
    ) -> RebuildReport {
        let mut report = RebuildReport::default();
        let mut candidates = Vec::new();
        let mut deletions = Vec::new();

        for &index in failed {
            match self.prepare(index).await {
                Ok(Some((candidate, deleting))) => {
                    if deleting {
                        deletions.push(WaiterEntry::delete(
                            &candidate.request.stack_name,
                        ));
                    }
                    candidates.push(candidate);
                }
                Ok(None) => {
                    warn!(student = %index, "no stack definition available; cannot rebuild");
                    report
                        .skipped
                        .push((index, "no stack definition available".into()));
                }
                Err(err) => {
                    warn!(student = %index, error = %err, "rebuild preparation failed");
                    report.skipped.push((index, err.to_string()));
                }
            }
        }

        let budget = deadline.saturating_duration_since(Instant::now());
        let deleted = self.waiter.await_all(deletions, budget).await;

        for candidate in candidates {
            let name = candidate.request.stack_name.as_str();
            match deleted.outcome(name) {
                None | Some(WaitOutcome::Reached) => {}
                Some(outcome) => {
                    warn!(stack = name, ?outcome, "previous stack still present; rebuild deferred");
                    report
                        .skipped
                        .push((candidate.index, format!("delete not finished: {outcome:?}")));
                    continue;
                }
            }

            let created = retry_with_backoff(&self.retry, "recreate stack", || {
                self.backend.create_stack(&candidate.request)
            })
            .await;
            match created {
                Ok(stack_id) => {
                    info!(stack = name, %stack_id, "stack recreated");
                    report.recreated.push(candidate.index);
                }
                Err(err) => {
                    report.skipped.push((candidate.index, err.to_string()));
                }
            }
        }

        report
    }

    /// Picks the request, persists it and starts the delete. Returns
    /// whether a delete is in flight.
    async fn prepare(
        &self,
        index: StudentIndex,
    ) -> Result<Option<(Candidate, bool)>> {
        let Some((request, source)) = self.snapshot_for(index).await? else {
            return Ok(None);
        };
        if source != SnapshotSource::RebuildMarker {
            self.markers.save_rebuild(index, &request).await?;
        }
        info!(
            student = %index,
            stack = %request.stack_name,
            ?source,
            "rebuilding student stack"
        );

        let deleting = match self.backend.describe_stack(&request.stack_name).await? {
            Some(live) if live.status != StackStatus::DeleteComplete => {
                self.backend.delete_stack(&request.stack_name).await?;
                true
            }
            _ => false,
        };

        Ok(Some((Candidate { index, request }, deleting)))
    }

    pub async fn snapshot_for(
        &self,
        index: StudentIndex,
    ) -> Result<Option<(StackRequest, SnapshotSource)>> {
        if let Some(snapshot) = self.markers.load_snapshot(index).await? {
            return Ok(Some((snapshot, SnapshotSource::CreationSnapshot)));
        }

        if let Some(template) = &self.template {
            let name = student_cluster_name(self.markers.cluster_name(), index);
            if let Some(live) = self.backend.describe_stack(&name).await? {
                return Ok(Some((
                    live.to_request(template.url()),
                    SnapshotSource::LiveStack,
                )));
            }
        }

        Ok(self
            .markers
            .load_rebuild(index)
            .await?
            .map(|request| (request, SnapshotSource::RebuildMarker)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::InMemoryObjectStore;
    use crate::ports::stacks::MockStackBackend;
    use stackfleet_config::WaiterConfig;
    use stackfleet_model::{Capability, StackDescription, StackParameter};

    fn request(name: &str) -> StackRequest {
        StackRequest {
            stack_name: name.into(),
            template_url: "https://bucket.s3.amazonaws.com/t.yaml".into(),
            capabilities: Capability::FAN_OUT.to_vec(),
            parameters: vec![StackParameter::new("StudentNumber", "0")],
            disable_rollback: true,
        }
    }

    fn in_a_minute() -> Instant {
        Instant::now() + std::time::Duration::from_secs(60)
    }

    fn template() -> StudentTemplateLocation {
        StudentTemplateLocation {
            bucket: "qs-bucket".into(),
            key_prefix: "quickstart/".into(),
            template: "student.yaml".into(),
        }
    }

    fn rebuilder(
        backend: MockStackBackend,
        markers: MarkerStore,
        template: Option<StudentTemplateLocation>,
    ) -> Rebuilder {
        let backend: Arc<dyn StackBackend> = Arc::new(backend);
        let waiter = Waiter::new(backend.clone(), &WaiterConfig::default());
        Rebuilder::new(
            backend,
            markers,
            waiter,
            RetryConfig::with_max_attempts(1),
            template,
        )
    }

    #[tokio::test]
    async fn creation_snapshot_wins() {
        let markers =
            MarkerStore::new(Arc::new(InMemoryObjectStore::new()), "ocpws");
        markers
            .save_snapshot(StudentIndex(0), &request("ws-0"))
            .await
            .unwrap();
        markers
            .save_rebuild(StudentIndex(0), &request("stale"))
            .await
            .unwrap();

        let rebuilder =
            rebuilder(MockStackBackend::new(), markers, Some(template()));
        let (chosen, source) =
            rebuilder.snapshot_for(StudentIndex(0)).await.unwrap().unwrap();
        assert_eq!(chosen.stack_name, "ws-0");
        assert_eq!(source, SnapshotSource::CreationSnapshot);
    }

    #[tokio::test]
    async fn live_stack_is_pointed_at_the_student_template() {
        let markers =
            MarkerStore::new(Arc::new(InMemoryObjectStore::new()), "ocpws");
        let mut backend = MockStackBackend::new();
        backend
            .expect_describe_stack()
            .withf(|name| name == "ocpws-student1")
            .returning(|name| {
                Ok(Some(StackDescription {
                    stack_name: name.into(),
                    stack_id: Some("id".into()),
                    status: StackStatus::CreateFailed,
                    capabilities: vec![Capability::Iam],
                    parameters: vec![StackParameter::new("StudentNumber", "1")],
                }))
            });

        let rebuilder = rebuilder(backend, markers, Some(template()));
        let (chosen, source) =
            rebuilder.snapshot_for(StudentIndex(1)).await.unwrap().unwrap();
        assert_eq!(source, SnapshotSource::LiveStack);
        assert_eq!(
            chosen.template_url,
            "https://qs-bucket.s3.amazonaws.com/quickstart/templates/student.yaml"
        );
        assert_eq!(chosen.parameter("StudentNumber"), Some("1"));
    }

    #[tokio::test]
    async fn rebuild_marker_is_the_last_resort() {
        let markers =
            MarkerStore::new(Arc::new(InMemoryObjectStore::new()), "ocpws");
        markers
            .save_rebuild(StudentIndex(2), &request("ws-2"))
            .await
            .unwrap();

        let rebuilder = rebuilder(MockStackBackend::new(), markers, None);
        let (_, source) =
            rebuilder.snapshot_for(StudentIndex(2)).await.unwrap().unwrap();
        assert_eq!(source, SnapshotSource::RebuildMarker);
    }

    #[tokio::test]
    async fn index_without_any_definition_is_skipped() {
        let markers =
            MarkerStore::new(Arc::new(InMemoryObjectStore::new()), "ocpws");
        let rebuilder = rebuilder(MockStackBackend::new(), markers, None);
        let report = rebuilder
            .rebuild(&[StudentIndex(3)], in_a_minute())
            .await;
        assert!(report.recreated.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, StudentIndex(3));
    }

    #[tokio::test]
    async fn missing_live_stack_is_created_without_waiting() {
        let objects = Arc::new(InMemoryObjectStore::new());
        let markers = MarkerStore::new(objects.clone(), "ocpws");
        markers
            .save_snapshot(StudentIndex(0), &request("ws-0"))
            .await
            .unwrap();

        let mut backend = MockStackBackend::new();
        backend.expect_describe_stack().returning(|_| Ok(None));
        backend.expect_delete_stack().never();
        backend
            .expect_create_stack()
            .withf(|req| req.stack_name == "ws-0")
            .times(1)
            .returning(|_| Ok("arn:new".into()));

        let rebuilder = rebuilder(backend, markers.clone(), None);
        let report = rebuilder
            .rebuild(&[StudentIndex(0)], in_a_minute())
            .await;
        assert_eq!(report.recreated, vec![StudentIndex(0)]);
        assert_eq!(
            markers.load_rebuild(StudentIndex(0)).await.unwrap(),
            Some(request("ws-0"))
        );
    }
}
