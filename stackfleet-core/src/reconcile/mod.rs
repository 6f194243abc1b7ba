//! The scheduled validation pass.
//!
//! Each pass walks every student index: finished clusters are left alone,
//! clusters whose API answers get their post-install scaling, and whatever
//! is still unfinished afterwards is rebuilt. The status page is refreshed
//! before any rebuild starts so students see the current state even when
//! the rebuild eats the rest of the invocation.

pub mod probe;
pub mod rebuild;
pub mod webpage;

use std::sync::Arc;

use stackfleet_config::FleetConfig;
use stackfleet_model::{MarkerState, StudentCluster, StudentIndex};
use tokio::time::Instant;
use tracing::{error, info, warn};

pub use probe::{HttpsProbe, classify_error};
pub use rebuild::{RebuildReport, Rebuilder, SnapshotSource};
pub use webpage::{ClusterEntry, StatusPage, WEBPAGE_KEY, WebpageRenderer};

use crate::error::Result;
use crate::markers::MarkerStore;
use crate::ports::{ClusterProbe, ClusterScaler, PutOptions, ScheduleControl};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    /// State of every index after this pass's scaling step.
    pub states: Vec<(StudentIndex, MarkerState)>,
    pub completed_now: Vec<StudentIndex>,
    /// Unfinished indices handed to the rebuild.
    pub failed: Vec<StudentIndex>,
    /// Indices whose markers could not be read or written this pass, with
    /// the error. They are neither rebuilt nor counted as complete.
    pub deferred: Vec<(StudentIndex, String)>,
    pub webpage_published: bool,
    pub rule_disabled: bool,
    pub rebuild: Option<RebuildReport>,
}

impl PassReport {
    pub fn complete_count(&self) -> usize {
        self.states
            .iter()
            .filter(|(_, state)| state.is_complete())
            .count()
    }
}

pub struct Reconciler {
    fleet: FleetConfig,
    openshift_version: String,
    markers: MarkerStore,
    probe: Arc<dyn ClusterProbe>,
    scaler: Arc<dyn ClusterScaler>,
    schedule: Arc<dyn ScheduleControl>,
    renderer: WebpageRenderer,
    rebuilder: Rebuilder,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("fleet", &self.fleet)
            .field("openshift_version", &self.openshift_version)
            .field("markers", &self.markers)
            .field("probe", &"<dyn ClusterProbe>")
            .field("scaler", &"<dyn ClusterScaler>")
            .field("schedule", &"<dyn ScheduleControl>")
            .field("rebuilder", &self.rebuilder)
            .finish()
    }
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fleet: FleetConfig,
        openshift_version: impl Into<String>,
        markers: MarkerStore,
        probe: Arc<dyn ClusterProbe>,
        scaler: Arc<dyn ClusterScaler>,
        schedule: Arc<dyn ScheduleControl>,
        renderer: WebpageRenderer,
        rebuilder: Rebuilder,
    ) -> Self {
        Self {
            fleet,
            openshift_version: openshift_version.into(),
            markers,
            probe,
            scaler,
            schedule,
            renderer,
            rebuilder,
        }
    }

    fn student(&self, index: StudentIndex) -> StudentCluster {
        StudentCluster::new(
            &self.fleet.cluster_name,
            &self.fleet.hosted_zone_name,
            index,
        )
    }

    /// Runs one pass. Errors reading or writing one student's markers defer
    /// that student to the next pass; they never stop the others.
    pub async fn run_pass(&self, deadline: Instant) -> PassReport {
        let mut report = PassReport::default();

        for index in StudentIndex::range(self.fleet.num_students) {
            let state = match self.evaluate(index).await {
                Ok((state, completed_now)) => {
                    if completed_now {
                        report.completed_now.push(index);
                    }
                    if !state.is_complete() {
                        report.failed.push(index);
                    }
                    state
                }
                Err(err) => {
                    warn!(student = %index, error = %err, "student deferred to the next pass");
                    report.deferred.push((index, err.to_string()));
                    MarkerState::None
                }
            };
            report.states.push((index, state));
        }

        info!(
            students = self.fleet.num_students,
            complete = report.complete_count(),
            failed = report.failed.len(),
            deferred = report.deferred.len(),
            "validation pass evaluated"
        );

        report.webpage_published = match self.publish_webpage(&report.states).await {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, "status page not published");
                false
            }
        };

        if report.failed.is_empty() && report.deferred.is_empty() {
            let rule = self.fleet.validate_rule_name();
            match self.schedule.disable_rule(&rule).await {
                Ok(()) => {
                    info!(%rule, "every cluster complete; validation schedule disabled");
                    report.rule_disabled = true;
                }
                Err(err) => {
                    error!(%rule, error = %err, "failed to disable the validation schedule");
                }
            }
        } else if !report.failed.is_empty() {
            let rebuild = self.rebuilder.rebuild(&report.failed, deadline).await;
            info!(
                recreated = rebuild.recreated.len(),
                skipped = rebuild.skipped.len(),
                "rebuild finished"
            );
            report.rebuild = Some(rebuild);
        }

        report
    }

    /// Reads the student's state and advances it when unfinished. Returns
    /// the resulting state and whether it completed during this call.
    async fn evaluate(&self, index: StudentIndex) -> Result<(MarkerState, bool)> {
        let state = self.markers.state(index).await?;
        if state.is_complete() {
            return Ok((state, false));
        }
        if self.advance(index).await? {
            return Ok((MarkerState::Complete, true));
        }
        Ok((state, false))
    }

    /// Probes one unfinished student and scales it when the API answers.
    /// Returns true when the student is now complete.
    async fn advance(&self, index: StudentIndex) -> Result<bool> {
        let student = self.student(index);
        let reachability = self.probe.probe(&student.api_url()).await;
        if !reachability.is_reachable() {
            info!(cluster = %student.name, ?reachability, "cluster API not reachable yet");
            return Ok(false);
        }

        let Some(kubeconfig) = self.markers.kubeconfig(index).await? else {
            warn!(cluster = %student.name, "cluster reachable but no kubeconfig stored");
            return Ok(false);
        };

        match self.scaler.scale(&student, &kubeconfig).await {
            Ok(()) => {
                self.markers.mark_complete(index).await?;
                info!(cluster = %student.name, "cluster scaled and marked complete");
                Ok(true)
            }
            Err(err) => {
                warn!(cluster = %student.name, error = %err, "scaling failed; retrying next pass");
                Ok(false)
            }
        }
    }

    async fn publish_webpage(
        &self,
        states: &[(StudentIndex, MarkerState)],
    ) -> Result<()> {
        let mut entries = Vec::with_capacity(states.len());
        for &(index, state) in states {
            let password = if state.is_complete() {
                self.markers
                    .kubeadmin_password(index)
                    .await
                    .unwrap_or_else(|err| {
                        warn!(student = %index, error = %err, "kubeadmin password unavailable");
                        None
                    })
            } else {
                None
            };
            entries.push(ClusterEntry::new(
                &self.student(index),
                state,
                password,
                self.fleet.create_cloud9_instance,
            ));
        }

        let page = StatusPage::new(
            &self.fleet.cluster_name,
            &self.openshift_version,
            entries,
        );
        let html = self.renderer.render(&page)?;
        self.markers
            .objects()
            .put(WEBPAGE_KEY, html.into_bytes(), PutOptions::public_html())
            .await
    }
}
