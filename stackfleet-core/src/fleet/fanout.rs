//! Applies a resolved plan to the stack backend.

use std::sync::Arc;
use std::time::Duration;

use stackfleet_config::models::sources::parse_bool;
use stackfleet_model::{LifecycleEvent, StackRequest, StudentIndex};
use tracing::{info, warn};

use super::planner::{
    FleetDesiredState, PlannedAction, ResolvedStep, plan, resolve_plan,
};
use super::resolver::StackResolver;
use super::waiter::{WaitReport, Waiter, WaiterEntry};
use crate::error::Result;
use crate::markers::MarkerStore;
use crate::ports::StackBackend;

const CREATE_CLOUD9: &str = "CreateCloud9Instance";
const CLOUD9_PASSWORD: &str = "Cloud9UserPassword";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutedStep {
    pub index: StudentIndex,
    pub stack_name: String,
    pub planned: PlannedAction,
    pub action: PlannedAction,
    /// Set for stacks created during this invocation.
    pub stack_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub steps: Vec<ExecutedStep>,
    pub wait: WaitReport,
}

impl FanOutReport {
    pub fn count(&self, action: PlannedAction) -> usize {
        self.steps.iter().filter(|s| s.action == action).count()
    }
}

#[derive(Clone)]
pub struct FanOutExecutor {
    backend: Arc<dyn StackBackend>,
    resolver: StackResolver,
    markers: MarkerStore,
    waiter: Waiter,
    cloud9_default: bool,
}

impl std::fmt::Debug for FanOutExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOutExecutor")
            .field("backend", &"<dyn StackBackend>")
            .field("markers", &self.markers)
            .field("waiter", &self.waiter)
            .field("cloud9_default", &self.cloud9_default)
            .finish()
    }
}

impl FanOutExecutor {
    pub fn new(
        backend: Arc<dyn StackBackend>,
        markers: MarkerStore,
        waiter: Waiter,
        cloud9_default: bool,
    ) -> Self {
        Self {
            resolver: StackResolver::new(backend.clone()),
            backend,
            markers,
            waiter,
            cloud9_default,
        }
    }

    /// Plans, resolves and applies one lifecycle request, then waits for
    /// the touched stacks within `budget`.
    ///
    /// Backend errors during planning or submission abort the invocation.
    /// Wait outcomes never do: they are reported and logged.
    pub async fn execute(
        &self,
        event: &LifecycleEvent,
        budget: Duration,
    ) -> Result<FanOutReport> {
        let properties = event.fan_out_properties()?;
        let desired = FleetDesiredState::from_event(event, &properties)?;
        let steps = plan(&desired, event.request_type);
        let base = properties.base_request();
        let resolved = resolve_plan(&self.resolver, &base, &steps).await?;

        info!(
            request = %event.request_type,
            base = %base.stack_name,
            desired = desired.desired_count,
            previous = ?desired.previous_count,
            steps = resolved.len(),
            "applying fan-out plan"
        );

        let cloud9 = event
            .property(CREATE_CLOUD9)
            .and_then(parse_bool)
            .unwrap_or(self.cloud9_default);

        let mut report = FanOutReport::default();
        let mut waits = Vec::new();

        for step in resolved {
            let stack_id = match step.action {
                PlannedAction::Create => {
                    let child = self
                        .child_request(
                            &base,
                            step.index,
                            properties.key_to_update.as_deref(),
                            cloud9,
                        )
                        .await?;
                    self.markers.save_snapshot(step.index, &child).await?;
                    let stack_id = self.backend.create_stack(&child).await?;
                    info!(stack = %child.stack_name, %stack_id, "stack creation started");
                    waits.push(WaiterEntry::create(&step.stack_name));
                    Some(stack_id)
                }
                PlannedAction::Delete => {
                    self.backend.delete_stack(&step.stack_name).await?;
                    self.markers.clear(step.index).await?;
                    info!(stack = %step.stack_name, "stack deletion started");
                    waits.push(WaiterEntry::delete(&step.stack_name));
                    None
                }
                PlannedAction::Skip => {
                    if let Some(entry) = settling_entry(&step) {
                        waits.push(entry);
                    }
                    None
                }
            };

            report.steps.push(ExecutedStep {
                index: step.index,
                stack_name: step.stack_name,
                planned: step.planned,
                action: step.action,
                stack_id,
            });
        }

        report.wait = self.waiter.await_all(waits, budget).await;
        for (entry, outcome) in report.wait.stragglers() {
            warn!(
                stack = %entry.stack_name,
                target = %entry.terminal_state.status(),
                ?outcome,
                "stack did not settle during this invocation"
            );
        }

        Ok(report)
    }

    async fn child_request(
        &self,
        base: &StackRequest,
        index: StudentIndex,
        key_to_update: Option<&str>,
        cloud9: bool,
    ) -> Result<StackRequest> {
        let mut child = base.for_index(index, key_to_update);
        if cloud9 && child.parameter(CLOUD9_PASSWORD) == Some("") {
            match self.markers.kubeadmin_password(index).await? {
                Some(password) => {
                    child.set_parameter(CLOUD9_PASSWORD, password);
                }
                None => warn!(
                    student = %index,
                    "no kubeadmin password stored; Cloud9 password left empty"
                ),
            }
        }
        Ok(child)
    }
}

/// A skipped child that is still transitioning is awaited too.
fn settling_entry(step: &ResolvedStep) -> Option<WaiterEntry> {
    let existing = step.existing.as_ref()?;
    if !existing.status.is_in_progress() {
        return None;
    }
    if existing.status.as_str().starts_with("DELETE") {
        Some(WaiterEntry::delete(&step.stack_name))
    } else {
        Some(WaiterEntry::create(&step.stack_name))
    }
}
