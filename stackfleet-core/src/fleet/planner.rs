//! Decides which child indices to create, delete or leave alone.
//!
//! Planning happens in two phases. [`plan`] is a pure function of the desired
//! state and the lifecycle action. [`resolve_plan`] then asks the backend
//! whether each child already exists and downgrades redundant work to
//! [`PlannedAction::Skip`], which makes a retried invocation harmless.
//!
//! A single update is one monotonic grow-or-shrink around the previous count.
//! Growing in one place while shrinking elsewhere cannot be expressed.

use stackfleet_model::{
    FanOutProperties, LifecycleEvent, RequestType, StackRequest, StackSummary,
    StudentIndex,
};
use tracing::debug;

use super::resolver::StackResolver;
use crate::error::Result;

/// Fleet size when `NumStacks` is omitted.
pub const DEFAULT_STACK_COUNT: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FleetDesiredState {
    pub desired_count: u32,
    /// Only meaningful for updates.
    pub previous_count: Option<u32>,
}

impl FleetDesiredState {
    pub fn new(desired_count: u32, previous_count: Option<u32>) -> Self {
        Self {
            desired_count,
            previous_count,
        }
    }

    pub fn from_event(
        event: &LifecycleEvent,
        current: &FanOutProperties,
    ) -> Result<Self> {
        let previous_count = match event.request_type {
            RequestType::Update => event
                .previous_fan_out_properties()?
                .and_then(|previous| previous.num_stacks),
            RequestType::Create | RequestType::Delete => None,
        };
        Ok(Self::new(
            current.num_stacks.unwrap_or(DEFAULT_STACK_COUNT),
            previous_count,
        ))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlannedAction {
    Create,
    Delete,
    Skip,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlanStep {
    pub index: StudentIndex,
    pub action: PlannedAction,
}

impl PlanStep {
    fn new(index: StudentIndex, action: PlannedAction) -> Self {
        Self { index, action }
    }
}

pub fn plan(state: &FleetDesiredState, request: RequestType) -> Vec<PlanStep> {
    let desired = state.desired_count;
    match (request, state.previous_count) {
        (RequestType::Delete, _) => StudentIndex::range(desired)
            .map(|index| PlanStep::new(index, PlannedAction::Delete))
            .collect(),
        (RequestType::Update, Some(previous)) if desired > previous => {
            StudentIndex::range(desired)
                .map(|index| {
                    let action = if index.get() < previous {
                        PlannedAction::Skip
                    } else {
                        PlannedAction::Create
                    };
                    PlanStep::new(index, action)
                })
                .collect()
        }
        (RequestType::Update, Some(previous)) => StudentIndex::range(previous)
            .map(|index| {
                let action = if index.get() < desired {
                    PlannedAction::Skip
                } else {
                    PlannedAction::Delete
                };
                PlanStep::new(index, action)
            })
            .collect(),
        (RequestType::Create, _) | (RequestType::Update, None) => {
            StudentIndex::range(desired)
                .map(|index| PlanStep::new(index, PlannedAction::Create))
                .collect()
        }
    }
}

/// A step after the existence check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedStep {
    pub index: StudentIndex,
    pub stack_name: String,
    pub planned: PlannedAction,
    pub action: PlannedAction,
    pub existing: Option<StackSummary>,
}

/// Consults the resolver for every step that would touch the backend.
///
/// Skipped steps are looked up too so callers can wait on children that are
/// still settling.
pub async fn resolve_plan(
    resolver: &StackResolver,
    base: &StackRequest,
    steps: &[PlanStep],
) -> Result<Vec<ResolvedStep>> {
    let mut resolved = Vec::with_capacity(steps.len());
    for step in steps {
        let stack_name = base.child_name(step.index);
        let existing = resolver.find_stack(&stack_name).await?;
        let action = match (step.action, existing.is_some()) {
            (PlannedAction::Create, true) => PlannedAction::Skip,
            (PlannedAction::Delete, false) => PlannedAction::Skip,
            (action, _) => action,
        };
        if action != step.action {
            debug!(
                stack = %stack_name,
                planned = ?step.action,
                "existing state makes step redundant"
            );
        }
        resolved.push(ResolvedStep {
            index: step.index,
            stack_name,
            planned: step.action,
            action,
            existing,
        });
    }
    Ok(resolved)
}
