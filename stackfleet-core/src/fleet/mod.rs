//! Fan-out of one parent request into per-student child stacks.

pub mod fanout;
pub mod planner;
pub mod resolver;
pub mod waiter;

pub use fanout::{ExecutedStep, FanOutExecutor, FanOutReport};
pub use planner::{
    FleetDesiredState, PlanStep, PlannedAction, ResolvedStep, plan,
    resolve_plan,
};
pub use resolver::StackResolver;
pub use waiter::{
    TerminalState, WaitOutcome, WaitReport, Waiter, WaiterEntry,
};
