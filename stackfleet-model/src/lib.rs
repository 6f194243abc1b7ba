//! Core data model definitions shared across stackfleet crates.
#![allow(missing_docs)]

pub mod error;
pub mod event;
pub mod marker;
pub mod stack;
pub mod student;

pub use error::{ModelError, Result as ModelResult};
pub use event::{
    CfnResponse, FanOutProperties, FunctionKind, InboundEvent, LifecycleEvent,
    RejectedLifecycle, RequestType, ResponseStatus, ScheduledEvent,
};
pub use marker::{MarkerKind, MarkerSet, MarkerState};
pub use stack::{
    Capability, LIVE_STACK_STATUSES, StackDescription, StackPage,
    StackParameter, StackRequest, StackStatus, StackSummary,
};
pub use student::{StudentCluster, StudentIndex, student_cluster_name};
