//! Seams between the engine and the outside world.
//!
//! Each trait has an AWS- or process-backed implementation under
//! [`crate::infra`]; tests substitute fakes or mocks.

pub mod cluster;
pub mod installer;
pub mod objects;
pub mod response;
pub mod schedule;
pub mod stacks;

pub use cluster::{ClusterProbe, ClusterScaler, Reachability};
pub use installer::{InstallerRunner, InstallerStep};
pub use objects::{InMemoryObjectStore, ObjectAcl, ObjectStore, PutOptions};
pub use response::ResponseSink;
pub use schedule::ScheduleControl;
pub use stacks::StackBackend;
