//! AWS-backed implementations of the ports.

pub mod cloudformation;
pub mod eventbridge;
pub mod s3;

pub use cloudformation::CloudFormationBackend;
pub use eventbridge::EventBridgeSchedule;
pub use s3::S3ObjectStore;
