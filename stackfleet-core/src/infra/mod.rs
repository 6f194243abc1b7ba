pub mod aws;
pub mod process;
pub mod response;

pub use aws::{CloudFormationBackend, EventBridgeSchedule, S3ObjectStore};
pub use process::{
    OpenShiftInstaller, ScaleReplicasScript, run_command, write_kubeconfig,
};
pub use response::HttpResponseSink;
