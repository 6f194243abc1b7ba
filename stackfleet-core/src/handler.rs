//! Entry point for one invocation.
//!
//! Lifecycle requests always get a response: success or failure is decided
//! here and delivered through the [`ResponseSink`], because CloudFormation
//! otherwise waits for its own hour-long timeout. That includes requests
//! whose body does not parse, as long as they name a response URL.
//! Scheduled ticks have nobody to answer, so their failures are only logged.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use stackfleet_config::{Config, InstallSecrets};
use stackfleet_model::{
    CfnResponse, FunctionKind, InboundEvent, LifecycleEvent, RequestType,
    ResponseStatus, ScheduledEvent,
};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::fleet::{FanOutExecutor, Waiter};
use crate::ignition::IgnitionGenerator;
use crate::markers::MarkerStore;
use crate::ports::{
    ClusterProbe, ClusterScaler, InstallerRunner, ObjectStore, ResponseSink,
    ScheduleControl, StackBackend,
};
use crate::reconcile::{PassReport, Rebuilder, Reconciler, WebpageRenderer};
use crate::retry::RetryConfig;

const PULL_SECRET: &str = "PullSecret";
const SSH_KEY: &str = "SSHKey";

/// Runtime facts about the current invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InvocationContext {
    pub request_id: String,
    pub log_stream_name: String,
    /// Time left before the platform kills the invocation, when known.
    pub remaining: Option<Duration>,
}

/// External systems the director talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub stacks: Arc<dyn StackBackend>,
    pub objects: Arc<dyn ObjectStore>,
    pub probe: Arc<dyn ClusterProbe>,
    pub scaler: Arc<dyn ClusterScaler>,
    pub schedule: Arc<dyn ScheduleControl>,
    pub installer: Arc<dyn InstallerRunner>,
    pub responder: Arc<dyn ResponseSink>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

pub struct Services {
    config: Config,
    fanout: FanOutExecutor,
    reconciler: Reconciler,
    ignition: IgnitionGenerator,
    responder: Arc<dyn ResponseSink>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("cluster_name", &self.config.fleet.cluster_name)
            .field("fanout", &self.fanout)
            .field("reconciler", &self.reconciler)
            .field("ignition", &self.ignition)
            .field("responder", &"<dyn ResponseSink>")
            .finish()
    }
}

impl Services {
    pub fn new(config: Config, parts: Collaborators) -> Result<Self> {
        let markers =
            MarkerStore::new(parts.objects.clone(), &config.fleet.cluster_name);
        let waiter = Waiter::new(parts.stacks.clone(), &config.waiter);

        let fanout = FanOutExecutor::new(
            parts.stacks.clone(),
            markers.clone(),
            waiter.clone(),
            config.fleet.create_cloud9_instance,
        );
        let rebuilder = Rebuilder::new(
            parts.stacks.clone(),
            markers.clone(),
            waiter,
            RetryConfig::from(&config.rebuild),
            config.student_template.clone(),
        );
        let reconciler = Reconciler::new(
            config.fleet.clone(),
            &config.openshift.version,
            markers.clone(),
            parts.probe,
            parts.scaler,
            parts.schedule,
            WebpageRenderer::new(config.paths.webpage_template.as_deref())?,
            rebuilder,
        );
        let ignition = IgnitionGenerator::new(
            parts.installer,
            markers,
            config.fleet.clone(),
            &config.paths.install_config,
            config.paths.download_dir(),
        );

        Ok(Self {
            config,
            fanout,
            reconciler,
            ignition,
            responder: parts.responder,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvocationOutcome {
    Responded(ResponseStatus),
    Validated(PassReport),
}

/// Dispatches one raw payload.
///
/// Returns an error only when the payload names no response URL or the
/// lifecycle response could not be delivered.
pub async fn handle_event(
    services: &Services,
    payload: Value,
    context: &InvocationContext,
) -> Result<InvocationOutcome> {
    let budget = services.config.waiter.budget_within(context.remaining);

    match InboundEvent::from_value(payload)? {
        InboundEvent::Lifecycle(event) => {
            let failure = match handle_lifecycle(services, &event, budget).await {
                Ok(()) => None,
                Err(err) => {
                    error!(
                        request = %event.request_type,
                        logical_id = %event.logical_resource_id,
                        error = %err,
                        "lifecycle request failed"
                    );
                    Some(err.to_string())
                }
            };
            let status = if failure.is_some() {
                ResponseStatus::Failed
            } else {
                ResponseStatus::Success
            };
            let response = CfnResponse::for_event(
                &event,
                status,
                failure.as_deref(),
                &context.log_stream_name,
            );
            services
                .responder
                .send(&event.response_url, &response)
                .await?;
            Ok(InvocationOutcome::Responded(status))
        }
        InboundEvent::Rejected(rejected) => {
            error!(
                request_id = %rejected.request_id,
                logical_id = %rejected.logical_resource_id,
                reason = %rejected.reason,
                "lifecycle request rejected"
            );
            let response =
                CfnResponse::for_rejected(&rejected, &context.log_stream_name);
            services
                .responder
                .send(&rejected.response_url, &response)
                .await?;
            Ok(InvocationOutcome::Responded(ResponseStatus::Failed))
        }
        InboundEvent::Scheduled(tick) => {
            let deadline = Instant::now() + budget;
            Ok(InvocationOutcome::Validated(validate(services, &tick, deadline).await))
        }
    }
}

async fn handle_lifecycle(
    services: &Services,
    event: &LifecycleEvent,
    budget: Duration,
) -> Result<()> {
    match event.function()? {
        FunctionKind::DeployStacks => {
            let report = services.fanout.execute(event, budget).await?;
            info!(
                steps = report.steps.len(),
                settled = report.wait.all_reached(),
                "fan-out request handled"
            );
        }
        FunctionKind::GenerateIgnition => match event.request_type {
            RequestType::Create => {
                let secrets = install_secrets(event, &services.config.secrets);
                let generated = services.ignition.generate_all(&secrets).await?;
                info!(students = generated.len(), "ignition assets generated");
            }
            RequestType::Update => {
                info!("ignition assets are not regenerated on update");
            }
            RequestType::Delete => {
                services.ignition.teardown().await?;
            }
        },
    }
    Ok(())
}

async fn validate(
    services: &Services,
    tick: &ScheduledEvent,
    deadline: Instant,
) -> PassReport {
    info!(event_id = ?tick.id, source = ?tick.source, "validation tick");
    services.reconciler.run_pass(deadline).await
}

/// Secrets from the request win over the ones in configuration.
fn install_secrets(event: &LifecycleEvent, fallback: &InstallSecrets) -> InstallSecrets {
    let secrets = InstallSecrets {
        pull_secret: event
            .property(PULL_SECRET)
            .map(str::to_string)
            .or_else(|| fallback.pull_secret.clone()),
        ssh_key: event
            .property(SSH_KEY)
            .map(str::to_string)
            .or_else(|| fallback.ssh_key.clone()),
    };
    if secrets.pull_secret.is_none() || secrets.ssh_key.is_none() {
        warn!(?secrets, "install secrets incomplete");
    }
    secrets
}
