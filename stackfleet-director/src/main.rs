//! # Stackfleet director
//!
//! Lambda function behind the workshop's parent CloudFormation stack. It
//! answers custom-resource lifecycle requests (stack fan-out and ignition
//! generation) and the scheduled validation tick that finishes or rebuilds
//! student clusters.
//!
//! Without a subcommand the binary runs the Lambda runtime loop. `invoke`
//! feeds one event file through the same dispatcher for local testing.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Context;
use aws_config::BehaviorVersion;
use clap::{Parser, Subcommand};
use lambda_runtime::{LambdaEvent, service_fn};
use serde_json::{Value, json};
use stackfleet_config::{Config, ConfigLoad, ConfigLoader};
use stackfleet_core::infra::{
    CloudFormationBackend, EventBridgeSchedule, HttpResponseSink,
    OpenShiftInstaller, S3ObjectStore, ScaleReplicasScript,
};
use stackfleet_core::reconcile::HttpsProbe;
use stackfleet_core::toolchain::Toolchain;
use stackfleet_core::{
    Collaborators, InvocationContext, InvocationOutcome, Services,
    handle_event,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LOG_STREAM_ENV: &str = "AWS_LAMBDA_LOG_STREAM_NAME";
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "stackfleet-director")]
#[command(
    about = "Fans out and reconciles per-student OpenShift workshop stacks"
)]
struct Cli {
    /// Optional TOML file with tuning knobs
    #[arg(long, env = "STACKFLEET_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Dispatch a single event read from a JSON file and exit
    Invoke {
        /// Path to the event payload
        #[arg(long)]
        event: PathBuf,

        /// Log stream name reported in lifecycle responses
        #[arg(long, default_value = "local")]
        log_stream: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_runtime_config(cli.config.as_deref())?;
    let services = Arc::new(build_services(config).await?);

    match cli.command {
        Some(Command::Invoke { event, log_stream }) => {
            invoke_local(&services, &event, log_stream).await
        }
        None => run_lambda(services).await,
    }
}

fn load_runtime_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = path {
        loader = loader.with_config_path(path);
    }
    let ConfigLoad { config, warnings } =
        loader.load().context("failed to load configuration")?;

    let default_filter = config.log_level.clone().unwrap_or_else(|| "info".into());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "loaded configuration file");
    }
    for warning in warnings.iter() {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    info!(
        cluster = %config.fleet.cluster_name,
        students = config.fleet.num_students,
        openshift = %config.openshift.version,
        "configuration ready"
    );
    Ok(config)
}

async fn build_services(config: Config) -> anyhow::Result<Services> {
    let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let http = reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;

    let toolchain = Toolchain::new(
        http.clone(),
        config.openshift.clone(),
        config.paths.download_dir(),
    );
    let collaborators = Collaborators {
        stacks: Arc::new(CloudFormationBackend::new(&sdk_config)),
        objects: Arc::new(S3ObjectStore::new(
            &sdk_config,
            &config.fleet.auth_bucket,
        )),
        probe: Arc::new(
            HttpsProbe::new(&config.probe)
                .context("failed to build the cluster probe")?,
        ),
        scaler: Arc::new(ScaleReplicasScript::new(
            toolchain.clone(),
            &config.openshift.client_binary,
            &config.paths.scale_script,
        )),
        schedule: Arc::new(EventBridgeSchedule::new(&sdk_config)),
        installer: Arc::new(OpenShiftInstaller::new(
            toolchain,
            &config.openshift.install_binary,
        )),
        responder: Arc::new(HttpResponseSink::new(http)),
    };

    Services::new(config, collaborators).context("failed to assemble services")
}

async fn run_lambda(services: Arc<Services>) -> anyhow::Result<()> {
    info!("starting Lambda runtime");
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let services = services.clone();
        async move { dispatch(&services, event).await }
    }))
    .await
    .map_err(|err| anyhow::anyhow!("lambda runtime stopped: {err}"))
}

async fn dispatch(
    services: &Services,
    event: LambdaEvent<Value>,
) -> Result<Value, lambda_runtime::Error> {
    let LambdaEvent {
        payload,
        context: lambda_context,
    } = event;
    let context = InvocationContext {
        request_id: lambda_context.request_id.clone(),
        log_stream_name: std::env::var(LOG_STREAM_ENV).unwrap_or_default(),
        remaining: lambda_context
            .deadline()
            .duration_since(SystemTime::now())
            .ok(),
    };

    match handle_event(services, payload, &context).await {
        Ok(outcome) => Ok(summarize(&outcome)),
        Err(err) => {
            error!(request_id = %context.request_id, error = %err, "invocation failed");
            Err(err.into())
        }
    }
}

async fn invoke_local(
    services: &Services,
    path: &Path,
    log_stream: String,
) -> anyhow::Result<()> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let payload: Value = serde_json::from_slice(&raw)
        .with_context(|| format!("{} is not JSON", path.display()))?;
    let context = InvocationContext {
        request_id: "local".into(),
        log_stream_name: log_stream,
        remaining: None,
    };

    let outcome = handle_event(services, payload, &context)
        .await
        .context("event dispatch failed")?;
    println!("{}", serde_json::to_string_pretty(&summarize(&outcome))?);
    Ok(())
}

fn summarize(outcome: &InvocationOutcome) -> Value {
    match outcome {
        InvocationOutcome::Responded(status) => json!({ "responded": status }),
        InvocationOutcome::Validated(report) => json!({
            "validated": true,
            "failed": report.failed.iter().map(|index| index.get()).collect::<Vec<_>>(),
            "deferred": report
                .deferred
                .iter()
                .map(|(index, _)| index.get())
                .collect::<Vec<_>>(),
            "completed_now": report
                .completed_now
                .iter()
                .map(|index| index.get())
                .collect::<Vec<_>>(),
            "webpage_published": report.webpage_published,
            "rule_disabled": report.rule_disabled,
            "recreated": report
                .rebuild
                .as_ref()
                .map(|rebuild| rebuild.recreated.iter().map(|index| index.get()).collect::<Vec<_>>()),
        }),
    }
}
