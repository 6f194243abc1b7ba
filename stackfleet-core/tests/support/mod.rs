//! In-memory stand-ins for the director's collaborators.
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use stackfleet_config::{
    Config, ConfigMetadata, FleetConfig, InstallSecrets, OpenShiftConfig,
    PathsConfig, ProbeConfig, RebuildConfig, StudentTemplateLocation,
    WaiterConfig,
};
use stackfleet_core::error::{FleetError, Result};
use stackfleet_core::ports::{
    ClusterProbe, ClusterScaler, InMemoryObjectStore, InstallerRunner,
    InstallerStep, ObjectStore, PutOptions, Reachability, ResponseSink,
    ScheduleControl, StackBackend,
};
use stackfleet_core::{Collaborators, Services};
use stackfleet_model::{
    CfnResponse, StackDescription, StackPage, StackRequest, StackStatus,
    StackSummary, StudentCluster,
};

pub const CLUSTER: &str = "ocpws";
pub const ZONE: &str = "labs.example.com";
pub const BASE_STACK: &str = "ws";
pub const TEMPLATE_URL: &str = "https://qs-bucket.s3.amazonaws.com/templates/student.yaml";
pub const RESPONSE_URL: &str = "https://cloudformation-custom-resource-response.example.com/signed";
pub const LOG_STREAM: &str = "2026/10/19/[$LATEST]abcdef";

#[derive(Clone, Debug)]
struct FakeStack {
    request: StackRequest,
    status: StackStatus,
    /// Polls left before `status` moves to `settles_to`.
    pending_polls: u32,
    settles_to: Option<StackStatus>,
}

#[derive(Debug, Default)]
struct StackState {
    stacks: BTreeMap<String, FakeStack>,
    created: Vec<StackRequest>,
    deleted: Vec<String>,
    next_id: u32,
}

/// CloudFormation stand-in. Creates and deletes settle on the next poll
/// unless a stack was seeded with a slower transition.
#[derive(Debug)]
pub struct FakeStackBackend {
    state: Mutex<StackState>,
    page_size: usize,
}

impl Default for FakeStackBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeStackBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::default(),
            page_size: 2,
        }
    }

    pub fn seed(&self, name: &str, status: StackStatus) {
        self.seed_transition(name, status, 0, None);
    }

    pub fn seed_transition(
        &self,
        name: &str,
        status: StackStatus,
        pending_polls: u32,
        settles_to: Option<StackStatus>,
    ) {
        let request = StackRequest {
            stack_name: name.to_string(),
            template_url: TEMPLATE_URL.to_string(),
            capabilities: vec![],
            parameters: vec![],
            disable_rollback: true,
        };
        self.state.lock().unwrap().stacks.insert(
            name.to_string(),
            FakeStack {
                request,
                status,
                pending_polls,
                settles_to,
            },
        );
    }

    pub fn status(&self, name: &str) -> Option<StackStatus> {
        self.state
            .lock()
            .unwrap()
            .stacks
            .get(name)
            .map(|stack| stack.status.clone())
    }

    pub fn created(&self) -> Vec<StackRequest> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn created_names(&self) -> Vec<String> {
        self.created().into_iter().map(|r| r.stack_name).collect()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }
}

#[async_trait]
impl StackBackend for FakeStackBackend {
    async fn list_stacks(
        &self,
        status_filter: &[StackStatus],
        next_token: Option<String>,
    ) -> Result<StackPage> {
        let state = self.state.lock().unwrap();
        let offset: usize = next_token
            .as_deref()
            .map(|token| token.parse().unwrap())
            .unwrap_or(0);
        let matching: Vec<StackSummary> = state
            .stacks
            .iter()
            .filter(|(_, stack)| status_filter.contains(&stack.status))
            .map(|(name, stack)| StackSummary {
                stack_name: name.clone(),
                stack_id: Some(format!("arn:{name}")),
                status: stack.status.clone(),
            })
            .collect();
        let end = (offset + self.page_size).min(matching.len());
        Ok(StackPage {
            summaries: matching[offset.min(end)..end].to_vec(),
            next_token: (end < matching.len()).then(|| end.to_string()),
        })
    }

    async fn describe_stack(&self, name: &str) -> Result<Option<StackDescription>> {
        let mut state = self.state.lock().unwrap();
        let Some(stack) = state.stacks.get_mut(name) else {
            return Ok(None);
        };
        if stack.pending_polls > 0 {
            stack.pending_polls -= 1;
        } else if let Some(next) = stack.settles_to.take() {
            stack.status = next;
        }
        if stack.status == StackStatus::DeleteComplete {
            return Ok(None);
        }
        Ok(Some(StackDescription {
            stack_name: name.to_string(),
            stack_id: Some(format!("arn:{name}")),
            status: stack.status.clone(),
            capabilities: stack.request.capabilities.clone(),
            parameters: stack.request.parameters.clone(),
        }))
    }

    async fn create_stack(&self, request: &StackRequest) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.stacks.get(&request.stack_name)
            && existing.status != StackStatus::DeleteComplete
        {
            return Err(FleetError::Stacks(format!(
                "AlreadyExistsException: Stack [{}] already exists",
                request.stack_name
            )));
        }
        state.next_id += 1;
        let id = format!("arn:aws:cloudformation:stack/{}/{}", request.stack_name, state.next_id);
        state.created.push(request.clone());
        state.stacks.insert(
            request.stack_name.clone(),
            FakeStack {
                request: request.clone(),
                status: StackStatus::CreateInProgress,
                pending_polls: 0,
                settles_to: Some(StackStatus::CreateComplete),
            },
        );
        Ok(id)
    }

    async fn delete_stack(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.deleted.push(name.to_string());
        if let Some(stack) = state.stacks.get_mut(name) {
            stack.status = StackStatus::DeleteInProgress;
            stack.pending_polls = 0;
            stack.settles_to = Some(StackStatus::DeleteComplete);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingResponseSink {
    sent: Mutex<Vec<(String, CfnResponse)>>,
}

impl RecordingResponseSink {
    pub fn sent(&self) -> Vec<(String, CfnResponse)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponseSink for RecordingResponseSink {
    async fn send(&self, response_url: &str, response: &CfnResponse) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((response_url.to_string(), response.clone()));
        Ok(())
    }
}

/// Wraps the in-memory store and throttles reads of chosen keys.
#[derive(Debug)]
pub struct ThrottlingObjectStore {
    inner: Arc<InMemoryObjectStore>,
    throttled: Mutex<BTreeSet<String>>,
}

impl ThrottlingObjectStore {
    pub fn new(inner: Arc<InMemoryObjectStore>) -> Self {
        Self {
            inner,
            throttled: Mutex::default(),
        }
    }

    pub fn throttle(&self, key: &str) {
        self.throttled.lock().unwrap().insert(key.to_string());
    }

    fn check(&self, key: &str) -> Result<()> {
        if self.throttled.lock().unwrap().contains(key) {
            return Err(FleetError::Objects(format!("SlowDown: throttled reading {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for ThrottlingObjectStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        self.check(key)?;
        self.inner.exists(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check(key)?;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, body: Vec<u8>, options: PutOptions) -> Result<()> {
        self.inner.put(key, body, options).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list_keys(prefix).await
    }

    async fn delete_all(&self) -> Result<usize> {
        self.inner.delete_all().await
    }
}

/// Answers with an untrusted certificate for the configured API URLs.
#[derive(Debug, Default)]
pub struct FakeProbe {
    reachable: Mutex<BTreeSet<String>>,
    probed: Mutex<Vec<String>>,
    delay: Mutex<Duration>,
}

impl FakeProbe {
    pub fn make_reachable(&self, student: &StudentCluster) {
        self.reachable.lock().unwrap().insert(student.api_url());
    }

    /// Every probe takes `delay` of (tokio) time.
    pub fn slow_down(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterProbe for FakeProbe {
    async fn probe(&self, api_url: &str) -> Reachability {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.probed.lock().unwrap().push(api_url.to_string());
        if self.reachable.lock().unwrap().contains(api_url) {
            Reachability::UntrustedCertificate
        } else {
            Reachability::Unreachable("connection refused".into())
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeScaler {
    failing: Mutex<BTreeSet<String>>,
    scaled: Mutex<Vec<String>>,
}

impl FakeScaler {
    pub fn fail_for(&self, student: &StudentCluster) {
        self.failing.lock().unwrap().insert(student.name.clone());
    }

    pub fn scaled(&self) -> Vec<String> {
        self.scaled.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterScaler for FakeScaler {
    async fn scale(&self, student: &StudentCluster, kubeconfig: &[u8]) -> Result<()> {
        assert!(!kubeconfig.is_empty());
        if self.failing.lock().unwrap().contains(&student.name) {
            return Err(FleetError::Command {
                command: "openshift-4-scale-replicas".into(),
                status: "exit status: 1".into(),
                stderr: "machineset not found".into(),
            });
        }
        self.scaled.lock().unwrap().push(student.name.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeSchedule {
    disabled: Mutex<Vec<String>>,
}

impl FakeSchedule {
    pub fn disabled(&self) -> Vec<String> {
        self.disabled.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScheduleControl for FakeSchedule {
    async fn disable_rule(&self, rule: &str) -> Result<()> {
        self.disabled.lock().unwrap().push(rule.to_string());
        Ok(())
    }
}

/// Writes the files the real installer would leave behind.
#[derive(Debug, Default)]
pub struct FakeInstaller {
    steps: Mutex<Vec<(InstallerStep, PathBuf)>>,
}

impl FakeInstaller {
    pub fn steps(&self) -> Vec<(InstallerStep, PathBuf)> {
        self.steps.lock().unwrap().clone()
    }
}

#[async_trait]
impl InstallerRunner for FakeInstaller {
    async fn ensure_installed(&self) -> Result<()> {
        Ok(())
    }

    async fn run(&self, step: InstallerStep, assets_dir: &Path) -> Result<()> {
        self.steps
            .lock()
            .unwrap()
            .push((step, assets_dir.to_path_buf()));
        if step == InstallerStep::IgnitionConfigs {
            let name = assets_dir.file_name().unwrap().to_string_lossy().to_string();
            tokio::fs::create_dir_all(assets_dir.join("auth")).await?;
            tokio::fs::write(assets_dir.join("auth/kubeconfig"), format!("kubeconfig {name}")).await?;
            tokio::fs::write(assets_dir.join("auth/kubeadmin-password"), format!("pw-{name}\n")).await?;
            tokio::fs::write(assets_dir.join("master.ign"), "{}").await?;
            tokio::fs::write(assets_dir.join("bootstrap.ign"), "{}").await?;
        }
        Ok(())
    }
}

pub fn test_config(num_students: u32, work_dir: &Path) -> Config {
    Config {
        fleet: FleetConfig {
            cluster_name: CLUSTER.into(),
            num_students,
            hosted_zone_name: ZONE.into(),
            auth_bucket: "ocpws-auth".into(),
            create_cloud9_instance: false,
        },
        openshift: OpenShiftConfig {
            version: "4.14.1".into(),
            mirror_url: "https://mirror.example.com/ocp/".into(),
            install_binary: "openshift-install".into(),
            client_binary: "openshift-client".into(),
        },
        student_template: Some(StudentTemplateLocation {
            bucket: "qs-bucket".into(),
            key_prefix: String::new(),
            template: "student.yaml".into(),
        }),
        secrets: InstallSecrets {
            pull_secret: Some("{\"auths\":{}}".into()),
            ssh_key: Some("ssh-ed25519 AAAA workshop".into()),
        },
        waiter: WaiterConfig {
            poll_interval: Duration::from_secs(5),
            max_failures: 3,
            budget: Duration::from_secs(600),
            deadline_margin: Duration::from_secs(10),
        },
        probe: ProbeConfig::default(),
        rebuild: RebuildConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
        },
        paths: PathsConfig {
            download_dir: work_dir.to_path_buf(),
            install_config: work_dir.join("install-config.yaml"),
            ..PathsConfig::default()
        },
        log_level: None,
        metadata: ConfigMetadata::default(),
    }
}

#[derive(Debug)]
pub struct Harness {
    pub stacks: Arc<FakeStackBackend>,
    pub objects: Arc<InMemoryObjectStore>,
    /// The store the services actually talk to; wraps `objects`.
    pub store: Arc<ThrottlingObjectStore>,
    pub probe: Arc<FakeProbe>,
    pub scaler: Arc<FakeScaler>,
    pub schedule: Arc<FakeSchedule>,
    pub installer: Arc<FakeInstaller>,
    pub responder: Arc<RecordingResponseSink>,
    pub services: Services,
    pub work_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(num_students: u32) -> Self {
        Self::with_config(num_students, |_| {})
    }

    pub fn with_config(num_students: u32, adjust: impl FnOnce(&mut Config)) -> Self {
        let work_dir = tempfile::tempdir().unwrap();
        let mut config = test_config(num_students, work_dir.path());
        adjust(&mut config);

        let stacks = Arc::new(FakeStackBackend::new());
        let objects = Arc::new(InMemoryObjectStore::new());
        let store = Arc::new(ThrottlingObjectStore::new(objects.clone()));
        let probe = Arc::new(FakeProbe::default());
        let scaler = Arc::new(FakeScaler::default());
        let schedule = Arc::new(FakeSchedule::default());
        let installer = Arc::new(FakeInstaller::default());
        let responder = Arc::new(RecordingResponseSink::default());

        let services = Services::new(
            config,
            Collaborators {
                stacks: stacks.clone(),
                objects: store.clone(),
                probe: probe.clone(),
                scaler: scaler.clone(),
                schedule: schedule.clone(),
                installer: installer.clone(),
                responder: responder.clone(),
            },
        )
        .unwrap();

        Self {
            stacks,
            objects,
            store,
            probe,
            scaler,
            schedule,
            installer,
            responder,
            services,
            work_dir,
        }
    }

    pub fn student(&self, index: u32) -> StudentCluster {
        StudentCluster::new(CLUSTER, ZONE, index.into())
    }
}

/// A DeployCF lifecycle payload for `num_stacks` children.
pub fn deploy_payload(
    request_type: &str,
    num_stacks: &str,
    previous: Option<&str>,
) -> Value {
    let properties = |count: &str| {
        json!({
            "ServiceToken": "arn:aws:lambda:us-east-1:123456789012:function:director",
            "Function": "DeployCF",
            "StackName": BASE_STACK,
            "TemplateURL": TEMPLATE_URL,
            "NumStacks": count,
            "KeyToUpdate": "StudentNumber",
            "StudentNumber": "placeholder",
            "HostedZoneName": ZONE,
        })
    };
    let mut payload = json!({
        "RequestType": request_type,
        "ResponseURL": RESPONSE_URL,
        "StackId": "arn:aws:cloudformation:us-east-1:123456789012:stack/workshop/guid",
        "RequestId": "req-1",
        "ResourceType": "Custom::StackDirector",
        "LogicalResourceId": "StudentStacks",
        "ResourceProperties": properties(num_stacks),
    });
    if let Some(previous) = previous {
        payload["OldResourceProperties"] = properties(previous);
        payload["PhysicalResourceId"] = json!("existing-physical-id");
    }
    payload
}

pub fn scheduled_payload() -> Value {
    json!({
        "id": "tick-1",
        "source": "aws.events",
        "detail-type": "Scheduled Event",
        "resources": ["arn:aws:events:us-east-1:123456789012:rule/ocpws-ValidateEvent"],
        "detail": {},
    })
}
