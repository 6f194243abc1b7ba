//! CloudFormation stack shapes used by the fan-out engine.
//!
//! [`StackRequest`] serializes in CloudFormation's own PascalCase layout so a
//! snapshot persisted in the marker store can be fed back into `CreateStack`
//! unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::student::StudentIndex;

/// Lifecycle status of a CloudFormation stack.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StackStatus {
    CreateInProgress,
    CreateFailed,
    CreateComplete,
    RollbackInProgress,
    RollbackFailed,
    RollbackComplete,
    DeleteInProgress,
    DeleteFailed,
    DeleteComplete,
    UpdateInProgress,
    UpdateCompleteCleanupInProgress,
    UpdateComplete,
    UpdateFailed,
    UpdateRollbackInProgress,
    UpdateRollbackFailed,
    UpdateRollbackCompleteCleanupInProgress,
    UpdateRollbackComplete,
    ReviewInProgress,
    ImportInProgress,
    ImportComplete,
    ImportRollbackInProgress,
    ImportRollbackFailed,
    ImportRollbackComplete,
    Other(String),
}

/// Statuses the existence resolver treats as "the stack is there".
///
/// `DELETE_COMPLETE` is absent so a torn-down stack name is free to reuse.
pub const LIVE_STACK_STATUSES: [StackStatus; 8] = [
    StackStatus::CreateComplete,
    StackStatus::CreateInProgress,
    StackStatus::UpdateComplete,
    StackStatus::UpdateRollbackComplete,
    StackStatus::RollbackComplete,
    StackStatus::CreateFailed,
    StackStatus::DeleteInProgress,
    StackStatus::DeleteFailed,
];

impl StackStatus {
    pub fn as_str(&self) -> &str {
        match self {
            StackStatus::CreateInProgress => "CREATE_IN_PROGRESS",
            StackStatus::CreateFailed => "CREATE_FAILED",
            StackStatus::CreateComplete => "CREATE_COMPLETE",
            StackStatus::RollbackInProgress => "ROLLBACK_IN_PROGRESS",
            StackStatus::RollbackFailed => "ROLLBACK_FAILED",
            StackStatus::RollbackComplete => "ROLLBACK_COMPLETE",
            StackStatus::DeleteInProgress => "DELETE_IN_PROGRESS",
            StackStatus::DeleteFailed => "DELETE_FAILED",
            StackStatus::DeleteComplete => "DELETE_COMPLETE",
            StackStatus::UpdateInProgress => "UPDATE_IN_PROGRESS",
            StackStatus::UpdateCompleteCleanupInProgress => {
                "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS"
            }
            StackStatus::UpdateComplete => "UPDATE_COMPLETE",
            StackStatus::UpdateFailed => "UPDATE_FAILED",
            StackStatus::UpdateRollbackInProgress => {
                "UPDATE_ROLLBACK_IN_PROGRESS"
            }
            StackStatus::UpdateRollbackFailed => "UPDATE_ROLLBACK_FAILED",
            StackStatus::UpdateRollbackCompleteCleanupInProgress => {
                "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS"
            }
            StackStatus::UpdateRollbackComplete => "UPDATE_ROLLBACK_COMPLETE",
            StackStatus::ReviewInProgress => "REVIEW_IN_PROGRESS",
            StackStatus::ImportInProgress => "IMPORT_IN_PROGRESS",
            StackStatus::ImportComplete => "IMPORT_COMPLETE",
            StackStatus::ImportRollbackInProgress => {
                "IMPORT_ROLLBACK_IN_PROGRESS"
            }
            StackStatus::ImportRollbackFailed => "IMPORT_ROLLBACK_FAILED",
            StackStatus::ImportRollbackComplete => "IMPORT_ROLLBACK_COMPLETE",
            StackStatus::Other(raw) => raw.as_str(),
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "CREATE_IN_PROGRESS" => StackStatus::CreateInProgress,
            "CREATE_FAILED" => StackStatus::CreateFailed,
            "CREATE_COMPLETE" => StackStatus::CreateComplete,
            "ROLLBACK_IN_PROGRESS" => StackStatus::RollbackInProgress,
            "ROLLBACK_FAILED" => StackStatus::RollbackFailed,
            "ROLLBACK_COMPLETE" => StackStatus::RollbackComplete,
            "DELETE_IN_PROGRESS" => StackStatus::DeleteInProgress,
            "DELETE_FAILED" => StackStatus::DeleteFailed,
            "DELETE_COMPLETE" => StackStatus::DeleteComplete,
            "UPDATE_IN_PROGRESS" => StackStatus::UpdateInProgress,
            "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS" => {
                StackStatus::UpdateCompleteCleanupInProgress
            }
            "UPDATE_COMPLETE" => StackStatus::UpdateComplete,
            "UPDATE_FAILED" => StackStatus::UpdateFailed,
            "UPDATE_ROLLBACK_IN_PROGRESS" => {
                StackStatus::UpdateRollbackInProgress
            }
            "UPDATE_ROLLBACK_FAILED" => StackStatus::UpdateRollbackFailed,
            "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS" => {
                StackStatus::UpdateRollbackCompleteCleanupInProgress
            }
            "UPDATE_ROLLBACK_COMPLETE" => StackStatus::UpdateRollbackComplete,
            "REVIEW_IN_PROGRESS" => StackStatus::ReviewInProgress,
            "IMPORT_IN_PROGRESS" => StackStatus::ImportInProgress,
            "IMPORT_COMPLETE" => StackStatus::ImportComplete,
            "IMPORT_ROLLBACK_IN_PROGRESS" => {
                StackStatus::ImportRollbackInProgress
            }
            "IMPORT_ROLLBACK_FAILED" => StackStatus::ImportRollbackFailed,
            "IMPORT_ROLLBACK_COMPLETE" => StackStatus::ImportRollbackComplete,
            other => StackStatus::Other(other.to_string()),
        }
    }

    /// True while CloudFormation is still working on the stack.
    pub fn is_in_progress(&self) -> bool {
        self.as_str().ends_with("_IN_PROGRESS")
    }

    pub fn is_live(&self) -> bool {
        LIVE_STACK_STATUSES.contains(self)
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for StackStatus {
    fn from(raw: String) -> Self {
        StackStatus::parse(&raw)
    }
}

impl From<StackStatus> for String {
    fn from(status: StackStatus) -> Self {
        status.as_str().to_string()
    }
}

/// IAM acknowledgements passed to `CreateStack`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    #[serde(rename = "CAPABILITY_IAM")]
    Iam,
    #[serde(rename = "CAPABILITY_NAMED_IAM")]
    NamedIam,
    #[serde(rename = "CAPABILITY_AUTO_EXPAND")]
    AutoExpand,
}

impl Capability {
    /// The set every child stack is created with.
    pub const FAN_OUT: [Capability; 3] =
        [Capability::Iam, Capability::AutoExpand, Capability::NamedIam];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Iam => "CAPABILITY_IAM",
            Capability::NamedIam => "CAPABILITY_NAMED_IAM",
            Capability::AutoExpand => "CAPABILITY_AUTO_EXPAND",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "CAPABILITY_IAM" => Some(Capability::Iam),
            "CAPABILITY_NAMED_IAM" => Some(Capability::NamedIam),
            "CAPABILITY_AUTO_EXPAND" => Some(Capability::AutoExpand),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StackParameter {
    pub parameter_key: String,
    pub parameter_value: String,
}

impl StackParameter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            parameter_key: key.into(),
            parameter_value: value.into(),
        }
    }
}

/// Everything needed to submit one `CreateStack` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StackRequest {
    pub stack_name: String,
    #[serde(rename = "TemplateURL")]
    pub template_url: String,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub parameters: Vec<StackParameter>,
    #[serde(default)]
    pub disable_rollback: bool,
}

impl StackRequest {
    /// Name of the child stack at `index` when `self` is the fan-out base.
    pub fn child_name(&self, index: StudentIndex) -> String {
        format!("{}-{}", self.stack_name, index)
    }

    /// Derives the request for one child stack.
    ///
    /// When `index_key` names one of the parameters, its value is replaced
    /// with the decimal index.
    pub fn for_index(
        &self,
        index: StudentIndex,
        index_key: Option<&str>,
    ) -> StackRequest {
        let mut child = self.clone();
        child.stack_name = self.child_name(index);
        if let Some(key) = index_key {
            child.set_parameter(key, index.to_string());
        }
        child
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.parameter_key == key)
            .map(|p| p.parameter_value.as_str())
    }

    /// Overwrites an existing parameter. Returns false if the key is absent.
    pub fn set_parameter(
        &mut self,
        key: &str,
        value: impl Into<String>,
    ) -> bool {
        match self.parameters.iter_mut().find(|p| p.parameter_key == key) {
            Some(param) => {
                param.parameter_value = value.into();
                true
            }
            None => false,
        }
    }
}

/// One row of a `ListStacks` page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackSummary {
    pub stack_name: String,
    pub stack_id: Option<String>,
    pub status: StackStatus,
}

/// A `ListStacks` page plus the continuation token, if any.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StackPage {
    pub summaries: Vec<StackSummary>,
    pub next_token: Option<String>,
}

/// The subset of `DescribeStacks` output needed to recreate a stack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDescription {
    pub stack_name: String,
    pub stack_id: Option<String>,
    pub status: StackStatus,
    pub capabilities: Vec<Capability>,
    pub parameters: Vec<StackParameter>,
}

impl StackDescription {
    pub fn to_request(&self, template_url: impl Into<String>) -> StackRequest {
        StackRequest {
            stack_name: self.stack_name.clone(),
            template_url: template_url.into(),
            capabilities: self.capabilities.clone(),
            parameters: self.parameters.clone(),
            disable_rollback: true,
        }
    }
}
