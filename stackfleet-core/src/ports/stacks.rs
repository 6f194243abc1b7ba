use async_trait::async_trait;
use stackfleet_model::{
    StackDescription, StackPage, StackRequest, StackStatus,
};

use crate::error::Result;

/// The CloudFormation operations the engine relies on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StackBackend: Send + Sync {
    /// One `ListStacks` page restricted to `status_filter`.
    async fn list_stacks(
        &self,
        status_filter: &[StackStatus],
        next_token: Option<String>,
    ) -> Result<StackPage>;

    /// `None` when the backend reports that the stack does not exist.
    async fn describe_stack(
        &self,
        name: &str,
    ) -> Result<Option<StackDescription>>;

    /// Returns the new stack id.
    async fn create_stack(&self, request: &StackRequest) -> Result<String>;

    async fn delete_stack(&self, name: &str) -> Result<()>;
}
