use async_trait::async_trait;
use aws_sdk_cloudformation::Client;
use aws_sdk_cloudformation::error::{
    DisplayErrorContext, ProvideErrorMetadata, SdkError,
};
use aws_sdk_cloudformation::types::{
    Capability as CfnCapability, Parameter, Stack, StackStatus as CfnStatus,
};
use stackfleet_model::{
    Capability, StackDescription, StackPage, StackParameter, StackRequest,
    StackStatus, StackSummary,
};
use tracing::debug;

use crate::error::{FleetError, Result};
use crate::ports::StackBackend;

#[derive(Clone)]
pub struct CloudFormationBackend {
    client: Client,
}

impl std::fmt::Debug for CloudFormationBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudFormationBackend").finish_non_exhaustive()
    }
}

impl CloudFormationBackend {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn stacks_error<E, R>(operation: &str, err: SdkError<E, R>) -> FleetError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    FleetError::Stacks(format!(
        "{operation} failed: {}",
        DisplayErrorContext(&err)
    ))
}

fn status_of(raw: Option<&CfnStatus>) -> StackStatus {
    raw.map(|status| StackStatus::parse(status.as_str()))
        .unwrap_or_else(|| StackStatus::Other("UNKNOWN".into()))
}

fn describe(stack: &Stack) -> StackDescription {
    StackDescription {
        stack_name: stack.stack_name().unwrap_or_default().to_string(),
        stack_id: stack.stack_id().map(str::to_string),
        status: status_of(stack.stack_status()),
        capabilities: stack
            .capabilities()
            .iter()
            .filter_map(|cap| Capability::parse(cap.as_str()))
            .collect(),
        parameters: stack
            .parameters()
            .iter()
            .filter_map(|param| {
                Some(StackParameter::new(
                    param.parameter_key()?,
                    param.parameter_value().unwrap_or_default(),
                ))
            })
            .collect(),
    }
}

#[async_trait]
impl StackBackend for CloudFormationBackend {
    async fn list_stacks(
        &self,
        status_filter: &[StackStatus],
        next_token: Option<String>,
    ) -> Result<StackPage> {
        let mut request = self.client.list_stacks().set_next_token(next_token);
        for status in status_filter {
            request =
                request.stack_status_filter(CfnStatus::from(status.as_str()));
        }
        let response = request
            .send()
            .await
            .map_err(|err| stacks_error("ListStacks", err))?;

        let summaries = response
            .stack_summaries()
            .iter()
            .map(|summary| StackSummary {
                stack_name: summary.stack_name().unwrap_or_default().to_string(),
                stack_id: summary.stack_id().map(str::to_string),
                status: status_of(summary.stack_status()),
            })
            .collect();

        Ok(StackPage {
            summaries,
            next_token: response.next_token().map(str::to_string),
        })
    }

    async fn describe_stack(&self, name: &str) -> Result<Option<StackDescription>> {
        match self.client.describe_stacks().stack_name(name).send().await {
            Ok(response) => Ok(response.stacks().first().map(describe)),
            Err(err)
                if err.as_service_error().is_some_and(|service| {
                    service.code() == Some("ValidationError")
                        && service
                            .message()
                            .is_some_and(|m| m.contains("does not exist"))
                }) =>
            {
                debug!(stack = name, "stack does not exist");
                Ok(None)
            }
            Err(err) => Err(stacks_error("DescribeStacks", err)),
        }
    }

    async fn create_stack(&self, request: &StackRequest) -> Result<String> {
        let mut call = self
            .client
            .create_stack()
            .stack_name(&request.stack_name)
            .template_url(&request.template_url)
            .disable_rollback(request.disable_rollback);
        for capability in &request.capabilities {
            call = call.capabilities(CfnCapability::from(capability.as_str()));
        }
        for parameter in &request.parameters {
            call = call.parameters(
                Parameter::builder()
                    .parameter_key(&parameter.parameter_key)
                    .parameter_value(&parameter.parameter_value)
                    .build(),
            );
        }

        let response = call
            .send()
            .await
            .map_err(|err| stacks_error("CreateStack", err))?;
        Ok(response.stack_id().unwrap_or_default().to_string())
    }

    async fn delete_stack(&self, name: &str) -> Result<()> {
        self.client
            .delete_stack()
            .stack_name(name)
            .send()
            .await
            .map_err(|err| stacks_error("DeleteStack", err))?;
        Ok(())
    }
}
