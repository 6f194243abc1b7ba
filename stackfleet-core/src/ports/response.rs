use async_trait::async_trait;
use stackfleet_model::CfnResponse;

use crate::error::Result;

/// Delivers the custom-resource acknowledgement to CloudFormation.
#[async_trait]
pub trait ResponseSink: Send + Sync {
    async fn send(&self, response_url: &str, response: &CfnResponse) -> Result<()>;
}
