use async_trait::async_trait;
use aws_sdk_eventbridge::Client;
use aws_sdk_eventbridge::error::DisplayErrorContext;

use crate::error::{FleetError, Result};
use crate::ports::ScheduleControl;

#[derive(Clone)]
pub struct EventBridgeSchedule {
    client: Client,
}

impl std::fmt::Debug for EventBridgeSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBridgeSchedule").finish_non_exhaustive()
    }
}

impl EventBridgeSchedule {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl ScheduleControl for EventBridgeSchedule {
    async fn disable_rule(&self, rule: &str) -> Result<()> {
        self.client
            .disable_rule()
            .name(rule)
            .send()
            .await
            .map_err(|err| {
                FleetError::Schedule(format!(
                    "DisableRule {rule} failed: {}",
                    DisplayErrorContext(&err)
                ))
            })?;
        Ok(())
    }
}
