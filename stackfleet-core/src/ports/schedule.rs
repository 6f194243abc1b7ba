use async_trait::async_trait;

use crate::error::Result;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScheduleControl: Send + Sync {
    /// Stops the periodic trigger named `rule`.
    async fn disable_rule(&self, rule: &str) -> Result<()>;
}
