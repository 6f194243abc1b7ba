use std::sync::Arc;

use stackfleet_model::{LIVE_STACK_STATUSES, StackSummary};
use tracing::debug;

use crate::error::Result;
use crate::ports::StackBackend;

/// Looks up stacks among the live statuses only.
///
/// A name whose only record is `DELETE_COMPLETE` is reported as absent, so a
/// torn-down child can be recreated under the same name.
#[derive(Clone)]
pub struct StackResolver {
    backend: Arc<dyn StackBackend>,
}

impl std::fmt::Debug for StackResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackResolver")
            .field("backend", &"<dyn StackBackend>")
            .finish()
    }
}

impl StackResolver {
    pub fn new(backend: Arc<dyn StackBackend>) -> Self {
        Self { backend }
    }

    /// First exact name match across every page. Backend errors propagate.
    pub async fn find_stack(&self, name: &str) -> Result<Option<StackSummary>> {
        let mut next_token = None;
        loop {
            let page = self
                .backend
                .list_stacks(&LIVE_STACK_STATUSES, next_token)
                .await?;

            if let Some(found) = page
                .summaries
                .into_iter()
                .find(|summary| summary.stack_name == name)
            {
                debug!(stack = name, status = %found.status, "stack found");
                return Ok(Some(found));
            }

            match page.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FleetError;
    use crate::ports::stacks::MockStackBackend;
    use mockall::Sequence;
    use stackfleet_model::{StackPage, StackStatus};

    fn summary(name: &str, status: StackStatus) -> StackSummary {
        StackSummary {
            stack_name: name.into(),
            stack_id: Some(format!("arn:{name}")),
            status,
        }
    }

    #[tokio::test]
    async fn pages_until_the_name_is_found() {
        let mut backend = MockStackBackend::new();
        let mut seq = Sequence::new();
        backend
            .expect_list_stacks()
            .withf(|filter, token| {
                filter.len() == LIVE_STACK_STATUSES.len() && token.is_none()
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(StackPage {
                    summaries: vec![summary(
                        "other",
                        StackStatus::CreateComplete,
                    )],
                    next_token: Some("page-2".into()),
                })
            });
        backend
            .expect_list_stacks()
            .withf(|_, token| token.as_deref() == Some("page-2"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(StackPage {
                    summaries: vec![summary(
                        "ws-student-1",
                        StackStatus::CreateInProgress,
                    )],
                    next_token: None,
                })
            });

        let resolver = StackResolver::new(Arc::new(backend));
        let found = resolver.find_stack("ws-student-1").await.unwrap();
        assert_eq!(found.unwrap().status, StackStatus::CreateInProgress);
    }

    #[tokio::test]
    async fn missing_name_is_none() {
        let mut backend = MockStackBackend::new();
        backend
            .expect_list_stacks()
            .returning(|_, _| Ok(StackPage::default()));
        let resolver = StackResolver::new(Arc::new(backend));
        assert!(resolver.find_stack("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn backend_errors_propagate() {
        let mut backend = MockStackBackend::new();
        backend
            .expect_list_stacks()
            .times(1)
            .returning(|_, _| Err(FleetError::Stacks("throttled".into())));
        let resolver = StackResolver::new(Arc::new(backend));
        assert!(matches!(
            resolver.find_stack("any").await,
            Err(FleetError::Stacks(_))
        ));
    }
}
