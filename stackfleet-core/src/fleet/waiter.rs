//! Blocking waits for stacks to reach a terminal status.
//!
//! Entries are taken from the tail of the queue. A polling error puts the
//! entry back at the head so every other entry gets a turn before it is
//! polled again; after `max_failures` consecutive errors it is abandoned.
//! The whole call is bounded by a wall-clock budget, after which every entry
//! still pending is reported as timed out.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use stackfleet_config::WaiterConfig;
use stackfleet_model::StackStatus;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::ports::StackBackend;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminalState {
    CreateComplete,
    DeleteComplete,
}

impl TerminalState {
    pub fn status(&self) -> StackStatus {
        match self {
            TerminalState::CreateComplete => StackStatus::CreateComplete,
            TerminalState::DeleteComplete => StackStatus::DeleteComplete,
        }
    }

    fn is_satisfied_by(&self, status: &StackStatus) -> bool {
        match self {
            TerminalState::CreateComplete => matches!(
                status,
                StackStatus::CreateComplete | StackStatus::UpdateComplete
            ),
            TerminalState::DeleteComplete => {
                *status == StackStatus::DeleteComplete
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaiterEntry {
    pub stack_name: String,
    pub terminal_state: TerminalState,
}

impl WaiterEntry {
    pub fn create(stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            terminal_state: TerminalState::CreateComplete,
        }
    }

    pub fn delete(stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            terminal_state: TerminalState::DeleteComplete,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Reached,
    /// The stack settled in a status other than the one awaited.
    Failed(StackStatus),
    Abandoned { failures: u32, last_error: String },
    TimedOut,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WaitReport {
    pub outcomes: Vec<(WaiterEntry, WaitOutcome)>,
}

impl WaitReport {
    pub fn all_reached(&self) -> bool {
        self.outcomes
            .iter()
            .all(|(_, outcome)| *outcome == WaitOutcome::Reached)
    }

    pub fn outcome(&self, stack_name: &str) -> Option<&WaitOutcome> {
        self.outcomes
            .iter()
            .find(|(entry, _)| entry.stack_name == stack_name)
            .map(|(_, outcome)| outcome)
    }

    /// Entries that did not reach their terminal state.
    pub fn stragglers(
        &self,
    ) -> impl Iterator<Item = &(WaiterEntry, WaitOutcome)> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome != WaitOutcome::Reached)
    }
}

struct Pending {
    entry: WaiterEntry,
    failures: u32,
    last_error: Option<String>,
}

enum Poll {
    Done(WaitOutcome),
    Again,
    Error(String),
}

#[derive(Clone)]
pub struct Waiter {
    backend: Arc<dyn StackBackend>,
    poll_interval: Duration,
    max_failures: u32,
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter")
            .field("backend", &"<dyn StackBackend>")
            .field("poll_interval", &self.poll_interval)
            .field("max_failures", &self.max_failures)
            .finish()
    }
}

impl Waiter {
    pub fn new(backend: Arc<dyn StackBackend>, config: &WaiterConfig) -> Self {
        Self {
            backend,
            poll_interval: config.poll_interval,
            max_failures: config.max_failures.max(1),
        }
    }

    pub async fn await_all(
        &self,
        entries: Vec<WaiterEntry>,
        budget: Duration,
    ) -> WaitReport {
        let deadline = Instant::now() + budget;
        let mut queue: VecDeque<Pending> = entries
            .into_iter()
            .map(|entry| Pending {
                entry,
                failures: 0,
                last_error: None,
            })
            .collect();
        let mut report = WaitReport::default();

        while let Some(mut pending) = queue.pop_back() {
            info!(
                stack = %pending.entry.stack_name,
                target = %pending.entry.terminal_state.status(),
                "waiting for stack"
            );

            let outcome = loop {
                if Instant::now() >= deadline {
                    break Some(WaitOutcome::TimedOut);
                }

                match self.poll(&pending.entry).await {
                    Poll::Done(outcome) => break Some(outcome),
                    Poll::Again => self.sleep_until_next(deadline).await,
                    Poll::Error(error) => {
                        pending.failures += 1;
                        warn!(
                            stack = %pending.entry.stack_name,
                            failures = pending.failures,
                            %error,
                            "stack poll failed"
                        );
                        pending.last_error = Some(error);
                        break None;
                    }
                }
            };

            match outcome {
                Some(WaitOutcome::TimedOut) => {
                    report.outcomes.push((pending.entry, WaitOutcome::TimedOut));
                    for rest in queue.drain(..).rev() {
                        report.outcomes.push((rest.entry, WaitOutcome::TimedOut));
                    }
                    warn!("wait budget exhausted; remaining stacks left to later passes");
                    break;
                }
                Some(outcome) => {
                    debug!(
                        stack = %pending.entry.stack_name,
                        ?outcome,
                        "wait finished"
                    );
                    report.outcomes.push((pending.entry, outcome));
                }
                None if pending.failures >= self.max_failures => {
                    let outcome = WaitOutcome::Abandoned {
                        failures: pending.failures,
                        last_error: pending.last_error.unwrap_or_default(),
                    };
                    warn!(
                        stack = %pending.entry.stack_name,
                        ?outcome,
                        "giving up on stack"
                    );
                    report.outcomes.push((pending.entry, outcome));
                }
                None => {
                    queue.push_front(pending);
                    self.sleep_until_next(deadline).await;
                }
            }
        }

        report
    }

    async fn poll(&self, entry: &WaiterEntry) -> Poll {
        match self.backend.describe_stack(&entry.stack_name).await {
            Ok(Some(description)) => {
                let status = description.status;
                if entry.terminal_state.is_satisfied_by(&status) {
                    Poll::Done(WaitOutcome::Reached)
                } else if status.is_in_progress() {
                    Poll::Again
                } else {
                    Poll::Done(WaitOutcome::Failed(status))
                }
            }
            Ok(None) => match entry.terminal_state {
                TerminalState::DeleteComplete => Poll::Done(WaitOutcome::Reached),
                TerminalState::CreateComplete => {
                    Poll::Error("stack not visible yet".to_string())
                }
            },
            Err(err) => Poll::Error(err.to_string()),
        }
    }

    async fn sleep_until_next(&self, deadline: Instant) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        let wake = (now + self.poll_interval).min(deadline);
        tokio::time::sleep_until(wake).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FleetError;
    use crate::ports::stacks::MockStackBackend;
    use mockall::Sequence;
    use stackfleet_model::StackDescription;

    fn described(name: &str, status: StackStatus) -> StackDescription {
        StackDescription {
            stack_name: name.into(),
            stack_id: None,
            status,
            capabilities: vec![],
            parameters: vec![],
        }
    }

    fn config(max_failures: u32) -> WaiterConfig {
        WaiterConfig {
            poll_interval: Duration::from_secs(10),
            max_failures,
            budget: Duration::from_secs(600),
            deadline_margin: Duration::from_secs(5),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_terminal_state() {
        let mut backend = MockStackBackend::new();
        let mut seq = Sequence::new();
        backend
            .expect_describe_stack()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|name| {
                Ok(Some(described(name, StackStatus::CreateInProgress)))
            });
        backend
            .expect_describe_stack()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name| {
                Ok(Some(described(name, StackStatus::CreateComplete)))
            });

        let waiter = Waiter::new(Arc::new(backend), &config(3));
        let report = waiter
            .await_all(vec![WaiterEntry::create("a")], Duration::from_secs(600))
            .await;
        assert_eq!(report.outcome("a"), Some(&WaitOutcome::Reached));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_are_awaited_last_in_first_out() {
        let mut backend = MockStackBackend::new();
        let mut seq = Sequence::new();
        for expected in ["c", "b", "a"] {
            backend
                .expect_describe_stack()
                .withf(move |name| name == expected)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|name| {
                    Ok(Some(described(name, StackStatus::CreateComplete)))
                });
        }

        let waiter = Waiter::new(Arc::new(backend), &config(3));
        let entries = ["a", "b", "c"].map(WaiterEntry::create).to_vec();
        let report = waiter.await_all(entries, Duration::from_secs(600)).await;
        let order: Vec<_> = report
            .outcomes
            .iter()
            .map(|(e, _)| e.stack_name.as_str())
            .collect();
        assert_eq!(order, vec!["c", "b", "a"]);
        assert!(report.all_reached());
    }

    #[tokio::test(start_paused = true)]
    async fn failing_entry_is_requeued_behind_the_others() {
        let mut backend = MockStackBackend::new();
        let mut seq = Sequence::new();
        backend
            .expect_describe_stack()
            .withf(|name| name == "b")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(FleetError::Stacks("Throttling".into())));
        backend
            .expect_describe_stack()
            .withf(|name| name == "a")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name| {
                Ok(Some(described(name, StackStatus::CreateComplete)))
            });
        backend
            .expect_describe_stack()
            .withf(|name| name == "b")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name| {
                Ok(Some(described(name, StackStatus::CreateComplete)))
            });

        let waiter = Waiter::new(Arc::new(backend), &config(3));
        let entries = vec![WaiterEntry::create("a"), WaiterEntry::create("b")];
        let report = waiter.await_all(entries, Duration::from_secs(600)).await;
        assert!(report.all_reached());
        assert_eq!(report.outcomes[0].0.stack_name, "a");
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_errors_abandon_the_entry() {
        let mut backend = MockStackBackend::new();
        backend
            .expect_describe_stack()
            .times(2)
            .returning(|_| Err(FleetError::Stacks("AccessDenied".into())));

        let waiter = Waiter::new(Arc::new(backend), &config(2));
        let report = waiter
            .await_all(vec![WaiterEntry::create("a")], Duration::from_secs(600))
            .await;
        match report.outcome("a") {
            Some(WaitOutcome::Abandoned {
                failures,
                last_error,
            }) => {
                assert_eq!(*failures, 2);
                assert!(last_error.contains("AccessDenied"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn missing_stack_satisfies_delete() {
        let mut backend = MockStackBackend::new();
        let mut seq = Sequence::new();
        backend
            .expect_describe_stack()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name| {
                Ok(Some(described(name, StackStatus::DeleteInProgress)))
            });
        backend
            .expect_describe_stack()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));

        let waiter = Waiter::new(Arc::new(backend), &config(3));
        let report = waiter
            .await_all(vec![WaiterEntry::delete("gone")], Duration::from_secs(600))
            .await;
        assert_eq!(report.outcome("gone"), Some(&WaitOutcome::Reached));
    }

    #[tokio::test(start_paused = true)]
    async fn settled_failure_status_is_reported() {
        let mut backend = MockStackBackend::new();
        backend.expect_describe_stack().returning(|name| {
            Ok(Some(described(name, StackStatus::CreateFailed)))
        });

        let waiter = Waiter::new(Arc::new(backend), &config(3));
        let report = waiter
            .await_all(vec![WaiterEntry::create("a")], Duration::from_secs(600))
            .await;
        assert_eq!(
            report.outcome("a"),
            Some(&WaitOutcome::Failed(StackStatus::CreateFailed))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_times_out_every_pending_entry() {
        let mut backend = MockStackBackend::new();
        backend.expect_describe_stack().returning(|name| {
            Ok(Some(described(name, StackStatus::CreateInProgress)))
        });

        let waiter = Waiter::new(Arc::new(backend), &config(3));
        let entries = vec![WaiterEntry::create("a"), WaiterEntry::create("b")];
        let report = waiter.await_all(entries, Duration::from_secs(35)).await;
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.outcome("a"), Some(&WaitOutcome::TimedOut));
        assert_eq!(report.outcome("b"), Some(&WaitOutcome::TimedOut));
        assert_eq!(report.stragglers().count(), 2);
    }
}
