//! # Specialist Supervisor
//!
//! Fans a task set out to the registered specialists and fans the results
//! back into a fixed slot array, one slot per task.
//!
//! ```text
//!            ┌─▶ task 0 ── timeout(deadline) ──┐
//! tasks ─────┼─▶ task 1 ── timeout(deadline) ──┼──▶ slots[0..n] ──▶ results
//!            └─▶ task 2 ── timeout(deadline) ──┘
//!                       ▲
//!        cancel / global ceiling / early-synthesis release
//! ```
//!
//! Adapter errors, panics, and timeouts all settle a slot; none of them
//! fail the run. The run itself fails only on cancellation, or when every
//! task missed and the policy requires a success.

use crate::config::{EarlySynthesis, LateResults, OrchestratorConfig};
use crate::error::OrchestratorError;
use crate::specialists::{Specialist, SpecialistRegistry};
use crate::swarm::events::{SpecialistState, StreamEvent};
use crate::swarm::task::{Outcome, SpecialistResult, SpecialistTask};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Live specialist-status feed consumed by the emitter side.
pub type StatusSender = mpsc::UnboundedSender<StreamEvent>;

/// Knobs that trade latency against completeness.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupervisorPolicy {
    pub global_timeout: Duration,
    pub require_success: bool,
    pub early_synthesis: EarlySynthesis,
    pub late_results: LateResults,
}

impl Default for SupervisorPolicy {
    fn default() -> Self {
        Self::from_config(&OrchestratorConfig::default())
    }
}

impl SupervisorPolicy {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            global_timeout: config.global_timeout(),
            require_success: config.require_success,
            early_synthesis: config.early_synthesis,
            late_results: config.late_results,
        }
    }
}

/// Why the collection loop stopped before every slot settled.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Release {
    AllSettled,
    Ceiling,
    Early,
}

#[derive(Clone)]
pub struct SpecialistSupervisor {
    registry: SpecialistRegistry,
    policy: SupervisorPolicy,
}

impl SpecialistSupervisor {
    pub fn new(registry: SpecialistRegistry, policy: SupervisorPolicy) -> Self {
        Self { registry, policy }
    }

    pub fn policy(&self) -> &SupervisorPolicy {
        &self.policy
    }

    /// Run every task concurrently and return one result per task, in task order.
    pub async fn run(
        &self,
        tasks: Vec<SpecialistTask>,
        status: StatusSender,
        cancel: CancellationToken,
    ) -> Result<Vec<SpecialistResult>, OrchestratorError> {
        let total = tasks.len();
        let dispatched_at = Instant::now();
        let mut slots: Vec<Option<SpecialistResult>> = (0..total).map(|_| None).collect();
        let mut pending: Vec<Option<SpecialistTask>> = Vec::with_capacity(total);
        let mut set = JoinSet::new();

        for (slot, task) in tasks.into_iter().enumerate() {
            tracing::info!(
                specialist = %task.kind(),
                deadline_ms = task.deadline().as_millis() as u64,
                "dispatching specialist"
            );
            let _ = status.send(StreamEvent::status(task.kind(), SpecialistState::Started));
            let adapter = self.registry.get(task.kind());
            let owned = task.clone();
            set.spawn(async move {
                let started = Instant::now();
                let outcome = invoke_with_deadline(adapter, &owned).await;
                (slot, SpecialistResult::new(owned, outcome, started.elapsed()))
            });
            pending.push(Some(task));
        }

        let ceiling = tokio::time::sleep(self.policy.global_timeout);
        tokio::pin!(ceiling);

        let mut settled = 0;
        let mut succeeded = 0;
        let release = loop {
            if settled == total {
                break Release::AllSettled;
            }
            if self.policy.early_synthesis.is_met(total, settled, succeeded) {
                break Release::Early;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(settled, total, "dispatch cancelled");
                    set.abort_all();
                    return Err(OrchestratorError::StreamAborted);
                }
                _ = &mut ceiling => {
                    tracing::warn!(
                        settled,
                        total,
                        ceiling_secs = self.policy.global_timeout.as_secs(),
                        "global ceiling reached"
                    );
                    break Release::Ceiling;
                }
                joined = set.join_next() => match joined {
                    Some(Ok((slot, result))) => {
                        log_settled(&result);
                        let _ = status.send(status_event(&result));
                        if result.is_success() {
                            succeeded += 1;
                        }
                        settled += 1;
                        pending[slot] = None;
                        slots[slot] = Some(result);
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "specialist task aborted");
                    }
                    None => break Release::AllSettled,
                },
            }
        };

        let report_late = release == Release::Early && self.policy.late_results == LateResults::Report;
        for (slot, task) in pending.into_iter().enumerate() {
            let Some(task) = task else { continue };
            let elapsed = dispatched_at.elapsed();
            let result = match release {
                Release::AllSettled => SpecialistResult::new(
                    task,
                    Outcome::Failed("specialist task aborted".to_string()),
                    elapsed,
                ),
                Release::Ceiling | Release::Early => {
                    SpecialistResult::new(task, Outcome::TimedOut, elapsed)
                }
            };
            if !report_late {
                log_settled(&result);
                let _ = status.send(status_event(&result));
            }
            slots[slot] = Some(result);
        }

        if report_late && !set.is_empty() {
            tracing::info!(in_flight = set.len(), "synthesis starting early, reporting late results");
            tokio::spawn(report_late_results(set, status, cancel));
        } else {
            set.abort_all();
        }

        let results: Vec<SpecialistResult> = slots.into_iter().flatten().collect();
        let successes = results.iter().filter(|r| r.is_success()).count();
        tracing::info!(
            total,
            succeeded = successes,
            elapsed_ms = dispatched_at.elapsed().as_millis() as u64,
            "dispatch settled"
        );

        if self.policy.require_success && successes == 0 && total > 0 {
            return Err(OrchestratorError::AllSpecialistsFailed { attempted: total });
        }
        Ok(results)
    }
}

async fn invoke_with_deadline(adapter: Option<Arc<dyn Specialist>>, task: &SpecialistTask) -> Outcome {
    let Some(adapter) = adapter else {
        return Outcome::Failed("no adapter registered".to_string());
    };
    let call = AssertUnwindSafe(adapter.invoke(task.sub_question(), task.deadline())).catch_unwind();
    match tokio::time::timeout(task.deadline(), call).await {
        Err(_) => Outcome::TimedOut,
        Ok(Err(_)) => Outcome::Failed("specialist panicked".to_string()),
        Ok(Ok(Err(e))) => Outcome::Failed(e.to_string()),
        Ok(Ok(Ok(finding))) => Outcome::Success(finding),
    }
}

/// Drain tasks still running after an early release, as status only.
async fn report_late_results(
    mut set: JoinSet<(usize, SpecialistResult)>,
    status: StatusSender,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                set.abort_all();
                return;
            }
            joined = set.join_next() => match joined {
                Some(Ok((_, result))) => {
                    log_settled(&result);
                    if status.send(status_event(&result)).is_err() {
                        set.abort_all();
                        return;
                    }
                }
                Some(Err(_)) => {}
                None => return,
            },
        }
    }
}

fn status_event(result: &SpecialistResult) -> StreamEvent {
    match result.gap_reason() {
        None => StreamEvent::status(result.task.kind(), result.state()),
        Some(reason) => StreamEvent::status_with_detail(result.task.kind(), result.state(), reason),
    }
}

fn log_settled(result: &SpecialistResult) {
    let elapsed_ms = result.elapsed.as_millis() as u64;
    let specialist = result.task.kind();
    match (&result.outcome, result.error_kind()) {
        (Outcome::Success(_), _) | (_, None) => {
            tracing::info!(%specialist, elapsed_ms, "specialist succeeded")
        }
        (Outcome::Failed(reason), Some(kind)) => {
            tracing::warn!(%specialist, %kind, elapsed_ms, %reason, "specialist failed")
        }
        (Outcome::TimedOut, Some(kind)) => {
            tracing::warn!(%specialist, %kind, elapsed_ms, "specialist timed out")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpecialistError;
    use crate::specialists::{Finding, SpecialistKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    enum Behaviour {
        Succeed(Duration),
        Fail,
        Hang,
        HangUntilDropped(Arc<AtomicBool>),
        Panic,
    }

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    struct Scripted {
        kind: SpecialistKind,
        behaviour: Behaviour,
    }

    #[async_trait]
    impl Specialist for Scripted {
        fn kind(&self) -> SpecialistKind {
            self.kind
        }

        async fn invoke(&self, q: &str, _deadline: Duration) -> Result<Finding, SpecialistError> {
            match &self.behaviour {
                Behaviour::Succeed(delay) => {
                    tokio::time::sleep(*delay).await;
                    Ok(Finding::new(format!("{} answer to {}", self.kind, q)))
                }
                Behaviour::Fail => Err(SpecialistError::Upstream {
                    status: 503,
                    message: "down".to_string(),
                }),
                Behaviour::Hang => std::future::pending().await,
                Behaviour::HangUntilDropped(dropped) => {
                    let _guard = SetOnDrop(dropped.clone());
                    std::future::pending().await
                }
                Behaviour::Panic => panic!("adapter bug"),
            }
        }
    }

    fn registry(adapters: Vec<(SpecialistKind, Behaviour)>) -> SpecialistRegistry {
        adapters
            .into_iter()
            .fold(SpecialistRegistry::new(), |registry, (kind, behaviour)| {
                registry.with(Arc::new(Scripted { kind, behaviour }))
            })
    }

    fn tasks(kinds: &[SpecialistKind], deadline: Duration) -> Vec<SpecialistTask> {
        kinds
            .iter()
            .enumerate()
            .map(|(i, kind)| SpecialistTask::new(i, *kind, "metformin", deadline))
            .collect()
    }

    fn policy() -> SupervisorPolicy {
        SupervisorPolicy {
            global_timeout: Duration::from_secs(10),
            ..SupervisorPolicy::default()
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_outcomes_fill_every_slot() {
        use SpecialistKind::*;
        let supervisor = SpecialistSupervisor::new(
            registry(vec![
                (MarketIntelligence, Behaviour::Succeed(Duration::from_millis(50))),
                (Patent, Behaviour::Fail),
                (Trade, Behaviour::Hang),
                (ClinicalTrials, Behaviour::Panic),
            ]),
            policy(),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let results = supervisor
            .run(
                tasks(&[MarketIntelligence, Patent, ClinicalTrials, Trade, WebResearch], Duration::from_secs(1)),
                tx,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 5);
        let states: Vec<_> = results.iter().map(|r| r.state()).collect();
        assert_eq!(
            states,
            vec![
                SpecialistState::Succeeded,
                SpecialistState::Failed,
                SpecialistState::Failed,
                SpecialistState::TimedOut,
                SpecialistState::Failed,
            ]
        );
        assert_eq!(results[4].gap_reason().as_deref(), Some("no adapter registered"));

        let events = drain(&mut rx);
        let started = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::Status { state: SpecialistState::Started, .. }))
            .count();
        assert_eq!(started, 5);
        assert_eq!(events.len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_ceiling_times_out_pending() {
        let supervisor = SpecialistSupervisor::new(
            registry(vec![
                (SpecialistKind::Patent, Behaviour::Hang),
                (SpecialistKind::Trade, Behaviour::Succeed(Duration::from_millis(10))),
            ]),
            SupervisorPolicy {
                global_timeout: Duration::from_secs(2),
                ..SupervisorPolicy::default()
            },
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let results = supervisor
            .run(
                tasks(&[SpecialistKind::Patent, SpecialistKind::Trade], Duration::from_secs(60)),
                tx,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(results[0].outcome, Outcome::TimedOut);
        assert!(results[1].is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_require_success_fails_when_all_miss() {
        let supervisor = SpecialistSupervisor::new(
            registry(vec![(SpecialistKind::Patent, Behaviour::Fail)]),
            SupervisorPolicy {
                require_success: true,
                ..policy()
            },
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = supervisor
            .run(
                tasks(&[SpecialistKind::Patent, SpecialistKind::Trade], Duration::from_secs(1)),
                tx,
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, OrchestratorError::AllSpecialistsFailed { attempted: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_dispatch() {
        let supervisor = SpecialistSupervisor::new(
            registry(vec![(SpecialistKind::Patent, Behaviour::Hang)]),
            policy(),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let err = supervisor
            .run(tasks(&[SpecialistKind::Patent], Duration::from_secs(30)), tx, cancel)
            .await
            .unwrap_err();
        assert_eq!(err, OrchestratorError::StreamAborted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_release_with_late_reports() {
        let supervisor = SpecialistSupervisor::new(
            registry(vec![
                (SpecialistKind::Patent, Behaviour::Succeed(Duration::from_millis(10))),
                (SpecialistKind::Trade, Behaviour::Succeed(Duration::from_secs(5))),
            ]),
            SupervisorPolicy {
                early_synthesis: EarlySynthesis::AtLeast(1),
                late_results: LateResults::Report,
                ..policy()
            },
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let results = supervisor
            .run(
                tasks(&[SpecialistKind::Patent, SpecialistKind::Trade], Duration::from_secs(30)),
                tx,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(results[0].is_success());
        assert_eq!(results[1].outcome, Outcome::TimedOut);

        // Two started, one succeeded so far; the late one is still running.
        assert_eq!(drain(&mut rx).len(), 3);

        let late = rx.recv().await.unwrap();
        assert_eq!(
            late,
            StreamEvent::status(SpecialistKind::Trade, SpecialistState::Succeeded)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_task_counts_toward_early_threshold() {
        let dropped = Arc::new(AtomicBool::new(false));
        let supervisor = SpecialistSupervisor::new(
            registry(vec![
                (SpecialistKind::Patent, Behaviour::Fail),
                (SpecialistKind::Trade, Behaviour::HangUntilDropped(dropped.clone())),
            ]),
            SupervisorPolicy {
                early_synthesis: EarlySynthesis::AtLeast(1),
                late_results: LateResults::Abandon,
                ..policy()
            },
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let started = Instant::now();
        let results = supervisor
            .run(
                tasks(&[SpecialistKind::Patent, SpecialistKind::Trade], Duration::from_secs(60)),
                tx,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(results[0].state(), SpecialistState::Failed);
        assert_eq!(results[1].outcome, Outcome::TimedOut);

        // Abandoned tasks get their status right away and are torn down.
        let events = drain(&mut rx);
        assert_eq!(events.len(), 4);
        assert!(matches!(
            events[3],
            StreamEvent::Status {
                specialist: SpecialistKind::Trade,
                state: SpecialistState::TimedOut,
                ..
            }
        ));
        for _ in 0..10 {
            if dropped.load(Ordering::SeqCst) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(dropped.load(Ordering::SeqCst));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_threshold_ignores_failures() {
        let supervisor = SpecialistSupervisor::new(
            registry(vec![
                (SpecialistKind::Patent, Behaviour::Fail),
                (SpecialistKind::Trade, Behaviour::Succeed(Duration::from_secs(3))),
            ]),
            SupervisorPolicy {
                early_synthesis: EarlySynthesis::AtLeastSucceeded(1),
                ..policy()
            },
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let started = Instant::now();
        let results = supervisor
            .run(
                tasks(&[SpecialistKind::Patent, SpecialistKind::Trade], Duration::from_secs(60)),
                tx,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(results[1].is_success());
    }
}
