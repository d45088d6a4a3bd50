//! Stage scheduler.
//!
//! Runs the probers selected for one stage concurrently, each on its own
//! tokio task, bounded by a run-wide semaphore. Findings are inserted into
//! the shared store as they stream in, so a prober that later fails or
//! times out keeps everything it already produced.
//!
//! A stage moves through `Pending -> Dispatching -> Collecting -> Merging`
//! and ends `Done` or `PartiallyFailed`.

use crate::error::ProbeFailure;
use crate::events::{emit, EventSender, PipelineEvent};
use crate::prober::{BoxedProber, FanOutPolicy, ProbeContext, ProbeOptions, ProberRegistry};
use crate::store::FindingStore;
use crate::types::{StageKind, TargetSet};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default window a cancelled prober gets to wind down.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(2);

/// Extra time past the grace window before a stage aborts stuck tasks.
const ABORT_SLACK: Duration = Duration::from_millis(500);

/// Scheduler state of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Pending,
    Dispatching,
    Collecting,
    Merging,
    Done,
    PartiallyFailed,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Dispatching => write!(f, "dispatching"),
            Self::Collecting => write!(f, "collecting"),
            Self::Merging => write!(f, "merging"),
            Self::Done => write!(f, "done"),
            Self::PartiallyFailed => write!(f, "partially failed"),
        }
    }
}

/// Terminal status of a stage as it appears in the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Done,
    /// Advisory: no selected prober finished without a fatal failure.
    PartiallyFailed,
    /// Not applicable to the target kind.
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => write!(f, "done"),
            Self::PartiallyFailed => write!(f, "partially failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// What happened to one prober call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProberOutcome {
    pub prober: String,
    /// Findings the prober yielded, duplicates included.
    pub emitted: usize,
    /// Findings that were new to the store.
    pub new_findings: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ProbeFailure>,
    /// The prober ignored cancellation and was dropped after the grace window.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub abandoned: bool,
    pub elapsed_ms: u64,
}

impl ProberOutcome {
    fn new(prober: impl Into<String>) -> Self {
        Self {
            prober: prober.into(),
            emitted: 0,
            new_findings: 0,
            failure: None,
            abandoned: false,
            elapsed_ms: 0,
        }
    }

    /// Finished without a fatal failure.
    pub fn succeeded(&self) -> bool {
        self.failure.as_ref().map_or(true, |f| !f.kind.is_fatal())
    }
}

/// Diagnostics for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: StageKind,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<FanOutPolicy>,
    /// Size of the target set handed to the stage.
    pub targets: usize,
    /// Registered probers whose availability check failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unavailable: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub probers: Vec<ProberOutcome>,
    /// Unique findings held by the stage when it finished.
    pub findings: usize,
    /// Why the stage was skipped or degraded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub elapsed_ms: u64,
}

impl StageReport {
    /// Report for a stage that was not run.
    pub fn skipped(stage: StageKind, reason: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Skipped,
            policy: None,
            targets: 0,
            unavailable: Vec::new(),
            probers: Vec::new(),
            findings: 0,
            note: Some(reason.into()),
            elapsed_ms: 0,
        }
    }

    /// Probers that ended with a failure of any kind.
    pub fn failed(&self) -> impl Iterator<Item = &ProberOutcome> {
        self.probers.iter().filter(|o| o.failure.is_some())
    }
}

/// Probers chosen for a stage and the ones passed over as unavailable.
struct Selection {
    selected: Vec<BoxedProber>,
    unavailable: Vec<String>,
}

/// Runs individual stages against a shared store and concurrency budget.
#[derive(Clone)]
pub struct StageScheduler {
    budget: Arc<Semaphore>,
    per_probe_timeout: Duration,
    grace: Duration,
    stage_timeout: Option<Duration>,
    events: Option<EventSender>,
}

impl StageScheduler {
    /// Create a scheduler allowing `concurrency` prober calls at once.
    pub fn new(concurrency: usize, per_probe_timeout: Duration) -> Self {
        Self {
            budget: Arc::new(Semaphore::new(concurrency.max(1))),
            per_probe_timeout,
            grace: DEFAULT_GRACE,
            stage_timeout: None,
            events: None,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn with_events(mut self, events: Option<EventSender>) -> Self {
        self.events = events;
        self
    }

    /// Permits currently free in the concurrency budget.
    #[cfg(test)]
    pub(crate) fn available_permits(&self) -> usize {
        self.budget.available_permits()
    }

    fn transition(&self, stage: StageKind, state: StageState) {
        debug!(stage = ?stage, state = %state, "stage transition");
        emit(&self.events, PipelineEvent::StageState { stage, state });
    }

    async fn select(
        &self,
        registry: &ProberRegistry,
        stage: StageKind,
        options: &ProbeOptions,
    ) -> Selection {
        let policy = registry.policy(stage);
        let mut selection = Selection {
            selected: Vec::new(),
            unavailable: Vec::new(),
        };

        for prober in registry.for_stage(stage) {
            if prober.is_available(options).await {
                selection.selected.push(prober);
                if policy == FanOutPolicy::FirstAvailable {
                    break;
                }
            } else {
                debug!(stage = ?stage, prober = %prober.id(), "prober unavailable");
                selection.unavailable.push(prober.id().to_string());
            }
        }
        selection
    }

    /// Run one stage to completion.
    ///
    /// Never fails: prober failures are recorded in the returned report.
    /// Cancelling `cancel` stops every in-flight prober of the stage.
    pub async fn run_stage(
        &self,
        stage: StageKind,
        registry: &ProberRegistry,
        targets: TargetSet,
        store: &Arc<FindingStore>,
        options: Arc<ProbeOptions>,
        cancel: &CancellationToken,
    ) -> StageReport {
        let started = Instant::now();
        let policy = registry.policy(stage);
        self.transition(stage, StageState::Pending);

        self.transition(stage, StageState::Dispatching);
        let Selection {
            selected,
            unavailable,
        } = self.select(registry, stage, &options).await;

        let mut report = StageReport {
            stage,
            status: StageStatus::PartiallyFailed,
            policy: Some(policy),
            targets: targets.len(),
            unavailable,
            probers: Vec::new(),
            findings: 0,
            note: None,
            elapsed_ms: 0,
        };

        if selected.is_empty() {
            warn!(stage = ?stage, "no prober available");
            report.note = Some("no prober available".to_string());
        } else {
            info!(
                stage = ?stage,
                policy = %policy,
                probers = ?selected.iter().map(|p| p.id()).collect::<Vec<_>>(),
                targets = targets.len(),
                "dispatching stage"
            );
            self.transition(stage, StageState::Collecting);
            report.probers = self
                .collect(stage, selected, targets, store, options, cancel)
                .await;
        }

        self.transition(stage, StageState::Merging);
        report.findings = store.len(stage);
        if report.probers.iter().any(ProberOutcome::succeeded) {
            report.status = StageStatus::Done;
        } else if report.note.is_none() {
            report.note = Some("every prober failed".to_string());
        }
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        let terminal = match report.status {
            StageStatus::Done => StageState::Done,
            _ => StageState::PartiallyFailed,
        };
        self.transition(stage, terminal);
        info!(
            stage = ?stage,
            status = %report.status,
            findings = report.findings,
            elapsed_ms = report.elapsed_ms,
            "stage finished"
        );
        emit(
            &self.events,
            PipelineEvent::StageFinished {
                report: report.clone(),
            },
        );
        report
    }

    async fn collect(
        &self,
        stage: StageKind,
        selected: Vec<BoxedProber>,
        targets: TargetSet,
        store: &Arc<FindingStore>,
        options: Arc<ProbeOptions>,
        cancel: &CancellationToken,
    ) -> Vec<ProberOutcome> {
        let stage_cancel = cancel.child_token();
        let mut outcomes: Vec<Option<ProberOutcome>> = vec![None; selected.len()];
        let ids: Vec<String> = selected.iter().map(|p| p.id().to_string()).collect();

        let mut tasks = JoinSet::new();
        let mut slots = HashMap::new();
        for (slot, prober) in selected.into_iter().enumerate() {
            let call = ProberCall {
                stage,
                prober,
                targets: targets.clone(),
                options: Arc::clone(&options),
                store: Arc::clone(store),
                budget: Arc::clone(&self.budget),
                cancel: stage_cancel.clone(),
                timeout: self.per_probe_timeout,
                grace: self.grace,
                events: self.events.clone(),
            };
            let handle = tasks.spawn(call.drive());
            slots.insert(handle.id(), slot);
        }

        // A deadline too far out to represent is no deadline at all.
        let stage_deadline = self.stage_timeout.and_then(|t| Instant::now().checked_add(t));
        let mut draining = false;
        let mut hard_deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                joined = tasks.join_next_with_id() => match joined {
                    Some(Ok((task, outcome))) => {
                        emit(&self.events, PipelineEvent::ProberFinished { stage, outcome: outcome.clone() });
                        if let Some(&slot) = slots.get(&task) {
                            outcomes[slot] = Some(outcome);
                        }
                    }
                    Some(Err(e)) if e.is_panic() => {
                        let Some(&slot) = slots.get(&e.id()) else { continue };
                        warn!(stage = ?stage, prober = %ids[slot], "prober task panicked");
                        let mut outcome = ProberOutcome::new(ids[slot].clone());
                        outcome.failure = Some(ProbeFailure::tool(format!(
                            "prober panicked: {}",
                            panic_message(e.into_panic())
                        )));
                        emit(&self.events, PipelineEvent::ProberFinished { stage, outcome: outcome.clone() });
                        outcomes[slot] = Some(outcome);
                    }
                    Some(Err(_)) => {}
                    None => break,
                },
                _ = wait_until(stage_deadline), if !draining && stage_deadline.is_some() => {
                    warn!(stage = ?stage, "stage timeout reached, cancelling probers");
                    stage_cancel.cancel();
                }
                _ = stage_cancel.cancelled(), if !draining => {
                    draining = true;
                    hard_deadline = Instant::now().checked_add(self.grace.saturating_add(ABORT_SLACK));
                }
                _ = wait_until(hard_deadline), if hard_deadline.is_some() => {
                    warn!(stage = ?stage, remaining = tasks.len(), "abandoning unresponsive probers");
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    break;
                }
            }
        }

        outcomes
            .into_iter()
            .zip(ids)
            .map(|(outcome, id)| {
                outcome.unwrap_or_else(|| {
                    let mut outcome = ProberOutcome::new(id);
                    outcome.failure = Some(ProbeFailure::timeout("abandoned after cancellation"));
                    outcome.abandoned = true;
                    outcome
                })
            })
            .collect()
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => futures::future::pending().await,
    }
}

/// One prober call, driven on its own task.
struct ProberCall {
    stage: StageKind,
    prober: BoxedProber,
    targets: TargetSet,
    options: Arc<ProbeOptions>,
    store: Arc<FindingStore>,
    budget: Arc<Semaphore>,
    cancel: CancellationToken,
    timeout: Duration,
    grace: Duration,
    events: Option<EventSender>,
}

impl ProberCall {
    async fn drive(self) -> ProberOutcome {
        let id = self.prober.id().to_string();
        let mut outcome = ProberOutcome::new(id.clone());

        let _permit = tokio::select! {
            permit = Arc::clone(&self.budget).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    outcome.failure = Some(ProbeFailure::tool("concurrency budget closed"));
                    return outcome;
                }
            },
            _ = self.cancel.cancelled() => {
                outcome.failure = Some(ProbeFailure::timeout("cancelled before start"));
                return outcome;
            }
        };

        let started = Instant::now();
        emit(
            &self.events,
            PipelineEvent::ProberStarted {
                stage: self.stage,
                prober: id.clone(),
            },
        );

        let call_cancel = self.cancel.child_token();
        let ctx = ProbeContext::new(Arc::clone(&self.options), call_cancel.clone());
        let mut stream = self.prober.enumerate(self.targets.clone(), ctx);
        let deadline = started.checked_add(self.timeout);

        let mut interrupted = false;
        loop {
            tokio::select! {
                biased;
                _ = wait_until(deadline) => {
                    outcome.failure = Some(ProbeFailure::timeout(format!(
                        "no completion within {}s",
                        self.timeout.as_secs_f64()
                    )));
                    interrupted = true;
                    break;
                }
                _ = self.cancel.cancelled() => {
                    outcome.failure = Some(ProbeFailure::timeout("stage cancelled"));
                    interrupted = true;
                    break;
                }
                item = stream.next() => match item {
                    Some(Ok(finding)) => self.record(&mut outcome, finding),
                    Some(Err(failure)) => {
                        outcome.failure = Some(failure);
                        break;
                    }
                    None => break,
                },
            }
        }

        if interrupted {
            call_cancel.cancel();
            let grace_deadline = Instant::now().checked_add(self.grace);
            loop {
                tokio::select! {
                    _ = wait_until(grace_deadline) => {
                        outcome.abandoned = true;
                        break;
                    }
                    item = stream.next() => match item {
                        Some(Ok(finding)) => self.record(&mut outcome, finding),
                        Some(Err(_)) | None => break,
                    },
                }
            }
        }
        drop(stream);

        outcome.elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome.failure {
            Some(failure) => warn!(
                stage = ?self.stage,
                prober = %id,
                kind = ?failure.kind,
                detail = %failure.detail,
                emitted = outcome.emitted,
                "prober failed"
            ),
            None => debug!(
                stage = ?self.stage,
                prober = %id,
                emitted = outcome.emitted,
                new = outcome.new_findings,
                "prober finished"
            ),
        }
        outcome
    }

    fn record(&self, outcome: &mut ProberOutcome, finding: crate::store::Finding) {
        if finding.stage != self.stage {
            warn!(
                stage = ?self.stage,
                prober = %outcome.prober,
                emitted_stage = ?finding.stage,
                "ignoring finding for another stage"
            );
            return;
        }

        outcome.emitted += 1;
        let subject = finding.subject.clone();
        if self.store.insert(finding).is_new {
            outcome.new_findings += 1;
            emit(
                &self.events,
                PipelineEvent::FindingAdded {
                    stage: self.stage,
                    subject,
                    prober: outcome.prober.clone(),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeFailureKind;
    use crate::prober::{FindingStream, Prober, ProberDescriptor};
    use crate::store::Finding;
    use async_trait::async_trait;
    use futures::stream;

    enum Behaviour {
        Emit(Vec<&'static str>),
        EmitThenFail(Vec<&'static str>),
        Hang,
        Panic,
    }

    struct Fake {
        descriptor: ProberDescriptor,
        available: bool,
        behaviour: Behaviour,
    }

    impl Fake {
        fn boxed(id: &str, priority: u8, available: bool, behaviour: Behaviour) -> BoxedProber {
            Arc::new(Self {
                descriptor: ProberDescriptor::new(id, StageKind::PortScan, priority),
                available,
                behaviour,
            })
        }
    }

    #[async_trait]
    impl Prober for Fake {
        fn descriptor(&self) -> &ProberDescriptor {
            &self.descriptor
        }

        async fn is_available(&self, _options: &ProbeOptions) -> bool {
            self.available
        }

        fn enumerate(&self, _targets: TargetSet, _ctx: ProbeContext) -> FindingStream {
            let id = self.descriptor.id.clone();
            let found = |subjects: &[&str]| -> Vec<Result<Finding, ProbeFailure>> {
                subjects
                    .iter()
                    .map(|s| Ok(Finding::new(StageKind::PortScan, *s, id.clone())))
                    .collect()
            };
            match &self.behaviour {
                Behaviour::Emit(subjects) => stream::iter(found(subjects)).boxed(),
                Behaviour::EmitThenFail(subjects) => {
                    let mut items = found(subjects);
                    items.push(Err(ProbeFailure::tool("crashed")));
                    stream::iter(items).boxed()
                }
                Behaviour::Hang => stream::pending().boxed(),
                Behaviour::Panic => stream::iter([()])
                    .map(|_| -> Result<Finding, ProbeFailure> { panic!("parser blew up") })
                    .boxed(),
            }
        }
    }

    fn registry(probers: Vec<BoxedProber>, policy: FanOutPolicy) -> ProberRegistry {
        let mut registry = ProberRegistry::new();
        for prober in probers {
            registry.register(prober);
        }
        registry.set_policy(StageKind::PortScan, policy);
        registry
    }

    async fn run(registry: &ProberRegistry, scheduler: StageScheduler) -> (StageReport, Arc<FindingStore>) {
        let store = Arc::new(FindingStore::new());
        let report = scheduler
            .run_stage(
                StageKind::PortScan,
                registry,
                TargetSet::single("10.0.0.1"),
                &store,
                Arc::new(ProbeOptions::default()),
                &CancellationToken::new(),
            )
            .await;
        (report, store)
    }

    #[tokio::test]
    async fn test_first_available_skips_unavailable() {
        let registry = registry(
            vec![
                Fake::boxed("best", 90, false, Behaviour::Emit(vec!["a:1"])),
                Fake::boxed("next", 50, true, Behaviour::Emit(vec!["b:2"])),
                Fake::boxed("last", 10, true, Behaviour::Emit(vec!["c:3"])),
            ],
            FanOutPolicy::FirstAvailable,
        );
        let (report, store) = run(&registry, StageScheduler::new(4, Duration::from_secs(5))).await;

        assert_eq!(report.status, StageStatus::Done);
        assert_eq!(report.unavailable, vec!["best"]);
        assert_eq!(report.probers.len(), 1);
        assert_eq!(report.probers[0].prober, "next");
        assert_eq!(store.len(StageKind::PortScan), 1);
    }

    #[tokio::test]
    async fn test_failure_keeps_sibling_and_partial_findings() {
        let registry = registry(
            vec![
                Fake::boxed("flaky", 90, true, Behaviour::EmitThenFail(vec!["a:1"])),
                Fake::boxed("solid", 50, true, Behaviour::Emit(vec!["b:2", "a:1"])),
            ],
            FanOutPolicy::FanOutAll,
        );
        let (report, store) = run(&registry, StageScheduler::new(4, Duration::from_secs(5))).await;

        assert_eq!(report.status, StageStatus::Done);
        assert_eq!(store.len(StageKind::PortScan), 2);
        let flaky = report.probers.iter().find(|o| o.prober == "flaky").unwrap();
        assert_eq!(
            flaky.failure.as_ref().map(|f| f.kind),
            Some(ProbeFailureKind::ExternalToolError)
        );
        assert_eq!(flaky.emitted, 1);
    }

    #[tokio::test]
    async fn test_all_failing_is_partially_failed() {
        let registry = registry(
            vec![Fake::boxed("flaky", 90, true, Behaviour::EmitThenFail(vec![]))],
            FanOutPolicy::FanOutAll,
        );
        let (report, _) = run(&registry, StageScheduler::new(4, Duration::from_secs(5))).await;
        assert_eq!(report.status, StageStatus::PartiallyFailed);
    }

    #[tokio::test]
    async fn test_no_prober_is_partially_failed() {
        let registry = registry(
            vec![Fake::boxed("gone", 90, false, Behaviour::Emit(vec![]))],
            FanOutPolicy::FirstAvailable,
        );
        let (report, _) = run(&registry, StageScheduler::new(4, Duration::from_secs(5))).await;
        assert_eq!(report.status, StageStatus::PartiallyFailed);
        assert_eq!(report.note.as_deref(), Some("no prober available"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_prober_times_out() {
        let registry = registry(
            vec![Fake::boxed("stuck", 90, true, Behaviour::Hang)],
            FanOutPolicy::FanOutAll,
        );
        let scheduler =
            StageScheduler::new(4, Duration::from_secs(1)).with_grace(Duration::from_millis(100));
        let (report, _) = run(&registry, scheduler).await;

        let outcome = &report.probers[0];
        assert_eq!(
            outcome.failure.as_ref().map(|f| f.kind),
            Some(ProbeFailureKind::Timeout)
        );
        assert!(outcome.abandoned);
        // A timeout is not fatal to the stage.
        assert_eq!(report.status, StageStatus::Done);
    }

    #[tokio::test]
    async fn test_budget_is_released() {
        let registry = registry(
            vec![
                Fake::boxed("a", 90, true, Behaviour::Emit(vec!["a:1"])),
                Fake::boxed("b", 80, true, Behaviour::Emit(vec!["b:1"])),
                Fake::boxed("c", 70, true, Behaviour::Emit(vec!["c:1"])),
            ],
            FanOutPolicy::FanOutAll,
        );
        let scheduler = StageScheduler::new(1, Duration::from_secs(5));
        let (report, store) = run(&registry, scheduler.clone()).await;
        assert_eq!(report.probers.len(), 3);
        assert_eq!(store.len(StageKind::PortScan), 3);
        assert_eq!(scheduler.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_panicking_prober_is_a_tool_failure() {
        let registry = registry(
            vec![Fake::boxed("brittle", 90, true, Behaviour::Panic)],
            FanOutPolicy::FanOutAll,
        );
        let (report, _) = run(&registry, StageScheduler::new(4, Duration::from_secs(5))).await;

        let outcome = &report.probers[0];
        assert_eq!(outcome.prober, "brittle");
        let failure = outcome.failure.as_ref().unwrap();
        assert_eq!(failure.kind, ProbeFailureKind::ExternalToolError);
        assert!(failure.detail.contains("parser blew up"));
        assert!(!outcome.abandoned);
        assert_eq!(report.status, StageStatus::PartiallyFailed);
    }

    #[tokio::test]
    async fn test_panic_does_not_hide_sibling_results() {
        let registry = registry(
            vec![
                Fake::boxed("brittle", 90, true, Behaviour::Panic),
                Fake::boxed("solid", 50, true, Behaviour::Emit(vec!["b:2"])),
            ],
            FanOutPolicy::FanOutAll,
        );
        let (report, store) = run(&registry, StageScheduler::new(4, Duration::from_secs(5))).await;

        assert_eq!(report.status, StageStatus::Done);
        assert_eq!(store.len(StageKind::PortScan), 1);
        assert!(report.probers[0].failure.is_some());
        assert!(report.probers[1].succeeded());
    }

    #[tokio::test]
    async fn test_unrepresentable_timeouts_mean_no_deadline() {
        let registry = registry(
            vec![Fake::boxed("a", 90, true, Behaviour::Emit(vec!["a:1"]))],
            FanOutPolicy::FanOutAll,
        );
        let scheduler = StageScheduler::new(4, Duration::from_secs(u64::MAX))
            .with_grace(Duration::MAX)
            .with_stage_timeout(Some(Duration::from_secs(u64::MAX)));
        let (report, store) = run(&registry, scheduler).await;

        assert_eq!(report.status, StageStatus::Done);
        assert!(report.probers[0].succeeded());
        assert_eq!(store.len(StageKind::PortScan), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_stage_timeout_keeps_call_deadline() {
        let registry = registry(
            vec![Fake::boxed("stuck", 90, true, Behaviour::Hang)],
            FanOutPolicy::FanOutAll,
        );
        let scheduler = StageScheduler::new(4, Duration::from_secs(1))
            .with_stage_timeout(Some(Duration::from_secs(u64::MAX)))
            .with_grace(Duration::from_millis(100));
        let (report, _) = run(&registry, scheduler).await;

        assert_eq!(
            report.probers[0].failure.as_ref().map(|f| f.kind),
            Some(ProbeFailureKind::Timeout)
        );
    }
}
