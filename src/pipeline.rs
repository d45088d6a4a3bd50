//! Pipeline coordinator.
//!
//! Runs the stages in their fixed order, one at a time, feeding each
//! stage the snapshot of the stage it depends on. A stage whose dependency
//! produced nothing falls back to the target's default endpoints.

use crate::error::{ConfigError, ConfigResult, ReconError, ReconResult};
use crate::events::{emit, EventSender};
use crate::output::OutputFormat;
use crate::prober::native::TOP_PORTS;
use crate::prober::{ProbeOptions, ProberRegistry, RateLimiter};
use crate::scheduler::{StageReport, StageScheduler, StageStatus, DEFAULT_GRACE};
use crate::store::{Finding, FindingStore};
use crate::types::{derive_target_set, RunId, StageKind, Target, TargetKind, TargetSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use crate::events::PipelineEvent;

/// Default anonymizing proxy (a local Tor SOCKS port).
pub const DEFAULT_PROXY: &str = "socks5h://127.0.0.1:9050";

/// Longest per-call or stage timeout a run accepts.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Immutable settings for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Prober calls allowed in flight at once across the whole run.
    pub concurrency: usize,
    /// Worker count each prober may use internally.
    pub threads: usize,
    pub per_probe_timeout: Duration,
    /// Upper bound on a whole stage, `None` for unbounded.
    pub stage_timeout: Option<Duration>,
    /// Time a cancelled prober gets before it is abandoned.
    pub grace: Duration,
    pub output_format: OutputFormat,
    pub use_anonymizing_proxy: bool,
    pub proxy_url: String,
    /// Requests per second for native probers, 0 for unlimited.
    pub rate_limit: u32,
    pub request_timeout: Duration,
    pub dns_wordlist: Option<PathBuf>,
    pub dir_wordlist: Option<PathBuf>,
    pub ports: Vec<u16>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: 8,
            threads: 50,
            per_probe_timeout: Duration::from_secs(600),
            stage_timeout: None,
            grace: DEFAULT_GRACE,
            output_format: OutputFormat::Text,
            use_anonymizing_proxy: false,
            proxy_url: DEFAULT_PROXY.to_string(),
            rate_limit: 0,
            request_timeout: Duration::from_secs(10),
            dns_wordlist: None,
            dir_wordlist: None,
            ports: TOP_PORTS.to_vec(),
        }
    }
}

impl RunOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_per_probe_timeout(mut self, timeout: Duration) -> Self {
        self.per_probe_timeout = timeout;
        self
    }

    pub fn with_stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_anonymizing_proxy(mut self, enabled: bool) -> Self {
        self.use_anonymizing_proxy = enabled;
        self
    }

    /// Reject timeouts no run could honour.
    pub fn validate(&self) -> ConfigResult<()> {
        check_timeout("per-call timeout", self.per_probe_timeout)?;
        if let Some(timeout) = self.stage_timeout {
            check_timeout("stage timeout", timeout)?;
        }
        Ok(())
    }

    /// The per-call options handed to every prober.
    ///
    /// Every call made with the returned options paces against one
    /// limiter, so the rate limit holds across the whole run.
    pub fn probe_options(&self) -> ProbeOptions {
        ProbeOptions {
            concurrency: self.threads.max(1),
            request_timeout: self.request_timeout,
            proxy: self
                .use_anonymizing_proxy
                .then(|| self.proxy_url.clone()),
            limiter: RateLimiter::per_second(self.rate_limit),
            dns_wordlist: self.dns_wordlist.clone(),
            dir_wordlist: self.dir_wordlist.clone(),
            ports: self.ports.clone(),
        }
    }
}

fn check_timeout(name: &str, timeout: Duration) -> ConfigResult<()> {
    if timeout.is_zero() {
        return Err(ConfigError::InvalidValue(format!("{} must be at least 1s", name)));
    }
    if timeout > MAX_TIMEOUT {
        return Err(ConfigError::InvalidValue(format!(
            "{} of {}s exceeds the {}s maximum",
            name,
            timeout.as_secs(),
            MAX_TIMEOUT.as_secs()
        )));
    }
    Ok(())
}

/// Which stages a run executes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StageSelection {
    #[default]
    All,
    /// Single-stage (or subset) mode.
    Only(BTreeSet<StageKind>),
}

impl StageSelection {
    pub fn only(stages: impl IntoIterator<Item = StageKind>) -> Self {
        Self::Only(stages.into_iter().collect())
    }

    pub fn contains(&self, stage: StageKind) -> bool {
        match self {
            Self::All => true,
            Self::Only(stages) => stages.contains(&stage),
        }
    }

    /// Selected stages in pipeline order.
    pub fn stages(&self) -> Vec<StageKind> {
        StageKind::ALL
            .into_iter()
            .filter(|s| self.contains(*s))
            .collect()
    }
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// At least one stage partially failed, or the run was aborted.
    CompletedWithWarnings,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::CompletedWithWarnings => write!(f, "completed with warnings"),
        }
    }
}

/// Everything a run produced: status, per-stage diagnostics and findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub id: RunId,
    pub target: Target,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub status: RunStatus,
    #[serde(default)]
    pub aborted: bool,
    pub stages: Vec<StageReport>,
    #[serde(default)]
    pub findings: BTreeMap<StageKind, Vec<Finding>>,
}

impl RunReport {
    /// Status of every stage that was considered by the run.
    pub fn stage_statuses(&self) -> BTreeMap<StageKind, StageStatus> {
        self.stages.iter().map(|r| (r.stage, r.status)).collect()
    }

    pub fn stage(&self, stage: StageKind) -> Option<&StageReport> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    /// Findings of one stage in first-seen order.
    pub fn findings(&self, stage: StageKind) -> &[Finding] {
        self.findings.get(&stage).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total_findings(&self) -> usize {
        self.findings.values().map(Vec::len).sum()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }
}

/// Sequences the stages of a run over one shared store.
pub struct Pipeline {
    registry: ProberRegistry,
    options: RunOptions,
    store: Arc<FindingStore>,
    events: Option<EventSender>,
}

impl Pipeline {
    pub fn new(registry: ProberRegistry, options: RunOptions) -> Self {
        Self {
            registry,
            options,
            store: Arc::new(FindingStore::new()),
            events: None,
        }
    }

    /// Publish progress events on `events`.
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Start from a preloaded store, e.g. the findings of an earlier run.
    pub fn with_store(mut self, store: FindingStore) -> Self {
        self.store = Arc::new(store);
        self
    }

    pub fn store(&self) -> &Arc<FindingStore> {
        &self.store
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Execute the selected stages against `raw`.
    ///
    /// Fails only on an unclassifiable target or when none of the
    /// applicable selected stages has a registered prober. Cancelling
    /// `cancel` stops the running stage; later stages are reported skipped
    /// and findings gathered so far are kept.
    pub async fn run(
        &self,
        raw: &str,
        selection: &StageSelection,
        cancel: &CancellationToken,
    ) -> ReconResult<RunReport> {
        let target = Target::classify(raw);
        if target.kind() == TargetKind::Unknown {
            return Err(ReconError::InvalidTarget(raw.trim().to_string()));
        }
        self.options.validate()?;

        let stages = selection.stages();
        let applicable: Vec<StageKind> = stages
            .iter()
            .copied()
            .filter(|s| applies_to(*s, &target))
            .collect();
        if !applicable.is_empty()
            && applicable
                .iter()
                .all(|s| self.registry.for_stage(*s).is_empty())
        {
            return Err(ReconError::NoProbersAvailable);
        }

        let id = RunId::new();
        let started_at = Utc::now();
        info!(
            run = %id.short(),
            target = %target,
            kind = %target.kind(),
            stages = ?stages,
            "starting run"
        );

        let scheduler = StageScheduler::new(self.options.concurrency, self.options.per_probe_timeout)
            .with_grace(self.options.grace)
            .with_stage_timeout(self.options.stage_timeout)
            .with_events(self.events.clone());
        let probe_options = Arc::new(self.options.probe_options());

        let mut reports = Vec::with_capacity(stages.len());
        for stage in stages {
            if cancel.is_cancelled() {
                reports.push(self.skip(stage, "run aborted"));
                continue;
            }
            if !applies_to(stage, &target) {
                reports.push(self.skip(stage, format!("target is not a domain ({})", target.kind())));
                continue;
            }

            let targets = self.targets_for(stage, &target);
            let report = scheduler
                .run_stage(
                    stage,
                    &self.registry,
                    targets,
                    &self.store,
                    Arc::clone(&probe_options),
                    cancel,
                )
                .await;
            reports.push(report);
        }

        let aborted = cancel.is_cancelled();
        if aborted {
            warn!(run = %id.short(), "run aborted, keeping findings gathered so far");
        }
        let degraded = reports
            .iter()
            .any(|r| r.status == StageStatus::PartiallyFailed);
        let status = if degraded || aborted {
            RunStatus::CompletedWithWarnings
        } else {
            RunStatus::Completed
        };

        let report = RunReport {
            id,
            target,
            started_at,
            completed_at: Utc::now(),
            status,
            aborted,
            stages: reports,
            findings: self.store.snapshots(),
        };
        info!(
            run = %id.short(),
            status = %report.status,
            findings = report.total_findings(),
            "run finished"
        );
        Ok(report)
    }

    /// Target set for `stage`, derived from its dependency's snapshot.
    pub fn targets_for(&self, stage: StageKind, target: &Target) -> TargetSet {
        match stage.dependency() {
            None => TargetSet::single(target.raw()),
            Some(dependency) => derive_target_set(target, &self.store.snapshot(dependency)),
        }
    }

    fn skip(&self, stage: StageKind, reason: impl Into<String>) -> StageReport {
        let reason = reason.into();
        info!(stage = ?stage, reason = %reason, "stage skipped");
        emit(
            &self.events,
            PipelineEvent::StageSkipped {
                stage,
                reason: reason.clone(),
            },
        );
        StageReport::skipped(stage, reason)
    }
}

/// Whether `stage` can run against `target` at all.
fn applies_to(stage: StageKind, target: &Target) -> bool {
    stage != StageKind::Subdomain || target.is_domain()
}

/// Run the built-in probers against `target` with a fresh store.
pub async fn run(
    target: &str,
    selection: &StageSelection,
    options: RunOptions,
) -> ReconResult<RunReport> {
    Pipeline::new(ProberRegistry::builtin(), options)
        .run(target, selection, &CancellationToken::new())
        .await
}
