//! End-to-end pipeline behaviour with in-process fake probers.

use async_trait::async_trait;
use bountyx::prober::{
    BoxedProber, EndpointForm, FindingStream, ProbeContext, ProbeOptions, ProberDescriptor,
    TargetInput, ToolSpec,
};
use bountyx::scheduler::StageStatus;
use bountyx::{
    FanOutPolicy, Finding, FindingStore, Pipeline, ProbeFailure, ProbeFailureKind, Prober,
    ProberRegistry, ReconError, RunOptions, RunStatus, StageKind, StageSelection, Target,
    TargetKind, TargetSet,
};
use futures::{stream, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

enum Behaviour {
    /// Emit fixed subjects.
    Static(Vec<&'static str>),
    /// Emit one finding per received endpoint.
    Echo,
    /// Fail before producing anything.
    Failing,
    /// Never produce anything and never finish.
    Hanging,
}

struct FakeProber {
    descriptor: ProberDescriptor,
    behaviour: Behaviour,
    seen: Arc<Mutex<Vec<TargetSet>>>,
}

impl FakeProber {
    fn new(id: &str, stage: StageKind, behaviour: Behaviour) -> Self {
        Self {
            descriptor: ProberDescriptor::new(id, stage, 50),
            behaviour,
            seen: Arc::default(),
        }
    }

    fn boxed(id: &str, stage: StageKind, behaviour: Behaviour) -> BoxedProber {
        Arc::new(Self::new(id, stage, behaviour))
    }
}

#[async_trait]
impl Prober for FakeProber {
    fn descriptor(&self) -> &ProberDescriptor {
        &self.descriptor
    }

    async fn is_available(&self, _options: &ProbeOptions) -> bool {
        true
    }

    fn enumerate(&self, targets: TargetSet, _ctx: ProbeContext) -> FindingStream {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(targets.clone());
        }
        let stage = self.descriptor.stage;
        let id = self.descriptor.id.clone();
        match &self.behaviour {
            Behaviour::Static(subjects) => {
                let items: Vec<Result<Finding, ProbeFailure>> = subjects
                    .iter()
                    .map(|s| Ok(Finding::new(stage, *s, id.clone())))
                    .collect();
                stream::iter(items).boxed()
            }
            Behaviour::Echo => {
                let items: Vec<Result<Finding, ProbeFailure>> = targets
                    .iter()
                    .map(|t| Ok(Finding::new(stage, t, id.clone())))
                    .collect();
                stream::iter(items).boxed()
            }
            Behaviour::Failing => stream::iter(vec![Err(ProbeFailure::tool("exit status 1"))]).boxed(),
            Behaviour::Hanging => stream::pending().boxed(),
        }
    }
}

fn registry(probers: Vec<BoxedProber>) -> ProberRegistry {
    let mut registry = ProberRegistry::new();
    for prober in probers {
        registry.register(prober);
    }
    registry
}

fn quick_options() -> RunOptions {
    RunOptions::default()
        .with_per_probe_timeout(Duration::from_secs(5))
        .with_grace(Duration::from_millis(100))
}

#[test]
fn insert_is_idempotent() {
    let store = FindingStore::new();
    let first = store.insert(Finding::new(StageKind::Subdomain, "www.example.com", "a"));
    let second = store.insert(Finding::new(StageKind::Subdomain, "www.example.com", "a"));

    assert!(first.is_new);
    assert!(!second.is_new);
    assert_eq!(store.len(StageKind::Subdomain), 1);
    assert_eq!(
        store.snapshot(StageKind::Subdomain)[0].discovered_by,
        vec!["a".to_string()]
    );
}

#[test]
fn classification_boundaries() {
    assert_eq!(Target::classify("256.1.1.1").kind(), TargetKind::Unknown);
    assert_eq!(Target::classify("10.0.0.0/24").kind(), TargetKind::Cidr);
    assert_eq!(Target::classify("10.0.0.1").kind(), TargetKind::Ipv4);
    assert_eq!(Target::classify("example.com").kind(), TargetKind::Domain);
}

#[tokio::test]
async fn domain_without_prior_findings_falls_back_to_both_schemes() {
    let recorder = Arc::new(FakeProber::new("recorder", StageKind::LiveHost, Behaviour::Echo));
    let seen = Arc::clone(&recorder.seen);
    let pipeline = Pipeline::new(registry(vec![recorder as BoxedProber]), quick_options());

    let report = assert_ok!(
        pipeline
            .run(
                "example.com",
                &StageSelection::only([StageKind::LiveHost]),
                &CancellationToken::new(),
            )
            .await
    );

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0].as_slice(),
        &["http://example.com".to_string(), "https://example.com".to_string()]
    );
    assert_eq!(report.findings(StageKind::LiveHost).len(), 2);
}

#[tokio::test]
async fn failing_prober_does_not_block_siblings() {
    let pipeline = Pipeline::new(
        registry(vec![
            FakeProber::boxed("broken", StageKind::Subdomain, Behaviour::Failing),
            FakeProber::boxed("steady", StageKind::Subdomain, Behaviour::Static(vec!["www.example.com"])),
        ]),
        quick_options(),
    );

    let report = assert_ok!(
        pipeline
            .run(
                "example.com",
                &StageSelection::only([StageKind::Subdomain]),
                &CancellationToken::new(),
            )
            .await
    );

    let stage = report.stage(StageKind::Subdomain).unwrap();
    assert_eq!(stage.status, StageStatus::Done);
    assert_eq!(stage.policy, Some(FanOutPolicy::FanOutAll));
    let failed: Vec<_> = stage.failed().map(|o| o.prober.as_str()).collect();
    assert_eq!(failed, vec!["broken"]);
    assert_eq!(report.findings(StageKind::Subdomain)[0].subject, "www.example.com");
}

#[tokio::test]
async fn ip_and_cidr_targets_skip_subdomain_stage() {
    for raw in ["10.0.0.5", "10.0.0.0/30"] {
        let pipeline = Pipeline::new(
            registry(vec![
                FakeProber::boxed("subs", StageKind::Subdomain, Behaviour::Static(vec!["www.example.com"])),
                FakeProber::boxed("live", StageKind::LiveHost, Behaviour::Echo),
            ]),
            quick_options(),
        );

        let report = assert_ok!(pipeline.run(raw, &StageSelection::All, &CancellationToken::new()).await);

        assert_eq!(
            report.stage(StageKind::Subdomain).map(|s| s.status),
            Some(StageStatus::Skipped)
        );
        assert!(report.findings(StageKind::Subdomain).is_empty());
        assert_eq!(report.findings(StageKind::LiveHost)[0].subject, raw);
    }
}

#[tokio::test]
async fn overlapping_subdomain_probers_are_merged() {
    let pipeline = Pipeline::new(
        registry(vec![
            FakeProber::boxed(
                "a",
                StageKind::Subdomain,
                Behaviour::Static(vec!["www.example.com", "api.example.com"]),
            ),
            FakeProber::boxed(
                "b",
                StageKind::Subdomain,
                Behaviour::Static(vec!["api.example.com", "mail.example.com"]),
            ),
        ]),
        quick_options(),
    );

    let report = assert_ok!(
        pipeline
            .run(
                "example.com",
                &StageSelection::only([StageKind::Subdomain]),
                &CancellationToken::new(),
            )
            .await
    );

    let findings = report.findings(StageKind::Subdomain);
    let mut subjects: Vec<&str> = findings.iter().map(|f| f.subject.as_str()).collect();
    subjects.sort_unstable();
    assert_eq!(subjects, vec!["api.example.com", "mail.example.com", "www.example.com"]);

    let api = findings.iter().find(|f| f.subject == "api.example.com").unwrap();
    let mut by = api.discovered_by.clone();
    by.sort();
    assert_eq!(by, vec!["a".to_string(), "b".to_string()]);
    assert!(api.conflicts.is_empty());
    assert_eq!(report.status, RunStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn hanging_prober_times_out_and_stage_ends() {
    let grace = Duration::from_millis(200);
    let options = RunOptions::default()
        .with_per_probe_timeout(Duration::from_secs(1))
        .with_grace(grace);
    let pipeline = Pipeline::new(
        registry(vec![FakeProber::boxed("stuck", StageKind::PortScan, Behaviour::Hanging)]),
        options,
    );

    let started = tokio::time::Instant::now();
    let report = assert_ok!(
        pipeline
            .run(
                "10.0.0.1",
                &StageSelection::only([StageKind::PortScan]),
                &CancellationToken::new(),
            )
            .await
    );
    let elapsed = started.elapsed();

    let stage = report.stage(StageKind::PortScan).unwrap();
    assert_eq!(
        stage.probers[0].failure.as_ref().map(|f| f.kind),
        Some(ProbeFailureKind::Timeout)
    );
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed <= Duration::from_secs(1) + grace + Duration::from_secs(1));
}

#[tokio::test]
async fn invalid_target_is_rejected_before_any_stage() {
    let live = Arc::new(FakeProber::new("live", StageKind::LiveHost, Behaviour::Echo));
    let seen = Arc::clone(&live.seen);
    let pipeline = Pipeline::new(registry(vec![live as BoxedProber]), quick_options());

    let err = assert_err!(
        pipeline
            .run("not a target!", &StageSelection::All, &CancellationToken::new())
            .await
    );
    assert!(matches!(err, ReconError::InvalidTarget(_)));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn no_registered_prober_is_fatal() {
    let pipeline = Pipeline::new(ProberRegistry::new(), quick_options());
    let err = assert_err!(
        pipeline
            .run("example.com", &StageSelection::All, &CancellationToken::new())
            .await
    );
    assert!(matches!(err, ReconError::NoProbersAvailable));
}

#[tokio::test]
async fn abort_keeps_findings_and_skips_later_stages() {
    let pipeline = Pipeline::new(
        registry(vec![
            FakeProber::boxed("live", StageKind::LiveHost, Behaviour::Echo),
            FakeProber::boxed("stuck", StageKind::PortScan, Behaviour::Hanging),
            FakeProber::boxed("dirs", StageKind::DirectoryEnum, Behaviour::Echo),
        ]),
        RunOptions::default()
            .with_per_probe_timeout(Duration::from_secs(60))
            .with_grace(Duration::from_millis(50)),
    );
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        }
    });

    let report = assert_ok!(
        tokio::time::timeout(
            Duration::from_secs(10),
            pipeline.run("10.0.0.1", &StageSelection::All, &cancel),
        )
        .await
        .expect("abort should end the run")
    );

    assert!(report.aborted);
    assert_eq!(report.status, RunStatus::CompletedWithWarnings);
    assert_eq!(report.findings(StageKind::LiveHost).len(), 1);
    assert_eq!(
        report.stage(StageKind::DirectoryEnum).map(|s| s.status),
        Some(StageStatus::Skipped)
    );
}

#[tokio::test]
async fn resumed_store_feeds_dependent_stage() {
    let previous = FindingStore::new();
    previous.insert(Finding::new(StageKind::Subdomain, "www.example.com", "earlier"));

    let live = Arc::new(FakeProber::new("live", StageKind::LiveHost, Behaviour::Echo));
    let seen = Arc::clone(&live.seen);
    let pipeline = Pipeline::new(registry(vec![live as BoxedProber]), quick_options()).with_store(previous);

    let report = assert_ok!(
        pipeline
            .run(
                "example.com",
                &StageSelection::only([StageKind::LiveHost]),
                &CancellationToken::new(),
            )
            .await
    );

    assert_eq!(seen.lock().unwrap()[0].as_slice(), &["www.example.com".to_string()]);
    assert_eq!(report.findings(StageKind::Subdomain).len(), 1);
    assert_eq!(report.findings(StageKind::LiveHost)[0].subject, "www.example.com");
}

#[cfg(unix)]
#[tokio::test]
async fn tool_needing_unset_wordlist_yields_to_next_prober() {
    let mut registry = registry(vec![FakeProber::boxed(
        "wordlist-dir",
        StageKind::DirectoryEnum,
        Behaviour::Echo,
    )]);
    registry.register_tool(ToolSpec {
        id: "ffuf".to_string(),
        stage: StageKind::DirectoryEnum,
        priority: 90,
        binary: "sh".to_string(),
        args: vec!["-c".into(), "exit 1".into(), "{dir_wordlist}".into()],
        input: TargetInput::Argument,
        endpoints: EndpointForm::Urls,
        format: Default::default(),
    });
    registry.set_policy(StageKind::DirectoryEnum, FanOutPolicy::FirstAvailable);
    let pipeline = Pipeline::new(registry, quick_options());

    let report = assert_ok!(
        pipeline
            .run(
                "example.com",
                &StageSelection::only([StageKind::DirectoryEnum]),
                &CancellationToken::new(),
            )
            .await
    );

    let stage = report.stage(StageKind::DirectoryEnum).unwrap();
    assert_eq!(stage.status, StageStatus::Done);
    assert_eq!(stage.unavailable, vec!["ffuf".to_string()]);
    assert_eq!(stage.probers.len(), 1);
    assert_eq!(stage.probers[0].prober, "wordlist-dir");
    assert_eq!(report.findings(StageKind::DirectoryEnum).len(), 2);
}
