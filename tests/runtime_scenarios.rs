// tests/runtime_scenarios.rs

mod common;
use crate::common::{init_tracing, wait_until, with_timeout, RunningRuntime};

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;

use rulereload::engine::{CoreRuntime, Runtime, RuntimeEvent};
use rulereload::errors::ReloadError;
use rulereload::types::ChangeKind;
use rulereload_test_utils::builders::{candidate, FingerprintBuilder, PipelineBuilder};
use rulereload_test_utils::fakes::{
    BrokenSource, FakeLocator, FakeValidator, RecordingSignaler, ScriptedSource,
};

fn baseline() -> rulereload::watch::Fingerprint {
    FingerprintBuilder::new()
        .with_file("/etc/falco/rules.d/a.yaml", "aaa")
        .with_file("/etc/falco/rules.d/b.yaml", "bbb")
        .build()
}

fn edited_b() -> rulereload::watch::Fingerprint {
    FingerprintBuilder::new()
        .with_file("/etc/falco/rules.d/a.yaml", "aaa")
        .with_file("/etc/falco/rules.d/b.yaml", "bbb-2")
        .build()
}

#[tokio::test]
async fn valid_change_reloads_agent_once() {
    init_tracing();

    let d1 = FingerprintBuilder::new().with_file("/etc/falco/rules.yaml", "d1").build();
    let d2 = FingerprintBuilder::new().with_file("/etc/falco/rules.yaml", "d2").build();

    let signaler = RecordingSignaler::new();
    let pipeline = PipelineBuilder::new()
        .with_process_name("agent")
        .with_locator(&FakeLocator::running("agent", 4242))
        .with_signaler(&signaler)
        .build();
    let (source, script) = ScriptedSource::channel();
    let rt = RunningRuntime::spawn(d1, Box::new(source), pipeline);

    script.push(candidate("/etc/falco/rules.yaml", ChangeKind::Modified, d2.clone()));
    wait_until(|| signaler.count() == 1).await;

    let core = rt.stop().await;
    assert_eq!(signaler.sent(), vec![4242]);
    assert_eq!(core.baseline().get(&PathBuf::from("/etc/falco/rules.yaml")), Some("d2"));
    assert_eq!(core.baseline(), &d2);
}

#[tokio::test]
async fn valid_change_reloads_and_advances_baseline() {
    init_tracing();

    let signaler = RecordingSignaler::new();
    let pipeline = PipelineBuilder::new()
        .with_locator(&FakeLocator::running("falco", 321))
        .with_signaler(&signaler)
        .build();
    let (source, script) = ScriptedSource::channel();
    let rt = RunningRuntime::spawn(baseline(), Box::new(source), pipeline);

    script.push(candidate("/etc/falco/rules.d/b.yaml", ChangeKind::Modified, edited_b()));
    wait_until(|| signaler.count() == 1).await;

    let core = rt.stop().await;
    assert_eq!(signaler.sent(), vec![321]);
    assert_eq!(core.baseline(), &edited_b());
    assert_eq!(core.reloads(), 1);
}

#[tokio::test]
async fn invalid_change_is_not_signalled_and_fix_is() {
    init_tracing();

    let validator = FakeValidator::new();
    validator.reject("/etc/falco/rules.d/b.yaml");
    let signaler = RecordingSignaler::new();
    let pipeline = PipelineBuilder::new()
        .with_validator(&validator)
        .with_signaler(&signaler)
        .build();
    let (source, script) = ScriptedSource::channel();
    let rt = RunningRuntime::spawn(baseline(), Box::new(source), pipeline);

    script.push(candidate("/etc/falco/rules.d/b.yaml", ChangeKind::Modified, edited_b()));
    wait_until(|| validator.calls().len() == 2).await;
    // The runtime asks for the next change with the old baseline.
    wait_until(|| script.baselines().len() == 2).await;
    assert_eq!(script.baselines()[1], baseline());
    assert_eq!(signaler.count(), 0);

    let fixed = FingerprintBuilder::new()
        .with_file("/etc/falco/rules.d/a.yaml", "aaa")
        .with_file("/etc/falco/rules.d/b.yaml", "bbb-3")
        .build();
    validator.accept(&PathBuf::from("/etc/falco/rules.d/b.yaml"));
    script.push(candidate("/etc/falco/rules.d/b.yaml", ChangeKind::Modified, fixed.clone()));
    wait_until(|| signaler.count() == 1).await;

    let core = rt.stop().await;
    assert_eq!(core.baseline(), &fixed);
}

#[tokio::test]
async fn validation_covers_every_tracked_file() {
    init_tracing();

    // Only b changed, but a broken a.yaml still blocks the reload.
    let validator = FakeValidator::new();
    validator.reject("/etc/falco/rules.d/a.yaml");
    let signaler = RecordingSignaler::new();
    let pipeline = PipelineBuilder::new()
        .with_validator(&validator)
        .with_signaler(&signaler)
        .build();
    let (source, script) = ScriptedSource::channel();
    let rt = RunningRuntime::spawn(baseline(), Box::new(source), pipeline);

    script.push(candidate("/etc/falco/rules.d/b.yaml", ChangeKind::Modified, edited_b()));
    wait_until(|| script.baselines().len() == 2).await;

    let core = rt.stop().await;
    assert_eq!(signaler.count(), 0);
    // Validation stops at the first failing file in path order.
    assert_eq!(
        validator.calls(),
        vec![PathBuf::from("/etc/falco/rules.d/a.yaml")]
    );
    assert_eq!(core.baseline(), &baseline());
}

#[tokio::test]
async fn agent_not_running_keeps_change_pending() {
    init_tracing();

    let locator = FakeLocator::stopped();
    let signaler = RecordingSignaler::new();
    let pipeline = PipelineBuilder::new()
        .with_locator(&locator)
        .with_signaler(&signaler)
        .build();
    let (source, script) = ScriptedSource::channel();
    let rt = RunningRuntime::spawn(baseline(), Box::new(source), pipeline);

    script.push(candidate("/etc/falco/rules.d/b.yaml", ChangeKind::Modified, edited_b()));
    wait_until(|| locator.lookups() == 1).await;
    wait_until(|| script.baselines().len() == 2).await;
    assert_eq!(script.baselines()[1], baseline());

    // The agent comes up; the same change is picked up again.
    locator.start("falco", 77);
    script.push(candidate("/etc/falco/rules.d/b.yaml", ChangeKind::Modified, edited_b()));
    wait_until(|| signaler.count() == 1).await;

    let core = rt.stop().await;
    assert_eq!(signaler.sent(), vec![77]);
    assert_eq!(core.baseline(), &edited_b());
}

#[tokio::test]
async fn vanished_agent_does_not_advance_baseline() {
    init_tracing();

    let signaler = RecordingSignaler::new();
    signaler.set_vanished(true);
    let pipeline = PipelineBuilder::new().with_signaler(&signaler).build();
    let (source, script) = ScriptedSource::channel();
    let rt = RunningRuntime::spawn(baseline(), Box::new(source), pipeline);

    script.push(candidate("/etc/falco/rules.d/b.yaml", ChangeKind::Modified, edited_b()));
    wait_until(|| script.baselines().len() == 2).await;

    let core = rt.stop().await;
    assert_eq!(core.baseline(), &baseline());
    assert_eq!(core.reloads(), 0);
}

#[tokio::test]
async fn locate_failure_does_not_advance_baseline() {
    init_tracing();

    let locator = FakeLocator::running("falco", 5);
    locator.set_failing(true);
    let signaler = RecordingSignaler::new();
    let pipeline = PipelineBuilder::new()
        .with_locator(&locator)
        .with_signaler(&signaler)
        .build();
    let (source, script) = ScriptedSource::channel();
    let rt = RunningRuntime::spawn(baseline(), Box::new(source), pipeline);

    script.push(candidate("/etc/falco/rules.d/b.yaml", ChangeKind::Modified, edited_b()));
    wait_until(|| script.baselines().len() == 2).await;

    let core = rt.stop().await;
    assert_eq!(signaler.count(), 0);
    assert_eq!(core.baseline(), &baseline());
}

#[tokio::test]
async fn no_validator_signals_directly() {
    init_tracing();

    let signaler = RecordingSignaler::new();
    let pipeline = PipelineBuilder::new()
        .without_validator()
        .with_signaler(&signaler)
        .build();
    let (source, script) = ScriptedSource::channel();
    let rt = RunningRuntime::spawn(baseline(), Box::new(source), pipeline);

    script.push(candidate("/etc/falco/rules.d/b.yaml", ChangeKind::Removed, FingerprintBuilder::new().build()));
    wait_until(|| signaler.count() == 1).await;

    let core = rt.stop().await;
    assert!(core.baseline().is_empty());
}

#[tokio::test]
async fn at_most_one_cycle_in_flight() {
    init_tracing();

    let validator = FakeValidator::new().with_delay(Duration::from_millis(20));
    let signaler = RecordingSignaler::new();
    let pipeline = PipelineBuilder::new()
        .with_validator(&validator)
        .with_signaler(&signaler)
        .build();
    let (source, script) = ScriptedSource::channel();
    let rt = RunningRuntime::spawn(baseline(), Box::new(source), pipeline);

    for i in 0..5 {
        let fp = FingerprintBuilder::new()
            .with_file("/etc/falco/rules.d/a.yaml", "aaa")
            .with_file("/etc/falco/rules.d/b.yaml", &format!("v{i}"))
            .build();
        script.push(candidate("/etc/falco/rules.d/b.yaml", ChangeKind::Modified, fp));
    }
    wait_until(|| signaler.count() == 5).await;

    let core = rt.stop().await;
    assert_eq!(validator.max_in_flight(), 1);
    assert_eq!(core.reloads(), 5);
    assert_eq!(core.baseline().get(&PathBuf::from("/etc/falco/rules.d/b.yaml")), Some("v4"));
}

#[tokio::test]
async fn shutdown_while_validating_abandons_cycle() {
    init_tracing();

    let validator = FakeValidator::new().with_delay(Duration::from_secs(60));
    let signaler = RecordingSignaler::new();
    let pipeline = PipelineBuilder::new()
        .with_validator(&validator)
        .with_signaler(&signaler)
        .build();
    let (source, script) = ScriptedSource::channel();
    let rt = RunningRuntime::spawn(baseline(), Box::new(source), pipeline);

    script.push(candidate("/etc/falco/rules.d/b.yaml", ChangeKind::Modified, edited_b()));
    wait_until(|| !validator.calls().is_empty()).await;

    let core = rt.stop().await;
    assert_eq!(signaler.count(), 0);
    assert_eq!(core.baseline(), &baseline());
}

#[tokio::test]
async fn shutdown_while_idle_exits_cleanly() {
    init_tracing();

    let (source, _script) = ScriptedSource::channel();
    let rt = RunningRuntime::spawn(baseline(), Box::new(source), PipelineBuilder::new().build());

    let core = rt.stop().await;
    assert_eq!(core.reloads(), 0);
    assert_eq!(core.baseline(), &baseline());
}

#[tokio::test]
async fn source_failure_ends_the_run_with_an_error() {
    init_tracing();

    let (_tx, rx) = mpsc::channel::<RuntimeEvent>(1);
    let runtime = Runtime::new(
        CoreRuntime::new(baseline()),
        Box::new(BrokenSource),
        PipelineBuilder::new().build(),
        rx,
    );

    let result = with_timeout(runtime.run()).await;
    assert!(matches!(result, Err(ReloadError::WatcherClosed)));
}
