//! End-to-end executor scenarios.

#[cfg(test)]
mod tests {
    use crate::archive::{ArtifactArchiveRequest, FileSystemArchiveSink};
    use crate::context::{EnvironmentSnapshot, RunContext};
    use crate::core::{Outcome, StageStatus};
    use crate::events::CollectingEventSink;
    use crate::pipeline::{
        run, Condition, ExecutorConfig, HookSelector, PipelineBuilder, PostHooks, StageSpec,
    };
    use crate::stages::{FnStage, NoOpStage};
    use crate::testing::{
        assert_not_recorded, assert_outcome, assert_statuses, MockStage, PanickingStage,
        RecordingHook, SlowStage,
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    struct Hooks {
        always: Arc<RecordingHook>,
        success: Arc<RecordingHook>,
        failure: Arc<RecordingHook>,
        unstable: Arc<RecordingHook>,
    }

    impl Hooks {
        fn new() -> Self {
            Self {
                always: Arc::new(RecordingHook::new()),
                success: Arc::new(RecordingHook::new()),
                failure: Arc::new(RecordingHook::new()),
                unstable: Arc::new(RecordingHook::new()),
            }
        }

        fn post_hooks(&self) -> PostHooks {
            PostHooks::new()
                .always(self.always.clone())
                .on_success(self.success.clone())
                .on_failure(self.failure.clone())
                .on_unstable(self.unstable.clone())
        }

        fn counts(&self) -> [usize; 4] {
            [
                self.always.call_count(),
                self.success.call_count(),
                self.failure.call_count(),
                self.unstable.call_count(),
            ]
        }
    }

    async fn run_stages(stages: Vec<StageSpec>, hooks: &Hooks) -> RunContext {
        run(
            stages,
            hooks.post_hooks(),
            EnvironmentSnapshot::new(),
            ExecutorConfig::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_skipped_stage_and_logged_failure_make_run_unstable() {
        let hooks = Hooks::new();
        let a = Arc::new(MockStage::succeeding());
        let b = Arc::new(MockStage::succeeding());
        let c = Arc::new(MockStage::failing("lint errors"));

        let run = run_stages(
            vec![
                StageSpec::new("A", a.clone()),
                StageSpec::new("B", b.clone()).with_condition(Condition::never()),
                StageSpec::new("C", c.clone()).logged(),
            ],
            &hooks,
        )
        .await;

        assert_statuses(
            &run,
            &[
                ("A", StageStatus::Succeeded),
                ("B", StageStatus::Skipped),
                ("C", StageStatus::FailedNonfatal),
            ],
        );
        assert_outcome(&run, Outcome::Unstable);
        assert_eq!(b.call_count(), 0);
        assert_eq!(c.call_count(), 1);
        assert_eq!(hooks.counts(), [1, 0, 0, 1]);
    }

    #[tokio::test]
    async fn test_single_fatal_failure_still_runs_hooks() {
        let hooks = Hooks::new();
        let run = run_stages(
            vec![StageSpec::new("A", Arc::new(MockStage::failing("compile error")))],
            &hooks,
        )
        .await;

        assert_statuses(&run, &[("A", StageStatus::Failed)]);
        assert_outcome(&run, Outcome::Failure);
        assert_eq!(hooks.counts(), [1, 0, 1, 0]);
        assert_eq!(hooks.failure.outcomes(), vec![Outcome::Failure]);
        let error = run.stage("A").and_then(|r| r.error_message.as_deref());
        assert!(error.is_some_and(|e| e.contains("compile error")));
    }

    #[tokio::test]
    async fn test_fatal_failure_stops_later_stages() {
        let hooks = Hooks::new();
        let later = Arc::new(MockStage::succeeding());
        let run = run_stages(
            vec![
                StageSpec::new("build", Arc::new(NoOpStage)),
                StageSpec::new("deploy", Arc::new(MockStage::failing("denied"))),
                StageSpec::new("notify", later.clone()),
            ],
            &hooks,
        )
        .await;

        assert_outcome(&run, Outcome::Failure);
        assert_not_recorded(&run, "notify");
        assert_eq!(later.call_count(), 0);
    }

    #[tokio::test]
    async fn test_logged_failures_keep_running_every_stage() {
        let hooks = Hooks::new();
        let stages: Vec<_> = (0..4)
            .map(|i| {
                let runner: Arc<MockStage> = if i % 2 == 0 {
                    Arc::new(MockStage::failing(format!("stage {i}")))
                } else {
                    Arc::new(MockStage::succeeding())
                };
                StageSpec::new(format!("s{i}"), runner).logged()
            })
            .collect();

        let run = run_stages(stages, &hooks).await;
        assert_outcome(&run, Outcome::Unstable);
        assert_eq!(run.executed_stages().len(), 4);
        assert_eq!(run.count(StageStatus::FailedNonfatal), 2);
    }

    #[tokio::test]
    async fn test_always_hook_runs_once_for_every_outcome() {
        let cases: Vec<(Vec<StageSpec>, Outcome, [usize; 4])> = vec![
            (
                vec![StageSpec::new("ok", Arc::new(NoOpStage))],
                Outcome::Success,
                [1, 1, 0, 0],
            ),
            (
                vec![StageSpec::new("bad", Arc::new(MockStage::failing("x")))],
                Outcome::Failure,
                [1, 0, 1, 0],
            ),
            (
                vec![StageSpec::new("meh", Arc::new(MockStage::failing("x"))).logged()],
                Outcome::Unstable,
                [1, 0, 0, 1],
            ),
        ];

        for (stages, expected, counts) in cases {
            let hooks = Hooks::new();
            let run = run_stages(stages, &hooks).await;
            assert_outcome(&run, expected);
            assert_eq!(hooks.counts(), counts);
            assert_eq!(run.hook_runs()[0].selector, HookSelector::Always);
        }
    }

    #[tokio::test]
    async fn test_configuration_errors_run_no_hooks() {
        let hooks = Hooks::new();

        let err = run(
            Vec::new(),
            hooks.post_hooks(),
            EnvironmentSnapshot::new(),
            ExecutorConfig::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), Some("CONFIG-EMPTY"));

        let stage = Arc::new(MockStage::succeeding());
        let err = run(
            vec![
                StageSpec::new("test", stage.clone()),
                StageSpec::new("test", stage.clone()),
            ],
            hooks.post_hooks(),
            EnvironmentSnapshot::new(),
            ExecutorConfig::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), Some("CONFIG-DUPLICATE"));
        assert_eq!(err.stages, vec!["test"]);

        assert_eq!(hooks.counts(), [0, 0, 0, 0]);
        assert_eq!(stage.call_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_aborts_stage_and_runs_always_hook() {
        let hooks = Hooks::new();
        let slow = Arc::new(SlowStage::new(Duration::from_secs(30)));
        let after = Arc::new(MockStage::succeeding());

        let pipeline = PipelineBuilder::new("timeout")
            .logged_stage("slow", slow.clone())
            .stage("after", after.clone())
            .with_hooks(hooks.post_hooks())
            .with_timeout(Duration::from_millis(50))
            .build()
            .unwrap();

        let run = pipeline.run(EnvironmentSnapshot::new()).await;

        assert_statuses(&run, &[("slow", StageStatus::Failed)]);
        assert_outcome(&run, Outcome::Failure);
        assert_eq!(slow.finished_count(), 0);
        assert_eq!(after.call_count(), 0);
        assert_eq!(hooks.counts(), [1, 0, 1, 0]);
    }

    #[tokio::test]
    async fn test_stage_overrunning_deadline_stops_pipeline() {
        let hooks = Hooks::new();
        let never_started = Arc::new(MockStage::succeeding());
        let pipeline = PipelineBuilder::new("deadline")
            .logged_stage(
                "blocking",
                Arc::new(FnStage::new("blocking", |_| {
                    std::thread::sleep(Duration::from_millis(40));
                    Ok(())
                })),
            )
            .stage("next", never_started.clone())
            .with_hooks(hooks.post_hooks())
            .with_timeout(Duration::from_millis(10))
            .build()
            .unwrap();

        let run = pipeline.run(EnvironmentSnapshot::new()).await;

        assert_statuses(&run, &[("blocking", StageStatus::Failed)]);
        assert_not_recorded(&run, "next");
        assert_eq!(never_started.call_count(), 0);
        assert_outcome(&run, Outcome::Failure);
        assert_eq!(hooks.always.call_count(), 1);
    }

    #[tokio::test]
    async fn test_blocking_last_stage_past_deadline_fails_run() {
        let hooks = Hooks::new();
        let pipeline = PipelineBuilder::new("blocking-last")
            .stage("checkout", Arc::new(NoOpStage))
            .stage(
                "blocking",
                Arc::new(FnStage::new("blocking", |_| {
                    std::thread::sleep(Duration::from_millis(60));
                    Ok(())
                })),
            )
            .with_hooks(hooks.post_hooks())
            .with_timeout(Duration::from_millis(10))
            .build()
            .unwrap();

        let run = pipeline.run(EnvironmentSnapshot::new()).await;

        assert_statuses(
            &run,
            &[("checkout", StageStatus::Succeeded), ("blocking", StageStatus::Failed)],
        );
        assert_outcome(&run, Outcome::Failure);
        let error = run.stage("blocking").and_then(|r| r.error_message.as_deref());
        assert!(error.is_some_and(|e| e.contains("timed out")));
        assert_eq!(hooks.counts(), [1, 0, 1, 0]);
    }

    #[tokio::test]
    async fn test_panics_are_classified_by_policy() {
        let hooks = Hooks::new();
        let run = run_stages(
            vec![
                StageSpec::new("flaky", Arc::new(PanickingStage::new("index out of bounds"))).logged(),
                StageSpec::new("fine", Arc::new(NoOpStage)),
            ],
            &hooks,
        )
        .await;
        assert_statuses(
            &run,
            &[("flaky", StageStatus::FailedNonfatal), ("fine", StageStatus::Succeeded)],
        );
        assert_outcome(&run, Outcome::Unstable);

        let hooks = Hooks::new();
        let run = run_stages(
            vec![
                StageSpec::new("broken", Arc::new(PanickingStage::new("boom"))),
                StageSpec::new("fine", Arc::new(NoOpStage)),
            ],
            &hooks,
        )
        .await;
        assert_statuses(&run, &[("broken", StageStatus::Failed)]);
        assert_outcome(&run, Outcome::Failure);
        let error = run.stage("broken").and_then(|r| r.error_message.as_deref());
        assert!(error.is_some_and(|e| e.contains("boom")));
    }

    #[tokio::test]
    async fn test_failing_and_panicking_hooks_do_not_change_outcome() {
        let panicking = PanickingHook;
        let failing = Arc::new(RecordingHook::failing("cleanup failed"));
        let pipeline = PipelineBuilder::new("hooks")
            .stage("ok", Arc::new(NoOpStage))
            .with_hooks(
                PostHooks::new()
                    .always(failing.clone())
                    .on_success(Arc::new(panicking)),
            )
            .build()
            .unwrap();

        let run = pipeline.run(EnvironmentSnapshot::new()).await;
        assert_outcome(&run, Outcome::Success);
        assert_eq!(failing.call_count(), 1);
        assert_eq!(run.hook_runs().len(), 2);
        assert!(run.hook_runs().iter().all(|h| !h.is_ok()));
    }

    #[derive(Debug)]
    struct PanickingHook;

    #[async_trait::async_trait]
    impl crate::pipeline::Hook for PanickingHook {
        async fn run(&self, _run: &RunContext) -> anyhow::Result<()> {
            panic!("hook exploded")
        }
    }

    #[tokio::test]
    async fn test_archive_failure_does_not_change_outcome() {
        let workspace = tempfile::tempdir().unwrap();
        let destination = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(workspace.path().join("reports")).unwrap();
        std::fs::write(workspace.path().join("reports/junit.xml"), "<testsuite/>").unwrap();

        let sink = Arc::new(CollectingEventSink::new());
        let pipeline = PipelineBuilder::new("archive")
            .stage(
                "test",
                Arc::new(MockStage::succeeding().archiving("reports/*.xml")),
            )
            .stage(
                "package",
                Arc::new(FnStage::new("package", |ctx| {
                    ctx.archive(ArtifactArchiveRequest::new("dist/*.tgz"));
                    Ok(())
                })),
            )
            .with_workspace(workspace.path())
            .with_archive_sink(Arc::new(FileSystemArchiveSink::new(destination.path())))
            .with_event_sink(sink.clone())
            .build()
            .unwrap();

        let run = pipeline.run(EnvironmentSnapshot::new()).await;

        assert_outcome(&run, Outcome::Success);
        let results = run.archive_results();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert_eq!(results[0].files.len(), 1);
        assert!(!results[1].is_ok());
        assert!(destination.path().join("reports/junit.xml").exists());
        assert_eq!(sink.events_of_type("archive.failed").len(), 1);
    }

    #[tokio::test]
    async fn test_failed_stage_keeps_declared_archive_requests() {
        let hooks = Hooks::new();
        let run = run_stages(
            vec![StageSpec::new(
                "tests",
                Arc::new(MockStage::failing("2 failing").archiving("reports/**")),
            )
            .logged()],
            &hooks,
        )
        .await;

        assert_outcome(&run, Outcome::Unstable);
        assert_eq!(run.archive_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_conditions_see_earlier_outcome() {
        let hooks = Hooks::new();
        let publish = Arc::new(MockStage::succeeding());
        let run = run_stages(
            vec![
                StageSpec::new("lint", Arc::new(MockStage::failing("style"))).logged(),
                StageSpec::new("publish", publish.clone())
                    .with_condition(Condition::outcome_is_not_failure()),
            ],
            &hooks,
        )
        .await;

        assert_eq!(run.status_of("publish"), Some(StageStatus::Succeeded));
        assert_eq!(publish.call_count(), 1);
        assert_outcome(&run, Outcome::Unstable);
    }

    #[tokio::test]
    async fn test_event_stream_for_failed_run() {
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline = PipelineBuilder::new("events")
            .conditional_stage("skip", Arc::new(NoOpStage), Condition::never())
            .stage("fail", Arc::new(MockStage::failing("nope")))
            .hook(HookSelector::Always, Arc::new(RecordingHook::new()))
            .with_event_sink(sink.clone())
            .build()
            .unwrap();

        let _ = pipeline.run(EnvironmentSnapshot::new()).await;

        assert_eq!(
            sink.event_types(),
            vec![
                "pipeline.started",
                "stage.skipped",
                "stage.started",
                "stage.failed",
                "hook.invoked",
                "pipeline.finished",
            ]
        );
    }
}
