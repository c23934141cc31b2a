//! Scripted stages, hooks and command runners for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::actions::{CommandOutput, CommandRunner, CommandSpec};
use crate::context::{RunContext, StageContext};
use crate::core::Outcome;
use crate::errors::CommandError;
use crate::pipeline::Hook;
use crate::stages::Stage;

/// A stage that returns scripted results and counts its calls.
///
/// Once the script runs out, every further call returns the default result.
#[derive(Debug, Default)]
pub struct MockStage {
    script: Mutex<VecDeque<Result<(), String>>>,
    otherwise: Option<String>,
    archive: Vec<String>,
    call_count: AtomicUsize,
}

impl MockStage {
    /// A stage that always succeeds.
    #[must_use]
    pub fn succeeding() -> Self {
        Self::default()
    }

    /// A stage that always fails with `message`.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            otherwise: Some(message.into()),
            ..Self::default()
        }
    }

    /// Queues a failure for the next unscripted call.
    #[must_use]
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.script.lock().push_back(Err(message.into()));
        self
    }

    /// Queues a success for the next unscripted call.
    #[must_use]
    pub fn then_succeed(self) -> Self {
        self.script.lock().push_back(Ok(()));
        self
    }

    /// Declares an archive request on every call, before the result.
    #[must_use]
    pub fn archiving(mut self, glob: impl Into<String>) -> Self {
        self.archive.push(glob.into());
        self
    }

    /// Number of times the stage ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for MockStage {
    async fn execute(&self, ctx: &StageContext<'_>) -> anyhow::Result<()> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        for glob in &self.archive {
            ctx.archive(crate::archive::ArtifactArchiveRequest::new(glob.clone()).allow_empty());
        }
        let next = self.script.lock().pop_front();
        match next {
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            Some(Ok(())) => Ok(()),
            None => match self.otherwise {
                Some(ref message) => Err(anyhow::anyhow!(message.clone())),
                None => Ok(()),
            },
        }
    }
}

/// A stage that panics with a fixed message.
#[derive(Debug, Clone)]
pub struct PanickingStage {
    message: String,
}

impl PanickingStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Stage for PanickingStage {
    #[allow(clippy::panic)]
    async fn execute(&self, _ctx: &StageContext<'_>) -> anyhow::Result<()> {
        panic!("{}", self.message)
    }
}

/// A stage that sleeps before succeeding.
#[derive(Debug)]
pub struct SlowStage {
    delay: Duration,
    finished: AtomicUsize,
}

impl SlowStage {
    /// Creates a stage sleeping for `delay`.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            finished: AtomicUsize::new(0),
        }
    }

    /// Number of calls that ran to completion.
    #[must_use]
    pub fn finished_count(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for SlowStage {
    async fn execute(&self, _ctx: &StageContext<'_>) -> anyhow::Result<()> {
        tokio::time::sleep(self.delay).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A hook that records the outcome it observed on each call.
#[derive(Debug, Default)]
pub struct RecordingHook {
    seen: Mutex<Vec<Outcome>>,
    error: Option<String>,
}

impl RecordingHook {
    /// A hook that succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A hook that records, then fails with `message`.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            error: Some(message.into()),
        }
    }

    /// Number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.seen.lock().len()
    }

    /// Outcomes observed, in call order.
    #[must_use]
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Hook for RecordingHook {
    async fn run(&self, run: &RunContext) -> anyhow::Result<()> {
        self.seen.lock().push(run.current_outcome());
        match self.error {
            Some(ref message) => Err(anyhow::anyhow!(message.clone())),
            None => Ok(()),
        }
    }
}

/// A [`CommandRunner`] that records commands instead of running them.
///
/// Responses are chosen by the first rule whose prefix matches the
/// command's display form. Unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedCommandRunner {
    rules: Vec<(String, CommandOutput)>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedCommandRunner {
    /// Creates a runner where every command succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers commands starting with `prefix` with `output`.
    #[must_use]
    pub fn respond(mut self, prefix: impl Into<String>, output: CommandOutput) -> Self {
        self.rules.push((prefix.into(), output));
        self
    }

    /// Fails commands starting with `prefix` with an exit code and stderr.
    #[must_use]
    pub fn fail_on(self, prefix: impl Into<String>, code: i32, stderr: impl Into<String>) -> Self {
        self.respond(prefix, CommandOutput::failed(code, stderr))
    }

    /// Display forms of the commands run so far.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.calls.lock().iter().map(CommandSpec::display).collect()
    }

    /// Full specs of the commands run so far.
    #[must_use]
    pub fn specs(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let line = spec.display();
        self.calls.lock().push(spec.clone());
        let output = self
            .rules
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map_or_else(|| CommandOutput::ok(""), |(_, output)| output.clone());
        Ok(output)
    }
}
