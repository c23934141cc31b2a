//! Running external commands.

use crate::context::EnvironmentSnapshot;
use crate::errors::CommandError;
use async_trait::async_trait;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Lines of stderr kept in a [`CommandError::NonZeroExit`].
const STDERR_TAIL_LINES: usize = 20;

/// A command to run.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute.
    pub program: String,
    /// Arguments, passed verbatim.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: BTreeMap<String, String>,
    /// Data written to the process's stdin.
    pub stdin: Option<String>,
    /// Working directory.
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// Creates a command for a program.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Runs a command line through `sh -c`.
    #[must_use]
    pub fn shell(line: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(line)
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets one environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Passes every variable of a snapshot to the process.
    #[must_use]
    pub fn envs(mut self, snapshot: &EnvironmentSnapshot) -> Self {
        self.env
            .extend(snapshot.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        self
    }

    /// Feeds data to stdin. Stdin data never appears in [`CommandSpec::display`].
    #[must_use]
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// The command line, for logs and errors.
    #[must_use]
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            return self.program.clone();
        }
        format!("{} {}", self.program, self.args.join(" "))
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("command", &self.display())
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field("stdin", &self.stdin.as_ref().map(|_| "<redacted>"))
            .field("cwd", &self.cwd)
            .finish()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` if killed by a signal.
    pub code: Option<i32>,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl CommandOutput {
    /// A successful output with the given stdout.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed output with the given exit code and stderr.
    #[must_use]
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Returns true if the process exited with status zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// The last `lines` lines of stderr.
    #[must_use]
    pub fn stderr_tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.stderr.lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }

    /// First non-empty line of stdout, trimmed.
    #[must_use]
    pub fn first_line(&self) -> &str {
        self.stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("")
    }
}

/// Executes commands.
#[async_trait]
pub trait CommandRunner: Send + Sync + fmt::Debug {
    /// Runs a command to completion and captures its output.
    ///
    /// A non-zero exit is not an error here; see [`CommandRunner::run_checked`].
    ///
    /// # Errors
    ///
    /// Returns an error if the process could not be started.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError>;

    /// Runs a command and turns a non-zero exit into an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the process could not be started or exited
    /// unsuccessfully.
    async fn run_checked(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let output = self.run(spec).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(CommandError::NonZeroExit {
                command: spec.display(),
                code: output.code,
                stderr_tail: output.stderr_tail(STDERR_TAIL_LINES),
            })
        }
    }
}

/// Runs commands as child processes with `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct ShellCommandRunner {
    clear_env: bool,
    default_cwd: Option<PathBuf>,
}

impl ShellCommandRunner {
    /// Creates a runner that inherits the parent environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts children with only the variables in their [`CommandSpec`].
    #[must_use]
    pub fn with_clean_env(mut self) -> Self {
        self.clear_env = true;
        self
    }

    /// Working directory for specs that do not set one.
    #[must_use]
    pub fn with_default_cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_cwd = Some(dir.into());
        self
    }
}

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        if spec.program.trim().is_empty() {
            return Err(CommandError::Empty);
        }

        let mut command = tokio::process::Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);

        if self.clear_env {
            command.env_clear();
        }
        command.envs(&spec.env);

        if let Some(dir) = spec.cwd.as_ref().or(self.default_cwd.as_ref()) {
            command.current_dir(dir);
        }

        debug!(command = %spec.display(), "Spawning command");

        let spawn_error = |source| CommandError::Spawn {
            program: spec.program.clone(),
            source,
        };

        let mut child = command.spawn().map_err(spawn_error)?;

        if let (Some(input), Some(mut stdin)) = (spec.stdin.as_ref(), child.stdin.take()) {
            stdin.write_all(input.as_bytes()).await.map_err(spawn_error)?;
            drop(stdin);
        }

        let output = child.wait_with_output().await.map_err(spawn_error)?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[allow(clippy::expect_used)]
fn variable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
            .expect("variable pattern is valid")
    })
}

/// Expands `${NAME}` and `$NAME` against an environment snapshot.
///
/// Unknown variables expand to an empty string. `$` not followed by a name
/// is left untouched.
#[must_use]
pub fn expand_variables(template: &str, env: &EnvironmentSnapshot) -> String {
    variable_pattern()
        .replace_all(template, |caps: &Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map_or("", |m| m.as_str());
            env.get(name).unwrap_or("").to_string()
        })
        .into_owned()
}
