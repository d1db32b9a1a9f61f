/// Command executor: the only place external processes are spawned.
///
/// Every invocation gets the [`EnvironmentOverlay`] applied and is classified by
/// its [`FailurePolicy`]: a non-zero exit is either fatal (returned as
/// `ProvisionError::CommandFailed`) or tolerated (logged, reported through
/// `StageResult::tolerated`).
use crate::config::EnvironmentOverlay;
use crate::error::{ProvisionError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

/// A single external program invocation, built as an argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Full argv, program first
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    pub fn display(&self) -> String {
        self.argv().join(" ")
    }

    /// Program plus its first argument, used in tolerated-failure log lines
    pub fn short_name(&self) -> String {
        match self.args.first() {
            Some(first) => format!("{} {}", self.program, first),
            None => self.program.clone(),
        }
    }
}

/// How a non-zero exit status is classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Fatal,
    Tolerate,
}

/// Outcome of one external invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Non-zero exit accepted as success
    pub tolerated: bool,
}

impl StageResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Raw process output before classification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Process spawning seam
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion, capturing stdout and stderr
    async fn run(
        &self,
        invocation: &Invocation,
        overlay: &EnvironmentOverlay,
    ) -> std::io::Result<RawOutput>;

    /// Run with inherited stdio and return the exit code
    async fn run_foreground(
        &self,
        invocation: &Invocation,
        overlay: &EnvironmentOverlay,
    ) -> std::io::Result<i32>;
}

/// Spawns real processes through tokio
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ProcessRunner {
    fn command(invocation: &Invocation, overlay: &EnvironmentOverlay) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&invocation.program);
        cmd.args(&invocation.args);
        for (key, value) in overlay.iter() {
            cmd.env(key, value);
        }
        cmd
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        overlay: &EnvironmentOverlay,
    ) -> std::io::Result<RawOutput> {
        let output = Self::command(invocation, overlay)
            .stdin(Stdio::null())
            .output()
            .await?;

        Ok(RawOutput {
            // None means the child was killed by a signal
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn run_foreground(
        &self,
        invocation: &Invocation,
        overlay: &EnvironmentOverlay,
    ) -> std::io::Result<i32> {
        let status = Self::command(invocation, overlay)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await?;
        Ok(status.code().unwrap_or(-1))
    }
}

/// Applies the overlay and the failure policy around a [`CommandRunner`]
#[derive(Clone)]
pub struct Executor {
    runner: Arc<dyn CommandRunner>,
    overlay: EnvironmentOverlay,
}

impl Executor {
    pub fn new(runner: Arc<dyn CommandRunner>, overlay: EnvironmentOverlay) -> Self {
        Self { runner, overlay }
    }

    pub fn overlay(&self) -> &EnvironmentOverlay {
        &self.overlay
    }

    /// Execute an invocation. Spawn failures are fatal regardless of policy.
    pub async fn execute(
        &self,
        invocation: &Invocation,
        policy: FailurePolicy,
    ) -> Result<StageResult> {
        tracing::debug!("[Executor] Running: {}", invocation.display());

        let started = std::time::Instant::now();
        let output = self
            .runner
            .run(invocation, &self.overlay)
            .await
            .map_err(|source| ProvisionError::Spawn {
                command: invocation.display(),
                source,
            })?;
        let elapsed = started.elapsed();

        if output.exit_code == 0 {
            tracing::debug!(
                "[TIMING] {} completed in {}ms",
                invocation.short_name(),
                elapsed.as_millis()
            );
            return Ok(StageResult {
                exit_code: 0,
                stdout: output.stdout,
                stderr: output.stderr,
                tolerated: false,
            });
        }

        match policy {
            FailurePolicy::Tolerate => {
                tracing::warn!(
                    "[Executor] Command failed or resource exists, continuing: {}... (exit {})",
                    invocation.short_name(),
                    output.exit_code
                );
                Ok(StageResult {
                    exit_code: output.exit_code,
                    stdout: output.stdout,
                    stderr: output.stderr,
                    tolerated: true,
                })
            }
            FailurePolicy::Fatal => {
                tracing::error!(
                    "[Executor] Critical error executing: {} (exit {} after {}ms)",
                    invocation.display(),
                    output.exit_code,
                    elapsed.as_millis()
                );
                Err(ProvisionError::command_failed(
                    invocation.display(),
                    output.exit_code,
                    &output.stderr,
                    &output.stdout,
                ))
            }
        }
    }

    pub async fn fatal(&self, invocation: &Invocation) -> Result<StageResult> {
        self.execute(invocation, FailurePolicy::Fatal).await
    }

    pub async fn tolerate(&self, invocation: &Invocation) -> Result<StageResult> {
        self.execute(invocation, FailurePolicy::Tolerate).await
    }

    /// Run a blocking foreground command; a non-zero exit is fatal.
    pub async fn foreground(&self, invocation: &Invocation) -> Result<()> {
        tracing::info!("[Executor] Foreground: {}", invocation.display());
        let exit_code = self
            .runner
            .run_foreground(invocation, &self.overlay)
            .await
            .map_err(|source| ProvisionError::Spawn {
                command: invocation.display(),
                source,
            })?;
        if exit_code != 0 {
            return Err(ProvisionError::command_failed(
                invocation.display(),
                exit_code,
                "",
                "",
            ));
        }
        Ok(())
    }
}

/// Sleep for a settling delay; zero skips the timer entirely.
pub async fn settle(reason: &str, delay: Duration) {
    if delay.is_zero() {
        return;
    }
    tracing::info!("Waiting {:?} for {}", delay, reason);
    tokio::time::sleep(delay).await;
}

/// Quote one word for `sh -c`
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:@,+".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\"'\"'"))
    }
}

/// Join argument vectors into one `set -e` script, quoting every word
pub fn shell_script(steps: &[Vec<String>]) -> String {
    let body = steps
        .iter()
        .map(|step| {
            step.iter()
                .map(|w| shell_quote(w))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("set -e\n{}", body)
}
