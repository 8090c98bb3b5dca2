//! Process execution boundary.
//!
//! Git is always run with a fixed argument vector, never through a shell.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("{program} timed out after {}s", timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with code {exit_code}: {stderr}")]
    Execution {
        program: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("failed to start {program}: {message}")]
    Spawn { program: String, message: String },
}

/// Runs external programs.
///
/// `run` returns `Ok` for any process that finished, whatever its exit code;
/// callers decide what a non-zero exit means. `Err` is reserved for timeouts
/// and processes that could not be started.
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError>;
}

/// Executor backed by `tokio::process`.
///
/// Credential prompts are disabled so an auth failure fails fast instead of
/// waiting for input that never comes. On Unix each child leads its own
/// process group, so signals sent to the terminal's foreground group (Ctrl+C)
/// only reach gitbatch itself; cancellation then stops dispatch and lets
/// running operations finish.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessExecutor;

#[async_trait]
impl ProcessExecutor for TokioProcessExecutor {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError> {
        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_ASKPASS", "")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|e| ProcessError::Spawn {
            program: program.to_string(),
            message: e.to_string(),
        })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| ProcessError::Spawn {
                program: program.to_string(),
                message: e.to_string(),
            })?,
            Err(_) => {
                return Err(ProcessError::Timeout {
                    program: program.to_string(),
                    timeout,
                });
            }
        };

        Ok(ProcessOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
