//! External process execution
//!
//! Every collaborator (kubectl, docker, pachctl, minikube, aws, make) is
//! driven through [`ProcessRunner`]. The runner logs a status line per
//! command with secrets redacted, delegates the actual spawn to a
//! [`ProcessBackend`], and turns nonzero exits into [`ProcessError::Execution`]
//! unless the invocation opted out.

#[cfg(test)]
pub mod fake;
pub mod poll;

pub use poll::{poll_until, wait_for_success};

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Placeholder substituted for redacted arguments in logs and errors
pub const REDACTED_PLACEHOLDER: &str = "[redacted]";

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("unexpected return code from `{command}`: {exit_code}")]
    Execution { command: String, exit_code: i32 },

    #[error("`{command}` did not finish within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("lost contact with `{command}` while it was running: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("output of `{command}` is not valid UTF-8")]
    Decode {
        command: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

/// A secret that must never appear in cleartext in logs
#[derive(Clone, PartialEq, Eq)]
pub struct RedactedValue(String);

impl RedactedValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The cleartext, for handing to the child process only
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RedactedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED_PLACEHOLDER)
    }
}

impl fmt::Display for RedactedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED_PLACEHOLDER)
    }
}

/// A single command-line argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Plain(String),
    Redacted(RedactedValue),
}

impl Arg {
    /// Value passed to the child process
    pub fn value(&self) -> &str {
        match self {
            Arg::Plain(s) => s,
            Arg::Redacted(secret) => secret.expose(),
        }
    }

    /// Value shown in logs
    pub fn display_value(&self) -> &str {
        match self {
            Arg::Plain(s) => s,
            Arg::Redacted(_) => REDACTED_PLACEHOLDER,
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Plain(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Plain(s)
    }
}

impl From<&String> for Arg {
    fn from(s: &String) -> Self {
        Arg::Plain(s.clone())
    }
}

impl From<RedactedValue> for Arg {
    fn from(secret: RedactedValue) -> Self {
        Arg::Redacted(secret)
    }
}

/// Description of one external command invocation
///
/// Defaults: output inherited (not captured), no stdin, nonzero exit is an
/// error, no timeout.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: String,
    args: Vec<Arg>,
    stdin: Option<String>,
    capture_output: bool,
    check: bool,
    timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            capture_output: false,
            check: true,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Attach a redacted argument
    pub fn secret(self, secret: RedactedValue) -> Self {
        self.arg(Arg::Redacted(secret))
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn capture_output(mut self) -> Self {
        self.capture_output = true;
        self
    }

    /// Do not treat a nonzero exit as an error
    pub fn allow_failure(mut self) -> Self {
        self.check = false;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arg_list(&self) -> &[Arg] {
        &self.args
    }

    pub fn stdin_input(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    pub fn captures_output(&self) -> bool {
        self.capture_output
    }

    pub fn checks_exit_code(&self) -> bool {
        self.check
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout
    }

    /// Command line as it may be logged: redacted arguments are masked
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(Arg::display_value))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Outcome of a finished external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub exit_code: i32,
    /// Present only when output was captured
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Seam between the runner and the operating system
///
/// Implementations execute the invocation and report its exit code. They
/// must not interpret the exit code; that is the runner's job.
#[async_trait]
pub trait ProcessBackend: Send + Sync {
    async fn execute(&self, invocation: &Invocation) -> Result<RunResult, ProcessError>;
}

/// Spawns real child processes via `tokio::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBackend;

#[async_trait]
impl ProcessBackend for SystemBackend {
    async fn execute(&self, invocation: &Invocation) -> Result<RunResult, ProcessError> {
        let mut command = Command::new(invocation.program());
        command
            .args(invocation.arg_list().iter().map(Arg::value))
            .kill_on_drop(true);

        if invocation.stdin_input().is_some() {
            command.stdin(Stdio::piped());
        }
        if invocation.captures_output() {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            command: invocation.display(),
            source,
        })?;

        let stdin_pipe = child.stdin.take();
        let input = invocation.stdin_input().map(|s| s.as_bytes().to_vec());

        let exchange = async move {
            let feed = async move {
                if let (Some(mut pipe), Some(bytes)) = (stdin_pipe, input) {
                    pipe.write_all(&bytes).await?;
                    pipe.shutdown().await?;
                }
                Ok::<(), std::io::Error>(())
            };
            let (fed, output) = tokio::join!(feed, child.wait_with_output());
            // A child that exits without reading its stdin closes the pipe
            // early; its exit code is what matters, not the broken pipe.
            if let Err(e) = fed {
                debug!(error = %e, "stdin pipe closed before all input was written");
            }
            output
        };

        let output = match invocation.timeout_duration() {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| ProcessError::Timeout {
                    command: invocation.display(),
                    timeout: limit,
                })?,
            None => exchange.await,
        }
        .map_err(|source| ProcessError::Wait {
            command: invocation.display(),
            source,
        })?;

        let exit_code = exit_code_of(output.status);

        let (stdout, stderr) = if invocation.captures_output() {
            (
                Some(decode(invocation, output.stdout)?),
                Some(decode(invocation, output.stderr)?),
            )
        } else {
            (None, None)
        };

        Ok(RunResult {
            exit_code,
            stdout,
            stderr,
        })
    }
}

/// Exit code of a finished child; a signal termination is the negated
/// signal number
#[cfg(unix)]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|signal| -signal))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn decode(invocation: &Invocation, bytes: Vec<u8>) -> Result<String, ProcessError> {
    String::from_utf8(bytes).map_err(|source| ProcessError::Decode {
        command: invocation.display(),
        source,
    })
}

/// Runs invocations through a backend, logging and checking exit codes
#[derive(Clone)]
pub struct ProcessRunner {
    backend: Arc<dyn ProcessBackend>,
}

impl fmt::Debug for ProcessRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRunner").finish_non_exhaustive()
    }
}

impl ProcessRunner {
    /// Runner backed by real child processes
    pub fn system() -> Self {
        Self::with_backend(Arc::new(SystemBackend))
    }

    pub fn with_backend(backend: Arc<dyn ProcessBackend>) -> Self {
        Self { backend }
    }

    /// Run a command
    ///
    /// Writes one status line before execution. Fails with
    /// [`ProcessError::Execution`] on nonzero exit unless the invocation
    /// called [`Invocation::allow_failure`], and with
    /// [`ProcessError::Timeout`] if its timeout elapses.
    pub async fn run(&self, invocation: Invocation) -> Result<RunResult, ProcessError> {
        let command = invocation.display();
        info!("running: `{}`", command);

        let result = self.backend.execute(&invocation).await?;

        if invocation.checks_exit_code() && !result.success() {
            return Err(ProcessError::Execution {
                command,
                exit_code: result.exit_code,
            });
        }

        Ok(result)
    }

    /// Run a command with output captured and return its stdout
    pub async fn capture(&self, invocation: Invocation) -> Result<String, ProcessError> {
        let result = self.run(invocation.capture_output()).await?;
        Ok(result.stdout.unwrap_or_default())
    }
}

/// Await a fallible step whose failure is expected and harmless
///
/// The error is logged at debug level and discarded.
pub async fn best_effort<T, E, F>(step: &str, fut: F) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(step = step, error = %e, "best-effort step failed, continuing");
            None
        }
    }
}

#[cfg(test)]
#[path = "process_test.rs"]
mod tests;
