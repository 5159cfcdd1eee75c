//! Automation script process spawning and control.
//!
//! This module provides a builder for assembling the script command line
//! and a handle for controlling the running child process.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

#[cfg(not(unix))]
use tokio::process::{ChildStderr, ChildStdout};
use tokio::process::{Child, Command};

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The program was not found.
    #[error("Program not found: {0}")]
    NotFound(String),
    /// Permission denied when spawning.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    fn from_io(program: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(program.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(program.to_string()),
            _ => Self::Io(err),
        }
    }
}

/// Builder for an automation script invocation.
///
/// Flags are rendered as `--key=value`. A flag whose value is empty is
/// dropped instead of being passed through.
#[derive(Debug, Clone, Default)]
pub struct ScriptProcessBuilder {
    program: String,
    base_args: Vec<String>,
    flags: Vec<(String, String)>,
    working_dir: Option<PathBuf>,
}

impl ScriptProcessBuilder {
    /// Create a new builder for the given program.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Append positional arguments (typically the script path).
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a `--key=value` flag.
    #[must_use]
    pub fn flag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.flags.push((key.into(), value.into()));
        self
    }

    /// Add a `--key=value` flag only when a value is present.
    #[must_use]
    pub fn optional_flag(self, key: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.flag(key, value),
            None => self,
        }
    }

    /// Set the working directory for the script process.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Get the working directory, if set.
    #[must_use]
    pub fn get_working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    /// Get the program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Build the command-line arguments.
    #[must_use]
    pub fn build_args(&self) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.extend(
            self.flags
                .iter()
                .filter(|(_, value)| !value.is_empty())
                .map(|(key, value)| format!("--{key}={value}")),
        );
        args
    }
}

/// Read end of the script's combined stdout/stderr.
///
/// On Unix both descriptors of the child point at one pipe, so lines keep
/// the order in which the script wrote them.
#[cfg(unix)]
pub type ScriptOutput = tokio::net::unix::pipe::Receiver;

/// Read end of the script's combined stdout/stderr.
///
/// Without a shared pipe, stdout is read to EOF before stderr.
#[cfg(not(unix))]
pub type ScriptOutput = tokio::io::Chain<ChildStdout, ChildStderr>;

/// A running automation script.
#[derive(Debug)]
pub struct ScriptProcess {
    child: Child,
    output: Option<ScriptOutput>,
}

impl ScriptProcess {
    /// Spawn the script described by the builder.
    ///
    /// Stdout and stderr share one output pipe; stdin is closed. The child
    /// is killed if this handle is dropped before it has been reaped.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the output pipe cannot be created or the
    /// process fails to spawn.
    pub fn spawn(builder: &ScriptProcessBuilder) -> Result<Self, SpawnError> {
        let args = builder.build_args();

        let mut cmd = Command::new(builder.program());
        cmd.args(&args).stdin(Stdio::null()).kill_on_drop(true);

        if let Some(ref dir) = builder.working_dir {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        let output = {
            let (reader, writer) = shared_output_pipe()?;
            cmd.stdout(Stdio::from(writer.try_clone()?))
                .stderr(Stdio::from(writer));
            reader
        };

        #[cfg(not(unix))]
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let child = cmd
            .spawn()
            .map_err(|e| SpawnError::from_io(builder.program(), e))?;
        // The command still holds our copies of the write end.
        drop(cmd);

        #[cfg(not(unix))]
        let (child, output) = {
            use tokio::io::AsyncReadExt;

            let mut child = child;
            match (child.stdout.take(), child.stderr.take()) {
                (Some(stdout), Some(stderr)) => {
                    let output = stdout.chain(stderr);
                    (child, output)
                }
                _ => {
                    return Err(SpawnError::Io(std::io::Error::other(
                        "script output pipes not available",
                    )))
                }
            }
        };

        Ok(Self {
            child,
            output: Some(output),
        })
    }

    /// Take ownership of the combined output.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_output(&mut self) -> Option<ScriptOutput> {
        self.output.take()
    }

    /// Get the process ID, if still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Check if the process has exited without blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if the process state cannot be queried.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Wait for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Forcefully kill the process and reap it.
    ///
    /// # Errors
    ///
    /// Returns an error if the kill signal cannot be sent.
    pub async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }

    /// Attempt graceful termination with a timeout.
    ///
    /// On Unix, sends SIGTERM first, then SIGKILL after the timeout.
    /// On other platforms, falls back to immediate kill. The process is
    /// reaped on every path.
    ///
    /// # Errors
    ///
    /// Returns an error if termination fails.
    pub async fn graceful_terminate(&mut self, timeout: Duration) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            self.graceful_terminate_unix(timeout).await
        }

        #[cfg(not(unix))]
        {
            let _ = timeout;
            self.kill().await
        }
    }

    #[cfg(unix)]
    async fn graceful_terminate_unix(&mut self, timeout: Duration) -> std::io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.id() else {
            // Already reaped.
            return Ok(());
        };

        let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
        if let Err(errno) = kill(nix_pid, Signal::SIGTERM) {
            tracing::debug!(pid, %errno, "SIGTERM failed, falling back to kill");
            return self.child.kill().await;
        }

        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::debug!(pid, "Grace period elapsed, sending SIGKILL");
                self.child.kill().await
            }
        }
    }
}

/// Create the pipe shared by the child's stdout and stderr.
///
/// Both ends are close-on-exec; the child only sees the write end through
/// its standard descriptors.
#[cfg(unix)]
fn shared_output_pipe() -> std::io::Result<(ScriptOutput, std::os::fd::OwnedFd)> {
    use std::os::fd::AsRawFd;

    use nix::fcntl::{fcntl, FcntlArg, FdFlag};

    let (read_end, write_end) = nix::unistd::pipe()?;
    for fd in [&read_end, &write_end] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    let reader = tokio::net::unix::pipe::Receiver::from_owned_fd(read_end)?;
    Ok((reader, write_end))
}
