//! External process invocation.
//!
//! The engine never touches `tokio::process` directly; it hands a
//! [`CommandSpec`] to a [`ProcessRunner`]. [`SystemRunner`] is the real
//! implementation, tests substitute their own.

use async_trait::async_trait;
use opsctl_core::run::RunOutcome;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::warn;

// ---------------------------------------------------------------------------
// CommandSpec
// ---------------------------------------------------------------------------

/// Everything needed to launch one external process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Applied on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Render as a single shell-like line for logs and run records.
    pub fn display(&self) -> String {
        let mut parts: Vec<String> = self
            .env
            .iter()
            .map(|(k, v)| format!("{k}={}", quote(v)))
            .collect();
        parts.push(quote(&self.program));
        parts.extend(self.args.iter().map(|a| quote(a)));
        parts.join(" ")
    }
}

fn quote(s: &str) -> String {
    if !s.is_empty() && !s.contains(|c: char| c.is_whitespace() || c == '"' || c == '\'') {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

// ---------------------------------------------------------------------------
// ProcessRunner
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `spec` to completion or until `timeout` elapses.
    ///
    /// Must not return an error: every failure mode is a [`RunOutcome`].
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> RunOutcome;
}

/// How long to keep draining pipes after the child is gone. A grandchild
/// that inherited stdout can hold the pipe open past the kill.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Runs commands as real child processes via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> RunOutcome {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                return RunOutcome::LaunchFailed {
                    error: format!("failed to spawn '{}': {e}", spec.program),
                }
            }
        };

        let stdout = Capture::start(child.stdout.take());
        let stderr = Capture::start(child.stderr.take());

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => RunOutcome::Exited {
                exit_code: status.code(),
                stdout: stdout.finish().await,
                stderr: stderr.finish().await,
            },
            Ok(Err(e)) => {
                let _ = child.kill().await;
                RunOutcome::LaunchFailed {
                    error: format!("wait failed: {e}"),
                }
            }
            Err(_elapsed) => {
                if let Err(e) = child.kill().await {
                    warn!(
                        program = %spec.program,
                        error = %e,
                        "failed to kill timed-out process"
                    );
                }
                RunOutcome::TimedOut {
                    stdout: stdout.finish().await,
                    stderr: stderr.finish().await,
                }
            }
        }
    }
}

/// Drains one child pipe in the background into a shared buffer, so
/// whatever was read survives even if the pipe never reaches EOF.
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
}

impl Capture {
    fn start<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let reader = pipe.map(|mut pipe| {
            let buf = buf.clone();
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .extend_from_slice(&chunk[..n]),
                    }
                }
            })
        });
        Self { buf, reader }
    }

    async fn finish(self) -> String {
        if let Some(mut reader) = self.reader {
            if tokio::time::timeout(DRAIN_GRACE, &mut reader).await.is_err() {
                reader.abort();
            }
        }
        let bytes = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let spec = CommandSpec::new("ansible-playbook")
            .arg("site.yml")
            .arg("--limit")
            .arg("web servers")
            .env("ANSIBLE_CONFIG", "zos/ansible.cfg");
        assert_eq!(
            spec.display(),
            "ANSIBLE_CONFIG=zos/ansible.cfg ansible-playbook site.yml --limit 'web servers'"
        );
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let spec = CommandSpec::new("sh").arg("-c").arg("echo hello; echo oops >&2; exit 3");
        match SystemRunner.run(&spec, Duration::from_secs(10)).await {
            RunOutcome::Exited {
                exit_code,
                stdout,
                stderr,
            } => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(stdout.trim(), "hello");
                assert_eq!(stderr.trim(), "oops");
            }
            other => panic!("expected Exited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn passes_env_overrides() {
        let spec = CommandSpec::new("sh")
            .arg("-c")
            .arg("printf %s \"$OPSCTL_TARGET_SCOPE\"")
            .env("OPSCTL_TARGET_SCOPE", "webservers");
        match SystemRunner.run(&spec, Duration::from_secs(10)).await {
            RunOutcome::Exited { stdout, .. } => assert_eq!(stdout, "webservers"),
            other => panic!("expected Exited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_program_is_launch_failure() {
        let spec = CommandSpec::new("__opsctl_nonexistent_xyz__");
        match SystemRunner.run(&spec, Duration::from_secs(5)).await {
            RunOutcome::LaunchFailed { error } => {
                assert!(error.contains("__opsctl_nonexistent_xyz__"), "got: {error}")
            }
            other => panic!("expected LaunchFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_process_times_out() {
        let spec = CommandSpec::new("sleep").arg("5");
        let outcome = SystemRunner.run(&spec, Duration::from_millis(200)).await;
        assert!(matches!(outcome, RunOutcome::TimedOut { .. }), "got {outcome:?}");
    }

    #[tokio::test]
    async fn timed_out_process_keeps_output_written_before_deadline() {
        let script = "echo 'PLAY RECAP ***'; echo 'h1 : ok=1 failed=0'; echo warn >&2; sleep 5";
        let spec = CommandSpec::new("sh").arg("-c").arg(script);
        match SystemRunner.run(&spec, Duration::from_millis(500)).await {
            RunOutcome::TimedOut { stdout, stderr } => {
                assert!(stdout.contains("PLAY RECAP"), "got: {stdout:?}");
                assert!(stdout.contains("h1 : ok=1"), "got: {stdout:?}");
                assert_eq!(stderr.trim(), "warn");
            }
            other => panic!("expected TimedOut, got {other:?}"),
        }
    }
}
