//! Bounded-time execution of an external command.
//!
//! The invoker never raises past its boundary: every way a run can go wrong
//! comes back as an [`ExternalOutcome::Failure`] with whatever output was
//! captured. It never retries.

use std::ffi::{OsStr, OsString};
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::extract::extract_result;
use crate::outcome::{ExternalOutcome, Failure, FailureKind, Success};

/// Default timeout for one invocation (2 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// How a command is run. Fixed at construction; nothing is read from the
/// ambient process environment unless `inherit_env` is left on.
#[derive(Debug, Clone)]
pub struct InvokerConfig {
    /// Program to execute.
    pub program: PathBuf,
    /// Arguments placed before the per-call arguments (e.g. a script path).
    pub leading_args: Vec<OsString>,
    /// Extra environment variables.
    pub env: Vec<(OsString, OsString)>,
    /// Whether the child starts from the parent's environment.
    pub inherit_env: bool,
    /// Working directory; the parent's when `None`.
    pub working_dir: Option<PathBuf>,
    /// Hard deadline for the whole run.
    pub timeout: Duration,
    /// How often the child is polled.
    pub poll_interval: Duration,
    /// How long to keep draining pipes once the child is gone.
    pub drain_grace: Duration,
}

impl InvokerConfig {
    /// Run `program` with the default timeout and the parent's environment.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            env: Vec::new(),
            inherit_env: true,
            working_dir: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(20),
            drain_grace: Duration::from_millis(500),
        }
    }

    /// Append a leading argument, placed before per-call arguments.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.leading_args.push(arg.into());
        self
    }

    /// Set an environment variable for the child.
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Start the child from an empty environment.
    pub fn clear_env(mut self) -> Self {
        self.inherit_env = false;
        self
    }

    /// Run the child in `dir`.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the hard deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the hard deadline in whole seconds.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

/// Raw result of running a command to exit or deadline.
#[derive(Debug)]
pub struct Captured {
    /// `None` when the deadline fired and the child was killed.
    pub status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Runs one configured command per call.
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    config: InvokerConfig,
}

impl ProcessInvoker {
    /// Create an invoker from its configuration.
    pub fn new(config: InvokerConfig) -> Self {
        Self { config }
    }

    /// Get the invoker configuration.
    pub fn config(&self) -> &InvokerConfig {
        &self.config
    }

    /// Run with `args` and turn the result into a typed outcome.
    ///
    /// A clean exit alone is not success: the recovered payload must be an
    /// object whose `success` field is `true`.
    pub fn invoke<I, S>(&self, args: I) -> ExternalOutcome
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let captured = match self.run(args) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(
                    program = %self.config.program.display(),
                    error = %e,
                    "failed to spawn"
                );
                return ExternalOutcome::Failure(Failure::new(
                    FailureKind::Spawn {
                        message: e.to_string(),
                    },
                    String::new(),
                    String::new(),
                ));
            }
        };

        let Captured {
            status,
            stdout,
            stderr,
            elapsed,
        } = captured;

        let status = match status {
            Some(s) => s,
            None => {
                let failure = Failure::new(
                    FailureKind::Timeout {
                        after: self.config.timeout,
                    },
                    stdout,
                    stderr,
                );
                return ExternalOutcome::Failure(failure);
            }
        };

        if !status.success() {
            let payload = extract_result(&stdout).ok().map(|e| e.value);
            let kind = FailureKind::Exit {
                code: status.code(),
            };
            let mut failure = Failure::new(kind, stdout, stderr);
            failure.payload = payload;
            return ExternalOutcome::Failure(failure);
        }

        let extracted = match extract_result(&stdout) {
            Ok(e) => e,
            Err(_) => {
                tracing::warn!(bytes = stdout.len(), "no structured result in output");
                let failure = Failure::new(FailureKind::Extraction, stdout, stderr);
                return ExternalOutcome::Failure(failure);
            }
        };

        match extracted.value {
            Value::Object(payload)
                if payload.get("success").and_then(Value::as_bool) == Some(true) =>
            {
                ExternalOutcome::Success(Success {
                    payload,
                    strategy: extracted.strategy,
                    stdout,
                    stderr,
                    elapsed,
                })
            }
            other => ExternalOutcome::Failure(
                Failure::new(FailureKind::Logical, stdout, stderr).with_payload(other),
            ),
        }
    }

    /// Spawn the command and wait for exit or deadline, capturing both
    /// streams. Only a failure to spawn is an error.
    pub fn run<I, S>(&self, args: I) -> std::io::Result<Captured>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command(args);
        let start = Instant::now();
        let mut child = cmd.spawn()?;
        tracing::debug!(
            program = %self.config.program.display(),
            pid = child.id(),
            timeout = ?self.config.timeout,
            "spawned external process"
        );

        let (tx, rx) = mpsc::channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            readers.push(spawn_reader(out, Pipe::Stdout, tx.clone()));
        }
        if let Some(err) = child.stderr.take() {
            readers.push(spawn_reader(err, Pipe::Stderr, tx.clone()));
        }
        drop(tx);

        let mut sink = OutputSink::default();
        let status = self.wait_with_timeout(&mut child, &rx, &mut sink, start);
        let drained = sink.drain(&rx, self.config.drain_grace);
        if drained {
            for handle in readers {
                let _ = handle.join();
            }
        }

        let elapsed = start.elapsed();
        match status {
            Some(s) => tracing::debug!(code = ?s.code(), ?elapsed, "external process exited"),
            None => tracing::warn!(
                program = %self.config.program.display(),
                ?elapsed,
                "external process timed out and was killed"
            ),
        }

        Ok(Captured {
            status,
            stdout: String::from_utf8_lossy(&sink.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&sink.stderr).into_owned(),
            elapsed,
        })
    }

    fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.leading_args).args(args);
        if !self.config.inherit_env {
            cmd.env_clear();
        }
        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }
        if let Some(ref dir) = self.config.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    /// Poll until exit; on deadline kill and reap the child and return `None`.
    fn wait_with_timeout(
        &self,
        child: &mut Child,
        rx: &Receiver<(Pipe, Vec<u8>)>,
        sink: &mut OutputSink,
        start: Instant,
    ) -> Option<ExitStatus> {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Some(status),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "try_wait failed, killing child");
                    kill_and_reap(child);
                    return None;
                }
            }

            if start.elapsed() >= self.config.timeout {
                kill_and_reap(child);
                return None;
            }

            // Doubles as the poll sleep while keeping the pipes drained.
            match rx.recv_timeout(self.config.poll_interval) {
                Ok((pipe, bytes)) => sink.push(pipe, bytes),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => thread::sleep(self.config.poll_interval),
            }
        }
    }
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[derive(Debug, Clone, Copy)]
enum Pipe {
    Stdout,
    Stderr,
}

#[derive(Default)]
struct OutputSink {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl OutputSink {
    fn push(&mut self, pipe: Pipe, bytes: Vec<u8>) {
        match pipe {
            Pipe::Stdout => self.stdout.extend_from_slice(&bytes),
            Pipe::Stderr => self.stderr.extend_from_slice(&bytes),
        }
    }

    /// Collect what the readers still deliver. Returns `true` when both pipes
    /// closed; `false` when the grace period ran out first (a grandchild may
    /// still hold them open).
    fn drain(&mut self, rx: &Receiver<(Pipe, Vec<u8>)>, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((pipe, bytes)) => self.push(pipe, bytes),
                Err(RecvTimeoutError::Disconnected) => return true,
                Err(RecvTimeoutError::Timeout) => return false,
            }
        }
    }
}

fn spawn_reader<R>(mut source: R, pipe: Pipe, tx: Sender<(Pipe, Vec<u8>)>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send((pipe, buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    fn sh(script: &str) -> ProcessInvoker {
        ProcessInvoker::new(InvokerConfig::new("/bin/sh").arg("-c").arg(script).timeout_secs(10))
    }

    #[test]
    fn test_success_payload() {
        let outcome = sh(r#"echo 'booting'; echo '{"success":true,"txid":"abc"}'"#)
            .invoke(Vec::<String>::new());
        let success = outcome.into_result().unwrap();
        assert_eq!(success.field_str("txid"), Some("abc"));
    }

    #[test]
    fn test_positional_args_passed_through() {
        // $0 is the first per-call argument under `sh -c`.
        let outcome = sh(r#"printf '{"success":true,"args":["%s","%s"]}' "$0" "$1""#)
            .invoke(["fp", "file:///tmp/m.pt"]);
        let success = outcome.into_result().unwrap();
        assert_eq!(success.payload["args"], json!(["fp", "file:///tmp/m.pt"]));
    }

    #[test]
    fn test_clean_exit_with_success_false_is_logical() {
        let outcome = sh(r#"echo '{"success":false,"error":"dup"}'"#).invoke(Vec::<String>::new());
        let failure = outcome.into_result().unwrap_err();
        assert_eq!(failure.kind, FailureKind::Logical);
        assert_eq!(failure.reported_error(), Some("dup"));
        assert!(!failure.is_transport());
    }

    #[test]
    fn test_missing_success_field_is_logical() {
        let outcome = sh(r#"echo '{"txid":"abc"}'"#).invoke(Vec::<String>::new());
        assert_eq!(outcome.into_result().unwrap_err().kind, FailureKind::Logical);
    }

    #[test]
    fn test_nonzero_exit_keeps_output_and_payload() {
        let outcome =
            sh(r#"echo '{"success":false,"error":"wallet missing"}'; echo oops >&2; exit 3"#)
                .invoke(Vec::<String>::new());
        let failure = outcome.into_result().unwrap_err();
        assert_eq!(failure.kind, FailureKind::Exit { code: Some(3) });
        assert_eq!(failure.stderr.trim(), "oops");
        assert_eq!(failure.reported_error(), Some("wallet missing"));
    }

    #[test]
    fn test_garbage_output_is_extraction_failure() {
        let outcome = sh("echo 'not json at all'").invoke(Vec::<String>::new());
        let failure = outcome.into_result().unwrap_err();
        assert_eq!(failure.kind, FailureKind::Extraction);
        assert_eq!(failure.stdout.trim(), "not json at all");
    }

    #[test]
    fn test_spawn_failure() {
        let invoker = ProcessInvoker::new(InvokerConfig::new("/nonexistent/registrar-binary"));
        let failure = invoker.invoke(Vec::<String>::new()).into_result().unwrap_err();
        assert!(matches!(failure.kind, FailureKind::Spawn { .. }));
    }

    #[test]
    fn test_timeout_kills_child_and_keeps_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!(
            "echo $$ > {}; echo 'partial progress'; exec sleep 30",
            pid_file.display()
        );
        let invoker = ProcessInvoker::new(
            InvokerConfig::new("/bin/sh")
                .arg("-c")
                .arg(script)
                .timeout(Duration::from_millis(300)),
        );

        let start = Instant::now();
        let failure = invoker.invoke(Vec::<String>::new()).into_result().unwrap_err();
        assert!(failure.is_timeout());
        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(failure.stdout.contains("partial progress"));

        // The shell exec'd into sleep, so the recorded pid is the killed child.
        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let alive = Command::new("/bin/sh")
            .arg("-c")
            .arg(format!("kill -0 {}", pid.trim()))
            .stderr(Stdio::null())
            .status()
            .unwrap();
        assert!(!alive.success(), "child {} still running", pid.trim());
    }

    #[test]
    fn test_env_and_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = ProcessInvoker::new(
            InvokerConfig::new("/bin/sh")
                .arg("-c")
                .arg(r#"printf '{"success":true,"who":"%s","cwd":"%s"}' "$WHO" "$(pwd)""#)
                .env("WHO", "registrar")
                .working_dir(dir.path()),
        );
        let success = invoker.invoke(Vec::<String>::new()).into_result().unwrap();
        assert_eq!(success.field_str("who"), Some("registrar"));
        let cwd = std::fs::canonicalize(success.field_str("cwd").unwrap()).unwrap();
        assert_eq!(cwd, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_large_output_does_not_block() {
        // Well past a pipe buffer on both streams.
        let outcome = sh(
            r#"i=0; while [ $i -lt 20000 ]; do echo "log line $i"; echo "err line $i" >&2; i=$((i+1)); done; echo '{"success":true}'"#,
        )
        .invoke(Vec::<String>::new());
        let success = outcome.into_result().unwrap();
        assert!(success.stderr.lines().count() >= 20000);
    }
}
