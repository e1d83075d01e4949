//! Typed outcome of one external process invocation.

use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

use crate::extract::ExtractionStrategy;

/// Default length of [`Failure::summary`], in characters.
pub const DEFAULT_SUMMARY_CHARS: usize = 1000;

/// Result of running an external command. Created per call, never retained.
#[derive(Debug, Clone)]
pub enum ExternalOutcome {
    Success(Success),
    Failure(Failure),
}

impl ExternalOutcome {
    /// Whether the tool reported success.
    pub fn is_success(&self) -> bool {
        matches!(self, ExternalOutcome::Success(_))
    }

    /// Convert into a `Result`, for `?`.
    pub fn into_result(self) -> Result<Success, Failure> {
        match self {
            ExternalOutcome::Success(s) => Ok(s),
            ExternalOutcome::Failure(f) => Err(f),
        }
    }

    /// The failure, if the call did not succeed.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            ExternalOutcome::Failure(f) => Some(f),
            ExternalOutcome::Success(_) => None,
        }
    }
}

/// The process exited cleanly and reported `"success": true`.
#[derive(Debug, Clone, PartialEq)]
pub struct Success {
    pub payload: Map<String, Value>,
    pub strategy: ExtractionStrategy,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl Success {
    /// String field from the payload.
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// Why an invocation failed.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureKind {
    /// The program could not be started.
    Spawn { message: String },
    /// The process exited unsuccessfully.
    Exit { code: Option<i32> },
    /// The process exceeded its deadline and was killed.
    Timeout { after: Duration },
    /// The process exited cleanly but printed no structured result.
    Extraction,
    /// The payload parsed, but the tool reported failure.
    Logical,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Spawn { message } => write!(f, "failed to start: {}", message),
            FailureKind::Exit { code: Some(code) } => write!(f, "exited with status {}", code),
            FailureKind::Exit { code: None } => write!(f, "terminated by signal"),
            FailureKind::Timeout { after } => write!(f, "timed out after {:?}", after),
            FailureKind::Extraction => write!(f, "no structured result in output"),
            FailureKind::Logical => write!(f, "reported success=false"),
        }
    }
}

/// A failed invocation, with everything captured for audit.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub kind: FailureKind,
    /// Best-effort payload, when one could be recovered from stdout.
    pub payload: Option<Value>,
    pub stdout: String,
    pub stderr: String,
}

impl Failure {
    /// Create a failure with no extracted payload.
    pub fn new(kind: FailureKind, stdout: String, stderr: String) -> Self {
        Self {
            kind,
            payload: None,
            stdout,
            stderr,
        }
    }

    /// Attach the payload extracted from the output.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// The process never produced a usable answer (spawn, exit, timeout,
    /// unparseable output), as opposed to the tool rejecting the request.
    pub fn is_transport(&self) -> bool {
        !matches!(self.kind, FailureKind::Logical)
    }

    /// Whether the process was killed at the deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, FailureKind::Timeout { .. })
    }

    /// The tool's own `error` field, if it printed one.
    pub fn reported_error(&self) -> Option<&str> {
        self.payload.as_ref()?.get("error")?.as_str()
    }

    /// One-line audit string bounded to `max_chars` characters.
    pub fn summary(&self, max_chars: usize) -> String {
        let full = format!(
            "{}; stdout={:?}; stderr={:?}",
            self,
            self.stdout.trim(),
            self.stderr.trim()
        );
        truncate_chars(&full, max_chars)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(error) = self.reported_error() {
            write!(f, ": {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for Failure {}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
