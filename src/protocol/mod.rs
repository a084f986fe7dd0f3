//! Request/response data model for the pipe protocol.
//!
//! One [`CommandRequest`] travels controller → sandbox as a single JSON
//! line; one [`CommandResponse`] travels back as a JSON line followed by a
//! sentinel line (see [`codec`]). The protocol carries at most one request
//! in flight at a time — the `id` field lets a consumer detect a stale or
//! foreign response, it cannot restore ordering if two callers race.

pub mod codec;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of failure tags a response may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorTag {
    /// The resolved working directory does not exist.
    InvalidWorkingDir,
    /// The command exceeded the server's execution timeout and was killed.
    Timeout,
    /// The command could not be run (spawn or capture failure).
    Exception,
    /// The server loop failed outside normal request handling.
    ServerError,
}

impl std::fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::InvalidWorkingDir => "invalid_working_dir",
            Self::Timeout => "timeout",
            Self::Exception => "exception",
            Self::ServerError => "server_error",
        };
        write!(f, "{tag}")
    }
}

/// One command execution request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Opaque unique token generated by the client and round-tripped by the
    /// server. Deserialization tolerates a missing `id` (empty string); the
    /// server synthesizes a fresh one in that case.
    #[serde(default)]
    pub id: String,
    /// Arbitrary shell command line. Opaque, never parsed or validated.
    /// Deserialization tolerates a missing `command` (empty string), so any
    /// valid JSON object is treated as structured rather than falling back
    /// to a raw command line.
    #[serde(default)]
    pub command: String,
    /// Absolute path to run in. Absent means "server's last-used directory,
    /// or its own current directory if none yet set".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl CommandRequest {
    /// Build a request with a fresh UUID v4 id.
    #[must_use]
    pub fn new(command: &str, working_dir: Option<&Path>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            command: command.to_owned(),
            working_dir: working_dir.map(Path::to_path_buf),
        }
    }
}

/// One command execution response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Echo of the originating request's id.
    pub id: String,
    /// Echo of the request's command (diagnostic only).
    pub command: String,
    /// Captured standard output (text, may contain embedded newlines).
    pub stdout: String,
    /// Captured standard error (text).
    pub stderr: String,
    /// Process exit status, or `-1` for protocol-level failures.
    pub returncode: i32,
    /// Failure tag, or `None` on success.
    pub error: Option<ErrorTag>,
    /// Directory actually used for this execution. `None` only in
    /// best-effort `server_error` responses, where no directory was resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Wall-clock time the response was produced, Unix seconds.
    pub timestamp: f64,
}

impl CommandResponse {
    /// Build a response for an executed (or refused) request, stamped now.
    #[must_use]
    pub fn new(
        id: String,
        command: String,
        stdout: String,
        stderr: String,
        returncode: i32,
        error: Option<ErrorTag>,
        working_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            id,
            command,
            stdout,
            stderr,
            returncode,
            error,
            working_dir,
            timestamp: unix_timestamp(),
        }
    }

    /// Best-effort response for a failure outside normal request handling.
    ///
    /// Mirrors the loop-level fallback shape: fixed id `"error"`, command
    /// `"unknown"`, no working directory.
    #[must_use]
    pub fn server_error(detail: &str) -> Self {
        Self::new(
            "error".to_owned(),
            "unknown".to_owned(),
            String::new(),
            format!("Server error: {detail}"),
            -1,
            Some(ErrorTag::ServerError),
            None,
        )
    }
}

/// Outcome of decoding one command-channel line.
///
/// Decoding never rejects a line: anything that is not a structured JSON
/// request is accepted verbatim as a legacy raw command, keeping the channel
/// compatible with plain-text writers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedRequest {
    /// The line parsed as a JSON [`CommandRequest`].
    Structured(CommandRequest),
    /// The line was not valid JSON; the whole line is the command text.
    LegacyRaw(String),
}

impl DecodedRequest {
    /// Flatten into `(id, command, working_dir)`, synthesizing a fresh UUID
    /// where the wire carried none (legacy lines, or JSON without an `id`).
    #[must_use]
    pub fn normalize(self) -> (String, String, Option<PathBuf>) {
        match self {
            Self::Structured(req) => {
                let id = if req.id.is_empty() {
                    Uuid::new_v4().to_string()
                } else {
                    req.id
                };
                (id, req.command, req.working_dir)
            }
            Self::LegacyRaw(command) => (Uuid::new_v4().to_string(), command, None),
        }
    }
}

/// Current wall-clock time as Unix seconds.
#[must_use]
#[allow(clippy::cast_precision_loss)] // microsecond precision suffices for a diagnostic field
pub fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
