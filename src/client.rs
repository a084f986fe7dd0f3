//! Controller-side call endpoint.
//!
//! One [`CommandClient::call`] is one blocking round trip: write a framed
//! request to the command pipe, accumulate the response pipe until the
//! sentinel line, verify the response id, and surface a uniform
//! [`CallResult`] so callers branch on [`CallResult::error`] alone.
//!
//! The transport admits at most one request in flight system-wide. The
//! client enforces that within a process by holding an internal mutex for
//! the duration of each call; exclusivity across processes is the
//! orchestrator's contract and cannot be recovered here — the id check
//! detects a foreign response but cannot re-order interleaved writers.

use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::ConduitConfig;
use crate::protocol::codec::{self, ResponseAssembler};
use crate::protocol::{CommandRequest, CommandResponse, ErrorTag};
use crate::transport::{self, ChannelPair, LineReader};
use crate::Result;

/// Why a call did not produce a clean command result.
///
/// Server-reported tags and client-side failures are kept distinct: a
/// [`CallError::Server`]`(`[`ErrorTag::Timeout`]`)` means the command ran
/// too long on the sandbox side, while [`CallError::ClientTimeout`] means
/// no complete response arrived within the caller's own deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The server answered with a failure tag.
    Server(ErrorTag),
    /// No sentinel-terminated response arrived before the call deadline.
    ClientTimeout,
    /// A response arrived but its body was not valid JSON; the payload is
    /// the parse error text, the raw body is preserved in `stdout`.
    UnparsableResponse(String),
    /// A response arrived carrying a different request id — a stale or
    /// foreign answer that must not be treated as ours.
    IdMismatch {
        /// Id of the request this call issued.
        expected: String,
        /// Id found in the response that was read.
        received: String,
    },
}

impl Display for CallError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server(tag) => write!(f, "server reported {tag}"),
            Self::ClientTimeout => write!(f, "client timeout waiting for response"),
            Self::UnparsableResponse(msg) => write!(f, "failed to parse response: {msg}"),
            Self::IdMismatch { expected, received } => {
                write!(f, "response id mismatch: expected {expected}, received {received}")
            }
        }
    }
}

/// Uniform result of one call, success or failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResult {
    /// Captured standard output (raw response text on a parse failure).
    pub stdout: String,
    /// Captured standard error or a diagnostic message.
    pub stderr: String,
    /// Command exit status, or `-1` on any failure path.
    pub returncode: i32,
    /// `None` on success; otherwise why the call failed.
    pub error: Option<CallError>,
}

impl CallResult {
    fn from_response(response: CommandResponse) -> Self {
        Self {
            stdout: response.stdout,
            stderr: response.stderr,
            returncode: response.returncode,
            error: response.error.map(CallError::Server),
        }
    }

    fn client_timeout() -> Self {
        Self {
            stdout: String::new(),
            stderr: "Response timeout".to_owned(),
            returncode: -1,
            error: Some(CallError::ClientTimeout),
        }
    }

    fn unparsable(raw: String, detail: String) -> Self {
        Self {
            stdout: raw,
            stderr: String::new(),
            returncode: -1,
            error: Some(CallError::UnparsableResponse(detail)),
        }
    }

    fn id_mismatch(expected: &str, received: &str) -> Self {
        Self {
            stdout: String::new(),
            stderr: "Got response for different request".to_owned(),
            returncode: -1,
            error: Some(CallError::IdMismatch {
                expected: expected.to_owned(),
                received: received.to_owned(),
            }),
        }
    }
}

/// Synchronous single-call client over one channel pair.
#[derive(Debug)]
pub struct CommandClient {
    channels: ChannelPair,
    timeout: Duration,
    poll: Duration,
    call_lock: Mutex<()>,
}

impl CommandClient {
    /// Build a client from explicit channels and timing.
    #[must_use]
    pub fn new(channels: ChannelPair, timeout: Duration, poll: Duration) -> Self {
        Self {
            channels,
            timeout,
            poll,
            call_lock: Mutex::new(()),
        }
    }

    /// Build a client from configuration.
    #[must_use]
    pub fn from_config(config: &ConduitConfig) -> Self {
        Self::new(
            ChannelPair::from_config(config),
            config.call_timeout(),
            config.poll_interval(),
        )
    }

    /// Execute one command on the sandbox side and wait for its response.
    ///
    /// The configured timeout covers the whole round trip: channel
    /// rendezvous, request write, and response read. Exceeding it yields a
    /// [`CallError::ClientTimeout`] result — the request already written
    /// cannot be retracted, and a late answer will surface as an
    /// [`CallError::IdMismatch`] on whichever call reads it next.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AppError`] only for endpoint-fatal conditions
    /// (channels cannot be created or opened, request cannot be encoded).
    /// Protocol and execution failures are reported inside the result.
    pub async fn call(&self, command: &str, working_dir: Option<&Path>) -> Result<CallResult> {
        let _in_flight = self.call_lock.lock().await;

        self.channels.ensure()?;
        let request = CommandRequest::new(command, working_dir);
        let frame = codec::encode_request(&request)?;
        let deadline = Instant::now() + self.timeout;

        debug!(id = %request.id, %command, "sending command");

        match tokio::time::timeout_at(deadline, self.round_trip(&frame)).await {
            Err(_elapsed) => Ok(CallResult::client_timeout()),
            Ok(Err(err)) => Err(err),
            Ok(Ok(body)) => Ok(Self::interpret(&body, &request.id)),
        }
    }

    /// Write the request frame, then read lines until the sentinel.
    async fn round_trip(&self, frame: &str) -> Result<String> {
        let mut sender = self.channels.command.open_sender(self.poll).await?;
        transport::write_frame(&mut sender, frame).await?;
        // Close the write end promptly; the request line is already framed.
        drop(sender);

        let receiver = self.channels.response.open_receiver()?;
        let mut reader = LineReader::new(receiver, self.poll);
        let mut assembler = ResponseAssembler::new();
        loop {
            let line = reader.next_line().await?;
            if assembler.push(&line) {
                return Ok(assembler.body());
            }
        }
    }

    /// Map an assembled body to the uniform result shape.
    fn interpret(body: &str, expected_id: &str) -> CallResult {
        match codec::decode_response(body) {
            Err(err) => CallResult::unparsable(body.to_owned(), err.to_string()),
            Ok(response) if response.id != expected_id => {
                CallResult::id_mismatch(expected_id, &response.id)
            }
            Ok(response) => CallResult::from_response(response),
        }
    }
}
