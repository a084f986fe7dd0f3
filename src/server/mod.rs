//! Sandbox-side execution loop.
//!
//! Single-threaded and strictly sequential: one request is read, resolved,
//! executed, and answered before the next is accepted. Every accepted
//! request yields exactly one framed response, on every error path; a
//! failure outside normal handling is answered with a best-effort
//! `server_error` response and the loop continues. Only the cancellation
//! token stops the loop.
//!
//! Because both channels are single-reader/single-writer FIFOs, at most one
//! request may safely be in flight system-wide; see [`crate::client`] for
//! the caller-side serialization capability.

pub mod executor;
pub mod session;

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ConduitConfig;
use crate::protocol::codec::{self, decode_request};
use crate::protocol::{CommandResponse, ErrorTag};
use crate::server::session::{DirResolution, ExecSession};
use crate::transport::{self, ChannelPair, LineReader};
use crate::Result;

/// How long a best-effort `server_error` response waits for a reader before
/// being dropped, so an absent client cannot wedge the loop.
const BEST_EFFORT_RESPOND: Duration = Duration::from_secs(1);

/// Run the execution loop until `cancel` fires.
///
/// Creates the channel pair if missing, then serves requests sequentially.
///
/// # Errors
///
/// Returns [`crate::AppError::Transport`] if the channels cannot be created
/// or the command pipe cannot be opened — the only fatal conditions.
pub async fn run(config: ConduitConfig, cancel: CancellationToken) -> Result<()> {
    let channels = ChannelPair::from_config(&config);
    channels.ensure()?;

    let receiver = channels.command.open_receiver()?;
    let mut reader = LineReader::new(receiver, config.poll_interval());
    let mut session = ExecSession::new();

    info!(
        command_pipe = %channels.command.path().display(),
        response_pipe = %channels.response.path().display(),
        "command server started"
    );

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("command server shutting down");
                break;
            }
            result = serve_one(&mut reader, &channels, &mut session, &config) => {
                if let Err(err) = result {
                    warn!(%err, "server loop error");
                    best_effort_server_error(&channels, &config, &err.to_string()).await;
                }
            }
        }
    }

    Ok(())
}

/// One full `WaitForRequest → Decode → ResolveWorkingDir → Execute →
/// Respond` cycle.
///
/// Blank lines are discarded without counting as a request. Errors returned
/// here are transport-level only; execution failures are folded into the
/// response.
async fn serve_one(
    reader: &mut LineReader,
    channels: &ChannelPair,
    session: &mut ExecSession,
    config: &ConduitConfig,
) -> Result<()> {
    let line = reader.next_line().await?;
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(());
    }

    let (id, command, working_dir) = decode_request(trimmed).normalize();
    info!(%id, %command, "executing command");

    let response =
        build_response(id, command, working_dir, session, config.exec_timeout()).await?;
    respond(channels, &response, config.poll_interval()).await
}

/// Resolve the working directory and execute, producing the one response
/// this request is owed.
async fn build_response(
    id: String,
    command: String,
    working_dir: Option<std::path::PathBuf>,
    session: &mut ExecSession,
    exec_timeout: Duration,
) -> Result<CommandResponse> {
    match session.resolve_working_dir(working_dir.as_deref())? {
        DirResolution::Missing(path) => Ok(CommandResponse::new(
            id,
            command,
            String::new(),
            format!("Working directory does not exist: {}", path.display()),
            -1,
            Some(ErrorTag::InvalidWorkingDir),
            Some(path),
        )),
        DirResolution::Usable(cwd) => {
            let outcome = executor::run_shell(&command, &cwd, exec_timeout).await;
            Ok(CommandResponse::new(
                id,
                command,
                outcome.stdout,
                outcome.stderr,
                outcome.returncode,
                outcome.error,
                Some(cwd),
            ))
        }
    }
}

/// Frame and deliver one response on the response channel.
async fn respond(
    channels: &ChannelPair,
    response: &CommandResponse,
    poll: Duration,
) -> Result<()> {
    let frame = codec::encode_response(response)?;
    let mut sender = channels.response.open_sender(poll).await?;
    transport::write_frame(&mut sender, &frame).await
}

/// Answer a loop-level failure with a `server_error` response if a reader
/// shows up in time; otherwise drop it and keep serving.
async fn best_effort_server_error(channels: &ChannelPair, config: &ConduitConfig, detail: &str) {
    let response = CommandResponse::server_error(detail);
    let attempt = respond(channels, &response, config.poll_interval());
    match tokio::time::timeout(BEST_EFFORT_RESPOND, attempt).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(%err, "failed to deliver server_error response"),
        Err(_) => warn!("no reader for server_error response, dropped"),
    }
}
