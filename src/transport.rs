//! Named pipe (FIFO) transport.
//!
//! Two unidirectional channels connect the endpoints: the command pipe
//! (server reads, client writes) and the response pipe (server writes,
//! client reads). FIFOs have rendezvous open semantics — a blocking
//! `open(2)` parks until the peer end exists. To keep async worker threads
//! unblocked, both ends are opened non-blockingly through
//! [`tokio::net::unix::pipe`] and rendezvous is recovered by polling:
//! a write-end open retries on `ENXIO` until a reader appears, and a read
//! that returns zero bytes (no writer connected) backs off and retries.
//! Callers that hold a deadline wrap these waits in [`tokio::time::timeout_at`].

use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::BytesMut;
use nix::errno::Errno;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::pipe;
use tokio_util::codec::Decoder;
use tracing::debug;

use crate::config::ConduitConfig;
use crate::protocol::codec::LineCodec;
use crate::{AppError, Result};

/// Initial capacity of a [`LineReader`] buffer.
const READ_BUF_CAPACITY: usize = 8 * 1024;

/// One named pipe on the filesystem.
#[derive(Debug, Clone)]
pub struct Channel {
    path: PathBuf,
}

impl Channel {
    /// Wrap a filesystem path as a channel. No I/O happens until
    /// [`Channel::ensure`] or an open call.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the underlying FIFO.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the FIFO if it does not exist. Idempotent: an existing FIFO at
    /// the path is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] if the path exists but is not a FIFO,
    /// or if creation fails (missing parent directory, permissions). This is
    /// fatal to the endpoint and is not retried.
    pub fn ensure(&self) -> Result<()> {
        // 0o666 before umask: the peer endpoint may run as a different user.
        match mkfifo(&self.path, Mode::from_bits_truncate(0o666)) {
            Ok(()) => {
                debug!(path = %self.path.display(), "created fifo");
                Ok(())
            }
            Err(Errno::EEXIST) => {
                let meta = std::fs::metadata(&self.path).map_err(|err| {
                    AppError::Transport(format!(
                        "cannot stat existing channel {}: {err}",
                        self.path.display()
                    ))
                })?;
                if meta.file_type().is_fifo() {
                    Ok(())
                } else {
                    Err(AppError::Transport(format!(
                        "channel path {} exists but is not a fifo",
                        self.path.display()
                    )))
                }
            }
            Err(err) => Err(AppError::Transport(format!(
                "failed to create fifo {}: {err}",
                self.path.display()
            ))),
        }
    }

    /// Open the read end. Succeeds immediately even with no writer present;
    /// reads return zero bytes until one connects.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] if the path is missing or unreadable.
    pub fn open_receiver(&self) -> Result<pipe::Receiver> {
        pipe::OpenOptions::new()
            .open_receiver(&self.path)
            .map_err(|err| {
                AppError::Transport(format!(
                    "failed to open {} for reading: {err}",
                    self.path.display()
                ))
            })
    }

    /// Open the write end, waiting for a reader.
    ///
    /// A FIFO write-end open fails with `ENXIO` until a reader exists; this
    /// retries with `poll` backoff until the rendezvous completes. The wait
    /// is unbounded — callers with a deadline must wrap it in
    /// [`tokio::time::timeout_at`].
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] for any open failure other than the
    /// no-reader condition.
    pub async fn open_sender(&self, poll: Duration) -> Result<pipe::Sender> {
        loop {
            match pipe::OpenOptions::new().open_sender(&self.path) {
                Ok(sender) => return Ok(sender),
                Err(err) if err.raw_os_error() == Some(Errno::ENXIO as i32) => {
                    tokio::time::sleep(poll).await;
                }
                Err(err) => {
                    return Err(AppError::Transport(format!(
                        "failed to open {} for writing: {err}",
                        self.path.display()
                    )));
                }
            }
        }
    }
}

/// The command/response channel pair shared by both endpoints.
#[derive(Debug, Clone)]
pub struct ChannelPair {
    /// Server reads, client writes.
    pub command: Channel,
    /// Server writes, client reads.
    pub response: Channel,
}

impl ChannelPair {
    /// Derive both channels from configuration.
    #[must_use]
    pub fn from_config(config: &ConduitConfig) -> Self {
        Self {
            command: Channel::new(config.command_pipe_path()),
            response: Channel::new(config.response_pipe_path()),
        }
    }

    /// Create both FIFOs if missing. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] if either channel cannot be created.
    pub fn ensure(&self) -> Result<()> {
        self.command.ensure()?;
        self.response.ensure()
    }
}

/// Buffered line reader over a pipe receiver.
///
/// A FIFO read end reports zero bytes whenever no writer is connected; the
/// reader treats that as "no peer yet", backs off by the poll interval, and
/// retries, so [`LineReader::next_line`] only resolves with a complete line.
#[derive(Debug)]
pub struct LineReader {
    rx: pipe::Receiver,
    buf: BytesMut,
    codec: LineCodec,
    poll: Duration,
}

impl LineReader {
    /// Wrap an open receiver.
    #[must_use]
    pub fn new(rx: pipe::Receiver, poll: Duration) -> Self {
        Self {
            rx,
            buf: BytesMut::with_capacity(READ_BUF_CAPACITY),
            codec: LineCodec::new(),
            poll,
        }
    }

    /// Read the next complete line, waiting indefinitely for a writer.
    ///
    /// Lines already buffered from a previous read are drained before the
    /// pipe is touched again, preserving strict arrival order.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Codec`] if a line exceeds the maximum length, or
    /// [`AppError::Io`] on a read failure.
    pub async fn next_line(&mut self) -> Result<String> {
        loop {
            if let Some(line) = self.codec.decode(&mut self.buf)? {
                return Ok(line);
            }
            let n = self.rx.read_buf(&mut self.buf).await.map_err(|err| {
                AppError::Io(format!("pipe read failed: {err}"))
            })?;
            if n == 0 {
                // No writer connected (or the last one closed mid-line).
                tokio::time::sleep(self.poll).await;
            }
        }
    }
}

/// Write one complete frame to an open sender and flush it.
///
/// # Errors
///
/// Returns [`AppError::Io`] if the write or flush fails (e.g. the reader
/// closed its end).
pub async fn write_frame(sender: &mut pipe::Sender, frame: &str) -> Result<()> {
    sender
        .write_all(frame.as_bytes())
        .await
        .map_err(|err| AppError::Io(format!("pipe write failed: {err}")))?;
    sender
        .flush()
        .await
        .map_err(|err| AppError::Io(format!("pipe flush failed: {err}")))
}
