//! Wire framing for the pipe protocol.
//!
//! Requests are newline-delimited JSON: one object, one physical line.
//! Responses are one JSON line followed by the [`SENTINEL`] line marking
//! end-of-message, so a reader can tell a complete response apart from a
//! partial one on a raw byte stream.
//!
//! The sentinel terminates a message only when it occupies an entire line.
//! Compact JSON escapes embedded newlines inside strings, so a command that
//! prints the sentinel text cannot produce a bare sentinel line inside the
//! body — substring matching (which would corrupt such payloads) is never
//! used.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::protocol::{CommandRequest, CommandResponse, DecodedRequest};
use crate::{AppError, Result};

/// End-of-message marker written after every response body.
pub const SENTINEL: &str = "###END###";

/// Maximum line length accepted by the line codec: 1 MiB.
///
/// Lines exceeding this limit cause [`LineCodec::decode`] to return
/// [`AppError::Codec`] with `"line too long"` rather than allocating
/// unbounded memory for a single message.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Newline-delimited line codec for pipe byte streams.
///
/// Delegates framing to [`LinesCodec`] with a fixed [`MAX_LINE_BYTES`]
/// limit. Each `\n`-terminated UTF-8 string is one complete line.
#[derive(Debug)]
pub struct LineCodec(LinesCodec);

impl LineCodec {
    /// Create a new `LineCodec` with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

/// Encode a request as one newline-terminated JSON line.
///
/// # Errors
///
/// Returns [`AppError::Codec`] if serialization fails.
pub fn encode_request(request: &CommandRequest) -> Result<String> {
    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    Ok(line)
}

/// Encode a response as one JSON line followed by the sentinel line.
///
/// # Errors
///
/// Returns [`AppError::Codec`] if serialization fails.
pub fn encode_response(response: &CommandResponse) -> Result<String> {
    let mut frame = serde_json::to_string(response)?;
    frame.push('\n');
    frame.push_str(SENTINEL);
    frame.push('\n');
    Ok(frame)
}

/// Decode one command-channel line.
///
/// A line that parses as a JSON request object becomes
/// [`DecodedRequest::Structured`]; anything else is accepted as
/// [`DecodedRequest::LegacyRaw`] with the whole line as the command text.
#[must_use]
pub fn decode_request(line: &str) -> DecodedRequest {
    match serde_json::from_str::<CommandRequest>(line) {
        Ok(request) => DecodedRequest::Structured(request),
        Err(_) => DecodedRequest::LegacyRaw(line.to_owned()),
    }
}

/// Parse an assembled response body.
///
/// # Errors
///
/// Returns [`AppError::Codec`] if the body is not a valid response object —
/// a distinct, reportable case, never silently dropped.
pub fn decode_response(body: &str) -> Result<CommandResponse> {
    Ok(serde_json::from_str(body.trim())?)
}

/// Accumulates response lines until the sentinel line is observed.
///
/// The body is not assumed to be exactly one physical line: every line that
/// precedes the sentinel is kept and joined verbatim.
#[derive(Debug, Default)]
pub struct ResponseAssembler {
    lines: Vec<String>,
}

impl ResponseAssembler {
    /// Create an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line. Returns `true` when the line is the sentinel and the
    /// message is therefore complete; the sentinel itself is not retained.
    pub fn push(&mut self, line: &str) -> bool {
        if line == SENTINEL {
            return true;
        }
        self.lines.push(line.to_owned());
        false
    }

    /// The accumulated body, lines rejoined with `\n`.
    #[must_use]
    pub fn body(&self) -> String {
        self.lines.join("\n")
    }
}

fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Codec(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
