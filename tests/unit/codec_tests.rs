//! Unit tests for the wire framing codec.
//!
//! Covers:
//! - line decoding: buffering, batching, max-length guard
//! - request encoding: one JSON line, optional `working_dir`
//! - response framing: sentinel line, assembler semantics
//! - the sentinel-collision fix: payloads containing the sentinel text
//!   survive because only a whole sentinel line terminates a message

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use command_conduit::protocol::codec::{
    decode_request, decode_response, encode_request, encode_response, LineCodec,
    ResponseAssembler, MAX_LINE_BYTES, SENTINEL,
};
use command_conduit::protocol::{CommandRequest, CommandResponse, DecodedRequest, ErrorTag};
use command_conduit::AppError;

// ── Line codec ───────────────────────────────────────────────────────────────

#[test]
fn complete_line_is_decoded_without_trailing_newline() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::from("{\"id\":\"abc\",\"command\":\"pwd\"}\n");

    let line = codec
        .decode(&mut buf)
        .expect("decode must succeed for a valid line");

    assert_eq!(line, Some("{\"id\":\"abc\",\"command\":\"pwd\"}".to_owned()));
}

#[test]
fn partial_line_is_buffered_until_newline() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::from("{\"id\":\"abc\"");

    let result = codec.decode(&mut buf).expect("partial decode must not error");
    assert!(result.is_none(), "no line must be emitted before the newline");

    buf.extend_from_slice(b",\"command\":\"ls\"}\n");
    let result = codec.decode(&mut buf).expect("decode must succeed after newline");
    assert!(result.is_some(), "complete line must be emitted once terminated");
}

#[test]
fn batched_lines_are_decoded_in_order() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::from("first\nsecond\n");

    assert_eq!(
        codec.decode(&mut buf).expect("first decode"),
        Some("first".to_owned())
    );
    assert_eq!(
        codec.decode(&mut buf).expect("second decode"),
        Some("second".to_owned())
    );
    assert_eq!(codec.decode(&mut buf).expect("empty decode"), None);
}

#[test]
fn overlong_line_is_a_codec_error() {
    let mut codec = LineCodec::new();
    let big = "a".repeat(MAX_LINE_BYTES + 1) + "\n";
    let mut buf = BytesMut::from(big.as_str());

    match codec.decode(&mut buf) {
        Err(AppError::Codec(msg)) => {
            assert!(msg.contains("line too long"), "got: {msg}");
        }
        other => panic!("expected Err(AppError::Codec), got: {other:?}"),
    }
}

// ── Request encoding/decoding ────────────────────────────────────────────────

#[test]
fn request_encodes_to_exactly_one_line() {
    let request = CommandRequest::new("printf 'a\nb'", Some(std::path::Path::new("/tmp")));
    let line = encode_request(&request).expect("encode must succeed");

    assert!(line.ends_with('\n'), "request line must be newline-terminated");
    let body = &line[..line.len() - 1];
    assert!(
        !body.contains('\n'),
        "embedded newlines must be escaped inside the JSON body"
    );
}

#[test]
fn request_without_working_dir_omits_the_key() {
    let request = CommandRequest::new("ls", None);
    let line = encode_request(&request).expect("encode must succeed");

    assert!(!line.contains("working_dir"), "absent dir must be omitted from the wire");
}

#[test]
fn structured_request_line_parses_as_structured() {
    let decoded = decode_request(r#"{"id":"abc","command":"pwd"}"#);

    match decoded {
        DecodedRequest::Structured(req) => {
            assert_eq!(req.id, "abc");
            assert_eq!(req.command, "pwd");
            assert!(req.working_dir.is_none());
        }
        DecodedRequest::LegacyRaw(raw) => panic!("expected structured, got raw: {raw}"),
    }
}

/// A JSON object missing the `command` key is still a structured request
/// with an empty command; running the raw JSON text through the shell would
/// be a protocol break.
#[test]
fn json_object_without_command_is_structured_with_empty_command() {
    let decoded = decode_request(r#"{"id":"x"}"#);

    match decoded {
        DecodedRequest::Structured(req) => {
            assert_eq!(req.id, "x");
            assert_eq!(req.command, "", "a missing command must default to empty");
        }
        DecodedRequest::LegacyRaw(raw) => {
            panic!("a valid json object must never become a raw command: {raw}")
        }
    }
}

#[test]
fn non_json_line_becomes_legacy_raw_command() {
    let decoded = decode_request("ls -la /tmp");
    assert_eq!(decoded, DecodedRequest::LegacyRaw("ls -la /tmp".to_owned()));
}

// ── Response framing ─────────────────────────────────────────────────────────

fn sample_response(stdout: &str) -> CommandResponse {
    CommandResponse::new(
        "req-1".to_owned(),
        "cat data".to_owned(),
        stdout.to_owned(),
        String::new(),
        0,
        None,
        Some("/tmp".into()),
    )
}

#[test]
fn response_frame_ends_with_a_sentinel_line() {
    let frame = encode_response(&sample_response("ok\n")).expect("encode must succeed");
    assert!(
        frame.ends_with(&format!("\n{SENTINEL}\n")),
        "frame must terminate with the sentinel on its own line, got: {frame}"
    );
}

#[test]
fn assembler_completes_only_on_the_sentinel_line() {
    let mut assembler = ResponseAssembler::new();
    assert!(!assembler.push("{\"partial\":true}"), "body line must not complete");
    assert!(assembler.push(SENTINEL), "sentinel line must complete");
    assert_eq!(assembler.body(), "{\"partial\":true}");
}

#[test]
fn response_round_trip_preserves_all_fields() {
    let original = CommandResponse::new(
        "req-42".to_owned(),
        "echo hi".to_owned(),
        "hi\n".to_owned(),
        "warning\n".to_owned(),
        0,
        None,
        Some("/var/data".into()),
    );

    let frame = encode_response(&original).expect("encode must succeed");
    let mut assembler = ResponseAssembler::new();
    for line in frame.lines() {
        if assembler.push(line) {
            break;
        }
    }
    let decoded = decode_response(&assembler.body()).expect("decode must succeed");

    assert_eq!(decoded, original);
}

/// A command that prints the literal sentinel text must not truncate the
/// payload: the JSON body is one physical line with newlines escaped, so the
/// sentinel can never occupy its own line inside the body.
#[test]
fn payload_containing_sentinel_text_survives_round_trip() {
    let hostile = format!("before\n{SENTINEL}\nafter\n");
    let original = sample_response(&hostile);

    let frame = encode_response(&original).expect("encode must succeed");
    let mut assembler = ResponseAssembler::new();
    let mut completed = false;
    for line in frame.lines() {
        if assembler.push(line) {
            completed = true;
            break;
        }
    }
    assert!(completed, "frame must terminate at the trailing sentinel");

    let decoded = decode_response(&assembler.body()).expect("decode must succeed");
    assert_eq!(decoded.stdout, hostile, "sentinel text inside stdout must be preserved");
}

#[test]
fn malformed_response_body_is_a_distinct_error() {
    match decode_response("not-json{{{") {
        Err(AppError::Codec(_)) => {}
        other => panic!("expected Err(AppError::Codec), got: {other:?}"),
    }
}

#[test]
fn error_tagged_response_round_trips_the_tag() {
    let original = CommandResponse::new(
        "req-9".to_owned(),
        "sleep 600".to_owned(),
        String::new(),
        "Command timed out after 30 seconds".to_owned(),
        -1,
        Some(ErrorTag::Timeout),
        Some("/tmp".into()),
    );

    let frame = encode_response(&original).expect("encode must succeed");
    let body = frame.lines().next().expect("frame must have a body line");
    let decoded = decode_response(body).expect("decode must succeed");

    assert_eq!(decoded.error, Some(ErrorTag::Timeout));
    assert_eq!(decoded.returncode, -1);
}
