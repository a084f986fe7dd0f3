//! Contract tests pinning the wire format shared with non-Rust peers.
//!
//! Any process that speaks JSON lines over the pipe pair — including the
//! original deployment's scripts — relies on these exact field names, tag
//! spellings, and the sentinel literal. Changing them is a breaking
//! protocol change, not a refactor.

use command_conduit::protocol::codec::{
    decode_request, decode_response, encode_request, encode_response, SENTINEL,
};
use command_conduit::protocol::{CommandRequest, CommandResponse, DecodedRequest, ErrorTag};

#[test]
fn sentinel_literal_is_pinned() {
    assert_eq!(SENTINEL, "###END###");
}

#[test]
fn request_wire_object_carries_exactly_the_agreed_keys() {
    let request = CommandRequest::new("pwd", Some(std::path::Path::new("/srv")));
    let line = encode_request(&request).expect("encode");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("valid json");
    let object = value.as_object().expect("request must be a json object");

    let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, ["command", "id", "working_dir"]);
    assert_eq!(object["command"], "pwd");
    assert_eq!(object["working_dir"], "/srv");
}

#[test]
fn dirless_request_omits_working_dir_entirely() {
    let request = CommandRequest::new("pwd", None);
    let line = encode_request(&request).expect("encode");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("valid json");
    let object = value.as_object().expect("request must be a json object");

    let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, ["command", "id"]);
}

#[test]
fn response_wire_object_carries_all_agreed_keys() {
    let response = CommandResponse::new(
        "x1".to_owned(),
        "echo hi".to_owned(),
        "hi\n".to_owned(),
        String::new(),
        0,
        None,
        Some("/srv".into()),
    );
    let frame = encode_response(&response).expect("encode");
    let body = frame.lines().next().expect("body line");
    let value: serde_json::Value = serde_json::from_str(body).expect("valid json");
    let object = value.as_object().expect("response must be a json object");

    let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        ["command", "error", "id", "returncode", "stderr", "stdout", "timestamp", "working_dir"]
    );
    assert!(object["error"].is_null(), "success must serialize error as null");
    assert!(object["timestamp"].is_number(), "timestamp must be a json number");
}

#[test]
fn response_frame_is_body_line_then_sentinel_line() {
    let response = CommandResponse::new(
        "x1".to_owned(),
        "true".to_owned(),
        String::new(),
        String::new(),
        0,
        None,
        Some("/tmp".into()),
    );
    let frame = encode_response(&response).expect("encode");
    let lines: Vec<&str> = frame.split('\n').collect();

    assert_eq!(lines.len(), 3, "body, sentinel, trailing empty from final newline");
    assert_eq!(lines[1], SENTINEL);
    assert_eq!(lines[2], "");
}

#[test]
fn error_tag_spellings_are_pinned() {
    for (tag, wire) in [
        (ErrorTag::InvalidWorkingDir, "invalid_working_dir"),
        (ErrorTag::Timeout, "timeout"),
        (ErrorTag::Exception, "exception"),
        (ErrorTag::ServerError, "server_error"),
    ] {
        assert_eq!(serde_json::to_value(tag).expect("serialize"), serde_json::json!(wire));
    }
}

/// A request line exactly as the original controller scripts emit it.
#[test]
fn original_controller_request_line_is_accepted() {
    let decoded = decode_request(r#"{"id": "abc", "command": "pwd"}"#);

    match decoded {
        DecodedRequest::Structured(req) => {
            assert_eq!(req.id, "abc");
            assert_eq!(req.command, "pwd");
            assert!(req.working_dir.is_none());
        }
        DecodedRequest::LegacyRaw(raw) => panic!("expected structured request, got: {raw}"),
    }
}

/// A response body exactly as the original sandbox server emits it.
#[test]
fn original_server_response_body_is_accepted() {
    let body = concat!(
        r#"{"id": "abc", "command": "echo hi", "stdout": "hi\n", "stderr": "", "#,
        r#""returncode": 0, "error": null, "working_dir": "/app", "timestamp": 1724400000.25}"#,
    );

    let response = decode_response(body).expect("original body must parse");

    assert_eq!(response.id, "abc");
    assert_eq!(response.stdout, "hi\n");
    assert_eq!(response.returncode, 0);
    assert!(response.error.is_none());
    assert_eq!(response.working_dir, Some("/app".into()));
}

/// A `server_error` response without a `working_dir` key (the original
/// omitted it on the loop-failure path) must still deserialize.
#[test]
fn dirless_server_error_response_is_accepted() {
    let body = concat!(
        r#"{"id": "error", "command": "unknown", "stdout": "", "stderr": "Server error: boom", "#,
        r#""returncode": -1, "error": "server_error", "timestamp": 1724400000.5}"#,
    );

    let response = decode_response(body).expect("dirless body must parse");

    assert_eq!(response.error, Some(ErrorTag::ServerError));
    assert!(response.working_dir.is_none());
}
