//! Tests for BinaryConnection
//!
//! These tests verify:
//! - Connect-once lifecycle and close
//! - Persistent parameters on every command
//! - One outstanding exchange at a time
//! - Raw data draining rules
//! - Poisoning after protocol failures

use std::cell::RefCell;
use std::io::{self, Cursor, Read, Write};
use std::rc::Rc;

use pcloud_binapi::protocol::encode;
use pcloud_binapi::{BinapiError, BinaryConnection, Config, Params, Payload, Value};

// =============================================================================
// Helper Functions
// =============================================================================

/// Scripted server: replies come from `input`, sent bytes are shared
/// through `output` so tests can inspect them after the connection owns
/// the stream.
struct ScriptedServer {
    input: Cursor<Vec<u8>>,
    output: Rc<RefCell<Vec<u8>>>,
}

impl Read for ScriptedServer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for ScriptedServer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Server whose first read is interrupted by a signal
struct InterruptOnce {
    server: ScriptedServer,
    interrupted: bool,
}

impl Read for InterruptOnce {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.interrupted {
            self.interrupted = true;
            return Err(io::Error::new(io::ErrorKind::Interrupted, "signal"));
        }
        self.server.read(buf)
    }
}

impl Write for InterruptOnce {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.server.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.server.flush()
    }
}

fn connect(config: Config, replies: Vec<u8>) -> (BinaryConnection<ScriptedServer>, Rc<RefCell<Vec<u8>>>) {
    let output = Rc::new(RefCell::new(Vec::new()));
    let server = ScriptedServer {
        input: Cursor::new(replies),
        output: Rc::clone(&output),
    };
    let mut conn = BinaryConnection::new(config);
    conn.connect_with(server).unwrap();
    (conn, output)
}

fn short_string(s: &str) -> Vec<u8> {
    let mut bytes = vec![100 + s.len() as u8];
    bytes.extend_from_slice(s.as_bytes());
    bytes
}

/// `{"result": 0}`
fn ok_response() -> Vec<u8> {
    let mut body = vec![16];
    body.extend_from_slice(&short_string("result"));
    body.push(200);
    body.push(255);
    wrap(&body)
}

/// `{"result": 0, "data": <len>}` followed by `payload`
fn data_response(payload: &[u8]) -> Vec<u8> {
    let mut body = vec![16];
    body.extend_from_slice(&short_string("result"));
    body.push(200);
    body.extend_from_slice(&short_string("data"));
    body.push(20);
    body.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    body.push(255);
    let mut bytes = wrap(&body);
    bytes.extend_from_slice(payload);
    bytes
}

fn wrap(body: &[u8]) -> Vec<u8> {
    let mut bytes = (body.len() as u32).to_le_bytes().to_vec();
    bytes.extend_from_slice(body);
    bytes
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_not_connected() {
    let mut conn: BinaryConnection<ScriptedServer> = BinaryConnection::new(Config::default());
    assert!(!conn.is_connected());
    assert!(matches!(
        conn.send_command("userinfo", Params::new()),
        Err(BinapiError::NotConnected)
    ));
    assert!(matches!(conn.get_result(), Err(BinapiError::NotConnected)));
}

#[test]
fn test_connect_twice_fails() {
    let (mut conn, _) = connect(Config::default(), Vec::new());
    let again = ScriptedServer {
        input: Cursor::new(Vec::new()),
        output: Rc::new(RefCell::new(Vec::new())),
    };
    assert!(matches!(conn.connect_with(again), Err(BinapiError::AlreadyConnected)));
}

#[test]
fn test_invalid_config_rejected_on_connect() {
    let mut conn = BinaryConnection::new(Config::builder().max_depth(0).build());
    let server = ScriptedServer {
        input: Cursor::new(Vec::new()),
        output: Rc::new(RefCell::new(Vec::new())),
    };
    assert!(matches!(conn.connect_with(server), Err(BinapiError::Config(_))));
}

#[test]
fn test_close_then_unusable() {
    let (mut conn, _) = connect(Config::default(), ok_response());
    conn.close().unwrap();
    assert!(!conn.is_connected());
    assert!(matches!(
        conn.send_command("userinfo", Params::new()),
        Err(BinapiError::NotConnected)
    ));
    // closing again is harmless
    conn.close().unwrap();
}

// =============================================================================
// Command Tests
// =============================================================================

#[test]
fn test_send_command_writes_frame_and_reads_result() {
    let (mut conn, output) = connect(Config::default(), ok_response());
    let params = Params::new().with("path", "/");

    let result = conn.send_command("listfolder", params.clone()).unwrap();

    assert_eq!(result.result_code(), Some(0));
    let expected = encode("listfolder", &params, None).unwrap();
    assert_eq!(&output.borrow()[..], expected.as_bytes());
}

#[test]
fn test_persistent_params_appended_and_override() {
    let config = Config::builder().auth("secret").build();
    let (mut conn, output) = connect(config, ok_response());

    let params = Params::new().with("auth", "ignored").with("path", "/");
    conn.send_command("listfolder", params).unwrap();

    let expected_params = Params::new().with("auth", "secret").with("path", "/");
    let expected = encode("listfolder", &expected_params, None).unwrap();
    assert_eq!(&output.borrow()[..], expected.as_bytes());
}

#[test]
fn test_set_auth() {
    let mut replies = ok_response();
    replies.extend(ok_response());
    let (mut conn, output) = connect(Config::default(), replies);

    conn.set_auth(Some("tok".to_string()));
    assert_eq!(conn.auth(), Some("tok"));
    conn.send_command("userinfo", Params::new()).unwrap();
    let with_auth = encode("userinfo", &Params::new().with("auth", "tok"), None).unwrap();
    assert_eq!(&output.borrow()[..], with_auth.as_bytes());

    output.borrow_mut().clear();
    conn.set_auth(None);
    assert_eq!(conn.auth(), None);
    conn.send_command("userinfo", Params::new()).unwrap();
    let without = encode("userinfo", &Params::new(), None).unwrap();
    assert_eq!(&output.borrow()[..], without.as_bytes());
}

#[test]
fn test_deferred_result() {
    let (mut conn, _) = connect(Config::default(), ok_response());

    conn.send_command_nb("userinfo", Params::new(), None, |_| {}).unwrap();
    assert!(matches!(
        conn.send_command_nb("userinfo", Params::new(), None, |_| {}),
        Err(BinapiError::ExchangePending)
    ));

    assert_eq!(conn.get_result().unwrap().result_code(), Some(0));
    assert!(matches!(conn.get_result(), Err(BinapiError::NoPendingResult)));
}

#[test]
fn test_frame_too_large_writes_nothing() {
    let (mut conn, output) = connect(Config::default(), Vec::new());
    let params = Params::new().with("blob", "x".repeat(70_000));

    assert!(matches!(
        conn.send_command("uploadfile", params),
        Err(BinapiError::FrameTooLarge { .. })
    ));
    assert!(output.borrow().is_empty());
    assert!(conn.is_connected());
}

// =============================================================================
// Upload Tests
// =============================================================================

#[test]
fn test_upload_sends_frame_then_payload() {
    let (mut conn, output) = connect(Config::builder().chunk_size(4).build(), ok_response());
    let data = b"0123456789";
    let mut progress = Vec::new();

    let params = Params::new().with("filename", "a.txt");
    let result = conn
        .send_command_with_data("uploadfile", params.clone(), Payload::bytes(data), |n| {
            progress.push(n)
        })
        .unwrap();

    assert_eq!(result.result_code(), Some(0));
    assert_eq!(progress, vec![4, 4, 2]);

    let frame = encode("uploadfile", &params, Some(10)).unwrap();
    let mut expected = frame.as_bytes().to_vec();
    expected.extend_from_slice(data);
    assert_eq!(&output.borrow()[..], &expected[..]);
}

#[test]
fn test_upload_undetermined_length_writes_nothing() {
    let (mut conn, output) = connect(Config::default(), ok_response());
    let mut source = io::repeat(1);

    let err = conn
        .send_command_with_data("uploadfile", Params::new(), Payload::reader(&mut source, None), |_| {})
        .unwrap_err();

    assert!(matches!(err, BinapiError::UndeterminedLength));
    assert!(output.borrow().is_empty());
    assert!(conn.is_connected());
}

#[test]
fn test_upload_short_source_poisons() {
    let (mut conn, _) = connect(Config::default(), ok_response());
    let mut source: &[u8] = b"abc";

    let err = conn
        .send_command_with_data(
            "uploadfile",
            Params::new(),
            Payload::reader(&mut source, Some(10)),
            |_| {},
        )
        .unwrap_err();

    assert!(matches!(err, BinapiError::LengthMismatch { expected: 10, actual: 3 }));
    assert!(!conn.is_connected());
    assert!(matches!(
        conn.send_command("userinfo", Params::new()),
        Err(BinapiError::ChannelBroken)
    ));
}

// =============================================================================
// Raw Data Tests
// =============================================================================

#[test]
fn test_raw_data_must_be_drained_exactly() {
    let payload: Vec<u8> = (0..100u8).collect();
    let mut replies = data_response(&payload);
    replies.extend(ok_response());
    let (mut conn, _) = connect(Config::default(), replies);

    let result = conn.send_command("getzip", Params::new()).unwrap();
    assert_eq!(result.get("data"), Some(&Value::Data(100)));
    assert_eq!(conn.pending_data(), Some(100));

    assert!(matches!(
        conn.send_command("userinfo", Params::new()),
        Err(BinapiError::PayloadPending { remaining: 100 })
    ));

    let mut sink = Vec::new();
    assert!(matches!(
        conn.write_data(&mut sink, 99, |_| {}),
        Err(BinapiError::LengthMismatch { expected: 100, actual: 99 })
    ));
    assert!(matches!(
        conn.write_data(&mut sink, 101, |_| {}),
        Err(BinapiError::LengthMismatch { expected: 100, actual: 101 })
    ));
    assert!(sink.is_empty());

    conn.write_data(&mut sink, 100, |_| {}).unwrap();
    assert_eq!(sink, payload);
    assert_eq!(conn.pending_data(), None);

    // channel is back in sync
    assert_eq!(conn.send_command("userinfo", Params::new()).unwrap().result_code(), Some(0));
}

#[test]
fn test_data_reader_is_bounded() {
    let payload = b"raw bytes here".to_vec();
    let mut replies = data_response(&payload);
    replies.extend(ok_response());
    let (mut conn, _) = connect(Config::default(), replies);

    conn.send_command("getzip", Params::new()).unwrap();

    let mut read_back = Vec::new();
    {
        let mut reader = conn.data_reader().unwrap();
        assert_eq!(reader.remaining(), payload.len() as u64);
        reader.read_to_end(&mut read_back).unwrap();
        assert_eq!(reader.remaining(), 0);
    }
    assert_eq!(read_back, payload);
    assert_eq!(conn.pending_data(), None);
    assert_eq!(conn.send_command("userinfo", Params::new()).unwrap().result_code(), Some(0));
}

#[test]
fn test_write_data_without_pending() {
    let (mut conn, _) = connect(Config::default(), ok_response());
    conn.send_command("userinfo", Params::new()).unwrap();

    let mut sink = Vec::new();
    assert!(matches!(
        conn.write_data(&mut sink, 1, |_| {}),
        Err(BinapiError::LengthMismatch { expected: 0, actual: 1 })
    ));
    conn.write_data(&mut sink, 0, |_| {}).unwrap();
}

#[test]
fn test_zero_length_data_is_not_pending() {
    let (mut conn, _) = connect(Config::default(), data_response(&[]));
    let result = conn.send_command("getzip", Params::new()).unwrap();
    assert_eq!(result.get("data"), Some(&Value::Data(0)));
    assert_eq!(conn.pending_data(), None);
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_decode_error_poisons_connection() {
    let (mut conn, _) = connect(Config::default(), wrap(&[21]));

    let err = conn.send_command("userinfo", Params::new()).unwrap_err();
    assert!(matches!(err, BinapiError::Decode(_)));
    assert!(!conn.is_connected());
    assert!(matches!(
        conn.send_command("userinfo", Params::new()),
        Err(BinapiError::ChannelBroken)
    ));
}

#[test]
fn test_truncated_response_poisons_connection() {
    let mut replies = ok_response();
    replies.truncate(replies.len() - 2);
    let (mut conn, _) = connect(Config::default(), replies);

    let err = conn.send_command("userinfo", Params::new()).unwrap_err();
    assert!(matches!(err, BinapiError::ShortRead { .. }));
    assert!(matches!(conn.get_result(), Err(BinapiError::ChannelBroken)));
}

#[test]
fn test_interrupted_read_is_not_fatal() {
    let server = ScriptedServer {
        input: Cursor::new(ok_response()),
        output: Rc::new(RefCell::new(Vec::new())),
    };
    let mut conn = BinaryConnection::new(Config::default());
    conn.connect_with(InterruptOnce {
        server,
        interrupted: false,
    })
    .unwrap();

    let result = conn.send_command("userinfo", Params::new()).unwrap();
    assert_eq!(result.result_code(), Some(0));
    assert!(conn.is_connected());
}

#[test]
fn test_depth_limit_from_config() {
    let (mut conn, _) = connect(Config::builder().max_depth(2).build(), wrap(&[17, 17, 17, 255, 255, 255]));
    assert!(matches!(
        conn.send_command("listfolder", Params::new()),
        Err(BinapiError::Decode(_))
    ));
}
