//! Test that ascii columns reject bytes above 0x7F.

use crate::e2e_tests::helpers::*;
use crate::proto;

fn setup() -> TestClient {
    let mut test = TestClient::new();
    test.use_new_keyspace();
    test.query_ok("CREATE TABLE t (k text PRIMARY KEY, a ascii, t text)", &[]);
    test
}

#[test]
fn test_non_ascii_byte_rejected() {
    let mut test = setup();

    let resp = test.query(
        "INSERT INTO t (k, a) VALUES (?, ?)",
        &[Some(b"k"), Some(b"caf\xc3\xa9")],
    );
    assert_eq!(
        status_code(&resp),
        proto::google::rpc::Code::InvalidArgument as i32
    );
    assert!(status_message(&resp).contains("non-ASCII"), "{}", status_message(&resp));

    // Nothing of the rejected row was written.
    let resp = test.query_ok("SELECT * FROM t", &[]);
    assert!(resp.rows.is_empty());
}

#[test]
fn test_non_ascii_literal_rejected() {
    let mut test = setup();

    let resp = test.query("INSERT INTO t (k, a) VALUES ('k', 'naïve')", &[]);
    assert_eq!(
        status_code(&resp),
        proto::google::rpc::Code::InvalidArgument as i32
    );
}

#[test]
fn test_rejected_write_keeps_previous_value() {
    let mut test = setup();
    test.query_ok("INSERT INTO t (k, a, t) VALUES ('k', 'old', 'old')", &[]);

    let resp = test.query(
        "INSERT INTO t (k, t, a) VALUES (?, ?, ?)",
        &[Some(b"k"), Some(b"new"), Some(&[0x41, 0x80])],
    );
    assert!(!is_ok(&resp));

    let resp = test.query_ok("SELECT a, t FROM t WHERE k = 'k'", &[]);
    assert_eq!(column_strings(&resp, 0), vec!["old"]);
    assert_eq!(column_strings(&resp, 1), vec!["old"]);
}

#[test]
fn test_full_ascii_range_accepted() {
    let mut test = setup();
    let all_ascii: Vec<u8> = (0..=0x7Fu8).collect();

    test.query_ok(
        "INSERT INTO t (k, a) VALUES (?, ?)",
        &[Some(b"k"), Some(&all_ascii)],
    );

    let resp = test.query_ok("SELECT a FROM t WHERE k = 'k'", &[]);
    assert_eq!(cell(&resp, 0, 0), Some(all_ascii.as_slice()));
}

#[test]
fn test_text_accepts_any_bytes() {
    let mut test = setup();

    test.query_ok(
        "INSERT INTO t (k, t) VALUES (?, ?)",
        &[Some(b"k"), Some(b"\xff\xfe\x80")],
    );

    let resp = test.query_ok("SELECT t FROM t WHERE k = 'k'", &[]);
    assert_eq!(cell(&resp, 0, 0), Some(b"\xff\xfe\x80".as_slice()));
}
