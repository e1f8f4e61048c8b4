//! Test that unknown type names are rejected by DDL.

use crate::e2e_tests::helpers::*;
use crate::proto;

#[test]
fn test_unknown_type_rejected() {
    let mut test = TestClient::new();
    test.use_new_keyspace();

    for type_name in ["int", "varchar2", "string", "nvarchar", "txt"] {
        let cql = format!("CREATE TABLE t (k text PRIMARY KEY, v {type_name})");
        let resp = test.query(&cql, &[]);
        assert_eq!(
            status_code(&resp),
            proto::google::rpc::Code::InvalidArgument as i32,
            "{type_name}"
        );
        assert_eq!(status_message(&resp), format!("Unknown type {type_name}"));
    }

    // No table was created.
    let resp = test.query_ok(
        "SELECT table_name FROM system_schema.tables WHERE keyspace_name = 'ks'",
        &[],
    );
    assert!(resp.rows.is_empty());
}

#[test]
fn test_unknown_type_in_cast() {
    let mut test = TestClient::new();
    test.use_new_keyspace();
    test.query_ok("CREATE TABLE t (k text PRIMARY KEY, v text)", &[]);

    let resp = test.query("INSERT INTO t (k, v) VALUES ('k', (varchar2)'x')", &[]);
    assert_eq!(
        status_code(&resp),
        proto::google::rpc::Code::InvalidArgument as i32
    );
}

#[test]
fn test_type_names_are_case_insensitive() {
    let mut test = TestClient::new();
    test.use_new_keyspace();
    test.query_ok(
        "CREATE TABLE t (k TEXT PRIMARY KEY, a Ascii, b BLOB, v vArChAr)",
        &[],
    );

    let resp = test.query_ok("SELECT k, a, b, v FROM t", &[]);
    assert_eq!(
        column_types(&resp),
        vec![("k", "text"), ("a", "ascii"), ("b", "blob"), ("v", "text")]
    );
}
