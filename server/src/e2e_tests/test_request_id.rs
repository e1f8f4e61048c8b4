//! Test that request IDs are correctly echoed in responses.

use crate::e2e_tests::helpers::*;
use crate::proto;

#[test]
fn test_request_id_preserved() {
    let mut test = TestClient::new();

    for request_id in [1, 100, 999, u32::MAX] {
        let resp = test.handle_message(query_message(
            request_id,
            "SELECT * FROM system_schema.keyspaces",
            &[],
        ));
        assert!(is_ok(&resp));
        assert_eq!(resp.request_id, Some(request_id));
    }
}

#[test]
fn test_request_id_preserved_on_error() {
    let mut test = TestClient::new();

    let resp = test.handle_message(query_message(42, "SELECT * FROM nope.nope", &[]));
    assert!(!is_ok(&resp));
    assert_eq!(resp.request_id, Some(42));
}

#[test]
fn test_request_id_none() {
    let mut test = TestClient::new();

    let mut req = query_message(1, "SELECT * FROM system_schema.keyspaces", &[]);
    req.request_id = None;

    let resp = test.handle_message(req);
    assert_eq!(resp.request_id, None);
    assert_eq!(
        status_code(&resp),
        proto::google::rpc::Code::InvalidArgument as i32
    );
}
