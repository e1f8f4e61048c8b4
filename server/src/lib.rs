#![cfg_attr(
    test,
    allow(
        clippy::disallowed_methods,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic
    )
)]
// Life of a request:
// 1. Protobuf comes in
// 2. Convert / validate proto into internal request format
// 3. Parse the statement; DDL resolves declared type names
//    (`varchar` becomes `text`, unknown names are rejected)
// 4. Writes:
//     - Check literals and casts against column types
//     - Validate values (ascii rejects bytes above 0x7F)
//     - Append to the commit log, then apply in memory
//    Reads:
//     - Select rows, or generate `system_schema` rows from the catalog
//     - Respond with raw cell bytes and canonical type names
//
// System components:
//  - String type registry
//  - Statement parser
//  - Catalog and row storage over a commit log

pub mod client_connection;
pub mod config;
pub mod cql;
pub mod proto;
pub mod query;
pub mod schema;
pub mod storage;
pub mod types;


pub use client_connection::ClientConnection;
