use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::{
    cql::{self, ParsedStatement},
    proto,
    query::{self, PreparedStatement, QueryError, QueryExecutor, QueryResult, Session},
    storage::Database,
    types::{
        ProtoDeserializable, ProtoSerializable,
        client_message::{BoundValue, ClientMessage, ClientMessagePayload},
    },
};

/// One client's view of the shared database.
///
/// Holds the session keyspace and the statements this client prepared.
/// Prepared statement ids are local to the connection and start at 1.
pub struct ClientConnection {
    database: Arc<RwLock<Database>>,
    session: Session,
    prepared: HashMap<u32, PreparedStatement>,
    next_statement_id: u32,
}

impl ClientConnection {
    #[must_use]
    pub fn new(database: Arc<RwLock<Database>>) -> Self {
        Self {
            database,
            session: Session::new(),
            prepared: HashMap::new(),
            next_statement_id: 1,
        }
    }

    /// The database this connection reads and writes.
    #[must_use]
    #[allow(clippy::disallowed_methods)] // Arc::clone is safe and expected for shared state
    pub fn shared_database(&self) -> Arc<RwLock<Database>> {
        Arc::clone(&self.database)
    }

    pub async fn handle_message(
        &mut self,
        proto_message: proto::ClientMessage,
    ) -> proto::ServerMessage {
        let request_id = proto_message.request_id;
        let message = match ClientMessage::from_proto(proto_message) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!("rejected client message: {err}");
                return server_message(proto::ServerResponse {
                    request_id,
                    status: Some(status(proto::google::rpc::Code::InvalidArgument, err)),
                    ..Default::default()
                });
            }
        };

        let result = match message.payload {
            ClientMessagePayload::Query { cql, values } => self.query(&cql, &values),
            ClientMessagePayload::Prepare { cql } => self.prepare(&cql),
            ClientMessagePayload::Execute {
                statement_id,
                values,
            } => self.execute(statement_id, &values),
        };

        let mut response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("request {} failed: {e}", message.request_id);
                proto::ServerResponse {
                    status: Some(status(e.code(), e.to_string())),
                    ..Default::default()
                }
            }
        };
        response.request_id = Some(message.request_id);
        server_message(response)
    }

    fn query(
        &mut self,
        cql: &str,
        values: &[BoundValue],
    ) -> Result<proto::ServerResponse, QueryError> {
        let parsed = cql::parse(cql)?;
        tracing::debug!("query: {}", parsed.statement.kind());
        let (result, keyspace) = run(&self.database, &parsed, self.session.keyspace(), values)?;
        if let Some(keyspace) = keyspace {
            self.session.set_keyspace(&keyspace);
        }
        Ok(ok_response(result))
    }

    fn prepare(&mut self, cql: &str) -> Result<proto::ServerResponse, QueryError> {
        let prepared = {
            let db = self.database.read().map_err(|_| QueryError::LockPoisoned)?;
            query::prepare(&db, self.session.keyspace(), cql)?
        };

        let statement_id = self.next_statement_id;
        self.next_statement_id += 1;
        tracing::debug!(
            "prepared {} as statement {statement_id} with {} bind variables",
            prepared.parsed.statement.kind(),
            prepared.bind_variables.len()
        );

        let bind_variables = prepared
            .bind_variables
            .iter()
            .map(|spec| spec.clone_value().to_proto())
            .collect();
        self.prepared.insert(statement_id, prepared);

        Ok(proto::ServerResponse {
            status: Some(status(proto::google::rpc::Code::Ok, String::new())),
            statement_id: Some(statement_id),
            bind_variables,
            ..Default::default()
        })
    }

    fn execute(
        &mut self,
        statement_id: u32,
        values: &[BoundValue],
    ) -> Result<proto::ServerResponse, QueryError> {
        let prepared = self
            .prepared
            .get(&statement_id)
            .ok_or(QueryError::UnknownPreparedStatement(statement_id))?;
        tracing::debug!("execute statement {statement_id}");
        let (result, keyspace) = run(
            &self.database,
            &prepared.parsed,
            prepared.keyspace.as_deref(),
            values,
        )?;
        if let Some(keyspace) = keyspace {
            self.session.set_keyspace(&keyspace);
        }
        Ok(ok_response(result))
    }
}

/// Run a parsed statement under the lock it needs.
///
/// Returns the result and, for `USE`, the keyspace the session switches to.
fn run(
    database: &RwLock<Database>,
    parsed: &ParsedStatement,
    keyspace: Option<&str>,
    values: &[BoundValue],
) -> Result<(QueryResult, Option<String>), QueryError> {
    if values.len() != parsed.bind_marker_count {
        return Err(QueryError::InvalidRequest(format!(
            "There were {} markers(?) in CQL but {} bound variables",
            parsed.bind_marker_count,
            values.len()
        )));
    }

    let executor = QueryExecutor::new(keyspace, values);
    if query::is_read_only(&parsed.statement) {
        let db = database.read().map_err(|_| QueryError::LockPoisoned)?;
        executor.read(&db, &parsed.statement)
    } else {
        let mut db = database.write().map_err(|_| QueryError::LockPoisoned)?;
        Ok((executor.write(&mut db, &parsed.statement)?, None))
    }
}

fn status(code: proto::google::rpc::Code, message: String) -> proto::google::rpc::Status {
    proto::google::rpc::Status {
        code: code.into(),
        message,
        ..Default::default()
    }
}

fn ok_response(result: QueryResult) -> proto::ServerResponse {
    let result = result.to_proto();
    proto::ServerResponse {
        status: Some(status(proto::google::rpc::Code::Ok, String::new())),
        columns: result.columns,
        rows: result.rows,
        ..Default::default()
    }
}

const fn server_message(response: proto::ServerResponse) -> proto::ServerMessage {
    proto::ServerMessage {
        payload: Some(proto::server_message::Payload::Response(response)),
    }
}
