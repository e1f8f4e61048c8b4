use crate::{
    proto,
    types::{ProtoDeserializable, StringValue},
};

/// A value bound to a `?` marker. `None` is NULL.
pub type BoundValue = Option<StringValue>;

#[derive(Debug)]
pub enum ClientMessagePayload {
    Query { cql: String, values: Vec<BoundValue> },
    Prepare { cql: String },
    Execute { statement_id: u32, values: Vec<BoundValue> },
}

#[derive(Debug)]
pub struct ClientMessage {
    pub request_id: u32,
    pub payload: ClientMessagePayload,
}

fn bound_values(values: Vec<proto::BoundValue>) -> Vec<BoundValue> {
    values
        .into_iter()
        .map(|v| v.value.map(StringValue::new))
        .collect()
}

impl ProtoDeserializable<proto::ClientMessage> for ClientMessage {
    fn from_proto(proto_message: proto::ClientMessage) -> Result<Self, String> {
        let Some(request_id) = proto_message.request_id else {
            return Err("Client message must have a request_id".to_string());
        };
        let payload = match proto_message.payload {
            Some(proto::client_message::Payload::Query(request)) => {
                if request.cql.trim().is_empty() {
                    return Err("Query request must have a statement".to_string());
                }
                ClientMessagePayload::Query {
                    cql: request.cql,
                    values: bound_values(request.values),
                }
            }
            Some(proto::client_message::Payload::Prepare(request)) => {
                if request.cql.trim().is_empty() {
                    return Err("Prepare request must have a statement".to_string());
                }
                ClientMessagePayload::Prepare { cql: request.cql }
            }
            Some(proto::client_message::Payload::Execute(request)) => {
                ClientMessagePayload::Execute {
                    statement_id: request.statement_id,
                    values: bound_values(request.values),
                }
            }
            None => return Err("Client message must have a payload".to_string()),
        };
        Ok(Self {
            request_id,
            payload,
        })
    }
}
