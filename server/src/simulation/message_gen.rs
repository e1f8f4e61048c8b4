//! Message generator for deterministic simulation testing.
//!
//! This module generates random but reproducible `ClientMessage` sequences
//! against one table holding a column of every string type, including both
//! well-formed and malformed messages.

// Simulation code legitimately needs cloning for test data
#![allow(clippy::disallowed_methods)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::proto;

/// Keyspace the simulation writes to.
pub const KEYSPACE: &str = "sim";
/// Table the simulation writes to.
pub const TABLE: &str = "strings";
/// Non-key columns of the simulation table, in model order.
pub const VALUE_COLUMNS: [&str; 4] = ["a", "b", "t", "v"];
/// Canonical type of each selected column: the key first, then `VALUE_COLUMNS`.
pub const SELECTED_TYPES: [&str; 5] = ["text", "ascii", "blob", "text", "text"];

/// Index of the `ascii` column in `VALUE_COLUMNS`.
const ASCII_COLUMN: usize = 0;

/// Statement ids the setup messages prepare, in order.
const PREPARED_INSERT_ID: u32 = 1;
const PREPARED_SELECT_ID: u32 = 2;

/// Configuration for message generation.
#[derive(Debug, Clone)]
pub struct MessageGenConfig {
    /// Probability of generating a malformed message (0.0 - 1.0).
    pub malformed_rate: f64,
    /// Probability of generating a read vs a write (0.0 = always write, 1.0 = always read).
    pub read_rate: f64,
    /// Probability that a write is a delete.
    pub delete_rate: f64,
    /// Probability that a write puts a non-ASCII byte in the `ascii` column.
    pub invalid_ascii_rate: f64,
    /// Probability of sending through a prepared statement instead of a query.
    pub prepared_rate: f64,
    /// Maximum generated value length in bytes.
    pub max_value_length: usize,
    /// Size of the partition key pool for reuse.
    pub key_pool_size: usize,
}

impl Default for MessageGenConfig {
    fn default() -> Self {
        Self {
            malformed_rate: 0.0,
            read_rate: 0.3,
            delete_rate: 0.05,
            invalid_ascii_rate: 0.1,
            prepared_rate: 0.5,
            max_value_length: 32,
            key_pool_size: 20,
        }
    }
}

/// Types of malformations that can be generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformationType {
    /// Message without a request id.
    MissingRequestId,
    /// Message without a payload.
    MissingPayload,
    /// Query with a blank statement.
    EmptyStatement,
    /// Table declared with a type name the registry does not know.
    UnknownType,
    /// Fewer bound values than markers.
    BindCountMismatch,
    /// Execute of a statement id that was never prepared.
    UnknownStatementId,
    /// A quoted string literal assigned to the `blob` column.
    StringLiteralForBlob,
}

impl MalformationType {
    /// All malformation types.
    pub const ALL: [Self; 7] = [
        Self::MissingRequestId,
        Self::MissingPayload,
        Self::EmptyStatement,
        Self::UnknownType,
        Self::BindCountMismatch,
        Self::UnknownStatementId,
        Self::StringLiteralForBlob,
    ];
}

/// What a generated message is meant to do.
#[derive(Debug, Clone)]
pub enum Intent {
    /// Schema and prepared statements the run depends on.
    Setup,
    /// Write `cells` (positions in `VALUE_COLUMNS`) of the row at `key`.
    Write {
        key: Vec<u8>,
        cells: Vec<(usize, Option<Vec<u8>>)>,
        /// Whether the server should accept the write.
        valid: bool,
    },
    /// Remove the row at `key`.
    Delete { key: Vec<u8> },
    /// Read the row at `key`.
    Read { key: Vec<u8> },
    /// A message the server must reject.
    Malformed(MalformationType),
}

/// A message together with the intent it was generated for.
#[derive(Debug, Clone)]
pub struct GeneratedMessage {
    pub message: proto::ClientMessage,
    pub intent: Intent,
}

/// Generator for random `ClientMessage` instances.
///
/// This generator produces deterministic sequences of messages
/// given the same seed, enabling reproducible testing.
pub struct MessageGenerator {
    rng: StdRng,
    config: MessageGenConfig,
    /// Pool of partition keys for reuse (promotes overwrites).
    key_pool: Vec<Vec<u8>>,
    /// Next request ID.
    next_request_id: u32,
}

impl MessageGenerator {
    /// Create a new message generator with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, MessageGenConfig::default())
    }

    /// Create a new message generator with custom configuration.
    #[must_use]
    pub fn with_config(seed: u64, config: MessageGenConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        // Keys are never empty; an empty partition key is rejected.
        let key_pool = (0..config.key_pool_size)
            .map(|_| {
                let len = rng.random_range(1..=8);
                random_bytes(&mut rng, len)
            })
            .collect();

        Self {
            rng,
            config,
            key_pool,
            next_request_id: 1,
        }
    }

    fn next_request_id(&mut self) -> u32 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        id
    }

    fn random_key(&mut self) -> Vec<u8> {
        let index = self.rng.random_range(0..self.key_pool.len());
        self.key_pool[index].clone()
    }

    fn query(&mut self, cql: &str, values: Vec<Option<Vec<u8>>>) -> proto::ClientMessage {
        proto::ClientMessage {
            request_id: Some(self.next_request_id()),
            payload: Some(proto::client_message::Payload::Query(proto::QueryRequest {
                cql: cql.to_string(),
                values: values
                    .into_iter()
                    .map(|value| proto::BoundValue { value })
                    .collect(),
            })),
        }
    }

    fn execute(&mut self, statement_id: u32, values: Vec<Option<Vec<u8>>>) -> proto::ClientMessage {
        proto::ClientMessage {
            request_id: Some(self.next_request_id()),
            payload: Some(proto::client_message::Payload::Execute(proto::ExecuteRequest {
                statement_id,
                values: values
                    .into_iter()
                    .map(|value| proto::BoundValue { value })
                    .collect(),
            })),
        }
    }

    /// Messages that create the simulation table and prepare the full-row
    /// insert and select statements.
    ///
    /// Must be sent first, in order, on a fresh connection.
    pub fn setup_messages(&mut self) -> Vec<GeneratedMessage> {
        let create_keyspace = format!("CREATE KEYSPACE {KEYSPACE}");
        let create_table = format!(
            "CREATE TABLE {KEYSPACE}.{TABLE} (p text PRIMARY KEY, a ascii, b blob, t text, v VarChar)"
        );
        let mut messages = vec![
            self.query(&create_keyspace, vec![]),
            self.query(&create_table, vec![]),
        ];
        for cql in [full_insert(), full_select()] {
            messages.push(proto::ClientMessage {
                request_id: Some(self.next_request_id()),
                payload: Some(proto::client_message::Payload::Prepare(proto::PrepareRequest {
                    cql,
                })),
            });
        }
        messages
            .into_iter()
            .map(|message| GeneratedMessage {
                message,
                intent: Intent::Setup,
            })
            .collect()
    }

    /// A value for column `column` of `VALUE_COLUMNS`.
    ///
    /// Values often carry zero bytes. The `ascii` column only gets bytes
    /// above 0x7F when `invalid` is set.
    fn random_value(&mut self, column: usize, invalid: bool) -> Option<Vec<u8>> {
        if self.rng.random_bool(0.1) {
            return None;
        }
        let len = self.rng.random_range(0..=self.config.max_value_length);
        let mut value = random_bytes(&mut self.rng, len);
        if column == ASCII_COLUMN {
            for byte in &mut value {
                *byte &= 0x7F;
            }
        }
        if !value.is_empty() && self.rng.random_bool(0.5) {
            let at = self.rng.random_range(0..value.len());
            value[at] = 0;
        }
        if invalid {
            let byte = self.rng.random_range(0x80..=0xFF);
            let at = self.rng.random_range(0..=value.len());
            value.insert(at, byte);
        }
        Some(value)
    }

    fn generate_write(&mut self) -> GeneratedMessage {
        let key = self.random_key();
        let invalid = self.rng.random_bool(self.config.invalid_ascii_rate);

        if !invalid && self.rng.random_bool(self.config.prepared_rate) {
            let cells: Vec<(usize, Option<Vec<u8>>)> = (0..VALUE_COLUMNS.len())
                .map(|column| (column, self.random_value(column, false)))
                .collect();
            let mut values = vec![Some(key.clone())];
            values.extend(cells.iter().map(|(_, value)| value.clone()));
            return GeneratedMessage {
                message: self.execute(PREPARED_INSERT_ID, values),
                intent: Intent::Write {
                    key,
                    cells,
                    valid: true,
                },
            };
        }

        let mut cells: Vec<(usize, Option<Vec<u8>>)> = (0..VALUE_COLUMNS.len())
            .filter(|_| self.rng.random_bool(0.75))
            .map(|column| (column, None))
            .collect();
        if invalid && !cells.iter().any(|(column, _)| *column == ASCII_COLUMN) {
            cells.insert(0, (ASCII_COLUMN, None));
        }
        for (column, value) in &mut cells {
            let value_is_invalid = invalid && *column == ASCII_COLUMN;
            *value = self.random_value(*column, value_is_invalid);
            // A NULL carries no bytes to reject.
            if value_is_invalid && value.is_none() {
                *value = Some(vec![0xFF]);
            }
        }

        let names: Vec<&str> = cells.iter().map(|(column, _)| VALUE_COLUMNS[*column]).collect();
        let markers = vec!["?"; names.len() + 1].join(", ");
        let cql = format!(
            "INSERT INTO {KEYSPACE}.{TABLE} ({}) VALUES ({markers})",
            std::iter::once("p").chain(names).collect::<Vec<_>>().join(", ")
        );
        let mut values = vec![Some(key.clone())];
        values.extend(cells.iter().map(|(_, value)| value.clone()));

        GeneratedMessage {
            message: self.query(&cql, values),
            intent: Intent::Write {
                key,
                cells,
                valid: !invalid,
            },
        }
    }

    fn generate_delete(&mut self) -> GeneratedMessage {
        let key = self.random_key();
        let cql = format!("DELETE FROM {KEYSPACE}.{TABLE} WHERE p = ?");
        GeneratedMessage {
            message: self.query(&cql, vec![Some(key.clone())]),
            intent: Intent::Delete { key },
        }
    }

    fn generate_read(&mut self) -> GeneratedMessage {
        let key = self.random_key();
        let message = if self.rng.random_bool(self.config.prepared_rate) {
            self.execute(PREPARED_SELECT_ID, vec![Some(key.clone())])
        } else {
            self.query(&full_select(), vec![Some(key.clone())])
        };
        GeneratedMessage {
            message,
            intent: Intent::Read { key },
        }
    }

    fn generate_malformed(&mut self) -> GeneratedMessage {
        let index = self.rng.random_range(0..MalformationType::ALL.len());
        let malformation = MalformationType::ALL[index];
        let message = match malformation {
            MalformationType::MissingRequestId => {
                let mut message = self.query(&full_select(), vec![Some(b"k".to_vec())]);
                message.request_id = None;
                message
            }
            MalformationType::MissingPayload => proto::ClientMessage {
                request_id: Some(self.next_request_id()),
                payload: None,
            },
            MalformationType::EmptyStatement => self.query("   ", vec![]),
            MalformationType::UnknownType => self.query(
                &format!("CREATE TABLE {KEYSPACE}.broken (p varchar2 PRIMARY KEY)"),
                vec![],
            ),
            MalformationType::BindCountMismatch => {
                let key = self.random_key();
                self.query(&full_insert(), vec![Some(key)])
            }
            MalformationType::UnknownStatementId => self.execute(u32::MAX, vec![]),
            MalformationType::StringLiteralForBlob => {
                let key = self.random_key();
                self.query(
                    &format!("INSERT INTO {KEYSPACE}.{TABLE} (p, b) VALUES (?, 'not a blob')"),
                    vec![Some(key)],
                )
            }
        };
        GeneratedMessage {
            message,
            intent: Intent::Malformed(malformation),
        }
    }

    /// Generate the next message.
    pub fn next_message(&mut self) -> GeneratedMessage {
        if self.rng.random_bool(self.config.malformed_rate) {
            return self.generate_malformed();
        }
        if self.rng.random_bool(self.config.read_rate) {
            return self.generate_read();
        }
        if self.rng.random_bool(self.config.delete_rate) {
            return self.generate_delete();
        }
        self.generate_write()
    }

    /// A read of the row at `key` through a plain query.
    pub fn read_message(&mut self, key: &[u8]) -> GeneratedMessage {
        GeneratedMessage {
            message: self.query(&full_select(), vec![Some(key.to_vec())]),
            intent: Intent::Read { key: key.to_vec() },
        }
    }
}

/// Insert of every column, bound in `p, a, b, t, v` order.
fn full_insert() -> String {
    format!("INSERT INTO {KEYSPACE}.{TABLE} (p, a, b, t, v) VALUES (?, ?, ?, ?, ?)")
}

/// Select of every column of one row, in `p, a, b, t, v` order.
fn full_select() -> String {
    format!("SELECT p, a, b, t, v FROM {KEYSPACE}.{TABLE} WHERE p = ?")
}

fn random_bytes(rng: &mut StdRng, len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rng.fill(bytes.as_mut_slice());
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_generation() {
        let mut gen1 = MessageGenerator::new(12345);
        let mut gen2 = MessageGenerator::new(12345);

        for _ in 0..100 {
            let msg1 = gen1.next_message();
            let msg2 = gen2.next_message();
            assert_eq!(msg1.message, msg2.message);
        }
    }

    #[test]
    fn test_different_seeds_produce_different_messages() {
        let mut gen1 = MessageGenerator::new(12345);
        let mut gen2 = MessageGenerator::new(54321);

        let messages1: Vec<_> = (0..10).map(|_| gen1.next_message().message).collect();
        let messages2: Vec<_> = (0..10).map(|_| gen2.next_message().message).collect();
        assert_ne!(messages1, messages2);
    }

    #[test]
    fn test_setup_messages_come_first_with_increasing_ids() {
        let mut generator = MessageGenerator::new(1);
        let setup = generator.setup_messages();
        assert_eq!(setup.len(), 4);
        let ids: Vec<_> = setup.iter().map(|m| m.message.request_id).collect();
        assert_eq!(ids, vec![Some(1), Some(2), Some(3), Some(4)]);
        assert_eq!(generator.next_message().message.request_id, Some(5));
    }

    #[test]
    fn test_invalid_writes_carry_non_ascii_byte() {
        let config = MessageGenConfig {
            invalid_ascii_rate: 1.0,
            read_rate: 0.0,
            delete_rate: 0.0,
            ..Default::default()
        };
        let mut generator = MessageGenerator::with_config(7, config);

        for _ in 0..50 {
            let Intent::Write { cells, valid, .. } = generator.next_message().intent else {
                panic!("expected a write");
            };
            assert!(!valid);
            let ascii = cells
                .iter()
                .find(|(column, _)| *column == ASCII_COLUMN)
                .and_then(|(_, value)| value.as_ref())
                .expect("ascii value");
            assert!(ascii.iter().any(|b| *b > 0x7F));
        }
    }

    #[test]
    fn test_valid_ascii_values_stay_in_range() {
        let config = MessageGenConfig {
            invalid_ascii_rate: 0.0,
            read_rate: 0.0,
            delete_rate: 0.0,
            ..Default::default()
        };
        let mut generator = MessageGenerator::with_config(99, config);

        for _ in 0..100 {
            let Intent::Write { cells, valid, .. } = generator.next_message().intent else {
                panic!("expected a write");
            };
            assert!(valid);
            for (column, value) in cells {
                if column == ASCII_COLUMN {
                    assert!(value.unwrap_or_default().iter().all(u8::is_ascii));
                }
            }
        }
    }

    #[test]
    fn test_all_malformations_generated() {
        let config = MessageGenConfig {
            malformed_rate: 1.0,
            ..Default::default()
        };
        let mut generator = MessageGenerator::with_config(3, config);
        let mut seen = Vec::new();
        for _ in 0..500 {
            if let Intent::Malformed(kind) = generator.next_message().intent {
                if !seen.contains(&kind) {
                    seen.push(kind);
                }
            }
        }
        assert_eq!(seen.len(), MalformationType::ALL.len());
    }
}
