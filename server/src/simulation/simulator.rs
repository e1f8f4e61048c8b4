//! Main simulator harness for deterministic simulation testing.
//!
//! This module ties together the message generator, the operation history
//! and the invariant checker, driving a real `ClientConnection`.

// Simulation code legitimately needs cloning for test data
#![allow(clippy::disallowed_methods)]

use std::path::Path;
use std::sync::{Arc, RwLock};

use super::invariants::{InvariantChecker, InvariantViolation, OperationHistory};
use super::message_gen::{GeneratedMessage, Intent, MessageGenConfig, MessageGenerator};
use crate::client_connection::ClientConnection;
use crate::proto;
use crate::storage::Database;

/// File name of the commit log inside the simulation's temporary directory.
const COMMIT_LOG_FILE: &str = "commitlog.db";

/// Configuration for the simulator.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility.
    pub seed: u64,
    /// Message generation configuration.
    pub message_config: MessageGenConfig,
    /// Back the database with a commit log and verify it after reopening.
    pub commit_log: bool,
}

impl SimulatorConfig {
    /// Create a new simulator config with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            message_config: MessageGenConfig::default(),
            commit_log: false,
        }
    }

    /// Set the message configuration.
    #[must_use]
    pub const fn with_message_config(mut self, config: MessageGenConfig) -> Self {
        self.message_config = config;
        self
    }

    /// Set the malformed message rate.
    #[must_use]
    pub const fn with_malformed_rate(mut self, rate: f64) -> Self {
        self.message_config.malformed_rate = rate;
        self
    }

    /// Persist through a commit log and replay it at the end of the run.
    #[must_use]
    pub const fn with_commit_log(mut self) -> Self {
        self.commit_log = true;
        self
    }
}

/// Results from a simulation run.
#[derive(Debug)]
pub struct SimulationResult {
    /// The seed used for this simulation.
    pub seed: u64,
    /// Number of messages processed.
    pub messages_processed: u64,
    /// Number of successful operations.
    pub successful_operations: u64,
    /// Number of failed operations (expected failures like validation errors).
    pub failed_operations: u64,
    /// Invariant violations detected.
    pub invariant_violations: Vec<InvariantViolation>,
    /// Whether the simulation completed without panics.
    pub completed_successfully: bool,
    /// Error message if simulation failed.
    pub error: Option<String>,
}

impl SimulationResult {
    /// Check if the simulation passed (no invariant violations).
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.completed_successfully && self.invariant_violations.is_empty()
    }
}

/// The main simulator harness.
pub struct Simulator {
    config: SimulatorConfig,
    message_generator: MessageGenerator,
    history: OperationHistory,
    checker: InvariantChecker,
    runtime: tokio::runtime::Runtime,
    messages_processed: u64,
    successful_operations: u64,
    failed_operations: u64,
}

impl Simulator {
    /// Create a new simulator with the given configuration.
    #[must_use]
    pub fn new(config: SimulatorConfig) -> Self {
        let message_generator =
            MessageGenerator::with_config(config.seed, config.message_config.clone());
        #[allow(clippy::expect_used)] // Runtime creation failure is fatal
        let runtime = tokio::runtime::Runtime::new().expect("Failed to create runtime");

        Self {
            config,
            message_generator,
            history: OperationHistory::new(),
            checker: InvariantChecker::new(),
            runtime,
            messages_processed: 0,
            successful_operations: 0,
            failed_operations: 0,
        }
    }

    fn failed(&self, error: String) -> SimulationResult {
        SimulationResult {
            seed: self.config.seed,
            messages_processed: self.messages_processed,
            successful_operations: self.successful_operations,
            failed_operations: self.failed_operations,
            invariant_violations: self.checker.violations().to_vec(),
            completed_successfully: false,
            error: Some(error),
        }
    }

    /// Run the simulation for a given number of messages.
    ///
    /// This creates a fresh database, sends the setup messages and then the
    /// specified number of generated messages, checking invariants after
    /// each one. With a commit log the database is then reopened and every
    /// row the model expects is read back.
    pub fn run(&mut self, message_count: usize) -> SimulationResult {
        if !self.config.commit_log {
            let database = Arc::new(RwLock::new(Database::in_memory()));
            let mut connection = ClientConnection::new(database);
            return self.run_with_connection(&mut connection, message_count);
        }

        let temp_dir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => return self.failed(format!("Failed to create temp dir: {e}")),
        };
        let path = temp_dir.path().join(COMMIT_LOG_FILE);
        let database = match Database::open(&path, false) {
            Ok((db, _)) => db,
            Err(e) => return self.failed(format!("Failed to create database: {e}")),
        };
        let mut connection = ClientConnection::new(Arc::new(RwLock::new(database)));
        let result = self.run_with_connection(&mut connection, message_count);
        drop(connection);
        if !result.completed_successfully {
            return result;
        }

        self.verify_after_reopen(&path)
    }

    fn send(&self, connection: &mut ClientConnection, message: proto::ClientMessage) -> Option<proto::ServerResponse> {
        let response = self
            .runtime
            .block_on(async { connection.handle_message(message).await });
        match response.payload {
            Some(proto::server_message::Payload::Response(response)) => Some(response),
            None => None,
        }
    }

    /// Run simulation with an existing client connection.
    fn run_with_connection(
        &mut self,
        connection: &mut ClientConnection,
        message_count: usize,
    ) -> SimulationResult {
        for generated in self.message_generator.setup_messages() {
            let Some(response) = self.send(connection, generated.message) else {
                return self.failed("No response to setup message".to_string());
            };
            if response.status.as_ref().map(|s| s.code)
                != Some(proto::google::rpc::Code::Ok as i32)
            {
                return self.failed(format!("Setup failed: {:?}", response.status));
            }
        }

        for _ in 0..message_count {
            let generated = self.message_generator.next_message();
            self.messages_processed += 1;
            self.process(connection, generated);
        }

        SimulationResult {
            seed: self.config.seed,
            messages_processed: self.messages_processed,
            successful_operations: self.successful_operations,
            failed_operations: self.failed_operations,
            invariant_violations: self.checker.violations().to_vec(),
            completed_successfully: true,
            error: None,
        }
    }

    fn process(&mut self, connection: &mut ClientConnection, generated: GeneratedMessage) {
        let GeneratedMessage { message, intent } = generated;
        let index = self.history.len();
        let Some(response) = self.send(connection, message.clone()) else {
            self.checker.add_violation(InvariantViolation {
                description: "No response returned".to_string(),
                operation_index: index,
                context: String::new(),
            });
            return;
        };

        self.checker.check_request_id(&message, &response, index);
        match intent {
            Intent::Setup => {}
            Intent::Write { key, cells, valid } => {
                self.checker.check_write_response(valid, &response, index);
                self.history.record_write(&key, &cells, &response);
            }
            Intent::Delete { key } => {
                self.checker.check_write_response(true, &response, index);
                self.history.record_delete(&key, &response);
            }
            Intent::Read { key } => {
                let expected = self.history.expected_state().get(&key);
                self.checker
                    .check_read_response(&key, expected, &response, index);
                self.history.record_read(&key, &response);
            }
            Intent::Malformed(kind) => {
                self.checker.check_malformed_response(kind, &response, index);
                self.history.record_malformed(kind, &response);
            }
        }

        if response
            .status
            .as_ref()
            .is_some_and(|s| s.code == proto::google::rpc::Code::Ok as i32)
        {
            self.successful_operations += 1;
        } else {
            self.failed_operations += 1;
        }
    }

    /// Reopen the commit log and read back every row the model expects.
    fn verify_after_reopen(&mut self, path: &Path) -> SimulationResult {
        let database = match Database::open(path, false) {
            Ok((db, recovery)) => {
                if recovery.truncated_bytes > 0 {
                    self.checker.add_violation(InvariantViolation {
                        description: "Clean commit log truncated on reopen".to_string(),
                        operation_index: self.history.len(),
                        context: format!("{recovery:?}"),
                    });
                }
                db
            }
            Err(e) => return self.failed(format!("Failed to reopen database: {e}")),
        };
        let mut connection = ClientConnection::new(Arc::new(RwLock::new(database)));

        let mut keys: Vec<Vec<u8>> = self.history.expected_state().keys().cloned().collect();
        keys.sort();
        for key in keys {
            let generated = self.message_generator.read_message(&key);
            self.process(&mut connection, generated);
        }

        SimulationResult {
            seed: self.config.seed,
            messages_processed: self.messages_processed,
            successful_operations: self.successful_operations,
            failed_operations: self.failed_operations,
            invariant_violations: self.checker.violations().to_vec(),
            completed_successfully: true,
            error: None,
        }
    }

    /// Get the operation history.
    #[must_use]
    pub const fn history(&self) -> &OperationHistory {
        &self.history
    }

    /// Get the invariant checker.
    #[must_use]
    pub const fn checker(&self) -> &InvariantChecker {
        &self.checker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulator_basic() {
        let config = SimulatorConfig::new(12345);
        let mut simulator = Simulator::new(config);

        let result = simulator.run(100);

        assert!(result.completed_successfully, "{:?}", result.error);
        assert_eq!(result.messages_processed, 100);
        // Rejected ascii writes count as failures
        assert_eq!(result.successful_operations + result.failed_operations, 100);
    }

    #[test]
    fn test_simulator_with_malformed_messages() {
        let config = SimulatorConfig::new(12345).with_malformed_rate(0.5);
        let mut simulator = Simulator::new(config);

        let result = simulator.run(100);

        assert!(result.passed(), "{:?}", result.invariant_violations);
        assert!(result.failed_operations > 0);
    }

    #[test]
    fn test_simulator_deterministic() {
        let mut sim1 = Simulator::new(SimulatorConfig::new(12345));
        let result1 = sim1.run(200);

        let mut sim2 = Simulator::new(SimulatorConfig::new(12345));
        let result2 = sim2.run(200);

        assert_eq!(result1.messages_processed, result2.messages_processed);
        assert_eq!(result1.successful_operations, result2.successful_operations);
        assert_eq!(result1.failed_operations, result2.failed_operations);
        assert_eq!(
            sim1.history().stats().live_rows,
            sim2.history().stats().live_rows
        );
    }

    #[test]
    fn test_simulator_no_invariant_violations() {
        let config = SimulatorConfig::new(54321);
        let mut simulator = Simulator::new(config);

        let result = simulator.run(500);

        assert!(
            result.passed(),
            "Simulation should pass: {:?}",
            result.invariant_violations
        );
        assert!(simulator.history().stats().successful_reads > 0);
        assert!(!simulator.checker().has_violations());
    }

    #[test]
    fn test_simulator_replays_commit_log() {
        let config = SimulatorConfig::new(777).with_commit_log();
        let mut simulator = Simulator::new(config);

        let result = simulator.run(300);

        assert!(
            result.passed(),
            "Simulation should pass after reopen: {:?} {:?}",
            result.error,
            result.invariant_violations
        );
        assert!(simulator.history().stats().live_rows > 0);
    }

    #[test]
    #[ignore] // Long running test
    fn test_simulator_stress() {
        let config = SimulatorConfig::new(99999)
            .with_malformed_rate(0.1)
            .with_commit_log();
        let mut simulator = Simulator::new(config);

        let result = simulator.run(10_000);

        assert!(result.passed(), "{:?}", result.invariant_violations);
    }
}
