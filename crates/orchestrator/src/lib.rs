//! Orchestration core for the incident-response console.
//!
//! Multiplexes three asynchronous data sources (world-state polling,
//! voice-session polling, operator route requests) into one consistent
//! [`incident_core::IncidentState`], with single-flight polling and
//! last-applied-wins route sequencing.

pub mod error;
pub mod executor;
pub mod projection;
pub mod services;
pub mod state_machine;
pub mod supervisor;

pub use error::{BackendError, OrchestratorError, Result};
pub use executor::{ConsoleHandle, ExecutorConfig, IncidentExecutor};
pub use projection::{project, ConsoleView, SystemMode};
pub use state_machine::{Effect, IncidentMachine, MachineInput};
pub use supervisor::{PollerConfig, PollerSupervisor};
