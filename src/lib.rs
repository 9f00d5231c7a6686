//! Ticket autopilot library
//!
//! Settings file handling and scenario simulation shared by the CLI and the
//! integration tests.

pub mod config;
pub mod scenario;

pub use config::{ConfigError, ConfigFormat, FileSettingsProvider};
pub use scenario::{run_scenario, DispatchRecord, Scenario, ScenarioError, ScenarioReport};
