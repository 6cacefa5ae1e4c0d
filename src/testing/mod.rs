//! E2E Test Runner
//!
//! Reads YAML test scenarios that name the tools they need, acquires each tool
//! with its configured strategy and runs the steps against the real binaries.

mod config;
mod runner;

pub use config::*;
pub use runner::{expand_vars, load_scenario, run_scenario, TestResult};
