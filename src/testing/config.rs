//! Test scenario configuration types
//!
//! Defines the data structures for deserializing YAML test scenarios.

use crate::setup::registry::StrategyConfig;
use serde::Deserialize;
use std::collections::BTreeMap;

/// A complete test scenario loaded from a YAML file
#[derive(Deserialize, Debug)]
pub struct TestScenario {
    /// Name of the test scenario
    pub name: String,
    /// Optional description of what the test verifies
    pub description: Option<String>,
    /// Strategies for the tools used by the steps
    ///
    /// Tools not listed here fall back to the config file, then to `PATH`.
    #[serde(default)]
    pub tools: BTreeMap<String, StrategyConfig>,
    /// Variables available to `${NAME}` expansion and passed to every step
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Optional shell commands run in the scenario directory before the steps
    pub setup: Option<Vec<SetupStep>>,
    /// The sequence of test steps to execute
    pub steps: Vec<TestStep>,
}

/// A setup step that runs before the test
#[derive(Deserialize, Debug)]
pub struct SetupStep {
    /// Shell command to execute
    pub shell: String,
}

/// A single test step in the execution flow
#[derive(Deserialize, Debug)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Invoke a tool
    Run {
        /// Tool name
        tool: String,
        /// Arguments, with `${NAME}` expansion
        #[serde(default)]
        args: Vec<String>,
        /// Optional expectations for the invocation
        expect: Option<CommandExpectation>,
    },
    /// Check a tool answers a version or help probe
    Verify {
        /// Tool name
        tool: String,
    },
}

impl TestStep {
    /// Tool this step invokes
    pub fn tool(&self) -> &str {
        match self {
            TestStep::Run { tool, .. } | TestStep::Verify { tool } => tool,
        }
    }
}

/// Expectations for a tool invocation
#[derive(Deserialize, Debug)]
pub struct CommandExpectation {
    /// Whether the tool should exit successfully
    pub success: Option<bool>,
    /// Substring that should be in standard output
    pub output_contains: Option<String>,
    /// Substring that should be in standard error
    pub stderr_contains: Option<String>,
}
