//! Test runner implementation
//!
//! Sets up every tool a scenario names, runs the steps in a scratch working
//! directory, and destroys the tools afterwards whatever the outcome.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use colored::Colorize;
use tokio::process::Command as TokioCommand;
use tokio_util::sync::CancellationToken;

use crate::common::config::Config;
use crate::common::{cancellable, Error, Result};
use crate::tool::Tool;

use super::config::{CommandExpectation, TestScenario, TestStep};

/// Result of a test run
#[derive(Debug)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub steps_run: usize,
    pub steps_total: usize,
    pub error: Option<String>,
}

impl TestResult {
    fn failed(name: &str, steps_run: usize, steps_total: usize, error: String) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            steps_run,
            steps_total,
            error: Some(error),
        }
    }
}

/// Shared state for the steps of one scenario
struct StepContext<'a> {
    workdir: &'a Path,
    vars: &'a BTreeMap<String, String>,
    cancel: &'a CancellationToken,
    verbose: bool,
}

/// Load and parse a YAML scenario
pub fn load_scenario(path: &Path) -> Result<TestScenario> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read test scenario '{}': {}",
            path.display(),
            e
        ))
    })?;

    serde_yaml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse test scenario: {}", e)))
}

/// Run a test scenario from a YAML file
///
/// Assertion and setup failures are reported in the returned [`TestResult`].
/// Cancellation is returned as an error.
pub async fn run_scenario(
    path: &Path,
    config: &Config,
    cancel: &CancellationToken,
    verbose: bool,
) -> Result<TestResult> {
    let scenario = load_scenario(path)?;
    let steps_total = scenario.steps.len();

    println!(
        "\n{} {}",
        "Running Test:".blue().bold(),
        scenario.name.white().bold()
    );

    if let Some(desc) = &scenario.description {
        println!("  {}", desc.dimmed());
    }

    let workdir = tempfile::Builder::new().prefix("sigstore-e2e-").tempdir()?;
    let scenario_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut vars = scenario.env.clone();
    vars.insert("WORKDIR".into(), workdir.path().display().to_string());
    vars.insert("SCENARIO_DIR".into(), scenario_dir.display().to_string());

    let ctx = StepContext {
        workdir: workdir.path(),
        vars: &vars,
        cancel,
        verbose,
    };

    // Run setup steps
    if let Some(setup_steps) = &scenario.setup {
        println!("\n{}", "Setup:".cyan());
        for step in setup_steps {
            if verbose {
                println!("  $ {}", step.shell.dimmed());
            }

            let shell = expand_vars(&step.shell, &vars)?;
            let status = cancellable(cancel, "scenario setup", async {
                TokioCommand::new("sh")
                    .arg("-c")
                    .arg(&shell)
                    .current_dir(workdir.path())
                    .envs(&vars)
                    .stdin(Stdio::null())
                    .stdout(if verbose { Stdio::inherit() } else { Stdio::null() })
                    .stderr(if verbose { Stdio::inherit() } else { Stdio::null() })
                    .kill_on_drop(true)
                    .status()
                    .await
                    .map_err(|e| Error::Config(format!("Setup command failed to execute: {}", e)))
            })
            .await?;

            if !status.success() {
                return Ok(TestResult::failed(
                    &scenario.name,
                    0,
                    steps_total,
                    format!(
                        "Setup command '{}' failed with exit code {:?}",
                        step.shell,
                        status.code()
                    ),
                ));
            }
            println!("  {} {}", "✓".green(), step.shell.dimmed());
        }
    }

    // Build a handle for every tool the steps use
    let mut tools: BTreeMap<String, Tool> = BTreeMap::new();
    for step in &scenario.steps {
        let name = step.tool();
        if tools.contains_key(name) {
            continue;
        }
        let strategy = scenario
            .tools
            .get(name)
            .cloned()
            .unwrap_or_else(|| config.tool_strategy(name));
        let tool = Tool::new(name).with_shared_strategy(strategy.build(name, config)?);
        tools.insert(name.to_string(), tool);
    }

    let outcome = run_with_tools(&scenario, &mut tools, &ctx).await;

    for tool in tools.values_mut() {
        if let Err(e) = tool.destroy() {
            tracing::warn!(tool = %tool.name(), error = %e, "Failed to clean up tool");
        }
    }

    match outcome {
        Ok(()) => {
            println!(
                "\n{} {}\n",
                "✓".green().bold(),
                "Test Passed".green().bold()
            );
            Ok(TestResult {
                name: scenario.name,
                passed: true,
                steps_run: steps_total,
                steps_total,
                error: None,
            })
        }
        Err(failure) if failure.error.is_cancelled() => Err(failure.error),
        Err(failure) => Ok(TestResult::failed(
            &scenario.name,
            failure.steps_run,
            steps_total,
            failure.error.to_string(),
        )),
    }
}

struct Failure {
    steps_run: usize,
    error: Error,
}

async fn run_with_tools(
    scenario: &TestScenario,
    tools: &mut BTreeMap<String, Tool>,
    ctx: &StepContext<'_>,
) -> std::result::Result<(), Failure> {
    println!("\n{}", "Tools:".cyan());
    for tool in tools.values_mut() {
        match tool.setup(ctx.cancel).await {
            Ok(path) => {
                let path = path.display().to_string();
                println!("  {} {} {}", "✓".green(), tool.name(), path.dimmed());
            }
            Err(error) => {
                println!("  {} {}: {}", "✗".red(), tool.name(), error);
                return Err(Failure {
                    steps_run: 0,
                    error,
                });
            }
        }
    }

    // Execute test steps
    println!("\n{}", "Steps:".cyan());

    for (i, step) in scenario.steps.iter().enumerate() {
        let step_num = i + 1;
        let tool = &tools[step.tool()];

        if let Err(error) = execute_step(tool, step, step_num, ctx).await {
            println!("  {} Step {}: {}", "✗".red(), step_num, error);
            return Err(Failure {
                steps_run: step_num,
                error,
            });
        }
    }

    Ok(())
}

/// Execute a single test step
async fn execute_step(
    tool: &Tool,
    step: &TestStep,
    step_num: usize,
    ctx: &StepContext<'_>,
) -> Result<()> {
    match step {
        TestStep::Run { args, expect, .. } => {
            execute_run_step(tool, args, expect.as_ref(), step_num, ctx).await
        }
        TestStep::Verify { .. } => execute_verify_step(tool, step_num, ctx).await,
    }
}

/// Execute a run step
async fn execute_run_step(
    tool: &Tool,
    args: &[String],
    expect: Option<&CommandExpectation>,
    step_num: usize,
    ctx: &StepContext<'_>,
) -> Result<()> {
    let args = args
        .iter()
        .map(|a| expand_vars(a, ctx.vars))
        .collect::<Result<Vec<_>>>()?;
    let display = format!("{} {}", tool.name(), args.join(" "));

    let mut command = tool.command(ctx.cancel, &args)?.current_dir(ctx.workdir);
    for (key, value) in ctx.vars {
        command = command.env(key, value);
    }
    let output = command.output().await?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if ctx.verbose {
        for line in stdout.lines() {
            println!("    {}", line.dimmed());
        }
        for line in stderr.lines() {
            println!("    {}", line.yellow());
        }
    }

    let should_succeed = expect.and_then(|e| e.success).unwrap_or(true);
    let did_succeed = output.status.success();
    if should_succeed && !did_succeed {
        return Err(Error::CommandFailed {
            tool: tool.name().to_string(),
            code: output.status.code(),
            stderr: stderr.trim().to_string(),
        });
    }
    if !should_succeed && did_succeed {
        return Err(Error::TestAssertion(format!(
            "'{}' expected to fail but exited successfully",
            display
        )));
    }

    if let Some(exp) = expect {
        if let Some(needle) = &exp.output_contains {
            let needle = expand_vars(needle, ctx.vars)?;
            if !stdout.contains(&needle) {
                return Err(Error::TestAssertion(format!(
                    "Output of '{}' does not contain '{}'",
                    display, needle
                )));
            }
        }
        if let Some(needle) = &exp.stderr_contains {
            let needle = expand_vars(needle, ctx.vars)?;
            if !stderr.contains(&needle) {
                return Err(Error::TestAssertion(format!(
                    "Standard error of '{}' does not contain '{}'",
                    display, needle
                )));
            }
        }
    }

    let suffix = if should_succeed { "" } else { " (expected failure)" };
    println!(
        "  {} Step {}: {}{}",
        "✓".green(),
        step_num,
        display.dimmed(),
        suffix
    );

    Ok(())
}

/// Execute a verify step
async fn execute_verify_step(tool: &Tool, step_num: usize, ctx: &StepContext<'_>) -> Result<()> {
    let result = tool.verify(ctx.cancel).await?;
    if !result.success {
        return Err(Error::TestAssertion(format!(
            "'{}' did not answer any probe: {}",
            tool.name(),
            result.error.unwrap_or_default()
        )));
    }

    if ctx.verbose {
        if let Some(output) = &result.output {
            println!("    {}", output.dimmed());
        }
    }

    println!(
        "  {} Step {}: verify {}",
        "✓".green(),
        step_num,
        tool.name().dimmed()
    );

    Ok(())
}

/// Expand `${NAME}` references from `vars`, then the process environment
pub fn expand_vars(input: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            Error::Config(format!("Unterminated variable reference in '{}'", input))
        })?;
        let name = &after[..end];

        let value = match vars.get(name) {
            Some(v) => v.clone(),
            None => std::env::var(name)
                .map_err(|_| Error::Config(format!("Undefined variable '{}'", name)))?,
        };
        out.push_str(&value);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
