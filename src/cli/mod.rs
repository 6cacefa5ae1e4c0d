//! CLI command handling
//!
//! Dispatches CLI commands to tool handles and formats output.

use colored::Colorize;
use tokio_util::sync::CancellationToken;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::setup::registry::tool_from_config;
use crate::testing;

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, config: Config, cancel: CancellationToken) -> Result<()> {
    match command {
        Commands::Setup { tool, verify, json } => setup_tool(&tool, verify, json, config, &cancel).await,

        Commands::Run { tool, args } => {
            let mut tool = tool_from_config(&tool, &config)?;
            tool.setup(&cancel).await?;

            let result = match tool.command(&cancel, &args) {
                Ok(command) => command.run().await,
                Err(e) => Err(e),
            };

            if let Err(e) = tool.destroy() {
                tracing::warn!(tool = %tool.name(), error = %e, "Failed to clean up tool");
            }
            result
        }

        Commands::Check { json } => check_tools(&config, &cancel, json).await,

        Commands::List { json } => {
            list_tools(&config, json)?;
            Ok(())
        }

        Commands::Test { path, verbose } => {
            let result = testing::run_scenario(&path, &config, &cancel, verbose).await?;
            if result.passed {
                Ok(())
            } else {
                Err(Error::TestAssertion(format!(
                    "'{}' failed at step {}/{}: {}",
                    result.name,
                    result.steps_run,
                    result.steps_total,
                    result.error.unwrap_or_default()
                )))
            }
        }
    }
}

async fn setup_tool(
    name: &str,
    verify: bool,
    json: bool,
    mut config: Config,
    cancel: &CancellationToken,
) -> Result<()> {
    // The binary has to outlive this process
    config.workspace.keep = true;

    let mut tool = tool_from_config(name, &config)?;
    let path = tool.setup(cancel).await?.to_path_buf();

    let verified = if verify {
        Some(tool.verify(cancel).await?)
    } else {
        None
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "tool": name,
                "strategy": tool.strategy_kind(),
                "path": path,
                "verify": verified,
            }))?
        );
    } else {
        println!("{}", path.display());
        if let Some(result) = &verified {
            if result.success {
                if let Some(output) = &result.output {
                    eprintln!("{} {}", "✓".green(), output);
                }
            } else {
                eprintln!(
                    "{} {}",
                    "✗".red(),
                    result.error.as_deref().unwrap_or("verification failed")
                );
            }
        }
    }

    Ok(())
}

async fn check_tools(config: &Config, cancel: &CancellationToken, json: bool) -> Result<()> {
    if config.tools.is_empty() {
        if json {
            println!("[]");
        } else {
            println!("No tools configured.");
        }
        return Ok(());
    }

    if !json {
        println!("Checking configured tools...\n");
    }

    let mut results = Vec::new();
    let mut failed = 0;

    for name in config.tools.keys() {
        let mut tool = tool_from_config(name, config)?;

        let outcome = match tool.setup(cancel).await {
            Ok(path) => {
                let path = path.to_path_buf();
                tool.verify(cancel).await.map(|v| (path, v))
            }
            Err(e) => Err(e),
        };
        if let Err(e) = tool.destroy() {
            tracing::warn!(tool = %name, error = %e, "Failed to clean up tool");
        }

        let (path, verified) = match outcome {
            Ok(ok) => ok,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                failed += 1;
                if json {
                    results.push(serde_json::json!({
                        "tool": name,
                        "success": false,
                        "error": e.to_string(),
                    }));
                } else {
                    println!("{} {}", "✗".red(), name);
                    println!("  Error: {}", e);
                    println!();
                }
                continue;
            }
        };

        if !verified.success {
            failed += 1;
        }

        if json {
            results.push(serde_json::json!({
                "tool": name,
                "success": verified.success,
                "path": path,
                "verify": verified,
            }));
        } else {
            let status_icon = if verified.success { "✓".green() } else { "✗".red() };
            println!("{} {}", status_icon, name);
            println!("  Path: {}", path.display());
            if let Some(output) = &verified.output {
                println!("  Version: {}", output);
            }
            if let Some(err) = &verified.error {
                println!("  Error: {}", err);
            }
            println!();
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }

    if failed > 0 {
        return Err(Error::TestAssertion(format!(
            "{} of {} tools failed",
            failed,
            config.tools.len()
        )));
    }
    Ok(())
}

fn list_tools(config: &Config, json: bool) -> Result<()> {
    if json {
        let results: Vec<_> = config
            .tools
            .iter()
            .map(|(name, strategy)| {
                serde_json::json!({
                    "tool": name,
                    "strategy": strategy.kind(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if config.tools.is_empty() {
        println!("No tools configured. Unconfigured tools are looked up on PATH.");
        return Ok(());
    }

    println!("Configured tools:\n");
    for (name, strategy) in &config.tools {
        println!("  {:<20} {}", name, strategy.kind().to_string().dimmed());
    }
    Ok(())
}
