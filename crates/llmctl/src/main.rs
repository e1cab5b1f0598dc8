//! llmctl - command-line client for llmd

use anyhow::Result;
use clap::Parser;
use llm_common::{LifecycleOp, ServiceName};
use llmctl::cli::{Cli, Commands};
use llmctl::client::LlmdClient;
use llmctl::output;
use serde::Serialize;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let client = LlmdClient::new(&cli.url)?;

    match &cli.command {
        Commands::Status { name: Some(name) } => {
            let status = client.status(name).await?;
            if cli.json {
                print_json(&status)?;
            } else {
                let service: ServiceName = name.parse()?;
                output::print_status(service, &status);
            }
        }
        Commands::Status { name: None } => {
            let statuses = client.status_all().await?;
            if cli.json {
                print_json(&statuses)?;
            } else {
                output::print_statuses(&statuses);
            }
        }
        Commands::Health => {
            let health = client.health().await?;
            if cli.json {
                print_json(&health)?;
            } else {
                output::print_health(&health);
            }
        }
        Commands::Start { name } => return lifecycle(&client, name, LifecycleOp::Start, cli.json).await,
        Commands::Stop { name } => return lifecycle(&client, name, LifecycleOp::Stop, cli.json).await,
        Commands::Restart { name } => {
            return lifecycle(&client, name, LifecycleOp::Restart, cli.json).await
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Exit status follows the daemon's verdict
async fn lifecycle(client: &LlmdClient, name: &str, op: LifecycleOp, json: bool) -> Result<ExitCode> {
    match client.lifecycle(name, op).await? {
        Ok(response) => {
            if json {
                print_json(&response)?;
            } else {
                output::print_lifecycle(&response);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            if json {
                print_json(&err)?;
            } else {
                output::print_error(&err);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
