// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! aether: thin client for the Aether coordinator.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod commands;
mod exit_error;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "aether", version, about = "Aether workflow orchestration")]
struct Cli {
    /// Coordinator address for client commands
    #[arg(long, global = true, default_value = "127.0.0.1:7070")]
    addr: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the coordinator server
    Serve(commands::serve::ServeArgs),

    /// Show a workflow's status
    Status {
        workflow_id: String,
    },

    /// Cancel a workflow
    Cancel {
        workflow_id: String,
    },

    /// Workflow queries
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommand,
    },

    /// Scaffold a new Aether project
    Init {
        name: String,
        /// Directory to create the project in (default: current directory)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum WorkflowCommand {
    /// List workflows known to the coordinator
    List {
        /// Only workflows of this type
        #[arg(long = "type")]
        workflow_type: Option<String>,
        /// Only workflows in this state
        #[arg(long)]
        state: Option<String>,
    },
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => commands::serve::run(args).await,
        Command::Status { workflow_id } => commands::status::run(&cli.addr, &workflow_id).await,
        Command::Cancel { workflow_id } => commands::cancel::run(&cli.addr, &workflow_id).await,
        Command::Workflow { command } => match command {
            WorkflowCommand::List { workflow_type, state } => {
                commands::workflow::list(&cli.addr, workflow_type, state).await
            }
        },
        Command::Init { name, output } => commands::init::run(&name, output.as_deref()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => exit_error::report(&e),
    }
}
