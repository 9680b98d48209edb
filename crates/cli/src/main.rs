// SPDX-License-Identifier: MIT

//! `oj` — operator CLI for the job orchestrator. Talks to the filesystem
//! queue and artifact store directly; there is no daemon IPC surface, so
//! this binary works whether or not `ojd` is currently running.

mod commands;
mod exit_error;
mod output;

use clap::{Parser, Subcommand};
use exit_error::ExitError;
use output::OutputFormat;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "oj", version, about = "Operator CLI for the job orchestrator")]
struct Cli {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate and enqueue a job spec file.
    Submit { path: PathBuf },
    /// Print a job's result, once it has one.
    Result { job_id: String },
    /// Release a job held in awaiting_approval back to pending.
    Approve { job_id: String },
    /// Force a job stuck in running back to pending.
    Unlock { job_id: String },
    /// Show queue depth, or one job's current state.
    Status { job_id: Option<String> },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("warn"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match &cli.command {
        Command::Submit { path } => commands::submit::handle(path, cli.format),
        Command::Result { job_id } => commands::result::handle(job_id, cli.format),
        Command::Approve { job_id } => commands::approve::handle(job_id, cli.format),
        Command::Unlock { job_id } => commands::unlock::handle(job_id, cli.format),
        Command::Status { job_id } => commands::status::handle(job_id.as_deref(), cli.format),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(exit_err) = err.downcast_ref::<ExitError>() {
                eprintln!("error: {}", exit_err.message);
                ExitCode::from(exit_err.code as u8)
            } else {
                eprintln!("error: {err:#}");
                ExitCode::FAILURE
            }
        }
    }
}
