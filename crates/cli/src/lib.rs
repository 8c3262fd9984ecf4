pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "casedesk",
    about = "Casedesk operator CLI",
    long_about = "Inspect configuration, check readiness, prepare the record store and run the lead worker by hand.",
    after_help = "Examples:\n  casedesk doctor --json\n  casedesk seed\n  casedesk process"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and create the sheet layout")]
    Migrate,
    #[command(about = "Load the default dialogue, lawyer roster and system settings (idempotent)")]
    Seed,
    #[command(about = "Run one lead processing cycle and report per-lead outcomes")]
    Process,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, messaging and text generation readiness, and the store")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Process => commands::process::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
