//! bronze: load database tables and delimited files into a DuckDB landing store.
//!
//! Exit codes: 0 when every source loaded, 1 when the run finished with
//! failed sources, 2 when the run could not start or a command failed.

use bronze_logging::{init_logging, LogConfig};
use clap::{Parser, Subcommand};
use std::process::ExitCode;

mod cli;

use cli::query::QueryArgs;
use cli::run::RunArgs;
use cli::tables::TablesArgs;

#[derive(Parser, Debug)]
#[command(
    name = "bronze",
    version,
    about = "Full-refresh ingestion of raw sources into a DuckDB landing store"
)]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load every configured source into the landing store
    Run(RunArgs),

    /// List landing tables with row counts and columns
    Tables(TablesArgs),

    /// Run read-only SQL against the landing store
    Query(QueryArgs),
}

fn command_wants_json(command: &Commands) -> bool {
    match command {
        Commands::Run(args) => args.json,
        Commands::Tables(args) => args.json,
        Commands::Query(args) => args.json,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json_mode = command_wants_json(&cli.command);

    if let Err(err) = init_logging(LogConfig {
        app_name: "bronze",
        verbose: cli.verbose,
        quiet: json_mode,
    }) {
        eprintln!("Warning: failed to initialize logging: {:#}", err);
    }

    let result = match cli.command {
        Commands::Run(args) => cli::run::run(args),
        Commands::Tables(args) => cli::tables::run(args),
        Commands::Query(args) => cli::query::run(args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            if json_mode {
                cli::error::print_json_error(&err);
            } else if let Some(helpful) = err.downcast_ref::<cli::error::HelpfulError>() {
                eprint!("{}", helpful);
            } else {
                eprintln!("ERROR: {:#}", err);
            }
            ExitCode::from(cli::EXIT_FAILURE)
        }
    }
}
