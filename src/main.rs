//! MicroScript client - run, REPL and debug MicroScript programs
//!
//! Thin terminal front end over the `microscript` library: parses
//! arguments, sets up logging and hands off to the command dispatcher.

use clap::Parser;
use commands::Commands;
use microscript::{cli, commands, common::logging};

#[derive(Parser)]
#[command(name = "microscript", about = "MicroScript IDE client")]
#[command(version, long_about = None)]
struct Cli {
    /// Engine base URL (overrides the config file)
    #[arg(long, global = true)]
    engine: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Interactive sessions keep stderr free for the prompt
    let guard = match cli.command {
        Commands::Repl | Commands::Debug { .. } => logging::init_interactive().map(|(_, guard)| guard),
        _ => {
            logging::init_cli();
            None
        }
    };

    if let Err(e) = cli::dispatch(cli.command, cli.engine).await {
        // Flush the log file before exiting
        drop(guard);
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
