mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{compose, serve, ComposeArgs, ServeArgs};
use tracing_subscriber::EnvFilter;

/// Scribe - AI-assisted publicity writing
#[derive(Parser, Debug)]
#[command(name = "scribe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP generation API
    Serve(ServeArgs),

    /// Generate one document in the terminal
    Compose(ComposeArgs),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Compose(args) => compose(args).await,
    };

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
