mod commands;
mod report;

use clap::{Parser, Subcommand};
use anyhow::Result;

#[derive(Parser)]
#[command(name = "arbiter-cli")]
#[command(about = "Arbiter CLI - Grade judged test case results against expectations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade a recorded judging run and check it against expectations
    Grade {
        /// Path to the problem file (JSON)
        #[arg(short, long)]
        problem: String,

        /// External grader program; defaults to the builtin grader
        #[arg(short, long)]
        grader: Option<String>,

        /// Maximum test group depth shown in the verdict tree
        #[arg(long, default_value = "3")]
        max_depth: usize,
    },
}

fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Grade { problem, grader, max_depth } => {
            let all_expected = commands::run_grade(&problem, grader.as_deref(), max_depth)?;
            if !all_expected {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
