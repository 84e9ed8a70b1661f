//! pgclone operator CLI
//!
//! Inspect and maintain the template and clone databases that test suites
//! create through the `pgclone` library:
//! - `fingerprint`: template name for a schema file, offline
//! - `warm`: create the template ahead of a test run
//! - `list`: templates and clones for a base name
//! - `release`: drop a template
//! - `prune`: drop orphaned clones

use clap::{Parser, Subcommand};
use pgclone_logging::{init_logging, LogConfig};
use std::process::ExitCode;

mod cli;

use cli::{ServerArgs, TemplateArgs};

#[derive(Parser, Debug)]
#[command(name = "pgclone", version, about = "Manage pgclone template and clone databases")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(flatten)]
    server: ServerArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the schema fingerprint and template name (no server needed)
    Fingerprint {
        #[command(flatten)]
        template: TemplateArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create the template database if it does not exist yet
    Warm {
        #[command(flatten)]
        template: TemplateArgs,
    },

    /// List templates and clones belonging to a base name
    List {
        /// Base name the databases were created with
        #[arg(short, long)]
        base: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Drop the template database for a schema
    Release {
        #[command(flatten)]
        template: TemplateArgs,
    },

    /// Drop clones with no active connections (left behind by leaks or crashes)
    Prune {
        /// Base name the clones were created with
        #[arg(short, long)]
        base: String,

        /// Show what would be dropped without dropping anything
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(LogConfig {
        app_name: "pgclone",
        verbose: cli.verbose,
    }) {
        eprintln!("Warning: {:#}", err);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Fingerprint { template, json } => cli::fingerprint::run(&template, json),
        Commands::Warm { template } => cli::block_on(cli::template::warm(&cli.server, &template)),
        Commands::List { base, json } => cli::block_on(cli::databases::list(&cli.server, &base, json)),
        Commands::Release { template } => cli::block_on(cli::template::release(&cli.server, &template)),
        Commands::Prune { base, dry_run } => cli::block_on(cli::databases::prune(&cli.server, &base, dry_run)),
    }
}
