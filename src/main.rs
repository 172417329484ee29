use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{
    filter::FilterCommand, integrate::IntegrateCommand, orthologs::OrthologsCommand,
};

/// orthocurate: orthology consolidation and tree-guided alignment curation
#[derive(Parser)]
#[command(name = "orthocurate")]
#[command(about = "Consolidate orthology groups and curate family alignments")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consolidate per-family orthology reports into ortholog tables
    Orthologs(OrthologsCommand),
    /// Remove poorly aligned refinement-species sequences from an alignment
    Filter(FilterCommand),
    /// Add new sequences to an alignment, merge and realign
    Integrate(IntegrateCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Orthologs(cmd) => cmd.run(),
        Commands::Filter(cmd) => cmd.run(),
        Commands::Integrate(cmd) => cmd.run(),
    }
}
