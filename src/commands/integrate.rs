use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::time::Duration;

use orthocurate::{
    collaborators::{FastTree, Mafft, PhyloMerge},
    logging::init_logger,
    pipeline::{run_integrate_job, IntegrateJob},
    types::{CurateError, ToolConfig},
};

/// Add new sequences to a family alignment, merge same-species sequences and realign
#[derive(Parser)]
pub struct IntegrateCommand {
    /// Input family alignment (FASTA)
    #[arg(short = 'a', long = "alignment", value_name = "FILE")]
    alignment: PathBuf,

    /// FASTA file of new sequences (repeatable)
    #[arg(short = 'n', long = "new-sequences", value_name = "FILE")]
    new_sequences: Vec<PathBuf>,

    /// Species-to-sequence link file covering old and new sequences (repeatable)
    #[arg(short = 'l', long = "links", value_name = "FILE")]
    links: Vec<PathBuf>,

    /// Output prefix; writes <prefix>.fa and <prefix>.tree
    #[arg(short = 'o', long = "output", value_name = "PREFIX")]
    prefix: PathBuf,

    /// Keep intermediate files in this directory
    #[arg(long = "tmp", value_name = "DIR")]
    tmp: Option<PathBuf>,

    /// Aligner program
    #[arg(long = "mafft", value_name = "PROGRAM", default_value = "mafft")]
    mafft: PathBuf,

    /// Tree builder program
    #[arg(long = "fasttree", value_name = "PROGRAM", default_value = "FastTree")]
    fasttree: PathBuf,

    /// Same-species sequence merger program
    #[arg(long = "phylomerge", value_name = "PROGRAM", default_value = "phylomerge")]
    phylomerge: PathBuf,

    /// Deadline for each external program (seconds)
    #[arg(long = "timeout", value_name = "SECONDS", default_value = "3600")]
    timeout: u64,

    /// Verbose output (shows warnings and debug info)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Log file path (optional, receives every message)
    #[arg(long = "log-file", value_name = "FILE")]
    log_file: Option<PathBuf>,
}

impl IntegrateCommand {
    pub fn run(self) -> Result<()> {
        init_logger(self.verbose, self.log_file.as_deref())?;

        info!("Starting orthocurate integrate v{}", env!("CARGO_PKG_VERSION"));
        info!("Input alignment: {}", self.alignment.display());
        info!("New sequence files: {}", self.new_sequences.len());
        info!("Link files: {}", self.links.len());
        info!("Output prefix: {}", self.prefix.display());

        for file in std::iter::once(&self.alignment)
            .chain(&self.new_sequences)
            .chain(&self.links)
        {
            if !file.exists() {
                return Err(CurateError::MissingInput(file.clone()).into());
            }
        }
        info!("All input files validated successfully");

        let tools = ToolConfig {
            aligner: self.mafft,
            tree_builder: self.fasttree,
            merger: self.phylomerge,
            timeout: Duration::from_secs(self.timeout),
        };

        let outputs = run_integrate_job(
            &IntegrateJob {
                alignment: self.alignment,
                new_sequences: self.new_sequences,
                link_files: self.links,
                prefix: self.prefix,
                scratch: self.tmp,
            },
            &Mafft::new(&tools),
            &FastTree::new(&tools),
            &PhyloMerge::new(&tools),
        )?;

        info!("Integration completed successfully!");
        info!("Alignment written to: {}", outputs.alignment.display());
        info!("Tree written to: {}", outputs.tree.display());
        Ok(())
    }
}
