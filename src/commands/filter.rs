use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::time::Duration;

use orthocurate::{
    collaborators::{FastTree, Mafft},
    logging::init_logger,
    pipeline::{run_filter_job, FilterJob},
    types::{parse_species_list, CurateError, FilterConfig, ParseMode, TieBreak, ToolConfig},
};

/// Remove poorly aligned refinement-species sequences from a family alignment
#[derive(Parser)]
pub struct FilterCommand {
    /// Input family alignment (FASTA)
    #[arg(short = 'a', long = "alignment", value_name = "FILE")]
    alignment: PathBuf,

    /// Input family tree (Newick)
    #[arg(long = "tree", value_name = "FILE")]
    tree: PathBuf,

    /// Species-to-sequence link file (species:sequence lines)
    #[arg(short = 'l', long = "links", value_name = "FILE")]
    links: PathBuf,

    /// Output prefix; writes <prefix>.fa, <prefix>.tree and <prefix>.sp2seq.txt
    #[arg(short = 'o', long = "output", value_name = "PREFIX")]
    prefix: PathBuf,

    /// Comma-separated list of species whose sequences are under refinement
    #[arg(short = 'r', long = "refinement-species", value_name = "LIST")]
    refinement_species: String,

    /// Minimum ungapped overlap (%) with the closest reference; 0 disables filtering
    #[arg(long = "threshold", value_name = "PERCENT", default_value = "0")]
    threshold: f64,

    /// Nearest-reference tie-break: last or first
    #[arg(long = "tie-break", value_name = "POLICY", default_value = "last")]
    tie_break: String,

    /// Realign the filtered sequences
    #[arg(long = "realign")]
    realign: bool,

    /// Resolve polytomies of the rebuilt tree
    #[arg(long = "resolve-polytomy")]
    resolve_polytomy: bool,

    /// Keep intermediate files in this directory
    #[arg(long = "tmp", value_name = "DIR")]
    tmp: Option<PathBuf>,

    /// Aligner program
    #[arg(long = "mafft", value_name = "PROGRAM", default_value = "mafft")]
    mafft: PathBuf,

    /// Tree builder program
    #[arg(long = "fasttree", value_name = "PROGRAM", default_value = "FastTree")]
    fasttree: PathBuf,

    /// Deadline for each external program (seconds)
    #[arg(long = "timeout", value_name = "SECONDS", default_value = "3600")]
    timeout: u64,

    /// Input parsing mode: tolerant or strict
    #[arg(long = "parse-mode", value_name = "MODE", default_value = "tolerant")]
    parse_mode: String,

    /// Verbose output (shows warnings and debug info)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Log file path (optional, records every keep/discard decision)
    #[arg(long = "log-file", value_name = "FILE")]
    log_file: Option<PathBuf>,
}

impl FilterCommand {
    pub fn run(self) -> Result<()> {
        init_logger(self.verbose, self.log_file.as_deref())?;

        info!("Starting orthocurate filter v{}", env!("CARGO_PKG_VERSION"));
        info!("Input alignment: {}", self.alignment.display());
        info!("Input tree: {}", self.tree.display());
        info!("Input links: {}", self.links.display());
        info!("Output prefix: {}", self.prefix.display());

        for file in [&self.alignment, &self.tree, &self.links] {
            if !file.exists() {
                return Err(CurateError::MissingInput(file.clone()).into());
            }
        }
        info!("All input files validated successfully");

        if !(0.0..=100.0).contains(&self.threshold) {
            return Err(CurateError::InvalidInput(format!(
                "Threshold must be between 0 and 100, got {}",
                self.threshold
            ))
            .into());
        }
        let tie_break: TieBreak = self.tie_break.parse()?;
        let mode: ParseMode = self.parse_mode.parse()?;

        let tools = ToolConfig {
            aligner: self.mafft,
            tree_builder: self.fasttree,
            timeout: Duration::from_secs(self.timeout),
            ..ToolConfig::default()
        };
        let aligner = Mafft::new(&tools).with_max_iterate(1000);
        let tree_builder = FastTree::new(&tools);

        let job = FilterJob {
            alignment: self.alignment,
            tree: self.tree,
            links: self.links,
            prefix: self.prefix,
            refinement_species: parse_species_list(&self.refinement_species),
            config: FilterConfig {
                threshold: self.threshold,
                tie_break,
            },
            realign: self.realign,
            resolve_polytomy: self.resolve_polytomy,
            scratch: self.tmp,
            mode,
        };

        let summary = run_filter_job(&job, &aligner, &tree_builder)?;
        info!("Filtering completed successfully: {}", summary);
        Ok(())
    }
}
