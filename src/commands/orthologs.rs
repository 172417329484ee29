use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::PathBuf;

use orthocurate::{
    logging::init_logger,
    pipeline::{run_orthologs_job, OrthologsJob},
    types::{parse_species_list, CurateError, ParseMode},
};

use super::configure_threads;

/// Consolidate per-family orthology reports into ortholog tables
#[derive(Parser)]
pub struct OrthologsCommand {
    /// Output directory for all_fam.orthologs.tsv and all_fam.seq2sp.tsv
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    out_dir: PathBuf,

    /// Directory of species-to-sequence link files (*sp2seq.txt)
    #[arg(short = 'l', long = "links", value_name = "DIR")]
    link_dir: PathBuf,

    /// Directory of orthology reports (*orthologs.txt)
    #[arg(long = "orthology", value_name = "DIR")]
    orthology_dir: Option<PathBuf>,

    /// Comma-separated list of species whose sequences are under refinement
    #[arg(short = 'r', long = "refinement-species", value_name = "LIST", default_value = "")]
    refinement_species: String,

    /// Input parsing mode: tolerant or strict
    #[arg(long = "parse-mode", value_name = "MODE", default_value = "tolerant")]
    parse_mode: String,

    /// Verbose output (shows warnings and debug info)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Log file path (optional, receives every message)
    #[arg(long = "log-file", value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Number of threads used to parse orthology reports
    #[arg(short = 't', long = "threads")]
    threads: Option<usize>,
}

impl OrthologsCommand {
    pub fn run(self) -> Result<()> {
        init_logger(self.verbose, self.log_file.as_deref())?;

        info!("Starting orthocurate orthologs v{}", env!("CARGO_PKG_VERSION"));
        info!("Link directory: {}", self.link_dir.display());
        if let Some(dir) = &self.orthology_dir {
            info!("Orthology directory: {}", dir.display());
        }
        info!("Output directory: {}", self.out_dir.display());

        configure_threads(self.threads)?;

        if !self.link_dir.is_dir() {
            return Err(CurateError::MissingInput(self.link_dir.clone()).into());
        }

        let mode: ParseMode = self.parse_mode.parse()?;
        let refinement_species = parse_species_list(&self.refinement_species);
        info!("Refinement species: {}", refinement_species.len());

        let outcome = run_orthologs_job(&OrthologsJob {
            out_dir: self.out_dir,
            link_dir: self.link_dir,
            orthology_dir: self.orthology_dir,
            refinement_species,
            mode,
        })?;

        info!("Orthology consolidation complete: {}", outcome);
        Ok(())
    }
}
