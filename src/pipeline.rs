//! Job drivers for the `orthologs`, `filter` and `integrate` commands

use crate::collaborators::{ensure_output, Aligner, SequenceMerger, TreeBuilder};
use crate::fasta::{get_alignment_stats, parse_fasta_file};
use crate::filter::{FilterEngine, FilterSummary};
use crate::logging::log_family_resolution;
use crate::orthology::{parse_orthology_file, OrthologyReport};
use crate::output::{write_link_file, write_species_only_table, OrthologyWriter};
use crate::resolver::{MaximalGroupRegistry, OrthologyResolver};
use crate::species::{family_name, list_files_with_suffix, SpeciesIndex};
use crate::tree::{parse_newick_file, write_newick_file, TreeDistanceOracle};
use crate::types::{CurateError, FilterConfig, ParseMode, Result};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const ORTHOLOGY_SUFFIX: &str = "orthologs.txt";

/// Working directory for intermediate files
///
/// A temporary directory is removed when dropped, on success and on failure
/// alike. A user-supplied directory is created if needed and kept.
pub enum ScratchDir {
    Temporary(TempDir),
    Kept(PathBuf),
}

impl ScratchDir {
    pub fn new(keep: Option<&Path>) -> Result<Self> {
        match keep {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                info!("Keeping intermediate files in {}", dir.display());
                Ok(ScratchDir::Kept(dir.to_path_buf()))
            }
            None => {
                let dir = tempfile::Builder::new().prefix("orthocurate").tempdir()?;
                debug!("Using temporary directory {}", dir.path().display());
                Ok(ScratchDir::Temporary(dir))
            }
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ScratchDir::Temporary(dir) => dir.path(),
            ScratchDir::Kept(dir) => dir,
        }
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }
}

/// `<prefix><suffix>`, keeping any dots already in the prefix
pub fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut path = OsString::from(prefix.as_os_str());
    path.push(suffix);
    PathBuf::from(path)
}

/// Create the directory an output prefix points into
pub fn prepare_prefix(prefix: &Path) -> Result<()> {
    if let Some(parent) = prefix.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(CurateError::MissingInput(path.to_path_buf()))
    }
}

/// Concatenate text files, making sure each one ends with a newline
pub fn concatenate_files<P: AsRef<Path>>(inputs: &[P], output: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(output)?);
    for input in inputs {
        let input = input.as_ref();
        require_file(input)?;
        let content = fs::read(input)?;
        writer.write_all(&content)?;
        if !content.is_empty() && !content.ends_with(b"\n") {
            writer.write_all(b"\n")?;
        }
    }
    writer.flush()?;
    debug!("Concatenated {} files into {}", inputs.len(), output.display());
    Ok(())
}

/// Consolidation of per-family orthology reports
#[derive(Debug, Clone)]
pub struct OrthologsJob {
    pub out_dir: PathBuf,
    pub link_dir: PathBuf,
    pub orthology_dir: Option<PathBuf>,
    pub refinement_species: HashSet<String>,
    pub mode: ParseMode,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrthologsOutcome {
    pub families: usize,
    pub rows: usize,
    pub maximal_groups: usize,
}

impl std::fmt::Display for OrthologsOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Families: {}, Rows: {}, Maximal groups: {}",
            self.families, self.rows, self.maximal_groups
        )
    }
}

pub fn run_orthologs_job(job: &OrthologsJob) -> Result<OrthologsOutcome> {
    fs::create_dir_all(&job.out_dir)?;

    info!("Step 1: Loading sequence-species links");
    let links = SpeciesIndex::load_dir(&job.link_dir, job.mode)?;

    let Some(orthology_dir) = &job.orthology_dir else {
        info!("Step 2: No orthology directory given, writing species table only");
        write_species_only_table(&job.out_dir, &links)?;
        return Ok(OrthologsOutcome {
            rows: links.len(),
            ..OrthologsOutcome::default()
        });
    };

    info!("Step 2: Parsing orthology reports");
    let files = list_files_with_suffix(orthology_dir, ORTHOLOGY_SUFFIX)?;
    let reports: Vec<(String, OrthologyReport)> = files
        .par_iter()
        .map(|path| -> Result<(String, OrthologyReport)> {
            Ok((family_name(path), parse_orthology_file(path, job.mode)?))
        })
        .collect::<Result<_>>()?;
    info!("Parsed {} orthology reports", reports.len());

    info!("Step 3: Resolving orthology groups");
    let resolver = OrthologyResolver::new(&links, &job.refinement_species);
    let mut registry = MaximalGroupRegistry::new();
    let mut writer = OrthologyWriter::new(&job.out_dir)?;
    let mut outcome = OrthologsOutcome::default();

    for (family, report) in &reports {
        if report.groups.is_empty() {
            warn!("Family {} has no orthology relationship", family);
            continue;
        }
        let resolved =
            resolver.resolve_family(family, &report.groups, &report.sequences, &mut registry)?;
        log_family_resolution(
            family,
            report.sequences.len(),
            report.groups.group_count(),
            registry.len(),
        );
        writer.write_family(&resolved)?;
        outcome.families += 1;
    }

    outcome.rows = writer.finish()?;
    outcome.maximal_groups = registry.len();
    Ok(outcome)
}

/// Tree-guided filtering of one family alignment
#[derive(Debug, Clone)]
pub struct FilterJob {
    pub alignment: PathBuf,
    pub tree: PathBuf,
    pub links: PathBuf,
    pub prefix: PathBuf,
    pub refinement_species: HashSet<String>,
    pub config: FilterConfig,
    pub realign: bool,
    pub resolve_polytomy: bool,
    pub scratch: Option<PathBuf>,
    pub mode: ParseMode,
}

/// Files written by a filter or integrate job
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutputs {
    pub alignment: PathBuf,
    pub tree: PathBuf,
    pub links: PathBuf,
}

impl JobOutputs {
    pub fn from_prefix(prefix: &Path) -> Self {
        Self {
            alignment: with_suffix(prefix, ".fa"),
            tree: with_suffix(prefix, ".tree"),
            links: with_suffix(prefix, ".sp2seq.txt"),
        }
    }
}

fn copy_through(job: &FilterJob, outputs: &JobOutputs) -> Result<()> {
    for (from, to) in [
        (&job.alignment, &outputs.alignment),
        (&job.tree, &outputs.tree),
        (&job.links, &outputs.links),
    ] {
        fs::copy(from, to)?;
    }
    info!("Inputs copied unchanged to {}", outputs.alignment.display());
    Ok(())
}

pub fn run_filter_job(
    job: &FilterJob,
    aligner: &dyn Aligner,
    tree_builder: &dyn TreeBuilder,
) -> Result<FilterSummary> {
    for input in [&job.alignment, &job.tree, &job.links] {
        require_file(input)?;
    }
    prepare_prefix(&job.prefix)?;
    let outputs = JobOutputs::from_prefix(&job.prefix);

    info!("Step 1: Loading alignment and species links");
    let alignment = parse_fasta_file(&job.alignment)?;
    info!("Alignment: {}", get_alignment_stats(&alignment));
    let links = SpeciesIndex::from_files(&[&job.links], job.mode)?;

    if job.config.threshold <= 0.0 {
        info!("Threshold is {}, nothing to filter", job.config.threshold);
        copy_through(job, &outputs)?;
        return Ok(FilterSummary {
            kept: links.iter().map(|(sequence, _)| sequence.to_string()).collect(),
            ..FilterSummary::default()
        });
    }

    info!("Step 2: Measuring overlap with the closest reference sequences");
    let oracle = TreeDistanceOracle::new(parse_newick_file(&job.tree)?)?;
    let summary =
        FilterEngine::new(job.config.clone()).filter(&alignment, &links, &oracle, &job.refinement_species)?;
    info!("Filtering complete: {}", summary);

    if !summary.has_discards() {
        copy_through(job, &outputs)?;
        return Ok(summary);
    }

    info!("Step 3: Writing filtered alignment");
    let keep: HashSet<String> = alignment
        .ids()
        .filter(|id| !summary.discarded.contains(*id))
        .map(str::to_string)
        .collect();
    let filtered = alignment.subset(&keep);

    if job.realign {
        let scratch = ScratchDir::new(job.scratch.as_deref())?;
        let unaligned = scratch.join("filtered.unaligned.fa");
        filtered.dealign().write_fasta_file(&unaligned)?;
        aligner.align(&unaligned, &outputs.alignment)?;
    } else {
        filtered.write_fasta_file(&outputs.alignment)?;
    }
    write_link_file(&outputs.links, &links.without(&summary.discarded))?;

    info!("Step 4: Building tree of the filtered alignment");
    tree_builder.build_tree(&outputs.alignment, &outputs.tree)?;
    if job.resolve_polytomy {
        let tree = parse_newick_file(&outputs.tree)?;
        if tree.max_degree() > 2 {
            write_newick_file(&outputs.tree, &tree.resolve_polytomies())?;
            debug!("Resolved polytomies in {}", outputs.tree.display());
        }
    }
    ensure_output("tree builder", &outputs.tree)?;

    info!("Filtered outputs written with prefix {}", job.prefix.display());
    Ok(summary)
}

/// Addition of new sequences to an existing family alignment
#[derive(Debug, Clone)]
pub struct IntegrateJob {
    pub alignment: PathBuf,
    pub new_sequences: Vec<PathBuf>,
    pub link_files: Vec<PathBuf>,
    pub prefix: PathBuf,
    pub scratch: Option<PathBuf>,
}

pub fn run_integrate_job(
    job: &IntegrateJob,
    aligner: &dyn Aligner,
    tree_builder: &dyn TreeBuilder,
    merger: &dyn SequenceMerger,
) -> Result<JobOutputs> {
    require_file(&job.alignment)?;
    prepare_prefix(&job.prefix)?;
    let outputs = JobOutputs::from_prefix(&job.prefix);
    let scratch = ScratchDir::new(job.scratch.as_deref())?;

    let final_input = if !job.new_sequences.is_empty() && !job.link_files.is_empty() {
        info!("Step 1: Adding {} sequence files to the alignment", job.new_sequences.len());
        let new_sequences = scratch.join("new_sequences.fa");
        concatenate_files(&job.new_sequences, &new_sequences)?;
        let links = scratch.join("all.sp2seq.txt");
        concatenate_files(&job.link_files, &links)?;

        let added = scratch.join("added.fa");
        aligner.add_sequences(&job.alignment, &new_sequences, &added)?;

        info!("Step 2: Merging same-species sequences");
        let added_tree = scratch.join("added.tree");
        tree_builder.build_tree(&added, &added_tree)?;
        let merged = scratch.join("merged.fa");
        merger.merge(&added, &added_tree, &links, &merged)?;

        let merged_store = parse_fasta_file(&merged)?;
        let kept: HashSet<String> = merged_store.ids().map(str::to_string).collect();
        let all_links = SpeciesIndex::from_files(&[&links], ParseMode::Tolerant)?;
        let removed: HashSet<String> = all_links
            .iter()
            .map(|(sequence, _)| sequence)
            .filter(|sequence| !kept.contains(*sequence))
            .map(str::to_string)
            .collect();
        write_link_file(&outputs.links, &all_links.without(&removed))?;
        merged
    } else {
        if !job.new_sequences.is_empty() || !job.link_files.is_empty() {
            warn!("New sequences need both FASTA and link files, realigning the input only");
        }
        job.alignment.clone()
    };

    info!("Step 3: Realigning");
    let unaligned = scratch.join("final.unaligned.fa");
    parse_fasta_file(&final_input)?
        .dealign()
        .write_fasta_file(&unaligned)?;
    aligner.align(&unaligned, &outputs.alignment)?;
    info!(
        "Final alignment: {}",
        get_alignment_stats(&parse_fasta_file(&outputs.alignment)?)
    );

    info!("Step 4: Building final tree");
    tree_builder.build_tree(&outputs.alignment, &outputs.tree)?;
    ensure_output("tree builder", &outputs.tree)?;

    Ok(outputs)
}
