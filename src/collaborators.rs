//! External aligner, tree builder and sequence merger
//!
//! Each program runs as a blocking child process with a deadline. A non-zero
//! exit, an expired deadline or a missing/empty declared output file is a
//! [`CurateError::Collaborator`] carrying the captured error stream.

use crate::types::{CurateError, Result, ToolConfig};
use log::{debug, info};
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::Read;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STDERR_GRACE: Duration = Duration::from_secs(1);

/// Produces multiple sequence alignments
pub trait Aligner {
    /// Align (or realign) the sequences of `input` into `output`
    fn align(&self, input: &Path, output: &Path) -> Result<()>;

    /// Add the sequences of `new_sequences` to `alignment`, writing `output`
    fn add_sequences(&self, alignment: &Path, new_sequences: &Path, output: &Path) -> Result<()>;
}

/// Builds a phylogenetic tree from an alignment
pub trait TreeBuilder {
    fn build_tree(&self, alignment: &Path, output: &Path) -> Result<()>;
}

/// Merges sequences of the same species that are close in the tree
pub trait SequenceMerger {
    fn merge(&self, alignment: &Path, tree: &Path, links: &Path, output: &Path) -> Result<()>;
}

fn collaborator_error(tool: &str, message: impl Into<String>) -> CurateError {
    CurateError::Collaborator {
        tool: tool.to_string(),
        message: message.into(),
    }
}

/// Locate `program` on `PATH` unless it already names a path
pub fn resolve_program(tool: &str, program: &Path) -> Result<PathBuf> {
    let has_dir = program
        .parent()
        .map(|p| !p.as_os_str().is_empty())
        .unwrap_or(false);
    if has_dir {
        if program.is_file() {
            return Ok(program.to_path_buf());
        }
        return Err(collaborator_error(
            tool,
            format!("{} does not exist", program.display()),
        ));
    }
    which::which(program).map_err(|e| collaborator_error(tool, format!("{}: {}", program.display(), e)))
}

/// Fail unless `path` exists and is not empty
pub fn ensure_output(tool: &str, path: &Path) -> Result<()> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(collaborator_error(tool, format!("{} is empty", path.display()))),
        Err(_) => Err(collaborator_error(
            tool,
            format!("{} was not produced", path.display()),
        )),
    }
}

/// Run `program` to completion, optionally redirecting its stdout to a file,
/// and kill it when `timeout` expires.
pub fn run_tool(
    tool: &str,
    program: &Path,
    args: &[OsString],
    stdout_to: Option<&Path>,
    timeout: Duration,
) -> Result<()> {
    let executable = resolve_program(tool, program)?;
    debug!(
        "Running '{} {}'",
        executable.display(),
        args.iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let stdout = match stdout_to {
        Some(path) => Stdio::from(File::create(path)?),
        None => Stdio::null(),
    };

    let mut command = Command::new(&executable);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(Stdio::piped());
    // launcher scripts fork the real program; a fresh group lets a timeout reach it
    #[cfg(unix)]
    command.process_group(0);

    let start = Instant::now();
    let mut child = command
        .spawn()
        .map_err(|e| collaborator_error(tool, format!("failed to start: {}", e)))?;

    // drained on a separate thread so a chatty child cannot block on a full pipe
    let stderr_reader = child.stderr.take().map(|mut stderr| {
        thread::spawn(move || {
            let mut captured = String::new();
            let _ = stderr.read_to_string(&mut captured);
            captured
        })
    });
    let collect_stderr = |reader: Option<thread::JoinHandle<String>>| {
        reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    };

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if start.elapsed() >= timeout {
            terminate(&mut child);
            // a descendant outside the group may still hold the pipe open
            let grace = Instant::now();
            let finished = stderr_reader.as_ref().map_or(true, |reader| {
                while !reader.is_finished() && grace.elapsed() < STDERR_GRACE {
                    thread::sleep(POLL_INTERVAL);
                }
                reader.is_finished()
            });
            let stderr = if finished {
                collect_stderr(stderr_reader)
            } else {
                String::new()
            };
            return Err(collaborator_error(
                tool,
                format!(
                    "timed out after {:.1}s. {}",
                    timeout.as_secs_f64(),
                    stderr.trim()
                ),
            ));
        }
        thread::sleep(POLL_INTERVAL);
    };

    let stderr = collect_stderr(stderr_reader);
    if !status.success() {
        return Err(collaborator_error(
            tool,
            format!("exited with {}: {}", status, stderr.trim()),
        ));
    }

    info!("{} finished in {:.1}s", tool, start.elapsed().as_secs_f64());
    Ok(())
}

/// Kill the child together with every process of its group
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(group) = libc::pid_t::try_from(child.id()) {
            // SAFETY: killpg only sends a signal; the group id is the child's own pid
            unsafe {
                libc::killpg(group, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn os(value: impl AsRef<OsStr>) -> OsString {
    value.as_ref().to_os_string()
}

/// MAFFT multiple sequence aligner
#[derive(Debug, Clone)]
pub struct Mafft {
    pub program: PathBuf,
    pub timeout: Duration,
    /// Iterative refinement rounds; `None` lets MAFFT choose (`--auto`)
    pub max_iterate: Option<u32>,
}

impl Mafft {
    pub fn new(config: &ToolConfig) -> Self {
        Self {
            program: config.aligner.clone(),
            timeout: config.timeout,
            max_iterate: None,
        }
    }

    pub fn with_max_iterate(mut self, rounds: u32) -> Self {
        self.max_iterate = Some(rounds);
        self
    }

    fn base_args(&self) -> Vec<OsString> {
        let mut args = match self.max_iterate {
            Some(rounds) => vec![os("--maxiterate"), os(rounds.to_string())],
            None => vec![os("--auto")],
        };
        args.push(os("--quiet"));
        args
    }
}

impl Aligner for Mafft {
    fn align(&self, input: &Path, output: &Path) -> Result<()> {
        if !input.is_file() {
            return Err(CurateError::MissingInput(input.to_path_buf()));
        }
        let mut args = self.base_args();
        args.push(os(input));
        run_tool("mafft", &self.program, &args, Some(output), self.timeout)?;
        ensure_output("mafft", output)
    }

    fn add_sequences(&self, alignment: &Path, new_sequences: &Path, output: &Path) -> Result<()> {
        for input in [alignment, new_sequences] {
            if !input.is_file() {
                return Err(CurateError::MissingInput(input.to_path_buf()));
            }
        }
        let mut args = self.base_args();
        args.extend([os("--add"), os(new_sequences), os(alignment)]);
        run_tool("mafft", &self.program, &args, Some(output), self.timeout)?;
        ensure_output("mafft", output)
    }
}

/// FastTree maximum-likelihood tree builder
#[derive(Debug, Clone)]
pub struct FastTree {
    pub program: PathBuf,
    pub timeout: Duration,
    pub nucleotide: bool,
    pub gtr: bool,
    pub gamma: bool,
}

impl FastTree {
    pub fn new(config: &ToolConfig) -> Self {
        Self {
            program: config.tree_builder.clone(),
            timeout: config.timeout,
            nucleotide: true,
            gtr: true,
            gamma: false,
        }
    }

    pub fn with_gamma(mut self, gamma: bool) -> Self {
        self.gamma = gamma;
        self
    }

    fn args(&self, alignment: &Path) -> Vec<OsString> {
        let mut args = Vec::new();
        if self.nucleotide {
            args.push(os("-nt"));
        }
        if self.gtr {
            args.push(os("-gtr"));
        }
        if self.gamma {
            args.push(os("-gamma"));
        }
        args.push(os(alignment));
        args
    }
}

impl TreeBuilder for FastTree {
    fn build_tree(&self, alignment: &Path, output: &Path) -> Result<()> {
        if !alignment.is_file() {
            return Err(CurateError::MissingInput(alignment.to_path_buf()));
        }
        run_tool("FastTree", &self.program, &self.args(alignment), Some(output), self.timeout)?;
        ensure_output("FastTree", output)
    }
}

/// PhyloMerge same-species sequence merger
#[derive(Debug, Clone)]
pub struct PhyloMerge {
    pub program: PathBuf,
    pub timeout: Duration,
    pub rearrange_tree: bool,
    pub bootstrap_threshold: f64,
}

impl PhyloMerge {
    pub fn new(config: &ToolConfig) -> Self {
        Self {
            program: config.merger.clone(),
            timeout: config.timeout,
            rearrange_tree: true,
            bootstrap_threshold: 0.8,
        }
    }

    fn args(&self, alignment: &Path, tree: &Path, links: &Path, output: &Path) -> Vec<OsString> {
        let param = |key: &str, value: &OsStr| {
            let mut arg = OsString::from(format!("{}=", key));
            arg.push(value);
            arg
        };
        vec![
            param("input.sequence.file", alignment.as_os_str()),
            param("input.sequence.format", OsStr::new("Fasta")),
            param("input.tree.file", tree.as_os_str()),
            param("input.tree.format", OsStr::new("Newick")),
            param("taxon.to.sequence", links.as_os_str()),
            param(
                "rearrange.tree",
                OsStr::new(if self.rearrange_tree { "true" } else { "false" }),
            ),
            param(
                "bootstrap.threshold",
                OsStr::new(&self.bootstrap_threshold.to_string()),
            ),
            param("output.sequence.file", output.as_os_str()),
            param("output.sequence.format", OsStr::new("Fasta")),
        ]
    }
}

impl SequenceMerger for PhyloMerge {
    fn merge(&self, alignment: &Path, tree: &Path, links: &Path, output: &Path) -> Result<()> {
        for input in [alignment, tree, links] {
            if !input.is_file() {
                return Err(CurateError::MissingInput(input.to_path_buf()));
            }
        }
        let args = self.args(alignment, tree, links, output);
        run_tool("phylomerge", &self.program, &args, None, self.timeout)?;
        ensure_output("phylomerge", output)
    }
}
