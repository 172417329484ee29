//! Core error type and configuration structures

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while curating a gene family
#[derive(Error, Debug)]
pub enum CurateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing input file: {0}")]
    MissingInput(PathBuf),

    #[error("Lookup failure: {0}")]
    Lookup(String),

    #[error("Degenerate computation: {0}")]
    DegenerateComputation(String),

    #[error("{tool} failed: {message}")]
    Collaborator { tool: String, message: String },

    #[error("FASTA parsing error: {0}")]
    FastaParse(String),

    #[error("Link file parsing error: {0}")]
    LinkParse(String),

    #[error("Orthology report parsing error: {0}")]
    OrthologyParse(String),

    #[error("Newick parsing error: {0}")]
    NewickParse(String),

    #[error("Invalid alignment: {0}")]
    InvalidAlignment(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CurateError>;

/// How ad hoc text records (link lines, orthology lines) are validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Skip malformed records, logging them at debug level
    #[default]
    Tolerant,
    /// Report the first malformed record as an error
    Strict,
}

impl std::fmt::Display for ParseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseMode::Tolerant => write!(f, "tolerant"),
            ParseMode::Strict => write!(f, "strict"),
        }
    }
}

impl std::str::FromStr for ParseMode {
    type Err = CurateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tolerant" => Ok(ParseMode::Tolerant),
            "strict" => Ok(ParseMode::Strict),
            _ => Err(CurateError::InvalidInput(format!("Invalid parse mode: {}", s))),
        }
    }
}

/// Which reference is chosen when several are equally close to a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// Keep the last-scanned reference whose distance is <= the best so far
    #[default]
    LastWithinTolerance,
    /// Keep the first-scanned reference at the strictly smallest distance
    NearestFirstSeen,
}

impl std::fmt::Display for TieBreak {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TieBreak::LastWithinTolerance => write!(f, "last"),
            TieBreak::NearestFirstSeen => write!(f, "first"),
        }
    }
}

impl std::str::FromStr for TieBreak {
    type Err = CurateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "last" => Ok(TieBreak::LastWithinTolerance),
            "first" => Ok(TieBreak::NearestFirstSeen),
            _ => Err(CurateError::InvalidInput(format!("Invalid tie-break policy: {}", s))),
        }
    }
}

/// Configuration parameters for tree-guided filtering
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Percentage (0-100); a candidate is kept only when its overlap is strictly greater
    pub threshold: f64,
    pub tie_break: TieBreak,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            tie_break: TieBreak::default(),
        }
    }
}

/// External programs and the deadline applied to each invocation
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub aligner: PathBuf,
    pub tree_builder: PathBuf,
    pub merger: PathBuf,
    pub timeout: Duration,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            aligner: PathBuf::from("mafft"),
            tree_builder: PathBuf::from("FastTree"),
            merger: PathBuf::from("phylomerge"),
            timeout: Duration::from_secs(3600),
        }
    }
}

/// Parse a comma-separated species list, ignoring empty entries
pub fn parse_species_list(list: &str) -> std::collections::HashSet<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
