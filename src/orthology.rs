//! Orthology report parsing
//!
//! Only lines starting with [`RELATIONSHIP_MARKER`] carry information; their
//! payload is a list of sequence ids separated by `, ` or ` <===> `. Every
//! other line of the report is ignored.

use crate::types::{CurateError, ParseMode, Result};
use log::{debug, info};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

pub const RELATIONSHIP_MARKER: &str = "ORTHOLOGY RELATIONSHIP: ";

const GROUP_SEPARATOR: &str = " <===> ";

/// A set of sequence ids asserted to be mutually orthologous
pub type OrthologyGroup = Vec<String>;

/// Orthology groups bucketed by cardinality, smallest first
#[derive(Debug, Clone, Default)]
pub struct GroupSizeIndex {
    buckets: BTreeMap<usize, Vec<OrthologyGroup>>,
}

impl GroupSizeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_group(&mut self, group: OrthologyGroup) {
        self.buckets.entry(group.len()).or_default().push(group);
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Total number of groups across all cardinalities
    pub fn group_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn min_size(&self) -> Option<usize> {
        self.buckets.keys().next().copied()
    }

    pub fn max_size(&self) -> Option<usize> {
        self.buckets.keys().next_back().copied()
    }

    pub fn groups_of_size(&self, size: usize) -> &[OrthologyGroup] {
        self.buckets.get(&size).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Buckets from the smallest cardinality upward
    pub fn ascending(&self) -> impl Iterator<Item = (usize, &[OrthologyGroup])> {
        self.buckets.iter().map(|(size, groups)| (*size, groups.as_slice()))
    }

    /// Buckets from the largest cardinality downward
    pub fn descending(&self) -> impl Iterator<Item = (usize, &[OrthologyGroup])> {
        self.buckets.iter().rev().map(|(size, groups)| (*size, groups.as_slice()))
    }
}

/// Parsed content of one family's orthology report
#[derive(Debug, Clone, Default)]
pub struct OrthologyReport {
    pub groups: GroupSizeIndex,
    /// Distinct ids mentioned by any relationship, in first-seen order
    pub sequences: Vec<String>,
}

/// Split a relationship payload into sequence ids
fn split_payload(payload: &str) -> Vec<String> {
    payload
        .replace(GROUP_SEPARATOR, ",")
        .split(',')
        .map(|id| id.trim().to_string())
        .collect()
}

/// Parse the text of an orthology report
pub fn parse_orthology_report(text: &str, mode: ParseMode) -> Result<OrthologyReport> {
    let mut report = OrthologyReport::default();
    let mut seen = HashSet::new();

    for (line_number, line) in text.lines().enumerate() {
        if line.starts_with(char::is_whitespace) {
            continue;
        }
        let Some(payload) = line.strip_prefix(RELATIONSHIP_MARKER) else {
            continue;
        };
        let payload = payload.trim();

        if payload.is_empty() {
            match mode {
                ParseMode::Tolerant => {
                    debug!("Skipping empty relationship at line {}", line_number + 1);
                    continue;
                }
                ParseMode::Strict => {
                    return Err(CurateError::OrthologyParse(format!(
                        "Empty relationship at line {}",
                        line_number + 1
                    )));
                }
            }
        }

        let ids = split_payload(payload);
        if mode == ParseMode::Strict && ids.iter().any(|id| id.is_empty()) {
            return Err(CurateError::OrthologyParse(format!(
                "Empty sequence id in relationship at line {}: {}",
                line_number + 1,
                line
            )));
        }

        let group: OrthologyGroup = ids.into_iter().filter(|id| !id.is_empty()).collect();
        if group.is_empty() {
            continue;
        }

        for id in &group {
            if seen.insert(id.clone()) {
                report.sequences.push(id.clone());
            }
        }
        report.groups.add_group(group);
    }

    Ok(report)
}

/// Parse an orthology report file
pub fn parse_orthology_file<P: AsRef<Path>>(path: P, mode: ParseMode) -> Result<OrthologyReport> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(CurateError::MissingInput(path.to_path_buf()));
    }
    let text = fs::read_to_string(path)?;
    let report = parse_orthology_report(&text, mode)?;
    info!(
        "Parsed {} orthology relationships over {} sequences from {}",
        report.groups.group_count(),
        report.sequences.len(),
        path.display()
    );
    Ok(report)
}
