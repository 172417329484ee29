//! Sequence-to-species link files (`species:sequence` per line)

use crate::types::{CurateError, ParseMode, Result};
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Species and family owning a sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeciesLink {
    pub species: String,
    pub family: String,
}

/// Mapping from sequence id to its species and family, in first-insertion order
#[derive(Debug, Clone, Default)]
pub struct SpeciesIndex {
    links: HashMap<String, SpeciesLink>,
    order: Vec<String>,
}

impl SpeciesIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a link; a later link for the same sequence replaces the earlier one
    pub fn insert(&mut self, sequence: impl Into<String>, link: SpeciesLink) {
        let sequence = sequence.into();
        if !self.links.contains_key(&sequence) {
            self.order.push(sequence.clone());
        }
        self.links.insert(sequence, link);
    }

    pub fn get(&self, sequence: &str) -> Option<&SpeciesLink> {
        self.links.get(sequence)
    }

    /// Like [`get`](Self::get) but a missing id is a lookup failure
    pub fn lookup(&self, sequence: &str) -> Result<&SpeciesLink> {
        self.links.get(sequence).ok_or_else(|| {
            CurateError::Lookup(format!("Sequence {} has no species link", sequence))
        })
    }

    pub fn species_of(&self, sequence: &str) -> Result<&str> {
        self.lookup(sequence).map(|link| link.species.as_str())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SpeciesLink)> {
        self.order
            .iter()
            .filter_map(move |seq| self.links.get(seq).map(|link| (seq.as_str(), link)))
    }

    /// New index without the sequences listed in `discard`
    pub fn without(&self, discard: &HashSet<String>) -> SpeciesIndex {
        let mut filtered = SpeciesIndex::new();
        for (sequence, link) in self.iter().filter(|(seq, _)| !discard.contains(*seq)) {
            filtered.insert(sequence, link.clone());
        }
        filtered
    }

    /// Merge link lines from `text`, tagging every entry with `family`
    pub fn extend_from_str(&mut self, text: &str, family: &str, mode: ParseMode) -> Result<usize> {
        let mut added = 0;
        for (line_number, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            match parse_link_line(line) {
                Some((species, sequence)) => {
                    self.insert(
                        sequence,
                        SpeciesLink {
                            species: species.to_string(),
                            family: family.to_string(),
                        },
                    );
                    added += 1;
                }
                None => match mode {
                    ParseMode::Tolerant => {
                        debug!("Line {} ({}) has a problem, skipping", line_number + 1, line);
                    }
                    ParseMode::Strict => {
                        return Err(CurateError::LinkParse(format!(
                            "Line {} is not a species:sequence record: {}",
                            line_number + 1,
                            line
                        )));
                    }
                },
            }
        }
        Ok(added)
    }

    /// Merge one link file; its family is the file name up to the first `.`
    pub fn extend_from_file<P: AsRef<Path>>(&mut self, path: P, mode: ParseMode) -> Result<usize> {
        let path = path.as_ref();
        debug!("Reading link file {}", path.display());
        if !path.is_file() {
            return Err(CurateError::MissingInput(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        self.extend_from_str(&text, &family_name(path), mode)
    }

    /// Build an index from several link files, later files winning on conflicts
    pub fn from_files<P: AsRef<Path>>(paths: &[P], mode: ParseMode) -> Result<SpeciesIndex> {
        let mut index = SpeciesIndex::new();
        for path in paths {
            index.extend_from_file(path, mode)?;
        }
        info!("Loaded {} sequence-species links", index.len());
        Ok(index)
    }

    /// Load every `*sp2seq.txt` file of `dir`, in file name order
    pub fn load_dir<P: AsRef<Path>>(dir: P, mode: ParseMode) -> Result<SpeciesIndex> {
        let files = list_files_with_suffix(dir.as_ref(), "sp2seq.txt")?;
        info!("Found {} link files in {}", files.len(), dir.as_ref().display());
        Self::from_files(&files, mode)
    }

    /// Render as `species:sequence` lines
    pub fn to_link_string(&self) -> String {
        self.iter()
            .map(|(sequence, link)| format!("{}:{}\n", link.species, sequence))
            .collect()
    }
}

/// Split a `species:sequence` record at its first colon
pub fn parse_link_line(line: &str) -> Option<(&str, &str)> {
    let (species, sequence) = line.split_once(':')?;
    let (species, sequence) = (species.trim(), sequence.trim());
    if species.is_empty() || sequence.is_empty() {
        return None;
    }
    Some((species, sequence))
}

/// Family name of a per-family file: its basename up to the first `.`
pub fn family_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy())
        .and_then(|name| name.split('.').next().map(str::to_string))
        .unwrap_or_default()
}

/// Regular files in `dir` whose name ends with `suffix`, sorted by name
pub fn list_files_with_suffix(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(CurateError::MissingInput(dir.to_path_buf()));
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .file_name()
            .map(|name| name.to_string_lossy().ends_with(suffix))
            .unwrap_or(false);
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
