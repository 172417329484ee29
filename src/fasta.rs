//! FASTA parsing and the in-memory sequence store

use crate::types::{CurateError, Result};
use bio::io::fasta;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

/// Gap character used by the aligners
pub const GAP: u8 = b'-';

/// Residues per line when writing FASTA
pub const LINE_WIDTH: usize = 60;

/// A named, possibly gapped, biological sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub id: String,
    pub residues: Vec<u8>,
}

impl Sequence {
    pub fn new(id: impl Into<String>, residues: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            residues: residues.into(),
        }
    }

    /// Number of alignment columns that are not gaps
    pub fn ungapped_len(&self) -> usize {
        self.residues.iter().filter(|&&b| b != GAP).count()
    }

    fn dealigned(&self) -> Sequence {
        Sequence {
            id: self.id.clone(),
            residues: self.residues.iter().copied().filter(|&b| b != GAP).collect(),
        }
    }
}

/// Collection of sequences keyed by identifier, in first-insertion order.
///
/// Inserting an identifier that is already present replaces the stored
/// residues (last write wins) but keeps the original position.
#[derive(Debug, Clone, Default)]
pub struct SequenceStore {
    sequences: HashMap<String, Sequence>,
    order: Vec<String>,
}

impl SequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sequence: Sequence) {
        if self.sequences.contains_key(&sequence.id) {
            warn!("Duplicate sequence id {}, keeping the last occurrence", sequence.id);
        } else {
            self.order.push(sequence.id.clone());
        }
        self.sequences.insert(sequence.id.clone(), sequence);
    }

    pub fn get(&self, id: &str) -> Option<&Sequence> {
        self.sequences.get(id)
    }

    /// Residues for `id`, or `default` when the id is absent
    pub fn residues_or<'a>(&'a self, id: &str, default: &'a [u8]) -> &'a [u8] {
        self.sequences
            .get(id)
            .map(|s| s.residues.as_slice())
            .unwrap_or(default)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sequences.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sequence> {
        self.order.iter().filter_map(move |id| self.sequences.get(id))
    }

    /// New store holding only the sequences whose id is in `keep`
    pub fn subset(&self, keep: &HashSet<String>) -> SequenceStore {
        let mut filtered = SequenceStore::new();
        for sequence in self.iter().filter(|s| keep.contains(&s.id)) {
            filtered.insert(sequence.clone());
        }
        debug!("Subset kept {} of {} sequences", filtered.len(), self.len());
        filtered
    }

    /// New store with every gap character removed
    pub fn dealign(&self) -> SequenceStore {
        let mut dealigned = SequenceStore::new();
        for sequence in self.iter() {
            dealigned.insert(sequence.dealigned());
        }
        dealigned
    }

    /// Render as FASTA wrapped at [`LINE_WIDTH`] residues per line
    pub fn to_fasta_string(&self) -> String {
        let mut out = String::new();
        for sequence in self.iter() {
            out.push('>');
            out.push_str(&sequence.id);
            out.push('\n');
            for chunk in sequence.residues.chunks(LINE_WIDTH) {
                out.push_str(&String::from_utf8_lossy(chunk));
                out.push('\n');
            }
        }
        out
    }

    pub fn write_fasta_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        debug!("Writing {} sequences to {}", self.len(), path.display());
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(self.to_fasta_string().as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

/// Parse FASTA text. Headers without residues are skipped.
pub fn parse_fasta_str(text: &str) -> Result<SequenceStore> {
    let reader = fasta::Reader::new(text.trim_start().as_bytes());
    let mut store = SequenceStore::new();

    for result in reader.records() {
        let record = result
            .map_err(|e| CurateError::FastaParse(format!("Failed to parse FASTA record: {}", e)))?;

        if record.seq().is_empty() {
            debug!("Skipping record {} without residues", record.id());
            continue;
        }

        store.insert(Sequence::new(record.id(), record.seq()));
    }

    Ok(store)
}

/// Parse a FASTA file into a [`SequenceStore`]
pub fn parse_fasta_file<P: AsRef<Path>>(path: P) -> Result<SequenceStore> {
    let path = path.as_ref();
    info!("Parsing FASTA file: {}", path.display());

    let mut file = File::open(path).map_err(|e| {
        CurateError::FastaParse(format!("Failed to open FASTA file {}: {}", path.display(), e))
    })?;
    let mut text = String::new();
    file.read_to_string(&mut text)?;

    let store = parse_fasta_str(&text)?;
    info!("Loaded {} sequences from {}", store.len(), path.display());
    Ok(store)
}

/// Summary statistics about an alignment
#[derive(Debug)]
pub struct AlignmentStats {
    pub sequence_count: usize,
    pub alignment_length: usize,
    pub gap_content: f64,
}

pub fn get_alignment_stats(store: &SequenceStore) -> AlignmentStats {
    let mut total = 0usize;
    let mut gaps = 0usize;
    let mut alignment_length = 0usize;

    for sequence in store.iter() {
        total += sequence.residues.len();
        gaps += sequence.residues.len() - sequence.ungapped_len();
        alignment_length = alignment_length.max(sequence.residues.len());
    }

    let gap_content = if total > 0 {
        (gaps as f64 / total as f64) * 100.0
    } else {
        0.0
    };

    AlignmentStats {
        sequence_count: store.len(),
        alignment_length,
        gap_content,
    }
}

impl std::fmt::Display for AlignmentStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Sequences: {}, Alignment length: {}, Gap content: {:.2}%",
            self.sequence_count, self.alignment_length, self.gap_content
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_simple_fasta() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, ">seq1 some description").unwrap();
        writeln!(temp_file, "ATG-CA").unwrap();
        writeln!(temp_file, "TGC").unwrap();
        writeln!(temp_file, ">seq2").unwrap();
        writeln!(temp_file, "GCTAGCTA").unwrap();

        let store = parse_fasta_file(temp_file.path()).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("seq1").unwrap().residues, b"ATG-CATGC");
        assert_eq!(store.get("seq2").unwrap().residues, b"GCTAGCTA");
        assert_eq!(store.ids().collect::<Vec<_>>(), vec!["seq1", "seq2"]);
    }

    #[test]
    fn test_duplicate_id_last_write_wins() {
        let store = parse_fasta_str(">a\nAAAA\n>b\nCCCC\n>a\nGGGG\n").unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("a").unwrap().residues, b"GGGG");
        assert_eq!(store.ids().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_residues_or_default() {
        let store = parse_fasta_str(">a\nAC-T\n").unwrap();
        assert_eq!(store.residues_or("a", b""), b"AC-T");
        assert_eq!(store.residues_or("missing", b"NNN"), b"NNN");
    }

    #[test]
    fn test_subset_and_dealign() {
        let store = parse_fasta_str(">a\nA-C-\n>b\n--GG\n>c\nTTTT\n").unwrap();
        let keep: HashSet<String> = ["a", "c"].iter().map(|s| s.to_string()).collect();

        let subset = store.subset(&keep);
        assert_eq!(subset.ids().collect::<Vec<_>>(), vec!["a", "c"]);
        assert_eq!(subset.get("a").unwrap().residues, b"A-C-");

        let dealigned = store.dealign();
        assert_eq!(dealigned.get("a").unwrap().residues, b"AC");
        assert_eq!(dealigned.get("b").unwrap().residues, b"GG");
        // source store is untouched
        assert_eq!(store.get("b").unwrap().residues, b"--GG");
    }

    #[test]
    fn test_write_wraps_and_reparses() {
        let long: Vec<u8> = (0..150).map(|i| if i % 7 == 0 { GAP } else { b'A' }).collect();
        let mut store = SequenceStore::new();
        store.insert(Sequence::new("long", long.clone()));
        store.insert(Sequence::new("short", b"AC".to_vec()));

        let text = store.to_fasta_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], ">long");
        assert_eq!(lines[1].len(), LINE_WIDTH);
        assert_eq!(lines[2].len(), LINE_WIDTH);
        assert_eq!(lines[3].len(), 30);

        let reparsed = parse_fasta_str(&text).unwrap();
        assert_eq!(reparsed.get("long").unwrap().residues, long);
        assert_eq!(reparsed.get("short").unwrap().residues, b"AC");
    }

    #[test]
    fn test_header_without_sequence_is_skipped() {
        let store = parse_fasta_str("\n>empty\n>full\nACGT\n").unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.contains("full"));
    }

    #[test]
    fn test_alignment_stats() {
        let store = parse_fasta_str(">a\nAC--\n>b\nACGT\n").unwrap();
        let stats = get_alignment_stats(&store);
        assert_eq!(stats.sequence_count, 2);
        assert_eq!(stats.alignment_length, 4);
        assert!((stats.gap_content - 25.0).abs() < 1e-9);
    }
}
