//! Tab-separated output tables and link files

use crate::resolver::{FamilyOrthology, ResolvedOrthology};
use crate::species::SpeciesIndex;
use crate::types::{CurateError, Result};
use log::{debug, info};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const ORTHOLOGS_TABLE: &str = "all_fam.orthologs.tsv";
pub const SPECIES_TABLE: &str = "all_fam.seq2sp.tsv";

/// Minimal group as text: non-refinement partners comma-joined, followed by
/// `,[...]` holding the refinement partners when there are any
pub fn format_minimal_group(resolved: &ResolvedOrthology) -> String {
    let mut text = resolved.minimal.join(",");
    if !resolved.minimal_refinement.is_empty() {
        text.push_str(",[");
        text.push_str(&resolved.minimal_refinement.join(","));
        text.push(']');
    }
    text
}

/// `sequence<TAB>minimal_group`
pub fn orthologs_row(resolved: &ResolvedOrthology) -> String {
    format!("{}\t{}", resolved.sequence, format_minimal_group(resolved))
}

/// `sequence<TAB>species<TAB>family<TAB>s<maximal_group>`
pub fn species_row(resolved: &ResolvedOrthology, family: &str) -> String {
    format!(
        "{}\t{}\t{}\ts{}",
        resolved.sequence, resolved.species, family, resolved.maximal_group
    )
}

/// Writer for the two per-run orthology tables
pub struct OrthologyWriter {
    orthologs: BufWriter<File>,
    species: BufWriter<File>,
    rows: usize,
}

impl OrthologyWriter {
    /// Create both tables inside `out_dir`
    pub fn new<P: AsRef<Path>>(out_dir: P) -> Result<Self> {
        let out_dir = out_dir.as_ref();
        let orthologs_path = out_dir.join(ORTHOLOGS_TABLE);
        let species_path = out_dir.join(SPECIES_TABLE);
        info!("Creating orthology tables in {}", out_dir.display());

        Ok(OrthologyWriter {
            orthologs: BufWriter::new(File::create(&orthologs_path).map_err(CurateError::Io)?),
            species: BufWriter::new(File::create(&species_path).map_err(CurateError::Io)?),
            rows: 0,
        })
    }

    /// Append the rows of one family, in resolution order
    pub fn write_family(&mut self, family: &FamilyOrthology) -> Result<()> {
        debug!("Writing {} rows for family {}", family.entries.len(), family.family);
        for resolved in &family.entries {
            writeln!(self.orthologs, "{}", orthologs_row(resolved))?;
            writeln!(self.species, "{}", species_row(resolved, &family.family))?;
            self.rows += 1;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<usize> {
        self.orthologs.flush()?;
        self.species.flush()?;
        info!("Wrote {} orthology rows", self.rows);
        Ok(self.rows)
    }
}

/// Species table without orthology: `sequence<TAB>species<TAB>family`
pub fn write_species_only_table<P: AsRef<Path>>(out_dir: P, links: &SpeciesIndex) -> Result<PathBuf> {
    let path = out_dir.as_ref().join(SPECIES_TABLE);
    let mut writer = BufWriter::new(File::create(&path)?);
    for (sequence, link) in links.iter() {
        writeln!(writer, "{}\t{}\t{}", sequence, link.species, link.family)?;
    }
    writer.flush()?;
    info!("Wrote {} species links to {}", links.len(), path.display());
    Ok(path)
}

/// Write `species:sequence` lines
pub fn write_link_file<P: AsRef<Path>>(path: P, links: &SpeciesIndex) -> Result<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(links.to_link_string().as_bytes())?;
    writer.flush()?;
    debug!("Wrote {} links to {}", links.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::species::SpeciesLink;
    use tempfile::tempdir;

    fn resolved(sequence: &str, minimal: &[&str], refinement: &[&str], group: u32) -> ResolvedOrthology {
        ResolvedOrthology {
            sequence: sequence.to_string(),
            species: "A".to_string(),
            minimal: minimal.iter().map(|s| s.to_string()).collect(),
            minimal_refinement: refinement.iter().map(|s| s.to_string()).collect(),
            maximal_group: group,
        }
    }

    #[test]
    fn test_minimal_group_text() {
        assert_eq!(format_minimal_group(&resolved("s", &["a", "b"], &[], 1)), "a,b");
        assert_eq!(format_minimal_group(&resolved("s", &["a"], &["r1", "r2"], 1)), "a,[r1,r2]");
        assert_eq!(format_minimal_group(&resolved("s", &[], &["r1"], 1)), ",[r1]");
        assert_eq!(format_minimal_group(&resolved("s", &[], &[], 1)), "");
    }

    #[test]
    fn test_rows() {
        let r = resolved("seq1", &["seq2", "seq3"], &[], 4);
        assert_eq!(orthologs_row(&r), "seq1\tseq2,seq3");
        assert_eq!(species_row(&r, "fam_test"), "seq1\tA\tfam_test\ts4");
    }

    #[test]
    fn test_writer_appends_families_in_order() {
        let dir = tempdir().unwrap();
        let mut writer = OrthologyWriter::new(dir.path()).unwrap();
        writer
            .write_family(&FamilyOrthology {
                family: "f1".to_string(),
                entries: vec![resolved("x", &["y"], &[], 1), resolved("y", &["x"], &[], 1)],
            })
            .unwrap();
        writer
            .write_family(&FamilyOrthology {
                family: "f2".to_string(),
                entries: vec![resolved("z", &[], &["w"], 2)],
            })
            .unwrap();
        assert_eq!(writer.finish().unwrap(), 3);

        let orthologs = std::fs::read_to_string(dir.path().join(ORTHOLOGS_TABLE)).unwrap();
        assert_eq!(orthologs, "x\ty\ny\tx\nz\t,[w]\n");
        let species = std::fs::read_to_string(dir.path().join(SPECIES_TABLE)).unwrap();
        assert_eq!(species, "x\tA\tf1\ts1\ny\tA\tf1\ts1\nz\tA\tf2\ts2\n");
    }

    #[test]
    fn test_link_file_round_trip() {
        let dir = tempdir().unwrap();
        let mut links = SpeciesIndex::new();
        links.insert(
            "seq1",
            SpeciesLink {
                species: "Mus_musculus".to_string(),
                family: "fam".to_string(),
            },
        );
        let path = dir.path().join("fam.sp2seq.txt");
        write_link_file(&path, &links).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Mus_musculus:seq1\n");

        let table = write_species_only_table(dir.path(), &links).unwrap();
        assert_eq!(std::fs::read_to_string(table).unwrap(), "seq1\tMus_musculus\tfam\n");
    }
}
