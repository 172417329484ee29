//! Tree-guided filtering of refinement-species sequences
//!
//! Each candidate is compared with its closest non-refinement sequence in
//! the tree. The overlap is the percentage of the reference's non-gap
//! columns that are also non-gap in the candidate; a candidate is kept only
//! when its overlap is strictly greater than the threshold.

use crate::fasta::{SequenceStore, GAP};
use crate::logging::log_filter_decision;
use crate::species::SpeciesIndex;
use crate::tree::TreeDistanceOracle;
use crate::types::{CurateError, FilterConfig, Result, TieBreak};
use log::{debug, info};
use std::collections::HashSet;

/// Outcome for one refinement-species sequence
#[derive(Debug, Clone, PartialEq)]
pub struct FilterDecision {
    pub sequence: String,
    pub reference: String,
    pub overlap: f64,
    pub keep: bool,
}

/// Result of a filtering pass
#[derive(Debug, Clone, Default)]
pub struct FilterSummary {
    /// Every sequence kept, non-refinement sequences first
    pub kept: Vec<String>,
    pub discarded: HashSet<String>,
    pub decisions: Vec<FilterDecision>,
}

impl FilterSummary {
    pub fn has_discards(&self) -> bool {
        !self.discarded.is_empty()
    }

    pub fn keep_set(&self) -> HashSet<String> {
        self.kept.iter().cloned().collect()
    }
}

impl std::fmt::Display for FilterSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Sequences kept: {}, Discarded: {}, Candidates evaluated: {}",
            self.kept.len(),
            self.discarded.len(),
            self.decisions.len()
        )
    }
}

/// Percentage of the reference's non-gap columns also non-gap in the candidate
pub fn ungapped_overlap(candidate: &[u8], reference: &[u8]) -> Option<f64> {
    let mut reference_columns = 0usize;
    let mut shared = 0usize;
    for (&r, &c) in reference.iter().zip(candidate) {
        if r != GAP {
            reference_columns += 1;
            if c != GAP {
                shared += 1;
            }
        }
    }
    if reference_columns == 0 {
        return None;
    }
    Some(100.0 * shared as f64 / reference_columns as f64)
}

/// Decides which refinement-species sequences are retained
pub struct FilterEngine {
    config: FilterConfig,
}

impl FilterEngine {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Evaluate every sequence of `links`; sequences of species outside
    /// `refinement_species` are always kept.
    pub fn filter(
        &self,
        alignment: &SequenceStore,
        links: &SpeciesIndex,
        oracle: &TreeDistanceOracle,
        refinement_species: &HashSet<String>,
    ) -> Result<FilterSummary> {
        let (candidates, references): (Vec<&str>, Vec<&str>) = links
            .iter()
            .map(|(sequence, _)| sequence)
            .partition(|sequence| {
                links
                    .get(sequence)
                    .map(|link| refinement_species.contains(&link.species))
                    .unwrap_or(false)
            });

        info!(
            "Filtering {} candidate sequences against {} references (threshold {}%)",
            candidates.len(),
            references.len(),
            self.config.threshold
        );

        let mut summary = FilterSummary {
            kept: references.iter().map(|s| s.to_string()).collect(),
            ..FilterSummary::default()
        };

        for candidate in candidates {
            let decision = self.decide(candidate, &references, alignment, oracle)?;
            log_filter_decision(&decision, self.config.threshold);
            if decision.keep {
                summary.kept.push(decision.sequence.clone());
            } else {
                summary.discarded.insert(decision.sequence.clone());
            }
            summary.decisions.push(decision);
        }

        Ok(summary)
    }

    fn decide(
        &self,
        candidate: &str,
        references: &[&str],
        alignment: &SequenceStore,
        oracle: &TreeDistanceOracle,
    ) -> Result<FilterDecision> {
        let reference = self.closest_reference(candidate, references, oracle)?;

        let candidate_residues = &alignment
            .get(candidate)
            .ok_or_else(|| CurateError::Lookup(format!("{} is not in the alignment", candidate)))?
            .residues;
        let reference_residues = &alignment
            .get(reference)
            .ok_or_else(|| CurateError::Lookup(format!("{} is not in the alignment", reference)))?
            .residues;

        if candidate_residues.len() != reference_residues.len() {
            return Err(CurateError::InvalidAlignment(format!(
                "{} has {} columns but {} has {}",
                candidate,
                candidate_residues.len(),
                reference,
                reference_residues.len()
            )));
        }

        let overlap = ungapped_overlap(candidate_residues, reference_residues).ok_or_else(|| {
            CurateError::DegenerateComputation(format!(
                "Reference {} has no ungapped position to compare {} with",
                reference, candidate
            ))
        })?;

        Ok(FilterDecision {
            sequence: candidate.to_string(),
            reference: reference.to_string(),
            overlap,
            keep: overlap > self.config.threshold,
        })
    }

    fn closest_reference<'r>(
        &self,
        candidate: &str,
        references: &[&'r str],
        oracle: &TreeDistanceOracle,
    ) -> Result<&'r str> {
        let mut best: Option<(&'r str, f64)> = None;

        for &reference in references {
            let distance = oracle.distance(candidate, reference)?;
            let closer = match (best, self.config.tie_break) {
                (None, _) => true,
                (Some((_, d)), TieBreak::LastWithinTolerance) => distance <= d,
                (Some((_, d)), TieBreak::NearestFirstSeen) => distance < d,
            };
            if closer {
                best = Some((reference, distance));
            }
        }

        let (reference, distance) = best.ok_or_else(|| {
            CurateError::Lookup(format!("No reference sequence available for {}", candidate))
        })?;
        debug!("Closest reference of {} is {} ({})", candidate, reference, distance);
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fasta::{Sequence, SequenceStore};
    use crate::species::SpeciesLink;
    use crate::tree::parse_newick;

    fn links(pairs: &[(&str, &str)]) -> SpeciesIndex {
        let mut index = SpeciesIndex::new();
        for (species, sequence) in pairs {
            index.insert(
                *sequence,
                SpeciesLink {
                    species: species.to_string(),
                    family: "fam".to_string(),
                },
            );
        }
        index
    }

    fn refinement(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// Reference of 100 residues; candidate covering `covered` of them
    fn alignment(covered: usize) -> SequenceStore {
        let reference: Vec<u8> = [vec![b'A'; 100], vec![GAP; 20]].concat();
        let mut candidate = vec![GAP; 120];
        for slot in candidate.iter_mut().take(covered) {
            *slot = b'C';
        }
        for slot in candidate.iter_mut().skip(100) {
            *slot = b'C';
        }
        let mut store = SequenceStore::new();
        store.insert(Sequence::new("ref", reference));
        store.insert(Sequence::new("cand", candidate));
        store
    }

    fn run(threshold: f64, covered: usize) -> FilterSummary {
        let oracle = TreeDistanceOracle::new(parse_newick("(ref:0.1,cand:0.2);").unwrap()).unwrap();
        let engine = FilterEngine::new(FilterConfig {
            threshold,
            ..FilterConfig::default()
        });
        engine
            .filter(
                &alignment(covered),
                &links(&[("B", "ref"), ("A", "cand")]),
                &oracle,
                &refinement(&["A"]),
            )
            .unwrap()
    }

    #[test]
    fn test_overlap_percentage() {
        assert_eq!(ungapped_overlap(b"AC-T", b"ACGT"), Some(75.0));
        assert_eq!(ungapped_overlap(b"ACGT", b"A--T"), Some(100.0));
        assert_eq!(ungapped_overlap(b"ACGT", b"----"), None);
    }

    #[test]
    fn test_threshold_boundary_is_strict() {
        let at_80 = run(80.0, 79);
        assert!(at_80.discarded.contains("cand"));
        assert!((at_80.decisions[0].overlap - 79.0).abs() < 1e-9);

        let at_79 = run(79.0, 79);
        assert!(at_79.discarded.contains("cand"));

        let below = run(78.9, 79);
        assert!(!below.has_discards());
        assert_eq!(below.kept, vec!["ref", "cand"]);
    }

    #[test]
    fn test_raising_threshold_is_monotonic() {
        let mut previously_kept = true;
        for threshold in [0.0, 25.0, 50.0, 59.9, 60.0, 75.0, 100.0] {
            let kept = !run(threshold, 60).has_discards();
            assert!(previously_kept || !kept, "kept again at {}", threshold);
            previously_kept = kept;
        }
    }

    #[test]
    fn test_references_always_kept() {
        let summary = run(100.0, 10);
        assert!(summary.kept.contains(&"ref".to_string()));
        assert_eq!(summary.decisions.len(), 1);
        assert_eq!(summary.decisions[0].reference, "ref");
    }

    #[test]
    fn test_tie_break_policies() {
        let tree = parse_newick("(cand:0.1,(near1:0.1,near2:0.1):0.0,far:1.0);").unwrap();
        let oracle = TreeDistanceOracle::new(tree).unwrap();
        let links = links(&[("B", "near1"), ("C", "far"), ("D", "near2"), ("A", "cand")]);
        let mut store = SequenceStore::new();
        store.insert(Sequence::new("near1", b"AAAA".to_vec()));
        store.insert(Sequence::new("near2", b"AA--".to_vec()));
        store.insert(Sequence::new("far", b"----".to_vec()));
        store.insert(Sequence::new("cand", b"A-A-".to_vec()));

        let last = FilterEngine::new(FilterConfig::default())
            .filter(&store, &links, &oracle, &refinement(&["A"]))
            .unwrap();
        assert_eq!(last.decisions[0].reference, "near2");
        assert_eq!(last.decisions[0].overlap, 50.0);

        let first = FilterEngine::new(FilterConfig {
            threshold: 0.0,
            tie_break: TieBreak::NearestFirstSeen,
        })
        .filter(&store, &links, &oracle, &refinement(&["A"]))
        .unwrap();
        assert_eq!(first.decisions[0].reference, "near1");
    }

    #[test]
    fn test_gap_only_reference_is_degenerate() {
        let oracle = TreeDistanceOracle::new(parse_newick("(ref:0.1,cand:0.2);").unwrap()).unwrap();
        let mut store = SequenceStore::new();
        store.insert(Sequence::new("ref", b"----".to_vec()));
        store.insert(Sequence::new("cand", b"ACGT".to_vec()));

        let err = FilterEngine::new(FilterConfig::default())
            .filter(&store, &links(&[("B", "ref"), ("A", "cand")]), &oracle, &refinement(&["A"]))
            .unwrap_err();
        assert!(matches!(err, CurateError::DegenerateComputation(_)));
    }

    #[test]
    fn test_candidate_missing_from_tree_fails() {
        let oracle = TreeDistanceOracle::new(parse_newick("(ref:0.1,other:0.2);").unwrap()).unwrap();
        let err = FilterEngine::new(FilterConfig::default())
            .filter(&alignment(50), &links(&[("B", "ref"), ("A", "cand")]), &oracle, &refinement(&["A"]))
            .unwrap_err();
        assert!(matches!(err, CurateError::Lookup(_)));
    }
}
