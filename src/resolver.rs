//! Orthology group resolution
//!
//! For every sequence of a family this computes:
//! - its minimal orthology group: the other members of the smallest asserted
//!   group containing it. Sequences of refinement species ignore groups made
//!   only of refinement species and keep refinement partners apart from the
//!   others.
//! - the canonical id of its maximal orthology group: the largest asserted
//!   group containing it, numbered through a [`MaximalGroupRegistry`] shared by
//!   the whole run.

use crate::orthology::{GroupSizeIndex, OrthologyGroup};
use crate::species::SpeciesIndex;
use crate::types::Result;
use log::debug;
use std::collections::{HashMap, HashSet};

/// Canonical key of a group: sorted member ids joined by commas
pub fn canonical_key(members: &[String]) -> String {
    let mut sorted: Vec<&str> = members.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join(",")
}

/// Dense, first-seen numbering of maximal orthology groups, starting at 1.
/// Ids are never reused or renumbered.
#[derive(Debug, Clone)]
pub struct MaximalGroupRegistry {
    ids: HashMap<String, u32>,
    next_id: u32,
}

impl Default for MaximalGroupRegistry {
    fn default() -> Self {
        Self {
            ids: HashMap::new(),
            next_id: 1,
        }
    }
}

impl MaximalGroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the group with these members, allocating one on first sight
    pub fn id_for(&mut self, members: &[String]) -> u32 {
        let key = canonical_key(members);
        if let Some(&id) = self.ids.get(&key) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        debug!("New maximal group s{}: {}", id, key);
        self.ids.insert(key, id);
        id
    }

    pub fn get(&self, key: &str) -> Option<u32> {
        self.ids.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Resolved orthology of one sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOrthology {
    pub sequence: String,
    pub species: String,
    /// Minimal-group partners not belonging to a refinement species
    pub minimal: Vec<String>,
    /// Minimal-group partners belonging to a refinement species
    pub minimal_refinement: Vec<String>,
    pub maximal_group: u32,
}

/// All resolutions of one family, in input order
#[derive(Debug, Clone, Default)]
pub struct FamilyOrthology {
    pub family: String,
    pub entries: Vec<ResolvedOrthology>,
}

/// Resolves minimal and maximal orthology groups against a species index
pub struct OrthologyResolver<'a> {
    links: &'a SpeciesIndex,
    refinement_species: &'a HashSet<String>,
}

impl<'a> OrthologyResolver<'a> {
    pub fn new(links: &'a SpeciesIndex, refinement_species: &'a HashSet<String>) -> Self {
        Self {
            links,
            refinement_species,
        }
    }

    /// Resolve every sequence of `sequences`; a sequence without a species link
    /// fails the whole pass.
    pub fn resolve(
        &self,
        groups: &GroupSizeIndex,
        sequences: &[String],
        registry: &mut MaximalGroupRegistry,
    ) -> Result<Vec<ResolvedOrthology>> {
        sequences
            .iter()
            .map(|sequence| self.resolve_sequence(groups, sequence, registry))
            .collect()
    }

    /// Resolve one family and tag the result with its name
    pub fn resolve_family(
        &self,
        family: &str,
        groups: &GroupSizeIndex,
        sequences: &[String],
        registry: &mut MaximalGroupRegistry,
    ) -> Result<FamilyOrthology> {
        let entries = self.resolve(groups, sequences, registry)?;
        Ok(FamilyOrthology {
            family: family.to_string(),
            entries,
        })
    }

    fn resolve_sequence(
        &self,
        groups: &GroupSizeIndex,
        sequence: &str,
        registry: &mut MaximalGroupRegistry,
    ) -> Result<ResolvedOrthology> {
        let species = self.links.species_of(sequence)?.to_string();

        let (minimal, minimal_refinement) = if self.refinement_species.contains(&species) {
            self.refined_minimal_group(groups, sequence)?
        } else {
            (plain_minimal_group(groups, sequence), Vec::new())
        };

        let maximal = maximal_group(groups, sequence)
            .cloned()
            .unwrap_or_else(|| vec![sequence.to_string()]);
        let maximal_group = registry.id_for(&maximal);

        Ok(ResolvedOrthology {
            sequence: sequence.to_string(),
            species,
            minimal,
            minimal_refinement,
            maximal_group,
        })
    }

    fn is_refinement(&self, sequence: &str) -> Result<bool> {
        Ok(self
            .refinement_species
            .contains(self.links.species_of(sequence)?))
    }

    /// Minimal group of a refinement-species sequence. Groups made only of
    /// refinement species are skipped; the partners of every other containing
    /// group at the first qualifying cardinality are split by species kind.
    fn refined_minimal_group(
        &self,
        groups: &GroupSizeIndex,
        sequence: &str,
    ) -> Result<(Vec<String>, Vec<String>)> {
        let mut others = Vec::new();
        let mut refined = Vec::new();

        for (_, bucket) in groups.ascending() {
            let mut found = false;

            for group in bucket.iter().filter(|g| g.iter().any(|s| s == sequence)) {
                let mut all_refinement = true;
                for member in group {
                    if !self.is_refinement(member)? {
                        all_refinement = false;
                        break;
                    }
                }
                if all_refinement {
                    continue;
                }

                found = true;
                for member in group.iter().filter(|s| *s != sequence) {
                    let target = if self.is_refinement(member)? {
                        &mut refined
                    } else {
                        &mut others
                    };
                    if !target.contains(member) {
                        target.push(member.clone());
                    }
                }
            }

            if found {
                break;
            }
        }

        Ok((others, refined))
    }
}

/// Other members of the first smallest-cardinality group containing `sequence`
fn plain_minimal_group(groups: &GroupSizeIndex, sequence: &str) -> Vec<String> {
    groups
        .ascending()
        .find_map(|(_, bucket)| containing_group(bucket, sequence))
        .map(|group| group.iter().filter(|s| *s != sequence).cloned().collect())
        .unwrap_or_default()
}

/// First largest-cardinality group containing `sequence`
fn maximal_group<'g>(groups: &'g GroupSizeIndex, sequence: &str) -> Option<&'g OrthologyGroup> {
    groups
        .descending()
        .find_map(|(_, bucket)| containing_group(bucket, sequence))
}

fn containing_group<'g>(bucket: &'g [OrthologyGroup], sequence: &str) -> Option<&'g OrthologyGroup> {
    bucket.iter().find(|group| group.iter().any(|s| s == sequence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orthology::parse_orthology_report;
    use crate::species::SpeciesLink;
    use crate::types::{CurateError, ParseMode};

    fn index(pairs: &[(&str, &str)]) -> SpeciesIndex {
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

    fn groups(list: &[&[&str]]) -> GroupSizeIndex {
        let mut index = GroupSizeIndex::new();
        for group in list {
            index.add_group(group.iter().map(|s| s.to_string()).collect());
        }
        index
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn species_set(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_group_minimal_equals_maximal() {
        let links = index(&[("A", "seq1"), ("A", "seq2"), ("B", "seq3")]);
        let report = parse_orthology_report(
            "ORTHOLOGY RELATIONSHIP: seq1, seq2 <===> seq3\n",
            ParseMode::Strict,
        )
        .unwrap();
        let refinement = HashSet::new();
        let mut registry = MaximalGroupRegistry::new();

        let resolved = OrthologyResolver::new(&links, &refinement)
            .resolve(&report.groups, &report.sequences, &mut registry)
            .unwrap();

        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[0].minimal, vec!["seq2", "seq3"]);
        assert_eq!(resolved[1].minimal, vec!["seq1", "seq3"]);
        assert!(resolved.iter().all(|r| r.maximal_group == 1));
        assert!(resolved.iter().all(|r| r.minimal_refinement.is_empty()));
        assert_eq!(registry.get("seq1,seq2,seq3"), Some(1));
    }

    #[test]
    fn test_minimal_first_match_at_smallest_size() {
        let links = index(&[("A", "a"), ("B", "b"), ("C", "c"), ("D", "d")]);
        let groups = groups(&[&["a", "b", "c", "d"], &["a", "c"], &["a", "d"]]);
        let refinement = HashSet::new();
        let mut registry = MaximalGroupRegistry::new();

        let resolved = OrthologyResolver::new(&links, &refinement)
            .resolve(&groups, &ids(&["a", "b"]), &mut registry)
            .unwrap();

        // first size-2 group only
        assert_eq!(resolved[0].minimal, vec!["c"]);
        // b only appears in the size-4 group
        assert_eq!(resolved[1].minimal, vec!["a", "c", "d"]);
        assert_eq!(resolved[0].maximal_group, resolved[1].maximal_group);
    }

    #[test]
    fn test_refinement_skips_all_refinement_groups() {
        let links = index(&[("A", "seq1"), ("A", "seq2"), ("B", "seq3")]);
        let groups = groups(&[&["seq1", "seq2"], &["seq1", "seq3"]]);
        let refinement = species_set(&["A"]);
        let mut registry = MaximalGroupRegistry::new();

        let resolved = OrthologyResolver::new(&links, &refinement)
            .resolve(&groups, &ids(&["seq1"]), &mut registry)
            .unwrap();

        assert_eq!(resolved[0].minimal, vec!["seq3"]);
        assert!(resolved[0].minimal_refinement.is_empty());
    }

    #[test]
    fn test_refinement_partitions_and_accumulates() {
        let links = index(&[
            ("A", "r1"),
            ("A", "r2"),
            ("C", "r3"),
            ("B", "o1"),
            ("D", "o2"),
        ]);
        let groups = groups(&[
            &["r1", "r2", "o1"],
            &["r1", "r3", "o2"],
            &["r1", "o1", "o2"],
            &["r1", "r2", "r3", "o1", "o2"],
        ]);
        let refinement = species_set(&["A", "C"]);
        let mut registry = MaximalGroupRegistry::new();

        let resolved = OrthologyResolver::new(&links, &refinement)
            .resolve(&groups, &ids(&["r1", "o1"]), &mut registry)
            .unwrap();

        assert_eq!(resolved[0].minimal, vec!["o1", "o2"]);
        assert_eq!(resolved[0].minimal_refinement, vec!["r2", "r3"]);
        // o1 is not a refinement species: first containing group verbatim
        assert_eq!(resolved[1].minimal, vec!["r1", "r2"]);
        assert!(resolved[1].minimal_refinement.is_empty());
    }

    #[test]
    fn test_refinement_falls_through_to_larger_size() {
        let links = index(&[("A", "r1"), ("A", "r2"), ("B", "o1")]);
        let groups = groups(&[&["r1", "r2"], &["r1", "r2", "o1"]]);
        let refinement = species_set(&["A"]);
        let mut registry = MaximalGroupRegistry::new();

        let resolved = OrthologyResolver::new(&links, &refinement)
            .resolve(&groups, &ids(&["r1"]), &mut registry)
            .unwrap();

        assert_eq!(resolved[0].minimal, vec!["o1"]);
        assert_eq!(resolved[0].minimal_refinement, vec!["r2"]);
    }

    #[test]
    fn test_only_refinement_groups_leaves_empty_minimal() {
        let links = index(&[("A", "r1"), ("A", "r2")]);
        let groups = groups(&[&["r1", "r2"]]);
        let refinement = species_set(&["A"]);
        let mut registry = MaximalGroupRegistry::new();

        let resolved = OrthologyResolver::new(&links, &refinement)
            .resolve(&groups, &ids(&["r1"]), &mut registry)
            .unwrap();

        assert!(resolved[0].minimal.is_empty());
        assert!(resolved[0].minimal_refinement.is_empty());
        assert_eq!(resolved[0].maximal_group, 1);
    }

    #[test]
    fn test_registry_shared_across_families_and_order_independent() {
        let links = index(&[("A", "a"), ("B", "b"), ("C", "c"), ("D", "d")]);
        let first = groups(&[&["c", "d"], &["b", "a"]]);
        let second = groups(&[&["a", "b"]]);
        let refinement = HashSet::new();
        let resolver = OrthologyResolver::new(&links, &refinement);
        let mut registry = MaximalGroupRegistry::new();

        let fam1 = resolver
            .resolve_family("fam1", &first, &ids(&["c", "a"]), &mut registry)
            .unwrap();
        let fam2 = resolver
            .resolve_family("fam2", &second, &ids(&["b"]), &mut registry)
            .unwrap();

        assert_eq!(fam1.entries[0].maximal_group, 1);
        assert_eq!(fam1.entries[1].maximal_group, 2);
        // same membership, different member order and family
        assert_eq!(fam2.entries[0].maximal_group, 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_sequence_without_group_gets_singleton() {
        let links = index(&[("A", "lonely"), ("B", "x"), ("C", "y")]);
        let groups = groups(&[&["x", "y"]]);
        let refinement = HashSet::new();
        let mut registry = MaximalGroupRegistry::new();

        let resolved = OrthologyResolver::new(&links, &refinement)
            .resolve(&groups, &ids(&["x", "lonely"]), &mut registry)
            .unwrap();

        assert!(resolved[1].minimal.is_empty());
        assert_eq!(resolved[1].maximal_group, 2);
        assert_eq!(registry.get("lonely"), Some(2));
    }

    #[test]
    fn test_missing_link_is_fatal() {
        let links = index(&[("A", "a")]);
        let groups = groups(&[&["a", "ghost"]]);
        let refinement = HashSet::new();
        let mut registry = MaximalGroupRegistry::new();

        let err = OrthologyResolver::new(&links, &refinement)
            .resolve(&groups, &ids(&["a", "ghost"]), &mut registry)
            .unwrap_err();
        assert!(matches!(err, CurateError::Lookup(_)));
    }
}
