//! orthocurate: orthology group resolution and tree-guided alignment filtering
//!
//! This library consolidates per-family orthology reports into minimal and
//! maximal ortholog groups, and removes poorly aligned sequences of
//! refinement species from family alignments using their closest reference
//! sequence in the family tree.

pub mod collaborators;
pub mod fasta;
pub mod filter;
pub mod logging;
pub mod orthology;
pub mod output;
pub mod pipeline;
pub mod resolver;
pub mod species;
pub mod tree;
pub mod types;

// Re-export main types for library usage
pub use fasta::{Sequence, SequenceStore};
pub use filter::{FilterDecision, FilterEngine, FilterSummary};
pub use orthology::{GroupSizeIndex, OrthologyReport};
pub use resolver::{MaximalGroupRegistry, OrthologyResolver, ResolvedOrthology};
pub use species::{SpeciesIndex, SpeciesLink};
pub use tree::{PhylogeneticTree, TreeDistanceOracle};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_types() {
        let config = FilterConfig::default();
        assert_eq!(config.threshold, 0.0);
        assert_eq!(config.tie_break, TieBreak::LastWithinTolerance);

        let tools = ToolConfig::default();
        assert_eq!(tools.timeout.as_secs(), 3600);
        assert_eq!(ParseMode::default(), ParseMode::Tolerant);
    }

    #[test]
    fn test_end_to_end_distance_and_overlap() {
        let tree = tree::parse_newick("((a:1,b:2):0.5,c:3);").unwrap();
        let oracle = TreeDistanceOracle::new(tree).unwrap();
        assert_eq!(oracle.distance("a", "c").unwrap(), 4.5);
        assert_eq!(filter::ungapped_overlap(b"A-G-", b"ACGT"), Some(50.0));
    }

    #[test]
    fn test_version_info() {
        let version = env!("CARGO_PKG_VERSION");
        assert!(!version.is_empty());
    }
}
