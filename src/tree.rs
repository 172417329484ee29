//! Newick trees, polytomy resolution and leaf-to-leaf distances
//!
//! Reading and writing go through the `newick` crate; the helpers here only
//! walk its node/parent/branch-length arena with explicit stacks, so deep
//! ladders produced by polytomy resolution cannot exhaust the call stack.

use crate::types::{CurateError, Result};
use log::{debug, info};
use newick::{Data, Newick, NewickTree};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Rooted phylogenetic tree
pub struct PhylogeneticTree {
    tree: NewickTree,
}

impl PhylogeneticTree {
    pub fn from_newick_tree(tree: NewickTree) -> Self {
        Self { tree }
    }

    pub fn as_newick_tree(&self) -> &NewickTree {
        &self.tree
    }

    pub fn root(&self) -> usize {
        self.tree.root()
    }

    pub fn children(&self, node: usize) -> &[usize] {
        self.tree[node].children()
    }

    pub fn parent(&self, node: usize) -> Option<usize> {
        self.tree.parent(node)
    }

    pub fn name(&self, node: usize) -> Option<&str> {
        self.tree.name(node).map(|name| &name[..])
    }

    /// Length of the branch leading to `node`; a missing length counts as 0
    pub fn branch_length(&self, node: usize) -> f64 {
        self.tree[node].branch().copied().map(f64::from).unwrap_or(0.0)
    }

    pub fn is_leaf(&self, node: usize) -> bool {
        self.children(node).is_empty()
    }

    /// Nodes in depth-first pre-order, children left to right
    pub fn preorder(&self) -> Vec<usize> {
        let mut order = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        order
    }

    pub fn len(&self) -> usize {
        self.preorder().len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_names().is_empty()
    }

    /// Names of the leaves, left to right
    pub fn leaf_names(&self) -> Vec<&str> {
        self.preorder()
            .into_iter()
            .filter(|&id| self.is_leaf(id))
            .filter_map(|id| self.name(id))
            .collect()
    }

    /// Largest number of children of any node
    pub fn max_degree(&self) -> usize {
        self.preorder()
            .into_iter()
            .map(|id| self.children(id).len())
            .max()
            .unwrap_or(0)
    }

    /// Copy of this tree where every node with more than two children is
    /// replaced by a ladder of binary nodes joined by zero-length branches.
    /// Leaf-to-leaf distances are unchanged.
    pub fn resolve_polytomies(&self) -> PhylogeneticTree {
        let mut out = NewickTree::new();
        let root = self.copy_node(&mut out, None, self.root());
        let mut stack = vec![(self.root(), root)];

        while let Some((source, copy)) = stack.pop() {
            let children = self.children(source);
            let mut attach = copy;
            for (i, &child) in children.iter().enumerate() {
                if children.len() > 2 && i > 0 && i < children.len() - 1 {
                    let bridge = out.add_node(
                        Some(attach),
                        Data {
                            name: None,
                            attrs: Default::default(),
                        },
                    );
                    out[bridge].set_branch(0.0);
                    attach = bridge;
                }
                let copied = self.copy_node(&mut out, Some(attach), child);
                stack.push((child, copied));
            }
        }

        PhylogeneticTree { tree: out }
    }

    fn copy_node(&self, out: &mut NewickTree, parent: Option<usize>, source: usize) -> usize {
        let data = self.tree[source].data();
        let id = out.add_node(
            parent,
            Data {
                name: data.name.clone(),
                attrs: data.attrs.clone(),
            },
        );
        if let Some(&branch) = self.tree[source].branch() {
            out[id].set_branch(branch);
        }
        id
    }

    /// Render as a Newick string terminated by `;`
    pub fn to_newick(&self) -> String {
        let mut text = Newick::to_newick(&self.tree, false);
        if !text.trim_end().ends_with(';') {
            text.push(';');
        }
        text
    }
}

/// Parse a Newick string holding a single tree
pub fn parse_newick(text: &str) -> Result<PhylogeneticTree> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CurateError::NewickParse("Empty tree".to_string()));
    }

    let tree = newick::one_from_string(text)
        .map(PhylogeneticTree::from_newick_tree)
        .map_err(|e| CurateError::NewickParse(e.to_string()))?;

    if tree
        .preorder()
        .into_iter()
        .any(|id| tree.is_leaf(id) && tree.name(id).map_or(true, str::is_empty))
    {
        return Err(CurateError::NewickParse("Leaf without a name".to_string()));
    }
    Ok(tree)
}

pub fn parse_newick_file<P: AsRef<Path>>(path: P) -> Result<PhylogeneticTree> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(CurateError::MissingInput(path.to_path_buf()));
    }
    let text = fs::read_to_string(path)?;
    let tree = parse_newick(&text)
        .map_err(|e| CurateError::NewickParse(format!("{}: {}", path.display(), e)))?;
    info!("Loaded tree with {} leaves from {}", tree.leaf_names().len(), path.display());
    Ok(tree)
}

pub fn write_newick_file<P: AsRef<Path>>(path: P, tree: &PhylogeneticTree) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, format!("{}\n", tree.to_newick().trim_end()))?;
    debug!("Wrote tree to {}", path.display());
    Ok(())
}

/// Patristic distances between the leaves of a tree
pub struct TreeDistanceOracle {
    tree: PhylogeneticTree,
    leaves: HashMap<String, usize>,
    /// Summed branch length from the root
    depth: HashMap<usize, f64>,
    /// Number of edges from the root
    level: HashMap<usize, usize>,
}

impl TreeDistanceOracle {
    pub fn new(tree: PhylogeneticTree) -> Result<Self> {
        let mut depth = HashMap::new();
        let mut level = HashMap::new();
        let mut leaves = HashMap::new();

        depth.insert(tree.root(), 0.0);
        level.insert(tree.root(), 0usize);
        for id in tree.preorder() {
            if tree.is_leaf(id) {
                if let Some(name) = tree.name(id) {
                    if leaves.insert(name.to_string(), id).is_some() {
                        return Err(CurateError::NewickParse(format!(
                            "Leaf name {} appears more than once",
                            name
                        )));
                    }
                }
            }
            let (d, l) = (depth[&id], level[&id]);
            for &child in tree.children(id) {
                depth.insert(child, d + tree.branch_length(child));
                level.insert(child, l + 1);
            }
        }

        Ok(Self {
            tree,
            leaves,
            depth,
            level,
        })
    }

    pub fn tree(&self) -> &PhylogeneticTree {
        &self.tree
    }

    pub fn has_leaf(&self, name: &str) -> bool {
        self.leaves.contains_key(name)
    }

    fn leaf(&self, name: &str) -> Result<usize> {
        self.leaves
            .get(name)
            .copied()
            .ok_or_else(|| CurateError::Lookup(format!("{} is not a leaf of the tree", name)))
    }

    fn common_ancestor(&self, mut a: usize, mut b: usize) -> usize {
        while self.level[&a] > self.level[&b] {
            a = self.tree.parent(a).unwrap_or(a);
        }
        while self.level[&b] > self.level[&a] {
            b = self.tree.parent(b).unwrap_or(b);
        }
        while a != b {
            match (self.tree.parent(a), self.tree.parent(b)) {
                (Some(pa), Some(pb)) => {
                    a = pa;
                    b = pb;
                }
                _ => break,
            }
        }
        a
    }

    /// Summed branch length on the path between two leaves
    pub fn distance(&self, a: &str, b: &str) -> Result<f64> {
        let (ia, ib) = (self.leaf(a)?, self.leaf(b)?);
        let ancestor = self.common_ancestor(ia, ib);
        Ok(self.depth[&ia] + self.depth[&ib] - 2.0 * self.depth[&ancestor])
    }
}
