//! The skeleton tree, a lightweight mirror of a tree's structure and cost used for balancing.

use std::collections::HashMap;
use std::fmt::Write;
use std::ops::Deref;

use tracing::debug;

use crate::{
    constants::DEFAULT_COST,
    types::{
        key::HierarchicalKey,
        node::{ChildMask, SkeletonNode},
        Cost,
    },
};

/// A structure whose shape can be mirrored into a skeleton tree.
pub trait SourceStructure<K: HierarchicalKey> {
    /// Key of the node from which balancing starts.
    fn root(&self) -> K;

    /// Every node of the structure together with the children it has.
    fn nodes(&self) -> Box<dyn Iterator<Item = (K, ChildMask)> + '_>;
}

/// Assigns a cost to each node when a skeleton tree is snapshotted.
pub trait CostModel<K> {
    fn cost(&self, key: &K, children: ChildMask) -> Cost;
}

/// Every node costs `DEFAULT_COST`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitCost;

impl<K> CostModel<K> for UnitCost {
    fn cost(&self, _key: &K, _children: ChildMask) -> Cost {
        DEFAULT_COST
    }
}

impl<K, F> CostModel<K> for F
where
    F: Fn(&K, ChildMask) -> Cost,
{
    fn cost(&self, key: &K, children: ChildMask) -> Cost {
        self(key, children)
    }
}

/// Mapping from keys to skeleton nodes, owns the snapshot for one balancing run.
#[derive(Debug, Clone, Default)]
pub struct CostTree<K> {
    nodes: HashMap<K, SkeletonNode>,
}

impl<K: HierarchicalKey> CostTree<K> {
    pub fn new() -> Self {
        CostTree {
            nodes: HashMap::new(),
        }
    }

    /// Freeze the shape of `source` into a fresh local skeleton tree.
    pub fn snapshot<S, C>(source: &S, cost_model: &C) -> Self
    where
        S: SourceStructure<K> + ?Sized,
        C: CostModel<K> + ?Sized,
    {
        let nodes: HashMap<K, SkeletonNode> = source
            .nodes()
            .map(|(key, children)| (key, SkeletonNode::new(cost_model.cost(&key, children), children)))
            .collect();

        debug!(nodes = nodes.len(), "snapshotted skeleton tree");

        CostTree { nodes }
    }

    pub fn insert(&mut self, key: K, node: SkeletonNode) -> Option<SkeletonNode> {
        self.nodes.insert(key, node)
    }

    pub fn remove(&mut self, key: &K) -> Option<SkeletonNode> {
        self.nodes.remove(key)
    }

    pub(crate) fn get_mut(&mut self, key: &K) -> Option<&mut SkeletonNode> {
        self.nodes.get_mut(key)
    }

    /// Keys of the children flagged as present in the node's `child_exists`, whether or not
    /// they are stored in the tree.
    pub fn flagged_children(&self, key: &K) -> Vec<K> {
        match self.nodes.get(key) {
            Some(node) => key
                .children()
                .into_iter()
                .enumerate()
                .filter(|(index, _)| node.child_exists.has(*index))
                .map(|(_, child)| child)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Keys of the flagged children that are stored in the tree.
    pub fn present_children(&self, key: &K) -> Vec<K> {
        self.flagged_children(key)
            .into_iter()
            .filter(|child| self.nodes.contains_key(child))
            .collect()
    }

    /// Mark the node and all of its descendants as taken, none of them has untaken cost left.
    pub fn mark_taken(&mut self, key: &K) {
        let mut work_list = vec![*key];

        while let Some(current) = work_list.pop() {
            let children = self.present_children(&current);
            if let Some(node) = self.nodes.get_mut(&current) {
                node.taken = true;
                node.subtree_cost = 0;
            }
            work_list.extend(children);
        }
    }

    /// Subtract `cost` from the subtree cost of every strict ancestor of `key`.
    pub fn remove_cost(&mut self, key: &K, cost: Cost) {
        for n in 1..=key.level() {
            if let Some(node) = self.nodes.get_mut(&key.parent(n)) {
                node.subtree_cost = node.subtree_cost.saturating_sub(cost);
            }
        }
    }

    /// All entries sorted by key.
    pub fn entries(&self) -> Vec<(K, SkeletonNode)> {
        let mut entries: Vec<(K, SkeletonNode)> =
            self.nodes.iter().map(|(key, node)| (*key, *node)).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Human readable dump of the subtree below `key`, one indented line per node.
    pub fn dump(&self, key: &K) -> String {
        let mut out = String::new();
        self.dump_impl(key, key.level(), &mut out);
        out
    }

    fn dump_impl(&self, key: &K, base: u32, out: &mut String) {
        if let Some(node) = self.nodes.get(key) {
            for _ in base..key.level() {
                out.push_str("  ");
            }
            // Writing into a String cannot fail.
            let _ = writeln!(out, "{:?} {}", key, node);

            for child in self.present_children(key) {
                self.dump_impl(&child, base, out);
            }
        }
    }
}

impl<K> Deref for CostTree<K> {
    type Target = HashMap<K, SkeletonNode>;

    fn deref(&self) -> &Self::Target {
        &self.nodes
    }
}

impl<K: HierarchicalKey> FromIterator<(K, SkeletonNode)> for CostTree<K> {
    fn from_iter<I: IntoIterator<Item = (K, SkeletonNode)>>(iter: I) -> Self {
        CostTree {
            nodes: iter.into_iter().collect(),
        }
    }
}
