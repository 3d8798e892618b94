//! Coarsening of the skeleton tree by melding leaves into their parents.

use tracing::debug;

use crate::{skeleton::CostTree, types::key::HierarchicalKey};

impl<K: HierarchicalKey> CostTree<K> {
    /// Whether `key` has children and every one of them present in the tree is a leaf.
    fn children_are_leaves(&self, key: &K) -> bool {
        match self.get(key) {
            Some(node) if !node.is_leaf() => self
                .present_children(key)
                .iter()
                .all(|child| self.get(child).map_or(true, |c| c.is_leaf())),
            _ => false,
        }
    }

    /// Fold the children of `key` into it if all of them are leaves. The children's costs are
    /// added to the node, they are removed from the tree and the node becomes a leaf.
    ///
    /// Returns whether the node was melded. Subtree costs must be aggregated again afterwards.
    pub fn meld(&mut self, key: &K) -> bool {
        if !self.children_are_leaves(key) {
            return false;
        }

        let absorbed: u64 = self
            .flagged_children(key)
            .iter()
            .filter_map(|child| self.remove(child))
            .map(|child| child.cost)
            .sum();

        match self.get_mut(key) {
            Some(node) => {
                node.cost += absorbed;
                node.subtree_cost = node.cost;
                node.child_exists.clear();
                true
            }
            None => false,
        }
    }

    /// One rollup pass over the whole tree: every node whose children are all leaves at the
    /// start of the pass is melded. Returns the number of melded nodes.
    pub fn coarsen_all(&mut self) -> usize {
        let mut candidates: Vec<K> = self
            .keys()
            .filter(|key| self.children_are_leaves(key))
            .copied()
            .collect();
        candidates.sort();

        let melded = candidates.iter().filter(|key| self.meld(key)).count();

        debug!(melded, nodes = self.len(), "coarsened skeleton tree");
        melded
    }
}
