//! Bottom-up aggregation of subtree costs.

use tracing::warn;

use crate::{
    error::{BalanceError, Result},
    skeleton::CostTree,
    types::{key::HierarchicalKey, Cost},
};

/// Result of an aggregation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregate {
    /// Total cost of the tree below the root.
    pub total: Cost,

    /// Number of children flagged as present that are missing from the tree.
    pub missing: usize,
}

impl<K: HierarchicalKey> CostTree<K> {
    /// Compute `subtree_cost` for every node below `root` and return the root's total.
    ///
    /// Children that are flagged in `child_exists` but absent from the tree contribute zero
    /// cost, they are counted in `Aggregate::missing`.
    pub fn aggregate(&mut self, root: &K) -> Result<Aggregate> {
        if !self.contains_key(root) {
            return Err(BalanceError::MissingRoot(format!("{:?}", root)));
        }

        let mut missing = 0;
        let total = self.aggregate_impl(root, &mut missing);

        if missing > 0 {
            warn!(missing, "children flagged present are missing from the skeleton tree");
        }

        Ok(Aggregate { total, missing })
    }

    fn aggregate_impl(&mut self, key: &K, missing: &mut usize) -> Cost {
        let node = match self.get(key) {
            Some(node) => *node,
            None => {
                *missing += 1;
                return 0;
            }
        };

        let mut total = node.cost;
        for (index, child) in key.children().iter().enumerate() {
            if node.child_exists.has(index) {
                total += self.aggregate_impl(child, missing);
            }
        }

        if let Some(node) = self.get_mut(key) {
            node.subtree_cost = total;
        }

        total
    }
}
