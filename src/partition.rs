//! Depth-first greedy partitioning of a skeleton tree into cost balanced pieces.
//!
//! Pieces are carved one at a time, from owner `npieces - 1` down to owner 0. Each carve walks
//! the tree depth first and takes whole untaken subtrees while they fit in the piece's target
//! cost, so that every piece is a contiguous run of the depth-first order. Taking a subtree marks
//! it and removes its cost from all of its ancestors, so that later carves only see what is left.
//! The last carve absorbs everything that remains.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{
    config::CoarseningWeights,
    error::{BalanceError, Result},
    skeleton::CostTree,
    types::{key::HierarchicalKey, Cost, Rank},
};

/// A key and the process that owns it, together with everything below it that is not assigned
/// to some other process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Assignment<K> {
    pub key: K,
    pub owner: Rank,
}

impl<K> Assignment<K> {
    pub fn new(key: K, owner: Rank) -> Self {
        Assignment { key, owner }
    }
}

/// Output of a partitioning run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition<K> {
    /// Assigned keys in the order in which they were carved.
    pub assignments: Vec<Assignment<K>>,

    /// Cost carved for each owner.
    pub costs: Vec<Cost>,

    /// Largest cost carved for a single owner.
    pub max_cost: Cost,

    /// Total cost that was partitioned.
    pub total_cost: Cost,
}

impl<K> Partition<K> {
    pub fn npieces(&self) -> usize {
        self.costs.len()
    }

    /// Keys assigned to `owner`.
    pub fn keys_of(&self, owner: Rank) -> impl Iterator<Item = &K> {
        self.assignments
            .iter()
            .filter(move |a| a.owner == owner)
            .map(|a| &a.key)
    }
}

/// Target cost of the next piece, given what remains to be distributed.
pub fn target_size(remaining_cost: Cost, remaining_parts: usize) -> Cost {
    if remaining_parts == 0 {
        remaining_cost
    } else {
        remaining_cost / remaining_parts as Cost
    }
}

/// Score of a partition of a tree with `node_count` scheduling units, lower is better.
/// Only used to compare coarsening rounds with each other.
pub fn weigh_coalesced(cost: Cost, node_count: usize, weights: &CoarseningWeights) -> f64 {
    weights.cost_factor * cost as f64 + weights.node_factor * node_count as f64
}

impl<K: HierarchicalKey> CostTree<K> {
    /// Children of `key` stored in the tree that are not taken yet, in child order.
    fn untaken_children(&self, key: &K) -> Vec<K> {
        self.present_children(key)
            .into_iter()
            .filter(|child| self.get(child).map_or(false, |node| !node.taken))
            .collect()
    }

    /// Take the remaining subtree below `key` as one unit.
    fn take(&mut self, key: &K, units: &mut Vec<K>) -> Cost {
        let cost = match self.get(key) {
            Some(node) => node.subtree_cost,
            None => return 0,
        };

        trace!(?key, cost, "taking subtree");

        units.push(*key);
        self.mark_taken(key);
        self.remove_cost(key, cost);
        cost
    }

    /// Carve units below `key` into the current piece, whose target is `budget` and of which
    /// `used` is already filled. Taken keys are appended to `units`. Returns the filled cost.
    ///
    /// If `is_last` is set everything that remains below `key` is taken. Otherwise fitting
    /// subtrees are taken whole, and the walk descends into the first child that does not fit
    /// and stops there. A leaf that does not fit is taken as long as the piece is below its
    /// target, so a piece overshoots by at most one leaf.
    pub fn carve_one(
        &mut self,
        key: &K,
        budget: Cost,
        is_last: bool,
        mut used: Cost,
        units: &mut Vec<K>,
    ) -> Cost {
        let node = match self.get(key) {
            Some(node) if !node.taken => *node,
            _ => return used,
        };

        if is_last || node.subtree_cost <= budget.saturating_sub(used) {
            return used + self.take(key, units);
        }

        let children = self.untaken_children(key);

        if children.is_empty() {
            if used < budget {
                used += self.take(key, units);
            }
            return used;
        }

        for child in children {
            let child_cost = self.get(&child).map_or(0, |node| node.subtree_cost);

            if child_cost <= budget.saturating_sub(used) {
                used += self.take(&child, units);
            } else {
                used = self.carve_one(&child, budget, is_last, used, units);
                break;
            }

            if used >= budget {
                break;
            }
        }

        // With its children carved the node's own cost may fit now.
        if let Some(node) = self.get(key) {
            if !node.taken && node.subtree_cost <= budget.saturating_sub(used) {
                used += self.take(key, units);
            }
        }

        used
    }

    /// Split the tree below `root` into `npieces` cost balanced pieces. Owners are assigned
    /// from `npieces - 1` down to 0, owner 0 receives everything left over.
    ///
    /// Subtree costs must have been aggregated before, `total_cost` is normally the root's
    /// aggregated total.
    pub fn partition(&mut self, root: &K, npieces: usize, total_cost: Cost) -> Result<Partition<K>> {
        if npieces == 0 || npieces > Rank::MAX as usize {
            return Err(BalanceError::InvalidPieces(npieces));
        }

        if !self.contains_key(root) {
            return Err(BalanceError::MissingRoot(format!("{:?}", root)));
        }

        let mut cost_left = total_cost;
        let mut costs = vec![0; npieces];
        let mut assignments = Vec::new();

        for owner in (0..npieces).rev() {
            let parts_left = owner + 1;
            let target = target_size(cost_left, parts_left);

            let mut units = Vec::new();
            let used = self.carve_one(root, target, owner == 0, 0, &mut units);

            debug!(owner, target, used, units = units.len(), "carved partition");

            cost_left = cost_left.saturating_sub(used);
            costs[owner] = used;
            assignments.extend(units.into_iter().map(|key| Assignment::new(key, owner as Rank)));
        }

        let max_cost = costs.iter().copied().max().unwrap_or(0);

        Ok(Partition {
            assignments,
            costs,
            max_cost,
            total_cost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;

    use crate::skeleton::tests::complete_fixture;
    use crate::types::{
        key::{BinaryKey, Key, OctKey, QuadKey},
        node::{ChildMask, SkeletonNode},
    };

    fn partitioned<const D: usize>(
        mut tree: CostTree<Key<D>>,
        npieces: usize,
    ) -> (CostTree<Key<D>>, Partition<Key<D>>) {
        let root = Key::<D>::root();
        let total = tree.aggregate(&root).unwrap().total;
        let partition = tree.partition(&root, npieces, total).unwrap();
        (tree, partition)
    }

    /// Owner of every key in the tree, resolved through the nearest assigned foreparent.
    fn owners<const D: usize>(
        tree: &CostTree<Key<D>>,
        partition: &Partition<Key<D>>,
    ) -> Vec<(Key<D>, Rank)> {
        tree.keys()
            .map(|key| {
                let owner = partition
                    .assignments
                    .iter()
                    .filter(|a| a.key.is_foreparent_of(key))
                    .max_by_key(|a| a.key.level())
                    .map(|a| a.owner)
                    .unwrap();
                (*key, owner)
            })
            .collect()
    }

    #[test]
    fn test_target_size() {
        assert_eq!(target_size(15, 3), 5);
        assert_eq!(target_size(10, 3), 3);
        assert_eq!(target_size(7, 0), 7);
        assert_eq!(target_size(0, 4), 0);
    }

    #[test]
    fn test_weigh_coalesced() {
        let weights = CoarseningWeights {
            cost_factor: 1.0,
            node_factor: 0.5,
        };
        assert_eq!(weigh_coalesced(10, 4, &weights), 12.0);
        assert!(weigh_coalesced(10, 2, &weights) < weigh_coalesced(10, 4, &weights));
    }

    #[test]
    fn test_binary_tree_three_pieces() {
        let (tree, partition) = partitioned(complete_fixture::<1>(3), 3);

        assert_eq!(partition.costs.iter().sum::<Cost>(), 15);
        assert!(partition.costs.iter().all(|&c| c >= 5), "{:?}", partition.costs);
        assert!(partition.max_cost >= 5);

        // Every node is taken and no untaken cost is left anywhere.
        assert!(tree.values().all(|node| node.taken && node.subtree_cost == 0));
        assert_eq!(tree[&BinaryKey::root()].subtree_cost, 0);
    }

    #[test]
    fn test_single_piece() {
        let (tree, partition) = partitioned(complete_fixture::<2>(3), 1);

        assert_eq!(
            partition.assignments,
            vec![Assignment::new(QuadKey::root(), 0)]
        );
        assert_eq!(partition.max_cost, 85);
        assert!(owners(&tree, &partition).iter().all(|&(_, owner)| owner == 0));
    }

    #[test]
    fn test_costs_sum_to_total() {
        for npieces in 1..20 {
            let (_, partition) = partitioned(complete_fixture::<3>(2), npieces);

            assert_eq!(partition.costs.iter().sum::<Cost>(), 73);
            assert_eq!(partition.total_cost, 73);
            assert_eq!(partition.npieces(), npieces);

            let unique: HashSet<OctKey> = partition.assignments.iter().map(|a| a.key).collect();
            assert_eq!(unique.len(), partition.assignments.len());
        }
    }

    #[test]
    fn test_pieces_are_balanced() {
        let (_, partition) = partitioned(complete_fixture::<2>(4), 7);
        let target = 341 / 7;

        // Non-last pieces reach their target and overshoot by at most one leaf.
        for &cost in partition.costs[1..].iter() {
            assert!(cost >= target && cost <= target + 1, "{:?}", partition.costs);
        }
    }

    #[test]
    fn test_pieces_are_contiguous() {
        let (tree, partition) = partitioned(complete_fixture::<1>(5), 4);
        let mut resolved = owners(&tree, &partition);
        resolved.sort();

        // Leaves in depth-first order visit every owner in one contiguous run.
        let leaf_owners: Vec<Rank> = resolved
            .iter()
            .filter(|(key, _)| key.level() == 5)
            .map(|&(_, owner)| owner)
            .collect();
        let mut runs = leaf_owners.clone();
        runs.dedup();

        let unique: HashSet<Rank> = runs.iter().copied().collect();
        assert_eq!(runs.len(), unique.len(), "{:?}", leaf_owners);
    }

    #[test]
    fn test_more_pieces_than_leaves() {
        let (tree, partition) = partitioned(complete_fixture::<1>(1), 8);

        assert_eq!(partition.costs.iter().sum::<Cost>(), 3);
        assert!(partition.costs.iter().filter(|&&c| c == 0).count() >= 5);
        assert!(tree.values().all(|node| node.taken));
    }

    #[test]
    fn test_zero_cost_tree() {
        let root = BinaryKey::root();
        let mut tree = complete_fixture::<1>(2);
        for key in tree.keys().copied().collect::<Vec<_>>() {
            let mask = tree[&key].child_exists;
            tree.insert(key, SkeletonNode::new(0, mask));
        }

        let total = tree.aggregate(&root).unwrap().total;
        assert_eq!(total, 0);

        let partition = tree.partition(&root, 3, total).unwrap();
        assert_eq!(partition.assignments, vec![Assignment::new(root, 2)]);
        assert_eq!(partition.max_cost, 0);
    }

    #[test]
    fn test_oversized_leaf() {
        let root = BinaryKey::root();
        let mut tree = CostTree::new();
        tree.insert(root, SkeletonNode::new(1, ChildMask::full(2)));
        tree.insert(root.child(0), SkeletonNode::new(10, ChildMask::EMPTY));
        tree.insert(root.child(1), SkeletonNode::new(1, ChildMask::EMPTY));

        let total = tree.aggregate(&root).unwrap().total;
        let partition = tree.partition(&root, 2, total).unwrap();

        // Owner 1 has a target of 6 and takes the whole leaf of cost 10.
        assert_eq!(partition.costs, vec![2, 10]);
        assert_eq!(partition.max_cost, 10);
    }

    #[test]
    fn test_invalid_pieces() {
        let mut tree = complete_fixture::<1>(1);
        let root = BinaryKey::root();
        tree.aggregate(&root).unwrap();

        assert!(matches!(
            tree.partition(&root, 0, 3),
            Err(BalanceError::InvalidPieces(0))
        ));
    }
}
