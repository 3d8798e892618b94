//! Adaptive 2^D-trees built from point clouds, the structure whose load is balanced by the
//! binary and the benchmarks.

use std::collections::HashMap;
use std::ops::Deref;

use tracing::debug;

use crate::{
    constants::{DEEPEST_LEVEL, DEFAULT_COST},
    skeleton::{CostModel, SourceStructure},
    types::{
        domain::Domain,
        key::{HierarchicalKey, Key},
        node::ChildMask,
        Cost, Level,
    },
};

/// Node of an `AdaptiveTree`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TreeNode {
    /// Children of the node, either none or all of them.
    pub children: ChildMask,

    /// Number of points in the node's box.
    pub npoints: usize,
}

/// Tree refined until no leaf holds more than `ncrit` points.
#[derive(Clone, Debug)]
pub struct AdaptiveTree<const D: usize> {
    pub domain: Domain<D>,
    pub ncrit: usize,
    nodes: HashMap<Key<D>, TreeNode>,
}

impl<const D: usize> AdaptiveTree<D> {
    /// Build a tree over the bounding box of `points`.
    pub fn new(points: &[[f64; D]], ncrit: usize) -> Self {
        AdaptiveTree::with_domain(points, Domain::from_points(points), ncrit)
    }

    /// Build a tree over a given domain, points outside of it are clamped to its boundary.
    pub fn with_domain(points: &[[f64; D]], domain: Domain<D>, ncrit: usize) -> Self {
        let encoded: Vec<Key<D>> = points
            .iter()
            .map(|p| Key::from_point(p, &domain, DEEPEST_LEVEL))
            .collect();

        let mut nodes = HashMap::new();
        let mut work_list = vec![(Key::<D>::root(), encoded)];

        while let Some((block, contained)) = work_list.pop() {
            let npoints = contained.len();

            if npoints <= ncrit || block.level() >= DEEPEST_LEVEL {
                nodes.insert(
                    block,
                    TreeNode {
                        children: ChildMask::EMPTY,
                        npoints,
                    },
                );
                continue;
            }

            let mut buckets: Vec<Vec<Key<D>>> = vec![Vec::new(); Key::<D>::BRANCHING];
            let shift = DEEPEST_LEVEL - block.level() - 1;
            for key in contained {
                buckets[key.parent(shift).child_index()].push(key);
            }

            nodes.insert(
                block,
                TreeNode {
                    children: ChildMask::full(Key::<D>::BRANCHING),
                    npoints,
                },
            );
            work_list.extend(block.children().into_iter().zip(buckets));
        }

        debug!(nodes = nodes.len(), npoints = points.len(), ncrit, "built adaptive tree");

        AdaptiveTree {
            domain,
            ncrit,
            nodes,
        }
    }

    /// Complete tree of the given depth over the unit box without points.
    pub fn uniform(depth: Level) -> Self {
        let mut nodes = HashMap::new();
        let mut level = vec![Key::<D>::root()];

        for current in 0..=depth {
            let children = if current < depth {
                ChildMask::full(Key::<D>::BRANCHING)
            } else {
                ChildMask::EMPTY
            };

            for key in level.iter() {
                nodes.insert(*key, TreeNode { children, npoints: 0 });
            }
            level = level.iter().flat_map(|key| key.children()).collect();
        }

        AdaptiveTree {
            domain: Domain::unit(),
            ncrit: 0,
            nodes,
        }
    }

    /// Leaves sorted in depth-first order.
    pub fn leaves(&self) -> Vec<Key<D>> {
        let mut leaves: Vec<Key<D>> = self
            .nodes
            .iter()
            .filter(|(_, node)| !node.children.any())
            .map(|(key, _)| *key)
            .collect();
        leaves.sort();
        leaves
    }

    /// Level of the deepest leaf.
    pub fn depth(&self) -> Level {
        self.nodes.keys().map(|key| key.level()).max().unwrap_or(0)
    }
}

impl<const D: usize> Deref for AdaptiveTree<D> {
    type Target = HashMap<Key<D>, TreeNode>;

    fn deref(&self) -> &Self::Target {
        &self.nodes
    }
}

impl<const D: usize> SourceStructure<Key<D>> for AdaptiveTree<D> {
    fn root(&self) -> Key<D> {
        Key::root()
    }

    fn nodes(&self) -> Box<dyn Iterator<Item = (Key<D>, ChildMask)> + '_> {
        Box::new(self.nodes.iter().map(|(key, node)| (*key, node.children)))
    }
}

/// Leaves cost the number of points they hold, at least one, interior nodes cost
/// `DEFAULT_COST`.
#[derive(Clone, Copy, Debug)]
pub struct PointCount<'a, const D: usize>(pub &'a AdaptiveTree<D>);

impl<'a, const D: usize> CostModel<Key<D>> for PointCount<'a, D> {
    fn cost(&self, key: &Key<D>, children: ChildMask) -> Cost {
        if children.any() {
            return DEFAULT_COST;
        }

        self.0
            .get(key)
            .map_or(DEFAULT_COST, |node| (node.npoints as Cost).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::helpers::random_points;
    use crate::skeleton::CostTree;
    use crate::types::key::{OctKey, QuadKey};

    fn tree_fixture() -> AdaptiveTree<3> {
        AdaptiveTree::new(&random_points::<3>(1000, 0), 150)
    }

    #[test]
    fn test_leaves_respect_ncrit() {
        let tree = tree_fixture();
        let leaves = tree.leaves();

        assert!(leaves.iter().all(|leaf| tree[leaf].npoints <= 150));
        assert_eq!(leaves.iter().map(|leaf| tree[leaf].npoints).sum::<usize>(), 1000);
        assert_eq!(tree[&OctKey::root()].npoints, 1000);
        assert!(tree.depth() >= 1);
    }

    #[test]
    fn test_tree_is_complete() {
        let tree = tree_fixture();

        for (key, node) in tree.iter() {
            if key.level() > 0 {
                let parent = &tree[&key.parent(1)];
                assert_eq!(parent.children.count(), 8);
            }

            if node.children.any() {
                let npoints: usize = key.children().iter().map(|c| tree[c].npoints).sum();
                assert_eq!(npoints, node.npoints);
            }
        }
    }

    #[test]
    fn test_uniform() {
        let tree = AdaptiveTree::<2>::uniform(2);

        assert_eq!(tree.len(), 21);
        assert_eq!(tree.leaves().len(), 16);
        assert!(tree.leaves().iter().all(|leaf| leaf.level() == 2));
        assert!(tree[&QuadKey::root()].children.any());
    }

    #[test]
    fn test_point_count_cost() {
        let tree = tree_fixture();
        let mut skeleton = CostTree::snapshot(&tree, &PointCount(&tree));

        let interior = tree.values().filter(|node| node.children.any()).count() as Cost;
        let leaves: Cost = tree
            .leaves()
            .iter()
            .map(|leaf| (tree[leaf].npoints as Cost).max(1))
            .sum();

        let total = skeleton.aggregate(&tree.root()).unwrap().total;
        assert_eq!(total, interior + leaves);
    }
}
