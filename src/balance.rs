//! The load balancer, computing a process map for a source structure.
//!
//! A balancing run snapshots the structure into a skeleton tree, optionally coarsens it,
//! aggregates subtree costs, partitions the tree into one piece per process and builds a process
//! map from the resulting assignments. Moving data to its new owners is left to the caller.

use tracing::{debug, info};

use crate::{
    aggregate::Aggregate,
    config::{BalanceConfig, Coarsening},
    constants::MAX_COARSEN_ROUNDS,
    error::{BalanceError, Result},
    partition::{weigh_coalesced, Assignment, Partition},
    pmap::ProcessMap,
    skeleton::{CostModel, CostTree, SourceStructure, UnitCost},
    types::{key::HierarchicalKey, Rank},
};

/// Outcome of a balancing run.
#[derive(Clone, Debug)]
pub struct BalancePlan<K> {
    /// Process map built from the chosen partition.
    pub map: ProcessMap<K>,

    /// The chosen partition.
    pub partition: Partition<K>,

    /// Number of rollup passes applied before the chosen partition was computed.
    pub rounds: usize,

    /// Number of nodes in the skeleton tree that was partitioned.
    pub nodes: usize,

    /// Children flagged as present in that tree but missing from it. They carry no cost and
    /// are owned through their nearest assigned foreparent.
    pub missing: usize,

    /// Score of the chosen partition as computed by `weigh_coalesced`.
    pub score: f64,
}

/// A partition together with the shape of the tree it was carved from.
struct Round<K> {
    partition: Partition<K>,
    rounds: usize,
    nodes: usize,
    missing: usize,
    score: f64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LoadBalancer {
    pub config: BalanceConfig,
}

impl LoadBalancer {
    pub fn new(config: BalanceConfig) -> Self {
        LoadBalancer { config }
    }

    /// Compute a process map for `source` over `nproc` processes, every node costing one unit.
    pub fn load_balance<K, S>(&self, source: &S, nproc: usize) -> Result<ProcessMap<K>>
    where
        K: HierarchicalKey,
        S: SourceStructure<K> + ?Sized,
    {
        self.load_balance_with(source, &UnitCost, nproc)
    }

    /// Compute a process map for `source` over `nproc` processes with node costs taken from
    /// `cost_model`.
    pub fn load_balance_with<K, S, C>(
        &self,
        source: &S,
        cost_model: &C,
        nproc: usize,
    ) -> Result<ProcessMap<K>>
    where
        K: HierarchicalKey,
        S: SourceStructure<K> + ?Sized,
        C: CostModel<K> + ?Sized,
    {
        Ok(self.plan(source, cost_model, nproc)?.map)
    }

    /// Like `load_balance_with`, also returning the partition the map was built from.
    pub fn plan<K, S, C>(&self, source: &S, cost_model: &C, nproc: usize) -> Result<BalancePlan<K>>
    where
        K: HierarchicalKey,
        S: SourceStructure<K> + ?Sized,
        C: CostModel<K> + ?Sized,
    {
        let tree = CostTree::snapshot(source, cost_model);
        self.plan_tree(tree, &source.root(), nproc)
    }

    /// Balance an already materialized skeleton tree, such as one gathered from all processes.
    pub fn plan_tree<K: HierarchicalKey>(
        &self,
        mut tree: CostTree<K>,
        root: &K,
        nproc: usize,
    ) -> Result<BalancePlan<K>> {
        if nproc == 0 || nproc > Rank::MAX as usize {
            return Err(BalanceError::InvalidPieces(nproc));
        }

        let round = match self.config.coarsening {
            Coarsening::None => self.partition_round(tree, root, nproc, 0)?,
            Coarsening::Once => {
                tree.coarsen_all();
                self.partition_round(tree, root, nproc, 1)?
            }
            Coarsening::Search { max_rounds } => self.search(tree, root, nproc, max_rounds)?,
        };

        let map = ProcessMap::from_assignments(&round.partition.assignments)?;

        info!(
            nproc,
            rounds = round.rounds,
            nodes = round.nodes,
            missing = round.missing,
            units = round.partition.assignments.len(),
            max_cost = round.partition.max_cost,
            total_cost = round.partition.total_cost,
            "computed process map"
        );

        Ok(BalancePlan {
            map,
            partition: round.partition,
            rounds: round.rounds,
            nodes: round.nodes,
            missing: round.missing,
            score: round.score,
        })
    }

    /// Assignments of the best scoring partition over successive rollup passes of `tree`.
    pub fn find_best_partition<K: HierarchicalKey>(
        &self,
        tree: CostTree<K>,
        root: &K,
        nproc: usize,
    ) -> Result<Vec<Assignment<K>>> {
        if nproc == 0 || nproc > Rank::MAX as usize {
            return Err(BalanceError::InvalidPieces(nproc));
        }

        let max_rounds = match self.config.coarsening {
            Coarsening::Search { max_rounds } => max_rounds,
            _ => MAX_COARSEN_ROUNDS,
        };

        Ok(self.search(tree, root, nproc, max_rounds)?.partition.assignments)
    }

    /// Partition the tree after 0, 1, ... rollup passes and keep the lowest score. Stops once
    /// the root is a leaf, a pass melds nothing or `max_rounds` passes were made.
    fn search<K: HierarchicalKey>(
        &self,
        mut tree: CostTree<K>,
        root: &K,
        nproc: usize,
        max_rounds: usize,
    ) -> Result<Round<K>> {
        let mut best = self.partition_round(tree.clone(), root, nproc, 0)?;

        for rounds in 1..=max_rounds {
            if tree.get(root).map_or(true, |node| node.is_leaf()) || tree.coarsen_all() == 0 {
                break;
            }

            let candidate = self.partition_round(tree.clone(), root, nproc, rounds)?;
            debug!(rounds, score = candidate.score, best = best.score, "scored coarsening round");

            if candidate.score < best.score {
                best = candidate;
            }
        }

        Ok(best)
    }

    /// Aggregate and partition a scratch tree.
    fn partition_round<K: HierarchicalKey>(
        &self,
        mut tree: CostTree<K>,
        root: &K,
        nproc: usize,
        rounds: usize,
    ) -> Result<Round<K>> {
        let Aggregate { total, missing } = tree.aggregate(root)?;
        let nodes = tree.len();

        let partition = if nproc == 1 {
            Partition {
                assignments: vec![Assignment::new(*root, 0)],
                costs: vec![total],
                max_cost: total,
                total_cost: total,
            }
        } else {
            tree.partition(root, nproc, total)?
        };

        let score = weigh_coalesced(partition.max_cost, nodes, &self.config.weights);

        Ok(Round {
            partition,
            rounds,
            nodes,
            missing,
            score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::CoarseningWeights;
    use crate::helpers::random_points;
    use crate::tree::{AdaptiveTree, PointCount};
    use crate::types::{
        key::{BinaryKey, OctKey, QuadKey},
        node::{ChildMask, SkeletonNode},
        Cost,
    };

    fn tree_fixture() -> AdaptiveTree<3> {
        AdaptiveTree::new(&random_points::<3>(2000, 0), 100)
    }

    #[test]
    fn test_load_balance() {
        let tree = tree_fixture();
        let balancer = LoadBalancer::default();
        let plan = balancer.plan(&tree, &PointCount(&tree), 4).unwrap();

        let total: Cost = plan.partition.costs.iter().sum();
        assert_eq!(total, plan.partition.total_cost);

        let mut leaf_owners: Vec<Rank> = tree.leaves().iter().map(|leaf| plan.map.owner(leaf)).collect();
        assert!(leaf_owners.iter().all(|&owner| (0..4).contains(&owner)));

        leaf_owners.dedup();
        assert_eq!(leaf_owners.len(), 4, "{:?}", leaf_owners);
    }

    #[test]
    fn test_single_process() {
        let tree = tree_fixture();
        let map = LoadBalancer::default().load_balance(&tree, 1).unwrap();

        match &map {
            ProcessMap::Trie(trie) => {
                assert_eq!(trie.assignments(), vec![Assignment::new(OctKey::root(), 0)])
            }
            ProcessMap::Static(_) => panic!("expected a trie"),
        }
        assert!(tree.keys().all(|key| map.owner(key) == 0));
    }

    #[test]
    fn test_zero_processes() {
        let tree = tree_fixture();
        let result = LoadBalancer::default().load_balance(&tree, 0);

        assert!(matches!(result, Err(BalanceError::InvalidPieces(0))));
    }

    #[test]
    fn test_coarsen_once() {
        let tree = AdaptiveTree::<2>::uniform(3);

        let fine = LoadBalancer::default().plan(&tree, &UnitCost, 3).unwrap();
        let coarse = LoadBalancer::new(BalanceConfig {
            coarsening: Coarsening::Once,
            ..Default::default()
        })
        .plan(&tree, &UnitCost, 3)
        .unwrap();

        assert_eq!(fine.nodes, 85);
        assert_eq!(coarse.nodes, 21);
        assert_eq!(coarse.rounds, 1);
        assert_eq!(fine.partition.total_cost, coarse.partition.total_cost);
        assert_eq!(coarse.map.owner(&QuadKey::root()), 0);
    }

    #[test]
    fn test_search_never_worse() {
        let tree = tree_fixture();
        let cost_model = PointCount(&tree);

        for nproc in [2, 3, 8] {
            let none = LoadBalancer::default().plan(&tree, &cost_model, nproc).unwrap();
            let search = LoadBalancer::new(BalanceConfig {
                coarsening: Coarsening::search(),
                ..Default::default()
            })
            .plan(&tree, &cost_model, nproc)
            .unwrap();

            assert!(search.score <= none.score);
            assert_eq!(search.partition.total_cost, none.partition.total_cost);
        }
    }

    #[test]
    fn test_search_prefers_fewer_nodes() {
        // With a heavy node penalty the coarsest tree wins.
        let tree = AdaptiveTree::<2>::uniform(3);
        let balancer = LoadBalancer::new(BalanceConfig {
            coarsening: Coarsening::search(),
            weights: CoarseningWeights {
                cost_factor: 0.0,
                node_factor: 1.0,
            },
        });

        let plan = balancer.plan(&tree, &UnitCost, 2).unwrap();
        assert_eq!(plan.nodes, 1);
        assert_eq!(plan.rounds, 3);
    }

    #[test]
    fn test_find_best_partition() {
        let tree = AdaptiveTree::<2>::uniform(2);
        let skeleton = CostTree::snapshot(&tree, &UnitCost);
        let root = QuadKey::root();
        let balancer = LoadBalancer::default();

        assert_eq!(
            balancer.find_best_partition(skeleton.clone(), &root, 1).unwrap(),
            vec![Assignment::new(root, 0)]
        );

        let assignments = balancer.find_best_partition(skeleton, &root, 3).unwrap();
        let map = ProcessMap::from_assignments(&assignments).unwrap();
        assert!(tree.keys().all(|key| (0..3).contains(&map.owner(key))));
    }

    #[test]
    fn test_missing_children_do_not_abort() {
        // c1 and c01 are flagged present but were never stored.
        let root = BinaryKey::root();
        let mut skeleton = CostTree::new();
        skeleton.insert(root, SkeletonNode::new(1, ChildMask::full(2)));
        skeleton.insert(root.child(0), SkeletonNode::new(1, ChildMask::full(2)));
        skeleton.insert(root.child(0).child(0), SkeletonNode::new(3, ChildMask::EMPTY));

        let keys = [
            root,
            root.child(0),
            root.child(1),
            root.child(0).child(0),
            root.child(0).child(1),
        ];

        for (coarsening, missing) in [
            (Coarsening::None, Some(2)),
            (Coarsening::Once, Some(1)),
            (Coarsening::search(), None),
        ] {
            let balancer = LoadBalancer::new(BalanceConfig {
                coarsening,
                ..Default::default()
            });
            let plan = balancer.plan_tree(skeleton.clone(), &root, 3).unwrap();

            assert_eq!(plan.partition.total_cost, 5);
            assert_eq!(plan.partition.costs.iter().sum::<Cost>(), 5, "{:?}", coarsening);
            assert!(plan.missing >= 1);
            if let Some(missing) = missing {
                assert_eq!(plan.missing, missing, "{:?}", coarsening);
            }
            assert!(keys.iter().all(|key| (0..3).contains(&plan.map.owner(key))));
        }
    }
}
