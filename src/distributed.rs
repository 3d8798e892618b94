//! Gathering a skeleton tree distributed over MPI processes into identical local snapshots.
//!
//! Every process holds the skeleton nodes of the part of the tree it stores. Before balancing,
//! all fragments are exchanged so that each process runs the same deterministic partitioning on
//! the same frozen tree, and hence computes the same process map.

use std::iter::once;

use mpi::{datatype::PartitionMut, traits::*, Count};
use tracing::{debug, warn};

use crate::{
    skeleton::CostTree,
    types::{
        key::{HierarchicalKey, Key},
        node::SkeletonNode,
        Translation,
    },
};

/// Number of words a key of dimension `D` is flattened to.
const fn key_words(dim: usize) -> usize {
    dim + 1
}

/// Flatten keys into their level followed by their translation.
fn encode_keys<const D: usize>(keys: &[Key<D>]) -> Vec<u64> {
    keys.iter()
        .flat_map(|key| once(key.level() as u64).chain(key.translation().iter().copied()))
        .collect()
}

/// Rebuild keys from their flattened words, invalid keys are dropped.
fn decode_keys<const D: usize>(words: &[u64]) -> Vec<Option<Key<D>>> {
    words
        .chunks_exact(key_words(D))
        .map(|chunk| {
            let mut translation = [0 as Translation; D];
            translation.copy_from_slice(&chunk[1..]);
            u32::try_from(chunk[0])
                .ok()
                .and_then(|level| Key::new(level, translation))
        })
        .collect()
}

/// Merge gathered fragments into one tree. Nodes stored by several processes are merged by
/// the union of their children and the largest reported cost.
fn merge_fragments<const D: usize>(
    keys: Vec<Option<Key<D>>>,
    nodes: Vec<SkeletonNode>,
) -> CostTree<Key<D>> {
    let mut tree = CostTree::new();
    let mut invalid = 0;

    for (key, node) in keys.into_iter().zip(nodes) {
        let key = match key {
            Some(key) => key,
            None => {
                invalid += 1;
                continue;
            }
        };

        let merged = match tree.get(&key) {
            Some(existing) => {
                let mut children = existing.child_exists;
                node.child_exists.iter().for_each(|index| children.set(index, true));
                SkeletonNode::new(existing.cost.max(node.cost), children)
            }
            None => SkeletonNode::new(node.cost, node.child_exists),
        };
        tree.insert(key, merged);
    }

    if invalid > 0 {
        warn!(invalid, "dropped invalid keys from gathered skeleton fragments");
    }

    tree
}

/// Exclusive prefix sum of `counts`.
fn displacements(counts: &[Count]) -> Vec<Count> {
    counts
        .iter()
        .scan(0, |acc, &count| {
            let displ = *acc;
            *acc += count;
            Some(displ)
        })
        .collect()
}

/// Gather the local skeleton fragments of all processes of `world` into one tree, identical on
/// every process.
pub fn gather_cost_tree<const D: usize, C: Communicator>(
    world: &C,
    local: &CostTree<Key<D>>,
) -> CostTree<Key<D>> {
    let size = world.size() as usize;
    let entries = local.entries();

    let local_keys: Vec<Key<D>> = entries.iter().map(|(key, _)| *key).collect();
    let local_nodes: Vec<SkeletonNode> = entries.iter().map(|(_, node)| *node).collect();
    let local_words = encode_keys(&local_keys);

    // Number of nodes held by each process.
    let nlocal = local_nodes.len() as Count;
    let mut counts: Vec<Count> = vec![0; size];
    world.all_gather_into(&nlocal, &mut counts[..]);

    let total = counts.iter().sum::<Count>() as usize;

    let mut nodes = vec![SkeletonNode::default(); total];
    {
        let displs = displacements(&counts);
        let mut partition = PartitionMut::new(&mut nodes[..], counts.clone(), &displs[..]);
        world.all_gather_varcount_into(&local_nodes[..], &mut partition);
    }

    let word_counts: Vec<Count> = counts
        .iter()
        .map(|&count| count * key_words(D) as Count)
        .collect();
    let mut words = vec![0u64; total * key_words(D)];
    {
        let displs = displacements(&word_counts);
        let mut partition = PartitionMut::new(&mut words[..], word_counts.clone(), &displs[..]);
        world.all_gather_varcount_into(&local_words[..], &mut partition);
    }

    let tree = merge_fragments(decode_keys::<D>(&words), nodes);

    debug!(
        rank = world.rank(),
        local = local_nodes.len(),
        gathered = tree.len(),
        "gathered skeleton tree"
    );

    tree
}
