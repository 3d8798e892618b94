//! Process maps, resolving the owner process of any key.
//!
//! A process map is built from the assignments produced by a partitioning run. The assigned keys
//! are arranged in a prefix trie under their foreparent relation, and a key is owned by the
//! process of the finest assigned key that is a foreparent of it (or the key itself).

use std::fmt;

use tracing::debug;

use crate::{
    constants::INVALID_RANK,
    error::{BalanceError, Result},
    helpers::{divisor_power, floor_log},
    partition::Assignment,
    types::{
        key::{HierarchicalKey, Key},
        Rank,
    },
};

/// Resolves the owner of a key, implemented by everything a distributed container may use as
/// its process map.
pub trait ProcessMapping<K> {
    /// Owner of `key`, `INVALID_RANK` if the key is not covered.
    fn owner(&self, key: &K) -> Rank;
}

/// Node of an `OwnershipTrie`, children and parent are indices into the trie's arena.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnershipNode<K> {
    pub key: K,
    pub owner: Rank,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

/// Prefix trie of assigned keys. Node 0 is the root, each node's children are keys it is a
/// strict foreparent of, kept in insertion order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnershipTrie<K> {
    nodes: Vec<OwnershipNode<K>>,
}

impl<K: HierarchicalKey> OwnershipTrie<K> {
    /// Build a trie from a list of assignments, in any order.
    ///
    /// The coarsest assignment becomes the root and must be a foreparent of every other one.
    pub fn build(assignments: &[Assignment<K>]) -> Result<Self> {
        let mut sorted = assignments.to_vec();
        sorted.sort_by(|a, b| b.key.cmp(&a.key));

        let (first, rest) = sorted.split_first().ok_or(BalanceError::EmptyAssignments)?;

        let mut trie = OwnershipTrie {
            nodes: vec![OwnershipNode {
                key: first.key,
                owner: first.owner,
                parent: None,
                children: Vec::new(),
            }],
        };

        for assignment in rest {
            trie.insert(assignment)?;
        }

        debug!(nodes = trie.nodes.len(), "built ownership trie");

        Ok(trie)
    }

    /// Insert below the deepest node that is a foreparent of the key. Every foreparent of the
    /// key must already be in the trie.
    fn insert(&mut self, assignment: &Assignment<K>) -> Result<()> {
        let key = assignment.key;

        if !self.nodes[0].key.is_foreparent_of(&key) {
            return Err(BalanceError::Uncovered {
                key: format!("{:?}", key),
                root: format!("{:?}", self.nodes[0].key),
            });
        }

        let mut current = 0;
        loop {
            if self.nodes[current].key == key {
                return Err(BalanceError::DuplicateKey(format!("{:?}", key)));
            }

            let next = self.nodes[current]
                .children
                .iter()
                .copied()
                .find(|&child| self.nodes[child].key.is_foreparent_of(&key));

            match next {
                Some(child) => current = child,
                None => break,
            }
        }

        let index = self.nodes.len();
        self.nodes.push(OwnershipNode {
            key,
            owner: assignment.owner,
            parent: Some(current),
            children: Vec::new(),
        });
        self.nodes[current].children.push(index);

        Ok(())
    }

    /// Index of the finest node that is a foreparent of `key`.
    fn locate(&self, key: &K) -> Option<usize> {
        if !self.nodes[0].key.is_foreparent_of(key) {
            return None;
        }

        let mut current = 0;
        while self.nodes[current].key.level() < key.level() {
            let next = self.nodes[current]
                .children
                .iter()
                .copied()
                .find(|&child| self.nodes[child].key.is_foreparent_of(key));

            match next {
                Some(child) => current = child,
                None => break,
            }
        }

        Some(current)
    }

    /// Owner of `key`, inherited from the finest assigned foreparent.
    pub fn owner(&self, key: &K) -> Rank {
        self.locate(key)
            .map_or(INVALID_RANK, |index| self.nodes[index].owner)
    }

    /// Assigned keys from the root down to the one that determines the owner of `key`.
    pub fn path(&self, key: &K) -> Vec<K> {
        let mut path = Vec::new();
        let mut current = self.locate(key);

        while let Some(index) = current {
            path.push(self.nodes[index].key);
            current = self.nodes[index].parent;
        }

        path.reverse();
        path
    }

    pub fn root(&self) -> &OwnershipNode<K> {
        &self.nodes[0]
    }

    pub fn nodes(&self) -> &[OwnershipNode<K>] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The assignments the trie was built from, sorted by key.
    pub fn assignments(&self) -> Vec<Assignment<K>> {
        let mut assignments: Vec<Assignment<K>> = self
            .nodes
            .iter()
            .map(|node| Assignment::new(node.key, node.owner))
            .collect();
        assignments.sort();
        assignments
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, index: usize, depth: usize) -> fmt::Result {
        let node = &self.nodes[index];
        writeln!(f, "{:indent$}{:?} -> {}", "", node.key, node.owner, indent = 2 * depth)?;

        for &child in node.children.iter() {
            self.fmt_node(f, child, depth + 1)?;
        }
        Ok(())
    }
}

impl<K: HierarchicalKey> fmt::Display for OwnershipTrie<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_node(f, 0, 0)
    }
}

impl<K: HierarchicalKey> ProcessMapping<K> for OwnershipTrie<K> {
    fn owner(&self, key: &K) -> Rank {
        OwnershipTrie::owner(self, key)
    }
}

/// Process map used by a distributed container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessMap<K> {
    /// Every key is owned by a single process.
    Static(Rank),

    /// Owners are resolved through an ownership trie.
    Trie(OwnershipTrie<K>),
}

impl<K: HierarchicalKey> ProcessMap<K> {
    pub fn from_assignments(assignments: &[Assignment<K>]) -> Result<Self> {
        Ok(ProcessMap::Trie(OwnershipTrie::build(assignments)?))
    }

    pub fn owner(&self, key: &K) -> Rank {
        match self {
            ProcessMap::Static(owner) => *owner,
            ProcessMap::Trie(trie) => trie.owner(key),
        }
    }

    pub fn is_static(&self) -> bool {
        matches!(self, ProcessMap::Static(_))
    }
}

impl<const D: usize> ProcessMap<Key<D>> {
    /// Initial map spreading `nproc` processes over the keys of the finest level that has at
    /// most `nproc` keys. Ranks are assigned in Morton order, and keys whose index is aligned on
    /// a coarser level are hoisted to that level so that the map covers every key. Rank 0 owns
    /// the root, ranks beyond the number of keys own nothing.
    pub fn uniform(nproc: usize) -> Result<Self> {
        let branching = Key::<D>::BRANCHING;
        let level = floor_log(nproc, branching);
        let npin = branching.pow(level);

        let assignments: Vec<Assignment<Key<D>>> = (0..npin)
            .map(|i| {
                let mut key = Key::<D>::from_morton_index(level, i as u64);
                if i % branching == 0 {
                    key = key.parent(divisor_power(npin - i, branching));
                }
                Assignment::new(key, i as Rank)
            })
            .collect();

        Self::from_assignments(&assignments)
    }
}

impl<K: HierarchicalKey> ProcessMapping<K> for ProcessMap<K> {
    fn owner(&self, key: &K) -> Rank {
        ProcessMap::owner(self, key)
    }
}

impl<K: HierarchicalKey> fmt::Display for ProcessMap<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessMap::Static(owner) => writeln!(f, "static -> {}", owner),
            ProcessMap::Trie(trie) => write!(f, "{}", trie),
        }
    }
}
