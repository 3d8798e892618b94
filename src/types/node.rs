//! Data structures stored at each key of a skeleton tree.

use std::fmt;

use serde::{Deserialize, Serialize};

#[cfg(feature = "mpi")]
use memoffset::offset_of;
#[cfg(feature = "mpi")]
use mpi::{
    datatype::{Equivalence, UncommittedUserDatatype, UserDatatype},
    Address,
};

use crate::{constants::DEFAULT_COST, types::Cost};

#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
/// Fixed size bitset, bit `i` is set iff the child with index `i` exists.
pub struct ChildMask(u64);

impl ChildMask {
    pub const EMPTY: ChildMask = ChildMask(0);

    pub fn new(bits: u64) -> Self {
        ChildMask(bits)
    }

    /// Mask with all `branching` children present.
    pub fn full(branching: usize) -> Self {
        debug_assert!(branching <= 64);
        if branching == 64 {
            ChildMask(u64::MAX)
        } else {
            ChildMask((1 << branching) - 1)
        }
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn has(&self, index: usize) -> bool {
        (self.0 >> index) & 1 == 1
    }

    pub fn set(&mut self, index: usize, present: bool) {
        if present {
            self.0 |= 1 << index;
        } else {
            self.0 &= !(1 << index);
        }
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// Whether any child is present.
    pub fn any(&self) -> bool {
        self.0 != 0
    }

    pub fn count(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Indices of the present children in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = usize> {
        let bits = self.0;
        (0..64).filter(move |index| (bits >> index) & 1 == 1)
    }
}

impl FromIterator<usize> for ChildMask {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut mask = ChildMask::EMPTY;
        for index in iter {
            mask.set(index, true);
        }
        mask
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
/// Cost bearing structural record of a node in the skeleton tree. The field order is the wire
/// order of the node.
pub struct SkeletonNode {
    /// Cost of the node itself.
    pub cost: Cost,

    /// Cost of the node and its untaken descendants, valid after aggregation.
    pub subtree_cost: Cost,

    /// Set once the node has been assigned to a partition.
    pub taken: bool,

    /// Which children exist in the mirrored structure.
    pub child_exists: ChildMask,
}

impl SkeletonNode {
    pub fn new(cost: Cost, child_exists: ChildMask) -> Self {
        SkeletonNode {
            cost,
            subtree_cost: cost,
            taken: false,
            child_exists,
        }
    }

    pub fn is_leaf(&self) -> bool {
        !self.child_exists.any()
    }
}

impl Default for SkeletonNode {
    fn default() -> Self {
        SkeletonNode::new(DEFAULT_COST, ChildMask::EMPTY)
    }
}

impl fmt::Display for SkeletonNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cost {}, subtree_cost {}, taken {}, children {:#b}",
            self.cost,
            self.subtree_cost,
            self.taken,
            self.child_exists.bits()
        )
    }
}

#[cfg(feature = "mpi")]
unsafe impl Equivalence for SkeletonNode {
    type Out = UserDatatype;
    fn equivalent_datatype() -> Self::Out {
        UserDatatype::structured(
            &[1, 1, 1, 1],
            &[
                offset_of!(SkeletonNode, cost) as Address,
                offset_of!(SkeletonNode, subtree_cost) as Address,
                offset_of!(SkeletonNode, taken) as Address,
                offset_of!(SkeletonNode, child_exists) as Address,
            ],
            &[
                UncommittedUserDatatype::contiguous(1, &Cost::equivalent_datatype()).as_ref(),
                UncommittedUserDatatype::contiguous(1, &Cost::equivalent_datatype()).as_ref(),
                UncommittedUserDatatype::contiguous(1, &bool::equivalent_datatype()).as_ref(),
                UncommittedUserDatatype::contiguous(1, &u64::equivalent_datatype()).as_ref(),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_mask() {
        let mut mask: ChildMask = [0, 3, 5].into_iter().collect();
        assert_eq!(mask.count(), 3);
        assert!(mask.has(3) && !mask.has(1));
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![0, 3, 5]);

        mask.set(3, false);
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![0, 5]);

        mask.clear();
        assert!(!mask.any());

        assert_eq!(ChildMask::full(8).count(), 8);
        assert_eq!(ChildMask::full(64).count(), 64);
    }

    #[test]
    fn test_wire_shape() {
        let node = SkeletonNode::new(3, ChildMask::new(0b101));
        let json = serde_json::to_string(&node).unwrap();
        assert_eq!(
            json,
            r#"{"cost":3,"subtree_cost":3,"taken":false,"child_exists":5}"#
        );
    }
}
