//! Hierarchical keys for 2^D-ary trees.
//!
//! A key is described by its level in the tree and by its integer translation along each of
//! the `D` dimensions, so that `translation[d] < 2^level`. Every key has `2^D` children,
//! numbered in Morton order with dimension 0 taking the most significant bit of the child
//! index.
//!
//! Keys are totally ordered by a depth-first post-order: siblings compare in Morton order and
//! every foreparent compares greater than all of its descendants. Sorting a list of keys in
//! descending order therefore visits ancestors before descendants.

use std::cmp::Ordering;
use std::fmt;
use std::fmt::Debug;
use std::hash::Hash;

use itertools::izip;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    constants::{DEEPEST_LEVEL, MAX_DIM},
    types::domain::Domain,
};

pub type Level = u32;
pub type Translation = u64;

/// Key arithmetic consumed by the load balancer.
pub trait HierarchicalKey: Copy + Ord + Hash + Debug {
    /// Number of children of every node.
    const BRANCHING: usize;

    /// The key of the tree root.
    fn root() -> Self;

    /// Level of the key, the root is at level 0.
    fn level(&self) -> Level;

    /// Check if `self` is an ancestor of `other`, or `other` itself.
    fn is_foreparent_of(&self, other: &Self) -> bool;

    /// Ancestor `n` levels up, clamped at the root.
    fn parent(&self, n: Level) -> Self;

    /// All children in order of their child index.
    fn children(&self) -> Vec<Self>;
}

#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
/// Key of a node in a 2^D-ary tree.
///
/// The dimension must lie in `1..=6` so that the children of a key fit a `ChildMask`, other
/// dimensions are rejected when the key type is used:
///
/// ```compile_fail
/// use rusty_balance::types::key::{HierarchicalKey, Key};
///
/// let root = Key::<7>::root();
/// ```
pub struct Key<const D: usize> {
    level: Level,
    translation: [Translation; D],
}

/// Keys of a binary tree.
pub type BinaryKey = Key<1>;

/// Keys of a quadtree.
pub type QuadKey = Key<2>;

/// Keys of an octree.
pub type OctKey = Key<3>;

impl<const D: usize> Key<D> {
    const VALID_DIM: () = assert!(D >= 1 && D <= MAX_DIM, "dimension must be in 1..=6");

    /// Create a key from its level and translation.
    ///
    /// Returns `None` if the level is deeper than `DEEPEST_LEVEL` or a translation is out of
    /// range for the level.
    pub fn new(level: Level, translation: [Translation; D]) -> Option<Self> {
        #[allow(clippy::let_unit_value)]
        let _ = Self::VALID_DIM;

        if level > DEEPEST_LEVEL || translation.iter().any(|&t| t >> level != 0) {
            return None;
        }

        Some(Key { level, translation })
    }

    /// Return the translation
    pub fn translation(&self) -> &[Translation; D] {
        &self.translation
    }

    /// Return the child with index `index`, `0 <= index < 2^D`.
    pub fn child(&self, index: usize) -> Self {
        debug_assert!(index < Self::BRANCHING);
        debug_assert!(self.level < DEEPEST_LEVEL);

        let mut translation = self.translation;
        for (dim, t) in translation.iter_mut().enumerate() {
            *t = (*t << 1) | ((index >> (D - 1 - dim)) & 1) as Translation;
        }

        Key {
            level: self.level + 1,
            translation,
        }
    }

    /// Index of this key among its siblings. The root has index 0.
    pub fn child_index(&self) -> usize {
        if self.level == 0 {
            return 0;
        }

        self.translation
            .iter()
            .enumerate()
            .fold(0, |acc, (dim, &t)| acc | (((t & 1) as usize) << (D - 1 - dim)))
    }

    /// Return the key at `level` whose position in Morton order among the keys of that level
    /// is `index`.
    pub fn from_morton_index(level: Level, index: u64) -> Self {
        let mask = (Self::BRANCHING - 1) as u64;
        let mut key = Self::root();

        for step in (0..level).rev() {
            let digit = index.checked_shr(D as u32 * step).unwrap_or(0) & mask;
            key = key.child(digit as usize);
        }

        key
    }

    /// Return the key at `level` of the box that encloses the point.
    pub fn from_point(point: &[f64; D], domain: &Domain<D>, level: Level) -> Self {
        let mut translation = [0 as Translation; D];
        let nboxes = (1u64 << level) as f64;
        let max = (1u64 << level) - 1;

        for (t, &p, &origin, &diameter) in
            izip!(translation.iter_mut(), point, domain.origin(), domain.diameter())
        {
            let scaled = ((p - origin) * nboxes / diameter).floor();
            *t = if scaled <= 0. {
                0
            } else {
                (scaled as Translation).min(max)
            };
        }

        Key { level, translation }
    }

    /// Return the strict ancestors, nearest first.
    pub fn ancestors(&self) -> Vec<Self> {
        (1..=self.level).map(|n| self.parent(n)).collect()
    }

    /// Find the finest common foreparent of two keys.
    pub fn finest_ancestor(&self, other: &Self) -> Self {
        let level = self.level.min(other.level);
        let mut a = self.parent(self.level - level);
        let mut b = other.parent(other.level - level);

        while a != b {
            a = a.parent(1);
            b = b.parent(1);
        }

        a
    }
}

impl<const D: usize> HierarchicalKey for Key<D> {
    const BRANCHING: usize = {
        assert!(D >= 1 && D <= MAX_DIM, "dimension must be in 1..=6");
        1 << D
    };

    fn root() -> Self {
        #[allow(clippy::let_unit_value)]
        let _ = Self::VALID_DIM;

        Key {
            level: 0,
            translation: [0; D],
        }
    }

    fn level(&self) -> Level {
        self.level
    }

    fn is_foreparent_of(&self, other: &Self) -> bool {
        self.level <= other.level && other.parent(other.level - self.level) == *self
    }

    fn parent(&self, n: Level) -> Self {
        let n = n.min(self.level);
        let mut translation = self.translation;
        translation.iter_mut().for_each(|t| *t >>= n);

        Key {
            level: self.level - n,
            translation,
        }
    }

    fn children(&self) -> Vec<Self> {
        (0..Self::BRANCHING).map(|index| self.child(index)).collect()
    }
}

impl<const D: usize> Default for Key<D> {
    fn default() -> Self {
        Self::root()
    }
}

/// Subroutine of the Morton comparison, equivalent to comparing floor of log_2(x).
/// Returns true if y has the most significant bit, false otherwise.
fn y_has_most_significant_bit(x: Translation, y: Translation) -> bool {
    (x < y) & (x < (x ^ y))
}

/// Compare two translations on the same level in Morton order, without interleaving the bits.
fn morton_cmp<const D: usize>(a: &[Translation; D], b: &[Translation; D]) -> Ordering {
    let mut argmax = 0;

    for dim in 1..D {
        if y_has_most_significant_bit(a[argmax] ^ b[argmax], a[dim] ^ b[dim]) {
            argmax = dim;
        }
    }

    a[argmax].cmp(&b[argmax])
}

impl<const D: usize> Ord for Key<D> {
    fn cmp(&self, other: &Self) -> Ordering {
        if self == other {
            return Ordering::Equal;
        }

        let level = self.level.min(other.level);
        let a = self.parent(self.level - level);
        let b = other.parent(other.level - level);

        if a == b {
            // One key is a foreparent of the other, descendants come first.
            other.level.cmp(&self.level)
        } else {
            morton_cmp(&a.translation, &b.translation)
        }
    }
}

impl<const D: usize> PartialOrd for Key<D> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<const D: usize> fmt::Debug for Key<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({}, {:?})", self.level, self.translation)
    }
}

impl<const D: usize> fmt::Display for Key<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {:?})", self.level, self.translation)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename = "Key")]
struct KeyRepr<T> {
    level: Level,
    translation: T,
}

impl<const D: usize> Serialize for Key<D> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        KeyRepr {
            level: self.level,
            translation: &self.translation[..],
        }
        .serialize(serializer)
    }
}

impl<'de, const D: usize> Deserialize<'de> for Key<D> {
    fn deserialize<De: Deserializer<'de>>(deserializer: De) -> Result<Self, De::Error> {
        let repr = KeyRepr::<Vec<Translation>>::deserialize(deserializer)?;

        let translation: [Translation; D] = repr.translation.try_into().map_err(|t: Vec<_>| {
            de::Error::invalid_length(t.len(), &format!("{} translations", D).as_str())
        })?;

        Key::new(repr.level, translation)
            .ok_or_else(|| de::Error::custom("translation out of range for level"))
    }
}
