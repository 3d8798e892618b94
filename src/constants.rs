//! Crate wide constants
use crate::types::{Cost, Level, Rank};

/// Deepest level a key may be refined to.
pub const DEEPEST_LEVEL: Level = 30;

/// Largest supported dimension, the branching factor 2^D must fit a `ChildMask`.
pub const MAX_DIM: usize = 6;

/// Maximum number of points in a leaf of an `AdaptiveTree`.
pub const NCRIT: usize = 150;

/// Cost assigned to every node of a snapshot unless a cost model says otherwise.
pub const DEFAULT_COST: Cost = 1;

/// Owner returned for keys that lie outside of a process map's coverage.
pub const INVALID_RANK: Rank = -1;

/// Weight of the achieved maximum partition cost when scoring a coarsening round.
pub const COST_FACTOR: f64 = 1.0;

/// Weight of the number of scheduling units when scoring a coarsening round.
pub const NODE_FACTOR: f64 = 0.01;

/// Upper bound on the number of rollup rounds tried by a coarsening search.
pub const MAX_COARSEN_ROUNDS: usize = 8;
