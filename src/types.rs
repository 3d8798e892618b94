//! Definition of basic types

pub mod domain;
pub mod key;
pub mod node;

pub use key::{Level, Translation};

/// Non-negative unit of work attached to a tree node.
pub type Cost = u64;

/// Process identifier, same width as an MPI rank.
pub type Rank = i32;
