//! Error type shared by the load balancing routines.

use thiserror::Error;

/// Errors raised while building skeleton trees, partitions and process maps.
#[derive(Error, Debug)]
pub enum BalanceError {
    #[error("cannot build a process map from an empty assignment list")]
    EmptyAssignments,

    #[error("cannot partition a tree into {0} pieces")]
    InvalidPieces(usize),

    #[error("root key {0} is not present in the skeleton tree")]
    MissingRoot(String),

    #[error("assignment for key {key} is not covered by the process map root {root}")]
    Uncovered { key: String, root: String },

    #[error("key {0} is assigned more than once")]
    DuplicateKey(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BalanceError>;
