pub mod aggregate;
pub mod balance;
pub mod coarsen;
pub mod config;
pub mod constants;
pub mod data;
pub mod error;
pub mod helpers;
pub mod partition;
pub mod pmap;
pub mod skeleton;
pub mod tree;
pub mod types;

#[cfg(feature = "mpi")]
pub mod distributed;
