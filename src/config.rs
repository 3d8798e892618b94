//! Runtime configuration of the load balancer.
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    constants::{COST_FACTOR, MAX_COARSEN_ROUNDS, NODE_FACTOR},
    data::JSON,
    error::Result,
};

/// How the skeleton tree is coarsened before it is partitioned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Coarsening {
    /// Partition the tree as snapshotted.
    #[default]
    None,

    /// Run a single rollup pass before partitioning.
    Once,

    /// Partition after each of up to `max_rounds` rollup passes and keep the best scoring one.
    Search { max_rounds: usize },
}

impl Coarsening {
    pub fn search() -> Self {
        Coarsening::Search {
            max_rounds: MAX_COARSEN_ROUNDS,
        }
    }
}

/// Weights used by `weigh_coalesced` to score a coarsening round.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoarseningWeights {
    pub cost_factor: f64,
    pub node_factor: f64,
}

impl Default for CoarseningWeights {
    fn default() -> Self {
        CoarseningWeights {
            cost_factor: COST_FACTOR,
            node_factor: NODE_FACTOR,
        }
    }
}

/// Configuration of a `LoadBalancer`, every field may be omitted in a config file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    pub coarsening: Coarsening,
    pub weights: CoarseningWeights,
}

impl BalanceConfig {
    /// Read a configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::read_json(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: BalanceConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config, BalanceConfig::default());
        assert_eq!(config.coarsening, Coarsening::None);
        assert_eq!(config.weights.cost_factor, COST_FACTOR);
        assert_eq!(config.weights.node_factor, NODE_FACTOR);
    }

    #[test]
    fn test_partial_config() {
        let config: BalanceConfig = serde_json::from_str(
            r#"{"coarsening": {"mode": "search", "max_rounds": 3}, "weights": {"node_factor": 0.5}}"#,
        )
        .unwrap();

        assert_eq!(config.coarsening, Coarsening::Search { max_rounds: 3 });
        assert_eq!(config.weights.cost_factor, COST_FACTOR);
        assert_eq!(config.weights.node_factor, 0.5);
    }

    #[test]
    fn test_serialize_mode() {
        let json = serde_json::to_string(&Coarsening::Once).unwrap();
        assert_eq!(json, r#"{"mode":"once"}"#);

        let parsed: Coarsening = serde_json::from_str(r#"{"mode":"none"}"#).unwrap();
        assert_eq!(parsed, Coarsening::None);
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("rusty-balance-config-{}.json", std::process::id()));
        let config = BalanceConfig {
            coarsening: Coarsening::search(),
            ..Default::default()
        };

        config.write_json(&path).unwrap();
        let read = BalanceConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(read, config);
    }
}
