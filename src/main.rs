use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rusty_balance::balance::LoadBalancer;
use rusty_balance::config::BalanceConfig;
use rusty_balance::constants::NCRIT;
use rusty_balance::data::JSON;
use rusty_balance::helpers::random_points;
use rusty_balance::tree::{AdaptiveTree, PointCount};
use rusty_balance::types::Rank;

/// Environment variable naming an optional JSON run configuration.
const CONFIG_VAR: &str = "RUSTY_BALANCE_CONFIG";

/// Parameters of a demo run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct RunConfig {
    npoints: usize,
    ncrit: usize,
    nproc: usize,
    seed: u64,

    /// Where to write the computed assignments, if anywhere.
    output: Option<PathBuf>,

    balance: BalanceConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            npoints: 100_000,
            ncrit: NCRIT,
            nproc: 16,
            seed: 0,
            output: None,
            balance: BalanceConfig::default(),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::var_os(CONFIG_VAR) {
        Some(path) => RunConfig::read_json(&path)
            .with_context(|| format!("failed to read run configuration {:?}", path))?,
        None => RunConfig::default(),
    };
    info!(?config, "starting");

    // 0. Seeded point cloud in the unit cube.
    let points = random_points::<3>(config.npoints, config.seed);

    // 1. Adaptive octree refined to ncrit points per leaf.
    let tree = AdaptiveTree::new(&points, config.ncrit);
    info!(nodes = tree.len(), leaves = tree.leaves().len(), depth = tree.depth(), "built tree");

    // 2. Balance by point count.
    let balancer = LoadBalancer::new(config.balance);
    let plan = balancer
        .plan(&tree, &PointCount(&tree), config.nproc)
        .context("load balancing failed")?;

    for (owner, cost) in plan.partition.costs.iter().enumerate() {
        let units = plan.partition.keys_of(owner as Rank).count();
        info!(owner, cost, units, "partition");
    }
    info!(
        max_cost = plan.partition.max_cost,
        total_cost = plan.partition.total_cost,
        rounds = plan.rounds,
        score = plan.score,
        "balanced"
    );

    if let Some(path) = config.output.as_ref() {
        plan.partition
            .assignments
            .write_json(path)
            .with_context(|| format!("failed to write assignments to {}", path.display()))?;
        info!(path = %path.display(), "wrote assignments");
    }

    Ok(())
}
