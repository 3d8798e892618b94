//! Balance a tree whose points are spread over all MPI processes.
use anyhow::{Context, Result};
use mpi::traits::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rusty_balance::balance::LoadBalancer;
use rusty_balance::constants::NCRIT;
use rusty_balance::distributed::gather_cost_tree;
use rusty_balance::helpers::random_points;
use rusty_balance::skeleton::{CostTree, SourceStructure};
use rusty_balance::tree::{AdaptiveTree, PointCount};
use rusty_balance::types::domain::Domain;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let universe = mpi::initialize().context("failed to initialize MPI")?;
    let world = universe.world();
    let rank = world.rank();
    let size = world.size();

    // Each process holds its own points over the shared unit domain.
    let npoints = 10_000;
    let points = random_points::<3>(npoints, rank as u64);
    let tree = AdaptiveTree::with_domain(&points, Domain::unit(), NCRIT);

    let local = CostTree::snapshot(&tree, &PointCount(&tree));
    let gathered = gather_cost_tree(&world, &local);

    let plan = LoadBalancer::default()
        .plan_tree(gathered, &tree.root(), size as usize)
        .context("load balancing failed")?;

    let owned = tree.leaves().iter().filter(|leaf| plan.map.owner(leaf) == rank).count();
    info!(
        rank,
        local_leaves = tree.leaves().len(),
        owned,
        cost = plan.partition.costs[rank as usize],
        max_cost = plan.partition.max_cost,
        "balanced"
    );

    Ok(())
}
