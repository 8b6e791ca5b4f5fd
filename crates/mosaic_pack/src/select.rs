//! Selection heuristic contracts: what to try next, and in what order.
//!
//! The engine consumes these interfaces without knowing how candidates are
//! scored. Every selector that keeps internal state across generations must
//! keep that state checkpointed in step with the engine's commit/rollback
//! protocol, or backtracking would silently corrupt its view of the world.

use crate::cluster::{Cluster, ClusterFactory};
use crate::info::PackingState;
use mosaic_arch::{BelId, PackUnitList};
use mosaic_netlist::{CellDesign, CellId};
use std::collections::HashSet;

/// Chooses the cell each new cluster is grown around.
pub trait SeedSelector {
    /// Called once before packing begins.
    fn init(&mut self, units: &PackUnitList, design: &CellDesign, packing: &PackingState);

    /// Returns the next seed cell, or `None` when every cell is packed.
    ///
    /// Cells belonging to partially packed carry chains are exhausted
    /// first, in FIFO order, so a chain is never split across incompatible
    /// cluster types.
    fn next_seed(&mut self, packing: &PackingState) -> Option<CellId>;

    /// Tells the selector that `cluster` was committed.
    fn commit_cluster(&mut self, design: &CellDesign, packing: &PackingState, cluster: &Cluster);
}

/// Chooses the best remaining cell to grow the current cluster with.
///
/// Expected call order per cluster attempt: `init_cluster`, then any number
/// of (`next_cell`, `commit_cells` | `rollback_last_commit`) pairs driven
/// by the engine, then `cleanup_cluster`.
pub trait CellSelector {
    /// Called once before packing begins.
    fn init(&mut self, design: &CellDesign);

    /// Called when a cluster attempt starts. Must not mutate the netlist.
    fn init_cluster(&mut self, cluster: &Cluster, seed: CellId);

    /// Returns the next candidate cell, or `None` to stop growing.
    fn next_cell(
        &mut self,
        design: &CellDesign,
        packing: &PackingState,
        cluster: &Cluster,
    ) -> Option<CellId>;

    /// Records a committed generation: `cells` entered the cluster, and
    /// `conditionals` (if any) are the cells a conditional verdict wants
    /// packed next.
    fn commit_cells(&mut self, cells: &[CellId], conditionals: Option<&[CellId]>);

    /// Undoes the most recent `commit_cells`.
    fn rollback_last_commit(&mut self);

    /// Called when the cluster attempt finishes, in either direction.
    fn cleanup_cluster(&mut self);
}

/// Chooses candidate BELs for the cell currently being tried.
///
/// Expected call order per cluster attempt: `init_cluster`; then per cell:
/// `init_cell`, repeated `next_bel`, and one of `commit_bels`,
/// `revert_to_last_commit`, or `roll_back_last_commit`; finally
/// `cleanup_cluster`.
pub trait BelSelector {
    /// Called once before packing begins.
    fn init(&mut self, design: &CellDesign);

    /// Called when a cluster attempt starts; the cluster is empty.
    fn init_cluster(&mut self, units: &PackUnitList, cluster: &Cluster);

    /// Prepares candidates for `cell`. When `forced` is present, only those
    /// BELs may be offered (they come from a conditional requirement and
    /// may already be occupied; occupancy is re-checked at placement).
    fn init_cell(
        &mut self,
        design: &CellDesign,
        units: &PackUnitList,
        cluster: &Cluster,
        cell: CellId,
        forced: Option<&HashSet<BelId>>,
    );

    /// Returns the next candidate BEL for the current cell, or `None` when
    /// the candidates are exhausted.
    fn next_bel(&mut self) -> Option<BelId>;

    /// Records the BELs of a committed generation.
    fn commit_bels(&mut self, bels: &[BelId]);

    /// Discards the current cell's remaining candidates after the cell
    /// failed at every BEL.
    fn revert_to_last_commit(&mut self);

    /// Undoes the most recent `commit_bels`.
    fn roll_back_last_commit(&mut self);

    /// Called when the cluster attempt finishes, in either direction.
    fn cleanup_cluster(&mut self);
}

/// Scores a finished cluster; the driver keeps the cheapest valid one.
pub trait ClusterCostCalculator {
    /// Called once before packing begins.
    fn init(&mut self, units: &PackUnitList, factory: &dyn ClusterFactory);

    /// Returns the cost of `cluster`; lower is better.
    fn calculate_cost(
        &self,
        cluster: &Cluster,
        design: &CellDesign,
        units: &PackUnitList,
        factory: &dyn ClusterFactory,
    ) -> f64;
}
