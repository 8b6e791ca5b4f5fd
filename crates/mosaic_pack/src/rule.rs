//! The pack rule contract: pluggable legality validation with exact revert.

use crate::cluster::Cluster;
use crate::info::PackingState;
use crate::status::PackStatus;
use mosaic_arch::{BelId, PackUnitList};
use mosaic_netlist::{CellDesign, CellId};
use std::collections::{HashMap, HashSet};

/// Result of one [`PackRule`] check.
#[derive(Debug, Clone)]
pub struct PackRuleResult {
    /// The pack status of the cluster as determined by this check.
    pub status: PackStatus,
    /// The cells that must later be packed (at one of the named BELs) for
    /// this cluster to become valid. Present exactly when `status` is
    /// [`PackStatus::Conditional`].
    pub conditionals: Option<HashMap<CellId, HashSet<BelId>>>,
}

impl PackRuleResult {
    /// A plain valid result.
    pub fn valid() -> Self {
        Self {
            status: PackStatus::Valid,
            conditionals: None,
        }
    }

    /// A plain infeasible result.
    pub fn infeasible() -> Self {
        Self {
            status: PackStatus::Infeasible,
            conditionals: None,
        }
    }

    /// A conditional result naming the required future placements.
    pub fn conditional(conditionals: HashMap<CellId, HashSet<BelId>>) -> Self {
        Self {
            status: PackStatus::Conditional,
            conditionals: Some(conditionals),
        }
    }
}

/// A legality check over a growing cluster.
///
/// `validate` must be a pure function of the cluster's committed state plus
/// `changed`, except for the rule's own bookkeeping, and every `validate`
/// must be revertible: the engine calls [`revert`](PackRule::revert) to
/// undo exactly the bookkeeping of the most recent un-reverted `validate`.
/// Rules typically keep an [`UndoMap`](crate::undo::UndoMap) checkpoint
/// stack mirroring the engine's own.
pub trait PackRule {
    /// Validates the cluster given the cells changed so far this
    /// generation.
    fn validate(
        &mut self,
        design: &CellDesign,
        units: &PackUnitList,
        packing: &PackingState,
        cluster: &Cluster,
        changed: &[CellId],
    ) -> PackRuleResult;

    /// Undoes the bookkeeping of the most recent `validate`.
    fn revert(&mut self);

    /// Called once when the packing attempt finishes, in either direction.
    fn cleanup(&mut self) {}
}

/// Creates a fresh [`PackRule`] per cluster attempt.
pub trait PackRuleFactory {
    /// Called once before packing to analyze the design.
    fn init(&mut self, _design: &CellDesign) {}

    /// Tells the factory that all cells in `cluster` are now committed.
    fn commit_cluster(&mut self, _cluster: &Cluster) {}

    /// Creates a rule bound to `cluster`.
    fn make(&self, cluster: &Cluster) -> Box<dyn PackRule>;
}
