//! The prepacker contract: forced expansion of a tentative placement.

use crate::cluster::Cluster;
use crate::info::PackingState;
use crate::strategy::PackedCells;
use mosaic_arch::PackUnitTemplate;
use mosaic_netlist::CellDesign;
use serde::{Deserialize, Serialize};

/// Outcome of one prepacker pass.
///
/// Forms its own small lattice under [`meet`](PrepackStatus::meet):
/// `Infeasible` absorbs everything, `Changed` absorbs `Unchanged`, and
/// `Unchanged` is the identity. The engine re-runs all prepackers until the
/// fold yields `Unchanged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrepackStatus {
    /// No cells needed to be added.
    Unchanged,
    /// Cells were added; another fixed-point iteration is required.
    Changed,
    /// Required cells could not be added.
    Infeasible,
}

impl PrepackStatus {
    /// Combines two statuses, keeping the more significant one.
    pub fn meet(self, other: PrepackStatus) -> PrepackStatus {
        match self {
            PrepackStatus::Unchanged => other,
            PrepackStatus::Infeasible => PrepackStatus::Infeasible,
            PrepackStatus::Changed => {
                if other == PrepackStatus::Infeasible {
                    PrepackStatus::Infeasible
                } else {
                    PrepackStatus::Changed
                }
            }
        }
    }
}

/// Identifies cells a tentative placement structurally requires and adds
/// them to the cluster.
///
/// A prepacker may append to `changed` (via the cells it packs) but must
/// never remove or overwrite existing entries; [`PackedCells`] enforces
/// this structurally.
pub trait Prepacker {
    /// Adds any cells the current tentative cluster requires. Returns
    /// [`PrepackStatus::Changed`] if cells were added,
    /// [`PrepackStatus::Unchanged`] if none were needed, and
    /// [`PrepackStatus::Infeasible`] if a required cell could not be added.
    fn pack_required(
        &mut self,
        design: &CellDesign,
        template: &PackUnitTemplate,
        packing: &mut PackingState,
        cluster: &mut Cluster,
        changed: &mut PackedCells,
    ) -> PrepackStatus;
}

/// Creates a fresh [`Prepacker`] per cluster attempt.
pub trait PrepackerFactory {
    /// Called once before packing to analyze the design.
    fn init(&mut self, _design: &CellDesign) {}

    /// Creates a prepacker for one packing attempt.
    fn make(&self) -> Box<dyn Prepacker>;
}

#[cfg(test)]
mod tests {
    use super::PrepackStatus::{self, Changed, Infeasible, Unchanged};

    const ALL: [PrepackStatus; 3] = [Unchanged, Changed, Infeasible];

    #[test]
    fn meet_table() {
        assert_eq!(Unchanged.meet(Unchanged), Unchanged);
        assert_eq!(Unchanged.meet(Changed), Changed);
        assert_eq!(Unchanged.meet(Infeasible), Infeasible);
        assert_eq!(Changed.meet(Changed), Changed);
        assert_eq!(Changed.meet(Infeasible), Infeasible);
        assert_eq!(Infeasible.meet(Infeasible), Infeasible);
    }

    #[test]
    fn meet_is_commutative() {
        for a in ALL {
            for b in ALL {
                assert_eq!(a.meet(b), b.meet(a));
            }
        }
    }

    #[test]
    fn infeasible_absorbs() {
        for a in ALL {
            assert_eq!(Infeasible.meet(a), Infeasible);
            assert_eq!(a.meet(Infeasible), Infeasible);
        }
    }

    #[test]
    fn unchanged_is_identity() {
        for a in ALL {
            assert_eq!(Unchanged.meet(a), a);
        }
    }
}
