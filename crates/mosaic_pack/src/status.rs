//! The three-valued feasibility status at the heart of the packing search.

use serde::{Deserialize, Serialize};

/// The feasibility of a tentative cluster, as judged by pack rules.
///
/// Forms a lattice under [`meet`](PackStatus::meet): `Infeasible` absorbs
/// everything, `Conditional` absorbs `Valid`, and `Valid` is the identity.
/// Rule results across a cluster are folded with `meet`, so one infeasible
/// verdict poisons the whole generation while conditional verdicts survive
/// until growth either discharges or exhausts them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackStatus {
    /// The cluster is legal as it stands.
    Valid,
    /// The cluster is legal only if specific other cells are later packed
    /// at specific BELs.
    Conditional,
    /// The cluster cannot be made legal from this state.
    Infeasible,
}

impl PackStatus {
    /// Combines two statuses, keeping the more constrained one.
    pub fn meet(self, other: PackStatus) -> PackStatus {
        match self {
            PackStatus::Valid => other,
            PackStatus::Conditional => {
                if other == PackStatus::Infeasible {
                    PackStatus::Infeasible
                } else {
                    PackStatus::Conditional
                }
            }
            PackStatus::Infeasible => PackStatus::Infeasible,
        }
    }
}
