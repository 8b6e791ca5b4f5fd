//! The Mosaic packing engine.
//!
//! Packing (technology mapping onto clusters) is the CAD stage between
//! synthesis and placement: every netlist cell must be assigned to a BEL
//! inside a cluster shaped like one of the device's pack units, subject to
//! hard architectural constraints that only reveal themselves after
//! tentative commitments. The engine therefore runs a backtracking search:
//! it speculatively places cells, consults pluggable prepackers and pack
//! rules, and unwinds exactly on infeasibility — including "conditional"
//! verdicts, where a cluster is legal only if some other, not-yet-placed
//! cell later lands on a specific BEL.
//!
//! # Structure
//!
//! - [`Cluster`], [`ClusterDesign`]: the mutable cluster data model.
//! - [`PackStatus`]: the three-valued feasibility lattice.
//! - [`PackingState`]: per-cell packing attributes parallel to the netlist.
//! - [`chain`]: carry-chain discovery and cluster-chain linkage.
//! - [`strategy`]: the backtracking fill engine.
//! - [`driver`]: the outer greedy loop and the fatal error surface.
//! - [`selectors`], [`rules`], [`prepackers`]: default heuristics.
//!
//! # Usage
//!
//! ```no_run
//! use mosaic_diagnostics::DiagnosticSink;
//! use mosaic_pack::{ClusterPacker, Packer};
//! # fn build_packer() -> ClusterPacker { unimplemented!() }
//! # fn build_design() -> mosaic_netlist::CellDesign { unimplemented!() }
//!
//! let mut design = build_design();
//! let mut packer = build_packer();
//! let sink = DiagnosticSink::new();
//! let packed = packer.pack(&mut design, &sink)?;
//! assert!(packed.clusters.len() > 0);
//! # Ok::<(), mosaic_pack::PackError>(())
//! ```

#![warn(missing_docs)]

pub mod chain;
pub mod cluster;
pub mod design;
pub mod driver;
pub mod info;
pub mod prepack;
pub mod prepackers;
pub mod rule;
pub mod rules;
pub mod select;
pub mod selectors;
pub mod status;
pub mod strategy;
pub mod undo;
pub mod utils;

#[cfg(test)]
pub(crate) mod testutil;

pub use chain::{
    CarryChain, CarryChainConnection, CarryChainFinder, CarryChainId, CarryChainStore,
    ClusterChain, ClusterChainId, ClusterChainStore, Offset,
};
pub use cluster::{
    possible_anchors, CapacityClusterFactory, Cluster, ClusterFactory, ClusterId, RouteTree,
    SharedBelPolicy, StrictSharedBelPolicy,
};
pub use design::ClusterDesign;
pub use driver::{ClusterPacker, PackError, PackedDesign, Packer};
pub use info::{PackingInfo, PackingState};
pub use prepack::{PrepackStatus, Prepacker, PrepackerFactory};
pub use prepackers::{ForcedPairPrepacker, ForcedPairPrepackerFactory};
pub use rule::{PackRule, PackRuleFactory, PackRuleResult};
pub use rules::{ReserveBelForSourceRule, ReserveBelForSourceRuleFactory};
pub use select::{BelSelector, CellSelector, ClusterCostCalculator, SeedSelector};
pub use selectors::{
    HighestPinCountSeedSelector, LowestCostBelSelector, SharedNetsCellSelector,
    UtilizationClusterCostCalculator,
};
pub use status::PackStatus;
pub use strategy::{
    add_cell_to_cluster, MultiBelPackStrategy, PackStrategy, PackedCells, SingleBelPackStrategy,
};
pub use undo::UndoMap;
pub use utils::{NoopPackingUtils, PackingUtils};
