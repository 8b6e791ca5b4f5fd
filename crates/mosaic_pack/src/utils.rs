//! Hooks for preparing a design before packing and finishing clusters
//! afterwards.

use crate::cluster::Cluster;
use mosaic_netlist::CellDesign;

/// Family-supplied preparation and wrap-up around the packing loop.
pub trait PackingUtils {
    /// Performs any needed modifications to the design prior to packing.
    fn prepare_design(&mut self, design: &mut CellDesign);

    /// Finishes one committed cluster (intra-cluster routing, cleanup).
    /// Called once per committed cluster after the whole design is packed.
    fn finish(&mut self, design: &CellDesign, cluster: &mut Cluster);
}

/// A [`PackingUtils`] that prepares and finishes nothing.
#[derive(Debug, Default)]
pub struct NoopPackingUtils;

impl PackingUtils for NoopPackingUtils {
    fn prepare_design(&mut self, _design: &mut CellDesign) {}

    fn finish(&mut self, _design: &CellDesign, _cluster: &mut Cluster) {}
}
