//! The cluster data model: cells bound to the BELs of one pack unit.
//!
//! A [`Cluster`] is the packer's primary mutable aggregate. It owns the
//! bidirectional BEL-to-cell binding, the cell-pin to BEL-pin mapping, and
//! (after construction) the partition of its nets into internal and
//! external with per-net route trees. Everything a packing attempt does to
//! a cluster is confined to the cluster's own maps and is exactly
//! reversible, which is what makes speculative search safe.

use mosaic_arch::{BelId, BelPinId, PackUnit, PackUnitId, PackUnitList, PackUnitTemplate, SiteId, WireId};
use mosaic_netlist::{CellDesign, CellId, NetId, PinId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::chain::ClusterChainId;

/// Opaque, copyable ID for a cluster.
///
/// IDs are assigned by the [`ClusterFactory`] at creation, so tentative
/// clusters are addressable before (and whether or not) they are committed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct ClusterId(u32);

impl ClusterId {
    /// Creates an ID from a raw `u32` index.
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw `u32` index.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tree of wires carrying one net through a cluster.
///
/// The root is the wire the net enters on (or is sourced at); children are
/// the wires reached from their parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteTree {
    /// The wire at this node.
    pub wire: WireId,
    /// Wires reached from this node.
    pub children: Vec<RouteTree>,
}

impl RouteTree {
    /// Creates a leaf node for `wire`.
    pub fn new(wire: WireId) -> Self {
        Self {
            wire,
            children: Vec::new(),
        }
    }

    /// Adds `child` and returns the tree, for literal construction.
    pub fn with_child(mut self, child: RouteTree) -> Self {
        self.children.push(child);
        self
    }

    /// Returns every node of the tree in preorder.
    pub fn nodes(&self) -> Vec<&RouteTree> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            for child in node.children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Returns this tree with every wire mapped through the template's
    /// site isomorphism, or `None` if any wire has no image.
    pub fn relocated(
        &self,
        template: &PackUnitTemplate,
        old_anchor: BelId,
        new_anchor: BelId,
    ) -> Option<RouteTree> {
        let wire = template.relocated_wire(self.wire, old_anchor, new_anchor)?;
        let mut children = Vec::with_capacity(self.children.len());
        for child in &self.children {
            children.push(child.relocated(template, old_anchor, new_anchor)?);
        }
        Some(RouteTree { wire, children })
    }
}

/// Decides whether occupancy of one BEL of a shared-configuration pair
/// implies the paired BEL is unusable.
///
/// Families differ on when two half-resources of one physical element can
/// coexist (input counts, naming constraints), so the policy is supplied by
/// the family integration, never hard-coded in the cluster.
pub trait SharedBelPolicy {
    /// Returns `true` if `occupant` sitting at `occupied_bel` makes the
    /// paired `queried_bel` effectively occupied.
    fn occupancy_implied(
        &self,
        design: &CellDesign,
        occupant: CellId,
        occupied_bel: BelId,
        queried_bel: BelId,
    ) -> bool;
}

/// A [`SharedBelPolicy`] that always propagates occupancy to the pair.
pub struct StrictSharedBelPolicy;

impl SharedBelPolicy for StrictSharedBelPolicy {
    fn occupancy_implied(
        &self,
        _design: &CellDesign,
        _occupant: CellId,
        _occupied_bel: BelId,
        _queried_bel: BelId,
    ) -> bool {
        true
    }
}

/// One cluster: a tentative or committed group of cells mapped onto the
/// BELs of one pack unit instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    id: ClusterId,
    name: String,
    unit: PackUnitId,
    anchor: BelId,
    bel_count: usize,
    /// Cost assigned by the cluster cost calculator after a valid fill.
    pub cost: f64,
    placement_map: HashMap<BelId, CellId>,
    cell_location_map: HashMap<CellId, BelId>,
    pin_map: HashMap<PinId, Vec<BelPinId>>,
    internal_nets: Option<HashMap<NetId, Vec<RouteTree>>>,
    external_nets: Option<HashMap<NetId, Vec<RouteTree>>>,
    chain: Option<ClusterChainId>,
    placement: Option<SiteId>,
}

impl Cluster {
    /// Creates an empty cluster shaped like `unit`.
    pub fn new(id: ClusterId, name: impl Into<String>, unit: &PackUnit) -> Self {
        Self {
            id,
            name: name.into(),
            unit: unit.id,
            anchor: unit.template.anchor,
            bel_count: unit.template.bel_count(),
            cost: 0.0,
            placement_map: HashMap::new(),
            cell_location_map: HashMap::new(),
            pin_map: HashMap::new(),
            internal_nets: None,
            external_nets: None,
            chain: None,
            placement: None,
        }
    }

    /// Returns this cluster's ID.
    pub fn id(&self) -> ClusterId {
        self.id
    }

    /// Returns this cluster's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the pack unit this cluster is shaped like.
    pub fn unit(&self) -> PackUnitId {
        self.unit
    }

    /// Returns the anchor BEL cluster-relative locations refer to.
    pub fn anchor(&self) -> BelId {
        self.anchor
    }

    /// Binds `cell` to `bel`.
    ///
    /// # Panics
    ///
    /// Panics if `bel` is occupied or `cell` is already in this cluster;
    /// both indicate a bug in the caller, not design infeasibility.
    pub fn add_cell(&mut self, bel: BelId, cell: CellId) {
        assert!(
            !self.cell_location_map.contains_key(&cell),
            "cell {cell} is already in cluster {}",
            self.name
        );
        assert!(
            !self.placement_map.contains_key(&bel),
            "BEL {bel} is already occupied in cluster {}",
            self.name
        );
        self.placement_map.insert(bel, cell);
        self.cell_location_map.insert(cell, bel);
    }

    /// Unbinds `cell` from its BEL.
    ///
    /// # Panics
    ///
    /// Panics if `cell` is not in this cluster.
    pub fn remove_cell(&mut self, cell: CellId) {
        let bel = self
            .cell_location_map
            .remove(&cell)
            .unwrap_or_else(|| panic!("cell {cell} is not in cluster {}", self.name));
        self.placement_map.remove(&bel);
    }

    /// Returns the cells in this cluster, ordered by ID for determinism.
    pub fn cells(&self) -> Vec<CellId> {
        let mut cells: Vec<CellId> = self.cell_location_map.keys().copied().collect();
        cells.sort_by_key(|c| c.as_raw());
        cells
    }

    /// Returns the `(cell, BEL)` bindings, ordered by cell ID.
    pub fn placements(&self) -> Vec<(CellId, BelId)> {
        let mut out: Vec<(CellId, BelId)> = self
            .cell_location_map
            .iter()
            .map(|(&c, &b)| (c, b))
            .collect();
        out.sort_by_key(|(c, _)| c.as_raw());
        out
    }

    /// Returns the number of cells in this cluster.
    pub fn cell_count(&self) -> usize {
        self.cell_location_map.len()
    }

    /// Returns `true` if `cell` is in this cluster.
    pub fn has_cell(&self, cell: CellId) -> bool {
        self.cell_location_map.contains_key(&cell)
    }

    /// Returns `true` if `bel` is directly occupied.
    pub fn is_bel_occupied(&self, bel: BelId) -> bool {
        self.placement_map.contains_key(&bel)
    }

    /// Returns `true` if `bel` is occupied directly or by implication of
    /// its shared-configuration pair, as judged by `policy`.
    pub fn is_bel_occupied_shared(
        &self,
        template: &PackUnitTemplate,
        policy: &dyn SharedBelPolicy,
        design: &CellDesign,
        bel: BelId,
    ) -> bool {
        if self.placement_map.contains_key(&bel) {
            return true;
        }
        if let Some(pair) = template.paired_bel(bel) {
            if let Some(&occupant) = self.placement_map.get(&pair) {
                return policy.occupancy_implied(design, occupant, pair, bel);
            }
        }
        false
    }

    /// Returns `true` if every BEL of the template is occupied.
    pub fn is_full(&self) -> bool {
        self.placement_map.len() == self.bel_count
    }

    /// Returns the BEL `cell` occupies, or `None` if it is not here.
    pub fn cell_placement(&self, cell: CellId) -> Option<BelId> {
        self.cell_location_map.get(&cell).copied()
    }

    /// Returns the cell at `bel`, or `None` if the BEL is unoccupied.
    pub fn cell_at_bel(&self, bel: BelId) -> Option<CellId> {
        self.placement_map.get(&bel).copied()
    }

    /// Returns the cluster chain this cluster belongs to, if any.
    pub fn chain(&self) -> Option<ClusterChainId> {
        self.chain
    }

    /// Sets or clears the cluster chain membership.
    pub fn set_chain(&mut self, chain: Option<ClusterChainId>) {
        self.chain = chain;
    }

    // Nets-in-cluster methods

    /// Partitions the nets touching this cluster into internal (fully
    /// contained) and external (leaving the cluster). Must be called before
    /// analyzing or changing the cluster's routing.
    pub fn construct_nets(&mut self, design: &CellDesign) {
        let mut internal = HashMap::new();
        let mut external = HashMap::new();

        let mut nets: Vec<NetId> = Vec::new();
        for cell in self.cells() {
            for &pin in &design.cell(cell).pins {
                if let Some(net) = design.pin(pin).net {
                    if !nets.contains(&net) {
                        nets.push(net);
                    }
                }
            }
        }

        for net in nets {
            let leaves_cluster = design
                .net(net)
                .pins
                .iter()
                .any(|&p| !self.has_cell(design.pin(p).cell));
            if leaves_cluster {
                external.insert(net, Vec::new());
            } else {
                internal.insert(net, Vec::new());
            }
        }

        self.internal_nets = Some(internal);
        self.external_nets = Some(external);
    }

    /// Returns all nets fully contained in this cluster.
    ///
    /// # Panics
    ///
    /// Panics if [`construct_nets`](Self::construct_nets) has not run.
    pub fn internal_nets(&self) -> Vec<NetId> {
        let nets = self.internal_nets.as_ref().expect("nets not constructed");
        let mut out: Vec<NetId> = nets.keys().copied().collect();
        out.sort_by_key(|n| n.as_raw());
        out
    }

    /// Returns all nets that exit this cluster.
    ///
    /// # Panics
    ///
    /// Panics if [`construct_nets`](Self::construct_nets) has not run.
    pub fn external_nets(&self) -> Vec<NetId> {
        let nets = self.external_nets.as_ref().expect("nets not constructed");
        let mut out: Vec<NetId> = nets.keys().copied().collect();
        out.sort_by_key(|n| n.as_raw());
        out
    }

    /// Returns all nets touching this cluster.
    pub fn nets(&self) -> Vec<NetId> {
        let mut out = self.internal_nets();
        out.extend(self.external_nets());
        out
    }

    /// Applies `route_tree` to `net` in this cluster.
    ///
    /// # Panics
    ///
    /// Panics if nets are unconstructed or `net` does not touch this
    /// cluster.
    pub fn add_net_route_tree(&mut self, net: NetId, route_tree: RouteTree) {
        let internal = self.internal_nets.as_mut().expect("nets not constructed");
        if let Some(trees) = internal.get_mut(&net) {
            trees.push(route_tree);
            return;
        }
        let external = self.external_nets.as_mut().expect("nets not constructed");
        match external.get_mut(&net) {
            Some(trees) => trees.push(route_tree),
            None => panic!("cluster {} does not have net {net}", self.name),
        }
    }

    /// Returns the route trees applied to `net`, or `None` if the net does
    /// not touch this cluster.
    pub fn route_trees(&self, net: NetId) -> Option<&[RouteTree]> {
        let internal = self.internal_nets.as_ref().expect("nets not constructed");
        if let Some(trees) = internal.get(&net) {
            return Some(trees);
        }
        let external = self.external_nets.as_ref().expect("nets not constructed");
        external.get(&net).map(|t| t.as_slice())
    }

    /// Clears all routing for this cluster.
    pub fn clear_routing(&mut self) {
        if let Some(nets) = self.internal_nets.as_mut() {
            nets.values_mut().for_each(|t| t.clear());
        }
        if let Some(nets) = self.external_nets.as_mut() {
            nets.values_mut().for_each(|t| t.clear());
        }
    }

    // Pin mapping methods

    /// Sets the pin mapping for `pin` in this cluster.
    pub fn set_pin_mapping(&mut self, pin: PinId, bel_pins: Vec<BelPinId>) {
        self.pin_map.insert(pin, bel_pins);
    }

    /// Removes the pin mapping for `pin`, returning it if present.
    pub fn remove_pin_mapping(&mut self, pin: PinId) -> Option<Vec<BelPinId>> {
        self.pin_map.remove(&pin)
    }

    /// Returns the pin mapping for `pin`, or `None` if the pin is unmapped.
    pub fn pin_mapping(&self, pin: PinId) -> Option<&[BelPinId]> {
        self.pin_map.get(&pin).map(|v| v.as_slice())
    }

    /// Returns the full cell-pin to BEL-pin map.
    pub fn pin_map(&self) -> &HashMap<PinId, Vec<BelPinId>> {
        &self.pin_map
    }

    // Placement methods

    /// Returns `true` if this cluster has a device placement.
    pub fn is_placed(&self) -> bool {
        self.placement.is_some()
    }

    /// Returns the device site this cluster is placed on, if any.
    pub fn placement(&self) -> Option<SiteId> {
        self.placement
    }

    /// Sets the placement of this cluster.
    pub fn place(&mut self, site: SiteId) {
        self.placement = Some(site);
    }

    /// Clears the placement of this cluster.
    pub fn unplace(&mut self) {
        self.placement = None;
    }

    /// Remaps every BEL binding, pin mapping, and route tree to be relative
    /// to `new_anchor`, which must be isomorphic to the current anchor.
    ///
    /// # Panics
    ///
    /// Panics if any BEL, BEL pin, or wire has no image under the
    /// isomorphism; an incomplete relocation is a template or caller bug.
    pub fn relocate(&mut self, template: &PackUnitTemplate, new_anchor: BelId) {
        let old_anchor = self.anchor;

        let mut placement_map = HashMap::with_capacity(self.placement_map.len());
        for (&bel, &cell) in &self.placement_map {
            let new_bel = template
                .relocated_bel(bel, old_anchor, new_anchor)
                .unwrap_or_else(|| panic!("BEL {bel} has no image at the new anchor"));
            placement_map.insert(new_bel, cell);
        }
        self.placement_map = placement_map;
        self.cell_location_map = self
            .placement_map
            .iter()
            .map(|(&bel, &cell)| (cell, bel))
            .collect();

        let mut pin_map = HashMap::with_capacity(self.pin_map.len());
        for (&pin, bel_pins) in &self.pin_map {
            let relocated = bel_pins
                .iter()
                .map(|&bp| {
                    template
                        .relocated_bel_pin(bp, old_anchor, new_anchor)
                        .unwrap_or_else(|| panic!("BEL pin {bp} has no image at the new anchor"))
                })
                .collect();
            pin_map.insert(pin, relocated);
        }
        self.pin_map = pin_map;

        for nets in [self.internal_nets.as_mut(), self.external_nets.as_mut()]
            .into_iter()
            .flatten()
        {
            for trees in nets.values_mut() {
                let relocated: Vec<RouteTree> = trees
                    .iter()
                    .map(|t| {
                        t.relocated(template, old_anchor, new_anchor)
                            .expect("route tree wire has no image at the new anchor")
                    })
                    .collect();
                *trees = relocated;
            }
        }

        self.anchor = new_anchor;
    }
}

/// Returns the BELs of `template` that instances of `cell`'s kind may
/// occupy.
pub fn possible_anchors(
    design: &CellDesign,
    template: &PackUnitTemplate,
    cell: CellId,
) -> Vec<BelId> {
    let kind = design.kind_of(cell);
    template
        .bels()
        .iter()
        .filter(|bel| kind.is_compatible_with(&bel.kind))
        .map(|bel| bel.id)
        .collect()
}

/// Creates clusters and tracks how many instances of each pack unit the
/// device can still supply.
pub trait ClusterFactory {
    /// Called once before any cluster is created.
    fn init(&mut self) {}

    /// Returns all pack units this factory can instantiate.
    fn supported_pack_units(&self) -> Vec<PackUnitId>;

    /// Returns the number of instances of `unit` remaining in the device.
    fn num_remaining(&self, unit: PackUnitId) -> usize;

    /// Creates a new empty cluster of type `unit`.
    fn create_new_cluster(&mut self, name: &str, unit: PackUnitId) -> Cluster;

    /// Signals that `cluster` is complete and will be used in the design.
    fn commit_cluster(&mut self, cluster: &Cluster);
}

/// A [`ClusterFactory`] backed by a fixed per-unit capacity table.
pub struct CapacityClusterFactory {
    units: Arc<PackUnitList>,
    remaining: HashMap<PackUnitId, usize>,
    next_id: u32,
}

impl CapacityClusterFactory {
    /// Creates a factory with an explicit remaining-capacity table.
    pub fn new(units: Arc<PackUnitList>, capacities: HashMap<PackUnitId, usize>) -> Self {
        Self {
            units,
            remaining: capacities,
            next_id: 0,
        }
    }

    /// Creates a factory offering `capacity` instances of every unit.
    pub fn with_uniform_capacity(units: Arc<PackUnitList>, capacity: usize) -> Self {
        let remaining = units.ids().map(|id| (id, capacity)).collect();
        Self {
            units,
            remaining,
            next_id: 0,
        }
    }
}

impl ClusterFactory for CapacityClusterFactory {
    fn supported_pack_units(&self) -> Vec<PackUnitId> {
        let mut out: Vec<PackUnitId> = self.remaining.keys().copied().collect();
        out.sort_by_key(|u| u.as_raw());
        out
    }

    fn num_remaining(&self, unit: PackUnitId) -> usize {
        self.remaining.get(&unit).copied().unwrap_or(0)
    }

    fn create_new_cluster(&mut self, name: &str, unit: PackUnitId) -> Cluster {
        let id = ClusterId::from_raw(self.next_id);
        self.next_id += 1;
        Cluster::new(id, name, self.units.unit(unit))
    }

    fn commit_cluster(&mut self, cluster: &Cluster) {
        let remaining = self
            .remaining
            .get_mut(&cluster.unit())
            .expect("committed cluster of unsupported unit");
        assert!(*remaining > 0, "pack unit capacity exhausted");
        *remaining -= 1;
    }
}
