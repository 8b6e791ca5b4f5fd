//! Pack units: the immutable cluster shapes of a device.
//!
//! A [`PackUnit`] describes one kind of cluster the packer may build: the
//! BELs available inside it, their pins, the intra-unit wires, which pins
//! can source static nets, the direct (non-fabric) connections entering and
//! leaving the unit, and the unit's fabric boundary. Templates are produced
//! offline by a device generator and consumed read-only by the packer.

use crate::ids::{BelId, BelPinId, PackUnitId, WireId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Direction of a BEL pin relative to its BEL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BelPinDirection {
    /// The pin consumes a signal.
    Input,
    /// The pin drives a signal.
    Output,
}

/// A pin on a BEL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BelPin {
    /// Pin name (e.g., "A1", "O6", "D", "CIN").
    pub name: String,
    /// Direction of the pin.
    pub direction: BelPinDirection,
}

/// A basic element of logic within a pack unit.
///
/// BELs are the atomic placement resources cells are assigned to. The
/// `site` index is relative to the template and drives relocation: two BELs
/// with equal names in different sites of the same template are isomorphic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bel {
    /// The unique ID of this BEL within its template.
    pub id: BelId,
    /// Template-relative site index this BEL belongs to.
    pub site: u32,
    /// Instance name within the site (e.g., "A6LUT", "AFF").
    pub name: String,
    /// Device-family BEL kind matched against cell kind compatibility
    /// tables (e.g., "LUT6", "FF").
    pub kind: String,
    /// Pins of this BEL.
    pub pins: Vec<BelPin>,
}

/// A wire inside a pack unit template.
///
/// Site-relative wires (`site` set) relocate with their site; `None` marks
/// wires shared across the whole unit (clock spines, fabric ports).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wire {
    /// Wire name within its scope.
    pub name: String,
    /// Template-relative site index, or `None` for unit-global wires.
    pub site: Option<u32>,
}

/// The type of BEL pin a direct connection terminates on, described
/// positionally since the far end lies in a different cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BelPinTemplate {
    /// BEL kind of the far-end BEL (e.g., "CARRY4").
    pub bel_kind: String,
    /// Pin name on the far-end BEL (e.g., "CIN").
    pub name: String,
}

/// A connection between two clusters that bypasses general routing fabric.
///
/// Carry chains and similar dedicated paths are built from these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectConnection {
    /// The type of pin this connection drives (or is driven by).
    pub end_pin: BelPinTemplate,
    /// Index of the far-end site within its tile, when it matters.
    pub end_site_index: Option<u32>,
    /// Distinguishes different far-end pack units; `None` if any unit type
    /// can sit on the far end.
    pub end_pack_unit_index: Option<u32>,
    /// The BEL pin inside this cluster sourcing (or sinking) the connection.
    pub cluster_pin: BelPinId,
    /// The wire the connection leaves the cluster on.
    pub cluster_exit: WireId,
}

/// The name of a pack unit type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackUnitType {
    /// Type name (e.g., "SLICEL", "RAMB36").
    pub name: String,
}

impl PackUnitType {
    /// Creates a pack unit type with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl std::fmt::Display for PackUnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Template describing the make-up of a pack unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackUnitTemplate {
    bels: Vec<Bel>,
    wires: Vec<Wire>,
    /// BEL pins that can act as VCC sources.
    pub vcc_sources: Vec<BelPinId>,
    /// BEL pins that can act as GND sources.
    pub gnd_sources: Vec<BelPinId>,
    /// Direct connections sourcing pins in this cluster from outside.
    pub direct_sources_of_cluster: Vec<DirectConnection>,
    /// Direct connections from this cluster sourcing pins in other clusters.
    pub direct_sinks_of_cluster: Vec<DirectConnection>,
    /// Inputs to this cluster coming from the general routing fabric.
    pub inputs: Vec<WireId>,
    /// Pins sourcing the general routing fabric out of this cluster.
    pub outputs: Vec<WireId>,
    /// Fabric input wires able to reach each sink BEL pin.
    pub inputs_of_sink: HashMap<BelPinId, Vec<WireId>>,
    /// BEL pairs that share physical configuration state (e.g., the two
    /// half-LUTs of one logic element). Whether occupancy of one implies
    /// occupancy of the other is decided by an externally supplied policy,
    /// not by this table.
    pub paired_bels: Vec<(BelId, BelId)>,
    /// The anchor BEL cluster-relative locations are expressed against.
    pub anchor: BelId,
    #[serde(skip)]
    bel_lookup: HashMap<(u32, String), BelId>,
    #[serde(skip)]
    wire_lookup: HashMap<(Option<u32>, String), WireId>,
}

impl PackUnitTemplate {
    /// Returns all BELs in this template.
    pub fn bels(&self) -> &[Bel] {
        &self.bels
    }

    /// Returns the BEL with the given ID.
    pub fn bel(&self, id: BelId) -> &Bel {
        &self.bels[id.as_raw() as usize]
    }

    /// Returns the number of BELs in this template.
    pub fn bel_count(&self) -> usize {
        self.bels.len()
    }

    /// Returns all wires in this template.
    pub fn wires(&self) -> &[Wire] {
        &self.wires
    }

    /// Returns the wire with the given ID.
    pub fn wire(&self, id: WireId) -> &Wire {
        &self.wires[id.as_raw() as usize]
    }

    /// Returns the pin identified by `id`.
    pub fn bel_pin(&self, id: BelPinId) -> &BelPin {
        &self.bel(id.bel).pins[id.index as usize]
    }

    /// Returns the ID of the named pin on `bel`, if it exists.
    pub fn find_bel_pin(&self, bel: BelId, name: &str) -> Option<BelPinId> {
        self.bel(bel)
            .pins
            .iter()
            .position(|p| p.name == name)
            .map(|index| BelPinId {
                bel,
                index: index as u32,
            })
    }

    /// Returns the BEL sharing configuration state with `bel`, if any.
    pub fn paired_bel(&self, bel: BelId) -> Option<BelId> {
        self.paired_bels.iter().find_map(|&(a, b)| {
            if a == bel {
                Some(b)
            } else if b == bel {
                Some(a)
            } else {
                None
            }
        })
    }

    /// Returns the fabric input wires able to reach `sink`, if known.
    pub fn inputs_of_sink(&self, sink: BelPinId) -> Option<&[WireId]> {
        self.inputs_of_sink.get(&sink).map(|v| v.as_slice())
    }

    /// Returns the image of `bel` under the site isomorphism taking
    /// `old_anchor` to `new_anchor`, or `None` if no such BEL exists.
    pub fn relocated_bel(&self, bel: BelId, old_anchor: BelId, new_anchor: BelId) -> Option<BelId> {
        let delta = self.site_delta(old_anchor, new_anchor)?;
        let b = self.bel(bel);
        let target_site = b.site.checked_add_signed(delta)?;
        self.bel_lookup.get(&(target_site, b.name.clone())).copied()
    }

    /// Returns the image of `pin` under the site isomorphism taking
    /// `old_anchor` to `new_anchor`, or `None` if no such pin exists.
    pub fn relocated_bel_pin(
        &self,
        pin: BelPinId,
        old_anchor: BelId,
        new_anchor: BelId,
    ) -> Option<BelPinId> {
        let bel = self.relocated_bel(pin.bel, old_anchor, new_anchor)?;
        let name = &self.bel_pin(pin).name;
        self.find_bel_pin(bel, name)
    }

    /// Returns the image of `wire` under the site isomorphism taking
    /// `old_anchor` to `new_anchor`. Unit-global wires map to themselves.
    pub fn relocated_wire(
        &self,
        wire: WireId,
        old_anchor: BelId,
        new_anchor: BelId,
    ) -> Option<WireId> {
        let w = self.wire(wire);
        let Some(site) = w.site else {
            return Some(wire);
        };
        let delta = self.site_delta(old_anchor, new_anchor)?;
        let target_site = site.checked_add_signed(delta)?;
        self.wire_lookup
            .get(&(Some(target_site), w.name.clone()))
            .copied()
    }

    fn site_delta(&self, old_anchor: BelId, new_anchor: BelId) -> Option<i32> {
        let old = self.bel(old_anchor).site as i32;
        let new = self.bel(new_anchor).site as i32;
        Some(new - old)
    }

    /// Rebuilds the BEL and wire lookup tables after deserialization.
    pub fn rebuild_indices(&mut self) {
        self.bel_lookup.clear();
        for bel in &self.bels {
            self.bel_lookup.insert((bel.site, bel.name.clone()), bel.id);
        }
        self.wire_lookup.clear();
        for (i, wire) in self.wires.iter().enumerate() {
            self.wire_lookup
                .insert((wire.site, wire.name.clone()), WireId::from_raw(i as u32));
        }
    }
}

/// Incrementally assembles a [`PackUnitTemplate`].
#[derive(Debug, Default)]
pub struct PackUnitTemplateBuilder {
    bels: Vec<Bel>,
    wires: Vec<Wire>,
    vcc_sources: Vec<BelPinId>,
    gnd_sources: Vec<BelPinId>,
    direct_sources: Vec<DirectConnection>,
    direct_sinks: Vec<DirectConnection>,
    inputs: Vec<WireId>,
    outputs: Vec<WireId>,
    inputs_of_sink: HashMap<BelPinId, Vec<WireId>>,
    paired_bels: Vec<(BelId, BelId)>,
    anchor: Option<BelId>,
}

impl PackUnitTemplateBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a BEL and returns its ID. Pins are `(name, direction)` pairs.
    pub fn add_bel(
        &mut self,
        site: u32,
        name: impl Into<String>,
        kind: impl Into<String>,
        pins: Vec<(&str, BelPinDirection)>,
    ) -> BelId {
        let id = BelId::from_raw(self.bels.len() as u32);
        self.bels.push(Bel {
            id,
            site,
            name: name.into(),
            kind: kind.into(),
            pins: pins
                .into_iter()
                .map(|(name, direction)| BelPin {
                    name: name.to_string(),
                    direction,
                })
                .collect(),
        });
        id
    }

    /// Adds a wire and returns its ID.
    pub fn add_wire(&mut self, name: impl Into<String>, site: Option<u32>) -> WireId {
        let id = WireId::from_raw(self.wires.len() as u32);
        self.wires.push(Wire {
            name: name.into(),
            site,
        });
        id
    }

    /// Marks a wire as a fabric input of the unit.
    pub fn add_input(&mut self, wire: WireId) -> &mut Self {
        self.inputs.push(wire);
        self
    }

    /// Marks a wire as a fabric output of the unit.
    pub fn add_output(&mut self, wire: WireId) -> &mut Self {
        self.outputs.push(wire);
        self
    }

    /// Registers a VCC-source BEL pin.
    pub fn add_vcc_source(&mut self, pin: BelPinId) -> &mut Self {
        self.vcc_sources.push(pin);
        self
    }

    /// Registers a GND-source BEL pin.
    pub fn add_gnd_source(&mut self, pin: BelPinId) -> &mut Self {
        self.gnd_sources.push(pin);
        self
    }

    /// Registers a direct connection sourcing a pin in this cluster.
    pub fn add_direct_source(&mut self, dc: DirectConnection) -> &mut Self {
        self.direct_sources.push(dc);
        self
    }

    /// Registers a direct connection leaving this cluster.
    pub fn add_direct_sink(&mut self, dc: DirectConnection) -> &mut Self {
        self.direct_sinks.push(dc);
        self
    }

    /// Records the fabric inputs able to reach `sink`.
    pub fn set_inputs_of_sink(&mut self, sink: BelPinId, wires: Vec<WireId>) -> &mut Self {
        self.inputs_of_sink.insert(sink, wires);
        self
    }

    /// Declares that two BELs share configuration state.
    pub fn pair_bels(&mut self, a: BelId, b: BelId) -> &mut Self {
        self.paired_bels.push((a, b));
        self
    }

    /// Sets the anchor BEL.
    pub fn set_anchor(&mut self, anchor: BelId) -> &mut Self {
        self.anchor = Some(anchor);
        self
    }

    /// Finalizes the template.
    ///
    /// # Panics
    ///
    /// Panics if the builder holds no BELs. The anchor defaults to the
    /// first BEL when unset.
    pub fn build(self) -> PackUnitTemplate {
        assert!(!self.bels.is_empty(), "pack unit template has no BELs");
        let anchor = self.anchor.unwrap_or(BelId::from_raw(0));
        let mut template = PackUnitTemplate {
            bels: self.bels,
            wires: self.wires,
            vcc_sources: self.vcc_sources,
            gnd_sources: self.gnd_sources,
            direct_sources_of_cluster: self.direct_sources,
            direct_sinks_of_cluster: self.direct_sinks,
            inputs: self.inputs,
            outputs: self.outputs,
            inputs_of_sink: self.inputs_of_sink,
            paired_bels: self.paired_bels,
            anchor,
            bel_lookup: HashMap::new(),
            wire_lookup: HashMap::new(),
        };
        template.rebuild_indices();
        template
    }
}

/// One pack unit supported by a device: a named type plus its template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackUnit {
    /// The unique ID of this unit within its list.
    pub id: PackUnitId,
    /// The type of this unit.
    pub unit_type: PackUnitType,
    /// The template describing the unit's make-up.
    pub template: PackUnitTemplate,
}

/// All pack units supported by a device, plus device-wide fabric tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackUnitList {
    /// The part this list was generated for.
    pub part: String,
    units: Vec<PackUnit>,
    /// BEL kind to pin names that drive general fabric.
    pub pins_driving_general_fabric: HashMap<String, Vec<String>>,
    /// BEL kind to pin names driven by general fabric.
    pub pins_driven_by_general_fabric: HashMap<String, Vec<String>>,
}

impl PackUnitList {
    /// Creates a list for the given part.
    pub fn new(part: impl Into<String>) -> Self {
        Self {
            part: part.into(),
            units: Vec::new(),
            pins_driving_general_fabric: HashMap::new(),
            pins_driven_by_general_fabric: HashMap::new(),
        }
    }

    /// Adds a unit to the list and returns its ID.
    pub fn add_unit(&mut self, unit_type: PackUnitType, template: PackUnitTemplate) -> PackUnitId {
        let id = PackUnitId::from_raw(self.units.len() as u32);
        self.units.push(PackUnit {
            id,
            unit_type,
            template,
        });
        id
    }

    /// Returns the unit with the given ID.
    pub fn unit(&self, id: PackUnitId) -> &PackUnit {
        &self.units[id.as_raw() as usize]
    }

    /// Returns the template of the unit with the given ID.
    pub fn template(&self, id: PackUnitId) -> &PackUnitTemplate {
        &self.unit(id).template
    }

    /// Iterates over all units.
    pub fn units(&self) -> impl Iterator<Item = &PackUnit> {
        self.units.iter()
    }

    /// Iterates over all unit IDs.
    pub fn ids(&self) -> impl Iterator<Item = PackUnitId> + '_ {
        (0..self.units.len()).map(|i| PackUnitId::from_raw(i as u32))
    }

    /// Returns the number of units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns `true` if the list holds no units.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Rebuilds template lookup tables after deserialization.
    pub fn rebuild_indices(&mut self) {
        for unit in &mut self.units {
            unit.template.rebuild_indices();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice_template() -> PackUnitTemplate {
        let mut b = PackUnitTemplateBuilder::new();
        let lut_a = b.add_bel(
            0,
            "A6LUT",
            "LUT6",
            vec![
                ("A1", BelPinDirection::Input),
                ("O6", BelPinDirection::Output),
            ],
        );
        let lut_a5 = b.add_bel(
            0,
            "A5LUT",
            "LUT5",
            vec![
                ("A1", BelPinDirection::Input),
                ("O5", BelPinDirection::Output),
            ],
        );
        let lut_b = b.add_bel(
            1,
            "A6LUT",
            "LUT6",
            vec![
                ("A1", BelPinDirection::Input),
                ("O6", BelPinDirection::Output),
            ],
        );
        let in0 = b.add_wire("IN0", Some(0));
        b.add_wire("IN0", Some(1));
        let clk = b.add_wire("CLK", None);
        b.add_input(in0);
        b.add_input(clk);
        b.pair_bels(lut_a, lut_a5);
        b.set_anchor(lut_a);
        let _ = lut_b;
        b.build()
    }

    #[test]
    fn bel_and_pin_lookup() {
        let t = slice_template();
        assert_eq!(t.bel_count(), 3);
        let bel = BelId::from_raw(0);
        assert_eq!(t.bel(bel).name, "A6LUT");
        let pin = t.find_bel_pin(bel, "O6").unwrap();
        assert_eq!(t.bel_pin(pin).direction, BelPinDirection::Output);
        assert!(t.find_bel_pin(bel, "O5").is_none());
    }

    #[test]
    fn paired_bels_are_symmetric() {
        let t = slice_template();
        let a6 = BelId::from_raw(0);
        let a5 = BelId::from_raw(1);
        assert_eq!(t.paired_bel(a6), Some(a5));
        assert_eq!(t.paired_bel(a5), Some(a6));
        assert_eq!(t.paired_bel(BelId::from_raw(2)), None);
    }

    #[test]
    fn relocation_maps_by_site_delta() {
        let t = slice_template();
        let a6_site0 = BelId::from_raw(0);
        let a6_site1 = BelId::from_raw(2);
        // Moving the anchor from site 0 to site 1 maps the site-0 A6LUT to
        // the site-1 A6LUT.
        assert_eq!(
            t.relocated_bel(a6_site0, a6_site0, a6_site1),
            Some(a6_site1)
        );
        // The A5LUT has no image in site 1.
        assert_eq!(t.relocated_bel(BelId::from_raw(1), a6_site0, a6_site1), None);
    }

    #[test]
    fn wire_relocation() {
        let t = slice_template();
        let a6_site0 = BelId::from_raw(0);
        let a6_site1 = BelId::from_raw(2);
        // Site-relative wire follows the delta.
        assert_eq!(
            t.relocated_wire(WireId::from_raw(0), a6_site0, a6_site1),
            Some(WireId::from_raw(1))
        );
        // Unit-global wire maps to itself.
        assert_eq!(
            t.relocated_wire(WireId::from_raw(2), a6_site0, a6_site1),
            Some(WireId::from_raw(2))
        );
    }

    #[test]
    fn identity_relocation() {
        let t = slice_template();
        let anchor = t.anchor;
        for bel in t.bels() {
            assert_eq!(t.relocated_bel(bel.id, anchor, anchor), Some(bel.id));
        }
    }

    #[test]
    fn unit_list_roundtrip() {
        let mut list = PackUnitList::new("part0");
        let id = list.add_unit(PackUnitType::new("SLICE"), slice_template());
        assert_eq!(list.unit(id).unit_type.name, "SLICE");
        assert_eq!(list.len(), 1);

        let json = serde_json::to_string(&list).unwrap();
        let mut restored: PackUnitList = serde_json::from_str(&json).unwrap();
        restored.rebuild_indices();
        let t = restored.template(id);
        // Lookup tables usable again after rebuild.
        let a6 = BelId::from_raw(0);
        assert_eq!(t.relocated_bel(a6, a6, a6), Some(a6));
    }
}
