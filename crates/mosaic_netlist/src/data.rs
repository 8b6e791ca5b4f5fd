//! Core flat-netlist data structures.
//!
//! Defines the technology-mapped netlist consumed by the packer: cells
//! (instances of library kinds), nets (driver + sinks), and pins (cell
//! connections to nets). The [`CellDesign`] is the central data structure
//! handed to the packing engine.

use crate::arena::Arena;
use crate::ids::{CellId, KindId, NetId, PinId};
use crate::library::{CellLibrary, PinDirection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The electrical class of a net.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetKind {
    /// An ordinary signal net.
    Logic,
    /// The global VCC (constant 1) net.
    Vcc,
    /// The global GND (constant 0) net.
    Gnd,
}

/// A cell in the netlist: one instance of a library [`CellKind`].
///
/// [`CellKind`]: crate::CellKind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    /// The unique ID of this cell.
    pub id: CellId,
    /// Instance name (e.g., "lut_0", "ff_q_reg").
    pub name: String,
    /// The library kind this cell instantiates.
    pub kind: KindId,
    /// The pins of this cell, one per kind pin template, in template order.
    pub pins: Vec<PinId>,
}

/// A net connecting one driver pin to zero or more sink pins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Net {
    /// The unique ID of this net.
    pub id: NetId,
    /// Net name (e.g., "clk", "sum[3]").
    pub name: String,
    /// The electrical class of this net.
    pub kind: NetKind,
    /// All pins attached to this net, in attachment order.
    pub pins: Vec<PinId>,
}

impl Net {
    /// Returns `true` if this is a VCC or GND net.
    pub fn is_static(&self) -> bool {
        self.kind != NetKind::Logic
    }
}

/// A pin on a cell.
///
/// Pins connect cells to nets. Each pin belongs to exactly one cell and is
/// optionally attached to one net.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pin {
    /// The unique ID of this pin.
    pub id: PinId,
    /// Pin name from the kind's pin template (e.g., "I0", "O", "D").
    pub name: String,
    /// Direction of the pin relative to the cell.
    pub direction: PinDirection,
    /// The cell that owns this pin.
    pub cell: CellId,
    /// The net this pin is attached to (`None` = unconnected).
    pub net: Option<NetId>,
}

impl Pin {
    /// Returns `true` if this pin is attached to a net.
    pub fn is_connected(&self) -> bool {
        self.net.is_some()
    }
}

/// A technology-mapped netlist ready for packing.
///
/// Owns the cell library and arenas for cells, nets, and pins. All
/// cross-references are arena IDs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellDesign {
    /// Design name.
    pub name: String,
    /// Target device part name.
    pub part: String,
    /// The library of cell kinds instantiated by this design.
    pub library: CellLibrary,
    /// All cells in the design.
    pub cells: Arena<CellId, Cell>,
    /// All nets in the design.
    pub nets: Arena<NetId, Net>,
    /// All pins in the design.
    pub pins: Arena<PinId, Pin>,
    /// The VCC net, if the design has one.
    pub vcc_net: Option<NetId>,
    /// The GND net, if the design has one.
    pub gnd_net: Option<NetId>,
    /// Auxiliary index: cell name to ID (rebuilt on deserialization).
    #[serde(skip)]
    cell_by_name: HashMap<String, CellId>,
    /// Auxiliary index: net name to ID (rebuilt on deserialization).
    #[serde(skip)]
    net_by_name: HashMap<String, NetId>,
}

impl CellDesign {
    /// Creates an empty design over the given library.
    pub fn new(name: impl Into<String>, part: impl Into<String>, library: CellLibrary) -> Self {
        Self {
            name: name.into(),
            part: part.into(),
            library,
            cells: Arena::new(),
            nets: Arena::new(),
            pins: Arena::new(),
            vcc_net: None,
            gnd_net: None,
            cell_by_name: HashMap::new(),
            net_by_name: HashMap::new(),
        }
    }

    /// Adds a cell of the given kind, creating its pins from the kind's pin
    /// templates, and returns its ID.
    ///
    /// # Panics
    ///
    /// Panics if a cell with the same name already exists.
    pub fn add_cell(&mut self, name: impl Into<String>, kind: KindId) -> CellId {
        let name = name.into();
        assert!(
            !self.cell_by_name.contains_key(&name),
            "duplicate cell name {name}"
        );

        let cell_id = CellId::from_raw(self.cells.len() as u32);
        let templates: Vec<(String, PinDirection)> = self
            .library
            .kind(kind)
            .pins
            .iter()
            .map(|p| (p.name.clone(), p.direction))
            .collect();

        let mut pin_ids = Vec::with_capacity(templates.len());
        for (pin_name, direction) in templates {
            let pin_id = self.pins.alloc(Pin {
                id: PinId::from_raw(self.pins.len() as u32),
                name: pin_name,
                direction,
                cell: cell_id,
                net: None,
            });
            pin_ids.push(pin_id);
        }

        self.cell_by_name.insert(name.clone(), cell_id);
        self.cells.alloc(Cell {
            id: cell_id,
            name,
            kind,
            pins: pin_ids,
        })
    }

    /// Adds a net and returns its ID. A [`NetKind::Vcc`]/[`NetKind::Gnd`]
    /// net is recorded as the design's VCC/GND net.
    ///
    /// # Panics
    ///
    /// Panics if a net with the same name already exists.
    pub fn add_net(&mut self, name: impl Into<String>, kind: NetKind) -> NetId {
        let name = name.into();
        assert!(
            !self.net_by_name.contains_key(&name),
            "duplicate net name {name}"
        );

        let id = self.nets.alloc(Net {
            id: NetId::from_raw(self.nets.len() as u32),
            name: name.clone(),
            kind,
            pins: Vec::new(),
        });
        self.net_by_name.insert(name, id);
        match kind {
            NetKind::Vcc => self.vcc_net = Some(id),
            NetKind::Gnd => self.gnd_net = Some(id),
            NetKind::Logic => {}
        }
        id
    }

    /// Attaches the named pin of `cell` to `net`.
    ///
    /// # Panics
    ///
    /// Panics if the cell has no pin with that name or the pin is already
    /// attached to a net.
    pub fn connect(&mut self, cell: CellId, pin_name: &str, net: NetId) {
        let pin_id = self
            .cell_pin(cell, pin_name)
            .unwrap_or_else(|| panic!("cell {} has no pin {pin_name}", self.cells[cell].name));
        let pin = self.pins.get_mut(pin_id);
        assert!(
            pin.net.is_none(),
            "pin {pin_name} of cell {} is already connected",
            self.cells[cell].name
        );
        pin.net = Some(net);
        self.nets.get_mut(net).pins.push(pin_id);
    }

    /// Returns the cell with the given ID.
    pub fn cell(&self, id: CellId) -> &Cell {
        self.cells.get(id)
    }

    /// Returns the net with the given ID.
    pub fn net(&self, id: NetId) -> &Net {
        self.nets.get(id)
    }

    /// Returns the pin with the given ID.
    pub fn pin(&self, id: PinId) -> &Pin {
        self.pins.get(id)
    }

    /// Returns the ID of the cell with the given name, if any.
    pub fn cell_named(&self, name: &str) -> Option<CellId> {
        self.cell_by_name.get(name).copied()
    }

    /// Returns the ID of the net with the given name, if any.
    pub fn net_named(&self, name: &str) -> Option<NetId> {
        self.net_by_name.get(name).copied()
    }

    /// Returns the library kind of the given cell.
    pub fn kind_of(&self, cell: CellId) -> &crate::CellKind {
        self.library.kind(self.cells[cell].kind)
    }

    /// Returns the pin of `cell` with the given name, if any.
    pub fn cell_pin(&self, cell: CellId, pin_name: &str) -> Option<PinId> {
        self.cells[cell]
            .pins
            .iter()
            .copied()
            .find(|&p| self.pins[p].name == pin_name)
    }

    /// Iterates over the leaf cells of the design.
    ///
    /// The packer's netlist is flat, so every cell is a leaf.
    pub fn leaf_cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.cells.ids()
    }

    /// Returns the driver pin of the net: its first output-direction pin,
    /// or `None` for an undriven net.
    pub fn net_source_pin(&self, net: NetId) -> Option<PinId> {
        self.nets[net]
            .pins
            .iter()
            .copied()
            .find(|&p| self.pins[p].direction == PinDirection::Output)
    }

    /// Returns the non-driver pins of the net, in attachment order.
    pub fn net_sink_pins(&self, net: NetId) -> Vec<PinId> {
        let source = self.net_source_pin(net);
        self.nets[net]
            .pins
            .iter()
            .copied()
            .filter(|&p| Some(p) != source)
            .collect()
    }

    /// Counts the connected pins of `cell` whose net leaves the cell (has a
    /// pin on some other cell). Used as a base gain by seed selection.
    pub fn exposed_pin_count(&self, cell: CellId) -> usize {
        let mut count = 0;
        for &pin in &self.cells[cell].pins {
            let Some(net) = self.pins[pin].net else {
                continue;
            };
            let leaves = self.nets[net]
                .pins
                .iter()
                .any(|&other| self.pins[other].cell != cell);
            if leaves {
                count += 1;
            }
        }
        count
    }

    /// Returns the cells sourcing the VCC and GND nets, when present.
    pub fn static_source_cells(&self) -> Vec<CellId> {
        [self.vcc_net, self.gnd_net]
            .into_iter()
            .flatten()
            .filter_map(|net| self.net_source_pin(net))
            .map(|pin| self.pins[pin].cell)
            .collect()
    }

    /// Returns the number of cells in the design.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Returns the number of nets in the design.
    pub fn net_count(&self) -> usize {
        self.nets.len()
    }

    /// Rebuilds auxiliary name indices after deserialization.
    pub fn rebuild_indices(&mut self) {
        self.cell_by_name.clear();
        for (id, cell) in self.cells.iter() {
            self.cell_by_name.insert(cell.name.clone(), id);
        }
        self.net_by_name.clear();
        for (id, net) in self.nets.iter() {
            self.net_by_name.insert(net.name.clone(), id);
        }
        self.library.rebuild_indices();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{CellKind, PinTemplate};

    fn two_pin_kind(name: &str) -> CellKind {
        CellKind {
            id: KindId::from_raw(0),
            name: name.into(),
            bel_kinds: vec!["LUT4".into()],
            pins: vec![
                PinTemplate {
                    name: "I0".into(),
                    direction: PinDirection::Input,
                    bel_pins: HashMap::new(),
                },
                PinTemplate {
                    name: "O".into(),
                    direction: PinDirection::Output,
                    bel_pins: HashMap::new(),
                },
            ],
        }
    }

    fn design_with_lut() -> (CellDesign, KindId) {
        let mut lib = CellLibrary::new();
        let kind = lib.add_kind(two_pin_kind("LUT4"));
        (CellDesign::new("top", "test_part", lib), kind)
    }

    #[test]
    fn add_cell_creates_pins() {
        let (mut design, kind) = design_with_lut();
        let cell = design.add_cell("lut_0", kind);
        assert_eq!(design.cell(cell).pins.len(), 2);
        assert_eq!(design.cell_named("lut_0"), Some(cell));
        let o = design.cell_pin(cell, "O").unwrap();
        assert_eq!(design.pin(o).direction, PinDirection::Output);
    }

    #[test]
    fn connect_and_net_queries() {
        let (mut design, kind) = design_with_lut();
        let a = design.add_cell("a", kind);
        let b = design.add_cell("b", kind);
        let net = design.add_net("n0", NetKind::Logic);
        design.connect(a, "O", net);
        design.connect(b, "I0", net);

        let source = design.net_source_pin(net).unwrap();
        assert_eq!(design.pin(source).cell, a);
        let sinks = design.net_sink_pins(net);
        assert_eq!(sinks.len(), 1);
        assert_eq!(design.pin(sinks[0]).cell, b);
    }

    #[test]
    #[should_panic(expected = "already connected")]
    fn double_connect_panics() {
        let (mut design, kind) = design_with_lut();
        let a = design.add_cell("a", kind);
        let n0 = design.add_net("n0", NetKind::Logic);
        let n1 = design.add_net("n1", NetKind::Logic);
        design.connect(a, "O", n0);
        design.connect(a, "O", n1);
    }

    #[test]
    #[should_panic(expected = "duplicate cell name")]
    fn duplicate_cell_panics() {
        let (mut design, kind) = design_with_lut();
        design.add_cell("a", kind);
        design.add_cell("a", kind);
    }

    #[test]
    fn static_nets_are_recorded() {
        let (mut design, kind) = design_with_lut();
        let vcc_cell = design.add_cell("vcc_src", kind);
        let vcc = design.add_net("vcc", NetKind::Vcc);
        design.connect(vcc_cell, "O", vcc);

        assert_eq!(design.vcc_net, Some(vcc));
        assert!(design.net(vcc).is_static());
        assert_eq!(design.static_source_cells(), vec![vcc_cell]);
    }

    #[test]
    fn exposed_pin_count_ignores_internal_nets() {
        let (mut design, kind) = design_with_lut();
        let a = design.add_cell("a", kind);
        let b = design.add_cell("b", kind);
        let shared = design.add_net("shared", NetKind::Logic);
        design.connect(a, "O", shared);
        design.connect(b, "I0", shared);
        // Feedback net entirely on cell b.
        let fb = design.add_net("fb", NetKind::Logic);
        design.connect(b, "O", fb);

        assert_eq!(design.exposed_pin_count(a), 1);
        // b's O pin drives a net with no other cell attached.
        assert_eq!(design.exposed_pin_count(b), 1);
    }

    #[test]
    fn serde_roundtrip_rebuilds_indices() {
        let (mut design, kind) = design_with_lut();
        design.add_cell("a", kind);
        design.add_net("n0", NetKind::Logic);

        let json = serde_json::to_string(&design).unwrap();
        let mut restored: CellDesign = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.cell_named("a"), None);
        restored.rebuild_indices();
        assert!(restored.cell_named("a").is_some());
        assert!(restored.net_named("n0").is_some());
    }
}
