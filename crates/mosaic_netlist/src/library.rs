//! Library of cell kinds and their placement legality tables.
//!
//! A [`CellKind`] describes one class of technology-mapped primitive (a
//! LUT4, a flip-flop, a carry element): which BEL kinds its instances may
//! occupy, and which BEL pins each cell pin may legally map onto for each of
//! those BEL kinds. The packer consults these tables when choosing candidate
//! BELs for a cell and when matching carry-chain direct connections.

use crate::arena::Arena;
use crate::ids::KindId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Direction of a pin relative to the cell that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinDirection {
    /// The pin consumes a signal.
    Input,
    /// The pin drives a signal.
    Output,
    /// The pin may do either (rare; treated as both by legality queries).
    Inout,
}

/// Template for one pin of a cell kind.
///
/// The `bel_pins` table gives, per compatible BEL kind, the BEL pin names
/// this cell pin may be mapped onto when the cell occupies a BEL of that
/// kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinTemplate {
    /// Pin name on the cell (e.g., "I0", "O", "D", "CIN").
    pub name: String,
    /// Direction of the pin.
    pub direction: PinDirection,
    /// BEL kind name to legal BEL pin names for this cell pin.
    pub bel_pins: HashMap<String, Vec<String>>,
}

/// One class of technology-mapped primitive cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellKind {
    /// The unique ID of this kind within its library.
    pub id: KindId,
    /// Library name of the kind (e.g., "LUT4", "DFF", "CARRY4").
    pub name: String,
    /// Names of the BEL kinds instances of this cell may occupy.
    pub bel_kinds: Vec<String>,
    /// Pin templates, in cell pin order.
    pub pins: Vec<PinTemplate>,
}

impl CellKind {
    /// Returns `true` if instances of this kind may occupy a BEL of the
    /// given kind.
    pub fn is_compatible_with(&self, bel_kind: &str) -> bool {
        self.bel_kinds.iter().any(|k| k == bel_kind)
    }

    /// Returns the pin template with the given name, if any.
    pub fn pin_template(&self, pin_name: &str) -> Option<&PinTemplate> {
        self.pins.iter().find(|p| p.name == pin_name)
    }

    /// Returns the BEL pin names the given cell pin may map onto when the
    /// cell occupies a BEL of kind `bel_kind`. Empty if the pin or kind is
    /// unknown.
    pub fn possible_bel_pin_names(&self, pin_name: &str, bel_kind: &str) -> &[String] {
        self.pin_template(pin_name)
            .and_then(|p| p.bel_pins.get(bel_kind))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

/// A collection of [`CellKind`]s with name lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CellLibrary {
    kinds: Arena<KindId, CellKind>,
    #[serde(skip)]
    by_name: HashMap<String, KindId>,
}

impl CellLibrary {
    /// Creates an empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a kind to the library and returns its ID.
    ///
    /// # Panics
    ///
    /// Panics if a kind with the same name already exists; kind names are
    /// the library's primary key and duplicates indicate a construction bug.
    pub fn add_kind(&mut self, mut kind: CellKind) -> KindId {
        assert!(
            !self.by_name.contains_key(&kind.name),
            "duplicate cell kind {}",
            kind.name
        );
        let name = kind.name.clone();
        let id = KindId::from_raw(self.kinds.len() as u32);
        kind.id = id;
        self.kinds.alloc(kind);
        self.by_name.insert(name, id);
        id
    }

    /// Returns the kind with the given ID.
    pub fn kind(&self, id: KindId) -> &CellKind {
        self.kinds.get(id)
    }

    /// Returns the ID of the kind with the given name, if any.
    pub fn kind_named(&self, name: &str) -> Option<KindId> {
        self.by_name.get(name).copied()
    }

    /// Returns the number of kinds in the library.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Returns `true` if the library contains no kinds.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Rebuilds the name index after deserialization.
    pub fn rebuild_indices(&mut self) {
        self.by_name.clear();
        for (id, kind) in self.kinds.iter() {
            self.by_name.insert(kind.name.clone(), id);
        }
    }
}
