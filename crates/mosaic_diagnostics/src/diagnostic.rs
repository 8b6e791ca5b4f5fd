//! Structured diagnostic messages with severity, codes, and subjects.

use crate::code::DiagnosticCode;
use crate::severity::Severity;
use serde::{Deserialize, Serialize};

/// A structured diagnostic message emitted by a CAD stage.
///
/// The subject of a CAD diagnostic is a netlist entity, not a source
/// location: diagnostics optionally name the cell they concern. Each
/// diagnostic carries a severity, a structured code, the main message, and
/// optional explanatory notes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity level of this diagnostic.
    pub severity: Severity,
    /// The code identifying the type of diagnostic.
    pub code: DiagnosticCode,
    /// The main diagnostic message.
    pub message: String,
    /// Name of the cell this diagnostic concerns, if any.
    pub cell: Option<String>,
    /// Explanatory footnotes.
    pub notes: Vec<String>,
}

impl Diagnostic {
    /// Creates a new note-severity diagnostic.
    pub fn note(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Note, code, message)
    }

    /// Creates a new warning diagnostic.
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    /// Creates a new error diagnostic.
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    fn new(severity: Severity, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            cell: None,
            notes: Vec::new(),
        }
    }

    /// Names the cell this diagnostic concerns.
    pub fn with_cell(mut self, cell: impl Into<String>) -> Self {
        self.cell = Some(cell.into());
        self
    }

    /// Adds an explanatory note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

/// Renders a diagnostic as a single plain-text block.
pub fn render(diag: &Diagnostic) -> String {
    let mut out = format!("{}[{}]: {}", diag.severity, diag.code, diag.message);
    if let Some(cell) = &diag.cell {
        out.push_str(&format!("\n  cell: {cell}"));
    }
    for note in &diag.notes {
        out.push_str(&format!("\n  note: {note}"));
    }
    out
}
