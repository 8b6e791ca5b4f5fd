//! Diagnostics for the Mosaic CAD stages.
//!
//! CAD diagnostics are about netlist entities rather than source locations:
//! a packing failure names a cell, not a file and line. This crate provides
//! the [`Diagnostic`] type, structured [`DiagnosticCode`]s, severity levels,
//! a thread-safe [`DiagnosticSink`] accumulator, and plain-text rendering.
//!
//! # Usage
//!
//! ```
//! use mosaic_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};
//!
//! let sink = DiagnosticSink::new();
//! sink.emit(
//!     Diagnostic::error(DiagnosticCode::new(Category::Pack, 1), "no feasible pack unit")
//!         .with_cell("add_0/carry"),
//! );
//! assert!(sink.has_errors());
//! ```

#![warn(missing_docs)]

pub mod code;
pub mod diagnostic;
pub mod severity;
pub mod sink;

pub use code::{Category, DiagnosticCode};
pub use diagnostic::{render, Diagnostic};
pub use severity::Severity;
pub use sink::DiagnosticSink;
