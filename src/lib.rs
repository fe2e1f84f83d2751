#![warn(rust_2018_idioms)]

//! # Font Sanitiser
//!
//! Validates the tables of untrusted OpenType and TrueType fonts, repairing what can be repaired,
//! dropping optional tables that are broken and rejecting fonts that cannot be made safe. The
//! sanitised tables are written back out in a canonical form.
//!
//! Each table is parsed into a record held by [font::OpenTypeFile]. The [sanitise] module
//! drives a whole font through parsing, in dependency order, and serialisation.

/// Reading and writing of binary data.
pub mod binary;
/// Checksum calculation routines.
pub mod checksum;
pub mod error;
pub mod font;
pub mod sanitise;
pub mod size;
pub mod tables;
pub mod tag;
/// Shared test code.
#[cfg(test)]
pub mod tests;

pub use crate::sanitise::{sanitise_tables, SanitiseOptions, SanitisedFont};
