//! Sanitise the tables of a font.
//!
//! Tables are parsed in dependency order, so that each table can read and repair the tables it
//! depends on, then written out in tag order with a checksum for each one.

use std::collections::BTreeSet;
use std::convert::TryFrom;

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::binary::write::{WriteBuffer, WriteContext};
use crate::error::{SanitiseError, WriteError};
use crate::font::{OpenTypeFile, TableKind, TableStatus};
use crate::tag::{self, DisplayTag};

/// Tables that are recognised but validated elsewhere.
const EXTERNAL_TABLES: &[u32] = &[tag::CFF];

/// Options controlling [sanitise_tables].
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SanitiseOptions {
    /// Copy tables that are not sanitised here to the output verbatim, instead of dropping them.
    pub keep_unknown_tables: bool,
}

/// Location of a table in the sanitised output.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TableRecord {
    pub tag: u32,
    pub checksum: u32,
    pub offset: u32,
    /// Length of the table, not including padding.
    pub length: u32,
}

/// A table that is not part of the sanitised output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedTable {
    pub tag: u32,
    pub reason: String,
}

/// The result of sanitising a font.
#[derive(Debug, Clone)]
pub struct SanitisedFont {
    /// The sanitised tables, each aligned to 4 bytes.
    pub data: Vec<u8>,
    /// The sanitised tables in the order they appear in `data`.
    pub tables: Vec<TableRecord>,
    pub dropped: Vec<DroppedTable>,
    /// Checksum of the whole of `data`.
    pub checksum: u32,
}

/// A table to be written to the output.
#[derive(Debug, Copy, Clone)]
enum OutputTable<'a> {
    Sanitised(TableKind),
    Verbatim(u32, &'a [u8]),
}

impl OutputTable<'_> {
    fn tag(&self) -> u32 {
        match *self {
            OutputTable::Sanitised(kind) => kind.tag(),
            OutputTable::Verbatim(tag, _) => tag,
        }
    }
}

/// Sanitise the `(tag, data)` tables of a font.
///
/// Any fatal error in a table fails the whole font. Tables that are dropped, unknown or not
/// meaningful for this font are listed in [SanitisedFont::dropped].
pub fn sanitise_tables(
    tables: &[(u32, &[u8])],
    options: SanitiseOptions,
) -> Result<SanitisedFont, SanitiseError> {
    let mut file = OpenTypeFile::new();
    let mut present = FxHashMap::default();
    let mut verbatim = Vec::new();
    let mut dropped = Vec::new();
    let mut seen = FxHashSet::default();

    for &(tag, data) in tables {
        if !seen.insert(tag) {
            debug!("'{}' table appears more than once", DisplayTag(tag));
            return Err(SanitiseError::DuplicateTable(tag));
        }
        if let Some(kind) = TableKind::from_tag(tag) {
            present.insert(kind, data);
            continue;
        }
        if EXTERNAL_TABLES.contains(&tag) {
            file.add_external_table(tag);
        }
        if options.keep_unknown_tables {
            verbatim.push(OutputTable::Verbatim(tag, data));
        } else {
            debug!("'{}' table is not sanitised, dropping it", DisplayTag(tag));
            dropped.push(DroppedTable {
                tag,
                reason: String::from("table is not sanitised"),
            });
        }
    }

    for kind in parse_order(&present, &file)? {
        let data = match present.get(&kind) {
            Some(data) => *data,
            None => continue,
        };
        match file.parse_table(kind, data) {
            Ok(TableStatus::Kept) => {}
            Ok(TableStatus::Dropped(reason)) => dropped.push(DroppedTable {
                tag: kind.tag(),
                reason,
            }),
            Err(error) => {
                return Err(SanitiseError::Parse {
                    tag: kind.tag(),
                    error,
                })
            }
        }
    }

    let mut output = verbatim;
    for kind in TableKind::ALL.into_iter().filter(|kind| present.contains_key(kind)) {
        if file.should_serialise_table(kind) {
            output.push(OutputTable::Sanitised(kind));
        } else if file.has_table(kind.tag()) {
            dropped.push(DroppedTable {
                tag: kind.tag(),
                reason: String::from("table is not used by this font"),
            });
        }
    }
    output.sort_by_key(OutputTable::tag);
    dropped.sort_by_key(|table| table.tag);

    let mut buffer = WriteBuffer::new();
    let mut records = Vec::with_capacity(output.len());
    for table in output {
        let tag = table.tag();
        let record = write_table(&mut buffer, &file, table)
            .map_err(|error| SanitiseError::Write { tag, error })?;
        records.push(record);
    }

    let checksum = buffer.checksum();
    Ok(SanitisedFont {
        data: buffer.into_inner(),
        tables: records,
        dropped,
        checksum,
    })
}

/// Order the present tables so that every table comes after the tables it depends on.
///
/// Tables that are ready at the same time are ordered by [TableKind::ALL].
fn parse_order(
    present: &FxHashMap<TableKind, &[u8]>,
    file: &OpenTypeFile<'_>,
) -> Result<Vec<TableKind>, SanitiseError> {
    let mut in_degree: FxHashMap<TableKind, usize> = FxHashMap::default();
    let mut dependents: FxHashMap<TableKind, Vec<TableKind>> = FxHashMap::default();

    for kind in TableKind::ALL.into_iter().filter(|kind| present.contains_key(kind)) {
        let mut degree = 0;
        for &dependency in kind.requires() {
            match TableKind::from_tag(dependency) {
                Some(dependency_kind) if present.contains_key(&dependency_kind) => {
                    dependents.entry(dependency_kind).or_default().push(kind);
                    degree += 1;
                }
                _ if file.has_table(dependency) => {}
                _ => {
                    debug!(
                        "'{}' table requires the '{}' table",
                        DisplayTag(kind.tag()),
                        DisplayTag(dependency)
                    );
                    return Err(SanitiseError::MissingDependency {
                        tag: kind.tag(),
                        dependency,
                    });
                }
            }
        }
        for &dependency in kind.uses() {
            if let Some(dependency_kind) = TableKind::from_tag(dependency) {
                if present.contains_key(&dependency_kind) {
                    dependents.entry(dependency_kind).or_default().push(kind);
                    degree += 1;
                }
            }
        }
        in_degree.insert(kind, degree);
    }

    let mut ready = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&kind, _)| kind)
        .collect::<BTreeSet<_>>();
    let mut order = Vec::with_capacity(present.len());
    while let Some(kind) = ready.pop_first() {
        order.push(kind);
        for dependent in dependents.get(&kind).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if order.len() != present.len() {
        debug!("table dependencies form a cycle");
        return Err(SanitiseError::DependencyCycle);
    }

    Ok(order)
}

/// Write one table, 4-byte aligned, and compute its checksum.
fn write_table(
    buffer: &mut WriteBuffer,
    file: &OpenTypeFile<'_>,
    table: OutputTable<'_>,
) -> Result<TableRecord, WriteError> {
    let offset = buffer.bytes_written();
    let saved = buffer.save_checksum();
    buffer.reset_checksum();
    match table {
        OutputTable::Sanitised(kind) => file.serialise_table(kind, buffer)?,
        OutputTable::Verbatim(_, data) => buffer.write_bytes(data)?,
    }
    let length = buffer.bytes_written() - offset;
    let checksum = buffer.checksum();
    buffer.restore_checksum(saved);
    buffer.align_long()?;

    Ok(TableRecord {
        tag: table.tag(),
        checksum,
        offset: u32::try_from(offset)?,
        length: u32::try_from(length)?,
    })
}
