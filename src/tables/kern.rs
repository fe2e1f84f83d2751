//! `kern` table parsing and writing.
//!
//! Only horizontal format 0 subtables are kept. Other subtables are skipped.
//!
//! <https://learn.microsoft.com/en-us/typography/opentype/spec/kern>

use std::convert::TryFrom;

use log::{debug, warn};

use crate::binary::read::{ReadCtxt, ReadFrom, ReadScope};
use crate::binary::write::{WriteBinary, WriteContext};
use crate::binary::{I16Be, U16Be};
use crate::error::{ensure, fail, ParseError, WriteError};
use crate::font::{FontTable, OpenTypeFile, Parsed};
use crate::size;
use crate::tables::search_params;
use crate::tag;

/// Size of a format 0 subtable header, including the version and length.
const SUBTABLE_HEADER_LEN: usize = 14;
/// Size of a kerning pair: left, right and value.
const PAIR_LEN: usize = 3 * size::U16;
/// Most pairs a subtable can hold with its length still fitting in a `u16`.
const MAX_PAIRS: usize = (0xFFFF - SUBTABLE_HEADER_LEN) / PAIR_LEN;

/// `kern` Kerning Table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernTable {
    pub subtables: Vec<KernSubtable>,
}

/// A horizontal format 0 subtable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernSubtable {
    pub coverage: u16,
    /// The largest power of two less than or equal to the number of pairs, multiplied by the
    /// size of a pair.
    pub search_range: u16,
    pub entry_selector: u16,
    pub range_shift: u16,
    pub pairs: Vec<KernPair>,
}

/// Kerning value for glyph pair.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KernPair {
    pub left: u16,
    pub right: u16,
    pub value: i16,
}

impl KernPair {
    /// Pairs are ordered by left glyph, then right glyph.
    fn search_key(&self) -> u32 {
        (u32::from(self.left) << 16) | u32::from(self.right)
    }
}

impl ReadFrom for KernPair {
    type ReadType = (U16Be, U16Be, I16Be);

    fn read_from((left, right, value): (u16, u16, i16)) -> Self {
        KernPair { left, right, value }
    }
}

/// Outcome of reading one subtable.
enum Subtable {
    Kept(KernSubtable),
    Skipped,
    DropTable(String),
}

impl KernTable {
    pub fn read_table(ctxt: &mut ReadCtxt<'_>) -> Result<Parsed<KernTable>, ParseError> {
        let table_len = ctxt.remaining();
        let version = ctxt.read_u16be()?;
        if version > 0 {
            return Ok(Parsed::Dropped(format!("unsupported version: {}", version)));
        }
        let num_tables = ctxt.read_u16be()?;
        if num_tables == 0 {
            return Ok(Parsed::Dropped(String::from("num_tables is zero")));
        }

        let mut subtables = Vec::new();
        for index in 0..num_tables {
            match Self::read_subtable(ctxt, table_len, index)? {
                Subtable::Kept(subtable) => subtables.push(subtable),
                Subtable::Skipped => {}
                Subtable::DropTable(reason) => return Ok(Parsed::Dropped(reason)),
            }
        }

        if subtables.is_empty() {
            return Ok(Parsed::Dropped(String::from("all subtables were removed")));
        }

        Ok(Parsed::Table(KernTable { subtables }))
    }

    fn read_subtable(
        ctxt: &mut ReadCtxt<'_>,
        table_len: usize,
        index: u16,
    ) -> Result<Subtable, ParseError> {
        let start = ctxt.offset();
        let version = ctxt.read_u16be()?;
        let length = usize::from(ctxt.read_u16be()?);
        let end = start + length;
        ensure!(
            end <= table_len,
            ParseError::BadOffset,
            "kern: subtable {} of length {} at {} is outside the table",
            index,
            length,
            start
        );
        let skip = |ctxt: &mut ReadCtxt<'_>| {
            // A length too short to cover the header leaves the reader where it is.
            if end > ctxt.offset() {
                ctxt.set_offset(end);
            }
            Subtable::Skipped
        };

        if version > 0 {
            debug!("kern: skipping subtable {} with version {}", index, version);
            return Ok(skip(ctxt));
        }

        let coverage = ctxt.read_u16be()?;
        if coverage & 0x1 == 0 {
            debug!("kern: skipping vertical subtable {}", index);
            return Ok(skip(ctxt));
        }
        if coverage & 0xF0 != 0 {
            return Ok(Subtable::DropTable(String::from(
                "reserved coverage bits are set",
            )));
        }
        let format = coverage >> 8;
        if format != 0 {
            debug!("kern: skipping subtable {} with format {}", index, format);
            return Ok(skip(ctxt));
        }

        let num_pairs = ctxt.read_u16be()?;
        let mut search_range = ctxt.read_u16be()?;
        let entry_selector = ctxt.read_u16be()?;
        let mut range_shift = ctxt.read_u16be()?;
        if num_pairs == 0 {
            return Ok(Subtable::DropTable(String::from("zero length subtable")));
        }
        if usize::from(num_pairs) > MAX_PAIRS {
            return Ok(Subtable::DropTable(format!("too many pairs: {}", num_pairs)));
        }
        if SUBTABLE_HEADER_LEN + PAIR_LEN * usize::from(num_pairs) > length {
            return Ok(Subtable::DropTable(format!(
                "{} pairs do not fit in subtable length {}",
                num_pairs, length
            )));
        }

        let (expected_search_range, expected_entry_selector, expected_range_shift) =
            search_params(u32::from(num_pairs), PAIR_LEN);
        // Both fit in u16 since num_pairs * PAIR_LEN < 0xFFFF
        let expected_search_range = u16::try_from(expected_search_range)?;
        if search_range != expected_search_range {
            warn!(
                "kern: bad search range {} in subtable {}, changing it to {}",
                search_range, index, expected_search_range
            );
            search_range = expected_search_range;
        }
        if u32::from(entry_selector) != expected_entry_selector {
            fail!(
                ParseError::BadValue,
                "kern: bad entry selector {} in subtable {}",
                entry_selector,
                index
            );
        }
        let expected_range_shift = u16::try_from(expected_range_shift)?;
        if range_shift != expected_range_shift {
            warn!(
                "kern: bad range shift {} in subtable {}, changing it to {}",
                range_shift, index, expected_range_shift
            );
            range_shift = expected_range_shift;
        }

        let pairs = ctxt.read_array::<KernPair>(usize::from(num_pairs))?.to_vec();
        let mut last_key = None;
        for pair in &pairs {
            let key = pair.search_key();
            if last_key.map_or(false, |last| key <= last) {
                return Ok(Subtable::DropTable(String::from(
                    "kerning pairs are not sorted",
                )));
            }
            last_key = Some(key);
        }

        Ok(Subtable::Kept(KernSubtable {
            coverage,
            search_range,
            entry_selector,
            range_shift,
            pairs,
        }))
    }
}

impl WriteBinary<&Self> for KernTable {
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, kern: &KernTable) -> Result<(), WriteError> {
        U16Be::write(ctxt, 0u16)?; // version
        U16Be::write(ctxt, u16::try_from(kern.subtables.len())?)?;
        for subtable in &kern.subtables {
            let length = SUBTABLE_HEADER_LEN + PAIR_LEN * subtable.pairs.len();
            U16Be::write(ctxt, 0u16)?; // version
            U16Be::write(ctxt, u16::try_from(length)?)?;
            U16Be::write(ctxt, subtable.coverage)?;
            U16Be::write(ctxt, u16::try_from(subtable.pairs.len())?)?;
            U16Be::write(ctxt, subtable.search_range)?;
            U16Be::write(ctxt, subtable.entry_selector)?;
            U16Be::write(ctxt, subtable.range_shift)?;
            for pair in &subtable.pairs {
                U16Be::write(ctxt, pair.left)?;
                U16Be::write(ctxt, pair.right)?;
                I16Be::write(ctxt, pair.value)?;
            }
        }

        Ok(())
    }
}

impl<'a> FontTable<'a> for KernTable {
    const TAG: u32 = tag::KERN;

    fn parse(_file: &mut OpenTypeFile<'a>, scope: ReadScope<'a>) -> Result<Parsed<Self>, ParseError> {
        KernTable::read_table(&mut scope.ctxt())
    }

    fn store(file: &mut OpenTypeFile<'a>, table: Option<Self>) {
        file.kern = table;
    }

    fn is_present(file: &OpenTypeFile<'a>) -> bool {
        file.kern.is_some()
    }

    fn should_serialise(file: &OpenTypeFile<'a>) -> bool {
        Self::is_present(file) && file.has_glyf()
    }

    fn serialise<C: WriteContext>(ctxt: &mut C, file: &OpenTypeFile<'a>) -> Result<(), WriteError> {
        let kern = file.kern.as_ref().ok_or(WriteError::MissingTable(tag::KERN))?;
        KernTable::write(ctxt, kern)
    }
}
