//! `VORG` table
//!
//! <https://learn.microsoft.com/en-us/typography/opentype/spec/vorg>

use std::convert::TryFrom;

use crate::binary::read::{ReadCtxt, ReadFrom, ReadScope};
use crate::binary::write::{WriteBinary, WriteContext};
use crate::binary::{I16Be, U16Be};
use crate::error::{ParseError, WriteError};
use crate::font::{FontTable, OpenTypeFile, Parsed};
use crate::tag;

/// Vertical origins of glyphs in CFF fonts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VorgTable {
    pub default_vert_origin_y: i16,
    pub metrics: Vec<VertOriginYMetrics>,
}

/// Vertical origin of a single glyph.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VertOriginYMetrics {
    pub glyph_index: u16,
    pub vert_origin_y: i16,
}

impl ReadFrom for VertOriginYMetrics {
    type ReadType = (U16Be, I16Be);

    fn read_from((glyph_index, vert_origin_y): (u16, i16)) -> Self {
        VertOriginYMetrics {
            glyph_index,
            vert_origin_y,
        }
    }
}

impl VorgTable {
    pub fn read_table(ctxt: &mut ReadCtxt<'_>) -> Result<Parsed<VorgTable>, ParseError> {
        let major_version = ctxt.read_u16be()?;
        let minor_version = ctxt.read_u16be()?;
        let default_vert_origin_y = ctxt.read_i16be()?;
        let num_vert_origin_y_metrics = ctxt.read_u16be()?;
        if major_version != 1 || minor_version != 0 {
            return Ok(Parsed::Dropped(format!(
                "unsupported version: {}.{}",
                major_version, minor_version
            )));
        }

        let metrics = ctxt
            .read_array::<VertOriginYMetrics>(usize::from(num_vert_origin_y_metrics))?
            .to_vec();
        let sorted = metrics
            .windows(2)
            .all(|pair| pair[0].glyph_index < pair[1].glyph_index);
        if !sorted {
            return Ok(Parsed::Dropped(String::from(
                "glyph indices are not sorted",
            )));
        }

        Ok(Parsed::Table(VorgTable {
            default_vert_origin_y,
            metrics,
        }))
    }
}

impl WriteBinary<&Self> for VorgTable {
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, vorg: &VorgTable) -> Result<(), WriteError> {
        U16Be::write(ctxt, 1u16)?; // major version
        U16Be::write(ctxt, 0u16)?; // minor version
        I16Be::write(ctxt, vorg.default_vert_origin_y)?;
        U16Be::write(ctxt, u16::try_from(vorg.metrics.len())?)?;
        for metric in &vorg.metrics {
            U16Be::write(ctxt, metric.glyph_index)?;
            I16Be::write(ctxt, metric.vert_origin_y)?;
        }

        Ok(())
    }
}

impl<'a> FontTable<'a> for VorgTable {
    const TAG: u32 = tag::VORG;

    fn parse(_file: &mut OpenTypeFile<'a>, scope: ReadScope<'a>) -> Result<Parsed<Self>, ParseError> {
        VorgTable::read_table(&mut scope.ctxt())
    }

    fn store(file: &mut OpenTypeFile<'a>, table: Option<Self>) {
        file.vorg = table;
    }

    fn is_present(file: &OpenTypeFile<'a>) -> bool {
        file.vorg.is_some()
    }

    fn should_serialise(file: &OpenTypeFile<'a>) -> bool {
        Self::is_present(file) && file.has_cff()
    }

    fn serialise<C: WriteContext>(ctxt: &mut C, file: &OpenTypeFile<'a>) -> Result<(), WriteError> {
        let vorg = file.vorg.as_ref().ok_or(WriteError::MissingTable(tag::VORG))?;
        VorgTable::write(ctxt, vorg)
    }
}
