//! `gasp` table
//!
//! <https://learn.microsoft.com/en-us/typography/opentype/spec/gasp>

use std::convert::TryFrom;

use bitflags::bitflags;
use log::warn;

use crate::binary::read::{ReadCtxt, ReadFrom, ReadScope};
use crate::binary::write::{WriteBinary, WriteContext};
use crate::binary::U16Be;
use crate::error::{ParseError, WriteError};
use crate::font::{FontTable, OpenTypeFile, Parsed};
use crate::tag;

bitflags! {
    /// Rasterizer behaviour for a range of sizes.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct GaspBehavior: u16 {
        const GRIDFIT = 0x0001;
        const DOGRAY = 0x0002;
        /// Version 1 only.
        const SYMMETRIC_GRIDFIT = 0x0004;
        /// Version 1 only.
        const SYMMETRIC_SMOOTHING = 0x0008;
    }
}

/// Grid-fitting and scan-conversion procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaspTable {
    pub version: u16,
    pub ranges: Vec<GaspRange>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GaspRange {
    pub max_ppem: u16,
    pub behavior: u16,
}

impl ReadFrom for GaspRange {
    type ReadType = (U16Be, U16Be);

    fn read_from((max_ppem, behavior): (u16, u16)) -> Self {
        GaspRange { max_ppem, behavior }
    }
}

impl GaspTable {
    pub fn read_table(ctxt: &mut ReadCtxt<'_>) -> Result<Parsed<GaspTable>, ParseError> {
        let mut version = ctxt.read_u16be()?;
        let num_ranges = ctxt.read_u16be()?;
        if version > 1 {
            return Ok(Parsed::Dropped(format!("unsupported version: {}", version)));
        }
        if num_ranges == 0 {
            return Ok(Parsed::Dropped(String::from("num_ranges is zero")));
        }

        let mut ranges = ctxt
            .read_array::<GaspRange>(usize::from(num_ranges))?
            .to_vec();
        let sorted = ranges.windows(2).all(|pair| pair[0].max_ppem < pair[1].max_ppem);
        if !sorted {
            return Ok(Parsed::Dropped(String::from("ranges are not sorted")));
        }
        if ranges.last().map(|range| range.max_ppem) != Some(0xFFFF) {
            return Ok(Parsed::Dropped(String::from(
                "the last range does not end at 0xFFFF",
            )));
        }

        for range in ranges.iter_mut() {
            let behavior = GaspBehavior::from_bits_retain(range.behavior);
            let defined = behavior & GaspBehavior::all();
            if defined != behavior {
                warn!(
                    "gasp: undefined bits are set in behavior {:#06x}, clearing them",
                    range.behavior
                );
            }
            if version == 0
                && defined.intersects(
                    GaspBehavior::SYMMETRIC_GRIDFIT | GaspBehavior::SYMMETRIC_SMOOTHING,
                )
            {
                warn!("gasp: version 1 behavior found in a version 0 table, changing it to 1");
                version = 1;
            }
            range.behavior = defined.bits();
        }

        Ok(Parsed::Table(GaspTable { version, ranges }))
    }
}

impl WriteBinary<&Self> for GaspTable {
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, gasp: &GaspTable) -> Result<(), WriteError> {
        U16Be::write(ctxt, gasp.version)?;
        U16Be::write(ctxt, u16::try_from(gasp.ranges.len())?)?;
        for range in &gasp.ranges {
            U16Be::write(ctxt, range.max_ppem)?;
            U16Be::write(ctxt, range.behavior)?;
        }

        Ok(())
    }
}

impl<'a> FontTable<'a> for GaspTable {
    const TAG: u32 = tag::GASP;

    fn parse(_file: &mut OpenTypeFile<'a>, scope: ReadScope<'a>) -> Result<Parsed<Self>, ParseError> {
        GaspTable::read_table(&mut scope.ctxt())
    }

    fn store(file: &mut OpenTypeFile<'a>, table: Option<Self>) {
        file.gasp = table;
    }

    fn is_present(file: &OpenTypeFile<'a>) -> bool {
        file.gasp.is_some()
    }

    fn serialise<C: WriteContext>(ctxt: &mut C, file: &OpenTypeFile<'a>) -> Result<(), WriteError> {
        let gasp = file.gasp.as_ref().ok_or(WriteError::MissingTable(tag::GASP))?;
        GaspTable::write(ctxt, gasp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::write::WriteBuffer;
    use crate::tests::writer::{convert, TtfType::*};

    fn gasp_data(version: u16, ranges: &[(u16, u16)]) -> Vec<u8> {
        let mut data = convert(&[UInt16(version), UInt16(ranges.len() as u16)]);
        for &(max_ppem, behavior) in ranges {
            data.extend(convert(&[UInt16(max_ppem), UInt16(behavior)]));
        }
        data
    }

    fn read_table(data: &[u8]) -> GaspTable {
        match GaspTable::read_table(&mut ReadScope::new(data).ctxt()).unwrap() {
            Parsed::Table(gasp) => gasp,
            Parsed::Dropped(reason) => panic!("dropped: {}", reason),
        }
    }

    fn is_dropped(data: &[u8]) -> bool {
        matches!(
            GaspTable::read_table(&mut ReadScope::new(data).ctxt()),
            Ok(Parsed::Dropped(_))
        )
    }

    #[test]
    fn test_round_trip() {
        let data = gasp_data(1, &[(8, 0x2), (16, 0x1), (0xFFFF, 0xF)]);
        let gasp = read_table(&data);
        assert_eq!(gasp.ranges.len(), 3);

        let mut ctxt = WriteBuffer::new();
        GaspTable::write(&mut ctxt, &gasp).unwrap();
        assert_eq!(ctxt.bytes(), &data[..]);
    }

    #[test]
    fn test_behavior_is_masked() {
        let gasp = read_table(&gasp_data(1, &[(0xFFFF, 0xFF03)]));
        assert_eq!(gasp.ranges[0].behavior, 0x3);
    }

    #[test]
    fn test_version_is_upgraded() {
        let gasp = read_table(&gasp_data(0, &[(8, 0x3), (0xFFFF, 0xA)]));
        assert_eq!(gasp.version, 1);
        assert_eq!(gasp.ranges[1].behavior, 0xA);

        let gasp = read_table(&gasp_data(0, &[(0xFFFF, 0x3)]));
        assert_eq!(gasp.version, 0);
    }

    #[test]
    fn test_dropped() {
        assert!(is_dropped(&gasp_data(2, &[(0xFFFF, 0x3)])));
        assert!(is_dropped(&gasp_data(1, &[])));
        assert!(is_dropped(&gasp_data(1, &[(16, 0x3), (8, 0x3), (0xFFFF, 0x3)])));
        assert!(is_dropped(&gasp_data(1, &[(8, 0x3), (8, 0x3), (0xFFFF, 0x3)])));
        // No sentinel
        assert!(is_dropped(&gasp_data(1, &[(8, 0x3), (0xFFFE, 0x3)])));
    }
}
