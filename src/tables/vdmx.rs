//! `VDMX` table
//!
//! <https://docs.microsoft.com/en-us/typography/opentype/spec/vdmx>

use std::convert::TryFrom;

use crate::binary::read::{ReadBinary, ReadCtxt, ReadFrom, ReadScope};
use crate::binary::write::{WriteBinary, WriteContext};
use crate::binary::{I16Be, U16Be, U8};
use crate::error::{ensure, ParseError, WriteError};
use crate::font::{FontTable, OpenTypeFile, Parsed};
use crate::tag;

/// Vertical device metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VdmxTable {
    pub version: u16,
    pub ratio_ranges: Vec<RatioRange>,
    /// Offset of the group of each ratio range, from the start of the table.
    pub offsets: Vec<u16>,
    pub groups: Vec<VdmxGroup>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RatioRange {
    pub charset: u8,
    pub x_ratio: u8,
    pub y_start_ratio: u8,
    pub y_end_ratio: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VdmxGroup {
    pub start_size: u8,
    pub end_size: u8,
    pub entries: Vec<VTableRecord>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VTableRecord {
    pub y_pel_height: u16,
    pub y_max: i16,
    pub y_min: i16,
}

impl ReadBinary for RatioRange {
    type HostType<'a> = Self;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self, ParseError> {
        let charset = ctxt.read_u8()?;
        let x_ratio = ctxt.read_u8()?;
        let y_start_ratio = ctxt.read_u8()?;
        let y_end_ratio = ctxt.read_u8()?;

        Ok(RatioRange {
            charset,
            x_ratio,
            y_start_ratio,
            y_end_ratio,
        })
    }
}

impl ReadFrom for VTableRecord {
    type ReadType = (U16Be, I16Be, I16Be);

    fn read_from((y_pel_height, y_max, y_min): (u16, i16, i16)) -> Self {
        VTableRecord {
            y_pel_height,
            y_max,
            y_min,
        }
    }
}

impl RatioRange {
    /// All zero ratios mark the default group.
    fn is_default(&self) -> bool {
        self.x_ratio == 0 && self.y_start_ratio == 0 && self.y_end_ratio == 0
    }
}

impl VdmxTable {
    pub fn read_table(ctxt: &mut ReadCtxt<'_>) -> Result<Parsed<VdmxTable>, ParseError> {
        let table_len = ctxt.remaining();
        let version = ctxt.read_u16be()?;
        let num_recs = ctxt.read_u16be()?;
        let num_ratios = ctxt.read_u16be()?;
        if version > 1 {
            return Ok(Parsed::Dropped(format!("bad version: {}", version)));
        }

        let mut ratio_ranges = Vec::with_capacity(usize::from(num_ratios));
        for i in 0..num_ratios {
            let ratio_range = ctxt.read::<RatioRange>()?;
            if ratio_range.charset > 1 {
                return Ok(Parsed::Dropped(format!(
                    "bad charset: {}",
                    ratio_range.charset
                )));
            }
            if ratio_range.y_start_ratio > ratio_range.y_end_ratio {
                return Ok(Parsed::Dropped(String::from("bad y ratio")));
            }
            // The default ratio range must be the last
            if i + 1 < num_ratios && ratio_range.is_default() {
                return Ok(Parsed::Dropped(String::from(
                    "superfluous terminator found",
                )));
            }
            ratio_ranges.push(ratio_range);
        }

        let offsets = ctxt.read_array::<U16Be>(usize::from(num_ratios))?.to_vec();
        for &offset in &offsets {
            ensure!(
                usize::from(offset) < table_len,
                ParseError::BadOffset,
                "VDMX: bad ratio range offset {}",
                offset
            );
        }

        let mut groups = Vec::with_capacity(usize::from(num_recs));
        for _ in 0..num_recs {
            let recs = ctxt.read_u16be()?;
            let start_size = ctxt.read_u8()?;
            let end_size = ctxt.read_u8()?;
            let records = ctxt.read_array::<VTableRecord>(usize::from(recs))?;
            let mut entries: Vec<VTableRecord> = Vec::with_capacity(usize::from(recs));
            for entry in records.iter() {
                if entry.y_max < entry.y_min {
                    return Ok(Parsed::Dropped(String::from("bad y min/max")));
                }
                if let Some(last) = entries.last() {
                    if last.y_pel_height >= entry.y_pel_height {
                        return Ok(Parsed::Dropped(String::from("the table is not sorted")));
                    }
                }
                entries.push(entry);
            }
            groups.push(VdmxGroup {
                start_size,
                end_size,
                entries,
            });
        }

        Ok(Parsed::Table(VdmxTable {
            version,
            ratio_ranges,
            offsets,
            groups,
        }))
    }
}

impl WriteBinary<&Self> for VdmxTable {
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, vdmx: &VdmxTable) -> Result<(), WriteError> {
        U16Be::write(ctxt, vdmx.version)?;
        U16Be::write(ctxt, u16::try_from(vdmx.groups.len())?)?;
        U16Be::write(ctxt, u16::try_from(vdmx.ratio_ranges.len())?)?;
        for ratio_range in &vdmx.ratio_ranges {
            U8::write(ctxt, ratio_range.charset)?;
            U8::write(ctxt, ratio_range.x_ratio)?;
            U8::write(ctxt, ratio_range.y_start_ratio)?;
            U8::write(ctxt, ratio_range.y_end_ratio)?;
        }
        ctxt.write_iter::<U16Be, _>(vdmx.offsets.iter().copied())?;
        for group in &vdmx.groups {
            U16Be::write(ctxt, u16::try_from(group.entries.len())?)?;
            U8::write(ctxt, group.start_size)?;
            U8::write(ctxt, group.end_size)?;
            for entry in &group.entries {
                U16Be::write(ctxt, entry.y_pel_height)?;
                I16Be::write(ctxt, entry.y_max)?;
                I16Be::write(ctxt, entry.y_min)?;
            }
        }

        Ok(())
    }
}

impl<'a> FontTable<'a> for VdmxTable {
    const TAG: u32 = tag::VDMX;

    fn parse(_file: &mut OpenTypeFile<'a>, scope: ReadScope<'a>) -> Result<Parsed<Self>, ParseError> {
        VdmxTable::read_table(&mut scope.ctxt())
    }

    fn store(file: &mut OpenTypeFile<'a>, table: Option<Self>) {
        file.vdmx = table;
    }

    fn is_present(file: &OpenTypeFile<'a>) -> bool {
        file.vdmx.is_some()
    }

    fn should_serialise(file: &OpenTypeFile<'a>) -> bool {
        Self::is_present(file) && file.has_glyf()
    }

    fn serialise<C: WriteContext>(ctxt: &mut C, file: &OpenTypeFile<'a>) -> Result<(), WriteError> {
        let vdmx = file.vdmx.as_ref().ok_or(WriteError::MissingTable(tag::VDMX))?;
        VdmxTable::write(ctxt, vdmx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::write::WriteBuffer;
    use crate::tests::writer::{TtfType::*, Writer};

    /// A table with the given ratio ranges, each pointing at one shared group.
    fn vdmx_data(ratios: &[[u8; 4]], entries: &[(u16, i16, i16)]) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_all(&[UInt16(1), UInt16(1), UInt16(ratios.len() as u16)]);
        for ratio in ratios {
            w.write_all(&[UInt8(ratio[0]), UInt8(ratio[1]), UInt8(ratio[2]), UInt8(ratio[3])]);
        }
        let group_offset = 6 + ratios.len() * 6;
        for _ in ratios {
            w.write(UInt16(group_offset as u16));
        }
        w.write_all(&[UInt16(entries.len() as u16), UInt8(8), UInt8(20)]);
        for &(height, y_max, y_min) in entries {
            w.write_all(&[UInt16(height), Int16(y_max), Int16(y_min)]);
        }
        w.data
    }

    fn read(data: &[u8]) -> Parsed<VdmxTable> {
        VdmxTable::read_table(&mut ReadScope::new(data).ctxt()).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let data = vdmx_data(
            &[[1, 1, 1, 1], [1, 0, 0, 0]],
            &[(8, 7, -2), (9, 8, -2), (10, 9, -3)],
        );
        let vdmx = match read(&data) {
            Parsed::Table(vdmx) => vdmx,
            Parsed::Dropped(reason) => panic!("dropped: {}", reason),
        };
        assert_eq!(vdmx.groups[0].entries.len(), 3);

        let mut ctxt = WriteBuffer::new();
        VdmxTable::write(&mut ctxt, &vdmx).unwrap();
        assert_eq!(ctxt.bytes(), &data[..]);
    }

    #[test]
    fn test_dropped() {
        let entries = [(8, 7, -2), (9, 8, -2)];
        // Charset
        assert!(matches!(
            read(&vdmx_data(&[[2, 1, 1, 1]], &entries)),
            Parsed::Dropped(_)
        ));
        // y ratios
        assert!(matches!(
            read(&vdmx_data(&[[1, 1, 2, 1]], &entries)),
            Parsed::Dropped(_)
        ));
        // Default ratio range that is not last
        assert!(matches!(
            read(&vdmx_data(&[[1, 0, 0, 0], [1, 0, 0, 0]], &entries)),
            Parsed::Dropped(_)
        ));
        // Unsorted entries
        assert!(matches!(
            read(&vdmx_data(&[[1, 1, 1, 1]], &[(9, 7, -2), (8, 8, -2)])),
            Parsed::Dropped(_)
        ));
        // y_max < y_min
        assert!(matches!(
            read(&vdmx_data(&[[1, 1, 1, 1]], &[(8, -3, -2)])),
            Parsed::Dropped(_)
        ));
        // Version
        let mut data = vdmx_data(&[[1, 1, 1, 1]], &entries);
        data[1] = 2;
        assert!(matches!(read(&data), Parsed::Dropped(_)));
    }

    #[test]
    fn test_bad_offset() {
        let mut data = vdmx_data(&[[1, 1, 1, 1]], &[(8, 7, -2)]);
        data[10..12].copy_from_slice(&100u16.to_be_bytes());
        assert_eq!(
            VdmxTable::read_table(&mut ReadScope::new(&data).ctxt()).err(),
            Some(ParseError::BadOffset)
        );
    }
}
