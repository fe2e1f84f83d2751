//! Parsing and writing of the `loca` table.
//!
//! > The indexToLoc table stores the offsets to the locations of the glyphs in the font, relative
//! > to the beginning of the glyphData table.
//!
//! <https://docs.microsoft.com/en-us/typography/opentype/spec/loca>

use std::convert::TryFrom;

use crate::binary::read::{ReadBinaryDep, ReadCtxt, ReadScope};
use crate::binary::write::{WriteBinary, WriteBinaryDep, WriteContext};
use crate::binary::{U16Be, U32Be};
use crate::error::{fail, ParseError, WriteError};
use crate::font::{FontTable, OpenTypeFile, Parsed};
use crate::tables::IndexToLocFormat;
use crate::tag;

/// `loca` table
///
/// Offsets are stored expanded to bytes, whatever the format they were read in. The `glyf`
/// table replaces them with the offsets of the glyphs it writes.
///
/// <https://docs.microsoft.com/en-us/typography/opentype/spec/loca>
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocaTable {
    pub offsets: Vec<u32>,
}

impl ReadBinaryDep for LocaTable {
    type Args<'a> = (u16, IndexToLocFormat);
    type HostType<'a> = LocaTable;

    /// Read a `loca` table from `ctxt`
    ///
    /// * `num_glyphs` is the number of glyphs in the font. The value for `num_glyphs` is found in
    ///   the 'maxp' table.
    /// * `index_to_loc_format` specifies whether the offsets in the `loca` table are short or
    ///   long. This value can be read from the `head` table.
    ///
    /// The offsets must never decrease.
    fn read_dep<'a>(
        ctxt: &mut ReadCtxt<'a>,
        (num_glyphs, index_to_loc_format): (u16, IndexToLocFormat),
    ) -> Result<Self::HostType<'a>, ParseError> {
        // The value of n is numGlyphs + 1.
        let count = usize::from(num_glyphs) + 1;
        let offsets = match index_to_loc_format {
            IndexToLocFormat::Short => ctxt
                .read_array::<U16Be>(count)?
                .iter()
                // The actual local offset divided by 2 is stored.
                .map(|offset| u32::from(offset) * 2)
                .collect::<Vec<_>>(),
            IndexToLocFormat::Long => ctxt.read_array::<U32Be>(count)?.to_vec(),
        };

        let mut last_offset = 0;
        for (index, &offset) in offsets.iter().enumerate() {
            if offset < last_offset {
                fail!(
                    ParseError::BadOffset,
                    "loca: offset {} of glyph {} is less than the previous offset {}",
                    offset,
                    index,
                    last_offset
                );
            }
            last_offset = offset;
        }

        Ok(LocaTable { offsets })
    }
}

impl WriteBinaryDep<&Self> for LocaTable {
    type Output = ();
    type Args = IndexToLocFormat;

    fn write_dep<C: WriteContext>(
        ctxt: &mut C,
        loca: &LocaTable,
        index_to_loc_format: Self::Args,
    ) -> Result<(), WriteError> {
        // 0 for short offsets (Offset16), 1 for long (Offset32).
        match index_to_loc_format {
            IndexToLocFormat::Short => {
                // The actual loca offset divided by 2 is stored.
                // https://docs.microsoft.com/en-us/typography/opentype/spec/loca#short-version
                for &offset in &loca.offsets {
                    if offset & 1 == 1 {
                        // odd offsets can't use this format
                        return Err(WriteError::BadValue);
                    }
                    let short_offset = u16::try_from(offset / 2)?;
                    U16Be::write(ctxt, short_offset)?;
                }

                Ok(())
            }
            IndexToLocFormat::Long => {
                ctxt.write_iter::<U32Be, _>(loca.offsets.iter().copied())
            }
        }
    }
}

impl<'a> FontTable<'a> for LocaTable {
    const TAG: u32 = tag::LOCA;
    const REQUIRES: &'static [u32] = &[tag::HEAD, tag::MAXP];

    fn parse(file: &mut OpenTypeFile<'a>, scope: ReadScope<'a>) -> Result<Parsed<Self>, ParseError> {
        let (head, maxp) = match (&file.head, &file.maxp) {
            (Some(head), Some(maxp)) => (head, maxp),
            (None, _) => return Err(ParseError::MissingTable(tag::HEAD)),
            (_, None) => return Err(ParseError::MissingTable(tag::MAXP)),
        };
        scope
            .read_dep::<LocaTable>((maxp.num_glyphs, head.index_to_loc_format))
            .map(Parsed::Table)
    }

    fn store(file: &mut OpenTypeFile<'a>, table: Option<Self>) {
        file.loca = table;
    }

    fn is_present(file: &OpenTypeFile<'a>) -> bool {
        file.loca.is_some()
    }

    fn serialise<C: WriteContext>(ctxt: &mut C, file: &OpenTypeFile<'a>) -> Result<(), WriteError> {
        let loca = file.loca.as_ref().ok_or(WriteError::MissingTable(tag::LOCA))?;
        let head = file.head.as_ref().ok_or(WriteError::MissingTable(tag::HEAD))?;
        LocaTable::write_dep(ctxt, loca, head.index_to_loc_format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::write::WriteBuffer;
    use crate::tests::fonts::{file_with, head_data, maxp_data};
    use crate::tests::writer::{convert, TtfType::*};

    #[test]
    fn test_read_short_offsets() {
        let data = convert(&[UInt16(0), UInt16(5), UInt16(5), UInt16(9)]);
        let loca = ReadScope::new(&data)
            .read_dep::<LocaTable>((3, IndexToLocFormat::Short))
            .unwrap();
        assert_eq!(loca.offsets, vec![0, 10, 10, 18]);
    }

    #[test]
    fn test_decreasing_offsets_are_rejected() {
        let data = convert(&[UInt32(0), UInt32(20), UInt32(12)]);
        assert_eq!(
            ReadScope::new(&data).read_dep::<LocaTable>((2, IndexToLocFormat::Long)),
            Err(ParseError::BadOffset)
        );
        // Every position of a single decrease is caught
        for index in 1..6 {
            let offsets = (0..6u32)
                .map(|i| if i == index { UInt32(4 * i + 3) } else { UInt32(4 * i + 8) })
                .collect::<Vec<_>>();
            let data = convert(&offsets);
            assert!(ReadScope::new(&data)
                .read_dep::<LocaTable>((5, IndexToLocFormat::Long))
                .is_err());
        }
        // Equal offsets are allowed
        let data = convert(&[UInt32(0), UInt32(0), UInt32(0)]);
        assert!(ReadScope::new(&data)
            .read_dep::<LocaTable>((2, IndexToLocFormat::Long))
            .is_ok());
    }

    #[test]
    fn test_too_short() {
        let data = convert(&[UInt32(0), UInt32(20)]);
        assert_eq!(
            ReadScope::new(&data).read_dep::<LocaTable>((2, IndexToLocFormat::Long)),
            Err(ParseError::BadEof)
        );
    }

    #[test]
    fn test_write_short() {
        let loca = LocaTable {
            offsets: vec![0, 10, 0x1FFFE],
        };
        let mut ctxt = WriteBuffer::new();
        LocaTable::write_dep(&mut ctxt, &loca, IndexToLocFormat::Short).unwrap();
        assert_eq!(ctxt.bytes(), &[0, 0, 0, 5, 0xFF, 0xFF]);

        let odd = LocaTable { offsets: vec![0, 3] };
        assert_eq!(
            LocaTable::write_dep(&mut WriteBuffer::new(), &odd, IndexToLocFormat::Short),
            Err(WriteError::BadValue)
        );
        let large = LocaTable {
            offsets: vec![0, 0x20000],
        };
        assert!(
            LocaTable::write_dep(&mut WriteBuffer::new(), &large, IndexToLocFormat::Short).is_err()
        );
    }

    #[test]
    fn test_parse_uses_head_format() {
        let data = convert(&[UInt16(0), UInt16(2)]);
        let mut file = file_with(1, 0);
        file.parse::<LocaTable>(&data).unwrap();
        assert_eq!(file.loca.as_ref().unwrap().offsets, vec![0, 4]);

        let mut ctxt = WriteBuffer::new();
        LocaTable::serialise(&mut ctxt, &file).unwrap();
        assert_eq!(ctxt.bytes(), &data[..]);
    }

    #[test]
    fn test_parse_requires_head() {
        let maxp = maxp_data(1);
        let head = head_data(0, 0);
        let data = convert(&[UInt16(0), UInt16(2)]);
        let mut file = OpenTypeFile::new();
        file.parse::<crate::tables::MaxpTable>(&maxp).unwrap();
        assert_eq!(
            file.parse::<LocaTable>(&data),
            Err(ParseError::MissingTable(tag::HEAD))
        );
        file.parse::<crate::tables::HeadTable>(&head).unwrap();
        assert!(file.parse::<LocaTable>(&data).is_ok());
    }
}
