//! OpenType font table parsing, validation and writing.

pub mod cmap;
pub mod cvt;
pub mod fpgm;
pub mod gasp;
pub mod glyf;
pub mod hdmx;
pub mod kern;
pub mod loca;
pub mod os2;
pub mod vdmx;
pub mod vorg;

use log::warn;

use crate::binary::read::{ReadBinary, ReadCtxt, ReadFrom, ReadScope};
use crate::binary::write::{WriteBinary, WriteContext};
use crate::binary::{I16Be, I32Be, I64Be, U16Be, U32Be};
use crate::error::{ensure, fail, ParseError, WriteError};
use crate::font::{FontTable, OpenTypeFile, Parsed};
use crate::tag;

/// Value of `magicNumber` in the `head` table.
pub const HEAD_MAGIC: u32 = 0x5F0F3CF5;

/// Bits of `head.flags` that are kept, the rest are cleared.
const HEAD_FLAGS_MASK: u16 = 0x381f;

/// Bits of `head.macStyle` that are kept, the rest are cleared.
const MAC_STYLE_MASK: u16 = 0x7f;

/// Upper bound, exclusive, on the length of the `cvt `, `fpgm` and `prep` tables.
pub const MAX_INSTRUCTION_TABLE_LEN: usize = 128 * 1024;

/// The `searchRange`, `entrySelector` and `rangeShift` of a binary search header.
///
/// `searchRange` is `unit_size` times the largest power of two not greater than `count` and
/// `entrySelector` is the exponent of that power.
pub(crate) fn search_params(count: u32, unit_size: usize) -> (u32, u32, u32) {
    let unit_size = unit_size as u32;
    let mut log2 = 0u32;
    while 1u32 << (log2 + 1) <= count {
        log2 += 1;
    }
    let search_range = unit_size * (1u32 << log2);
    let range_shift = (unit_size * count).wrapping_sub(search_range);
    (search_range, log2, range_shift)
}

/// 32-bit signed fixed-point number (16.16)
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Fixed(i32);

/// Date represented in number of seconds since 12:00 midnight, January 1, 1904
///
/// The value is represented as a signed 64-bit integer.
type LongDateTime = i64;

/// The size of the offsets in the `loca` table
///
/// <https://docs.microsoft.com/en-us/typography/opentype/spec/loca>
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexToLocFormat {
    /// Offsets are 16-bit. The actual local offset divided by 2 is stored.
    Short,
    /// Offsets are 32-bit. The actual local offset is stored.
    Long,
}

/// `head` table
///
/// Only the fields that survive sanitisation are kept. The version, checksum adjustment,
/// font direction hint and glyph data format are written as fixed values.
///
/// <https://docs.microsoft.com/en-us/typography/opentype/spec/head>
#[derive(Debug, Clone, PartialEq, PartialOrd, Hash)]
pub struct HeadTable {
    pub font_revision: Fixed,
    pub flags: u16,
    pub units_per_em: u16,
    pub created: LongDateTime,
    pub modified: LongDateTime,
    pub x_min: i16,
    pub y_min: i16,
    pub x_max: i16,
    pub y_max: i16,
    pub mac_style: u16,
    pub lowest_rec_ppem: u16,
    pub index_to_loc_format: IndexToLocFormat,
}

/// maxp - Maximum profile
///
/// This table establishes the memory requirements for this font. Fonts with CFF data must use
/// Version 0.5 of this table, specifying only the numGlyphs field. Fonts with TrueType outlines
/// must use Version 1.0 of this table, where all data is required.
///
/// <https://docs.microsoft.com/en-us/typography/opentype/spec/maxp>
#[derive(Debug, Clone, PartialEq, PartialOrd, Hash)]
pub struct MaxpTable {
    pub num_glyphs: u16,
    /// Extra fields, present if maxp table is version 1.0, absent if version 0.5.
    pub version1_sub_table: Option<MaxpVersion1SubTable>,
}

#[derive(Debug, Clone, PartialEq, PartialOrd, Hash)]
pub struct MaxpVersion1SubTable {
    /// Maximum points in a non-composite glyph.
    pub max_points: u16,
    /// Maximum contours in a non-composite glyph.
    pub max_contours: u16,
    /// Maximum points in a composite glyph.
    pub max_composite_points: u16,
    /// Maximum contours in a composite glyph.
    pub max_composite_contours: u16,
    /// 1 if instructions do not use the twilight zone (Z0), or 2 if instructions do use Z0.
    pub max_zones: u16,
    /// Maximum points used in Z0.
    pub max_twilight_points: u16,
    /// Number of Storage Area locations.
    pub max_storage: u16,
    /// Number of FDEFs, equal to the highest function number + 1.
    pub max_function_defs: u16,
    /// Number of IDEFs.
    pub max_instruction_defs: u16,
    /// Maximum stack depth across Font Program ('fpgm' table), CVT Program ('prep' table) and all
    /// glyph instructions (in the 'glyf' table).
    pub max_stack_elements: u16,
    /// Maximum byte count for glyph instructions.
    pub max_size_of_instructions: u16,
    /// Maximum number of components referenced at “top level” for any composite glyph.
    pub max_component_elements: u16,
    /// Maximum levels of recursion; 1 for simple components.
    pub max_component_depth: u16,
}

impl ReadBinary for HeadTable {
    type HostType<'a> = Self;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self, ParseError> {
        let version = ctxt.read_u32be()?;
        ensure!(
            version >> 16 == 1,
            ParseError::BadVersion,
            "head: bad version {:#010x}",
            version
        );
        let font_revision = ctxt.read::<Fixed>()?;
        let _check_sum_adjustment = ctxt.read_u32be()?;
        let magic_number = ctxt.read_u32be()?;
        ensure!(
            magic_number == HEAD_MAGIC,
            ParseError::BadValue,
            "head: bad magic number {:#010x}",
            magic_number
        );
        let flags = ctxt.read_u16be()? & HEAD_FLAGS_MASK;
        let units_per_em = ctxt.read_u16be()?;
        ensure!(
            (16..=16384).contains(&units_per_em),
            ParseError::BadValue,
            "head: bad unitsPerEm {}",
            units_per_em
        );
        let created = ctxt.read_i64be()?;
        let modified = ctxt.read_i64be()?;
        let x_min = ctxt.read_i16be()?;
        let y_min = ctxt.read_i16be()?;
        let x_max = ctxt.read_i16be()?;
        let y_max = ctxt.read_i16be()?;
        ensure!(
            x_min <= x_max && y_min <= y_max,
            ParseError::BadValue,
            "head: bad bounding box ({}, {}, {}, {})",
            x_min,
            y_min,
            x_max,
            y_max
        );
        let mac_style = ctxt.read_u16be()? & MAC_STYLE_MASK;
        let lowest_rec_ppem = ctxt.read_u16be()?;
        let _font_direction_hint = ctxt.read_i16be()?;
        let index_to_loc_format = ctxt.read::<IndexToLocFormat>()?;
        let glyph_data_format = ctxt.read_i16be()?;
        ensure!(
            glyph_data_format == 0,
            ParseError::BadValue,
            "head: bad glyphDataFormat {}",
            glyph_data_format
        );

        Ok(HeadTable {
            font_revision,
            flags,
            units_per_em,
            created,
            modified,
            x_min,
            y_min,
            x_max,
            y_max,
            mac_style,
            lowest_rec_ppem,
            index_to_loc_format,
        })
    }
}

impl WriteBinary<&Self> for HeadTable {
    type Output = ();

    /// Writes the table with a zero `check_sum_adjustment`.
    ///
    /// The adjustment covers the whole font file so it is computed, if at all, by whatever
    /// assembles the final file.
    fn write<C: WriteContext>(ctxt: &mut C, table: &HeadTable) -> Result<(), WriteError> {
        U32Be::write(ctxt, 0x00010000u32)?;
        Fixed::write(ctxt, table.font_revision)?;
        U32Be::write(ctxt, 0u32)?;
        U32Be::write(ctxt, HEAD_MAGIC)?;
        U16Be::write(ctxt, table.flags)?;
        U16Be::write(ctxt, table.units_per_em)?;
        I64Be::write(ctxt, table.created)?;
        I64Be::write(ctxt, table.modified)?;
        I16Be::write(ctxt, table.x_min)?;
        I16Be::write(ctxt, table.y_min)?;
        I16Be::write(ctxt, table.x_max)?;
        I16Be::write(ctxt, table.y_max)?;
        U16Be::write(ctxt, table.mac_style)?;
        U16Be::write(ctxt, table.lowest_rec_ppem)?;
        I16Be::write(ctxt, 2i16)?; // font direction hint
        IndexToLocFormat::write(ctxt, table.index_to_loc_format)?;
        I16Be::write(ctxt, 0i16)?; // glyph data format

        Ok(())
    }
}

impl<'a> FontTable<'a> for HeadTable {
    const TAG: u32 = tag::HEAD;

    fn parse(
        _file: &mut OpenTypeFile<'a>,
        scope: ReadScope<'a>,
    ) -> Result<Parsed<Self>, ParseError> {
        scope.read::<HeadTable>().map(Parsed::Table)
    }

    fn store(file: &mut OpenTypeFile<'a>, table: Option<Self>) {
        file.head = table;
    }

    fn is_present(file: &OpenTypeFile<'a>) -> bool {
        file.head.is_some()
    }

    fn serialise<C: WriteContext>(ctxt: &mut C, file: &OpenTypeFile<'a>) -> Result<(), WriteError> {
        let head = file.head.as_ref().ok_or(WriteError::MissingTable(tag::HEAD))?;
        HeadTable::write(ctxt, head)
    }
}

impl ReadBinary for MaxpTable {
    type HostType<'a> = Self;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self, ParseError> {
        let version = ctxt.read_u32be()?;
        ensure!(
            version >> 16 <= 1,
            ParseError::BadVersion,
            "maxp: bad version {:#010x}",
            version
        );
        let num_glyphs = ctxt.read_u16be()?;
        ensure!(num_glyphs != 0, ParseError::BadValue, "maxp: numGlyphs is 0");
        let sub_table = if version >> 16 == 1 {
            Some(ctxt.read::<MaxpVersion1SubTable>()?)
        } else {
            None
        };
        Ok(MaxpTable {
            num_glyphs,
            version1_sub_table: sub_table,
        })
    }
}

impl WriteBinary<&Self> for MaxpTable {
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, table: &MaxpTable) -> Result<(), WriteError> {
        if let Some(sub_table) = &table.version1_sub_table {
            U32Be::write(ctxt, 0x00010000u32)?; // version 1.0
            U16Be::write(ctxt, table.num_glyphs)?;
            MaxpVersion1SubTable::write(ctxt, sub_table)?;
        } else {
            U32Be::write(ctxt, 0x00005000u32)?; // version 0.5
            U16Be::write(ctxt, table.num_glyphs)?;
        }
        Ok(())
    }
}

impl<'a> FontTable<'a> for MaxpTable {
    const TAG: u32 = tag::MAXP;

    fn parse(
        _file: &mut OpenTypeFile<'a>,
        scope: ReadScope<'a>,
    ) -> Result<Parsed<Self>, ParseError> {
        scope.read::<MaxpTable>().map(Parsed::Table)
    }

    fn store(file: &mut OpenTypeFile<'a>, table: Option<Self>) {
        file.maxp = table;
    }

    fn is_present(file: &OpenTypeFile<'a>) -> bool {
        file.maxp.is_some()
    }

    fn serialise<C: WriteContext>(ctxt: &mut C, file: &OpenTypeFile<'a>) -> Result<(), WriteError> {
        let maxp = file.maxp.as_ref().ok_or(WriteError::MissingTable(tag::MAXP))?;
        MaxpTable::write(ctxt, maxp)
    }
}

impl MaxpTable {
    /// The instruction length limit for simple glyphs, if the table records one.
    pub fn max_size_of_instructions(&self) -> Option<u16> {
        self.version1_sub_table
            .as_ref()
            .map(|sub_table| sub_table.max_size_of_instructions)
    }
}

impl ReadBinary for MaxpVersion1SubTable {
    type HostType<'a> = Self;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self, ParseError> {
        let max_points = ctxt.read_u16be()?;
        let max_contours = ctxt.read_u16be()?;
        let max_composite_points = ctxt.read_u16be()?;
        let max_composite_contours = ctxt.read_u16be()?;
        let max_zones = match ctxt.read_u16be()? {
            0 => {
                warn!("maxp: maxZones is 0, changed to 1");
                1
            }
            3 => {
                warn!("maxp: maxZones is 3, changed to 2");
                2
            }
            zones @ (1 | 2) => zones,
            zones => fail!(ParseError::BadValue, "maxp: bad maxZones {}", zones),
        };
        let max_twilight_points = ctxt.read_u16be()?;
        let max_storage = ctxt.read_u16be()?;
        let max_function_defs = ctxt.read_u16be()?;
        let max_instruction_defs = ctxt.read_u16be()?;
        let max_stack_elements = ctxt.read_u16be()?;
        let max_size_of_instructions = ctxt.read_u16be()?;
        let max_component_elements = ctxt.read_u16be()?;
        let max_component_depth = ctxt.read_u16be()?;

        Ok(MaxpVersion1SubTable {
            max_points,
            max_contours,
            max_composite_points,
            max_composite_contours,
            max_zones,
            max_twilight_points,
            max_storage,
            max_function_defs,
            max_instruction_defs,
            max_stack_elements,
            max_size_of_instructions,
            max_component_elements,
            max_component_depth,
        })
    }
}

impl WriteBinary<&Self> for MaxpVersion1SubTable {
    type Output = ();

    fn write<C: WriteContext>(
        ctxt: &mut C,
        table: &MaxpVersion1SubTable,
    ) -> Result<(), WriteError> {
        U16Be::write(ctxt, table.max_points)?;
        U16Be::write(ctxt, table.max_contours)?;
        U16Be::write(ctxt, table.max_composite_points)?;
        U16Be::write(ctxt, table.max_composite_contours)?;
        U16Be::write(ctxt, table.max_zones)?;
        U16Be::write(ctxt, table.max_twilight_points)?;
        U16Be::write(ctxt, table.max_storage)?;
        U16Be::write(ctxt, table.max_function_defs)?;
        U16Be::write(ctxt, table.max_instruction_defs)?;
        U16Be::write(ctxt, table.max_stack_elements)?;
        U16Be::write(ctxt, table.max_size_of_instructions)?;
        U16Be::write(ctxt, table.max_component_elements)?;
        U16Be::write(ctxt, table.max_component_depth)?;

        Ok(())
    }
}

impl ReadBinary for IndexToLocFormat {
    type HostType<'a> = Self;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self, ParseError> {
        let index_to_loc_format = ctxt.read_i16be()?;

        match index_to_loc_format {
            0 => Ok(IndexToLocFormat::Short),
            1 => Ok(IndexToLocFormat::Long),
            _ => fail!(
                ParseError::BadValue,
                "head: bad indexToLocFormat {}",
                index_to_loc_format
            ),
        }
    }
}

impl WriteBinary for IndexToLocFormat {
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, index_to_loc_format: Self) -> Result<(), WriteError> {
        match index_to_loc_format {
            IndexToLocFormat::Short => I16Be::write(ctxt, 0i16),
            IndexToLocFormat::Long => I16Be::write(ctxt, 1i16),
        }
    }
}

impl ReadFrom for Fixed {
    type ReadType = I32Be;

    fn read_from(value: i32) -> Self {
        Fixed(value)
    }
}

impl WriteBinary for Fixed {
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, val: Self) -> Result<(), WriteError> {
        I32Be::write(ctxt, val.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{search_params, HeadTable, IndexToLocFormat, MaxpTable};
    use crate::binary::read::ReadScope;
    use crate::binary::write::{WriteBinary, WriteBuffer};
    use crate::error::ParseError;
    use crate::tests::fonts::{head_data, maxp_data, maxp_v1_data};

    #[test]
    fn test_write_head_table() {
        let mut head_data = head_data(0xFFFF, 1);
        head_data[44] = 0xFF; // mac style
        head_data[45] = 0xFF;
        let head = ReadScope::new(&head_data).read::<HeadTable>().unwrap();
        assert_eq!(head.flags, 0x381f);
        assert_eq!(head.mac_style, 0x7f);
        assert_eq!(head.index_to_loc_format, IndexToLocFormat::Long);

        let mut ctxt = WriteBuffer::new();
        HeadTable::write(&mut ctxt, &head).unwrap();
        let written = ctxt.into_inner();
        assert_eq!(written.len(), head_data.len());
        // Checksum adjustment is zeroed
        assert_eq!(&written[8..12], &[0, 0, 0, 0]);
        assert_eq!(ReadScope::new(&written).read::<HeadTable>(), Ok(head));
    }

    #[test]
    fn test_head_rejections() {
        let mut bad_magic = head_data(0, 0);
        bad_magic[12] = 0;
        assert_eq!(
            ReadScope::new(&bad_magic).read::<HeadTable>(),
            Err(ParseError::BadValue)
        );

        let mut small_em = head_data(0, 0);
        small_em[18..20].copy_from_slice(&15u16.to_be_bytes());
        assert!(ReadScope::new(&small_em).read::<HeadTable>().is_err());

        let bad_loca_format = head_data(0, 2);
        assert!(ReadScope::new(&bad_loca_format).read::<HeadTable>().is_err());

        let mut bad_bbox = head_data(0, 0);
        bad_bbox[36..38].copy_from_slice(&1000i16.to_be_bytes()); // x_min > x_max
        assert!(ReadScope::new(&bad_bbox).read::<HeadTable>().is_err());

        assert_eq!(
            ReadScope::new(&head_data(0, 0)[..50]).read::<HeadTable>(),
            Err(ParseError::BadEof)
        );
    }

    #[test]
    fn test_maxp_max_zones() {
        let mut data = maxp_v1_data(4, 0);
        data[14..16].copy_from_slice(&3u16.to_be_bytes());
        let maxp = ReadScope::new(&data).read::<MaxpTable>().unwrap();
        assert_eq!(maxp.version1_sub_table.unwrap().max_zones, 2);

        data[14..16].copy_from_slice(&0u16.to_be_bytes());
        let maxp = ReadScope::new(&data).read::<MaxpTable>().unwrap();
        assert_eq!(maxp.version1_sub_table.unwrap().max_zones, 1);

        data[14..16].copy_from_slice(&4u16.to_be_bytes());
        assert!(ReadScope::new(&data).read::<MaxpTable>().is_err());
    }

    #[test]
    fn test_maxp_round_trip() {
        for data in [maxp_data(7), maxp_v1_data(7, 300)] {
            let maxp = ReadScope::new(&data).read::<MaxpTable>().unwrap();
            let mut ctxt = WriteBuffer::new();
            MaxpTable::write(&mut ctxt, &maxp).unwrap();
            assert_eq!(ctxt.bytes(), &data[..]);
        }
        assert_eq!(
            ReadScope::new(&maxp_v1_data(7, 300))
                .read::<MaxpTable>()
                .unwrap()
                .max_size_of_instructions(),
            Some(300)
        );
    }

    #[test]
    fn test_maxp_rejections() {
        assert!(ReadScope::new(&maxp_data(0)).read::<MaxpTable>().is_err());
        let mut data = maxp_data(1);
        data[1] = 2; // version 2.0
        assert_eq!(
            ReadScope::new(&data).read::<MaxpTable>(),
            Err(ParseError::BadVersion)
        );
    }

    #[test]
    fn test_search_params() {
        assert_eq!(search_params(1, 2), (2, 0, 0));
        assert_eq!(search_params(39, 2), (64, 5, 14));
        assert_eq!(search_params(8, 6), (48, 3, 0));
        assert_eq!(search_params(10, 6), (48, 3, 12));
        // No entries
        assert_eq!(search_params(0, 6).0, 6);
    }
}
