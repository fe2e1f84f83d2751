//! Parsing and writing of the `glyf` table.
//!
//! > This table contains information that describes the glyphs in the font in the TrueType outline
//! > format. Information regarding the rasterizer (scaler) refers to the TrueType rasterizer.
//!
//! <https://docs.microsoft.com/en-us/typography/opentype/spec/glyf>
//!
//! Simple glyphs are validated by walking their flags to find the exact extent of the point
//! data. Composite glyphs are carried as opaque bytes after their header is checked. Glyphs
//! are written back 4-byte aligned and `loca` is rebuilt to match.

use std::convert::TryFrom;

use bitflags::bitflags;
use itertools::Itertools;
use log::{debug, warn};

use crate::binary::read::{ReadBinary, ReadBinaryDep, ReadCtxt, ReadScope};
use crate::binary::write::{WriteBinary, WriteContext};
use crate::binary::{long_padding, I16Be};
use crate::error::{ensure, ParseError, WriteError};
use crate::font::{FontTable, OpenTypeFile, Parsed};
use crate::size;
use crate::tables::IndexToLocFormat;
use crate::tag;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    #[rustfmt::skip]
    pub struct SimpleGlyphFlag: u8 {
        const ON_CURVE_POINT                       = 0b00000001;
        const X_SHORT_VECTOR                       = 0b00000010;
        const Y_SHORT_VECTOR                       = 0b00000100;
        const REPEAT_FLAG                          = 0b00001000;
        const X_IS_SAME_OR_POSITIVE_X_SHORT_VECTOR = 0b00010000;
        const Y_IS_SAME_OR_POSITIVE_Y_SHORT_VECTOR = 0b00100000;
    }
}

/// Flag bits that must be zero.
const RESERVED_FLAGS: u8 = 0b11000000;

/// Bounding box written by some broken font generators for empty glyphs.
const BROKEN_BOUNDING_BOX: BoundingBox = BoundingBox {
    x_min: 32767,
    y_min: 32767,
    x_max: -32767,
    y_max: -32767,
};

/// `glyf` table
///
/// <https://docs.microsoft.com/en-us/typography/opentype/spec/glyf>
#[derive(Debug, PartialEq)]
pub struct GlyfTable<'a> {
    pub records: Vec<GlyfRecord<'a>>,
}

/// A validated glyph. The byte ranges borrow from the font data.
#[derive(Debug, PartialEq, Clone)]
pub enum GlyfRecord<'a> {
    Empty,
    Simple {
        header: GlyphHeader,
        /// Contour end points, instruction length and instructions.
        program: &'a [u8],
        /// Flags and coordinates.
        points: &'a [u8],
    },
    Composite {
        header: GlyphHeader,
        /// Everything after the header, unvalidated.
        data: &'a [u8],
    },
}

#[derive(Debug, PartialEq, Clone)]
pub struct GlyphHeader {
    pub number_of_contours: i16,
    pub bounding_box: BoundingBox,
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct BoundingBox {
    pub x_min: i16,
    pub x_max: i16,
    pub y_min: i16,
    pub y_max: i16,
}

/// Arguments for reading the body of a simple glyph.
#[derive(Debug, Copy, Clone)]
struct SimpleGlyphArgs {
    number_of_contours: u16,
    /// Length of the glyph including its header.
    glyph_length: usize,
    max_size_of_instructions: Option<u16>,
}

struct SimpleGlyph<'a> {
    program: &'a [u8],
    points: &'a [u8],
}

impl<'a> GlyfTable<'a> {
    /// Validate every glyph located by `offsets`.
    ///
    /// Returns the table and the offsets of the glyphs as they will be written.
    pub fn read_glyphs(
        scope: ReadScope<'a>,
        offsets: &[u32],
        max_size_of_instructions: Option<u16>,
    ) -> Result<(GlyfTable<'a>, Vec<u32>), ParseError> {
        let table_len = scope.data().len();
        let mut records = Vec::with_capacity(offsets.len().saturating_sub(1));
        let mut resulting_offsets = Vec::with_capacity(offsets.len());
        let mut current_offset = 0u32;

        for (glyph_id, (start, end)) in offsets.iter().copied().tuple_windows().enumerate() {
            resulting_offsets.push(current_offset);
            let length = usize::try_from(end.checked_sub(start).ok_or(ParseError::BadOffset)?)?;
            if length == 0 {
                records.push(GlyfRecord::Empty);
                continue;
            }
            let offset = usize::try_from(start)?;
            ensure!(
                offset < table_len && length <= table_len - offset,
                ParseError::BadOffset,
                "glyf: glyph {} at {}..{} is outside the table of length {}",
                glyph_id,
                start,
                end,
                table_len
            );

            let record = scope
                .offset_length(offset, length)?
                .read_dep::<GlyfRecord<'_>>(max_size_of_instructions)
                .map_err(|err| {
                    debug!("glyf: glyph {} is invalid", glyph_id);
                    err
                })?;
            let size = record.len();
            records.push(record);
            current_offset = u32::try_from(size + long_padding(size))
                .ok()
                .and_then(|size| current_offset.checked_add(size))
                .ok_or(ParseError::LimitExceeded)?;
        }
        resulting_offsets.push(current_offset);

        Ok((GlyfTable { records }, resulting_offsets))
    }
}

impl<'b> ReadBinaryDep for GlyfRecord<'b> {
    type Args<'a> = Option<u16>;
    type HostType<'a> = GlyfRecord<'a>;

    /// Read a glyph that fills `ctxt`.
    ///
    /// `max_size_of_instructions` is the limit on instruction length from `maxp`, if any.
    fn read_dep<'a>(
        ctxt: &mut ReadCtxt<'a>,
        max_size_of_instructions: Option<u16>,
    ) -> Result<Self::HostType<'a>, ParseError> {
        let glyph_length = ctxt.remaining();
        let header = ctxt.read::<GlyphHeader>()?;
        match u16::try_from(header.number_of_contours) {
            Ok(number_of_contours) => {
                let args = SimpleGlyphArgs {
                    number_of_contours,
                    glyph_length,
                    max_size_of_instructions,
                };
                let glyph = ctxt.read_dep::<SimpleGlyph<'_>>(args)?;
                Ok(GlyfRecord::Simple {
                    header,
                    program: glyph.program,
                    points: glyph.points,
                })
            }
            Err(_) => {
                let data = ctxt.read_slice(ctxt.remaining())?;
                Ok(GlyfRecord::Composite { header, data })
            }
        }
    }
}

impl<'b> ReadBinaryDep for SimpleGlyph<'b> {
    type Args<'a> = SimpleGlyphArgs;
    type HostType<'a> = SimpleGlyph<'a>;

    fn read_dep<'a>(
        ctxt: &mut ReadCtxt<'a>,
        args: SimpleGlyphArgs,
    ) -> Result<Self::HostType<'a>, ParseError> {
        let body = ctxt.scope().data();

        let mut num_flags = 0u32;
        for index in 0..args.number_of_contours {
            let end_point = ctxt.read_u16be()?;
            ensure!(
                end_point != 0xFFFF,
                ParseError::BadValue,
                "glyf: contour end point overflow"
            );
            ensure!(
                index == 0 || u32::from(end_point) + 1 > num_flags,
                ParseError::BadValue,
                "glyf: contour end points are not increasing"
            );
            num_flags = u32::from(end_point) + 1;
        }

        let instruction_length = ctxt.read_u16be()?;
        if let Some(max) = args.max_size_of_instructions {
            ensure!(
                instruction_length <= max,
                ParseError::LimitExceeded,
                "glyf: instruction length {} is larger than maxp.maxSizeOfInstructions {}",
                instruction_length,
                max
            );
        }
        let program_len =
            usize::from(args.number_of_contours) * size::U16 + size::U16 + usize::from(instruction_length);
        ensure!(
            program_len <= body.len(),
            ParseError::BadEof,
            "glyf: glyph header length {} is too large",
            size::GLYPH_HEADER + program_len
        );
        ctxt.skip(usize::from(instruction_length))?;

        let glyph_length = u32::try_from(args.glyph_length)?;
        let mut flags_count_physical = 0u32;
        let mut xy_coordinates_length = 0u32;
        let mut flags_count_logical = 0u32;
        while flags_count_logical < num_flags {
            let flag = ctxt.read_u8()?;
            let flags = SimpleGlyphFlag::from_bits_retain(flag);

            let mut delta = 0u32;
            if flags.contains(SimpleGlyphFlag::X_SHORT_VECTOR) {
                delta += 1;
            } else if !flags.contains(SimpleGlyphFlag::X_IS_SAME_OR_POSITIVE_X_SHORT_VECTOR) {
                delta += 2;
            }
            if flags.contains(SimpleGlyphFlag::Y_SHORT_VECTOR) {
                delta += 1;
            } else if !flags.contains(SimpleGlyphFlag::Y_IS_SAME_OR_POSITIVE_Y_SHORT_VECTOR) {
                delta += 2;
            }

            if flags.contains(SimpleGlyphFlag::REPEAT_FLAG) {
                ensure!(
                    flags_count_logical + 1 < num_flags,
                    ParseError::BadValue,
                    "glyf: flag count too high ({} + 1 >= {})",
                    flags_count_logical,
                    num_flags
                );
                let repeat = u32::from(ctxt.read_u8()?);
                ensure!(repeat != 0, ParseError::BadValue, "glyf: zero repeat count");
                delta += delta * repeat;
                flags_count_logical += repeat;
                ensure!(
                    flags_count_logical < num_flags,
                    ParseError::BadValue,
                    "glyf: flag count too high ({} >= {})",
                    flags_count_logical,
                    num_flags
                );
                flags_count_physical += 1;
            }

            ensure!(
                flag & RESERVED_FLAGS == 0,
                ParseError::BadValue,
                "glyf: bad flag value {:#04x}, reserved flags must be zero",
                flag
            );

            xy_coordinates_length += delta;
            ensure!(
                xy_coordinates_length <= glyph_length,
                ParseError::BadEof,
                "glyf: coordinates length {} is larger than glyph length {}",
                xy_coordinates_length,
                glyph_length
            );

            flags_count_logical += 1;
            flags_count_physical += 1;
        }

        let points_len = usize::try_from(flags_count_physical + xy_coordinates_length)?;
        let total = program_len + points_len;
        ensure!(
            total <= body.len(),
            ParseError::BadEof,
            "glyf: glyph too short {}",
            args.glyph_length
        );
        // The glyph length may include up to 3 bytes of alignment padding
        ensure!(
            body.len() - total <= 3,
            ParseError::BadValue,
            "glyf: invalid glyph length {}",
            args.glyph_length
        );

        let program = body.get(..program_len).ok_or(ParseError::BadEof)?;
        let points = body.get(program_len..total).ok_or(ParseError::BadEof)?;
        Ok(SimpleGlyph { program, points })
    }
}

impl<'a> GlyfRecord<'a> {
    /// Length of the glyph as written, without padding.
    pub fn len(&self) -> usize {
        match self {
            GlyfRecord::Empty => 0,
            GlyfRecord::Simple {
                program, points, ..
            } => size::GLYPH_HEADER + program.len() + points.len(),
            GlyfRecord::Composite { data, .. } => size::GLYPH_HEADER + data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, GlyfRecord::Empty)
    }

    pub fn header(&self) -> Option<&GlyphHeader> {
        match self {
            GlyfRecord::Empty => None,
            GlyfRecord::Simple { header, .. } | GlyfRecord::Composite { header, .. } => {
                Some(header)
            }
        }
    }
}

impl ReadBinary for GlyphHeader {
    type HostType<'a> = Self;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self, ParseError> {
        let number_of_contours = ctxt.read_i16be()?;
        ensure!(
            number_of_contours >= -1,
            ParseError::BadValue,
            "glyf: bad numberOfContours {}",
            number_of_contours
        );
        let mut bounding_box = ctxt.read::<BoundingBox>()?;
        if bounding_box == BROKEN_BOUNDING_BOX {
            warn!("glyf: bounding box of an empty glyph is broken, changing it to zero");
            bounding_box = BoundingBox {
                x_min: 0,
                x_max: 0,
                y_min: 0,
                y_max: 0,
            };
        }
        ensure!(
            bounding_box.x_min <= bounding_box.x_max && bounding_box.y_min <= bounding_box.y_max,
            ParseError::BadValue,
            "glyf: bad bounding box {:?}",
            bounding_box
        );

        Ok(GlyphHeader {
            number_of_contours,
            bounding_box,
        })
    }
}

impl WriteBinary<&Self> for GlyphHeader {
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, header: &GlyphHeader) -> Result<(), WriteError> {
        I16Be::write(ctxt, header.number_of_contours)?;
        BoundingBox::write(ctxt, header.bounding_box)
    }
}

impl ReadBinary for BoundingBox {
    type HostType<'a> = Self;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self, ParseError> {
        let x_min = ctxt.read::<I16Be>()?;
        let y_min = ctxt.read::<I16Be>()?;
        let x_max = ctxt.read::<I16Be>()?;
        let y_max = ctxt.read::<I16Be>()?;

        Ok(BoundingBox {
            x_min,
            y_min,
            x_max,
            y_max,
        })
    }
}

impl WriteBinary for BoundingBox {
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, bbox: BoundingBox) -> Result<(), WriteError> {
        I16Be::write(ctxt, bbox.x_min)?;
        I16Be::write(ctxt, bbox.y_min)?;
        I16Be::write(ctxt, bbox.x_max)?;
        I16Be::write(ctxt, bbox.y_max)?;

        Ok(())
    }
}

impl<'a> WriteBinary<&Self> for GlyfTable<'a> {
    type Output = ();

    /// Write every glyph followed by zero padding to a 4-byte boundary.
    ///
    /// The offsets of the written glyphs are the ones returned by `read_glyphs`.
    fn write<C: WriteContext>(ctxt: &mut C, table: &GlyfTable<'a>) -> Result<(), WriteError> {
        for record in &table.records {
            match record {
                GlyfRecord::Empty => continue,
                GlyfRecord::Simple {
                    header,
                    program,
                    points,
                } => {
                    GlyphHeader::write(ctxt, header)?;
                    ctxt.write_bytes(program)?;
                    ctxt.write_bytes(points)?;
                }
                GlyfRecord::Composite { header, data } => {
                    GlyphHeader::write(ctxt, header)?;
                    ctxt.write_bytes(data)?;
                }
            }
            ctxt.write_zeros(long_padding(record.len()))?;
        }

        Ok(())
    }
}

impl<'a> FontTable<'a> for GlyfTable<'a> {
    const TAG: u32 = tag::GLYF;
    const REQUIRES: &'static [u32] = &[tag::HEAD, tag::MAXP, tag::LOCA];

    fn parse(file: &mut OpenTypeFile<'a>, scope: ReadScope<'a>) -> Result<Parsed<Self>, ParseError> {
        let (head, maxp, loca) = match (&mut file.head, &file.maxp, &mut file.loca) {
            (Some(head), Some(maxp), Some(loca)) => (head, maxp, loca),
            (None, _, _) => return Err(ParseError::MissingTable(tag::HEAD)),
            (_, None, _) => return Err(ParseError::MissingTable(tag::MAXP)),
            (_, _, None) => return Err(ParseError::MissingTable(tag::LOCA)),
        };

        let (glyf, resulting_offsets) =
            GlyfTable::read_glyphs(scope, &loca.offsets, maxp.max_size_of_instructions())?;

        let last_offset = resulting_offsets.last().copied().unwrap_or(0);
        if head.index_to_loc_format == IndexToLocFormat::Short && last_offset / 2 > 0xFFFF {
            warn!("glyf: glyphs no longer fit a short loca, switching to long");
            head.index_to_loc_format = IndexToLocFormat::Long;
        }
        loca.offsets = resulting_offsets;

        Ok(Parsed::Table(glyf))
    }

    fn store(file: &mut OpenTypeFile<'a>, table: Option<Self>) {
        file.glyf = table;
    }

    fn is_present(file: &OpenTypeFile<'a>) -> bool {
        file.glyf.is_some()
    }

    fn serialise<C: WriteContext>(ctxt: &mut C, file: &OpenTypeFile<'a>) -> Result<(), WriteError> {
        let glyf = file.glyf.as_ref().ok_or(WriteError::MissingTable(tag::GLYF))?;
        GlyfTable::write(ctxt, glyf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::write::WriteBuffer;
    use crate::tables::loca::LocaTable;
    use crate::tests::fonts::file_with;
    use crate::tests::writer::{convert, TtfType::*};

    const ON_SHORT_POSITIVE: u8 = 0x37;

    /// A triangle with one contour and no instructions, 23 bytes long.
    fn triangle() -> Vec<u8> {
        convert(&[
            Int16(1),
            Int16(0),
            Int16(0),
            Int16(100),
            Int16(100),
            UInt16(2), // end point
            UInt16(0), // instruction length
            UInt8(ON_SHORT_POSITIVE),
            UInt8(ON_SHORT_POSITIVE),
            UInt8(ON_SHORT_POSITIVE),
            Raw(&[0, 100, 0]), // x
            Raw(&[0, 0, 100]), // y
        ])
    }

    fn parse_glyf<'a>(
        data: &'a [u8],
        offsets: Vec<u32>,
    ) -> Result<OpenTypeFile<'a>, ParseError> {
        let mut file = file_with(u16::try_from(offsets.len() - 1).unwrap(), 0);
        file.loca = Some(LocaTable { offsets });
        file.parse::<GlyfTable<'_>>(data)?;
        Ok(file)
    }

    #[test]
    fn test_simple_glyph_round_trip() {
        let mut data = triangle();
        data.push(0);
        let file = parse_glyf(&data, vec![0, 24]).unwrap();
        match &file.glyf.as_ref().unwrap().records[0] {
            GlyfRecord::Simple { program, points, .. } => {
                assert_eq!(program.len(), 4);
                assert_eq!(points.len(), 9);
            }
            record => panic!("expected simple glyph, got {:?}", record),
        }

        let mut ctxt = WriteBuffer::new();
        GlyfTable::serialise(&mut ctxt, &file).unwrap();
        assert_eq!(ctxt.bytes(), &data[..]);
        assert_eq!(file.loca.unwrap().offsets, vec![0, 24]);
    }

    #[test]
    fn test_repeated_flags() {
        let data = convert(&[
            Int16(1),
            Int16(0),
            Int16(0),
            Int16(100),
            Int16(100),
            UInt16(2),
            UInt16(0),
            UInt8(ON_SHORT_POSITIVE | SimpleGlyphFlag::REPEAT_FLAG.bits()),
            UInt8(2),
            Raw(&[0, 100, 0, 0, 0, 100]),
            Raw(&[0, 0]), // padding
        ]);
        let file = parse_glyf(&data, vec![0, 24]).unwrap();
        let mut ctxt = WriteBuffer::new();
        GlyfTable::serialise(&mut ctxt, &file).unwrap();
        assert_eq!(ctxt.bytes(), &data[..]);
    }

    #[test]
    fn test_bad_flags() {
        // Reserved bit
        let mut data = triangle();
        data[14] |= 0x80;
        assert!(parse_glyf(&data, vec![0, 23]).is_err());

        // Repeat past the last point
        let mut data = triangle();
        data[16] |= SimpleGlyphFlag::REPEAT_FLAG.bits();
        assert!(parse_glyf(&data, vec![0, 23]).is_err());

        // Zero repeat
        let mut data = triangle();
        data[14] |= SimpleGlyphFlag::REPEAT_FLAG.bits();
        data[15] = 0;
        assert!(parse_glyf(&data, vec![0, 23]).is_err());
    }

    #[test]
    fn test_glyph_length() {
        let mut data = triangle();
        data.extend_from_slice(&[0; 5]);
        // More than 3 bytes of slack
        assert_eq!(
            parse_glyf(&data, vec![0, 28]).err(),
            Some(ParseError::BadValue)
        );
        // Truncated
        assert!(parse_glyf(&data, vec![0, 20]).is_err());
        // Past the end of the table
        assert_eq!(
            parse_glyf(&data, vec![0, 32]).err(),
            Some(ParseError::BadOffset)
        );
    }

    #[test]
    fn test_end_points_must_increase() {
        let data = convert(&[
            Int16(2),
            Int16(0),
            Int16(0),
            Int16(0),
            Int16(0),
            UInt16(0),
            UInt16(0),
            UInt16(0),
            UInt8(ON_SHORT_POSITIVE),
            Raw(&[0, 0, 0]),
        ]);
        assert!(parse_glyf(&data, vec![0, 16]).is_err());
    }

    #[test]
    fn test_instruction_limit() {
        let mut data = convert(&[
            Int16(0),
            Int16(0),
            Int16(0),
            Int16(0),
            Int16(0),
            UInt16(101),
        ]);
        data.resize(data.len() + 101, 0);
        data.push(0);
        // maxp limits instructions to 100 bytes
        assert_eq!(
            parse_glyf(&data, vec![0, 114]).err(),
            Some(ParseError::LimitExceeded)
        );
    }

    #[test]
    fn test_header_checks() {
        let mut data = triangle();
        data[0..2].copy_from_slice(&(-2i16).to_be_bytes());
        assert!(parse_glyf(&data, vec![0, 23]).is_err());

        let mut data = triangle();
        data[2..4].copy_from_slice(&200i16.to_be_bytes()); // x_min > x_max
        assert!(parse_glyf(&data, vec![0, 23]).is_err());

        let data = convert(&[
            Int16(0),
            Int16(32767),
            Int16(32767),
            Int16(-32767),
            Int16(-32767),
            UInt16(0),
        ]);
        let file = parse_glyf(&data, vec![0, 12]).unwrap();
        let header = file.glyf.as_ref().unwrap().records[0].header().unwrap().clone();
        assert_eq!(header.bounding_box.x_max, 0);
        let mut ctxt = WriteBuffer::new();
        GlyfTable::serialise(&mut ctxt, &file).unwrap();
        assert_eq!(&ctxt.bytes()[..12], &[0; 12]);
    }

    #[test]
    fn test_empty_and_composite_glyphs() {
        let mut data = triangle();
        data.push(0);
        let composite = convert(&[
            Int16(-1),
            Int16(0),
            Int16(0),
            Int16(10),
            Int16(10),
            UInt16(0x0002), // flags
            UInt16(0),      // glyph index
            UInt8(1),
        ]);
        data.extend_from_slice(&composite);
        let offsets = vec![0, 0, 24, 24, 24 + 15];
        let file = parse_glyf(&data, offsets).unwrap();
        let glyf = file.glyf.as_ref().unwrap();
        assert!(glyf.records[0].is_empty());
        assert!(glyf.records[2].is_empty());
        assert!(matches!(glyf.records[3], GlyfRecord::Composite { data, .. } if data.len() == 5));
        assert_eq!(file.loca.as_ref().unwrap().offsets, vec![0, 0, 24, 24, 40]);

        let mut ctxt = WriteBuffer::new();
        GlyfTable::serialise(&mut ctxt, &file).unwrap();
        assert_eq!(ctxt.len(), 40);
        assert_eq!(&ctxt.bytes()[24..39], &composite[..]);
    }

    #[test]
    fn test_switch_to_long_loca() {
        let mut data = convert(&[Int16(-1), Int16(0), Int16(0), Int16(0), Int16(0)]);
        data.resize(0x20004, 0);
        let file = parse_glyf(&data, vec![0, 0x20004]).unwrap();
        assert_eq!(
            file.head.as_ref().unwrap().index_to_loc_format,
            IndexToLocFormat::Long
        );
        assert_eq!(file.loca.as_ref().unwrap().offsets, vec![0, 0x20004]);
    }
}
