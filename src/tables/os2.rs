//! `OS/2` table
//!
//! <https://docs.microsoft.com/en-us/typography/opentype/spec/os2>

use log::warn;

use crate::binary::read::{ReadBinary, ReadCtxt, ReadScope};
use crate::binary::write::{WriteBinary, WriteContext};
use crate::binary::{I16Be, U16Be, U32Be};
use crate::error::{ensure, ParseError, WriteError};
use crate::font::{FontTable, OpenTypeFile, Parsed};
use crate::tables::HeadTable;
use crate::tag;

/// Length of a version 1 table, which adds the code page ranges.
const VERSION1_LENGTH: usize = 86;
/// Length of a version 2 to 4 table.
const VERSION2_LENGTH: usize = 96;

/// `fsSelection` bits
const SELECTION_ITALIC: u16 = 1 << 0;
const SELECTION_UNDERSCORE: u16 = 1 << 1;
const SELECTION_BOLD: u16 = 1 << 5;
const SELECTION_REGULAR: u16 = 1 << 6;

/// `macStyle` bits in the `head` table
const MAC_STYLE_BOLD: u16 = 1 << 0;
const MAC_STYLE_ITALIC: u16 = 1 << 1;
const MAC_STYLE_UNDERLINE: u16 = 1 << 2;

/// `OS/2` table
///
/// Fields added by later versions of the table are present when `version` includes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Os2Table {
    pub version: u16,
    pub x_avg_char_width: i16,
    pub us_weight_class: u16,
    pub us_width_class: u16,
    pub fs_type: u16,
    pub y_subscript_x_size: i16,
    pub y_subscript_y_size: i16,
    pub y_subscript_x_offset: i16,
    pub y_subscript_y_offset: i16,
    pub y_superscript_x_size: i16,
    pub y_superscript_y_size: i16,
    pub y_superscript_x_offset: i16,
    pub y_superscript_y_offset: i16,
    pub y_strikeout_size: i16,
    pub y_strikeout_position: i16,
    pub s_family_class: i16,
    pub panose: [u8; 10],
    pub ul_unicode_range: [u32; 4],
    pub ach_vend_id: u32, // tag
    pub fs_selection: u16,
    pub us_first_char_index: u16,
    pub us_last_char_index: u16,
    pub s_typo_ascender: i16,
    pub s_typo_descender: i16,
    pub s_typo_line_gap: i16,
    pub us_win_ascent: u16,
    pub us_win_descent: u16,
    /// Version 1 and later.
    pub ul_code_page_range: Option<[u32; 2]>,
    /// Version 2 and later.
    pub version2: Option<Version2>,
    /// Version 5 and later.
    pub optical_point_size: Option<OpticalPointSize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version2 {
    pub sx_height: i16,
    pub s_cap_height: i16,
    pub us_default_char: u16,
    pub us_break_char: u16,
    pub us_max_context: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpticalPointSize {
    pub us_lower_optical_point_size: u16,
    pub us_upper_optical_point_size: u16,
}

/// Replace a negative size with zero.
fn non_negative(value: i16, name: &str) -> i16 {
    if value < 0 {
        warn!("OS/2: negative {} {}, changing it to 0", name, value);
        0
    } else {
        value
    }
}

impl ReadBinary for Os2Table {
    type HostType<'a> = Self;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Self, ParseError> {
        let table_len = ctxt.remaining();
        let version = ctxt.read_u16be()?;
        let x_avg_char_width = ctxt.read_i16be()?;
        let mut us_weight_class = ctxt.read_u16be()?;
        let mut us_width_class = ctxt.read_u16be()?;
        let mut fs_type = ctxt.read_u16be()?;
        let y_subscript_x_size = ctxt.read_i16be()?;
        let y_subscript_y_size = ctxt.read_i16be()?;
        let y_subscript_x_offset = ctxt.read_i16be()?;
        let y_subscript_y_offset = ctxt.read_i16be()?;
        let y_superscript_x_size = ctxt.read_i16be()?;
        let y_superscript_y_size = ctxt.read_i16be()?;
        let y_superscript_x_offset = ctxt.read_i16be()?;
        let y_superscript_y_offset = ctxt.read_i16be()?;
        let y_strikeout_size = ctxt.read_i16be()?;
        let y_strikeout_position = ctxt.read_i16be()?;
        let s_family_class = ctxt.read_i16be()?;

        ensure!(
            version <= 5,
            ParseError::BadVersion,
            "OS/2: unsupported table version {}",
            version
        );

        if us_weight_class < 1 {
            warn!("OS/2: bad usWeightClass {}, changing it to 1", us_weight_class);
            us_weight_class = 1;
        } else if us_weight_class > 999 {
            warn!(
                "OS/2: bad usWeightClass {}, changing it to 999",
                us_weight_class
            );
            us_weight_class = 999;
        }
        // A zero weight ends up as 100
        if (1..=9).contains(&us_weight_class) {
            warn!(
                "OS/2: bad usWeightClass {}, changing it to {}",
                us_weight_class,
                us_weight_class * 100
            );
            us_weight_class *= 100;
        }

        if us_width_class < 1 {
            warn!("OS/2: bad usWidthClass {}, changing it to 1", us_width_class);
            us_width_class = 1;
        } else if us_width_class > 9 {
            warn!("OS/2: bad usWidthClass {}, changing it to 9", us_width_class);
            us_width_class = 9;
        }

        // Only one of the usage permission bits may be set, the least restrictive wins.
        if fs_type & 0x2 != 0 {
            if fs_type & 0xC != 0 {
                warn!("OS/2: fsType {:#06x} has conflicting permissions", fs_type);
            }
            fs_type &= 0xfff3;
        } else if fs_type & 0x4 != 0 {
            if fs_type & 0x8 != 0 {
                warn!("OS/2: fsType {:#06x} has conflicting permissions", fs_type);
            }
            fs_type &= 0xfff4;
        } else if fs_type & 0x8 != 0 {
            fs_type &= 0xfff9;
        }
        fs_type &= 0x030f;

        let y_subscript_x_size = non_negative(y_subscript_x_size, "ySubscriptXSize");
        let y_subscript_y_size = non_negative(y_subscript_y_size, "ySubscriptYSize");
        let y_superscript_x_size = non_negative(y_superscript_x_size, "ySuperscriptXSize");
        let y_superscript_y_size = non_negative(y_superscript_y_size, "ySuperscriptYSize");
        let y_strikeout_size = non_negative(y_strikeout_size, "yStrikeoutSize");

        let panose_data = ctxt.read_slice(10)?;
        let mut panose = [0; 10];
        panose.copy_from_slice(panose_data);
        let ul_unicode_range = [
            ctxt.read_u32be()?,
            ctxt.read_u32be()?,
            ctxt.read_u32be()?,
            ctxt.read_u32be()?,
        ];
        let ach_vend_id = ctxt.read_u32be()?;
        let mut fs_selection = ctxt.read_u16be()?;
        let mut us_first_char_index = ctxt.read_u16be()?;
        let us_last_char_index = ctxt.read_u16be()?;
        let s_typo_ascender = ctxt.read_i16be()?;
        let s_typo_descender = ctxt.read_i16be()?;
        let s_typo_line_gap = ctxt.read_i16be()?;
        let us_win_ascent = ctxt.read_u16be()?;
        let us_win_descent = ctxt.read_u16be()?;

        // REGULAR excludes ITALIC and BOLD
        if fs_selection & SELECTION_REGULAR != 0
            && fs_selection & (SELECTION_ITALIC | SELECTION_BOLD) != 0
        {
            warn!("OS/2: fsSelection {:#06x} is regular and styled", fs_selection);
            fs_selection &= !(SELECTION_ITALIC | SELECTION_BOLD);
        }
        if fs_selection & !0x03ff != 0 {
            warn!("OS/2: fsSelection {:#06x} has reserved bits set", fs_selection);
            fs_selection &= 0x03ff;
        }

        if us_first_char_index > us_last_char_index {
            warn!(
                "OS/2: usFirstCharIndex {} > usLastCharIndex {}",
                us_first_char_index, us_last_char_index
            );
            us_first_char_index = us_last_char_index;
        }
        let s_typo_line_gap = non_negative(s_typo_line_gap, "sTypoLineGap");

        let mut table = Os2Table {
            version,
            x_avg_char_width,
            us_weight_class,
            us_width_class,
            fs_type,
            y_subscript_x_size,
            y_subscript_y_size,
            y_subscript_x_offset,
            y_subscript_y_offset,
            y_superscript_x_size,
            y_superscript_y_size,
            y_superscript_x_offset,
            y_superscript_y_offset,
            y_strikeout_size,
            y_strikeout_position,
            s_family_class,
            panose,
            ul_unicode_range,
            ach_vend_id,
            fs_selection,
            us_first_char_index,
            us_last_char_index,
            s_typo_ascender,
            s_typo_descender,
            s_typo_line_gap,
            us_win_ascent,
            us_win_descent,
            ul_code_page_range: None,
            version2: None,
            optical_point_size: None,
        };

        if table.version < 1 {
            return Ok(table);
        }
        if table_len < VERSION1_LENGTH {
            warn!(
                "OS/2: table of length {} is too short for version {}, changing it to 0",
                table_len, table.version
            );
            table.version = 0;
            return Ok(table);
        }
        table.ul_code_page_range = Some([ctxt.read_u32be()?, ctxt.read_u32be()?]);

        if table.version < 2 {
            return Ok(table);
        }
        if table_len < VERSION2_LENGTH {
            warn!(
                "OS/2: table of length {} is too short for version {}, changing it to 1",
                table_len, table.version
            );
            table.version = 1;
            return Ok(table);
        }
        table.version2 = Some(Version2 {
            sx_height: non_negative(ctxt.read_i16be()?, "sxHeight"),
            s_cap_height: non_negative(ctxt.read_i16be()?, "sCapHeight"),
            us_default_char: ctxt.read_u16be()?,
            us_break_char: ctxt.read_u16be()?,
            us_max_context: ctxt.read_u16be()?,
        });

        if table.version < 5 {
            return Ok(table);
        }
        // A version 5 table without the optical sizes is an error
        let mut lower = ctxt.read_u16be()?;
        let mut upper = ctxt.read_u16be()?;
        if lower > 0xFFFE {
            warn!("OS/2: usLowerOpticalPointSize {} is bad, changing it to 0xFFFE", lower);
            lower = 0xFFFE;
        }
        if upper < 2 {
            warn!("OS/2: usUpperOpticalPointSize {} is bad, changing it to 2", upper);
            upper = 2;
        }
        table.optical_point_size = Some(OpticalPointSize {
            us_lower_optical_point_size: lower,
            us_upper_optical_point_size: upper,
        });

        Ok(table)
    }
}

impl Os2Table {
    /// Make the italic, underline and regular bits of `head.macStyle` agree with
    /// `fsSelection`.
    pub fn sync_mac_style(&self, head: &mut HeadTable) {
        if self.fs_selection & SELECTION_ITALIC != 0 && head.mac_style & MAC_STYLE_ITALIC == 0 {
            warn!("OS/2: adjusting head.macStyle (italic)");
            head.mac_style |= MAC_STYLE_ITALIC;
        }
        if self.fs_selection & SELECTION_UNDERSCORE != 0
            && head.mac_style & MAC_STYLE_UNDERLINE == 0
        {
            warn!("OS/2: adjusting head.macStyle (underline)");
            head.mac_style |= MAC_STYLE_UNDERLINE;
        }
        // Regular implies neither bold nor italic, but not the other way around
        if self.fs_selection & SELECTION_REGULAR != 0
            && head.mac_style & (MAC_STYLE_BOLD | MAC_STYLE_ITALIC) != 0
        {
            warn!("OS/2: adjusting head.macStyle (regular)");
            head.mac_style &= !(MAC_STYLE_BOLD | MAC_STYLE_ITALIC);
        }
    }

    /// Extend the first and last character indices to include `start..=end`.
    ///
    /// 0xFFFF is the terminator value and never moves either index.
    pub fn widen_char_range(&mut self, start: u16, end: u16) {
        if self.us_first_char_index != 0xFFFF && start != 0xFFFF && start < self.us_first_char_index
        {
            self.us_first_char_index = start;
        }
        if self.us_last_char_index != 0xFFFF && end != 0xFFFF && end > self.us_last_char_index {
            self.us_last_char_index = end;
        }
    }
}

impl WriteBinary<&Self> for Os2Table {
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, table: &Os2Table) -> Result<(), WriteError> {
        U16Be::write(ctxt, table.version)?;
        I16Be::write(ctxt, table.x_avg_char_width)?;
        U16Be::write(ctxt, table.us_weight_class)?;
        U16Be::write(ctxt, table.us_width_class)?;
        U16Be::write(ctxt, table.fs_type)?;
        I16Be::write(ctxt, table.y_subscript_x_size)?;
        I16Be::write(ctxt, table.y_subscript_y_size)?;
        I16Be::write(ctxt, table.y_subscript_x_offset)?;
        I16Be::write(ctxt, table.y_subscript_y_offset)?;
        I16Be::write(ctxt, table.y_superscript_x_size)?;
        I16Be::write(ctxt, table.y_superscript_y_size)?;
        I16Be::write(ctxt, table.y_superscript_x_offset)?;
        I16Be::write(ctxt, table.y_superscript_y_offset)?;
        I16Be::write(ctxt, table.y_strikeout_size)?;
        I16Be::write(ctxt, table.y_strikeout_position)?;
        I16Be::write(ctxt, table.s_family_class)?;
        ctxt.write_bytes(&table.panose)?;
        ctxt.write_iter::<U32Be, _>(table.ul_unicode_range.iter().copied())?;
        U32Be::write(ctxt, table.ach_vend_id)?;
        U16Be::write(ctxt, table.fs_selection)?;
        U16Be::write(ctxt, table.us_first_char_index)?;
        U16Be::write(ctxt, table.us_last_char_index)?;
        I16Be::write(ctxt, table.s_typo_ascender)?;
        I16Be::write(ctxt, table.s_typo_descender)?;
        I16Be::write(ctxt, table.s_typo_line_gap)?;
        U16Be::write(ctxt, table.us_win_ascent)?;
        U16Be::write(ctxt, table.us_win_descent)?;

        if table.version < 1 {
            return Ok(());
        }
        let code_page_range = table.ul_code_page_range.ok_or(WriteError::BadValue)?;
        ctxt.write_iter::<U32Be, _>(code_page_range.iter().copied())?;

        if table.version < 2 {
            return Ok(());
        }
        let version2 = table.version2.as_ref().ok_or(WriteError::BadValue)?;
        I16Be::write(ctxt, version2.sx_height)?;
        I16Be::write(ctxt, version2.s_cap_height)?;
        U16Be::write(ctxt, version2.us_default_char)?;
        U16Be::write(ctxt, version2.us_break_char)?;
        U16Be::write(ctxt, version2.us_max_context)?;

        if table.version < 5 {
            return Ok(());
        }
        let sizes = table
            .optical_point_size
            .as_ref()
            .ok_or(WriteError::BadValue)?;
        U16Be::write(ctxt, sizes.us_lower_optical_point_size)?;
        U16Be::write(ctxt, sizes.us_upper_optical_point_size)?;

        Ok(())
    }
}

impl<'a> FontTable<'a> for Os2Table {
    const TAG: u32 = tag::OS_2;
    const USES: &'static [u32] = &[tag::HEAD];

    fn parse(file: &mut OpenTypeFile<'a>, scope: ReadScope<'a>) -> Result<Parsed<Self>, ParseError> {
        let table = scope.read::<Os2Table>()?;
        if let Some(head) = file.head.as_mut() {
            table.sync_mac_style(head);
        }
        Ok(Parsed::Table(table))
    }

    fn store(file: &mut OpenTypeFile<'a>, table: Option<Self>) {
        file.os2 = table;
    }

    fn is_present(file: &OpenTypeFile<'a>) -> bool {
        file.os2.is_some()
    }

    fn serialise<C: WriteContext>(ctxt: &mut C, file: &OpenTypeFile<'a>) -> Result<(), WriteError> {
        let os2 = file.os2.as_ref().ok_or(WriteError::MissingTable(tag::OS_2))?;
        Os2Table::write(ctxt, os2)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::binary::write::WriteBuffer;
    use crate::tests::fonts::file_with;
    use crate::tests::writer::{convert, TtfType::*};

    /// A version 5 table truncated to `length` bytes.
    pub(crate) fn os2_data(version: u16, weight: u16, length: usize) -> Vec<u8> {
        let mut data = convert(&[
            UInt16(version),
            Int16(500),    // avg char width
            UInt16(weight),
            UInt16(5),     // width
            UInt16(0x0008), // fsType
            Int16(650),
            Int16(-600), // subscript y size
            Int16(0),
            Int16(75),
            Int16(650),
            Int16(600),
            Int16(0),
            Int16(350),
            Int16(50),
            Int16(300),
            Int16(0),
            Raw(&[2, 11, 6, 3, 5, 4, 5, 2, 2, 4]),
            UInt32(1),
            UInt32(0),
            UInt32(0),
            UInt32(0),
            UInt32(0x5445_5354), // vendor
            UInt16(0x0040),      // regular
            UInt16(0x20),
            UInt16(0x7E),
            Int16(800),
            Int16(-200),
            Int16(-10), // typo line gap
            UInt16(900),
            UInt16(300),
            UInt32(1),
            UInt32(0),
            Int16(500),
            Int16(-700), // cap height
            UInt16(0),
            UInt16(0x20),
            UInt16(2),
            UInt16(0xFFFF),
            UInt16(0),
        ]);
        assert_eq!(data.len(), 100);
        data.truncate(length);
        data
    }

    #[test]
    fn test_weight_class() {
        let os2 = ReadScope::new(&os2_data(0, 5, 78)).read::<Os2Table>().unwrap();
        assert_eq!(os2.us_weight_class, 500);
        let os2 = ReadScope::new(&os2_data(0, 1200, 78)).read::<Os2Table>().unwrap();
        assert_eq!(os2.us_weight_class, 999);
        let os2 = ReadScope::new(&os2_data(0, 0, 78)).read::<Os2Table>().unwrap();
        assert_eq!(os2.us_weight_class, 100);
        let os2 = ReadScope::new(&os2_data(0, 1, 78)).read::<Os2Table>().unwrap();
        assert_eq!(os2.us_weight_class, 100);
    }

    #[test]
    fn test_repairs_are_a_fixed_point() {
        for (version, weight) in [(0, 5), (1, 1200), (4, 400), (5, 0)] {
            let data = os2_data(version, weight, 100);
            let os2 = ReadScope::new(&data).read::<Os2Table>().unwrap();
            let mut ctxt = WriteBuffer::new();
            Os2Table::write(&mut ctxt, &os2).unwrap();
            let reparsed = ReadScope::new(ctxt.bytes()).read::<Os2Table>().unwrap();
            assert_eq!(reparsed, os2);
        }
    }

    #[test]
    fn test_field_repairs() {
        let os2 = ReadScope::new(&os2_data(5, 400, 100))
            .read::<Os2Table>()
            .unwrap();
        assert_eq!(os2.fs_type, 0x0008);
        assert_eq!(os2.y_subscript_y_size, 0);
        assert_eq!(os2.s_typo_line_gap, 0);
        assert_eq!(os2.version2.as_ref().unwrap().s_cap_height, 0);
        assert_eq!(
            os2.optical_point_size,
            Some(OpticalPointSize {
                us_lower_optical_point_size: 0xFFFE,
                us_upper_optical_point_size: 2,
            })
        );
    }

    #[test]
    fn test_fs_type() {
        let mut data = os2_data(0, 400, 78);
        data[8..10].copy_from_slice(&0xFFFFu16.to_be_bytes());
        let os2 = ReadScope::new(&data).read::<Os2Table>().unwrap();
        assert_eq!(os2.fs_type, 0x0303);
        data[8..10].copy_from_slice(&0x000Cu16.to_be_bytes());
        let os2 = ReadScope::new(&data).read::<Os2Table>().unwrap();
        assert_eq!(os2.fs_type, 0x0004);
    }

    #[test]
    fn test_version_downgrade() {
        let os2 = ReadScope::new(&os2_data(3, 400, 90))
            .read::<Os2Table>()
            .unwrap();
        assert_eq!(os2.version, 1);
        assert!(os2.ul_code_page_range.is_some());
        assert!(os2.version2.is_none());

        let os2 = ReadScope::new(&os2_data(1, 400, 80))
            .read::<Os2Table>()
            .unwrap();
        assert_eq!(os2.version, 0);

        // Missing optical sizes are an error
        assert!(ReadScope::new(&os2_data(5, 400, 98))
            .read::<Os2Table>()
            .is_err());
        assert_eq!(
            ReadScope::new(&os2_data(6, 400, 100)).read::<Os2Table>(),
            Err(ParseError::BadVersion)
        );
    }

    #[test]
    fn test_first_char_index() {
        let mut data = os2_data(0, 400, 78);
        data[64..66].copy_from_slice(&0x100u16.to_be_bytes());
        let os2 = ReadScope::new(&data).read::<Os2Table>().unwrap();
        assert_eq!(os2.us_first_char_index, 0x7E);
    }

    #[test]
    fn test_sync_mac_style() {
        let data = os2_data(0, 400, 78);
        let mut file = file_with(1, 0);
        file.head.as_mut().unwrap().mac_style = 0x3;
        file.parse::<Os2Table>(&data).unwrap();
        // Regular clears bold and italic
        assert_eq!(file.head.as_ref().unwrap().mac_style, 0);

        let mut styled = data.clone();
        styled[62..64].copy_from_slice(&(SELECTION_ITALIC | SELECTION_UNDERSCORE).to_be_bytes());
        let os2 = ReadScope::new(&styled).read::<Os2Table>().unwrap();
        let head = file.head.as_mut().unwrap();
        os2.sync_mac_style(head);
        assert_eq!(head.mac_style, MAC_STYLE_ITALIC | MAC_STYLE_UNDERLINE);
    }
}
