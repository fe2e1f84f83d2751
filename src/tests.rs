//! Shared test code.

pub(crate) mod writer;

/// Builders for the tables other tables depend on.
pub(crate) mod fonts {
    #![allow(dead_code)]

    use super::writer::{convert, TtfType::*};
    use crate::binary::read::ReadScope;
    use crate::font::OpenTypeFile;
    use crate::tables::{HeadTable, MaxpTable};

    /// A valid `head` table.
    pub fn head_data(flags: u16, index_to_loc_format: i16) -> Vec<u8> {
        convert(&[
            UInt32(0x0001_0000),
            UInt32(0x0001_8000), // revision
            UInt32(0x1234_5678), // checksum adjustment
            UInt32(0x5F0F_3CF5),
            UInt16(flags),
            UInt16(1000), // units per em
            Int64(3_600_000_000),
            Int64(3_700_000_000),
            Int16(-100),
            Int16(-200),
            Int16(900),
            Int16(800),
            UInt16(0),  // mac style
            UInt16(8),  // lowest ppem
            Int16(2),   // direction hint
            Int16(index_to_loc_format),
            Int16(0),
        ])
    }

    /// A version 0.5 `maxp` table.
    pub fn maxp_data(num_glyphs: u16) -> Vec<u8> {
        convert(&[UInt32(0x0000_5000), UInt16(num_glyphs)])
    }

    /// A version 1.0 `maxp` table.
    pub fn maxp_v1_data(num_glyphs: u16, max_size_of_instructions: u16) -> Vec<u8> {
        let mut fields = vec![UInt32(0x0001_0000), UInt16(num_glyphs)];
        fields.extend_from_slice(&[
            UInt16(10), // points
            UInt16(2),  // contours
            UInt16(0),
            UInt16(0),
            UInt16(2), // zones
            UInt16(0),
            UInt16(0),
            UInt16(0),
            UInt16(0),
            UInt16(64), // stack
            UInt16(max_size_of_instructions),
            UInt16(0),
            UInt16(0),
        ]);
        convert(&fields)
    }

    /// A file holding `head` and `maxp` records.
    pub fn file_with<'a>(num_glyphs: u16, flags: u16) -> OpenTypeFile<'a> {
        let mut file = OpenTypeFile::new();
        let head = head_data(flags, 0);
        let maxp = maxp_v1_data(num_glyphs, 100);
        file.head = Some(ReadScope::new(&head).read::<HeadTable>().expect("head"));
        file.maxp = Some(ReadScope::new(&maxp).read::<MaxpTable>().expect("maxp"));
        file
    }
}
