#![allow(dead_code)]

//! Builders for synthetic font tables.

#[path = "../src/tests/writer.rs"]
mod writer;

pub use writer::{convert, TtfType, TtfType::*, Writer};

pub fn tag(name: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*name)
}

pub fn head(flags: u16, index_to_loc_format: i16) -> Vec<u8> {
    convert(&[
        UInt32(0x0001_0000),
        UInt32(0x0001_0000), // revision
        UInt32(0), // checksum adjustment
        UInt32(0x5F0F_3CF5),
        UInt16(flags),
        UInt16(2048),
        Int64(0),
        Int64(0),
        Int16(0),
        Int16(-200),
        Int16(1000),
        Int16(800),
        UInt16(0), // mac style
        UInt16(9),
        Int16(2),
        Int16(index_to_loc_format),
        Int16(0),
    ])
}

pub fn maxp(num_glyphs: u16) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_all(&[UInt32(0x0001_0000), UInt16(num_glyphs)]);
    for value in [64, 4, 0, 0, 2, 0, 0, 0, 0, 32, 64, 0, 0] {
        w.write(UInt16(value));
    }
    w.data
}

/// A version 4 `OS/2` table covering `first..=last`.
pub fn os2(first: u16, last: u16) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_all(&[UInt16(4), Int16(500), UInt16(400), UInt16(5), UInt16(0)]);
    for value in [650, 600, 0, 75, 650, 600, 0, 350, 50, 300, 0] {
        w.write(Int16(value));
    }
    w.write_all(&[
        Raw(&[2, 11, 6, 3, 5, 4, 5, 2, 2, 4]), // panose
        UInt32(1),
        UInt32(0),
        UInt32(0),
        UInt32(0),
        UInt32(tag(b"TEST")),
        UInt16(0x0040), // regular
        UInt16(first),
        UInt16(last),
        Int16(800),
        Int16(-200),
        Int16(0),
        UInt16(900),
        UInt16(300),
        UInt32(1),
        UInt32(0),
        Int16(500),
        Int16(700),
        UInt16(0),
        UInt16(0x20),
        UInt16(2),
    ]);
    w.data
}

/// A format 4 subtable from `(start, end, delta, id_range_offset)` segments.
pub fn format4(segments: &[(u16, u16, i16, u16)], glyph_ids: &[u16]) -> Vec<u8> {
    let seg_count = segments.len() as u16;
    let log2 = 15 - seg_count.leading_zeros() as u16;
    let search_range = 2 << log2;
    let mut w = Writer::new();
    w.write_all(&[
        UInt16(4),
        UInt16(16 + 8 * seg_count + 2 * glyph_ids.len() as u16),
        UInt16(0),
        UInt16(seg_count * 2),
        UInt16(search_range),
        UInt16(log2),
        UInt16(seg_count * 2 - search_range),
    ]);
    for segment in segments {
        w.write(UInt16(segment.1));
    }
    w.write(UInt16(0));
    for segment in segments {
        w.write(UInt16(segment.0));
    }
    for segment in segments {
        w.write(Int16(segment.2));
    }
    for segment in segments {
        w.write(UInt16(segment.3));
    }
    for &glyph_id in glyph_ids {
        w.write(UInt16(glyph_id));
    }
    w.data
}

/// A format 12 or 13 subtable from `(start, end, glyph)` groups.
pub fn groups(format: u16, groups: &[(u32, u32, u32)]) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_all(&[
        UInt16(format),
        UInt16(0),
        UInt32(16 + 12 * groups.len() as u32),
        UInt32(0),
        UInt32(groups.len() as u32),
    ]);
    for &(start, end, glyph) in groups {
        w.write_all(&[UInt32(start), UInt32(end), UInt32(glyph)]);
    }
    w.data
}

/// A `cmap` table with one encoding record per `(platform, encoding, subtable)`.
pub fn cmap(records: &[(u16, u16, &[u8])]) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_all(&[UInt16(0), UInt16(records.len() as u16)]);
    let mut offset = 4 + 8 * records.len();
    for &(platform, encoding, subtable) in records {
        w.write_all(&[UInt16(platform), UInt16(encoding), UInt32(offset as u32)]);
        offset += subtable.len();
    }
    for &(_, _, subtable) in records {
        w.data.extend_from_slice(subtable);
    }
    w.data
}

/// Printable ASCII mapped to glyphs 1 to 95.
pub fn ascii_format4() -> Vec<u8> {
    format4(&[(0x20, 0x7E, 1 - 0x20, 0), (0xFFFF, 0xFFFF, 1, 0)], &[])
}

pub fn ascii_cmap() -> Vec<u8> {
    cmap(&[(3, 1, &ascii_format4())])
}

/// A glyph with no contours and no instructions.
pub fn zero_contour_glyph() -> Vec<u8> {
    convert(&[Int16(0), Int16(0), Int16(0), Int16(0), Int16(0), UInt16(0)])
}

/// A triangle with one contour, two bytes of instructions and padding to 4 bytes.
pub fn triangle() -> Vec<u8> {
    convert(&[
        Int16(1),
        Int16(0),
        Int16(0),
        Int16(100),
        Int16(100),
        UInt16(2), // end point
        UInt16(2), // instruction length
        Raw(&[0xB0, 0x00]), // PUSHB[0] 0
        Raw(&[0x37, 0x37, 0x37]), // on curve, short positive x and y
        Raw(&[0, 100, 0]),
        Raw(&[0, 0, 100]),
        Raw(&[0, 0, 0]),
    ])
}

/// `loca` and `glyf` tables, in long format, holding `glyphs`.
pub fn glyf_and_loca(glyphs: &[Vec<u8>]) -> (Vec<u8>, Vec<u8>) {
    let mut glyf = Vec::new();
    let mut loca = Writer::new();
    loca.write(UInt32(0));
    for glyph in glyphs {
        glyf.extend_from_slice(glyph);
        loca.write(UInt32(glyf.len() as u32));
    }
    (loca.data, glyf)
}
