//! Parsing and writing of the `cmap` table.
//!
//! > This table defines the mapping of character codes to the glyph index values used in the
//! > font.
//!
//! <https://docs.microsoft.com/en-us/typography/opentype/spec/cmap>
//!
//! Only the following subtables are kept, everything else is skipped:
//!
//! | Platform | Encoding | Format | Written as |
//! |----------|----------|--------|------------|
//! | 0        | 0, 1     | 4      | 3-1-4      |
//! | 0        | 3        | 4      | 0-3-4      |
//! | 0        | 3        | 12     | 3-10-12    |
//! | 0        | 5        | 14     | 0-5-14     |
//! | 1        | 0        | 0      | 1-0-0      |
//! | 3        | 0        | 4      | 3-0-4      |
//! | 3        | 1        | 4      | 3-1-4      |
//! | 3        | 10       | 12     | 3-10-12    |
//! | 3        | 10       | 13     | 3-10-13    |
//!
//! Format 4 subtables are validated by resolving every code point they map and are then written
//! verbatim. The other formats are rebuilt from their parsed records.

use std::convert::TryFrom;

use log::{debug, warn};

use crate::binary::read::{ReadArray, ReadBinaryDep, ReadCtxt, ReadFrom, ReadScope, ReadUnchecked};
use crate::binary::write::{WriteBinary, WriteContext};
use crate::binary::{I16Be, U16Be, U24Be, U32Be, U8};
use crate::error::{ensure, fail, ParseError, WriteError};
use crate::font::{FontTable, OpenTypeFile, Parsed};
use crate::size;
use crate::tables::search_params;
use crate::tag;

/// Maximum number of groups, ranges or mappings in a single subtable.
pub const MAX_CMAP_GROUPS: u32 = 0xFFFF;
/// Maximum number of variation selector records in a format 14 subtable.
pub const MAX_CMAP_SELECTOR_RECORDS: u32 = 259;

const UNICODE_UPPER_LIMIT: u32 = 0x10FFFF;
const UVS_UPPER_LIMIT: u32 = 0xFFFFFF;
const SURROGATES_START: u32 = 0xD800;
const SURROGATES_END: u32 = 0xDFFF;

/// Ranges of valid variation selectors: Mongolian, standard and ideographic.
const VARIATION_SELECTORS: [(u32, u32); 3] =
    [(0x180B, 0x180D), (0xFE00, 0xFE0F), (0xE0100, 0xE01EF)];

/// Length of a format 0 subtable.
const FORMAT0_LENGTH: u16 = 3 * size::U16 as u16 + 256;
/// Length of the fixed part of a format 12 or 13 subtable.
const GROUPS_HEADER_LENGTH: usize = 16;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PlatformId(pub u16);

impl PlatformId {
    pub const UNICODE: PlatformId = PlatformId(0);
    pub const MACINTOSH: PlatformId = PlatformId(1);
    pub const WINDOWS: PlatformId = PlatformId(3);
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EncodingId(pub u16);

impl EncodingId {
    pub const UNICODE_DEFAULT: EncodingId = EncodingId(0);
    pub const UNICODE_1_1: EncodingId = EncodingId(1);
    pub const UNICODE_BMP: EncodingId = EncodingId(3);
    pub const UNICODE_VARIATION_SEQUENCES: EncodingId = EncodingId(5);

    pub const MACINTOSH_APPLE_ROMAN: EncodingId = EncodingId(0);

    pub const WINDOWS_SYMBOL: EncodingId = EncodingId(0);
    pub const WINDOWS_UNICODE_BMP_UCS2: EncodingId = EncodingId(1);
    pub const WINDOWS_UNICODE_UCS4: EncodingId = EncodingId(10);
}

/// The sanitised subtables of a `cmap` table.
#[derive(Debug, Default, PartialEq)]
pub struct CmapTable<'a> {
    /// Unicode BMP, format 4, verbatim.
    pub subtable_0_3_4: Option<&'a [u8]>,
    /// Unicode variation sequences.
    pub subtable_0_5_14: Vec<VariationSelectorRecord>,
    /// Mac Roman glyph ids.
    pub subtable_1_0_0: Option<&'a [u8]>,
    /// MS Symbol, format 4, verbatim.
    pub subtable_3_0_4: Option<&'a [u8]>,
    /// MS Unicode BMP, format 4, verbatim.
    pub subtable_3_1_4: Option<&'a [u8]>,
    pub subtable_3_10_12: Vec<MapGroup>,
    pub subtable_3_10_13: Vec<MapGroup>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EncodingRecord {
    pub platform_id: u16,
    pub encoding_id: u16,
    pub offset: u32,
}

/// A group of a format 12 or 13 subtable.
///
/// In format 12 consecutive code points map to consecutive glyphs starting at
/// `start_glyph_id`, in format 13 they all map to `start_glyph_id`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MapGroup {
    pub start_char_code: u32,
    pub end_char_code: u32,
    pub start_glyph_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariationSelectorRecord {
    pub var_selector: u32,
    /// Sequences that use the default glyph of the base character.
    pub default_uvs: Vec<UnicodeRange>,
    pub non_default_uvs: Vec<UvsMapping>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UnicodeRange {
    pub start_unicode_value: u32,
    pub additional_count: u8,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UvsMapping {
    pub unicode_value: u32,
    pub glyph_id: u16,
}

/// An encoding record along with the format and length found at its offset.
#[derive(Debug, Copy, Clone)]
struct SubtableHeader {
    platform_id: u16,
    encoding_id: u16,
    offset: usize,
    format: u16,
    length: usize,
}

#[derive(Debug, Copy, Clone)]
struct Segment {
    start_code: u16,
    end_code: u16,
    id_delta: i16,
    id_range_offset: u16,
    /// Position of the `idRangeOffset` value in the subtable, lookups are relative to it.
    id_range_offset_position: usize,
}

/// A validated format 4 subtable.
struct Format4<'a> {
    data: &'a [u8],
    segments: Vec<Segment>,
}

#[derive(Debug, Copy, Clone)]
struct VariationSelectorHeader {
    var_selector: u32,
    default_uvs_offset: u32,
    non_default_uvs_offset: u32,
}

impl ReadFrom for EncodingRecord {
    type ReadType = (U16Be, U16Be, U32Be);

    fn read_from((platform_id, encoding_id, offset): (u16, u16, u32)) -> Self {
        EncodingRecord {
            platform_id,
            encoding_id,
            offset,
        }
    }
}

impl ReadFrom for MapGroup {
    type ReadType = (U32Be, U32Be, U32Be);

    fn read_from((start_char_code, end_char_code, start_glyph_id): (u32, u32, u32)) -> Self {
        MapGroup {
            start_char_code,
            end_char_code,
            start_glyph_id,
        }
    }
}

impl ReadFrom for VariationSelectorHeader {
    type ReadType = (U24Be, U32Be, U32Be);

    fn read_from((var_selector, default_uvs_offset, non_default_uvs_offset): (u32, u32, u32)) -> Self {
        VariationSelectorHeader {
            var_selector,
            default_uvs_offset,
            non_default_uvs_offset,
        }
    }
}

impl ReadFrom for UnicodeRange {
    type ReadType = (U24Be, U8);

    fn read_from((start_unicode_value, additional_count): (u32, u8)) -> Self {
        UnicodeRange {
            start_unicode_value,
            additional_count,
        }
    }
}

impl ReadFrom for UvsMapping {
    type ReadType = (U24Be, U16Be);

    fn read_from((unicode_value, glyph_id): (u32, u16)) -> Self {
        UvsMapping {
            unicode_value,
            glyph_id,
        }
    }
}

impl<'a> CmapTable<'a> {
    /// Validate the table in `scope`.
    ///
    /// Every kept subtable maps only to glyphs below `num_glyphs`. Each accepted format 4
    /// segment is passed to `widen` so the `OS/2` character range can be repaired.
    pub fn read_subtables(
        scope: ReadScope<'a>,
        num_glyphs: u16,
        mut widen: impl FnMut(u16, u16),
    ) -> Result<CmapTable<'a>, ParseError> {
        let table_len = scope.data().len();
        let mut ctxt = scope.ctxt();
        let version = ctxt.read_u16be()?;
        ensure!(
            version == 0,
            ParseError::BadVersion,
            "cmap: non zero table version {}",
            version
        );
        let num_tables = ctxt.read_u16be()?;
        ensure!(num_tables != 0, ParseError::BadValue, "cmap: no subtables");
        let encoding_records = ctxt.read_array::<EncodingRecord>(usize::from(num_tables))?;
        let data_offset = ctxt.offset();

        let headers = encoding_records
            .iter()
            .map(|record| read_subtable_header(scope, record, data_offset))
            .collect::<Result<Vec<_>, _>>()?;
        check_subtable_layout(&headers, table_len)?;

        let mut cmap = CmapTable::default();
        for header in headers {
            let subtable = scope.offset_length(header.offset, header.length)?;
            let combination = (
                PlatformId(header.platform_id),
                EncodingId(header.encoding_id),
                header.format,
            );
            match combination {
                (PlatformId::UNICODE, EncodingId::UNICODE_DEFAULT, 4)
                | (PlatformId::UNICODE, EncodingId::UNICODE_1_1, 4)
                | (PlatformId::WINDOWS, EncodingId::WINDOWS_UNICODE_BMP_UCS2, 4) => {
                    // Unicode platform subtables are kept as MS Unicode BMP. A 0-0-4 subtable
                    // holding symbol data is fixed up when 3-0-4 is also present.
                    let format4 = subtable.read_dep::<Format4<'_>>(num_glyphs)?;
                    format4.widen_char_range(&mut widen);
                    cmap.subtable_3_1_4 = Some(format4.data);
                }
                (PlatformId::UNICODE, EncodingId::UNICODE_BMP, 4) => {
                    let format4 = subtable.read_dep::<Format4<'_>>(num_glyphs)?;
                    format4.widen_char_range(&mut widen);
                    cmap.subtable_0_3_4 = Some(format4.data);
                }
                (PlatformId::WINDOWS, EncodingId::WINDOWS_SYMBOL, 4) => {
                    let format4 = subtable.read_dep::<Format4<'_>>(num_glyphs)?;
                    format4.widen_char_range(&mut widen);
                    cmap.subtable_3_0_4 = Some(format4.data);
                }
                (PlatformId::UNICODE, EncodingId::UNICODE_BMP, 12)
                | (PlatformId::WINDOWS, EncodingId::WINDOWS_UNICODE_UCS4, 12) => {
                    cmap.subtable_3_10_12 = read_format12(subtable, num_glyphs)?;
                }
                (PlatformId::WINDOWS, EncodingId::WINDOWS_UNICODE_UCS4, 13) => {
                    cmap.subtable_3_10_13 = read_format13(subtable, num_glyphs)?;
                }
                (PlatformId::UNICODE, EncodingId::UNICODE_VARIATION_SEQUENCES, 14) => {
                    cmap.subtable_0_5_14 = read_format14(subtable)?;
                }
                (PlatformId::MACINTOSH, EncodingId::MACINTOSH_APPLE_ROMAN, 0) => {
                    cmap.subtable_1_0_0 = Some(read_format0(subtable)?);
                }
                (platform_id, encoding_id, format) => {
                    debug!(
                        "cmap: skipping unsupported subtable {}-{}-{}",
                        platform_id.0, encoding_id.0, format
                    );
                }
            }
        }

        ensure!(
            cmap.subtable_0_3_4.is_some()
                || cmap.subtable_3_0_4.is_some()
                || cmap.subtable_3_1_4.is_some()
                || !cmap.subtable_3_10_12.is_empty()
                || !cmap.subtable_3_10_13.is_empty(),
            ParseError::MissingValue,
            "cmap: no supported subtables were found"
        );

        Ok(cmap)
    }

    /// The subtables to write, in the order of their encoding records.
    fn subtables(&self) -> Vec<(PlatformId, EncodingId, Subtable<'_>)> {
        let mut subtables = Vec::new();
        if let Some(data) = self.subtable_0_3_4 {
            subtables.push((
                PlatformId::UNICODE,
                EncodingId::UNICODE_BMP,
                Subtable::Verbatim(data),
            ));
        }
        if !self.subtable_0_5_14.is_empty() {
            subtables.push((
                PlatformId::UNICODE,
                EncodingId::UNICODE_VARIATION_SEQUENCES,
                Subtable::VariationSequences(&self.subtable_0_5_14),
            ));
        }
        if let Some(glyph_ids) = self.subtable_1_0_0 {
            subtables.push((
                PlatformId::MACINTOSH,
                EncodingId::MACINTOSH_APPLE_ROMAN,
                Subtable::MacRoman(glyph_ids),
            ));
        }
        match (self.subtable_3_0_4, self.subtable_3_1_4) {
            (Some(data), _) => subtables.push((
                PlatformId::WINDOWS,
                EncodingId::WINDOWS_SYMBOL,
                Subtable::Verbatim(data),
            )),
            // MS Symbol and MS Unicode subtables should not both be present
            (None, Some(data)) => subtables.push((
                PlatformId::WINDOWS,
                EncodingId::WINDOWS_UNICODE_BMP_UCS2,
                Subtable::Verbatim(data),
            )),
            (None, None) => {}
        }
        if !self.subtable_3_10_12.is_empty() {
            subtables.push((
                PlatformId::WINDOWS,
                EncodingId::WINDOWS_UNICODE_UCS4,
                Subtable::Groups(12, &self.subtable_3_10_12),
            ));
        }
        if !self.subtable_3_10_13.is_empty() {
            subtables.push((
                PlatformId::WINDOWS,
                EncodingId::WINDOWS_UNICODE_UCS4,
                Subtable::Groups(13, &self.subtable_3_10_13),
            ));
        }
        subtables
    }
}

/// Read the format, length and language of the subtable pointed to by `record`.
fn read_subtable_header(
    scope: ReadScope<'_>,
    record: EncodingRecord,
    data_offset: usize,
) -> Result<SubtableHeader, ParseError> {
    let offset = usize::try_from(record.offset)?;
    ensure!(
        offset >= data_offset && offset < scope.data().len(),
        ParseError::BadOffset,
        "cmap: bad subtable offset {}",
        offset
    );
    let mut ctxt = scope.offset(offset).ctxt();
    let format = ctxt.read_u16be()?;
    let length = match format {
        0 | 4 => usize::from(ctxt.read_u16be()?),
        12 | 13 => {
            ctxt.skip(size::U16)?;
            usize::try_from(ctxt.read_u32be()?)?
        }
        14 => usize::try_from(ctxt.read_u32be()?)?,
        _ => 0,
    };

    Ok(SubtableHeader {
        platform_id: record.platform_id,
        encoding_id: record.encoding_id,
        offset,
        format,
        length,
    })
}

/// Subtables must fit in the table and may only overlap a subtable with the same bytes.
fn check_subtable_layout(headers: &[SubtableHeader], table_len: usize) -> Result<(), ParseError> {
    let mut spans = Vec::with_capacity(headers.len());
    for header in headers {
        let end = header
            .offset
            .checked_add(header.length)
            .ok_or(ParseError::BadOffset)?;
        ensure!(
            end <= table_len,
            ParseError::BadOffset,
            "cmap: over long subtable {}-{}-{}",
            header.platform_id,
            header.encoding_id,
            header.format
        );
        if header.length != 0 {
            spans.push((header.offset, end));
        }
    }
    spans.sort_unstable();
    spans.dedup();

    // Ends sort before starts at the same offset so adjacent subtables do not overlap
    let mut events = spans
        .iter()
        .flat_map(|&(start, end)| [(start, true), (end, false)])
        .collect::<Vec<_>>();
    events.sort_unstable();
    let mut open = 0usize;
    for (offset, is_start) in events {
        if is_start {
            open += 1;
            ensure!(
                open <= 1,
                ParseError::BadOffset,
                "cmap: excessive overlap of subtables at {}",
                offset
            );
        } else {
            open = open.saturating_sub(1);
        }
    }

    Ok(())
}

impl<'b> ReadBinaryDep for Format4<'b> {
    type Args<'a> = u16;
    type HostType<'a> = Format4<'a>;

    fn read_dep<'a>(ctxt: &mut ReadCtxt<'a>, num_glyphs: u16) -> Result<Format4<'a>, ParseError> {
        let data = ctxt.scope().data();
        let _format = ctxt.read_u16be()?;
        let _length = ctxt.read_u16be()?;
        let language = ctxt.read_u16be()?;
        ensure!(
            language == 0,
            ParseError::BadValue,
            "cmap: format 4 language should be zero, got {}",
            language
        );

        let seg_count_x2 = ctxt.read_u16be()?;
        let search_range = ctxt.read_u16be()?;
        let entry_selector = ctxt.read_u16be()?;
        let range_shift = ctxt.read_u16be()?;
        ensure!(
            seg_count_x2 & 1 == 0 && search_range & 1 == 0,
            ParseError::BadValue,
            "cmap: bad format 4 segCountX2 {} or searchRange {}",
            seg_count_x2,
            search_range
        );
        let seg_count = seg_count_x2 >> 1;
        ensure!(
            seg_count != 0,
            ParseError::BadValue,
            "cmap: format 4 subtable has no segments"
        );
        check_search_params(
            u32::from(seg_count),
            search_range,
            entry_selector,
            range_shift,
        )?;

        let count = usize::from(seg_count);
        let end_codes = ctxt.read_array::<U16Be>(count)?;
        let reserved_pad = ctxt.read_u16be()?;
        ensure!(
            reserved_pad == 0,
            ParseError::BadValue,
            "cmap: non zero format 4 padding"
        );
        let start_codes = ctxt.read_array::<U16Be>(count)?;
        let id_deltas = ctxt.read_array::<I16Be>(count)?;
        let id_range_offsets_position = ctxt.offset();
        let id_range_offsets = ctxt.read_array::<U16Be>(count)?;

        let mut segments = Vec::with_capacity(count);
        for (i, id_range_offset) in id_range_offsets.iter().enumerate() {
            let mut id_range_offset = id_range_offset;
            if id_range_offset & 1 != 0 {
                // Some font generators write 0xFFFF for the terminating segment
                ensure!(
                    i == count - 1,
                    ParseError::BadValue,
                    "cmap: bad format 4 idRangeOffset {} in segment {}",
                    id_range_offset,
                    i
                );
                warn!("cmap: bad idRangeOffset in the last segment, ignoring it");
                id_range_offset = 0;
            }
            segments.push(Segment {
                start_code: start_codes.get_item(i).ok_or(ParseError::BadIndex)?,
                end_code: end_codes.get_item(i).ok_or(ParseError::BadIndex)?,
                id_delta: id_deltas.get_item(i).ok_or(ParseError::BadIndex)?,
                id_range_offset,
                id_range_offset_position: id_range_offsets_position + i * size::U16,
            });
        }

        for (i, (prev, segment)) in segments.iter().zip(segments.iter().skip(1)).enumerate() {
            let is_last = i + 2 == count;
            let is_terminator = |segment: &Segment| {
                segment.start_code == 0xFFFF && segment.end_code == 0xFFFF
            };
            if is_last && is_terminator(prev) && is_terminator(segment) {
                warn!("cmap: multiple 0xFFFF terminators found");
                continue;
            }
            ensure!(
                segment.end_code > prev.end_code,
                ParseError::BadValue,
                "cmap: out of order end code {} in segment {}",
                segment.end_code,
                i + 1
            );
            ensure!(
                segment.start_code > prev.end_code,
                ParseError::BadValue,
                "cmap: out of order start code {} in segment {}",
                segment.start_code,
                i + 1
            );
        }

        match segments.last() {
            Some(last) if last.end_code == 0xFFFF => {}
            _ => fail!(ParseError::BadValue, "cmap: final format 4 segment must end at 0xFFFF"),
        }

        // Resolve every code point to make sure all lookups stay in bounds
        for segment in &segments {
            for code_point in segment.start_code..=segment.end_code {
                let glyph = segment.lookup(data, code_point)?;
                ensure!(
                    glyph < num_glyphs,
                    ParseError::BadIndex,
                    "cmap: code point {:#06x} maps to glyph {}, but there are only {} glyphs",
                    code_point,
                    glyph,
                    num_glyphs
                );
            }
        }

        Ok(Format4 { data, segments })
    }
}

impl Segment {
    fn lookup(&self, data: &[u8], code_point: u16) -> Result<u16, ParseError> {
        // Glyph ids wrap modulo 65536
        let delta = self.id_delta as u16;
        if self.id_range_offset == 0 {
            return Ok(code_point.wrapping_add(delta));
        }

        let range_delta = usize::from(code_point - self.start_code);
        let glyph_id_offset =
            self.id_range_offset_position + usize::from(self.id_range_offset) + range_delta * 2;
        let glyph = match data.get(glyph_id_offset..glyph_id_offset + size::U16) {
            Some(&[hi, lo]) => u16::from_be_bytes([hi, lo]),
            _ => fail!(
                ParseError::BadOffset,
                "cmap: bad glyph id offset {} for code point {:#06x}",
                glyph_id_offset,
                code_point
            ),
        };
        if glyph == 0 {
            Ok(0)
        } else {
            Ok(glyph.wrapping_add(delta))
        }
    }
}

impl<'a> Format4<'a> {
    fn widen_char_range(&self, widen: &mut impl FnMut(u16, u16)) {
        for segment in &self.segments {
            widen(segment.start_code, segment.end_code);
        }
    }
}

fn check_search_params(
    seg_count: u32,
    search_range: u16,
    entry_selector: u16,
    range_shift: u16,
) -> Result<(), ParseError> {
    let (expected_search_range, expected_entry_selector, expected_range_shift) =
        search_params(seg_count, size::U16);
    ensure!(
        u32::from(search_range) == expected_search_range,
        ParseError::BadValue,
        "cmap: format 4 searchRange {} should be {}",
        search_range,
        expected_search_range
    );
    ensure!(
        u32::from(entry_selector) == expected_entry_selector,
        ParseError::BadValue,
        "cmap: format 4 entrySelector {} should be {}",
        entry_selector,
        expected_entry_selector
    );
    ensure!(
        u32::from(range_shift) == expected_range_shift,
        ParseError::BadValue,
        "cmap: format 4 rangeShift {} should be {}",
        range_shift,
        expected_range_shift
    );
    Ok(())
}

fn read_format0<'a>(scope: ReadScope<'a>) -> Result<&'a [u8], ParseError> {
    let mut ctxt = scope.ctxt();
    let _format = ctxt.read_u16be()?;
    let _length = ctxt.read_u16be()?;
    let language = ctxt.read_u16be()?;
    if language != 0 {
        warn!("cmap: format 0 language should be zero, got {}", language);
    }
    let glyph_ids = ctxt.read_slice(256)?;
    Ok(glyph_ids)
}

/// Read the groups of a format 12 or 13 subtable, checking the bounds every group shares.
fn read_groups<'a>(scope: ReadScope<'a>, format: u16) -> Result<ReadArray<'a, MapGroup>, ParseError> {
    let mut ctxt = scope.ctxt();
    ctxt.skip(8)?; // format, reserved, length
    let language = ctxt.read_u32be()?;
    ensure!(
        language == 0,
        ParseError::BadValue,
        "cmap: format {} language should be zero, got {}",
        format,
        language
    );
    let num_groups = ctxt.read_u32be()?;
    ensure!(
        num_groups != 0 && num_groups <= MAX_CMAP_GROUPS,
        ParseError::LimitExceeded,
        "cmap: bad format {} group count {}",
        format,
        num_groups
    );
    let groups = ctxt.read_array::<MapGroup>(usize::try_from(num_groups)?)?;

    for group in groups.iter() {
        ensure!(
            group.start_char_code <= UNICODE_UPPER_LIMIT
                && group.end_char_code <= UNICODE_UPPER_LIMIT
                && group.start_glyph_id <= 0xFFFF,
            ParseError::BadValue,
            "cmap: bad format {} group {:?}",
            format,
            group
        );
        let is_surrogate = |c: u32| (SURROGATES_START..=SURROGATES_END).contains(&c);
        ensure!(
            !is_surrogate(group.start_char_code)
                && !is_surrogate(group.end_char_code)
                && !(group.start_char_code < SURROGATES_START
                    && group.end_char_code > SURROGATES_END),
            ParseError::BadValue,
            "cmap: format {} group {:?} includes surrogates",
            format,
            group
        );
        ensure!(
            group.end_char_code >= group.start_char_code,
            ParseError::BadValue,
            "cmap: bad format {} group range {:?}",
            format,
            group
        );
    }

    for (prev, group) in groups.iter().zip(groups.iter().skip(1)) {
        ensure!(
            group.start_char_code > prev.start_char_code
                && group.start_char_code > prev.end_char_code,
            ParseError::BadValue,
            "cmap: overlapping format {} groups {:?} and {:?}",
            format,
            prev,
            group
        );
    }

    Ok(groups)
}

fn read_format12(scope: ReadScope<'_>, num_glyphs: u16) -> Result<Vec<MapGroup>, ParseError> {
    let groups = read_groups(scope, 12)?;
    for group in groups.iter() {
        // The bounds checks above rule out overflow
        let last_glyph_id = (group.end_char_code - group.start_char_code) + group.start_glyph_id;
        ensure!(
            last_glyph_id <= u32::from(num_glyphs),
            ParseError::BadIndex,
            "cmap: format 12 group {:?} maps past the last glyph",
            group
        );
    }
    Ok(groups.to_vec())
}

fn read_format13(scope: ReadScope<'_>, num_glyphs: u16) -> Result<Vec<MapGroup>, ParseError> {
    let groups = read_groups(scope, 13)?;
    for group in groups.iter() {
        ensure!(
            group.start_glyph_id < u32::from(num_glyphs),
            ParseError::BadIndex,
            "cmap: format 13 glyph id {} is too high",
            group.start_glyph_id
        );
    }
    Ok(groups.to_vec())
}

fn read_format14(scope: ReadScope<'_>) -> Result<Vec<VariationSelectorRecord>, ParseError> {
    let length = scope.data().len();
    let mut ctxt = scope.ctxt();
    ctxt.skip(size::U16 + size::U32)?; // format, length
    let num_records = ctxt.read_u32be()?;
    ensure!(
        num_records != 0 && num_records <= MAX_CMAP_SELECTOR_RECORDS,
        ParseError::LimitExceeded,
        "cmap: bad format 14 record count {}",
        num_records
    );
    let headers = ctxt.read_array::<VariationSelectorHeader>(usize::try_from(num_records)?)?;

    let mut last_selector = None;
    for header in headers.iter() {
        ensure!(
            VARIATION_SELECTORS
                .iter()
                .any(|&(start, end)| (start..=end).contains(&header.var_selector)),
            ParseError::BadValue,
            "cmap: bad variation selector {:#x}",
            header.var_selector
        );
        ensure!(
            last_selector.map_or(true, |last| header.var_selector > last),
            ParseError::BadValue,
            "cmap: variation selectors are not in order"
        );
        last_selector = Some(header.var_selector);
        ensure!(
            header.default_uvs_offset != 0 || header.non_default_uvs_offset != 0,
            ParseError::BadOffset,
            "cmap: variation selector {:#x} has no mappings",
            header.var_selector
        );
        for offset in [header.default_uvs_offset, header.non_default_uvs_offset] {
            ensure!(
                usize::try_from(offset)? < length,
                ParseError::BadOffset,
                "cmap: bad variation selector offset {}",
                offset
            );
        }
    }

    headers
        .iter()
        .map(|header| {
            let default_uvs = match header.default_uvs_offset {
                0 => Vec::new(),
                offset => read_default_uvs(scope.offset(usize::try_from(offset)?))?,
            };
            let non_default_uvs = match header.non_default_uvs_offset {
                0 => Vec::new(),
                offset => read_non_default_uvs(scope.offset(usize::try_from(offset)?))?,
            };
            Ok(VariationSelectorRecord {
                var_selector: header.var_selector,
                default_uvs,
                non_default_uvs,
            })
        })
        .collect()
}

fn read_default_uvs(scope: ReadScope<'_>) -> Result<Vec<UnicodeRange>, ParseError> {
    let mut ctxt = scope.ctxt();
    let num_ranges = ctxt.read_u32be()?;
    ensure!(
        num_ranges != 0 && num_ranges <= MAX_CMAP_GROUPS,
        ParseError::LimitExceeded,
        "cmap: bad default UVS range count {}",
        num_ranges
    );
    let ranges = ctxt.read_array::<UnicodeRange>(usize::try_from(num_ranges)?)?;

    let mut last_unicode_value = None;
    for range in ranges.iter() {
        let end = range.start_unicode_value + u32::from(range.additional_count);
        ensure!(
            range.start_unicode_value != 0
                && range.start_unicode_value <= UNICODE_UPPER_LIMIT
                && end <= UVS_UPPER_LIMIT
                && last_unicode_value.map_or(true, |last| range.start_unicode_value > last),
            ParseError::BadValue,
            "cmap: bad default UVS range {:?}",
            range
        );
        last_unicode_value = Some(end);
    }

    Ok(ranges.to_vec())
}

fn read_non_default_uvs(scope: ReadScope<'_>) -> Result<Vec<UvsMapping>, ParseError> {
    let mut ctxt = scope.ctxt();
    let num_mappings = ctxt.read_u32be()?;
    ensure!(
        num_mappings != 0 && num_mappings <= MAX_CMAP_GROUPS,
        ParseError::LimitExceeded,
        "cmap: bad non-default UVS mapping count {}",
        num_mappings
    );
    let mappings = ctxt.read_array::<UvsMapping>(usize::try_from(num_mappings)?)?;

    let mut last_unicode_value = None;
    for mapping in mappings.iter() {
        ensure!(
            mapping.glyph_id != 0
                && mapping.unicode_value != 0
                && mapping.unicode_value <= UNICODE_UPPER_LIMIT
                && last_unicode_value.map_or(true, |last| mapping.unicode_value > last),
            ParseError::BadValue,
            "cmap: bad non-default UVS mapping {:?}",
            mapping
        );
        last_unicode_value = Some(mapping.unicode_value);
    }

    Ok(mappings.to_vec())
}

/// A subtable as it will be written.
enum Subtable<'b> {
    Verbatim(&'b [u8]),
    MacRoman(&'b [u8]),
    Groups(u16, &'b [MapGroup]),
    VariationSequences(&'b [VariationSelectorRecord]),
}

impl<'a> WriteBinary<&Self> for CmapTable<'a> {
    type Output = ();

    /// Write the kept subtables after a directory of their encoding records.
    ///
    /// The subtable offsets are patched into the directory once the subtables are written.
    fn write<C: WriteContext>(ctxt: &mut C, cmap: &CmapTable<'a>) -> Result<(), WriteError> {
        let table_start = ctxt.bytes_written();
        let subtables = cmap.subtables();

        U16Be::write(ctxt, 0u16)?; // version
        U16Be::write(ctxt, u16::try_from(subtables.len())?)?;
        let mut offsets = Vec::with_capacity(subtables.len());
        for (platform_id, encoding_id, _) in &subtables {
            U16Be::write(ctxt, platform_id.0)?;
            U16Be::write(ctxt, encoding_id.0)?;
            offsets.push(ctxt.placeholder::<U32Be, u32>()?);
        }

        for ((_, _, subtable), placeholder) in subtables.iter().zip(offsets) {
            let offset = u32::try_from(ctxt.bytes_written() - table_start)?;
            ctxt.write_placeholder(placeholder, offset)?;
            match subtable {
                Subtable::Verbatim(data) => ctxt.write_bytes(data)?,
                Subtable::MacRoman(glyph_ids) => {
                    U16Be::write(ctxt, 0u16)?; // format
                    U16Be::write(ctxt, FORMAT0_LENGTH)?;
                    U16Be::write(ctxt, 0u16)?; // language
                    ctxt.write_bytes(glyph_ids)?;
                }
                Subtable::Groups(format, groups) => {
                    let length = GROUPS_HEADER_LENGTH + groups.len() * MapGroup::SIZE;
                    U16Be::write(ctxt, *format)?;
                    U16Be::write(ctxt, 0u16)?; // reserved
                    U32Be::write(ctxt, u32::try_from(length)?)?;
                    U32Be::write(ctxt, 0u32)?; // language
                    U32Be::write(ctxt, u32::try_from(groups.len())?)?;
                    ctxt.write_iter::<MapGroup, _>(groups.iter().copied())?;
                }
                Subtable::VariationSequences(records) => write_format14(ctxt, records)?,
            }
        }

        Ok(())
    }
}

fn write_format14<C: WriteContext>(
    ctxt: &mut C,
    records: &[VariationSelectorRecord],
) -> Result<(), WriteError> {
    let start = ctxt.bytes_written();
    U16Be::write(ctxt, 14u16)?;
    let length = ctxt.placeholder::<U32Be, u32>()?;
    U32Be::write(ctxt, u32::try_from(records.len())?)?;

    let mut offsets = Vec::with_capacity(records.len());
    for record in records {
        U24Be::write(ctxt, record.var_selector)?;
        let default_uvs = ctxt.placeholder::<U32Be, u32>()?;
        let non_default_uvs = ctxt.placeholder::<U32Be, u32>()?;
        offsets.push((default_uvs, non_default_uvs));
    }

    // Absent lists keep a zero offset
    for (record, (default_uvs, non_default_uvs)) in records.iter().zip(offsets) {
        if !record.default_uvs.is_empty() {
            let offset = u32::try_from(ctxt.bytes_written() - start)?;
            ctxt.write_placeholder(default_uvs, offset)?;
            U32Be::write(ctxt, u32::try_from(record.default_uvs.len())?)?;
            ctxt.write_iter::<UnicodeRange, _>(record.default_uvs.iter().copied())?;
        }
        if !record.non_default_uvs.is_empty() {
            let offset = u32::try_from(ctxt.bytes_written() - start)?;
            ctxt.write_placeholder(non_default_uvs, offset)?;
            U32Be::write(ctxt, u32::try_from(record.non_default_uvs.len())?)?;
            ctxt.write_iter::<UvsMapping, _>(record.non_default_uvs.iter().copied())?;
        }
    }

    let subtable_length = u32::try_from(ctxt.bytes_written() - start)?;
    ctxt.write_placeholder(length, subtable_length)
}

impl WriteBinary for MapGroup {
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, group: MapGroup) -> Result<(), WriteError> {
        U32Be::write(ctxt, group.start_char_code)?;
        U32Be::write(ctxt, group.end_char_code)?;
        U32Be::write(ctxt, group.start_glyph_id)
    }
}

impl WriteBinary for UnicodeRange {
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, range: UnicodeRange) -> Result<(), WriteError> {
        U24Be::write(ctxt, range.start_unicode_value)?;
        U8::write(ctxt, range.additional_count)
    }
}

impl WriteBinary for UvsMapping {
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, mapping: UvsMapping) -> Result<(), WriteError> {
        U24Be::write(ctxt, mapping.unicode_value)?;
        U16Be::write(ctxt, mapping.glyph_id)
    }
}

impl<'a> FontTable<'a> for CmapTable<'a> {
    const TAG: u32 = tag::CMAP;
    const REQUIRES: &'static [u32] = &[tag::MAXP];
    const USES: &'static [u32] = &[tag::OS_2];

    fn parse(file: &mut OpenTypeFile<'a>, scope: ReadScope<'a>) -> Result<Parsed<Self>, ParseError> {
        let num_glyphs = file
            .maxp
            .as_ref()
            .ok_or(ParseError::MissingTable(tag::MAXP))?
            .num_glyphs;
        let mut os2 = file.os2.as_mut();
        let cmap = CmapTable::read_subtables(scope, num_glyphs, |start, end| {
            if let Some(os2) = os2.as_mut() {
                os2.widen_char_range(start, end);
            }
        })?;
        Ok(Parsed::Table(cmap))
    }

    fn store(file: &mut OpenTypeFile<'a>, table: Option<Self>) {
        file.cmap = table;
    }

    fn is_present(file: &OpenTypeFile<'a>) -> bool {
        file.cmap.is_some()
    }

    fn serialise<C: WriteContext>(ctxt: &mut C, file: &OpenTypeFile<'a>) -> Result<(), WriteError> {
        let cmap = file.cmap.as_ref().ok_or(WriteError::MissingTable(tag::CMAP))?;
        CmapTable::write(ctxt, cmap)
    }
}
