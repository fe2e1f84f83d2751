//! `hdmx` table
//!
//! <https://docs.microsoft.com/en-us/typography/opentype/spec/hdmx>

use std::convert::TryFrom;

use crate::binary::read::{ReadCtxt, ReadScope};
use crate::binary::write::{WriteBinary, WriteContext};
use crate::binary::{I16Be, I32Be, U16Be, U8};
use crate::error::{ensure, ParseError, WriteError};
use crate::font::{FontTable, OpenTypeFile, Parsed};
use crate::tag;

/// `head.flags` bits that make integer scaling of advance widths meaningful.
const HEAD_FLAGS_INTEGER_SCALING: u16 = 0x14;

/// Horizontal device metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdmxTable<'a> {
    pub size_device_record: i32,
    /// Zero bytes after the widths of each record.
    pub pad_len: usize,
    pub records: Vec<DeviceRecord<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord<'a> {
    pub pixel_size: u8,
    pub max_width: u8,
    /// One width per glyph.
    pub widths: &'a [u8],
}

impl<'a> HdmxTable<'a> {
    /// Read device records holding `num_glyphs` widths each.
    pub fn read_records(
        ctxt: &mut ReadCtxt<'a>,
        num_glyphs: u16,
    ) -> Result<Parsed<HdmxTable<'a>>, ParseError> {
        let version = ctxt.read_u16be()?;
        let num_records = ctxt.read_i16be()?;
        let size_device_record = ctxt.read_i32be()?;
        if version != 0 {
            return Ok(Parsed::Dropped(format!("bad version: {}", version)));
        }
        if num_records <= 0 {
            return Ok(Parsed::Dropped(format!("bad numRecords: {}", num_records)));
        }
        let actual_size_device_record = i32::from(num_glyphs) + 2;
        if size_device_record < actual_size_device_record {
            return Ok(Parsed::Dropped(format!(
                "bad sizeDeviceRecord: {}",
                size_device_record
            )));
        }
        let pad_len = usize::try_from(size_device_record - actual_size_device_record)?;
        ensure!(
            pad_len <= 3,
            ParseError::BadValue,
            "hdmx: bad padding {}",
            pad_len
        );

        let mut records = Vec::with_capacity(usize::try_from(num_records)?);
        for _ in 0..num_records {
            let pixel_size = ctxt.read_u8()?;
            let max_width = ctxt.read_u8()?;
            if let Some(last) = records.last().map(|record: &DeviceRecord<'_>| record.pixel_size) {
                if pixel_size <= last {
                    return Ok(Parsed::Dropped(String::from("records are not sorted")));
                }
            }
            let widths = ctxt.read_slice(usize::from(num_glyphs))?;
            ctxt.skip(pad_len)?;
            records.push(DeviceRecord {
                pixel_size,
                max_width,
                widths,
            });
        }

        Ok(Parsed::Table(HdmxTable {
            size_device_record,
            pad_len,
            records,
        }))
    }
}

impl<'a> WriteBinary<&Self> for HdmxTable<'a> {
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, hdmx: &HdmxTable<'a>) -> Result<(), WriteError> {
        U16Be::write(ctxt, 0u16)?; // version
        I16Be::write(ctxt, i16::try_from(hdmx.records.len())?)?;
        I32Be::write(ctxt, hdmx.size_device_record)?;
        for record in &hdmx.records {
            U8::write(ctxt, record.pixel_size)?;
            U8::write(ctxt, record.max_width)?;
            ctxt.write_bytes(record.widths)?;
            ctxt.write_zeros(hdmx.pad_len)?;
        }

        Ok(())
    }
}

impl<'a> FontTable<'a> for HdmxTable<'a> {
    const TAG: u32 = tag::HDMX;
    const REQUIRES: &'static [u32] = &[tag::HEAD, tag::MAXP];

    fn parse(file: &mut OpenTypeFile<'a>, scope: ReadScope<'a>) -> Result<Parsed<Self>, ParseError> {
        let (head, maxp) = match (&file.head, &file.maxp) {
            (Some(head), Some(maxp)) => (head, maxp),
            (None, _) => return Err(ParseError::MissingTable(tag::HEAD)),
            (_, None) => return Err(ParseError::MissingTable(tag::MAXP)),
        };
        if head.flags & HEAD_FLAGS_INTEGER_SCALING == 0 {
            return Ok(Parsed::Dropped(String::from(
                "the table should not be present when bits 2 and 4 of head.flags are not set",
            )));
        }
        HdmxTable::read_records(&mut scope.ctxt(), maxp.num_glyphs)
    }

    fn store(file: &mut OpenTypeFile<'a>, table: Option<Self>) {
        file.hdmx = table;
    }

    fn is_present(file: &OpenTypeFile<'a>) -> bool {
        file.hdmx.is_some()
    }

    fn should_serialise(file: &OpenTypeFile<'a>) -> bool {
        Self::is_present(file) && file.has_glyf()
    }

    fn serialise<C: WriteContext>(ctxt: &mut C, file: &OpenTypeFile<'a>) -> Result<(), WriteError> {
        let hdmx = file.hdmx.as_ref().ok_or(WriteError::MissingTable(tag::HDMX))?;
        HdmxTable::write(ctxt, hdmx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::write::WriteBuffer;
    use crate::font::TableStatus;
    use crate::tests::fonts::file_with;
    use crate::tests::writer::{convert, TtfType::*};

    fn hdmx_data(version: u16, size_device_record: i32, pixel_sizes: &[u8]) -> Vec<u8> {
        let mut data = convert(&[
            UInt16(version),
            Int16(pixel_sizes.len() as i16),
            Int32(size_device_record),
        ]);
        for &pixel_size in pixel_sizes {
            data.extend_from_slice(&[pixel_size, 9, 5, 6, 7]);
            data.resize(data.len() + (size_device_record as usize).saturating_sub(5), 0);
        }
        data
    }

    #[test]
    fn test_read_and_write() {
        let data = hdmx_data(0, 8, &[9, 12]);
        let mut file = file_with(3, 0x4);
        assert_eq!(file.parse::<HdmxTable<'_>>(&data), Ok(TableStatus::Kept));
        let hdmx = file.hdmx.as_ref().unwrap();
        assert_eq!(hdmx.pad_len, 3);
        assert_eq!(hdmx.records[1].pixel_size, 12);
        assert_eq!(hdmx.records[1].widths, &[5, 6, 7]);

        let mut ctxt = WriteBuffer::new();
        HdmxTable::serialise(&mut ctxt, &file).unwrap();
        assert_eq!(ctxt.bytes(), &data[..]);
    }

    #[test]
    fn test_dropped() {
        // Integer scaling flags are not set
        let data = hdmx_data(0, 5, &[9]);
        let mut file = file_with(3, 0);
        assert!(matches!(
            file.parse::<HdmxTable<'_>>(&data),
            Ok(TableStatus::Dropped(_))
        ));
        assert!(file.hdmx.is_none());

        let tables = [
            hdmx_data(1, 5, &[9]),
            hdmx_data(0, 5, &[]),
            hdmx_data(0, 4, &[9]),
            hdmx_data(0, 5, &[9, 9]),
        ];
        let mut file = file_with(3, 0x10);
        for data in &tables {
            assert!(matches!(
                file.parse::<HdmxTable<'_>>(data),
                Ok(TableStatus::Dropped(_))
            ));
        }
    }

    #[test]
    fn test_bad_padding_is_fatal() {
        let data = hdmx_data(0, 9, &[9]);
        let mut file = file_with(3, 0x10);
        assert_eq!(
            file.parse::<HdmxTable<'_>>(&data),
            Err(ParseError::BadValue)
        );
    }

    #[test]
    fn test_only_serialised_with_glyf() {
        let data = hdmx_data(0, 5, &[9]);
        let mut file = file_with(3, 0x10);
        file.parse::<HdmxTable<'_>>(&data).unwrap();
        assert!(HdmxTable::is_present(&file));
        assert!(!HdmxTable::should_serialise(&file));
    }
}
