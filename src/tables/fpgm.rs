//! `fpgm` and `prep` tables
//!
//! Both hold TrueType instructions and are kept verbatim.
//!
//! <https://learn.microsoft.com/en-us/typography/opentype/spec/fpgm>
//! <https://learn.microsoft.com/en-us/typography/opentype/spec/prep>

use crate::binary::read::ReadScope;
use crate::binary::write::WriteContext;
use crate::error::{ensure, ParseError, WriteError};
use crate::font::{FontTable, OpenTypeFile, Parsed};
use crate::tables::MAX_INSTRUCTION_TABLE_LEN;
use crate::tag::{self, DisplayTag};

/// Font program, run once when the font is first used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FpgmTable<'a> {
    pub data: &'a [u8],
}

/// Control value program, run whenever the point size or transformation changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepTable<'a> {
    pub data: &'a [u8],
}

fn read_instructions(table: u32, scope: ReadScope<'_>) -> Result<&[u8], ParseError> {
    let data = scope.data();
    ensure!(
        data.len() < MAX_INSTRUCTION_TABLE_LEN,
        ParseError::LimitExceeded,
        "{}: length {} is too large",
        DisplayTag(table),
        data.len()
    );
    Ok(data)
}

impl<'a> FontTable<'a> for FpgmTable<'a> {
    const TAG: u32 = tag::FPGM;

    fn parse(_file: &mut OpenTypeFile<'a>, scope: ReadScope<'a>) -> Result<Parsed<Self>, ParseError> {
        let data = read_instructions(Self::TAG, scope)?;
        Ok(Parsed::Table(FpgmTable { data }))
    }

    fn store(file: &mut OpenTypeFile<'a>, table: Option<Self>) {
        file.fpgm = table;
    }

    fn is_present(file: &OpenTypeFile<'a>) -> bool {
        file.fpgm.is_some()
    }

    fn should_serialise(file: &OpenTypeFile<'a>) -> bool {
        Self::is_present(file) && file.has_glyf()
    }

    fn serialise<C: WriteContext>(ctxt: &mut C, file: &OpenTypeFile<'a>) -> Result<(), WriteError> {
        let fpgm = file.fpgm.as_ref().ok_or(WriteError::MissingTable(tag::FPGM))?;
        ctxt.write_bytes(fpgm.data)
    }
}

impl<'a> FontTable<'a> for PrepTable<'a> {
    const TAG: u32 = tag::PREP;

    fn parse(_file: &mut OpenTypeFile<'a>, scope: ReadScope<'a>) -> Result<Parsed<Self>, ParseError> {
        let data = read_instructions(Self::TAG, scope)?;
        Ok(Parsed::Table(PrepTable { data }))
    }

    fn store(file: &mut OpenTypeFile<'a>, table: Option<Self>) {
        file.prep = table;
    }

    fn is_present(file: &OpenTypeFile<'a>) -> bool {
        file.prep.is_some()
    }

    fn should_serialise(file: &OpenTypeFile<'a>) -> bool {
        Self::is_present(file) && file.has_glyf()
    }

    fn serialise<C: WriteContext>(ctxt: &mut C, file: &OpenTypeFile<'a>) -> Result<(), WriteError> {
        let prep = file.prep.as_ref().ok_or(WriteError::MissingTable(tag::PREP))?;
        ctxt.write_bytes(prep.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::write::WriteBuffer;

    #[test]
    fn test_read_and_write() {
        // PUSHB[0] 1, FDEF, ENDF
        let data = [0xB0, 0x01, 0x2C, 0x2D];
        let mut file = OpenTypeFile::new();
        file.parse::<FpgmTable<'_>>(&data).unwrap();
        file.parse::<PrepTable<'_>>(&data[..2]).unwrap();

        let mut ctxt = WriteBuffer::new();
        FpgmTable::serialise(&mut ctxt, &file).unwrap();
        PrepTable::serialise(&mut ctxt, &file).unwrap();
        assert_eq!(ctxt.bytes(), &[0xB0, 0x01, 0x2C, 0x2D, 0xB0, 0x01]);
        assert!(!FpgmTable::should_serialise(&file));
        assert!(!PrepTable::should_serialise(&file));
    }

    #[test]
    fn test_too_large() {
        let data = vec![0; MAX_INSTRUCTION_TABLE_LEN];
        let mut file = OpenTypeFile::new();
        assert_eq!(
            file.parse::<FpgmTable<'_>>(&data),
            Err(ParseError::LimitExceeded)
        );
        assert_eq!(
            file.parse::<PrepTable<'_>>(&data),
            Err(ParseError::LimitExceeded)
        );
        // Odd lengths are fine
        assert!(file.parse::<FpgmTable<'_>>(&data[..3]).is_ok());
    }
}
