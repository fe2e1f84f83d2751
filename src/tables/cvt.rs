//! `cvt ` table
//!
//! <https://learn.microsoft.com/en-us/typography/opentype/spec/cvt>

use crate::binary::read::ReadScope;
use crate::binary::write::WriteContext;
use crate::error::{ensure, ParseError, WriteError};
use crate::font::{FontTable, OpenTypeFile, Parsed};
use crate::tables::MAX_INSTRUCTION_TABLE_LEN;
use crate::tag;

/// Control Value Table, kept verbatim.
///
/// The table is a list of `FWORD` values, so its length must be even.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CvtTable<'a> {
    pub data: &'a [u8],
}

impl<'a> CvtTable<'a> {
    pub fn read_table(scope: ReadScope<'a>) -> Result<CvtTable<'a>, ParseError> {
        let data = scope.data();
        ensure!(
            data.len() % 2 == 0,
            ParseError::BadValue,
            "cvt: length {} is odd",
            data.len()
        );
        ensure!(
            data.len() < MAX_INSTRUCTION_TABLE_LEN,
            ParseError::LimitExceeded,
            "cvt: length {} is too large",
            data.len()
        );

        Ok(CvtTable { data })
    }
}

impl<'a> FontTable<'a> for CvtTable<'a> {
    const TAG: u32 = tag::CVT;

    fn parse(_file: &mut OpenTypeFile<'a>, scope: ReadScope<'a>) -> Result<Parsed<Self>, ParseError> {
        CvtTable::read_table(scope).map(Parsed::Table)
    }

    fn store(file: &mut OpenTypeFile<'a>, table: Option<Self>) {
        file.cvt = table;
    }

    fn is_present(file: &OpenTypeFile<'a>) -> bool {
        file.cvt.is_some()
    }

    fn should_serialise(file: &OpenTypeFile<'a>) -> bool {
        Self::is_present(file) && file.has_glyf()
    }

    fn serialise<C: WriteContext>(ctxt: &mut C, file: &OpenTypeFile<'a>) -> Result<(), WriteError> {
        let cvt = file.cvt.as_ref().ok_or(WriteError::MissingTable(tag::CVT))?;
        ctxt.write_bytes(cvt.data)
    }
}
