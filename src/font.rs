//! The per-font aggregate of sanitised tables and the contract every table implements.
//!
//! Each supported table kind implements [FontTable]. A table is parsed from its raw bytes into
//! a record that is stored in the [OpenTypeFile]. Parsing may read, and repair, records of
//! tables parsed before it, which is why every table declares the tables it depends on.

use log::warn;
use rustc_hash::FxHashSet;

use crate::binary::read::ReadScope;
use crate::binary::write::WriteContext;
use crate::error::{fail, ParseError, WriteError};
use crate::tables::cmap::CmapTable;
use crate::tables::cvt::CvtTable;
use crate::tables::fpgm::{FpgmTable, PrepTable};
use crate::tables::gasp::GaspTable;
use crate::tables::glyf::GlyfTable;
use crate::tables::hdmx::HdmxTable;
use crate::tables::kern::KernTable;
use crate::tables::loca::LocaTable;
use crate::tables::os2::Os2Table;
use crate::tables::vdmx::VdmxTable;
use crate::tables::vorg::VorgTable;
use crate::tables::{HeadTable, MaxpTable};
use crate::tag::{self, DisplayTag};

/// Outcome of successfully reading a table.
#[derive(Debug)]
pub enum Parsed<T> {
    /// The table is valid, possibly after in-place repairs.
    Table(T),
    /// The table is not usable but the font remains valid without it.
    Dropped(String),
}

/// What happened to a table handed to [OpenTypeFile::parse_table].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableStatus {
    Kept,
    Dropped(String),
}

/// A table kind supported by the sanitiser.
pub trait FontTable<'a>: Sized {
    /// The tag of the table.
    const TAG: u32;

    /// Tables that must be parsed before this one.
    const REQUIRES: &'static [u32] = &[];

    /// Tables that are read or repaired when present, and so must be parsed first if they are.
    const USES: &'static [u32] = &[];

    /// Validate `scope` and build the record for this table.
    ///
    /// Records of the tables named in `REQUIRES` and `USES` are available in `file` and may be
    /// modified.
    fn parse(file: &mut OpenTypeFile<'a>, scope: ReadScope<'a>)
        -> Result<Parsed<Self>, ParseError>;

    /// Store `table` in `file`, replacing any previous record. `None` removes it.
    fn store(file: &mut OpenTypeFile<'a>, table: Option<Self>);

    /// True if `file` holds a record of this table.
    fn is_present(file: &OpenTypeFile<'a>) -> bool;

    /// True if this table should be part of the sanitised font.
    fn should_serialise(file: &OpenTypeFile<'a>) -> bool {
        Self::is_present(file)
    }

    /// Write the sanitised table.
    fn serialise<C: WriteContext>(ctxt: &mut C, file: &OpenTypeFile<'a>) -> Result<(), WriteError>;
}

/// A table kind supported by the sanitiser, used to dispatch on table tags.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableKind {
    Head,
    Maxp,
    Os2,
    Cmap,
    Loca,
    Glyf,
    Hdmx,
    Vdmx,
    Kern,
    Vorg,
    Gasp,
    Cvt,
    Fpgm,
    Prep,
}

/// The sanitised records of a single font.
///
/// Tables that borrow from the input hold slices with lifetime `'a`.
#[derive(Debug, Default)]
pub struct OpenTypeFile<'a> {
    pub head: Option<HeadTable>,
    pub maxp: Option<MaxpTable>,
    pub os2: Option<Os2Table>,
    pub cmap: Option<CmapTable<'a>>,
    pub loca: Option<LocaTable>,
    pub glyf: Option<GlyfTable<'a>>,
    pub hdmx: Option<HdmxTable<'a>>,
    pub vdmx: Option<VdmxTable>,
    pub kern: Option<KernTable>,
    pub vorg: Option<VorgTable>,
    pub gasp: Option<GaspTable>,
    pub cvt: Option<CvtTable<'a>>,
    pub fpgm: Option<FpgmTable<'a>>,
    pub prep: Option<PrepTable<'a>>,
    /// Tags of tables present in the font that are handled elsewhere, such as `CFF `.
    external: FxHashSet<u32>,
}

macro_rules! dispatch {
    ($kind:expr, $func:ident ( $($arg:expr),* )) => {
        match $kind {
            TableKind::Head => $func::<HeadTable>($($arg),*),
            TableKind::Maxp => $func::<MaxpTable>($($arg),*),
            TableKind::Os2 => $func::<Os2Table>($($arg),*),
            TableKind::Cmap => $func::<CmapTable<'_>>($($arg),*),
            TableKind::Loca => $func::<LocaTable>($($arg),*),
            TableKind::Glyf => $func::<GlyfTable<'_>>($($arg),*),
            TableKind::Hdmx => $func::<HdmxTable<'_>>($($arg),*),
            TableKind::Vdmx => $func::<VdmxTable>($($arg),*),
            TableKind::Kern => $func::<KernTable>($($arg),*),
            TableKind::Vorg => $func::<VorgTable>($($arg),*),
            TableKind::Gasp => $func::<GaspTable>($($arg),*),
            TableKind::Cvt => $func::<CvtTable<'_>>($($arg),*),
            TableKind::Fpgm => $func::<FpgmTable<'_>>($($arg),*),
            TableKind::Prep => $func::<PrepTable<'_>>($($arg),*),
        }
    };
}

impl TableKind {
    /// Every supported table, in the order used to break ties when ordering dependencies.
    pub const ALL: [TableKind; 14] = [
        TableKind::Head,
        TableKind::Maxp,
        TableKind::Os2,
        TableKind::Cmap,
        TableKind::Loca,
        TableKind::Glyf,
        TableKind::Hdmx,
        TableKind::Vdmx,
        TableKind::Kern,
        TableKind::Vorg,
        TableKind::Gasp,
        TableKind::Cvt,
        TableKind::Fpgm,
        TableKind::Prep,
    ];

    pub fn from_tag(tag: u32) -> Option<TableKind> {
        TableKind::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    pub fn tag(self) -> u32 {
        dispatch!(self, tag_of())
    }

    /// Tables that must be present and parsed before this one.
    pub fn requires(self) -> &'static [u32] {
        dispatch!(self, requires_of())
    }

    /// Tables that must be parsed before this one if they are present.
    pub fn uses(self) -> &'static [u32] {
        dispatch!(self, uses_of())
    }
}

fn tag_of<'a, T: FontTable<'a>>() -> u32 {
    T::TAG
}

fn requires_of<'a, T: FontTable<'a>>() -> &'static [u32] {
    T::REQUIRES
}

fn uses_of<'a, T: FontTable<'a>>() -> &'static [u32] {
    T::USES
}

fn parse_as<'a, T: FontTable<'a>>(
    file: &mut OpenTypeFile<'a>,
    data: &'a [u8],
) -> Result<TableStatus, ParseError> {
    file.parse::<T>(data)
}

fn is_present_as<'a, T: FontTable<'a>>(file: &OpenTypeFile<'a>) -> bool {
    T::is_present(file)
}

fn should_serialise_as<'a, T: FontTable<'a>>(file: &OpenTypeFile<'a>) -> bool {
    T::should_serialise(file)
}

fn serialise_as<'a, T: FontTable<'a>>(
    file: &OpenTypeFile<'a>,
    ctxt: &mut impl WriteContext,
) -> Result<(), WriteError> {
    T::serialise(ctxt, file)
}

fn free_as<'a, T: FontTable<'a>>(file: &mut OpenTypeFile<'a>) {
    T::store(file, None)
}

impl<'a> OpenTypeFile<'a> {
    pub fn new() -> Self {
        OpenTypeFile::default()
    }

    /// Parse `data` as table `T` and store the resulting record.
    ///
    /// Fails with `MissingTable` if a table `T` requires has not been parsed. A dropped table
    /// leaves no record behind.
    pub fn parse<T: FontTable<'a>>(&mut self, data: &'a [u8]) -> Result<TableStatus, ParseError> {
        for &dependency in T::REQUIRES {
            if !self.has_table(dependency) {
                fail!(
                    ParseError::MissingTable(dependency),
                    "{}: '{}' table must be parsed first",
                    DisplayTag(T::TAG),
                    DisplayTag(dependency)
                );
            }
        }

        match T::parse(self, ReadScope::new(data))? {
            Parsed::Table(table) => {
                T::store(self, Some(table));
                Ok(TableStatus::Kept)
            }
            Parsed::Dropped(reason) => {
                warn!("{}: table discarded: {}", DisplayTag(T::TAG), reason);
                T::store(self, None);
                Ok(TableStatus::Dropped(reason))
            }
        }
    }

    pub fn parse_table(
        &mut self,
        kind: TableKind,
        data: &'a [u8],
    ) -> Result<TableStatus, ParseError> {
        dispatch!(kind, parse_as(self, data))
    }

    pub fn should_serialise_table(&self, kind: TableKind) -> bool {
        dispatch!(kind, should_serialise_as(self))
    }

    pub fn serialise_table<C: WriteContext>(
        &self,
        kind: TableKind,
        ctxt: &mut C,
    ) -> Result<(), WriteError> {
        dispatch!(kind, serialise_as(self, ctxt))
    }

    /// Release the record of a table. Does nothing if there is no record.
    pub fn free_table(&mut self, kind: TableKind) {
        dispatch!(kind, free_as(self))
    }

    /// Record that the font contains a table that is validated elsewhere.
    pub fn add_external_table(&mut self, tag: u32) {
        self.external.insert(tag);
    }

    /// True if the font has a record for the table `tag`, or holds it as an external table.
    pub fn has_table(&self, tag: u32) -> bool {
        match TableKind::from_tag(tag) {
            Some(kind) => dispatch!(kind, is_present_as(self)),
            None => self.external.contains(&tag),
        }
    }

    /// True if the font has TrueType outlines.
    pub fn has_glyf(&self) -> bool {
        self.glyf.is_some()
    }

    /// True if the font has CFF outlines.
    pub fn has_cff(&self) -> bool {
        self.external.contains(&tag::CFF)
    }
}
