//! Error types

use crate::binary::read::ReadEof;
use crate::tag::DisplayTag;
use std::fmt;

/// Errors that originate when parsing binary data
///
/// When returned from a table parser the table is unsalvageable and the font must be rejected.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum ParseError {
    BadEof,
    BadValue,
    BadVersion,
    BadOffset,
    BadIndex,
    LimitExceeded,
    MissingValue,
    MissingTable(u32),
}

impl From<ReadEof> for ParseError {
    fn from(_error: ReadEof) -> Self {
        ParseError::BadEof
    }
}

impl From<std::num::TryFromIntError> for ParseError {
    fn from(_error: std::num::TryFromIntError) -> Self {
        ParseError::BadValue
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::BadEof => write!(f, "end of data reached unexpectedly"),
            ParseError::BadValue => write!(f, "invalid value"),
            ParseError::BadVersion => write!(f, "unexpected data version"),
            ParseError::BadOffset => write!(f, "invalid data offset"),
            ParseError::BadIndex => write!(f, "invalid data index"),
            ParseError::LimitExceeded => write!(f, "limit exceeded"),
            ParseError::MissingValue => write!(f, "an expected data value was missing"),
            ParseError::MissingTable(tag) => {
                write!(f, "font is missing '{}' table", DisplayTag(*tag))
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Errors that originate when writing binary data
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum WriteError {
    BadValue,
    NotImplemented,
    PlaceholderMismatch,
    MissingTable(u32),
}

impl From<std::num::TryFromIntError> for WriteError {
    fn from(_error: std::num::TryFromIntError) -> Self {
        WriteError::BadValue
    }
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteError::BadValue => write!(f, "write: bad value"),
            WriteError::NotImplemented => write!(f, "writing in this format is not implemented"),
            WriteError::PlaceholderMismatch => {
                write!(f, "data written to placeholder did not match expected size")
            }
            WriteError::MissingTable(tag) => {
                write!(f, "write: '{}' table has not been parsed", DisplayTag(*tag))
            }
        }
    }
}

impl std::error::Error for WriteError {}

/// Reasons a whole font is rejected by the sanitiser.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum SanitiseError {
    /// A table failed validation.
    Parse { tag: u32, error: ParseError },
    /// A table could not be written.
    Write { tag: u32, error: WriteError },
    /// A table requires another table that is not present in the font.
    MissingDependency { tag: u32, dependency: u32 },
    /// The same table appears more than once.
    DuplicateTable(u32),
    /// The table dependencies could not be ordered.
    DependencyCycle,
}

impl fmt::Display for SanitiseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SanitiseError::Parse { tag, error } => {
                write!(f, "'{}' table: {}", DisplayTag(*tag), error)
            }
            SanitiseError::Write { tag, error } => {
                write!(f, "'{}' table: {}", DisplayTag(*tag), error)
            }
            SanitiseError::MissingDependency { tag, dependency } => write!(
                f,
                "'{}' table requires the '{}' table",
                DisplayTag(*tag),
                DisplayTag(*dependency)
            ),
            SanitiseError::DuplicateTable(tag) => {
                write!(f, "'{}' table appears more than once", DisplayTag(*tag))
            }
            SanitiseError::DependencyCycle => write!(f, "table dependencies form a cycle"),
        }
    }
}

impl std::error::Error for SanitiseError {}

/// Log `reason` and return `error` from the enclosing function.
///
/// The reason is the human readable explanation of a rejected table, the returned error is
/// what callers act on.
macro_rules! fail {
    ($error:expr, $($reason:tt)+) => {{
        log::debug!($($reason)+);
        return Err($error.into());
    }};
}

/// Fail with `error` unless `cond` holds, see [fail].
macro_rules! ensure {
    ($cond:expr, $error:expr, $($reason:tt)+) => {
        if !$cond {
            $crate::error::fail!($error, $($reason)+);
        }
    };
}

pub(crate) use {ensure, fail};
