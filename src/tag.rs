//! Table tags.

use std::fmt;

/// Generate a 4-byte font table tag from byte string
///
/// Example:
///
/// ```ignore
/// assert_eq!(tag!(b"glyf"), 0x676C7966);
/// ```
macro_rules! tag {
    ($w:expr) => {
        tag(*$w)
    };
}

/// Wrapper that formats a tag as its four characters, e.g. `glyf`.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct DisplayTag(pub u32);

const fn tag(chars: [u8; 4]) -> u32 {
    u32::from_be_bytes(chars)
}

impl fmt::Display for DisplayTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_be_bytes();
        if bytes.iter().any(|&b| !b.is_ascii() || b.is_ascii_control()) {
            write!(f, "0x{:08x}", self.0)
        } else {
            let s: String = bytes.iter().map(|&b| char::from(b)).collect();
            s.fmt(f)
        }
    }
}

impl fmt::Debug for DisplayTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_string().fmt(f)
    }
}

pub const CFF: u32 = tag!(b"CFF ");
pub const CMAP: u32 = tag!(b"cmap");
pub const CVT: u32 = tag!(b"cvt ");
pub const FPGM: u32 = tag!(b"fpgm");
pub const GASP: u32 = tag!(b"gasp");
pub const GLYF: u32 = tag!(b"glyf");
pub const HDMX: u32 = tag!(b"hdmx");
pub const HEAD: u32 = tag!(b"head");
pub const KERN: u32 = tag!(b"kern");
pub const LOCA: u32 = tag!(b"loca");
pub const MAXP: u32 = tag!(b"maxp");
pub const OS_2: u32 = tag!(b"OS/2");
pub const PREP: u32 = tag!(b"prep");
pub const VDMX: u32 = tag!(b"VDMX");
pub const VORG: u32 = tag!(b"VORG");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_tag() {
        assert_eq!(DisplayTag(OS_2).to_string(), "OS/2");
        assert_eq!(DisplayTag(CVT).to_string(), "cvt ");
        assert_eq!(DisplayTag(0x0001_0000).to_string(), "0x00010000");
    }
}
