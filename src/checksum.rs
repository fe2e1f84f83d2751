#![deny(missing_docs)]

use std::num::Wrapping;

use crate::binary::read::ReadScope;
use crate::binary::U32Be;
use crate::error::ParseError;

/// Calculate a checksum of `data` according to the OpenType table checksum algorithm
///
/// Data that does not end on a 32-bit boundary is treated as if padded with zeros.
///
/// https://docs.microsoft.com/en-us/typography/opentype/spec/otff#calculating-checksums
pub fn table_checksum(data: &[u8]) -> Result<Wrapping<u32>, ParseError> {
    let mut ctxt = ReadScope::new(data).ctxt();
    let array = ctxt.read_array::<U32Be>(data.len() / 4)?;
    let tail = ctxt.read_slice(data.len() % 4)?;
    let mut state = ChecksumState::new();
    state.update(data.len() - tail.len(), tail);
    Ok(array.iter().map(Wrapping).sum::<Wrapping<u32>>() + Wrapping(state.value()))
}

/// A running OpenType checksum over bytes written at known offsets.
///
/// Each byte contributes according to its position within its 32-bit word, so bytes may be
/// folded in out of order, which is what patching a placeholder does.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ChecksumState {
    sum: Wrapping<u32>,
}

impl ChecksumState {
    /// A checksum over no data.
    pub fn new() -> Self {
        ChecksumState::default()
    }

    /// Fold `data`, located at `offset` in the stream, into the checksum.
    pub fn update(&mut self, offset: usize, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            let shift = 24 - 8 * ((offset + i) % 4);
            self.sum += Wrapping(u32::from(byte) << shift);
        }
    }

    /// Add the sum held by `other` to this one.
    pub fn combine(&mut self, other: ChecksumState) {
        self.sum += other.sum;
    }

    /// The current value of the checksum.
    pub fn value(&self) -> u32 {
        self.sum.0
    }
}

#[cfg(test)]
mod tests {
    use super::{ChecksumState, Wrapping};

    #[test]
    fn test_table_checksum() {
        let data = [0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0, 4];

        assert_eq!(super::table_checksum(&data).unwrap(), Wrapping(10));
    }

    #[test]
    fn test_table_checksum_overflow() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 2];

        assert_eq!(super::table_checksum(&data).unwrap(), Wrapping(1));
    }

    #[test]
    fn test_table_checksum_unaligned() {
        let data = [0, 0, 0, 1, 0x02];

        assert_eq!(super::table_checksum(&data).unwrap(), Wrapping(0x0200_0001));
    }

    #[test]
    fn test_running_checksum_matches_table_checksum() {
        let data = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];
        let mut state = ChecksumState::new();
        // Out of order, split across word boundaries
        state.update(5, &data[5..]);
        state.update(0, &data[..5]);
        assert_eq!(
            Wrapping(state.value()),
            super::table_checksum(&data).unwrap()
        );
    }
}
