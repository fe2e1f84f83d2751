#![deny(missing_docs)]

//! Write binary data
//!
//! Sanitised tables are serialised into a [WriteContext]. Values that are only known after
//! later data has been written, such as subtable offsets and lengths, are reserved with a
//! [Placeholder] and patched in afterwards.

use std::iter;
use std::marker::PhantomData;

use crate::binary::read::ReadUnchecked;
use crate::binary::{long_padding, I16Be, I32Be, I64Be, U16Be, U24Be, U32Be, U8};
use crate::checksum::ChecksumState;
use crate::error::WriteError;

/// An in-memory buffer that implements `WriteContext`.
///
/// The buffer keeps a running OpenType checksum of everything written to it, including
/// values patched into placeholders.
pub struct WriteBuffer {
    data: Vec<u8>,
    checksum: ChecksumState,
}

struct WriteSlice<'a> {
    offset: usize,
    data: &'a mut [u8],
}

/// A placeholder for a value that will be filled in later using WriteContext::write_placeholder
pub struct Placeholder<T, HostType>
where
    T: WriteBinary<HostType>,
{
    offset: usize,
    length: usize,
    marker: PhantomData<T>,
    host: PhantomData<HostType>,
}

/// Trait that describes a type that can be written to a `WriteContext` in binary form.
pub trait WriteBinary<HostType = Self> {
    /// The type of the value returned by `write`.
    type Output;

    /// Write the binary representation of Self to `ctxt`.
    fn write<C: WriteContext>(ctxt: &mut C, val: HostType) -> Result<Self::Output, WriteError>;
}

/// Trait that describes a type that can be written to a `WriteContext` in binary form with
/// dependent arguments.
pub trait WriteBinaryDep<HostType = Self> {
    /// The type of the arguments supplied to `write_dep`.
    type Args;
    /// The type of the value returned by `write_dep`.
    type Output;

    /// Write the binary representation of Self to `ctxt`.
    fn write_dep<C: WriteContext>(
        ctxt: &mut C,
        val: HostType,
        args: Self::Args,
    ) -> Result<Self::Output, WriteError>;
}

/// Trait for types that can have binary data written to them.
pub trait WriteContext {
    /// Write the values of an iterator into a `WriteContext`.
    fn write_iter<T, HostType>(
        &mut self,
        iter: impl Iterator<Item = HostType>,
    ) -> Result<(), WriteError>
    where
        Self: Sized,
        T: WriteBinary<HostType>,
    {
        for val in iter {
            T::write(self, val)?;
        }

        Ok(())
    }

    /// Write a slice of bytes to a `WriteContext`.
    fn write_bytes(&mut self, data: &[u8]) -> Result<(), WriteError>;

    /// Write the specified number of zero bytes to the `WriteContext`.
    fn write_zeros(&mut self, count: usize) -> Result<(), WriteError>;

    /// The total number of bytes written so far.
    ///
    /// This is the current position in the output stream.
    fn bytes_written(&self) -> usize;

    /// Write zero bytes until the position in the stream is 32-bit aligned.
    fn align_long(&mut self) -> Result<(), WriteError> {
        self.write_zeros(long_padding(self.bytes_written()))
    }

    /// Return a placeholder to `T` in the context for filling in later.
    fn placeholder<T, HostType>(&mut self) -> Result<Placeholder<T, HostType>, WriteError>
    where
        T: WriteBinary<HostType> + ReadUnchecked,
    {
        let offset = self.bytes_written();
        self.write_zeros(T::SIZE)?;

        Ok(Placeholder {
            offset,
            length: T::SIZE,
            marker: PhantomData,
            host: PhantomData,
        })
    }

    /// Consumes the placeholder and writes the supplied value into it
    fn write_placeholder<T, HostType>(
        &mut self,
        placeholder: Placeholder<T, HostType>,
        val: HostType,
    ) -> Result<T::Output, WriteError>
    where
        T: WriteBinary<HostType>;
}

impl<T> WriteBinary<T> for U8
where
    T: Into<u8>,
{
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, t: T) -> Result<(), WriteError> {
        let val: u8 = t.into();
        ctxt.write_bytes(&[val])
    }
}

impl<T> WriteBinary<T> for I16Be
where
    T: Into<i16>,
{
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, t: T) -> Result<(), WriteError> {
        let val: i16 = t.into();
        ctxt.write_bytes(&val.to_be_bytes())
    }
}

impl<T> WriteBinary<T> for U16Be
where
    T: Into<u16>,
{
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, t: T) -> Result<(), WriteError> {
        let val: u16 = t.into();
        ctxt.write_bytes(&val.to_be_bytes())
    }
}

impl<T> WriteBinary<T> for U24Be
where
    T: Into<u32>,
{
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, t: T) -> Result<(), WriteError> {
        let val: u32 = t.into();
        if val > 0xFF_FFFF {
            return Err(WriteError::BadValue);
        }
        ctxt.write_bytes(&val.to_be_bytes()[1..4])
    }
}

impl<T> WriteBinary<T> for I32Be
where
    T: Into<i32>,
{
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, t: T) -> Result<(), WriteError> {
        let val: i32 = t.into();
        ctxt.write_bytes(&val.to_be_bytes())
    }
}

impl<T> WriteBinary<T> for U32Be
where
    T: Into<u32>,
{
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, t: T) -> Result<(), WriteError> {
        let val: u32 = t.into();
        ctxt.write_bytes(&val.to_be_bytes())
    }
}

impl<T> WriteBinary<T> for I64Be
where
    T: Into<i64>,
{
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, t: T) -> Result<(), WriteError> {
        let val: i64 = t.into();
        ctxt.write_bytes(&val.to_be_bytes())
    }
}

impl WriteContext for WriteBuffer {
    fn write_bytes(&mut self, data: &[u8]) -> Result<(), WriteError> {
        self.checksum.update(self.data.len(), data);
        self.data.extend(data.iter());
        Ok(())
    }

    fn write_zeros(&mut self, count: usize) -> Result<(), WriteError> {
        // Zeros do not contribute to the checksum
        let zeros = iter::repeat(0).take(count);
        self.data.extend(zeros);
        Ok(())
    }

    fn bytes_written(&self) -> usize {
        self.data.len()
    }

    fn write_placeholder<T, HostType>(
        &mut self,
        placeholder: Placeholder<T, HostType>,
        val: HostType,
    ) -> Result<T::Output, WriteError>
    where
        T: WriteBinary<HostType>,
    {
        let end = placeholder
            .offset
            .checked_add(placeholder.length)
            .ok_or(WriteError::PlaceholderMismatch)?;
        let data = self
            .data
            .get_mut(placeholder.offset..end)
            .ok_or(WriteError::PlaceholderMismatch)?;
        // Placeholders are zero filled, so the patched bytes are simply added to the sum.
        let mut slice = WriteSlice { offset: 0, data };
        let output = T::write(&mut slice, val)?;
        self.checksum
            .update(placeholder.offset, &self.data[placeholder.offset..end]);
        Ok(output)
    }
}

impl<'a> WriteContext for WriteSlice<'a> {
    fn write_bytes(&mut self, data: &[u8]) -> Result<(), WriteError> {
        let end = self.offset + data.len();
        match self.data.get_mut(self.offset..end) {
            Some(subslice) => {
                subslice.copy_from_slice(data);
                self.offset = end;
                Ok(())
            }
            None => Err(WriteError::BadValue),
        }
    }

    fn write_zeros(&mut self, count: usize) -> Result<(), WriteError> {
        let end = self.offset + count;
        match self.data.get_mut(self.offset..end) {
            Some(subslice) => {
                subslice.fill(0);
                self.offset = end;
                Ok(())
            }
            None => Err(WriteError::BadValue),
        }
    }

    fn bytes_written(&self) -> usize {
        self.offset
    }

    fn write_placeholder<T, HostType>(
        &mut self,
        _placeholder: Placeholder<T, HostType>,
        _val: HostType,
    ) -> Result<T::Output, WriteError>
    where
        T: WriteBinary<HostType>,
    {
        Err(WriteError::NotImplemented)
    }
}

impl WriteBuffer {
    /// Create a new, empty `WriteBuffer`
    pub fn new() -> Self {
        WriteBuffer {
            data: Vec::new(),
            checksum: ChecksumState::new(),
        }
    }

    /// Retrieve a slice of the data held by this buffer
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the current size of the data held by this buffer
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// The checksum of the data written since the checksum was last reset.
    pub fn checksum(&self) -> u32 {
        self.checksum.value()
    }

    /// Capture the current checksum so it can be restored after a reset.
    pub fn save_checksum(&self) -> ChecksumState {
        self.checksum
    }

    /// Start a new checksum from the current position.
    pub fn reset_checksum(&mut self) {
        self.checksum = ChecksumState::new();
    }

    /// Add a previously saved checksum back into the running checksum.
    ///
    /// After `save`, `reset`, writing some data and `restore` the checksum covers all data
    /// as if it had never been reset.
    pub fn restore_checksum(&mut self, saved: ChecksumState) {
        self.checksum.combine(saved);
    }

    /// Consume `self` and return the inner buffer
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl Default for WriteBuffer {
    fn default() -> Self {
        WriteBuffer::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::table_checksum;
    use crate::tag;

    struct TestTable {
        tag: u32,
    }

    struct BigStruct {
        tag: u32,
    }

    impl WriteBinary<Self> for TestTable {
        type Output = ();

        fn write<C: WriteContext>(ctxt: &mut C, val: Self) -> Result<(), WriteError> {
            U32Be::write(ctxt, val.tag)
        }
    }

    impl WriteBinary<&Self> for BigStruct {
        type Output = ();

        fn write<C: WriteContext>(ctxt: &mut C, val: &Self) -> Result<(), WriteError> {
            U32Be::write(ctxt, val.tag)
        }
    }

    #[test]
    fn test_basic() {
        let mut ctxt = WriteBuffer::new();
        let table = TestTable { tag: tag::GLYF };
        let big = BigStruct { tag: tag::LOCA };

        TestTable::write(&mut ctxt, table).unwrap();
        BigStruct::write(&mut ctxt, &big).unwrap();

        assert_eq!(ctxt.bytes(), b"glyfloca")
    }

    #[test]
    fn test_write_u24be() {
        let mut ctxt = WriteBuffer::new();
        U24Be::write(&mut ctxt, 0x10203u32).unwrap();
        assert_eq!(ctxt.bytes(), &[1, 2, 3]);

        // Check out of range value
        match U24Be::write(&mut ctxt, u32::MAX) {
            Err(WriteError::BadValue) => {}
            _ => panic!("Expected WriteError::BadValue"),
        }
    }

    #[test]
    fn test_write_placeholder() {
        let mut ctxt = WriteBuffer::new();
        U8::write(&mut ctxt, 1).unwrap();
        let placeholder = ctxt.placeholder::<U16Be, u16>().unwrap();
        U8::write(&mut ctxt, 3).unwrap();
        ctxt.write_placeholder(placeholder, 2).unwrap();
        assert_eq!(ctxt.bytes(), &[1, 0, 2, 3]);
    }

    #[test]
    fn test_write_placeholder_past_end() {
        let mut ctxt = WriteBuffer::new();
        U16Be::write(&mut ctxt, 1u16).unwrap();
        let placeholder: Placeholder<U32Be, u32> = Placeholder {
            offset: 0,
            length: 4,
            marker: PhantomData,
            host: PhantomData,
        };
        assert_eq!(
            ctxt.write_placeholder(placeholder, 2),
            Err(WriteError::PlaceholderMismatch)
        );
    }

    #[test]
    fn test_checksum_includes_placeholders() {
        let mut ctxt = WriteBuffer::new();
        U16Be::write(&mut ctxt, 0xABCDu16).unwrap();
        let placeholder = ctxt.placeholder::<U32Be, u32>().unwrap();
        U8::write(&mut ctxt, 7).unwrap();
        ctxt.write_placeholder(placeholder, 0x1234_5678).unwrap();

        let expected = table_checksum(ctxt.bytes()).unwrap();
        assert_eq!(ctxt.checksum(), expected.0);
    }

    #[test]
    fn test_checksum_save_reset_restore() {
        let mut ctxt = WriteBuffer::new();
        U32Be::write(&mut ctxt, 5u32).unwrap();
        let saved = ctxt.save_checksum();
        ctxt.reset_checksum();
        U32Be::write(&mut ctxt, 7u32).unwrap();
        assert_eq!(ctxt.checksum(), 7);
        ctxt.restore_checksum(saved);
        assert_eq!(ctxt.checksum(), 12);
    }

    #[test]
    fn test_align_long() {
        let mut ctxt = WriteBuffer::new();
        U8::write(&mut ctxt, 1).unwrap();
        ctxt.align_long().unwrap();
        assert_eq!(ctxt.len(), 4);
        ctxt.align_long().unwrap();
        assert_eq!(ctxt.len(), 4);
    }
}
