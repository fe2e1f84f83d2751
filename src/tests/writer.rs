//! Big-endian table builders shared by the unit and integration tests.

#![allow(dead_code)]

// The writer module is derived from ttf-parser, licenced under Apache-2.0.
// https://github.com/RazrFalcon/ttf-parser/blob/439aaaebd50eb8aed66302e3c1b51fae047f85b2/src/writer.rs

#[allow(missing_debug_implementations)]
#[derive(Clone, Copy)]
pub enum TtfType {
    Raw(&'static [u8]),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    UInt24(u32),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
}

pub fn convert(values: &[TtfType]) -> Vec<u8> {
    let mut data = Vec::with_capacity(256);
    for v in values {
        convert_type(*v, &mut data);
    }

    data
}

pub fn convert_type(value: TtfType, data: &mut Vec<u8>) {
    match value {
        TtfType::Raw(bytes) => {
            data.extend_from_slice(bytes);
        }
        TtfType::Int8(n) => {
            data.extend_from_slice(&i8::to_be_bytes(n));
        }
        TtfType::UInt8(n) => {
            data.extend_from_slice(&u8::to_be_bytes(n));
        }
        TtfType::Int16(n) => {
            data.extend_from_slice(&i16::to_be_bytes(n));
        }
        TtfType::UInt16(n) => {
            data.extend_from_slice(&u16::to_be_bytes(n));
        }
        TtfType::UInt24(n) => {
            data.extend_from_slice(&u32::to_be_bytes(n)[1..]);
        }
        TtfType::Int32(n) => {
            data.extend_from_slice(&i32::to_be_bytes(n));
        }
        TtfType::UInt32(n) => {
            data.extend_from_slice(&u32::to_be_bytes(n));
        }
        TtfType::Int64(n) => {
            data.extend_from_slice(&i64::to_be_bytes(n));
        }
    }
}

#[derive(Debug)]
pub struct Writer {
    pub data: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Writer {
            data: Vec::with_capacity(256),
        }
    }

    pub fn offset(&self) -> usize {
        self.data.len()
    }

    pub fn write(&mut self, value: TtfType) {
        convert_type(value, &mut self.data);
    }

    pub fn write_all(&mut self, values: &[TtfType]) {
        for v in values {
            self.write(*v);
        }
    }
}
