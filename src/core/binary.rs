//! Bedrock binary primitives.
//!
//! Packets are built from little-endian integers, LEB128 varints (zigzag for the
//! signed forms), length-prefixed byte strings and float vectors. [`PacketReader`]
//! reads them from a borrowed slice; [`WriteExt`] appends them to any `BufMut`.

use crate::error::{constants, ProtocolError, Result};
use bytes::BufMut;

/// Three `f32` components, as used for positions and deltas.
pub type Vec3 = [f32; 3];

/// Cursor over a packet payload. Every read fails with `DecodeError` on truncation.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Everything not yet consumed
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = self.buf;
        self.buf = &[];
        rest
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(ProtocolError::DecodeError(constants::ERR_TRUNCATED.into()));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub fn bool(&mut self) -> Result<bool> {
        Ok(self.u8()? != 0)
    }

    pub fn u16_le(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u32_le(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn i32_le(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn i32_be(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    pub fn u64_le(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn f32_le(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    pub fn vec3(&mut self) -> Result<Vec3> {
        Ok([self.f32_le()?, self.f32_le()?, self.f32_le()?])
    }

    pub fn varuint32(&mut self) -> Result<u32> {
        let mut value: u32 = 0;
        for i in 0..5 {
            let byte = self.u8()?;
            value |= u32::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(ProtocolError::DecodeError(
            constants::ERR_VARINT_TOO_LONG.into(),
        ))
    }

    pub fn varint32(&mut self) -> Result<i32> {
        let raw = self.varuint32()?;
        Ok(((raw >> 1) as i32) ^ -((raw & 1) as i32))
    }

    pub fn varuint64(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        for i in 0..10 {
            let byte = self.u8()?;
            value |= u64::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(ProtocolError::DecodeError(
            constants::ERR_VARINT_TOO_LONG.into(),
        ))
    }

    /// varuint32 length followed by that many bytes
    pub fn byte_slice(&mut self) -> Result<&'a [u8]> {
        let len = self.varuint32()? as usize;
        self.bytes(len)
    }

    pub fn string(&mut self) -> Result<String> {
        let raw = self.byte_slice()?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| ProtocolError::DecodeError(format!("Invalid UTF-8 string: {e}")))
    }
}

/// Bedrock encodings on top of any `BufMut`.
pub trait WriteExt: BufMut {
    fn put_bool(&mut self, value: bool) {
        self.put_u8(u8::from(value));
    }

    fn put_varuint32(&mut self, mut value: u32) {
        while value >= 0x80 {
            self.put_u8((value as u8 & 0x7F) | 0x80);
            value >>= 7;
        }
        self.put_u8(value as u8);
    }

    fn put_varint32(&mut self, value: i32) {
        self.put_varuint32(((value << 1) ^ (value >> 31)) as u32);
    }

    fn put_varuint64(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.put_u8((value as u8 & 0x7F) | 0x80);
            value >>= 7;
        }
        self.put_u8(value as u8);
    }

    fn put_byte_slice(&mut self, data: &[u8]) {
        self.put_varuint32(data.len() as u32);
        self.put_slice(data);
    }

    fn put_string(&mut self, value: &str) {
        self.put_byte_slice(value.as_bytes());
    }

    fn put_vec3(&mut self, value: &Vec3) {
        for component in value {
            self.put_f32_le(*component);
        }
    }
}

impl<T: BufMut + ?Sized> WriteExt for T {}

/// Number of bytes `value` occupies as a varuint32
pub fn varuint32_len(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0xFFF_FFFF => 4,
        _ => 5,
    }
}
