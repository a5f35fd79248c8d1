//! Binary reading and writing utilities for the tracker protocol.
//!
//! Scalars are little-endian. Entity ids and lengths are LEB128 var-ints.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{EntityId, Position, ProtocolError};

const VARINT_MAX_BYTES: usize = 5;

/// A reader for parsing binary protocol messages.
#[derive(Debug)]
pub struct BinaryReader {
    buf: Bytes,
}

impl BinaryReader {
    /// Create a new reader from raw bytes.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { buf: data.into() }
    }

    /// Returns remaining bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    #[inline]
    fn ensure(&self, n: usize) -> Result<(), ProtocolError> {
        if self.buf.remaining() >= n {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedEof)
        }
    }

    #[inline]
    pub fn get_u8(&mut self) -> Result<u8, ProtocolError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    #[inline]
    pub fn get_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.get_u8()? != 0)
    }

    #[inline]
    pub fn get_u32(&mut self) -> Result<u32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    #[inline]
    pub fn get_f32(&mut self) -> Result<f32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_f32_le())
    }

    #[inline]
    pub fn get_f64(&mut self) -> Result<f64, ProtocolError> {
        self.ensure(8)?;
        Ok(self.buf.get_f64_le())
    }

    /// Read an unsigned LEB128 var-int (at most 5 bytes).
    pub fn get_var_u32(&mut self) -> Result<u32, ProtocolError> {
        let mut value = 0u32;
        for i in 0..VARINT_MAX_BYTES {
            let byte = self.get_u8()?;
            value |= u32::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(ProtocolError::VarIntTooLong)
    }

    /// Read a var-int entity id, rejecting the reserved id 0.
    pub fn get_entity_id(&mut self) -> Result<EntityId, ProtocolError> {
        EntityId::new(self.get_var_u32()?).ok_or(ProtocolError::InvalidEntityId)
    }

    /// Read three f64 components.
    pub fn get_position(&mut self) -> Result<Position, ProtocolError> {
        Ok(Position::new(self.get_f64()?, self.get_f64()?, self.get_f64()?))
    }

    /// Read a var-int length-prefixed UTF-8 string.
    pub fn get_string(&mut self) -> Result<String, ProtocolError> {
        let len = self.get_var_u32()? as usize;
        self.ensure(len)?;
        let raw = self.buf.split_to(len);
        String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
    }
}

/// A writer for building binary protocol messages.
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buf: BytesMut,
}

impl BinaryWriter {
    /// Create a new writer with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    /// Create a new writer with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Returns the current length.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    #[inline]
    pub fn put_bool(&mut self, v: bool) {
        self.buf.put_u8(u8::from(v));
    }

    #[inline]
    pub fn put_u32(&mut self, v: u32) {
        self.buf.put_u32_le(v);
    }

    #[inline]
    pub fn put_f32(&mut self, v: f32) {
        self.buf.put_f32_le(v);
    }

    #[inline]
    pub fn put_f64(&mut self, v: f64) {
        self.buf.put_f64_le(v);
    }

    /// Write an unsigned LEB128 var-int.
    pub fn put_var_u32(&mut self, mut v: u32) {
        loop {
            let byte = (v & 0x7F) as u8;
            v >>= 7;
            if v == 0 {
                self.buf.put_u8(byte);
                return;
            }
            self.buf.put_u8(byte | 0x80);
        }
    }

    #[inline]
    pub fn put_entity_id(&mut self, id: EntityId) {
        self.put_var_u32(id.get());
    }

    pub fn put_position(&mut self, p: Position) {
        self.put_f64(p.x);
        self.put_f64(p.y);
        self.put_f64(p.z);
    }

    /// Write a var-int length-prefixed UTF-8 string.
    pub fn put_string(&mut self, s: &str) {
        self.put_var_u32(s.len() as u32);
        self.buf.put_slice(s.as_bytes());
    }

    /// Consume the writer and return the built buffer.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }

    /// Get current buffer as a slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}
