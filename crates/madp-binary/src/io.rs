use crate::error::{BinaryError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Cursor over an immutable byte buffer. All multi-byte reads are big-endian.
#[derive(Debug, Clone)]
pub struct BinaryReader {
    buffer: Bytes,
}

impl BinaryReader {
    pub fn new(buffer: Bytes) -> Self {
        Self { buffer }
    }

    pub fn remaining(&self) -> usize {
        self.buffer.remaining()
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        let remaining = self.buffer.remaining();
        if remaining < needed {
            return Err(BinaryError::UnexpectedEof { needed, remaining });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buffer.get_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.buffer.get_u16())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.buffer.get_u32())
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.ensure(8)?;
        Ok(self.buffer.get_u64())
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.ensure(8)?;
        Ok(self.buffer.get_f64())
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Fills `dst` from the buffer, erroring if it cannot be filled completely.
    pub fn read_exact(&mut self, dst: &mut [u8]) -> Result<()> {
        self.ensure(dst.len())?;
        self.buffer.copy_to_slice(dst);
        Ok(())
    }

    /// Takes the next `len` bytes as a zero-copy slice of the backing buffer.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        self.ensure(len)?;
        Ok(self.buffer.split_to(len))
    }

    /// Takes everything left in the buffer.
    pub fn read_remaining(&mut self) -> Bytes {
        self.buffer.split_to(self.buffer.remaining())
    }
}

/// Growable output buffer. All multi-byte writes are big-endian.
#[derive(Debug, Clone, Default)]
pub struct BinaryWriter {
    buffer: BytesMut,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.buffer.put_u8(value);
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.buffer.put_u16(value);
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.buffer.put_u32(value);
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.buffer.put_u64(value);
        Ok(())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.buffer.put_f64(value);
        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(value as u8)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.buffer.put_slice(bytes);
        Ok(())
    }

    pub fn freeze(self) -> Bytes {
        self.buffer.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_round_trip() {
        let mut writer = BinaryWriter::new();
        writer.write_u8(0xab).unwrap();
        writer.write_u16(0x1234).unwrap();
        writer.write_u32(0xdead_beef).unwrap();
        writer.write_u64(42).unwrap();
        writer.write_f64(1.5).unwrap();
        writer.write_bool(true).unwrap();
        writer.write_bool(false).unwrap();

        let mut reader = BinaryReader::new(writer.freeze());
        assert_eq!(reader.read_u8().unwrap(), 0xab);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_u32().unwrap(), 0xdead_beef);
        assert_eq!(reader.read_u64().unwrap(), 42);
        assert_eq!(reader.read_f64().unwrap(), 1.5);
        assert!(reader.read_bool().unwrap());
        assert!(!reader.read_bool().unwrap());
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn network_byte_order() {
        let mut writer = BinaryWriter::new();
        writer.write_u16(0x0102).unwrap();
        assert_eq!(writer.freeze().as_ref(), &[0x01, 0x02]);
    }

    #[test]
    fn short_buffer_errors() {
        let mut reader = BinaryReader::new(Bytes::from_static(&[0x01]));
        let err = reader.read_u16().unwrap_err();
        assert!(matches!(
            err,
            BinaryError::UnexpectedEof {
                needed: 2,
                remaining: 1
            }
        ));
    }

    #[test]
    fn exact_and_remaining() {
        let mut reader = BinaryReader::new(Bytes::from_static(b"abcdef"));
        let mut head = [0u8; 2];
        reader.read_exact(&mut head).unwrap();
        assert_eq!(&head, b"ab");
        assert_eq!(reader.read_bytes(2).unwrap().as_ref(), b"cd");
        assert_eq!(reader.read_remaining().as_ref(), b"ef");
        assert_eq!(reader.remaining(), 0);
    }
}
