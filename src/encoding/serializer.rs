//! # Metadata Serializer
//!
//! Byte-oriented writer and reader for persisted metadata: chunk
//! descriptors, compression metadata and node-group layouts. Data pages are
//! never written through here; they go straight to the file handle.
//!
//! ## Wire Format
//!
//! | Item      | Encoding                                      |
//! |-----------|-----------------------------------------------|
//! | u8/bool   | 1 byte                                        |
//! | u32/u64   | little-endian fixed width                     |
//! | i64/f64   | little-endian fixed width (f64 as raw bits)   |
//! | varint    | LEB128, 7 bits per byte, MSB = continuation   |
//! | str/bytes | varint length followed by raw bytes           |
//! | field tag | str, checked on read                          |
//!
//! Field tags (`write_field`/`expect_field`) name each section of a
//! descriptor so that a layout mismatch fails loudly at the exact field
//! rather than producing garbage further on.

use eyre::{bail, ensure, Result};

const MAX_VARINT_BYTES: usize = 10;

#[derive(Debug, Default)]
pub struct Serializer {
    buf: Vec<u8>,
}

impl Serializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_bits().to_le_bytes());
    }

    pub fn write_varint(&mut self, mut v: u64) {
        while v >= 0x80 {
            self.buf.push((v as u8 & 0x7f) | 0x80);
            v >>= 7;
        }
        self.buf.push(v as u8);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    pub fn write_field(&mut self, name: &str) {
        self.write_str(name);
    }
}

#[derive(Debug)]
pub struct Deserializer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Deserializer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos == self.data.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        ensure!(
            self.remaining() >= n,
            "metadata truncated: need {} bytes at offset {}, have {}",
            n,
            self.pos,
            self.remaining()
        );
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => bail!("invalid bool byte {} at offset {}", other, self.pos - 1),
        }
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(u64::from_le_bytes(self.take_array()?)))
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for i in 0..MAX_VARINT_BYTES {
            let byte = self.read_u8()?;
            value |= ((byte & 0x7f) as u64) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        bail!("varint longer than {} bytes", MAX_VARINT_BYTES)
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint()? as usize;
        self.take(len)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        Ok(std::str::from_utf8(bytes)?.to_string())
    }

    pub fn expect_field(&mut self, name: &str) -> Result<()> {
        let found = self.read_bytes()?;
        ensure!(
            found == name.as_bytes(),
            "metadata layout mismatch: expected field '{}', found '{}'",
            name,
            String::from_utf8_lossy(found)
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_widths() {
        let mut ser = Serializer::new();
        ser.write_varint(127);
        assert_eq!(ser.len(), 1);
        ser.write_varint(128);
        assert_eq!(ser.len(), 3);
        ser.write_varint(u64::MAX);
        assert_eq!(ser.len(), 13);

        let bytes = ser.finish();
        let mut de = Deserializer::new(&bytes);
        assert_eq!(de.read_varint().unwrap(), 127);
        assert_eq!(de.read_varint().unwrap(), 128);
        assert_eq!(de.read_varint().unwrap(), u64::MAX);
        assert!(de.is_exhausted());
    }

    #[test]
    fn field_tags_detect_layout_drift() {
        let mut ser = Serializer::new();
        ser.write_field("metadata");
        ser.write_f64(-0.0);
        let bytes = ser.finish();

        let mut de = Deserializer::new(&bytes);
        assert!(de.expect_field("metadata").is_ok());
        assert_eq!(de.read_f64().unwrap().to_bits(), (-0.0f64).to_bits());

        let mut wrong = Deserializer::new(&bytes);
        let err = wrong.expect_field("nulls").unwrap_err();
        assert!(err.to_string().contains("expected field 'nulls'"));
    }

    #[test]
    fn truncated_input_is_an_error() {
        let mut de = Deserializer::new(&[1, 2]);
        assert!(de.read_u64().is_err());
        let mut bad_bool = Deserializer::new(&[7]);
        assert!(bad_bool.read_bool().is_err());
    }
}
