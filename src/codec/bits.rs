//! Bit- and byte-level primitives shared by the BUFR and GRIB codecs.
//!
//! Both formats are big-endian and pack values MSB-first.

use crate::error_handling::CodecError;

/// MSB-first bit packer.
#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the low `width` bits of `value` (`width <= 64`).
    pub fn write(&mut self, value: u64, width: u8) {
        for shift in (0..u32::from(width)).rev() {
            if self.bit_len % 8 == 0 {
                self.bytes.push(0);
            }
            if (value >> shift) & 1 == 1 {
                let last = self.bytes.len() - 1;
                self.bytes[last] |= 0x80 >> (self.bit_len % 8);
            }
            self.bit_len += 1;
        }
    }

    /// All ones in `width` bits: the BUFR missing-value pattern.
    pub fn write_missing(&mut self, width: u8) {
        self.write(all_ones(width), width);
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// The packed bytes, zero-padded to a whole octet.
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// `width` low bits set.
pub fn all_ones(width: u8) -> u64 {
    match width {
        0 => 0,
        w if w >= 64 => u64::MAX,
        w => (1u64 << w) - 1,
    }
}

/// Bits needed to represent `value`.
pub fn bits_needed(value: u64) -> u8 {
    (64 - value.leading_zeros()) as u8
}

/// MSB-first bit unpacker.
#[derive(Debug)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Reads `width` bits, or `None` past the end.
    pub fn read(&mut self, width: u8) -> Option<u64> {
        let width = usize::from(width);
        if self.pos + width > self.bytes.len() * 8 {
            return None;
        }
        let mut value = 0u64;
        for _ in 0..width {
            let bit = (self.bytes[self.pos / 8] >> (7 - self.pos % 8)) & 1;
            value = (value << 1) | u64::from(bit);
            self.pos += 1;
        }
        Some(value)
    }
}

/// Big-endian byte writer for section headers.
#[derive(Debug, Default)]
pub struct ByteWriter {
    bytes: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.bytes.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// Low three octets of `v`.
    pub fn u24(&mut self, v: u32) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_be_bytes()[1..]);
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn i64(&mut self, v: i64) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// GRIB sign-and-magnitude 16-bit integer.
    pub fn sm16(&mut self, v: i16) -> &mut Self {
        let magnitude = v.unsigned_abs() & 0x7FFF;
        self.u16(if v < 0 { 0x8000 | magnitude } else { magnitude })
    }

    /// GRIB sign-and-magnitude 32-bit integer.
    pub fn sm32(&mut self, v: i32) -> &mut Self {
        let magnitude = v.unsigned_abs() & 0x7FFF_FFFF;
        self.u32(if v < 0 { 0x8000_0000 | magnitude } else { magnitude })
    }

    pub fn f32(&mut self, v: f32) -> &mut Self {
        self.bytes.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(v);
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Big-endian byte cursor over an encoded message.
#[derive(Debug)]
pub struct ByteReader<'a> {
    format: &'static str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(format: &'static str, bytes: &'a [u8]) -> Self {
        Self {
            format,
            bytes,
            pos: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Next `n` bytes without consuming them.
    pub fn peek(&self, n: usize) -> Option<&'a [u8]> {
        self.bytes.get(self.pos..self.pos + n)
    }

    pub fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::truncated(self.format, what));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    pub fn u8(&mut self, what: &str) -> Result<u8, CodecError> {
        Ok(self.array::<1>(what)?[0])
    }

    pub fn u16(&mut self, what: &str) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.array(what)?))
    }

    pub fn u24(&mut self, what: &str) -> Result<u32, CodecError> {
        let [a, b, c] = self.array::<3>(what)?;
        Ok(u32::from_be_bytes([0, a, b, c]))
    }

    pub fn u32(&mut self, what: &str) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.array(what)?))
    }

    pub fn u64(&mut self, what: &str) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.array(what)?))
    }

    pub fn i64(&mut self, what: &str) -> Result<i64, CodecError> {
        Ok(i64::from_be_bytes(self.array(what)?))
    }

    pub fn sm16(&mut self, what: &str) -> Result<i16, CodecError> {
        let raw = self.u16(what)?;
        let magnitude = (raw & 0x7FFF) as i16;
        Ok(if raw & 0x8000 != 0 { -magnitude } else { magnitude })
    }

    pub fn sm32(&mut self, what: &str) -> Result<i32, CodecError> {
        let raw = self.u32(what)?;
        let magnitude = (raw & 0x7FFF_FFFF) as i32;
        Ok(if raw & 0x8000_0000 != 0 { -magnitude } else { magnitude })
    }

    pub fn f32(&mut self, what: &str) -> Result<f32, CodecError> {
        Ok(f32::from_be_bytes(self.array(what)?))
    }

    /// Expects the literal `tag` next.
    pub fn expect_tag(&mut self, tag: &[u8], what: &str) -> Result<(), CodecError> {
        let found = self.take(tag.len(), what)?;
        if found != tag {
            return Err(CodecError::malformed(
                self.format,
                format!("expected {} marker {:?}", what, String::from_utf8_lossy(tag)),
            ));
        }
        Ok(())
    }
}
