//! TLV8 encoding and decoding (HomeKit Accessory Protocol R17 §18.1).
//!
//! TLV8 items are `type (1 byte) | length (1 byte) | value`. Values longer
//! than 255 bytes are split into consecutive fragments with the same type.
//! Repeated sibling items of the same type are delimited by a zero-length
//! item of type `0x00`.
//!
//! Integers are little-endian; `f32` values are carried as the
//! little-endian IEEE-754 bit pattern.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CameraError, Result};

/// Type of the zero-length delimiter between repeated sibling items.
pub const SEPARATOR: u8 = 0x00;

const MAX_FRAGMENT: usize = 255;

/// Capacity-bounded TLV8 writer.
///
/// The capacity models the response buffer the host hands to a
/// characteristic read; exceeding it yields
/// [`OutOfResources`](CameraError::OutOfResources).
#[derive(Debug)]
pub struct TlvWriter {
    buf: BytesMut,
    capacity: usize,
}

impl TlvWriter {
    pub fn new(capacity: usize) -> Self {
        TlvWriter {
            buf: BytesMut::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append one item, fragmenting values longer than 255 bytes.
    pub fn append(&mut self, tag: u8, value: &[u8]) -> Result<()> {
        let fragments = value.len().div_ceil(MAX_FRAGMENT).max(1);
        let needed = fragments * 2 + value.len();
        if self.buf.len() + needed > self.capacity {
            return Err(CameraError::OutOfResources);
        }
        if value.is_empty() {
            self.buf.put_u8(tag);
            self.buf.put_u8(0);
            return Ok(());
        }
        for chunk in value.chunks(MAX_FRAGMENT) {
            self.buf.put_u8(tag);
            self.buf.put_u8(chunk.len() as u8);
            self.buf.put_slice(chunk);
        }
        Ok(())
    }

    pub fn append_u8(&mut self, tag: u8, value: u8) -> Result<()> {
        self.append(tag, &[value])
    }

    pub fn append_u16(&mut self, tag: u8, value: u16) -> Result<()> {
        self.append(tag, &value.to_le_bytes())
    }

    pub fn append_u32(&mut self, tag: u8, value: u32) -> Result<()> {
        self.append(tag, &value.to_le_bytes())
    }

    pub fn append_u64(&mut self, tag: u8, value: u64) -> Result<()> {
        self.append(tag, &value.to_le_bytes())
    }

    pub fn append_f32(&mut self, tag: u8, value: f32) -> Result<()> {
        self.append(tag, &value.to_le_bytes())
    }

    /// Append the zero-length delimiter between repeated sibling items.
    pub fn separator(&mut self) -> Result<()> {
        self.append(SEPARATOR, &[])
    }

    /// Build a child region through `f` and append it as a single value.
    pub fn nested(&mut self, tag: u8, f: impl FnOnce(&mut TlvWriter) -> Result<()>) -> Result<()> {
        let remaining = self.capacity.saturating_sub(self.buf.len());
        let mut child = TlvWriter::new(remaining.saturating_sub(2));
        f(&mut child)?;
        let value = child.buf.freeze();
        self.append(tag, &value)
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

/// A decoded TLV item with all fragments merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    pub tag: u8,
    pub value: Vec<u8>,
}

/// TLV8 reader over a byte slice.
#[derive(Debug)]
pub struct TlvReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> TlvReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        TlvReader { bytes, pos: 0 }
    }

    /// Decode the next item, merging 255-byte fragments of the same type.
    pub fn next_item(&mut self) -> Result<Option<Tlv>> {
        if self.pos == self.bytes.len() {
            return Ok(None);
        }
        let (tag, mut value) = self.fragment()?;
        let mut last_len = value.len();
        while last_len == MAX_FRAGMENT
            && self.pos + 2 <= self.bytes.len()
            && self.bytes[self.pos] == tag
        {
            let (_, fragment) = self.fragment()?;
            last_len = fragment.len();
            value.extend_from_slice(&fragment);
        }
        Ok(Some(Tlv { tag, value }))
    }

    fn fragment(&mut self) -> Result<(u8, Vec<u8>)> {
        if self.pos + 2 > self.bytes.len() {
            return Err(CameraError::InvalidData);
        }
        let tag = self.bytes[self.pos];
        let len = self.bytes[self.pos + 1] as usize;
        let start = self.pos + 2;
        if start + len > self.bytes.len() {
            return Err(CameraError::InvalidData);
        }
        self.pos = start + len;
        Ok((tag, self.bytes[start..start + len].to_vec()))
    }

    /// Collect the values for a fixed set of expected tags.
    ///
    /// Separators are skipped, unknown tags are ignored, and a repeated
    /// expected tag is rejected as invalid.
    pub fn read_all<const N: usize>(mut self, tags: [u8; N]) -> Result<[Option<Vec<u8>>; N]> {
        let mut values: [Option<Vec<u8>>; N] = std::array::from_fn(|_| None);
        while let Some(item) = self.next_item()? {
            if item.tag == SEPARATOR && item.value.is_empty() {
                continue;
            }
            match tags.iter().position(|&t| t == item.tag) {
                Some(i) => {
                    if values[i].is_some() {
                        tracing::warn!(tag = item.tag, "duplicate TLV item");
                        return Err(CameraError::InvalidData);
                    }
                    values[i] = Some(item.value);
                }
                None => {
                    tracing::debug!(tag = item.tag, "skipping unexpected TLV item");
                }
            }
        }
        Ok(values)
    }
}

/// Read an exactly one byte wide value.
pub fn read_u8(value: &[u8]) -> Result<u8> {
    match value {
        [b] => Ok(*b),
        _ => Err(CameraError::InvalidData),
    }
}

/// Read an exactly two bytes wide little-endian value.
pub fn read_u16(value: &[u8]) -> Result<u16> {
    match value {
        [a, b] => Ok(u16::from_le_bytes([*a, *b])),
        _ => Err(CameraError::InvalidData),
    }
}

/// Read an exactly four bytes wide little-endian value.
pub fn read_u32(value: &[u8]) -> Result<u32> {
    match value.try_into() {
        Ok(bytes) => Ok(u32::from_le_bytes(bytes)),
        Err(_) => Err(CameraError::InvalidData),
    }
}

/// Read a little-endian unsigned integer of up to `max_len` bytes.
///
/// Shorter encodings are allowed; an empty value decodes to zero.
pub fn read_uint_le(value: &[u8], max_len: usize) -> Result<u64> {
    if value.len() > max_len || value.len() > 8 {
        return Err(CameraError::InvalidData);
    }
    let mut out = 0u64;
    for (i, b) in value.iter().enumerate() {
        out |= (*b as u64) << (8 * i);
    }
    Ok(out)
}

/// Read an `f32` from its four byte little-endian bit pattern.
///
/// Non-finite values are rejected.
pub fn read_f32(value: &[u8]) -> Result<f32> {
    let bytes: [u8; 4] = value.try_into().map_err(|_| CameraError::InvalidData)?;
    let v = f32::from_le_bytes(bytes);
    if !v.is_finite() {
        return Err(CameraError::InvalidData);
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_nested() {
        let mut w = TlvWriter::new(64);
        w.append_u8(1, 7).unwrap();
        w.nested(2, |c| {
            c.append_u16(1, 1280)?;
            c.append_u16(2, 720)
        })
        .unwrap();
        let bytes = w.into_bytes();

        let mut r = TlvReader::new(&bytes);
        let first = r.next_item().unwrap().unwrap();
        assert_eq!(first.tag, 1);
        assert_eq!(first.value, vec![7]);
        let second = r.next_item().unwrap().unwrap();
        assert_eq!(second.tag, 2);
        let inner = TlvReader::new(&second.value).read_all([1, 2]).unwrap();
        assert_eq!(read_u16(inner[0].as_ref().unwrap()).unwrap(), 1280);
        assert_eq!(read_u16(inner[1].as_ref().unwrap()).unwrap(), 720);
    }

    #[test]
    fn separator_is_zero_length_type_zero() {
        let mut w = TlvWriter::new(8);
        w.separator().unwrap();
        assert_eq!(&w.into_bytes()[..], &[0x00, 0x00]);
    }

    #[test]
    fn long_values_fragment_and_merge() {
        let value = vec![0xAB; 300];
        let mut w = TlvWriter::new(512);
        w.append(9, &value).unwrap();
        let bytes = w.into_bytes();
        // 255-byte fragment + 45-byte fragment, each with its own header.
        assert_eq!(bytes.len(), 2 + 255 + 2 + 45);
        assert_eq!(bytes[0], 9);
        assert_eq!(bytes[1], 255);

        let mut r = TlvReader::new(&bytes);
        let item = r.next_item().unwrap().unwrap();
        assert_eq!(item.value, value);
        assert!(r.next_item().unwrap().is_none());
    }

    #[test]
    fn capacity_exhaustion() {
        let mut w = TlvWriter::new(4);
        assert_eq!(w.append(1, &[0; 8]), Err(CameraError::OutOfResources));
    }

    #[test]
    fn read_all_rejects_duplicates_and_skips_unknown() {
        let mut w = TlvWriter::new(32);
        w.append_u8(1, 1).unwrap();
        w.append_u8(9, 9).unwrap(); // unknown, skipped
        w.append_u8(2, 2).unwrap();
        let bytes = w.into_bytes();
        let values = TlvReader::new(&bytes).read_all([1, 2]).unwrap();
        assert_eq!(values[0], Some(vec![1]));
        assert_eq!(values[1], Some(vec![2]));

        let mut w = TlvWriter::new(32);
        w.append_u8(1, 1).unwrap();
        w.separator().unwrap();
        w.append_u8(1, 2).unwrap();
        let bytes = w.into_bytes();
        assert_eq!(
            TlvReader::new(&bytes).read_all([1]),
            Err(CameraError::InvalidData)
        );
    }

    #[test]
    fn truncated_input() {
        assert_eq!(
            TlvReader::new(&[1, 4, 0xAA]).next_item(),
            Err(CameraError::InvalidData)
        );
    }

    #[test]
    fn uint_le_variable_width() {
        assert_eq!(read_uint_le(&[], 4).unwrap(), 0);
        assert_eq!(read_uint_le(&[0xA0, 0x0F], 4).unwrap(), 4000);
        assert!(read_uint_le(&[0; 5], 4).is_err());
    }

    #[test]
    fn f32_bit_pattern() {
        let bytes = 0.5f32.to_le_bytes();
        assert_eq!(read_f32(&bytes).unwrap(), 0.5);
        assert!(read_f32(&f32::NAN.to_le_bytes()).is_err());
        assert!(read_f32(&[0; 3]).is_err());
    }
}
