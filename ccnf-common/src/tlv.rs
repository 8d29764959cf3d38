//! Generic TLV (Type-Length-Value) encoding and decoding.
//!
//! Per spec.md §6, per-hop headers and NFP messages use 16-bit
//! big-endian type and length fields (unlike NDN-TLV's variable-length
//! encoding). This module is the shared codec both the per-hop header
//! registry (`wire`) and the NFP payload codec (`nfp_wire`) build on.

use crate::error::Error;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Encodes a 16-bit TLV type field, big-endian.
pub fn encode_type(tlv_type: u16, buf: &mut BytesMut) {
    buf.put_u16(tlv_type);
}

/// Encodes a 16-bit TLV length field, big-endian.
pub fn encode_length(length: u16, buf: &mut BytesMut) {
    buf.put_u16(length);
}

/// A generic TLV element: 16-bit type, 16-bit length, raw value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvElement {
    pub tlv_type: u16,
    pub value: Bytes,
}

impl TlvElement {
    pub fn new(tlv_type: u16, value: impl Into<Bytes>) -> Self {
        Self {
            tlv_type,
            value: value.into(),
        }
    }

    /// Total encoded length: 2 (type) + 2 (length) + value.
    pub fn len(&self) -> usize {
        4 + self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Encodes this element onto `buf`. Fails rather than panicking
    /// when the value can't fit the 16-bit length field — reachable
    /// with ordinary oversized user content (spec.md §7), not a
    /// structural invariant violation.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), Error> {
        encode_type(self.tlv_type, buf);
        let len: u16 = self.value.len().try_into().map_err(|_| {
            Error::Tlv(format!(
                "TLV value of {} bytes exceeds the 16-bit length field",
                self.value.len()
            ))
        })?;
        encode_length(len, buf);
        buf.extend_from_slice(&self.value);
        Ok(())
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, Error> {
        if buf.remaining() < 4 {
            return Err(Error::Tlv("buffer too small for TLV header".into()));
        }
        let tlv_type = buf.get_u16();
        let length = buf.get_u16() as usize;
        if buf.remaining() < length {
            return Err(Error::Tlv(format!(
                "TLV value requires {} bytes but only {} remain",
                length,
                buf.remaining()
            )));
        }
        let mut value = BytesMut::with_capacity(length);
        value.extend_from_slice(&buf.copy_to_bytes(length));
        Ok(Self {
            tlv_type,
            value: value.freeze(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let e = TlvElement::new(0x42, Bytes::from_static(b"hello"));
        let mut buf = BytesMut::new();
        e.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), e.len());
        let mut cursor = buf.freeze();
        let decoded = TlvElement::decode(&mut cursor).unwrap();
        assert_eq!(decoded, e);
    }

    #[test]
    fn decode_rejects_truncated_value() {
        let mut buf = BytesMut::new();
        buf.put_u16(1);
        buf.put_u16(10);
        buf.put_u8(0xAA);
        let mut cursor = buf.freeze();
        assert!(TlvElement::decode(&mut cursor).is_err());
    }

    #[test]
    fn encode_rejects_value_over_16_bit_length() {
        let oversized = vec![0u8; u16::MAX as usize + 1];
        let e = TlvElement::new(0x42, oversized);
        let mut buf = BytesMut::new();
        assert!(e.encode(&mut buf).is_err());
    }
}
