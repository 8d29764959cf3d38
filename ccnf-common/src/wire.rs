//! Wire codec: fixed header, per-hop headers, and full packet
//! encode/decode. See spec.md §6 ("Wire format").

use crate::error::Error;
use crate::name::{HashValue, Name};
use crate::packet::{ContentObject, Interest, InterestReturn, Packet};
use crate::tlv::TlvElement;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use std::time::Duration;

/// Fixed header length in bytes (spec.md §6).
pub const FIXED_HEADER_LEN: usize = 8;

pub const PACKET_TYPE_INTEREST: u8 = 1;
pub const PACKET_TYPE_CONTENT_OBJECT: u8 = 2;
pub const PACKET_TYPE_INTEREST_RETURN: u8 = 3;

pub const TLV_KEYID_RESTRICTION: u16 = 0x0010;
pub const TLV_CONTENT_OBJECT_HASH_RESTRICTION: u16 = 0x0011;
pub const TLV_KEYID: u16 = 0x0012;
pub const TLV_CONTENT: u16 = 0x0013;
pub const TLV_FRESHNESS: u16 = 0x0014;
pub const TLV_INTEREST_PAYLOAD: u16 = 0x0015;

/// Per-hop header TLV carrying the Interest's lifetime, in milliseconds.
pub const HOP_TLV_INTEREST_LIFETIME: u16 = 0x0001;

/// The 8-byte fixed header described in spec.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub version: u8,
    pub packet_type: u8,
    pub total_length: u16,
    pub hop_limit: u8,
    pub return_code: u8,
    pub header_length: u8,
}

impl FixedHeader {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.version);
        buf.put_u8(self.packet_type);
        buf.put_u16(self.total_length);
        buf.put_u8(self.hop_limit);
        buf.put_u8(self.return_code);
        buf.put_u8(0); // reserved
        buf.put_u8(self.header_length);
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, Error> {
        if buf.remaining() < FIXED_HEADER_LEN {
            return Err(Error::Packet("buffer too small for fixed header".into()));
        }
        let version = buf.get_u8();
        let packet_type = buf.get_u8();
        let total_length = buf.get_u16();
        let hop_limit = buf.get_u8();
        let return_code = buf.get_u8();
        let _reserved = buf.get_u8();
        let header_length = buf.get_u8();
        Ok(Self {
            version,
            packet_type,
            total_length,
            hop_limit,
            return_code,
            header_length,
        })
    }
}

/// A decoded per-hop header. `Unknown` preserves TLVs not recognized by
/// the local registry so they can be relayed without loss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HopHeader {
    InterestLifetime(Duration),
    Unknown { tlv_type: u16, value: Bytes },
}

impl HopHeader {
    fn to_tlv(&self) -> TlvElement {
        match self {
            HopHeader::InterestLifetime(d) => {
                let ms = d.as_millis().min(u32::MAX as u128) as u32;
                TlvElement::new(HOP_TLV_INTEREST_LIFETIME, Bytes::copy_from_slice(&ms.to_be_bytes()))
            }
            HopHeader::Unknown { tlv_type, value } => TlvElement::new(*tlv_type, value.clone()),
        }
    }
}

type HopHeaderDecoder = fn(&TlvElement) -> Result<HopHeader, Error>;

/// A type-indexed registry of per-hop header decoders (spec.md §6:
/// "decoded by a type-indexed codec registry").
pub struct HopHeaderRegistry {
    decoders: HashMap<u16, HopHeaderDecoder>,
}

impl HopHeaderRegistry {
    /// The registry CCNF ships with: only `InterestLifetime` is
    /// understood; everything else round-trips as `Unknown`.
    pub fn default_registry() -> Self {
        let mut decoders: HashMap<u16, HopHeaderDecoder> = HashMap::new();
        decoders.insert(HOP_TLV_INTEREST_LIFETIME, decode_interest_lifetime);
        Self { decoders }
    }

    pub fn register(&mut self, tlv_type: u16, decoder: HopHeaderDecoder) {
        self.decoders.insert(tlv_type, decoder);
    }

    pub fn decode_all(&self, mut buf: impl Buf) -> Result<Vec<HopHeader>, Error> {
        let mut headers = Vec::new();
        while buf.has_remaining() {
            let element = TlvElement::decode(&mut buf)?;
            let header = match self.decoders.get(&element.tlv_type) {
                Some(decode) => decode(&element)?,
                None => HopHeader::Unknown {
                    tlv_type: element.tlv_type,
                    value: element.value,
                },
            };
            headers.push(header);
        }
        Ok(headers)
    }
}

fn decode_interest_lifetime(element: &TlvElement) -> Result<HopHeader, Error> {
    if element.value.len() != 4 {
        return Err(Error::Packet("interest lifetime TLV must be 4 bytes".into()));
    }
    let mut b = [0u8; 4];
    b.copy_from_slice(&element.value);
    Ok(HopHeader::InterestLifetime(Duration::from_millis(
        u32::from_be_bytes(b) as u64,
    )))
}

fn encode_hop_headers(headers: &[HopHeader], buf: &mut BytesMut) -> Result<(), Error> {
    for h in headers {
        h.to_tlv().encode(buf)?;
    }
    Ok(())
}

fn hop_headers_len(headers: &[HopHeader]) -> usize {
    headers.iter().map(|h| h.to_tlv().len()).sum()
}

/// Builds the per-hop header list implied by an [`Interest`].
fn hop_headers_for(packet: &Packet) -> Vec<HopHeader> {
    match packet {
        Packet::Interest(interest) => match interest.lifetime {
            Some(lifetime) => vec![HopHeader::InterestLifetime(lifetime)],
            None => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Encodes a full packet: fixed header, per-hop headers, body TLVs.
///
/// Returns an error rather than panicking when a TLV value — most
/// commonly an oversized ContentObject's content — can't fit the
/// wire format's 16-bit length field (spec.md §7: oversized user
/// content is not a structural invariant violation).
pub fn encode_packet(packet: &Packet) -> Result<Bytes, Error> {
    let hop_headers = hop_headers_for(packet);
    let mut hop_buf = BytesMut::new();
    encode_hop_headers(&hop_headers, &mut hop_buf)?;

    let mut body = BytesMut::new();
    let packet_type = match packet {
        Packet::Interest(interest) => {
            interest.name.to_tlv()?.encode(&mut body)?;
            if let Some(keyid) = &interest.keyid_restriction {
                TlvElement::new(TLV_KEYID_RESTRICTION, Bytes::copy_from_slice(keyid.as_bytes()))
                    .encode(&mut body)?;
            }
            if let Some(hash) = &interest.content_object_hash_restriction {
                TlvElement::new(
                    TLV_CONTENT_OBJECT_HASH_RESTRICTION,
                    Bytes::copy_from_slice(hash.as_bytes()),
                )
                .encode(&mut body)?;
            }
            if let Some(payload) = &interest.payload {
                TlvElement::new(TLV_INTEREST_PAYLOAD, payload.clone()).encode(&mut body)?;
            }
            PACKET_TYPE_INTEREST
        }
        Packet::ContentObject(co) => {
            co.name.to_tlv()?.encode(&mut body)?;
            if let Some(keyid) = &co.keyid {
                TlvElement::new(TLV_KEYID, Bytes::copy_from_slice(keyid.as_bytes())).encode(&mut body)?;
            }
            TlvElement::new(TLV_CONTENT, co.content.clone()).encode(&mut body)?;
            let freshness_ms = co.freshness.as_millis().min(u32::MAX as u128) as u32;
            TlvElement::new(TLV_FRESHNESS, Bytes::copy_from_slice(&freshness_ms.to_be_bytes()))
                .encode(&mut body)?;
            PACKET_TYPE_CONTENT_OBJECT
        }
        Packet::InterestReturn(ret) => {
            ret.name.to_tlv()?.encode(&mut body)?;
            PACKET_TYPE_INTEREST_RETURN
        }
    };

    let header_length = (FIXED_HEADER_LEN + hop_headers_len(&hop_headers)) as u8;
    let total_length = (header_length as usize + body.len()) as u16;

    let header = FixedHeader {
        version: 1,
        packet_type,
        total_length,
        hop_limit: packet.hop_limit(),
        return_code: match packet {
            Packet::InterestReturn(r) => r.return_code,
            _ => 0,
        },
        header_length,
    };

    let mut out = BytesMut::with_capacity(total_length as usize);
    header.encode(&mut out);
    out.extend_from_slice(&hop_buf);
    out.extend_from_slice(&body);
    Ok(out.freeze())
}

/// Decodes a full packet from wire bytes.
pub fn decode_packet(bytes: &[u8]) -> Result<Packet, Error> {
    decode_packet_with_registry(bytes, &HopHeaderRegistry::default_registry())
}

pub fn decode_packet_with_registry(bytes: &[u8], registry: &HopHeaderRegistry) -> Result<Packet, Error> {
    let mut buf = Bytes::copy_from_slice(bytes);
    let header = FixedHeader::decode(&mut buf)?;
    if header.total_length as usize != bytes.len() {
        return Err(Error::Packet(format!(
            "declared total length {} does not match buffer length {}",
            header.total_length,
            bytes.len()
        )));
    }
    if (header.header_length as usize) < FIXED_HEADER_LEN {
        return Err(Error::Packet("header length smaller than fixed header".into()));
    }
    let hop_header_len = header.header_length as usize - FIXED_HEADER_LEN;
    if buf.remaining() < hop_header_len {
        return Err(Error::Packet("truncated per-hop headers".into()));
    }
    let hop_bytes = buf.copy_to_bytes(hop_header_len);
    let hop_headers = registry.decode_all(hop_bytes)?;

    let lifetime = hop_headers.iter().find_map(|h| match h {
        HopHeader::InterestLifetime(d) => Some(*d),
        _ => None,
    });

    match header.packet_type {
        PACKET_TYPE_INTEREST => {
            let name_tlv = TlvElement::decode(&mut buf)?;
            let name = Name::from_tlv(&name_tlv)?;
            let mut interest = Interest::new(name);
            interest.hop_limit = header.hop_limit;
            interest.lifetime = lifetime;
            while buf.has_remaining() {
                let element = TlvElement::decode(&mut buf)?;
                match element.tlv_type {
                    TLV_KEYID_RESTRICTION => {
                        interest.keyid_restriction = Some(decode_hash(&element.value)?);
                    }
                    TLV_CONTENT_OBJECT_HASH_RESTRICTION => {
                        interest.content_object_hash_restriction = Some(decode_hash(&element.value)?);
                    }
                    TLV_INTEREST_PAYLOAD => {
                        interest.payload = Some(element.value);
                    }
                    other => {
                        return Err(Error::Packet(format!("unexpected Interest body TLV {}", other)))
                    }
                }
            }
            Ok(Packet::Interest(interest))
        }
        PACKET_TYPE_CONTENT_OBJECT => {
            let name_tlv = TlvElement::decode(&mut buf)?;
            let name = Name::from_tlv(&name_tlv)?;
            let mut keyid = None;
            let mut content = Bytes::new();
            let mut freshness = None;
            while buf.has_remaining() {
                let element = TlvElement::decode(&mut buf)?;
                match element.tlv_type {
                    TLV_KEYID => keyid = Some(decode_hash(&element.value)?),
                    TLV_CONTENT => content = element.value,
                    TLV_FRESHNESS => {
                        if element.value.len() != 4 {
                            return Err(Error::Packet("freshness TLV must be 4 bytes".into()));
                        }
                        let mut b = [0u8; 4];
                        b.copy_from_slice(&element.value);
                        freshness = Some(Duration::from_millis(u32::from_be_bytes(b) as u64));
                    }
                    other => {
                        return Err(Error::Packet(format!(
                            "unexpected ContentObject body TLV {}",
                            other
                        )))
                    }
                }
            }
            let mut co = ContentObject::new(name, content, keyid);
            co.hop_limit = header.hop_limit;
            if let Some(freshness) = freshness {
                co.freshness = freshness;
            }
            Ok(Packet::ContentObject(co))
        }
        PACKET_TYPE_INTEREST_RETURN => {
            let name_tlv = TlvElement::decode(&mut buf)?;
            let name = Name::from_tlv(&name_tlv)?;
            Ok(Packet::InterestReturn(InterestReturn {
                name,
                return_code: header.return_code,
                hop_limit: header.hop_limit,
            }))
        }
        other => Err(Error::Packet(format!("unknown packet type {}", other))),
    }
}

fn decode_hash(bytes: &Bytes) -> Result<HashValue, Error> {
    if bytes.len() != HashValue::LEN {
        return Err(Error::Packet(format!(
            "expected {}-byte hash, got {}",
            HashValue::LEN,
            bytes.len()
        )));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(bytes);
    Ok(HashValue::from_bytes(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interest_round_trips() {
        let interest = Interest::new(Name::from_uri("/foo/bar"))
            .with_lifetime(Duration::from_millis(1500))
            .with_keyid_restriction(HashValue::digest(b"key"));
        let packet = Packet::Interest(interest.clone());
        let bytes = encode_packet(&packet).unwrap();
        let decoded = decode_packet(&bytes).unwrap();
        match decoded {
            Packet::Interest(got) => {
                assert_eq!(got.name, interest.name);
                assert_eq!(got.lifetime, interest.lifetime);
                assert_eq!(got.keyid_restriction, interest.keyid_restriction);
            }
            _ => panic!("expected Interest"),
        }
    }

    #[test]
    fn interest_payload_round_trips() {
        let interest = Interest::new(Name::from_uri("/nfp/hello")).with_payload(Bytes::from_static(b"nfp-bytes"));
        let packet = Packet::Interest(interest.clone());
        let bytes = encode_packet(&packet).unwrap();
        let decoded = decode_packet(&bytes).unwrap();
        match decoded {
            Packet::Interest(got) => assert_eq!(got.payload, interest.payload),
            _ => panic!("expected Interest"),
        }
    }

    #[test]
    fn content_object_round_trips() {
        let co = ContentObject::new(Name::from_uri("/a/b"), Bytes::from_static(b"payload"), None);
        let packet = Packet::ContentObject(co.clone());
        let bytes = encode_packet(&packet).unwrap();
        let decoded = decode_packet(&bytes).unwrap();
        match decoded {
            Packet::ContentObject(got) => {
                assert_eq!(got.name, co.name);
                assert_eq!(got.content, co.content);
                assert_eq!(got.hash, co.hash);
            }
            _ => panic!("expected ContentObject"),
        }
    }

    #[test]
    fn rejects_length_mismatch() {
        let co = ContentObject::new(Name::from_uri("/a"), Bytes::from_static(b"x"), None);
        let mut bytes = encode_packet(&Packet::ContentObject(co)).unwrap().to_vec();
        bytes.push(0); // trailing garbage byte invalidates declared total_length
        assert!(decode_packet(&bytes).is_err());
    }
}
