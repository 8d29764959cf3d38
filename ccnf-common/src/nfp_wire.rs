//! NFP payload wire format: the TLV-structured content carried as an
//! Interest payload to `/nfp`. See spec.md §6 ("NFP payload layout").

use crate::error::Error;
use crate::name::Name;
use crate::tlv::TlvElement;
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const T_MSG: u16 = 0x0100;
pub const T_MSG_SEQNUM: u16 = 0x0101;
pub const T_ADV: u16 = 0x0102;
pub const T_WITHDRAW: u16 = 0x0103;
pub const T_ADV_DATA: u16 = 0x0104;

/// A single advertisement or withdraw carried inside an [`NfpPayload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NfpMessage {
    Advertise {
        anchor: Name,
        prefix: Name,
        anchor_seqnum: u32,
        distance: u16,
    },
    Withdraw {
        anchor: Name,
        prefix: Name,
    },
}

impl NfpMessage {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), Error> {
        match self {
            NfpMessage::Advertise {
                anchor,
                prefix,
                anchor_seqnum,
                distance,
            } => {
                let mut body = BytesMut::new();
                anchor.to_tlv()?.encode(&mut body)?;
                prefix.to_tlv()?.encode(&mut body)?;
                let mut data = BytesMut::with_capacity(6);
                data.put_u32(*anchor_seqnum);
                data.put_u16(*distance);
                TlvElement::new(T_ADV_DATA, data.freeze()).encode(&mut body)?;
                TlvElement::new(T_ADV, body.freeze()).encode(buf)?;
            }
            NfpMessage::Withdraw { anchor, prefix } => {
                let mut body = BytesMut::new();
                anchor.to_tlv()?.encode(&mut body)?;
                prefix.to_tlv()?.encode(&mut body)?;
                TlvElement::new(T_WITHDRAW, body.freeze()).encode(buf)?;
            }
        }
        Ok(())
    }

    fn decode(element: &TlvElement) -> Result<Self, Error> {
        let mut body = element.value.clone();
        match element.tlv_type {
            T_ADV => {
                let anchor_tlv = TlvElement::decode(&mut body)?;
                let anchor = Name::from_tlv(&anchor_tlv)?;
                let prefix_tlv = TlvElement::decode(&mut body)?;
                let prefix = Name::from_tlv(&prefix_tlv)?;
                let data_tlv = TlvElement::decode(&mut body)?;
                if data_tlv.tlv_type != T_ADV_DATA || data_tlv.value.len() != 6 {
                    return Err(Error::Nfp("malformed T_ADV_DATA".into()));
                }
                let mut v = data_tlv.value.clone();
                let anchor_seqnum = v.get_u32();
                let distance = v.get_u16();
                Ok(NfpMessage::Advertise {
                    anchor,
                    prefix,
                    anchor_seqnum,
                    distance,
                })
            }
            T_WITHDRAW => {
                let anchor_tlv = TlvElement::decode(&mut body)?;
                let anchor = Name::from_tlv(&anchor_tlv)?;
                let prefix_tlv = TlvElement::decode(&mut body)?;
                let prefix = Name::from_tlv(&prefix_tlv)?;
                Ok(NfpMessage::Withdraw { anchor, prefix })
            }
            other => Err(Error::Nfp(format!("unexpected NFP message TLV type {}", other))),
        }
    }
}

/// The payload of an Interest addressed to the NFP routing name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NfpPayload {
    pub router_name: Name,
    pub message_seqnum: u16,
    pub messages: Vec<NfpMessage>,
}

impl NfpPayload {
    pub fn new(router_name: Name, message_seqnum: u16) -> Self {
        Self {
            router_name,
            message_seqnum,
            messages: Vec::new(),
        }
    }

    pub fn with_messages(mut self, messages: Vec<NfpMessage>) -> Self {
        self.messages = messages;
        self
    }

    /// Size this payload would occupy on the wire, used by the work
    /// queue to pace messages into MTU-sized payloads (spec.md §4.9).
    /// An unencodable payload (names too large for the TLV length
    /// field) reports `usize::MAX` so the work queue never mistakes it
    /// for something that fits.
    pub fn encoded_len(&self) -> usize {
        self.to_tlv().map(|t| t.len()).unwrap_or(usize::MAX)
    }

    fn to_tlv(&self) -> Result<TlvElement, Error> {
        let mut body = BytesMut::new();
        self.router_name.to_tlv()?.encode(&mut body)?;
        let mut seqnum = BytesMut::with_capacity(2);
        seqnum.put_u16(self.message_seqnum);
        TlvElement::new(T_MSG_SEQNUM, seqnum.freeze()).encode(&mut body)?;
        for message in &self.messages {
            message.encode(&mut body)?;
        }
        Ok(TlvElement::new(T_MSG, body.freeze()))
    }

    pub fn encode(&self) -> Result<Bytes, Error> {
        let mut buf = BytesMut::new();
        self.to_tlv()?.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let mut cursor = Bytes::copy_from_slice(bytes);
        let outer = TlvElement::decode(&mut cursor)?;
        if outer.tlv_type != T_MSG {
            return Err(Error::Nfp(format!("expected T_MSG, got {}", outer.tlv_type)));
        }
        let mut body = outer.value.clone();
        let name_tlv = TlvElement::decode(&mut body)?;
        let router_name = Name::from_tlv(&name_tlv)?;
        let seqnum_tlv = TlvElement::decode(&mut body)?;
        if seqnum_tlv.tlv_type != T_MSG_SEQNUM || seqnum_tlv.value.len() != 2 {
            return Err(Error::Nfp("malformed T_MSG_SEQNUM".into()));
        }
        let mut v = seqnum_tlv.value.clone();
        let message_seqnum = v.get_u16();

        let mut messages = Vec::new();
        while body.has_remaining() {
            let element = TlvElement::decode(&mut body)?;
            messages.push(NfpMessage::decode(&element)?);
        }
        Ok(Self {
            router_name,
            message_seqnum,
            messages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_round_trips() {
        let payload = NfpPayload::new(Name::from_uri("/nfp/router1"), 7);
        let bytes = payload.encode().unwrap();
        let decoded = NfpPayload::decode(&bytes).unwrap();
        assert_eq!(payload, decoded);
    }

    #[test]
    fn payload_with_messages_round_trips() {
        let payload = NfpPayload::new(Name::from_uri("/nfp/router1"), 42).with_messages(vec![
            NfpMessage::Advertise {
                anchor: Name::from_uri("/nfp/router2"),
                prefix: Name::from_uri("/data/videos"),
                anchor_seqnum: 5,
                distance: 3,
            },
            NfpMessage::Withdraw {
                anchor: Name::from_uri("/nfp/router3"),
                prefix: Name::from_uri("/data/audio"),
            },
        ]);
        let bytes = payload.encode().unwrap();
        let decoded = NfpPayload::decode(&bytes).unwrap();
        assert_eq!(payload, decoded);
        assert_eq!(decoded.messages.len(), 2);
    }
}
