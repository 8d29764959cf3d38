//! Name, NameComponent, and HashValue: the ordered multi-segment
//! identifiers used throughout the forwarding pipeline and NFP.
//!
//! See spec.md §3 ("Name", "HashValue").

use crate::error::Error;
use crate::tlv::TlvElement;
use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// TLV type used to carry a single name component.
pub const TLV_NAME_COMPONENT: u16 = 0x0001;
/// TLV type used to carry an encoded [`Name`].
pub const TLV_NAME: u16 = 0x0002;

/// The type tag carried by a name component. `Generic` is the default;
/// the other variants let a name segment carry routing metadata without
/// being confused with an ordinary application-chosen segment when
/// names are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ComponentType {
    Generic = 0,
    /// A segment carrying a monotonically increasing sequence number.
    Sequence = 1,
    /// A segment naming the originating NFP anchor.
    Anchor = 2,
}

impl ComponentType {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ComponentType::Sequence,
            2 => ComponentType::Anchor,
            _ => ComponentType::Generic,
        }
    }
}

/// A single, opaque, typed name segment.
///
/// Ordering is `(type, bytes)` as required by spec.md §3.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameComponent {
    pub component_type: ComponentType,
    pub bytes: Bytes,
}

impl NameComponent {
    pub fn new(component_type: ComponentType, bytes: impl Into<Bytes>) -> Self {
        Self {
            component_type,
            bytes: bytes.into(),
        }
    }

    pub fn generic(bytes: impl Into<Bytes>) -> Self {
        Self::new(ComponentType::Generic, bytes)
    }

    pub fn to_tlv(&self) -> TlvElement {
        let mut value = BytesMut::with_capacity(1 + self.bytes.len());
        value.extend_from_slice(&[self.component_type as u8]);
        value.extend_from_slice(&self.bytes);
        TlvElement::new(TLV_NAME_COMPONENT, value.freeze())
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, Error> {
        if element.tlv_type != TLV_NAME_COMPONENT {
            return Err(Error::Packet(format!(
                "expected name component TLV type {}, got {}",
                TLV_NAME_COMPONENT, element.tlv_type
            )));
        }
        if element.value.is_empty() {
            return Err(Error::Packet("empty name component TLV value".into()));
        }
        let component_type = ComponentType::from_u8(element.value[0]);
        let bytes = element.value.slice(1..);
        Ok(Self {
            component_type,
            bytes,
        })
    }
}

impl PartialOrd for NameComponent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NameComponent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.component_type
            .cmp(&other.component_type)
            .then_with(|| self.bytes.as_ref().cmp(other.bytes.as_ref()))
    }
}

impl fmt::Display for NameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let printable = self.bytes.iter().all(|&b| b.is_ascii_graphic() || b == b' ');
        if printable {
            write!(f, "{}", String::from_utf8_lossy(&self.bytes))
        } else {
            write!(f, "0x")?;
            for &b in &self.bytes {
                write!(f, "{:02x}", b)?;
            }
            Ok(())
        }
    }
}

/// An ordered sequence of [`NameComponent`]s.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Name {
    components: Vec<NameComponent>,
}

impl Name {
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Parses a `/`-separated URI-style name. Every component is `Generic`.
    pub fn from_uri(s: &str) -> Self {
        let components = s
            .split('/')
            .filter(|c| !c.is_empty())
            .map(|c| NameComponent::generic(c.as_bytes().to_vec()))
            .collect();
        Self { components }
    }

    pub fn push(&mut self, component: NameComponent) -> &mut Self {
        self.components.push(component);
        self
    }

    pub fn with(mut self, component: NameComponent) -> Self {
        self.components.push(component);
        self
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> impl Iterator<Item = &NameComponent> {
        self.components.iter()
    }

    pub fn get(&self, index: usize) -> Option<&NameComponent> {
        self.components.get(index)
    }

    /// The first `len` components, as a new `Name`.
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            components: self.components.iter().take(len).cloned().collect(),
        }
    }

    /// True iff `self` is a prefix of `other`: `other` has at least as
    /// many components and every component of `self` equals the
    /// corresponding component of `other`.
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        if self.components.len() > other.components.len() {
            return false;
        }
        self.components
            .iter()
            .zip(other.components.iter())
            .all(|(a, b)| a == b)
    }

    /// Wire encoding, per spec.md §6 ("names" are TLV-encoded).
    pub fn to_tlv(&self) -> Result<TlvElement, Error> {
        let mut buf = BytesMut::new();
        for component in &self.components {
            component.to_tlv().encode(&mut buf)?;
        }
        Ok(TlvElement::new(TLV_NAME, buf.freeze()))
    }

    pub fn from_tlv(element: &TlvElement) -> Result<Self, Error> {
        if element.tlv_type != TLV_NAME {
            return Err(Error::Packet(format!(
                "expected name TLV type {}, got {}",
                TLV_NAME, element.tlv_type
            )));
        }
        let mut components = Vec::new();
        let mut buf = element.value.clone();
        while buf.has_remaining() {
            let e = TlvElement::decode(&mut buf)?;
            components.push(NameComponent::from_tlv(&e)?);
        }
        Ok(Self { components })
    }
}

/// Total order: lexicographic over `(type, bytes)` per segment, then
/// shortest-name-first when one name is a prefix of the other.
impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.components.iter().zip(other.components.iter()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                other_ord => return other_ord,
            }
        }
        self.components.len().cmp(&other.components.len())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

/* ---------------------------------------------------------------- *
 * HashValue
 * ---------------------------------------------------------------- */

/// A fixed-width opaque identifier with a total order, used for
/// `KeyId` and `ContentObjectHash` (spec.md §3).
///
/// CCNF performs no cryptographic signature validation (spec.md §1
/// Non-goals); this is a stable content-addressing digest, not a
/// security property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HashValue(pub [u8; 32]);

impl HashValue {
    pub const LEN: usize = 32;

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Computes a stable digest of the given bytes. Widens a 64-bit
    /// FNV-1a hash into the 32-byte value rather than pulling in a
    /// cryptographic hash crate, since no security property is claimed.
    pub fn digest(data: &[u8]) -> Self {
        let mut out = [0u8; 32];
        let mut state: u64 = 0xcbf29ce484222325;
        for chunk_index in 0..4 {
            for &byte in data {
                state ^= byte as u64;
                state = state.wrapping_mul(0x100000001b3);
                state ^= chunk_index as u64;
            }
            out[chunk_index * 8..chunk_index * 8 + 8].copy_from_slice(&state.to_be_bytes());
        }
        Self(out)
    }
}

impl fmt::Display for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_segment_wise() {
        let a = Name::from_uri("/foo/bar");
        let b = Name::from_uri("/foo/bar");
        let c = Name::from_uri("/foo/baz");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn prefix_relation() {
        let foo = Name::from_uri("/foo");
        let foo_bar = Name::from_uri("/foo/bar");
        assert!(foo.is_prefix_of(&foo_bar));
        assert!(!foo_bar.is_prefix_of(&foo));
        assert!(foo.is_prefix_of(&foo));
    }

    #[test]
    fn shortest_name_sorts_first_on_common_prefix() {
        let foo = Name::from_uri("/foo");
        let foo_bar = Name::from_uri("/foo/bar");
        assert!(foo < foo_bar);
    }

    #[test]
    fn ordering_is_lexicographic_over_type_then_bytes() {
        let a = Name::new().with(NameComponent::new(ComponentType::Generic, &b"a"[..]));
        let b = Name::new().with(NameComponent::new(ComponentType::Sequence, &b"a"[..]));
        assert!(a < b, "Generic(0) should sort before Sequence(1) on equal bytes");
    }

    #[test]
    fn name_tlv_round_trips() {
        let name = Name::from_uri("/foo/bar/baz");
        let tlv = name.to_tlv().unwrap();
        let decoded = Name::from_tlv(&tlv).unwrap();
        assert_eq!(name, decoded);
    }

    #[test]
    fn hash_value_is_deterministic() {
        let a = HashValue::digest(b"hello world");
        let b = HashValue::digest(b"hello world");
        let c = HashValue::digest(b"hello worlds");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
