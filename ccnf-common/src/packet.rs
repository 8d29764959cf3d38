//! Packet types: Interest, ContentObject, InterestReturn.
//!
//! See spec.md §3 ("Packet").

use crate::name::{HashValue, Name};
use bytes::Bytes;
use std::time::Duration;

/// Default Interest lifetime when none is carried on the wire
/// (spec.md §4.3, "Interest expiry time").
pub const DEFAULT_INTEREST_LIFETIME: Duration = Duration::from_millis(200);

/// A named request for a matching [`ContentObject`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interest {
    pub name: Name,
    pub keyid_restriction: Option<HashValue>,
    pub content_object_hash_restriction: Option<HashValue>,
    pub lifetime: Option<Duration>,
    pub hop_limit: u8,
    /// Small opaque payload piggybacked on the Interest. Used by the
    /// NFP routing protocol to carry an `NfpPayload` (spec.md §4.10);
    /// ordinary forwarding Interests leave this `None`.
    pub payload: Option<Bytes>,
}

impl Interest {
    pub fn new(name: Name) -> Self {
        Self {
            name,
            keyid_restriction: None,
            content_object_hash_restriction: None,
            lifetime: None,
            hop_limit: 255,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_keyid_restriction(mut self, keyid: HashValue) -> Self {
        self.keyid_restriction = Some(keyid);
        self
    }

    pub fn with_content_object_hash_restriction(mut self, hash: HashValue) -> Self {
        self.content_object_hash_restriction = Some(hash);
        self
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    /// The expiry-relevant lifetime: the carried value, or the default.
    pub fn effective_lifetime(&self) -> Duration {
        self.lifetime.unwrap_or(DEFAULT_INTEREST_LIFETIME)
    }
}

/// Default freshness window backing a Content Store entry's staleness
/// flag (spec.md §3, "Content Store Entry ... expiry/staleness
/// flags"). Mirrors the teacher's `Data::ttl_ms` default of 10s.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(10);

/// A named, content-addressed data packet satisfying Interests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentObject {
    pub name: Name,
    pub content: Bytes,
    pub keyid: Option<HashValue>,
    pub hash: HashValue,
    pub hop_limit: u8,
    /// How long after being cached this object remains fresh. The
    /// Content Store uses this to derive an entry's expiry.
    pub freshness: Duration,
}

impl ContentObject {
    /// Constructs a `ContentObject`, computing its `ContentObjectHash`
    /// from the name, keyid, and content (spec.md §3: "computed
    /// ContentObjectHash").
    pub fn new(name: Name, content: impl Into<Bytes>, keyid: Option<HashValue>) -> Self {
        let content = content.into();
        let hash = compute_content_object_hash(&name, keyid.as_ref(), &content);
        Self {
            name,
            content,
            keyid,
            hash,
            hop_limit: 255,
            freshness: DEFAULT_FRESHNESS,
        }
    }

    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }
}

fn compute_content_object_hash(name: &Name, keyid: Option<&HashValue>, content: &Bytes) -> HashValue {
    let mut buf = Vec::with_capacity(content.len() + 64);
    buf.extend_from_slice(name.to_string().as_bytes());
    if let Some(k) = keyid {
        buf.extend_from_slice(k.as_bytes());
    }
    buf.extend_from_slice(content);
    HashValue::digest(&buf)
}

/// A negative acknowledgement returned when a packet could not be
/// forwarded. CCNF treats these as unsupported on ingress (spec.md
/// §4.5: "InterestReturn / unknown: drop") but still needs a concrete
/// representation for the wire codec and for tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterestReturn {
    pub name: Name,
    pub return_code: u8,
    pub hop_limit: u8,
}

/// The three wire-level packet kinds, per spec.md §3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Interest(Interest),
    ContentObject(ContentObject),
    InterestReturn(InterestReturn),
}

impl Packet {
    pub fn name(&self) -> &Name {
        match self {
            Packet::Interest(i) => &i.name,
            Packet::ContentObject(c) => &c.name,
            Packet::InterestReturn(r) => &r.name,
        }
    }

    pub fn hop_limit(&self) -> u8 {
        match self {
            Packet::Interest(i) => i.hop_limit,
            Packet::ContentObject(c) => c.hop_limit,
            Packet::InterestReturn(r) => r.hop_limit,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Interest(_) => "Interest",
            Packet::ContentObject(_) => "ContentObject",
            Packet::InterestReturn(_) => "InterestReturn",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_object_hash_is_stable_for_equal_inputs() {
        let name = Name::from_uri("/a/b");
        let a = ContentObject::new(name.clone(), Bytes::from_static(b"x"), None);
        let b = ContentObject::new(name, Bytes::from_static(b"x"), None);
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn content_object_hash_differs_by_content() {
        let name = Name::from_uri("/a/b");
        let a = ContentObject::new(name.clone(), Bytes::from_static(b"x"), None);
        let b = ContentObject::new(name, Bytes::from_static(b"y"), None);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn interest_effective_lifetime_defaults() {
        let i = Interest::new(Name::from_uri("/a"));
        assert_eq!(i.effective_lifetime(), DEFAULT_INTEREST_LIFETIME);
        let i = i.with_lifetime(Duration::from_millis(500));
        assert_eq!(i.effective_lifetime(), Duration::from_millis(500));
    }
}
