//! The work queue: an insertion-ordered set of (anchor, prefix) pairs
//! awaiting transmission, plus MTU-bounded packaging into
//! [`NfpPayload`]s. See spec.md §4.9.

use ccnf_common::error::Error;
use ccnf_common::name::Name;
use ccnf_common::nfp_wire::{NfpMessage, NfpPayload};
use std::collections::{HashSet, VecDeque};

/// Ordered set semantics: `enqueue` is a no-op if the pair is already
/// present, so rapid repeated updates to the same (anchor, prefix)
/// collapse into one pending entry.
#[derive(Default)]
pub struct WorkQueue {
    order: VecDeque<(Name, Name)>,
    present: HashSet<(Name, Name)>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the pair was newly inserted.
    pub fn enqueue(&mut self, anchor: Name, prefix: Name) -> bool {
        let key = (anchor, prefix);
        if self.present.insert(key.clone()) {
            self.order.push_back(key);
            true
        } else {
            false
        }
    }

    pub fn dequeue(&mut self) -> Option<(Name, Name)> {
        let item = self.order.pop_front()?;
        self.present.remove(&item);
        Some(item)
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
}

/// Greedily packs `messages` into as few [`NfpPayload`]s as fit within
/// `max_bytes` each. Errors if a single message alone would exceed
/// `max_bytes` — spec.md §4.9 requires the minimum configured MTU to
/// accommodate at least one maximal message, so this signals a
/// configuration error rather than something to work around silently.
pub fn pack_payloads(
    router_name: &Name,
    message_seqnum: u16,
    messages: Vec<NfpMessage>,
    max_bytes: usize,
) -> Result<Vec<NfpPayload>, Error> {
    let mut payloads = Vec::new();
    let mut current = NfpPayload::new(router_name.clone(), message_seqnum);

    for message in messages {
        current.messages.push(message);
        if current.encoded_len() <= max_bytes {
            continue;
        }
        let overflow = current.messages.pop().expect("just pushed");
        if current.messages.is_empty() {
            return Err(Error::Nfp("a single NFP message exceeds the minimum configured MTU".into()));
        }
        payloads.push(std::mem::replace(&mut current, NfpPayload::new(router_name.clone(), message_seqnum)));
        current.messages.push(overflow);
        if current.encoded_len() > max_bytes {
            return Err(Error::Nfp("a single NFP message exceeds the minimum configured MTU".into()));
        }
    }

    if !current.messages.is_empty() {
        payloads.push(current);
    }
    Ok(payloads)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_is_idempotent_and_preserves_order() {
        let mut q = WorkQueue::new();
        assert!(q.enqueue(Name::from_uri("/a"), Name::from_uri("/p1")));
        assert!(q.enqueue(Name::from_uri("/a"), Name::from_uri("/p2")));
        assert!(!q.enqueue(Name::from_uri("/a"), Name::from_uri("/p1")));
        assert_eq!(q.len(), 2);
        assert_eq!(q.dequeue(), Some((Name::from_uri("/a"), Name::from_uri("/p1"))));
        assert_eq!(q.dequeue(), Some((Name::from_uri("/a"), Name::from_uri("/p2"))));
        assert!(q.dequeue().is_none());
    }

    #[test]
    fn requeue_after_dequeue_is_allowed() {
        let mut q = WorkQueue::new();
        q.enqueue(Name::from_uri("/a"), Name::from_uri("/p1"));
        q.dequeue();
        assert!(q.enqueue(Name::from_uri("/a"), Name::from_uri("/p1")));
    }

    fn advertise(n: u32) -> NfpMessage {
        NfpMessage::Advertise {
            anchor: Name::from_uri(&format!("/anchor{n}")),
            prefix: Name::from_uri(&format!("/prefix{n}")),
            anchor_seqnum: n,
            distance: 1,
        }
    }

    #[test]
    fn splits_into_multiple_payloads_when_mtu_bound() {
        let router = Name::from_uri("/nfp/router1");
        let messages: Vec<_> = (0..20).map(advertise).collect();
        let single = NfpPayload::new(router.clone(), 1).with_messages(vec![advertise(0)]).encoded_len();
        let payloads = pack_payloads(&router, 1, messages, single + 4).unwrap();
        assert!(payloads.len() > 1);
        for payload in &payloads {
            assert!(payload.encoded_len() <= single + 4);
        }
        let total: usize = payloads.iter().map(|p| p.messages.len()).sum();
        assert_eq!(total, 20);
    }

    #[test]
    fn single_oversized_message_is_an_error() {
        let router = Name::from_uri("/nfp/router1");
        let err = pack_payloads(&router, 1, vec![advertise(0)], 4);
        assert!(err.is_err());
    }

    #[test]
    fn empty_queue_yields_no_payloads() {
        let router = Name::from_uri("/nfp/router1");
        let payloads = pack_payloads(&router, 1, Vec::new(), 1500).unwrap();
        assert!(payloads.is_empty());
    }
}
