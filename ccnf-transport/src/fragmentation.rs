//! Chunking a wire-encoded packet into MTU-sized fragments for
//! transmission over a QUIC stream, and reassembling them on the
//! receiving end.

use crate::MAX_PACKET_SIZE;
use anyhow::{anyhow, Result};
use bytes::{Bytes, BytesMut};
use log::trace;
use std::collections::VecDeque;

/// How many `fragment_size`-sized pieces `packet_size` bytes split
/// into. Used to preallocate the fragment `Vec` so `fragment_packet`
/// never reallocates mid-split.
pub fn calculate_fragment_count(packet_size: usize, fragment_size: usize) -> usize {
    (packet_size + fragment_size - 1) / fragment_size
}

/// Splits `packet` into chunks no larger than `fragment_size`.
pub fn fragment_packet(packet: &[u8], fragment_size: usize) -> Vec<Bytes> {
    let mut fragments = Vec::with_capacity(calculate_fragment_count(packet.len(), fragment_size));
    let mut offset = 0;

    while offset < packet.len() {
        let end = std::cmp::min(offset + fragment_size, packet.len());
        fragments.push(Bytes::copy_from_slice(&packet[offset..end]));
        offset = end;
    }

    trace!("fragmented {} bytes into {} fragments", packet.len(), fragments.len());
    fragments
}

/// Reassembles fragments read off a stream, in arrival order, back
/// into the original wire-encoded packet. Rejects totals over
/// `MAX_PACKET_SIZE`: that's the ceiling the wire format's own
/// `total_length` field can express, so anything bigger could only be
/// a peer that ignored fragmentation or a corrupt/hostile stream —
/// either way `decode_packet` would reject it, but there's no reason
/// to buffer it first.
pub fn assemble_fragments(fragments: VecDeque<Bytes>) -> Result<Bytes> {
    let total_size: usize = fragments.iter().map(|f| f.len()).sum();
    if total_size == 0 {
        return Err(anyhow!("no fragments to assemble"));
    }
    if total_size > MAX_PACKET_SIZE {
        return Err(anyhow!("reassembled packet of {total_size} bytes exceeds the {MAX_PACKET_SIZE}-byte wire ceiling"));
    }

    let mut buffer = BytesMut::with_capacity(total_size);
    for fragment in fragments {
        buffer.extend_from_slice(&fragment);
    }

    trace!("assembled {} bytes from fragments", buffer.len());
    Ok(buffer.freeze())
}

/// Whether a packet of `packet_size` bytes exceeds `mtu` and needs
/// fragmenting before it is written to a stream.
pub fn needs_fragmentation(packet_size: usize, mtu: usize) -> bool {
    packet_size > mtu
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragmentation_round_trips() {
        let packet = vec![7u8; 10_000];
        let fragments = fragment_packet(&packet, 1000);
        assert_eq!(fragments.len(), 10);

        let reassembled = assemble_fragments(fragments.into()).unwrap();
        assert_eq!(reassembled, Bytes::from(packet));
    }

    #[test]
    fn needs_fragmentation_compares_against_mtu() {
        assert!(needs_fragmentation(1500, 1200));
        assert!(!needs_fragmentation(1000, 1200));
    }

    #[test]
    fn fragment_count_rounds_up() {
        assert_eq!(calculate_fragment_count(1000, 1000), 1);
        assert_eq!(calculate_fragment_count(1001, 1000), 2);
        assert_eq!(calculate_fragment_count(2500, 1000), 3);
    }

    #[test]
    fn assembling_nothing_is_an_error() {
        assert!(assemble_fragments(VecDeque::new()).is_err());
    }

    #[test]
    fn assembling_over_the_wire_ceiling_is_an_error() {
        let mut fragments = VecDeque::new();
        fragments.push_back(Bytes::from(vec![0u8; MAX_PACKET_SIZE]));
        fragments.push_back(Bytes::from(vec![0u8; 1]));
        assert!(assemble_fragments(fragments).is_err());
    }
}
