//! Per-adjacency hello state machine. See spec.md §4.6.

use crate::seqnum::is_in_order16;
use ccnf_common::name::Name;
use ccnf_core::connection::ConnectionId;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborState {
    Up,
    Down,
    Dead,
}

/// `(Name, Connection) -> {messageSeqnum, expiryTime, state, timer}`
/// from spec.md §3. The "timer" is owned by whoever drives [`tick`],
/// not by this struct — see `protocol.rs`.
pub struct Neighbor {
    name: Name,
    connection: ConnectionId,
    message_seqnum: u16,
    expiry: Instant,
    state: NeighborState,
}

impl Neighbor {
    /// A neighbor is only ever constructed from a first hello, which
    /// always lands it in `Up` (spec.md §4.6, "INIT -> Up ... no
    /// callback").
    pub fn new(name: Name, connection: ConnectionId, seqnum: u16, now: Instant, neighbor_timeout: Duration) -> Self {
        Self {
            name,
            connection,
            message_seqnum: seqnum,
            expiry: now + neighbor_timeout,
            state: NeighborState::Up,
        }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn state(&self) -> NeighborState {
        self.state
    }

    pub fn message_seqnum(&self) -> u16 {
        self.message_seqnum
    }

    /// Applies an incoming hello. Returns `true` if it was in-order
    /// and accepted, resetting `expiry` and moving `Down -> Up` or
    /// holding `Up -> Up`. An out-of-order hello is ignored entirely.
    pub fn receive_hello(&mut self, seqnum: u16, now: Instant, neighbor_timeout: Duration) -> bool {
        if !is_in_order16(self.message_seqnum, seqnum) {
            return false;
        }
        self.message_seqnum = seqnum;
        self.expiry = now + neighbor_timeout;
        self.state = NeighborState::Up;
        true
    }

    /// One timer tick. Returns the new state if a transition occurred
    /// (the caller should invoke its state-change callback), or `None`
    /// if the expiry hasn't been reached yet or the neighbor is
    /// already `Dead` (owner should have deleted it).
    pub fn tick(&mut self, now: Instant, neighbor_timeout: Duration) -> Option<NeighborState> {
        if now < self.expiry {
            return None;
        }
        match self.state {
            NeighborState::Up => {
                self.state = NeighborState::Down;
                self.expiry = now + neighbor_timeout;
                Some(NeighborState::Down)
            }
            NeighborState::Down => {
                self.state = NeighborState::Dead;
                Some(NeighborState::Dead)
            }
            NeighborState::Dead => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(6);

    fn neighbor_at(now: Instant) -> Neighbor {
        Neighbor::new(Name::from_uri("/routers/a"), ConnectionId(1), 0, now, TIMEOUT)
    }

    #[test]
    fn construction_starts_up() {
        let n = neighbor_at(Instant::now());
        assert_eq!(n.state(), NeighborState::Up);
    }

    #[test]
    fn in_order_hello_extends_expiry_and_stays_up() {
        let now = Instant::now();
        let mut n = neighbor_at(now);
        assert!(n.receive_hello(1, now + Duration::from_secs(1), TIMEOUT));
        assert_eq!(n.state(), NeighborState::Up);
        assert_eq!(n.message_seqnum(), 1);
    }

    #[test]
    fn out_of_order_hello_is_ignored() {
        let now = Instant::now();
        let mut n = neighbor_at(now);
        n.receive_hello(5, now, TIMEOUT);
        assert!(!n.receive_hello(5, now, TIMEOUT));
        assert!(!n.receive_hello(3, now, TIMEOUT));
        assert_eq!(n.message_seqnum(), 5);
    }

    #[test]
    fn missing_hellos_transition_up_down_dead() {
        let now = Instant::now();
        let mut n = neighbor_at(now);

        assert_eq!(n.tick(now, TIMEOUT), None);

        let down_at = now + TIMEOUT;
        assert_eq!(n.tick(down_at, TIMEOUT), Some(NeighborState::Down));
        assert_eq!(n.state(), NeighborState::Down);

        let dead_at = down_at + TIMEOUT;
        assert_eq!(n.tick(dead_at, TIMEOUT), Some(NeighborState::Dead));
        assert_eq!(n.state(), NeighborState::Dead);
        assert_eq!(n.tick(dead_at + TIMEOUT, TIMEOUT), None);
    }

    #[test]
    fn hello_while_down_returns_to_up() {
        let now = Instant::now();
        let mut n = neighbor_at(now);
        n.tick(now + TIMEOUT, TIMEOUT);
        assert_eq!(n.state(), NeighborState::Down);
        assert!(n.receive_hello(1, now + TIMEOUT, TIMEOUT));
        assert_eq!(n.state(), NeighborState::Up);
    }
}
