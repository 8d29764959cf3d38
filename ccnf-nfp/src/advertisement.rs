//! Per-(prefix, anchor) feasibility tracking and equal-cost next-hop
//! sets. See spec.md §3 ("NFP AnchorAdvertisement", "NFP Prefix") and
//! §4.8.

use crate::seqnum::is_in_order32;
use ccnf_common::name::Name;
use ccnf_core::connection::ConnectionId;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiseOutcome {
    /// A strictly better (seqnum, distance) arrived; the next-hop set
    /// was cleared and reseeded with just this advertisement's sender.
    Replace,
    /// Matched the current best (seqnum, distance); the sender was
    /// added to the existing next-hop set.
    EqualCost,
    /// Not feasible; the advertisement was discarded.
    Ignore,
}

/// `(bestAnchorSeqnum, bestDistance, {(Connection, expiryTime)})` for
/// one (prefix, anchor) pair.
pub struct AnchorAdvertisement {
    best_seqnum: u32,
    best_distance: u16,
    next_hops: HashMap<ConnectionId, Instant>,
}

impl AnchorAdvertisement {
    /// A table entry only ever comes into being from a received
    /// advertisement, which is trivially feasible against nothing.
    fn new(anchor_seqnum: u32, distance: u16, ingress: ConnectionId, expiry: Instant) -> Self {
        let mut next_hops = HashMap::new();
        next_hops.insert(ingress, expiry);
        Self {
            best_seqnum: anchor_seqnum,
            best_distance: distance,
            next_hops,
        }
    }

    pub fn best_seqnum(&self) -> u32 {
        self.best_seqnum
    }

    pub fn best_distance(&self) -> u16 {
        self.best_distance
    }

    fn is_feasible(&self, anchor_seqnum: u32, distance: u16) -> bool {
        is_in_order32(self.best_seqnum, anchor_seqnum)
            || (anchor_seqnum == self.best_seqnum && distance <= self.best_distance)
    }

    /// Applies an incoming advertisement. See spec.md §4.8 — the
    /// "loop-back of our own advertisement" case needs no special
    /// handling: our own re-flooded advertisement always carries a
    /// higher distance than our local origin (distance 0), so
    /// `is_feasible` rejects it on its own.
    fn receive(&mut self, anchor_seqnum: u32, distance: u16, ingress: ConnectionId, expiry: Instant) -> AdvertiseOutcome {
        if !self.is_feasible(anchor_seqnum, distance) {
            return AdvertiseOutcome::Ignore;
        }
        let higher_seqnum = is_in_order32(self.best_seqnum, anchor_seqnum);
        let strictly_closer = anchor_seqnum == self.best_seqnum && distance < self.best_distance;
        if higher_seqnum || strictly_closer {
            self.best_seqnum = anchor_seqnum;
            self.best_distance = distance;
            self.next_hops.clear();
            self.next_hops.insert(ingress, expiry);
            AdvertiseOutcome::Replace
        } else {
            self.next_hops.insert(ingress, expiry);
            AdvertiseOutcome::EqualCost
        }
    }

    fn withdraw(&mut self, ingress: ConnectionId) {
        self.next_hops.remove(&ingress);
    }

    fn is_reachable(&self) -> bool {
        !self.next_hops.is_empty()
    }

    /// Drops next-hops whose expiry has passed, per spec.md §4.8
    /// ("Expiry maintenance").
    fn prune(&mut self, now: Instant) {
        self.next_hops.retain(|_, expiry| *expiry > now);
    }

    fn next_hops(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.next_hops.keys().copied()
    }
}

/// `Name -> (anchorName -> AnchorAdvertisement)`, aggregated across
/// anchors to form the FIB image for a prefix.
#[derive(Default)]
pub struct PrefixTable {
    prefixes: HashMap<Name, HashMap<Name, AnchorAdvertisement>>,
}

impl PrefixTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one incoming T_ADV. Creates the (prefix, anchor) entry if
    /// absent.
    pub fn receive_advertise(
        &mut self,
        prefix: Name,
        anchor: Name,
        anchor_seqnum: u32,
        distance: u16,
        ingress: ConnectionId,
        expiry: Instant,
    ) -> AdvertiseOutcome {
        let anchors = self.prefixes.entry(prefix).or_default();
        match anchors.get_mut(&anchor) {
            Some(entry) => entry.receive(anchor_seqnum, distance, ingress, expiry),
            None => {
                anchors.insert(anchor, AnchorAdvertisement::new(anchor_seqnum, distance, ingress, expiry));
                AdvertiseOutcome::Replace
            }
        }
    }

    /// Feeds one incoming T_WITHDRAW. Returns `true` if this anchor's
    /// reachability for `prefix` changed from reachable to
    /// unreachable (spec.md §4.8, "Withdraw processing").
    pub fn receive_withdraw(&mut self, prefix: &Name, anchor: &Name, ingress: ConnectionId) -> bool {
        let Some(anchors) = self.prefixes.get_mut(prefix) else {
            return false;
        };
        let Some(entry) = anchors.get_mut(anchor) else {
            return false;
        };
        let was_reachable = entry.is_reachable();
        entry.withdraw(ingress);
        let now_unreachable = was_reachable && !entry.is_reachable();
        if !entry.is_reachable() {
            anchors.remove(anchor);
        }
        if anchors.is_empty() {
            self.prefixes.remove(prefix);
        }
        now_unreachable
    }

    /// The union of live next-hops across every anchor advertising
    /// `prefix`, with expired next-hops pruned first.
    pub fn aggregate_next_hops(&mut self, prefix: &Name, now: Instant) -> Vec<ConnectionId> {
        let Some(anchors) = self.prefixes.get_mut(prefix) else {
            return Vec::new();
        };
        let mut union: HashSet<ConnectionId> = HashSet::new();
        anchors.retain(|_, entry| {
            entry.prune(now);
            union.extend(entry.next_hops());
            entry.is_reachable()
        });
        if anchors.is_empty() {
            self.prefixes.remove(prefix);
        }
        union.into_iter().collect()
    }

    pub fn anchor_advertisement(&self, prefix: &Name, anchor: &Name) -> Option<(u32, u16)> {
        self.prefixes
            .get(prefix)
            .and_then(|anchors| anchors.get(anchor))
            .map(|entry| (entry.best_seqnum(), entry.best_distance()))
    }

    pub fn prefix_count(&self) -> usize {
        self.prefixes.len()
    }

    /// Every (prefix, anchor) pair currently reachable, used to requeue
    /// refresh advertisements on the AdvertiseTimer (spec.md §4.9).
    pub fn all_reachable(&self) -> Vec<(Name, Name)> {
        self.prefixes
            .iter()
            .flat_map(|(prefix, anchors)| {
                anchors
                    .iter()
                    .filter(|(_, entry)| entry.is_reachable())
                    .map(|(anchor, _)| (prefix.clone(), anchor.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exp(secs: u64) -> Instant {
        Instant::now() + std::time::Duration::from_secs(secs)
    }

    #[test]
    fn feasibility_scenario_from_spec() {
        // spec.md §8, end-to-end scenario 5.
        let mut table = PrefixTable::new();
        let prefix = Name::from_uri("/p");
        let anchor = Name::from_uri("/x");

        assert_eq!(table.receive_advertise(prefix.clone(), anchor.clone(), 5, 3, ConnectionId(1), exp(10)), AdvertiseOutcome::Replace);
        assert_eq!(table.receive_advertise(prefix.clone(), anchor.clone(), 5, 3, ConnectionId(2), exp(10)), AdvertiseOutcome::EqualCost);

        let mut hops = table.aggregate_next_hops(&prefix, Instant::now());
        hops.sort_by_key(|c| c.0);
        assert_eq!(hops, vec![ConnectionId(1), ConnectionId(2)]);

        assert_eq!(table.receive_advertise(prefix.clone(), anchor.clone(), 6, 4, ConnectionId(1), exp(10)), AdvertiseOutcome::Replace);
        let hops = table.aggregate_next_hops(&prefix, Instant::now());
        assert_eq!(hops, vec![ConnectionId(1)]);
    }

    #[test]
    fn lower_seqnum_is_ignored() {
        let mut table = PrefixTable::new();
        let prefix = Name::from_uri("/p");
        let anchor = Name::from_uri("/x");
        table.receive_advertise(prefix.clone(), anchor.clone(), 10, 1, ConnectionId(1), exp(10));
        let outcome = table.receive_advertise(prefix.clone(), anchor.clone(), 9, 0, ConnectionId(2), exp(10));
        assert_eq!(outcome, AdvertiseOutcome::Ignore);
    }

    #[test]
    fn equal_seqnum_higher_distance_is_ignored() {
        let mut table = PrefixTable::new();
        let prefix = Name::from_uri("/p");
        let anchor = Name::from_uri("/x");
        table.receive_advertise(prefix.clone(), anchor.clone(), 10, 1, ConnectionId(1), exp(10));
        let outcome = table.receive_advertise(prefix.clone(), anchor.clone(), 10, 5, ConnectionId(2), exp(10));
        assert_eq!(outcome, AdvertiseOutcome::Ignore);
    }

    #[test]
    fn withdraw_removes_sender_and_reports_unreachability() {
        let mut table = PrefixTable::new();
        let prefix = Name::from_uri("/p");
        let anchor = Name::from_uri("/x");
        table.receive_advertise(prefix.clone(), anchor.clone(), 1, 1, ConnectionId(1), exp(10));
        assert!(table.receive_withdraw(&prefix, &anchor, ConnectionId(1)));
        assert!(table.aggregate_next_hops(&prefix, Instant::now()).is_empty());
    }

    #[test]
    fn expired_next_hops_are_pruned_on_aggregation() {
        let mut table = PrefixTable::new();
        let prefix = Name::from_uri("/p");
        let anchor = Name::from_uri("/x");
        table.receive_advertise(prefix.clone(), anchor.clone(), 1, 1, ConnectionId(1), Instant::now());
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(table.aggregate_next_hops(&prefix, Instant::now()).is_empty());
    }
}
