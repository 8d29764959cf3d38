//! `RoutingProtocol`: binds a portal to `/nfp`, maintains neighbor
//! adjacencies and the prefix table, and keeps the forwarder's FIB
//! synchronized with what NFP has learned. See spec.md §4.10.

use crate::advertisement::{AdvertiseOutcome, PrefixTable};
use crate::config::NfpConfig;
use crate::neighbor::{Neighbor, NeighborState};
use crate::timers::{DebounceTimer, PeriodicTimer};
use crate::workqueue::{pack_payloads, WorkQueue};
use ccnf_common::metrics::NfpMetrics;
use ccnf_common::name::{ComponentType, Name, NameComponent};
use ccnf_common::nfp_wire::{NfpMessage, NfpPayload};
use ccnf_common::packet::{Interest, Packet};
use ccnf_core::connection::ConnectionId;
use ccnf_core::forwarder::Forwarder;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Bytes assumed to be spent on Interest/per-hop-header overhead when
/// deriving the MTU-bound payload budget (spec.md §4.9, "minimum
/// configured MTU ... with Interest-overhead subtracted").
const INTEREST_OVERHEAD: usize = 64;

/// A conservative MTU to plan around before any interface has
/// registered one.
const DEFAULT_MTU: usize = 1200;

/// The well-known name NFP binds its portal to (spec.md §4.10).
pub fn nfp_root() -> Name {
    Name::from_uri("/nfp")
}

struct State {
    neighbors: HashMap<(Name, ConnectionId), Neighbor>,
    prefixes: PrefixTable,
    model_fib: HashMap<Name, HashSet<ConnectionId>>,
    interfaces: HashMap<ConnectionId, usize>,
    work_queue: WorkQueue,
}

/// One node's NFP participation. Owns no transport of its own: it
/// rides on the same [`Forwarder`] that handles ordinary Interest/Data
/// traffic, sending and receiving through the `/nfp` portal exactly
/// like any other named destination.
pub struct RoutingProtocol {
    router_name: Name,
    local_connection: ConnectionId,
    local_anchor_prefixes: Vec<Name>,
    forwarder: Arc<Forwarder>,
    state: Mutex<State>,
    config: NfpConfig,
    metrics: Arc<NfpMetrics>,
    anchor_seqnum: AtomicU32,
    message_seqnum: AtomicU16,
    process_work_queue: DebounceTimer,
}

impl RoutingProtocol {
    /// Constructs the protocol and immediately binds its portal —
    /// `local_connection` becomes the FIB next hop for `/nfp`, so any
    /// Interest under that prefix lands with the caller rather than
    /// being forwarded onward.
    pub fn new(
        router_name: Name,
        local_connection: ConnectionId,
        local_anchor_prefixes: Vec<Name>,
        forwarder: Arc<Forwarder>,
        config: NfpConfig,
    ) -> Arc<Self> {
        let protocol = Arc::new(Self {
            router_name,
            local_connection,
            local_anchor_prefixes,
            forwarder,
            state: Mutex::new(State {
                neighbors: HashMap::new(),
                prefixes: PrefixTable::new(),
                model_fib: HashMap::new(),
                interfaces: HashMap::new(),
                work_queue: WorkQueue::new(),
            }),
            config,
            metrics: Arc::new(NfpMetrics::new()),
            anchor_seqnum: AtomicU32::new(0),
            message_seqnum: AtomicU16::new(0),
            process_work_queue: DebounceTimer::new(Duration::from_millis(50)),
        });
        protocol.forwarder.add_route(protocol.local_connection, nfp_root());
        protocol
    }

    pub fn metrics(&self) -> &NfpMetrics {
        &self.metrics
    }

    pub fn router_name(&self) -> &Name {
        &self.router_name
    }

    /// Registers a neighbor-facing interface's MTU. The minimum across
    /// every registered interface bounds outbound payload packing.
    pub fn register_interface(&self, connection: ConnectionId, mtu: usize) {
        self.state.lock().unwrap().interfaces.insert(connection, mtu);
    }

    /// Drops an interface and any neighbor adjacencies reached through
    /// it. Does not withdraw learned routes — those age out via their
    /// own next-hop expiry (spec.md §4.8, "Expiry maintenance").
    pub fn unregister_interface(&self, connection: ConnectionId) {
        let mut state = self.state.lock().unwrap();
        state.interfaces.remove(&connection);
        state.neighbors.retain(|(_, conn), _| *conn != connection);
    }

    /// Spawns the Hello/Advertise/AnchorRoute/neighbor-aging timers.
    /// Call once per node; drop the returned handles to stop them.
    pub fn spawn_timers(self: &Arc<Self>) -> Vec<PeriodicTimer> {
        let hello = {
            let protocol = self.clone();
            PeriodicTimer::spawn(self.config.hello_interval, self.config.jitter, move || {
                protocol.on_hello_timer();
            })
        };
        let advertise = {
            let protocol = self.clone();
            PeriodicTimer::spawn(self.config.advertise_interval, Duration::ZERO, move || {
                protocol.on_advertise_timer();
            })
        };
        let anchor_route = {
            let protocol = self.clone();
            PeriodicTimer::spawn(self.config.anchor_route_interval, Duration::ZERO, move || {
                protocol.on_anchor_route_timer();
            })
        };
        let neighbor_tick = {
            let protocol = self.clone();
            let interval = (self.config.neighbor_timeout / 3).max(Duration::from_millis(100));
            PeriodicTimer::spawn(interval, Duration::ZERO, move || {
                protocol.on_neighbor_tick();
            })
        };
        vec![hello, advertise, anchor_route, neighbor_tick]
    }

    fn next_message_seqnum(&self) -> u16 {
        self.message_seqnum.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    fn nfp_interest_name(&self, seqnum: u16) -> Name {
        nfp_root().with(NameComponent::new(ComponentType::Sequence, seqnum.to_be_bytes().to_vec()))
    }

    fn interface_connections(state: &State) -> Vec<ConnectionId> {
        state.interfaces.keys().copied().collect()
    }

    fn min_mtu(state: &State) -> usize {
        state
            .interfaces
            .values()
            .copied()
            .min()
            .unwrap_or(DEFAULT_MTU)
            .saturating_sub(INTEREST_OVERHEAD)
    }

    /// Broadcasts one payload, already packed, to every registered
    /// interface. Called from synchronous timer callbacks, so an
    /// unencodable payload is logged and dropped rather than
    /// propagated — it should never happen for internally bounded NFP
    /// names, but the TLV layer no longer panics to guarantee it.
    fn send(&self, payload: NfpPayload, connections: Vec<ConnectionId>) {
        let bytes = match payload.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("dropping unencodable NFP payload: {err}");
                return;
            }
        };
        let name = self.nfp_interest_name(payload.message_seqnum);
        let interest = Interest::new(name).with_payload(bytes);
        self.forwarder
            .route_output(Packet::Interest(interest), self.local_connection, Some(connections), |_, _, _, _| {});
    }

    /// HelloTimer: an empty payload carrying only our name and message
    /// seqnum, broadcast on every interface (spec.md §4.9).
    fn on_hello_timer(self: &Arc<Self>) {
        let connections = {
            let state = self.state.lock().unwrap();
            Self::interface_connections(&state)
        };
        if connections.is_empty() {
            return;
        }
        let seqnum = self.next_message_seqnum();
        let payload = NfpPayload::new(self.router_name.clone(), seqnum);
        self.send(payload, connections);
        self.metrics.hellos_sent.increment();
    }

    /// AdvertiseTimer: requeue every reachable (anchor, prefix) pair;
    /// ProcessWorkQueue paces the actual transmissions.
    fn on_advertise_timer(self: &Arc<Self>) {
        let mut state = self.state.lock().unwrap();
        for (prefix, anchor) in state.prefixes.all_reachable() {
            state.work_queue.enqueue(anchor, prefix);
        }
        drop(state);
        self.arm_process_work_queue();
    }

    /// AnchorRouteTimer: bump our anchor sequence number and inject an
    /// advertisement for each locally configured anchor prefix as if
    /// it had been received from ourselves, so it propagates normally.
    fn on_anchor_route_timer(self: &Arc<Self>) {
        let anchor_seqnum = self.anchor_seqnum.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        for prefix in self.local_anchor_prefixes.clone() {
            self.receive_advertise(prefix, self.router_name.clone(), anchor_seqnum, 0, ConnectionId::LOCALHOST);
        }
    }

    /// Ages every neighbor adjacency one tick, dropping any that reach
    /// `Dead` (spec.md §4.6).
    fn on_neighbor_tick(self: &Arc<Self>) {
        let now = Instant::now();
        let neighbor_timeout = self.config.neighbor_timeout;
        let mut state = self.state.lock().unwrap();
        let mut up = 0u64;
        let mut down = 0u64;
        let metrics = self.metrics.clone();
        state.neighbors.retain(|_, neighbor| {
            if neighbor.tick(now, neighbor_timeout) == Some(NeighborState::Dead) {
                metrics.neighbors_dead_total.increment();
            }
            match neighbor.state() {
                NeighborState::Up => {
                    up += 1;
                    true
                }
                NeighborState::Down => {
                    down += 1;
                    true
                }
                NeighborState::Dead => false,
            }
        });
        drop(state);
        self.metrics.neighbors_up.set(up);
        self.metrics.neighbors_down.set(down);
    }

    fn arm_process_work_queue(self: &Arc<Self>) {
        let protocol = self.clone();
        self.process_work_queue.arm(move || protocol.process_work_queue());
    }

    /// ProcessWorkQueue: drains the entire work queue, packaging as
    /// many Advertise/Withdraw messages as fit the MTU-bound payload
    /// and broadcasting each payload once full (spec.md §4.9).
    fn process_work_queue(self: &Arc<Self>) {
        let mut state = self.state.lock().unwrap();
        let mut messages = Vec::new();
        while let Some((anchor, prefix)) = state.work_queue.dequeue() {
            match state.prefixes.anchor_advertisement(&prefix, &anchor) {
                Some((seqnum, distance)) => messages.push(NfpMessage::Advertise {
                    anchor,
                    prefix,
                    anchor_seqnum: seqnum,
                    distance: distance.saturating_add(1),
                }),
                None => messages.push(NfpMessage::Withdraw { anchor, prefix }),
            }
        }
        let mtu = Self::min_mtu(&state);
        let connections = Self::interface_connections(&state);
        drop(state);

        if messages.is_empty() || connections.is_empty() {
            return;
        }
        let advertised = messages.iter().filter(|m| matches!(m, NfpMessage::Advertise { .. })).count();
        let withdrawn = messages.len() - advertised;
        let seqnum = self.next_message_seqnum();
        match pack_payloads(&self.router_name, seqnum, messages, mtu) {
            Ok(payloads) => {
                self.metrics.advertisements_sent.add(advertised as u64);
                self.metrics.withdraws_sent.add(withdrawn as u64);
                for payload in payloads {
                    self.send(payload, connections.clone());
                }
            }
            Err(err) => log::warn!("dropping NFP work queue batch: {err}"),
        }
    }

    /// Entry point for an Interest delivered to the `/nfp` portal
    /// (spec.md §4.10, "Inbound Interests to the portal").
    pub fn receive_payload(self: &Arc<Self>, interest: Interest, ingress: ConnectionId) {
        let Some(bytes) = interest.payload.as_ref() else {
            return;
        };
        let Ok(payload) = NfpPayload::decode(bytes) else {
            return;
        };
        if payload.router_name == self.router_name {
            self.metrics.payloads_dropped_self.increment();
            return;
        }

        let now = Instant::now();
        let neighbor_timeout = self.config.neighbor_timeout;
        let key = (payload.router_name.clone(), ingress);
        let accepted = {
            let mut state = self.state.lock().unwrap();
            match state.neighbors.get_mut(&key) {
                Some(neighbor) => neighbor.receive_hello(payload.message_seqnum, now, neighbor_timeout),
                None => {
                    state.neighbors.insert(
                        key,
                        Neighbor::new(payload.router_name.clone(), ingress, payload.message_seqnum, now, neighbor_timeout),
                    );
                    true
                }
            }
        };
        self.metrics.hellos_received.increment();
        if !accepted {
            self.metrics.payloads_dropped_out_of_order.increment();
            return;
        }

        for message in payload.messages {
            match message {
                NfpMessage::Advertise { anchor, prefix, anchor_seqnum, distance } => {
                    self.receive_advertise(prefix, anchor, anchor_seqnum, distance, ingress);
                }
                NfpMessage::Withdraw { anchor, prefix } => {
                    self.receive_withdraw(prefix, anchor, ingress);
                }
            }
        }
    }

    /// Updates the prefix table, and on any feasibility-driven state
    /// change enqueues a work-queue entry and synchronizes the FIB
    /// (spec.md §4.10, "ReceiveAdvertise").
    fn receive_advertise(self: &Arc<Self>, prefix: Name, anchor: Name, anchor_seqnum: u32, distance: u16, ingress: ConnectionId) {
        let now = Instant::now();
        let expiry = now + self.config.route_timeout;
        let mut state = self.state.lock().unwrap();
        let outcome = state
            .prefixes
            .receive_advertise(prefix.clone(), anchor.clone(), anchor_seqnum, distance, ingress, expiry);
        if outcome == AdvertiseOutcome::Ignore {
            return;
        }
        self.metrics.advertisements_received.increment();
        state.work_queue.enqueue(anchor, prefix.clone());
        self.sync_fib(&mut state, &prefix, now);
        drop(state);
        self.arm_process_work_queue();
    }

    /// Removes `ingress` as a next hop for (anchor, prefix); on
    /// transition to unreachable, withdraws the FIB route and queues a
    /// Withdraw for propagation (spec.md §4.8, "Withdraw processing").
    fn receive_withdraw(self: &Arc<Self>, prefix: Name, anchor: Name, ingress: ConnectionId) {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();
        let became_unreachable = state.prefixes.receive_withdraw(&prefix, &anchor, ingress);
        self.metrics.withdraws_received.increment();
        state.work_queue.enqueue(anchor, prefix.clone());
        self.sync_fib(&mut state, &prefix, now);
        drop(state);
        if became_unreachable {
            self.metrics.routes_withdrawn.increment();
        }
        self.arm_process_work_queue();
    }

    /// Diffs the prefix table's current next-hop set for `prefix`
    /// against the model FIB and installs/removes only the delta
    /// (spec.md §4.10, "adds to the FIB ... removed when unreachable").
    fn sync_fib(self: &Arc<Self>, state: &mut State, prefix: &Name, now: Instant) {
        let new_hops: HashSet<ConnectionId> = state.prefixes.aggregate_next_hops(prefix, now).into_iter().collect();
        let old_hops = state.model_fib.remove(prefix).unwrap_or_default();

        for &connection in new_hops.difference(&old_hops) {
            // LOCALHOST is the sentinel self-originated anchor advertisements
            // carry (`on_anchor_route_timer`); `forwarder.add_route` no-ops on
            // it, so it must never count as an installed route either.
            if connection.is_localhost() {
                continue;
            }
            self.forwarder.add_route(connection, prefix.clone());
            self.metrics.routes_installed.increment();
        }
        for &connection in old_hops.difference(&new_hops) {
            if connection.is_localhost() {
                continue;
            }
            self.forwarder.remove_route(connection, prefix);
        }
        if !new_hops.is_empty() {
            state.model_fib.insert(prefix.clone(), new_hops);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccnf_core::config::{FibConfig, ForwarderConfig, PitConfig};
    use ccnf_core::fib::Fib;
    use ccnf_core::pit::Pit;

    fn protocol(name: &str, local: ConnectionId, anchors: Vec<&str>) -> Arc<RoutingProtocol> {
        let forwarder = Arc::new(Forwarder::new(
            ForwarderConfig::default(),
            Pit::new(PitConfig::default()),
            Fib::new(FibConfig::default()),
            None,
        ));
        RoutingProtocol::new(
            Name::from_uri(name),
            local,
            anchors.into_iter().map(Name::from_uri).collect(),
            forwarder,
            NfpConfig::default(),
        )
    }

    #[test]
    fn binds_the_nfp_portal_on_construction() {
        let p = protocol("/routers/a", ConnectionId(0), vec![]);
        assert!(p.forwarder.fib().has_route(&nfp_root(), ConnectionId(0)));
    }

    #[test]
    fn ignores_payload_looped_back_to_self() {
        let p = protocol("/routers/a", ConnectionId(0), vec![]);
        let payload = NfpPayload::new(Name::from_uri("/routers/a"), 1);
        let interest = Interest::new(nfp_root()).with_payload(payload.encode().unwrap());
        p.receive_payload(interest, ConnectionId(5));
        assert_eq!(p.metrics().payloads_dropped_self.value(), 1);
        assert_eq!(p.metrics().hellos_received.value(), 0);
    }

    #[test]
    fn out_of_order_seqnum_drops_the_whole_payload() {
        let p = protocol("/routers/a", ConnectionId(0), vec![]);
        let first = NfpPayload::new(Name::from_uri("/routers/b"), 5);
        p.receive_payload(Interest::new(nfp_root()).with_payload(first.encode().unwrap()), ConnectionId(1));

        let stale = NfpPayload::new(Name::from_uri("/routers/b"), 5).with_messages(vec![NfpMessage::Advertise {
            anchor: Name::from_uri("/routers/b"),
            prefix: Name::from_uri("/data"),
            anchor_seqnum: 1,
            distance: 1,
        }]);
        p.receive_payload(Interest::new(nfp_root()).with_payload(stale.encode().unwrap()), ConnectionId(1));

        assert_eq!(p.metrics().payloads_dropped_out_of_order.value(), 1);
        assert_eq!(p.forwarder.fib().route_count(), 1); // only the /nfp portal route
    }

    #[test]
    fn advertise_installs_a_fib_route_and_withdraw_removes_it() {
        let p = protocol("/routers/a", ConnectionId(0), vec![]);
        let advertise = NfpPayload::new(Name::from_uri("/routers/b"), 1).with_messages(vec![NfpMessage::Advertise {
            anchor: Name::from_uri("/routers/b"),
            prefix: Name::from_uri("/data"),
            anchor_seqnum: 1,
            distance: 1,
        }]);
        p.receive_payload(Interest::new(nfp_root()).with_payload(advertise.encode().unwrap()), ConnectionId(1));
        assert!(p.forwarder.fib().has_route(&Name::from_uri("/data"), ConnectionId(1)));

        let withdraw = NfpPayload::new(Name::from_uri("/routers/b"), 2).with_messages(vec![NfpMessage::Withdraw {
            anchor: Name::from_uri("/routers/b"),
            prefix: Name::from_uri("/data"),
        }]);
        p.receive_payload(Interest::new(nfp_root()).with_payload(withdraw.encode().unwrap()), ConnectionId(1));
        assert!(!p.forwarder.fib().has_route(&Name::from_uri("/data"), ConnectionId(1)));
        assert_eq!(p.metrics().routes_withdrawn.value(), 1);
    }

    #[test]
    fn anchor_route_timer_advertises_local_prefixes_as_originator() {
        let p = protocol("/routers/a", ConnectionId(0), vec!["/local/data"]);
        p.on_anchor_route_timer();
        let (seqnum, distance) = p
            .state
            .lock()
            .unwrap()
            .prefixes
            .anchor_advertisement(&Name::from_uri("/local/data"), &Name::from_uri("/routers/a"))
            .unwrap();
        assert_eq!(seqnum, 1);
        assert_eq!(distance, 0);
    }

    #[test]
    fn anchor_route_timer_does_not_inflate_routes_installed_metric() {
        // LOCALHOST is a no-op sentinel for `forwarder.add_route` (spec.md
        // §4.5); a self-originated anchor advertisement must not report a
        // route as installed when none actually was.
        let p = protocol("/routers/a", ConnectionId(0), vec!["/local/data"]);
        p.on_anchor_route_timer();
        assert_eq!(p.metrics().routes_installed.value(), 0);
        assert!(!p.forwarder.fib().has_route(&Name::from_uri("/local/data"), ConnectionId::LOCALHOST));
    }

    fn neighbor_state(p: &Arc<RoutingProtocol>, name: &str, connection: ConnectionId) -> Option<NeighborState> {
        p.state
            .lock()
            .unwrap()
            .neighbors
            .get(&(Name::from_uri(name), connection))
            .map(|n| n.state())
    }

    fn send_hello(p: &Arc<RoutingProtocol>, router: &str, seqnum: u16, ingress: ConnectionId) {
        let payload = NfpPayload::new(Name::from_uri(router), seqnum);
        p.receive_payload(Interest::new(nfp_root()).with_payload(payload.encode().unwrap()), ingress);
    }

    /// spec.md §8 Scenario 6, driven through `spawn_timers`' real
    /// `on_neighbor_tick` polling rather than calling `Neighbor::tick`
    /// directly — demonstrates the coarse shared poll still lands on
    /// the scenario's exact t=5/t=8 transitions for this timeout.
    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn neighbor_aging_matches_spec_scenario_through_real_polling() {
        let mut config = NfpConfig::default();
        config.neighbor_timeout = Duration::from_secs(3);
        let forwarder = Arc::new(Forwarder::new(
            ForwarderConfig::default(),
            Pit::new(PitConfig::default()),
            Fib::new(FibConfig::default()),
            None,
        ));
        let p = RoutingProtocol::new(Name::from_uri("/routers/a"), ConnectionId(0), vec![], forwarder, config);
        let timers = p.spawn_timers();

        send_hello(&p, "/routers/b", 0, ConnectionId(1));
        tokio::time::advance(Duration::from_secs(1)).await;
        send_hello(&p, "/routers/b", 1, ConnectionId(1));
        tokio::time::advance(Duration::from_secs(1)).await;
        send_hello(&p, "/routers/b", 2, ConnectionId(1));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(neighbor_state(&p, "/routers/b", ConnectionId(1)), Some(NeighborState::Down));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(neighbor_state(&p, "/routers/b", ConnectionId(1)), None);

        drop(timers);
    }
}
