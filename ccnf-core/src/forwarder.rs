//! Orchestrates the PIT/Content-Store/FIB pipeline for every packet
//! that crosses the node. See spec.md §4.5.

use crate::config::ForwarderConfig;
use crate::connection::ConnectionId;
use crate::content_store::ContentStore;
use crate::delay::DelayQueue;
use crate::fib::Fib;
use crate::pit::{Pit, ReceiveVerdict};
use ccnf_common::metrics::ForwarderMetrics;
use ccnf_common::name::Name;
use ccnf_common::packet::{ContentObject, Interest, Packet};
use ccnf_common::wire::encode_packet;
use std::sync::Arc;
use thiserror::Error;

/// Errors a completed route can carry back to its caller. The
/// forwarder's table lookups never fail outright (spec.md §4.2,
/// "never fails"); this only covers packet kinds it declines to
/// route at all.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ForwardError {
    #[error("packet type is not supported by the forwarding pipeline")]
    UnsupportedPacketType,
}

pub type RouteCallback =
    Box<dyn FnOnce(Packet, ConnectionId, Option<ForwardError>, Vec<ConnectionId>) + Send>;

struct RouteWorkItem {
    packet: Packet,
    ingress: ConnectionId,
    optional_egress: Option<Vec<ConnectionId>>,
    callback: RouteCallback,
}

/// Size in bytes the packet would occupy on the wire, used to derive
/// its service time in the delay queue. An unencodable packet (spec.md
/// §7: oversized user content, not a structural invariant violation)
/// reports `usize::MAX` so it sorts last rather than panicking here.
fn packet_bytes(packet: &Packet) -> usize {
    encode_packet(packet).map(|b| b.len()).unwrap_or(usize::MAX)
}

/// Owns the PIT, FIB, and (optionally) the Content Store, and drives
/// every packet through them. See spec.md §4.5.
///
/// `pit`/`fib`/`content_store` are themselves cheap handles backed by
/// `Arc<Mutex<_>>` tables and `Clone`-able delay queues, so the
/// dispatch closure below can hold its own clones without a second
/// layer of `Arc<Forwarder>` indirection.
pub struct Forwarder {
    pit: Pit,
    fib: Fib,
    content_store: Option<ContentStore>,
    metrics: Arc<ForwarderMetrics>,
    queue: DelayQueue<RouteWorkItem>,
}

impl Forwarder {
    pub fn new(
        config: ForwarderConfig,
        pit: Pit,
        fib: Fib,
        content_store: Option<ContentStore>,
    ) -> Self {
        let metrics = Arc::new(ForwarderMetrics::new());
        let delay = config.delay();

        let dispatch_pit = pit.clone();
        let dispatch_fib = fib.clone();
        let dispatch_cs = content_store.clone();
        let dispatch_metrics = metrics.clone();

        let queue = DelayQueue::new(
            config.layer_delay_servers,
            move |item: &RouteWorkItem| delay.service_time(packet_bytes(&item.packet)),
            move |item: RouteWorkItem| {
                dispatch(
                    dispatch_pit.clone(),
                    dispatch_fib.clone(),
                    dispatch_cs.clone(),
                    dispatch_metrics.clone(),
                    item,
                );
            },
        );

        Self {
            pit,
            fib,
            content_store,
            metrics,
            queue,
        }
    }

    /// A packet arriving from the network on `ingress`.
    pub fn route_input(
        &self,
        packet: Packet,
        ingress: ConnectionId,
        callback: impl FnOnce(Packet, ConnectionId, Option<ForwardError>, Vec<ConnectionId>) + Send + 'static,
    ) {
        self.route(packet, ingress, None, callback);
    }

    /// A locally originated packet. `optional_egress`, when present,
    /// replaces any table lookup result (spec.md §4.5, "Override").
    pub fn route_output(
        &self,
        packet: Packet,
        ingress: ConnectionId,
        optional_egress: Option<Vec<ConnectionId>>,
        callback: impl FnOnce(Packet, ConnectionId, Option<ForwardError>, Vec<ConnectionId>) + Send + 'static,
    ) {
        self.route(packet, ingress, optional_egress, callback);
    }

    fn route(
        &self,
        packet: Packet,
        ingress: ConnectionId,
        optional_egress: Option<Vec<ConnectionId>>,
        callback: impl FnOnce(Packet, ConnectionId, Option<ForwardError>, Vec<ConnectionId>) + Send + 'static,
    ) {
        self.metrics.packets_in.increment();
        self.queue.push_back(RouteWorkItem {
            packet,
            ingress,
            optional_egress,
            callback: Box::new(callback),
        });
    }

    /// Refuses routes whose connection is the "localhost" sentinel
    /// (spec.md §4.5, "FIB management").
    pub fn add_route(&self, connection: ConnectionId, name: Name) {
        if connection.is_localhost() {
            return;
        }
        self.fib.add_route(name, connection);
        self.metrics.fib_size.set(self.fib.route_count() as u64);
    }

    /// Convenience for NFP and CLI callers installing several routes
    /// to the same anchor at once (spec.md §4.5, "AddRoute(Route)").
    pub fn add_routes(&self, routes: impl IntoIterator<Item = (Name, ConnectionId)>) {
        for (name, connection) in routes {
            self.add_route(connection, name);
        }
    }

    pub fn remove_route(&self, connection: ConnectionId, name: &Name) {
        self.fib.remove_route(name, connection);
        self.metrics.fib_size.set(self.fib.route_count() as u64);
    }

    pub fn remove_connection(&self, connection: ConnectionId) {
        self.fib.remove_connection(connection);
        self.metrics.fib_size.set(self.fib.route_count() as u64);
    }

    pub fn metrics(&self) -> &ForwarderMetrics {
        &self.metrics
    }

    pub fn pit(&self) -> &Pit {
        &self.pit
    }

    pub fn fib(&self) -> &Fib {
        &self.fib
    }

    pub fn content_store(&self) -> Option<&ContentStore> {
        self.content_store.as_ref()
    }
}

fn finish(
    packet: Packet,
    ingress: ConnectionId,
    error: Option<ForwardError>,
    egress: Vec<ConnectionId>,
    callback: RouteCallback,
    metrics: &ForwarderMetrics,
) {
    if error.is_none() {
        metrics.packets_out.add(egress.len() as u64);
    }
    callback(packet, ingress, error, egress);
}

fn dispatch(
    pit: Pit,
    fib: Fib,
    content_store: Option<ContentStore>,
    metrics: Arc<ForwarderMetrics>,
    item: RouteWorkItem,
) {
    metrics.pit_size.set(pit.len() as u64);
    let RouteWorkItem {
        packet,
        ingress,
        optional_egress,
        callback,
    } = item;

    match packet {
        Packet::Interest(interest) => {
            handle_interest(pit, fib, content_store, metrics, interest, ingress, optional_egress, callback);
        }
        Packet::ContentObject(co) => {
            handle_content_object(pit, content_store, metrics, co, ingress, callback);
        }
        other => {
            metrics.drop_unsupported_packet_type.increment();
            finish(other, ingress, Some(ForwardError::UnsupportedPacketType), Vec::new(), callback, &metrics);
        }
    }
}

fn handle_interest(
    pit: Pit,
    fib: Fib,
    content_store: Option<ContentStore>,
    metrics: Arc<ForwarderMetrics>,
    interest: Interest,
    ingress: ConnectionId,
    optional_egress: Option<Vec<ConnectionId>>,
    callback: RouteCallback,
) {
    metrics.interests_to_pit.increment();
    let interest_for_receive = interest.clone();
    pit.clone().receive_interest(interest_for_receive, ingress, move |verdict| {
        match verdict {
            ReceiveVerdict::Aggregate => {
                metrics.interests_pit_aggregate.increment();
                finish(Packet::Interest(interest), ingress, None, Vec::new(), callback, &metrics);
            }
            ReceiveVerdict::Forward => {
                metrics.interests_pit_forward.increment();
                if let Some(egress) = optional_egress {
                    finish(Packet::Interest(interest), ingress, None, egress, callback, &metrics);
                    return;
                }
                match content_store {
                    Some(cs) => {
                        metrics.interests_to_cs.increment();
                        let interest_for_cs = interest.clone();
                        cs.match_interest(interest_for_cs, move |hit| {
                            match hit {
                                Some(content_object) => {
                                    metrics.interests_cs_hit.increment();
                                    content_store_hit(pit, metrics, content_object, callback);
                                }
                                None => {
                                    metrics.interests_cs_miss.increment();
                                    fib_lookup(fib, metrics, Packet::Interest(interest), ingress, callback);
                                }
                            }
                        });
                    }
                    None => {
                        fib_lookup(fib, metrics, Packet::Interest(interest), ingress, callback);
                    }
                }
            }
        }
    });
}

/// A Content Store hit rewrites the work item into the matching
/// Content Object and re-enters the PIT as `SatisfyInterest`, "as if
/// it arrived from nowhere" (spec.md §4.5) — hence `ConnectionId::LOCALHOST`
/// as the synthetic ingress, which can never itself be a reverse path.
fn content_store_hit(
    pit: Pit,
    metrics: Arc<ForwarderMetrics>,
    content_object: Arc<ContentObject>,
    callback: RouteCallback,
) {
    let co = (*content_object).clone();
    pit.satisfy_interest(co.clone(), ConnectionId::LOCALHOST, move |egress| {
        finish(Packet::ContentObject(co), ConnectionId::LOCALHOST, None, egress, callback, &metrics);
    });
}

fn fib_lookup(fib: Fib, metrics: Arc<ForwarderMetrics>, packet: Packet, ingress: ConnectionId, callback: RouteCallback) {
    metrics.interests_to_fib.increment();
    let name = packet.name().clone();
    fib.lookup(name, ingress, move |egress| {
        if egress.is_empty() {
            metrics.interests_fib_miss.increment();
        } else {
            metrics.interests_fib_hit.increment();
        }
        finish(packet, ingress, None, egress, callback, &metrics);
    });
}

fn handle_content_object(
    pit: Pit,
    content_store: Option<ContentStore>,
    metrics: Arc<ForwarderMetrics>,
    content_object: ContentObject,
    ingress: ConnectionId,
    callback: RouteCallback,
) {
    metrics.content_objects_to_pit.increment();
    let co_for_satisfy = content_object.clone();
    pit.satisfy_interest(co_for_satisfy, ingress, move |egress| {
        if egress.is_empty() {
            metrics.content_objects_pit_miss.increment();
        } else {
            metrics.content_objects_pit_hit.increment();
        }
        match content_store {
            Some(cs) if !egress.is_empty() => {
                metrics.content_objects_to_cs.increment();
                let co_for_cs = content_object.clone();
                cs.add_content_object(co_for_cs, move || {
                    metrics.content_objects_cs_stored.increment();
                    finish(Packet::ContentObject(content_object), ingress, None, egress, callback, &metrics);
                });
            }
            _ => {
                finish(Packet::ContentObject(content_object), ingress, None, egress, callback, &metrics);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContentStoreConfig, FibConfig, PitConfig};
    use ccnf_common::name::Name;
    use bytes::Bytes;
    use std::sync::mpsc;

    fn wait_for<T: Send + 'static>(rx: mpsc::Receiver<T>) -> T {
        rx.recv_timeout(std::time::Duration::from_secs(1)).unwrap()
    }

    fn forwarder_with_cs() -> Forwarder {
        Forwarder::new(
            ForwarderConfig::default(),
            Pit::new(PitConfig::default()),
            Fib::new(FibConfig::default()),
            Some(ContentStore::new(ContentStoreConfig::default())),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn interest_with_no_route_and_empty_cache_returns_empty_egress() {
        let fwd = forwarder_with_cs();
        let (tx, rx) = mpsc::channel();
        fwd.route_input(Packet::Interest(Interest::new(Name::from_uri("/a"))), ConnectionId(1), move |_, _, err, egress| {
            tx.send((err, egress)).unwrap();
        });
        let (err, egress) = wait_for(rx);
        assert!(err.is_none());
        assert!(egress.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn interest_with_route_forwards_to_fib_egress() {
        let fwd = forwarder_with_cs();
        fwd.add_route(ConnectionId(2), Name::from_uri("/a"));
        let (tx, rx) = mpsc::channel();
        fwd.route_input(Packet::Interest(Interest::new(Name::from_uri("/a"))), ConnectionId(1), move |_, _, _, egress| {
            tx.send(egress).unwrap();
        });
        assert_eq!(wait_for(rx), vec![ConnectionId(2)]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn add_route_refuses_localhost_sentinel() {
        let fwd = forwarder_with_cs();
        fwd.add_route(ConnectionId::LOCALHOST, Name::from_uri("/a"));
        assert_eq!(fwd.fib().route_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn content_object_satisfies_pending_interest_and_populates_cache() {
        let fwd = forwarder_with_cs();
        let (itx, irx) = mpsc::channel();
        fwd.route_input(Packet::Interest(Interest::new(Name::from_uri("/a"))), ConnectionId(1), move |_, _, _, egress| {
            itx.send(egress).unwrap();
        });
        wait_for(irx);

        let co = ContentObject::new(Name::from_uri("/a"), Bytes::from_static(b"x"), None);
        let (ctx, crx) = mpsc::channel();
        fwd.route_input(Packet::ContentObject(co.clone()), ConnectionId(2), move |_, _, _, egress| {
            ctx.send(egress).unwrap();
        });
        assert_eq!(wait_for(crx), vec![ConnectionId(1)]);

        let (htx, hrx) = mpsc::channel();
        fwd.content_store().unwrap().match_interest(Interest::new(Name::from_uri("/a")), move |hit| {
            htx.send(hit).unwrap();
        });
        assert!(wait_for(hrx).is_some(), "content object should have been cached on satisfy");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn interest_return_is_dropped_as_unsupported() {
        use ccnf_common::packet::InterestReturn;
        let fwd = forwarder_with_cs();
        let (tx, rx) = mpsc::channel();
        fwd.route_input(
            Packet::InterestReturn(InterestReturn {
                name: Name::from_uri("/a"),
                return_code: 1,
                hop_limit: 1,
            }),
            ConnectionId(1),
            move |_, _, err, _| tx.send(err).unwrap(),
        );
        assert_eq!(wait_for(rx), Some(ForwardError::UnsupportedPacketType));
        assert_eq!(fwd.metrics().drop_unsupported_packet_type.value(), 1);
    }
}
