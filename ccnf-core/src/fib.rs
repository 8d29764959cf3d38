//! Forwarding Information Base: longest-prefix-match name routing.
//! See spec.md §4.2.

use crate::config::FibConfig;
use crate::connection::ConnectionId;
use crate::delay::DelayQueue;
use ccnf_common::name::{Name, NameComponent};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

type LookupCallback = Box<dyn FnOnce(Vec<ConnectionId>) + Send>;

struct LookupWorkItem {
    name: Name,
    ingress: ConnectionId,
    callback: LookupCallback,
}

/// Longest-prefix-match mapping `Name -> {Connection}`.
///
/// Invariant: no entry is ever empty; removing the last connection
/// from an entry deletes the entry (spec.md §3, "FIB Entry"). Cheap to
/// clone: both fields are `Arc`-backed and share the underlying table.
#[derive(Clone)]
pub struct Fib {
    entries: Arc<Mutex<HashMap<Name, HashSet<ConnectionId>>>>,
    queue: DelayQueue<LookupWorkItem>,
}

impl Fib {
    pub fn new(config: FibConfig) -> Self {
        let entries: Arc<Mutex<HashMap<Name, HashSet<ConnectionId>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let delay = config.delay();
        let entries_for_queue = entries.clone();
        let queue = DelayQueue::new(
            config.layer_delay_servers,
            move |item: &LookupWorkItem| delay.service_time(item.name.len()),
            move |item: LookupWorkItem| {
                let egress = longest_prefix_match(&entries_for_queue, &item.name, item.ingress);
                (item.callback)(egress);
            },
        );
        Self { entries, queue }
    }

    /// Adds `connection` as a next hop for the exact prefix `name`.
    pub fn add_route(&self, name: Name, connection: ConnectionId) {
        let mut entries = self.entries.lock().unwrap();
        entries.entry(name).or_default().insert(connection);
    }

    /// Removes `connection` as a next hop for the exact prefix `name`.
    /// Deletes the entry entirely if it becomes empty.
    pub fn remove_route(&self, name: &Name, connection: ConnectionId) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(set) = entries.get_mut(name) {
            set.remove(&connection);
            if set.is_empty() {
                entries.remove(name);
            }
        }
    }

    /// Removes `connection` from every FIB entry, deleting any entry
    /// that becomes empty as a result.
    pub fn remove_connection(&self, connection: ConnectionId) {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|_, set| {
            set.remove(&connection);
            !set.is_empty()
        });
    }

    pub fn route_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn has_route(&self, name: &Name, connection: ConnectionId) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(name)
            .map(|set| set.contains(&connection))
            .unwrap_or(false)
    }

    /// Asynchronous longest-prefix-match lookup. `ingress` is removed
    /// from the returned egress list (split-horizon); an empty result
    /// is a valid "no route" outcome, never an error.
    pub fn lookup(
        &self,
        name: Name,
        ingress: ConnectionId,
        callback: impl FnOnce(Vec<ConnectionId>) + Send + 'static,
    ) {
        self.queue.push_back(LookupWorkItem {
            name,
            ingress,
            callback: Box::new(callback),
        });
    }
}

/// Walks `name` component by component, probing for an exact match at
/// each prefix length; the last successful probe wins (spec.md §4.2).
fn longest_prefix_match(
    entries: &Mutex<HashMap<Name, HashSet<ConnectionId>>>,
    name: &Name,
    ingress: ConnectionId,
) -> Vec<ConnectionId> {
    let entries = entries.lock().unwrap();
    let mut scratch = Name::new();
    let mut best: Option<&HashSet<ConnectionId>> = None;
    for component in name.components() {
        scratch.push(component_clone(component));
        if let Some(set) = entries.get(&scratch) {
            best = Some(set);
        }
    }
    match best {
        Some(set) => set
            .iter()
            .copied()
            .filter(|&conn| conn != ingress)
            .collect(),
        None => Vec::new(),
    }
}

fn component_clone(c: &NameComponent) -> NameComponent {
    c.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn wait_for<T: Send + 'static>(rx: mpsc::Receiver<T>) -> T {
        rx.recv_timeout(std::time::Duration::from_secs(1)).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exact_match_wins() {
        let fib = Fib::new(FibConfig::default());
        fib.add_route(Name::from_uri("/foo"), ConnectionId(1));
        let (tx, rx) = mpsc::channel();
        fib.lookup(Name::from_uri("/foo/bar"), ConnectionId(99), move |egress| {
            tx.send(egress).unwrap();
        });
        let egress = wait_for(rx);
        assert_eq!(egress, vec![ConnectionId(1)]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn longest_prefix_wins_over_shorter() {
        let fib = Fib::new(FibConfig::default());
        fib.add_route(Name::from_uri("/foo"), ConnectionId(1));
        fib.add_route(Name::from_uri("/foo/bar"), ConnectionId(2));
        let (tx, rx) = mpsc::channel();
        fib.lookup(Name::from_uri("/foo/bar/baz"), ConnectionId(99), move |egress| {
            tx.send(egress).unwrap();
        });
        assert_eq!(wait_for(rx), vec![ConnectionId(2)]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ingress_is_removed_by_split_horizon() {
        let fib = Fib::new(FibConfig::default());
        fib.add_route(Name::from_uri("/foo"), ConnectionId(1));
        fib.add_route(Name::from_uri("/foo"), ConnectionId(2));
        let (tx, rx) = mpsc::channel();
        fib.lookup(Name::from_uri("/foo/bar"), ConnectionId(1), move |egress| {
            tx.send(egress).unwrap();
        });
        assert_eq!(wait_for(rx), vec![ConnectionId(2)]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn no_route_yields_empty_not_error() {
        let fib = Fib::new(FibConfig::default());
        let (tx, rx) = mpsc::channel();
        fib.lookup(Name::from_uri("/nowhere"), ConnectionId(1), move |egress| {
            tx.send(egress).unwrap();
        });
        assert!(wait_for(rx).is_empty());
    }

    #[test]
    fn removing_last_connection_deletes_entry() {
        let fib = Fib::new(FibConfig::default());
        let name = Name::from_uri("/foo");
        fib.add_route(name.clone(), ConnectionId(1));
        fib.remove_route(&name, ConnectionId(1));
        assert_eq!(fib.route_count(), 0);
    }

    #[test]
    fn remove_connection_prunes_all_entries() {
        let fib = Fib::new(FibConfig::default());
        fib.add_route(Name::from_uri("/a"), ConnectionId(1));
        fib.add_route(Name::from_uri("/b"), ConnectionId(1));
        fib.add_route(Name::from_uri("/b"), ConnectionId(2));
        fib.remove_connection(ConnectionId(1));
        assert_eq!(fib.route_count(), 1);
        assert!(fib.has_route(&Name::from_uri("/b"), ConnectionId(2)));
    }
}
