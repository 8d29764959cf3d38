//! Pending Interest Table: interest aggregation and reverse-path
//! fan-out. See spec.md §4.3.

use crate::config::PitConfig;
use crate::connection::ConnectionId;
use crate::delay::DelayQueue;
use ccnf_common::name::{HashValue, Name};
use ccnf_common::packet::{ContentObject, Interest};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// The outcome of `ReceiveInterest` for a single incoming Interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveVerdict {
    /// First (or retransmitted) Interest for this entry: continue to
    /// the Content Store / FIB.
    Forward,
    /// A different reverse path was already waiting: stop here.
    Aggregate,
}

/// A PIT entry: a reverse-route set with a single expiry time.
struct PitEntry {
    reverse: HashSet<ConnectionId>,
    expiry: Instant,
}

impl PitEntry {
    fn new(ingress: ConnectionId, expiry: Instant) -> Self {
        let mut reverse = HashSet::new();
        reverse.insert(ingress);
        Self { reverse, expiry }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expiry
    }

    /// Applies an incoming Interest to this entry and returns the
    /// verdict. See spec.md §4.3, "Entry.Receive".
    fn receive(&mut self, ingress: ConnectionId, new_expiry: Instant, now: Instant) -> ReceiveVerdict {
        if self.is_expired(now) {
            self.reverse.clear();
            self.expiry = new_expiry;
        } else {
            self.expiry = self.expiry.max(new_expiry);
        }

        if self.reverse.is_empty() {
            self.reverse.insert(ingress);
            ReceiveVerdict::Forward
        } else if self.reverse.contains(&ingress) {
            ReceiveVerdict::Forward
        } else {
            self.reverse.insert(ingress);
            ReceiveVerdict::Aggregate
        }
    }
}

#[derive(Default)]
struct Tables {
    by_name: HashMap<Name, PitEntry>,
    by_name_keyid: HashMap<(Name, HashValue), PitEntry>,
    by_hash: HashMap<HashValue, PitEntry>,
}

impl Tables {
    fn len(&self) -> usize {
        self.by_name.len() + self.by_name_keyid.len() + self.by_hash.len()
    }
}

type ReceiveCallback = Box<dyn FnOnce(ReceiveVerdict) + Send>;
type SatisfyCallback = Box<dyn FnOnce(Vec<ConnectionId>) + Send>;

struct ReceiveWorkItem {
    interest: Interest,
    ingress: ConnectionId,
    callback: ReceiveCallback,
}

struct SatisfyWorkItem {
    content_object: ContentObject,
    ingress: ConnectionId,
    callback: SatisfyCallback,
}

/// The Pending Interest Table, per spec.md §4.3. Cheap to clone: every
/// field is itself `Arc`-backed or a `Clone`-able delay queue sharing
/// the same underlying tables.
#[derive(Clone)]
pub struct Pit {
    tables: Arc<Mutex<Tables>>,
    default_lifetime: Duration,
    receive_queue: DelayQueue<ReceiveWorkItem>,
    satisfy_queue: DelayQueue<SatisfyWorkItem>,
}

fn name_bytes(name: &Name) -> usize {
    name.components().map(|c| c.bytes.len()).sum()
}

impl Pit {
    pub fn new(config: PitConfig) -> Self {
        let tables: Arc<Mutex<Tables>> = Arc::new(Mutex::new(Tables::default()));
        let delay = config.delay();

        let receive_tables = tables.clone();
        let default_lifetime = config.default_lifetime;
        let receive_delay = delay;
        let receive_queue = DelayQueue::new(
            config.layer_delay_servers,
            move |item: &ReceiveWorkItem| receive_delay.service_time(name_bytes(&item.interest.name)),
            move |item: ReceiveWorkItem| {
                let verdict = receive_interest_now(&receive_tables, &item.interest, item.ingress, default_lifetime);
                (item.callback)(verdict);
            },
        );

        let satisfy_tables = tables.clone();
        let satisfy_delay = delay;
        let satisfy_queue = DelayQueue::new(
            config.layer_delay_servers,
            move |item: &SatisfyWorkItem| satisfy_delay.service_time(name_bytes(&item.content_object.name)),
            move |item: SatisfyWorkItem| {
                let egress = satisfy_interest_now(&satisfy_tables, &item.content_object, item.ingress);
                (item.callback)(egress);
            },
        );

        Self {
            tables,
            default_lifetime: config.default_lifetime,
            receive_queue,
            satisfy_queue,
        }
    }

    /// Asynchronously records `interest` as pending, selecting the
    /// sub-table by most-restrictive key present on the Interest
    /// (hash > name+keyid > name), per spec.md §4.3.
    pub fn receive_interest(
        &self,
        interest: Interest,
        ingress: ConnectionId,
        callback: impl FnOnce(ReceiveVerdict) + Send + 'static,
    ) {
        self.receive_queue.push_back(ReceiveWorkItem {
            interest,
            ingress,
            callback: Box::new(callback),
        });
    }

    /// Asynchronously fans a Content Object out to every waiting
    /// reverse path across all three sub-tables that could match it.
    pub fn satisfy_interest(
        &self,
        content_object: ContentObject,
        ingress: ConnectionId,
        callback: impl FnOnce(Vec<ConnectionId>) + Send + 'static,
    ) {
        self.satisfy_queue.push_back(SatisfyWorkItem {
            content_object,
            ingress,
            callback: Box::new(callback),
        });
    }

    pub fn len(&self) -> usize {
        self.tables.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn default_lifetime(&self) -> Duration {
        self.default_lifetime
    }
}

fn receive_interest_now(
    tables: &Mutex<Tables>,
    interest: &Interest,
    ingress: ConnectionId,
    default_lifetime: Duration,
) -> ReceiveVerdict {
    let now = Instant::now();
    let new_expiry = now + interest.lifetime.unwrap_or(default_lifetime);
    let mut tables = tables.lock().unwrap();

    if let Some(hash) = interest.content_object_hash_restriction {
        let entry = tables
            .by_hash
            .entry(hash)
            .or_insert_with(|| PitEntry::new(ingress, new_expiry));
        return entry_receive_or_init(entry, ingress, new_expiry, now);
    }
    if let Some(keyid) = interest.keyid_restriction {
        let key = (interest.name.clone(), keyid);
        let entry = tables
            .by_name_keyid
            .entry(key)
            .or_insert_with(|| PitEntry::new(ingress, new_expiry));
        return entry_receive_or_init(entry, ingress, new_expiry, now);
    }
    let entry = tables
        .by_name
        .entry(interest.name.clone())
        .or_insert_with(|| PitEntry::new(ingress, new_expiry));
    entry_receive_or_init(entry, ingress, new_expiry, now)
}

/// Always runs `receive` on the looked-up-or-inserted entry. For a
/// brand new entry (constructed with `ingress` already in its reverse
/// set) this just reconfirms `Forward` without double-inserting.
fn entry_receive_or_init(entry: &mut PitEntry, ingress: ConnectionId, new_expiry: Instant, now: Instant) -> ReceiveVerdict {
    entry.receive(ingress, new_expiry, now)
}

fn satisfy_interest_now(
    tables: &Mutex<Tables>,
    content_object: &ContentObject,
    ingress: ConnectionId,
) -> Vec<ConnectionId> {
    let now = Instant::now();
    let mut tables = tables.lock().unwrap();
    let mut union: HashSet<ConnectionId> = HashSet::new();

    take_reverse_set(&mut tables.by_hash, &content_object.hash, ingress, now, &mut union);

    if let Some(keyid) = content_object.keyid {
        let key = (content_object.name.clone(), keyid);
        take_reverse_set(&mut tables.by_name_keyid, &key, ingress, now, &mut union);
    }

    take_reverse_set(&mut tables.by_name, &content_object.name, ingress, now, &mut union);

    union.remove(&ingress);
    union.into_iter().collect()
}

/// Looks up `key` in `map`; if a live (non-expired) entry is found,
/// contributes its reverse set to `union`. Either way, removes
/// `ingress` from the entry and deletes the entry if it becomes
/// empty, implementing "remove or shrink the corresponding entries".
fn take_reverse_set<K: std::hash::Hash + Eq + Clone>(
    map: &mut HashMap<K, PitEntry>,
    key: &K,
    ingress: ConnectionId,
    now: Instant,
    union: &mut HashSet<ConnectionId>,
) {
    let mut delete = false;
    if let Some(entry) = map.get_mut(key) {
        if entry.is_expired(now) {
            entry.reverse.clear();
        } else {
            union.extend(entry.reverse.iter().copied());
        }
        entry.reverse.remove(&ingress);
        if entry.reverse.is_empty() {
            delete = true;
        }
    }
    if delete {
        map.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn wait_for<T: Send + 'static>(rx: mpsc::Receiver<T>) -> T {
        rx.recv_timeout(Duration::from_secs(1)).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn first_interest_forwards() {
        let pit = Pit::new(PitConfig::default());
        let (tx, rx) = mpsc::channel();
        pit.receive_interest(Interest::new(Name::from_uri("/a")), ConnectionId(1), move |v| {
            tx.send(v).unwrap();
        });
        assert_eq!(wait_for(rx), ReceiveVerdict::Forward);
        assert_eq!(pit.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_distinct_ingress_aggregates() {
        let pit = Pit::new(PitConfig::default());
        let (tx1, rx1) = mpsc::channel();
        pit.receive_interest(Interest::new(Name::from_uri("/a")), ConnectionId(1), move |v| {
            tx1.send(v).unwrap();
        });
        wait_for(rx1);

        let (tx2, rx2) = mpsc::channel();
        pit.receive_interest(Interest::new(Name::from_uri("/a")), ConnectionId(2), move |v| {
            tx2.send(v).unwrap();
        });
        assert_eq!(wait_for(rx2), ReceiveVerdict::Aggregate);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retransmission_from_same_ingress_forwards() {
        let pit = Pit::new(PitConfig::default());
        let (tx1, rx1) = mpsc::channel();
        pit.receive_interest(Interest::new(Name::from_uri("/a")), ConnectionId(1), move |v| {
            tx1.send(v).unwrap();
        });
        wait_for(rx1);

        let (tx2, rx2) = mpsc::channel();
        pit.receive_interest(Interest::new(Name::from_uri("/a")), ConnectionId(1), move |v| {
            tx2.send(v).unwrap();
        });
        assert_eq!(wait_for(rx2), ReceiveVerdict::Forward);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn satisfy_fans_out_to_all_reverse_paths_except_ingress() {
        let pit = Pit::new(PitConfig::default());
        for conn in [1u32, 2] {
            let (tx, rx) = mpsc::channel();
            pit.receive_interest(Interest::new(Name::from_uri("/a")), ConnectionId(conn), move |v| {
                tx.send(v).unwrap();
            });
            wait_for(rx);
        }

        let co = ContentObject::new(Name::from_uri("/a"), bytes::Bytes::from_static(b"x"), None);
        let (tx, rx) = mpsc::channel();
        pit.satisfy_interest(co, ConnectionId(3), move |egress| {
            tx.send(egress).unwrap();
        });
        let mut egress = wait_for(rx);
        egress.sort_by_key(|c| c.0);
        assert_eq!(egress, vec![ConnectionId(1), ConnectionId(2)]);
        assert_eq!(pit.len(), 0, "satisfying should clear the entry");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn satisfy_excludes_matching_ingress_connection() {
        let pit = Pit::new(PitConfig::default());
        let (tx, rx) = mpsc::channel();
        pit.receive_interest(Interest::new(Name::from_uri("/a")), ConnectionId(1), move |v| {
            tx.send(v).unwrap();
        });
        wait_for(rx);

        let co = ContentObject::new(Name::from_uri("/a"), bytes::Bytes::from_static(b"x"), None);
        let (tx, rx) = mpsc::channel();
        pit.satisfy_interest(co, ConnectionId(1), move |egress| {
            tx.send(egress).unwrap();
        });
        assert!(wait_for(rx).is_empty());
    }

    #[test]
    fn expiry_extends_only_upward() {
        let now = Instant::now();
        let mut entry = PitEntry::new(ConnectionId(1), now + Duration::from_millis(100));
        entry.receive(ConnectionId(1), now + Duration::from_millis(50), now);
        assert_eq!(entry.expiry, now + Duration::from_millis(100));
        entry.receive(ConnectionId(1), now + Duration::from_millis(200), now);
        assert_eq!(entry.expiry, now + Duration::from_millis(200));
    }

    #[test]
    fn expired_entry_clears_reverse_set_on_touch() {
        let now = Instant::now();
        let mut entry = PitEntry::new(ConnectionId(1), now - Duration::from_millis(1));
        let verdict = entry.receive(ConnectionId(2), now + Duration::from_millis(100), now);
        assert_eq!(verdict, ReceiveVerdict::Forward);
        assert!(entry.reverse.contains(&ConnectionId(2)));
        assert!(!entry.reverse.contains(&ConnectionId(1)));
    }
}
