//! Content Store: bounded-capacity LRU cache of content objects with
//! name/keyid/hash lookup. See spec.md §4.4.

use crate::config::ContentStoreConfig;
use crate::delay::DelayQueue;
use ccnf_common::name::{HashValue, Name};
use ccnf_common::packet::{ContentObject, Interest};
use slab::Slab;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

struct CsEntry {
    content_object: Arc<ContentObject>,
    use_count: u64,
    cached_at: Instant,
    stale: bool,
    prev: Option<usize>,
    next: Option<usize>,
}

impl CsEntry {
    fn is_valid(&self, now: Instant) -> bool {
        !self.stale && now < self.cached_at + self.content_object.freshness
    }
}

/// The intrusive doubly-linked LRU list plus the three lookup indices,
/// all updated together within a single lock acquisition (spec.md §5:
/// "must be updated together atomically within a single event").
struct Inner {
    slab: Slab<CsEntry>,
    by_hash: HashMap<HashValue, usize>,
    by_name: HashMap<Name, usize>,
    by_name_keyid: HashMap<(Name, HashValue), usize>,
    lru_head: Option<usize>,
    lru_tail: Option<usize>,
    capacity: usize,
}

impl Inner {
    fn new(capacity: usize) -> Self {
        Self {
            slab: Slab::new(),
            by_hash: HashMap::new(),
            by_name: HashMap::new(),
            by_name_keyid: HashMap::new(),
            lru_head: None,
            lru_tail: None,
            capacity,
        }
    }

    fn lru_detach(&mut self, idx: usize) {
        let (prev, next) = {
            let e = &self.slab[idx];
            (e.prev, e.next)
        };
        match prev {
            Some(p) => self.slab[p].next = next,
            None => self.lru_head = next,
        }
        match next {
            Some(n) => self.slab[n].prev = prev,
            None => self.lru_tail = prev,
        }
        self.slab[idx].prev = None;
        self.slab[idx].next = None;
    }

    fn lru_push_front(&mut self, idx: usize) {
        let old_head = self.lru_head;
        self.slab[idx].prev = None;
        self.slab[idx].next = old_head;
        if let Some(h) = old_head {
            self.slab[h].prev = Some(idx);
        }
        self.lru_head = Some(idx);
        if self.lru_tail.is_none() {
            self.lru_tail = Some(idx);
        }
    }

    fn lru_move_to_front(&mut self, idx: usize) {
        if self.lru_head == Some(idx) {
            return;
        }
        self.lru_detach(idx);
        self.lru_push_front(idx);
    }

    fn lru_pop_tail(&mut self) -> Option<usize> {
        let tail = self.lru_tail?;
        self.lru_detach(tail);
        Some(tail)
    }

    /// Removes `idx` from every index and the LRU list, then frees its
    /// slab slot.
    fn evict(&mut self, idx: usize) {
        self.lru_detach(idx);
        let entry = self.slab.remove(idx);
        self.by_hash.remove(&entry.content_object.hash);
        self.by_name.remove(&entry.content_object.name);
        if let Some(keyid) = entry.content_object.keyid {
            self.by_name_keyid
                .remove(&(entry.content_object.name.clone(), keyid));
        }
    }

    fn match_interest(&mut self, interest: &Interest) -> Option<Arc<ContentObject>> {
        let idx = if let Some(hash) = interest.content_object_hash_restriction {
            self.by_hash.get(&hash).copied()
        } else if let Some(keyid) = interest.keyid_restriction {
            self.by_name_keyid.get(&(interest.name.clone(), keyid)).copied()
        } else {
            self.by_name.get(&interest.name).copied()
        }?;

        let now = Instant::now();
        if self.slab[idx].is_valid(now) {
            self.slab[idx].use_count += 1;
            self.lru_move_to_front(idx);
            Some(self.slab[idx].content_object.clone())
        } else {
            self.evict(idx);
            None
        }
    }

    fn add_content_object(&mut self, content_object: ContentObject) {
        if self.by_hash.contains_key(&content_object.hash) {
            return;
        }
        if self.slab.len() >= self.capacity {
            if let Some(victim) = self.lru_pop_tail() {
                let entry = self.slab.remove(victim);
                self.by_hash.remove(&entry.content_object.hash);
                self.by_name.remove(&entry.content_object.name);
                if let Some(keyid) = entry.content_object.keyid {
                    self.by_name_keyid
                        .remove(&(entry.content_object.name.clone(), keyid));
                }
            }
        }

        let content_object = Arc::new(content_object);
        let idx = self.slab.insert(CsEntry {
            content_object: content_object.clone(),
            use_count: 0,
            cached_at: Instant::now(),
            stale: false,
            prev: None,
            next: None,
        });
        self.by_hash.insert(content_object.hash, idx);
        self.by_name.insert(content_object.name.clone(), idx);
        if let Some(keyid) = content_object.keyid {
            self.by_name_keyid.insert((content_object.name.clone(), keyid), idx);
        }
        self.lru_push_front(idx);
    }

    fn delete_content_object(&mut self, content_object: &ContentObject) {
        if let Some(&idx) = self.by_hash.get(&content_object.hash) {
            self.evict(idx);
        }
    }

    fn len(&self) -> usize {
        self.slab.len()
    }
}

type MatchCallback = Box<dyn FnOnce(Option<Arc<ContentObject>>) + Send>;
type AddCallback = Box<dyn FnOnce() + Send>;

struct MatchWorkItem {
    interest: Interest,
    callback: MatchCallback,
}

struct AddWorkItem {
    content_object: ContentObject,
    callback: AddCallback,
}

/// The Content Store, per spec.md §4.4. Cheap to clone: every field is
/// `Arc`-backed or a `Clone`-able delay queue sharing the same
/// underlying table.
#[derive(Clone)]
pub struct ContentStore {
    inner: Arc<Mutex<Inner>>,
    match_queue: DelayQueue<MatchWorkItem>,
    add_queue: DelayQueue<AddWorkItem>,
}

fn name_bytes(name: &Name) -> usize {
    name.components().map(|c| c.bytes.len()).sum()
}

impl ContentStore {
    pub fn new(config: ContentStoreConfig) -> Self {
        let inner = Arc::new(Mutex::new(Inner::new(config.object_capacity)));
        let delay = config.delay();

        let match_inner = inner.clone();
        let match_delay = delay;
        let match_queue = DelayQueue::new(
            config.layer_delay_servers,
            move |item: &MatchWorkItem| match_delay.service_time(name_bytes(&item.interest.name)),
            move |item: MatchWorkItem| {
                let hit = match_inner.lock().unwrap().match_interest(&item.interest);
                (item.callback)(hit);
            },
        );

        let add_inner = inner.clone();
        let add_delay = delay;
        let add_queue = DelayQueue::new(
            config.layer_delay_servers,
            move |item: &AddWorkItem| add_delay.service_time(name_bytes(&item.content_object.name)),
            move |item: AddWorkItem| {
                add_inner.lock().unwrap().add_content_object(item.content_object);
                (item.callback)();
            },
        );

        Self {
            inner,
            match_queue,
            add_queue,
        }
    }

    /// Asynchronously tries to satisfy `interest` from the cache.
    pub fn match_interest(
        &self,
        interest: Interest,
        callback: impl FnOnce(Option<Arc<ContentObject>>) + Send + 'static,
    ) {
        self.match_queue.push_back(MatchWorkItem {
            interest,
            callback: Box::new(callback),
        });
    }

    /// Asynchronously inserts `content_object`, evicting the LRU tail
    /// first if the store is at capacity.
    pub fn add_content_object(
        &self,
        content_object: ContentObject,
        callback: impl FnOnce() + Send + 'static,
    ) {
        self.add_queue.push_back(AddWorkItem {
            content_object,
            callback: Box::new(callback),
        });
    }

    /// Synchronous removal; not in spec.md §5's enumerated suspension
    /// points.
    pub fn delete_content_object(&self, content_object: &ContentObject) {
        self.inner.lock().unwrap().delete_content_object(content_object);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::mpsc;
    use std::time::Duration;

    fn wait_for<T: Send + 'static>(rx: mpsc::Receiver<T>) -> T {
        rx.recv_timeout(Duration::from_secs(1)).unwrap()
    }

    fn add_and_wait(cs: &ContentStore, co: ContentObject) {
        let (tx, rx) = mpsc::channel();
        cs.add_content_object(co, move || tx.send(()).unwrap());
        wait_for(rx);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn hit_increments_use_and_moves_to_front() {
        let cs = ContentStore::new(ContentStoreConfig::default());
        add_and_wait(&cs, ContentObject::new(Name::from_uri("/a"), Bytes::from_static(b"x"), None));

        let (tx, rx) = mpsc::channel();
        cs.match_interest(Interest::new(Name::from_uri("/a")), move |hit| {
            tx.send(hit).unwrap();
        });
        let hit = wait_for(rx);
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().name, Name::from_uri("/a"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn miss_returns_none() {
        let cs = ContentStore::new(ContentStoreConfig::default());
        let (tx, rx) = mpsc::channel();
        cs.match_interest(Interest::new(Name::from_uri("/nope")), move |hit| {
            tx.send(hit).unwrap();
        });
        assert!(wait_for(rx).is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn capacity_evicts_lru_and_keeps_most_recent() {
        let mut config = ContentStoreConfig::default();
        config.object_capacity = 2;
        let cs = ContentStore::new(config);

        add_and_wait(&cs, ContentObject::new(Name::from_uri("/a"), Bytes::from_static(b"a"), None));
        add_and_wait(&cs, ContentObject::new(Name::from_uri("/b"), Bytes::from_static(b"b"), None));
        add_and_wait(&cs, ContentObject::new(Name::from_uri("/c"), Bytes::from_static(b"c"), None));

        assert_eq!(cs.len(), 2);

        let (tx, rx) = mpsc::channel();
        cs.match_interest(Interest::new(Name::from_uri("/a")), move |hit| tx.send(hit).unwrap());
        assert!(wait_for(rx).is_none(), "oldest entry should have been evicted");

        let (tx, rx) = mpsc::channel();
        cs.match_interest(Interest::new(Name::from_uri("/c")), move |hit| tx.send(hit).unwrap());
        assert!(wait_for(rx).is_some(), "most recently added entry should remain");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn duplicate_add_by_hash_is_a_no_op() {
        let cs = ContentStore::new(ContentStoreConfig::default());
        let co = ContentObject::new(Name::from_uri("/a"), Bytes::from_static(b"x"), None);
        add_and_wait(&cs, co.clone());
        add_and_wait(&cs, co);
        assert_eq!(cs.len(), 1);
    }

    #[test]
    fn delete_removes_from_every_index() {
        let cs = ContentStore::new(ContentStoreConfig::default());
        let co = ContentObject::new(Name::from_uri("/a"), Bytes::from_static(b"x"), None);
        cs.inner.lock().unwrap().add_content_object(co.clone());
        assert_eq!(cs.len(), 1);
        cs.delete_content_object(&co);
        assert_eq!(cs.len(), 0);
    }
}
