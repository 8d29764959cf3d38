//! A generic multi-server delay queue. See spec.md §4.1.
//!
//! Each component (FIB, PIT, Content Store, Forwarder) owns one of
//! these to model its processing cost as a scheduled, asynchronous
//! completion rather than an immediate return. Built on
//! `tokio::time::sleep` + `tokio::spawn`, following the teacher's
//! pattern of spawning one task per in-flight unit of work
//! (`rust-udcn-quic/src/face.rs::process_incoming_streams`).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct State<T> {
    backlog: VecDeque<T>,
    busy: usize,
}

struct Inner<T> {
    servers: usize,
    state: Mutex<State<T>>,
    service_time: Box<dyn Fn(&T) -> Duration + Send + Sync>,
    dequeue: Box<dyn Fn(T) + Send + Sync>,
}

/// A generic work-item queue with `servers` parallel servers.
///
/// Invariant (spec.md §4.1): at most `servers` items are in service at
/// once; the rest wait FIFO in the backlog. `dequeue` may itself push
/// new items onto this (or another) `DelayQueue`; the backlog count is
/// only adjusted after `dequeue` returns, so a callback that
/// re-enters `push_back` observes a consistent server occupancy.
pub struct DelayQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for DelayQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> DelayQueue<T> {
    /// `servers` must be at least 1. `service_time` computes how long
    /// an item should be delayed before `dequeue` runs.
    pub fn new(
        servers: usize,
        service_time: impl Fn(&T) -> Duration + Send + Sync + 'static,
        dequeue: impl Fn(T) + Send + Sync + 'static,
    ) -> Self {
        assert!(servers >= 1, "DelayQueue requires at least one server");
        Self {
            inner: Arc::new(Inner {
                servers,
                state: Mutex::new(State {
                    backlog: VecDeque::new(),
                    busy: 0,
                }),
                service_time: Box::new(service_time),
                dequeue: Box::new(dequeue),
            }),
        }
    }

    /// Enqueues `item`. If a server is idle, service starts
    /// immediately; otherwise the item waits in FIFO backlog order.
    pub fn push_back(&self, item: T) {
        let mut pending = Some(item);
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.busy < self.inner.servers {
                state.busy += 1;
            } else {
                state.backlog.push_back(pending.take().unwrap());
            }
        }
        if let Some(item) = pending {
            Self::dispatch(self.inner.clone(), item);
        }
    }

    /// Number of items currently waiting (not yet in service).
    pub fn backlog_len(&self) -> usize {
        self.inner.state.lock().unwrap().backlog.len()
    }

    /// Number of servers currently busy.
    pub fn busy_servers(&self) -> usize {
        self.inner.state.lock().unwrap().busy
    }

    fn dispatch(inner: Arc<Inner<T>>, item: T) {
        let service_time = (inner.service_time)(&item);
        tokio::spawn(async move {
            tokio::time::sleep(service_time).await;
            (inner.dequeue)(item);
            let next = {
                let mut state = inner.state.lock().unwrap();
                match state.backlog.pop_front() {
                    Some(next_item) => Some(next_item),
                    None => {
                        state.busy -= 1;
                        None
                    }
                }
            };
            if let Some(next_item) = next {
                DelayQueue::dispatch(inner.clone(), next_item);
            }
        });
    }
}

/// The affine service-time formula used throughout spec.md §4
/// (`constant + slope × units`).
#[derive(Debug, Clone, Copy)]
pub struct LinearDelay {
    pub constant: Duration,
    pub slope_per_unit: Duration,
}

impl LinearDelay {
    pub fn new(constant: Duration, slope_per_unit: Duration) -> Self {
        Self {
            constant,
            slope_per_unit,
        }
    }

    pub fn service_time(&self, units: usize) -> Duration {
        self.constant + self.slope_per_unit * (units as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn single_server_serializes_work() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let order_clone = order.clone();
        let queue: DelayQueue<u32> = DelayQueue::new(
            1,
            |_| Duration::from_millis(10),
            move |item| order_clone.lock().unwrap().push(item),
        );
        queue.push_back(1);
        queue.push_back(2);
        queue.push_back(3);
        assert_eq!(queue.backlog_len(), 2);

        tokio::time::advance(Duration::from_millis(35)).await;
        tokio::task::yield_now().await;

        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn dequeue_can_requeue_without_corrupting_accounting() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let queue: DelayQueue<u32> = DelayQueue::new(1, |_| Duration::from_millis(1), move |item| {
            count_clone.fetch_add(1, Ordering::SeqCst);
            let _ = item;
        });
        for i in 0..5 {
            queue.push_back(i);
        }
        tokio::time::advance(Duration::from_millis(20)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert_eq!(queue.busy_servers(), 0);
    }

    #[test]
    fn linear_delay_formula() {
        let d = LinearDelay::new(Duration::from_micros(1), Duration::from_nanos(10));
        assert_eq!(d.service_time(0), Duration::from_micros(1));
        assert_eq!(d.service_time(100), Duration::from_micros(1) + Duration::from_nanos(1000));
    }
}
