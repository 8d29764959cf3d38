//! Jittered periodic timers and a debounced one-shot timer, built on
//! `tokio::spawn` + `tokio::time::sleep` in the same style as
//! `ccnf-core`'s delay queue. See spec.md §4.9.

use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

fn jittered(jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return Duration::ZERO;
    }
    let millis = jitter.as_millis().max(1) as u64;
    Duration::from_millis(rand::thread_rng().gen_range(0..millis))
}

/// A recurring timer that fires every `interval + uniform(0, jitter)`,
/// re-drawing the jitter on each cycle. Dropping or calling
/// [`PeriodicTimer::cancel`] stops it; both are idempotent.
pub struct PeriodicTimer {
    handle: JoinHandle<()>,
}

impl PeriodicTimer {
    pub fn spawn(interval: Duration, jitter: Duration, mut on_fire: impl FnMut() + Send + 'static) -> Self {
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval + jittered(jitter)).await;
                on_fire();
            }
        });
        Self { handle }
    }

    pub fn cancel(self) {
        self.handle.abort();
    }
}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// The `ProcessWorkQueueTimer` pattern: armed on any change, fires
/// once after `delay` to coalesce rapid updates into a single pass,
/// then can be armed again. Arming while already pending is a no-op
/// (spec.md §5, "timers are re-armable and idempotent to cancel").
#[derive(Clone)]
pub struct DebounceTimer {
    delay: Duration,
    armed: Arc<Mutex<bool>>,
}

impl DebounceTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            armed: Arc::new(Mutex::new(false)),
        }
    }

    pub fn arm(&self, on_fire: impl FnOnce() + Send + 'static) {
        let mut armed = self.armed.lock().unwrap();
        if *armed {
            return;
        }
        *armed = true;
        let armed_flag = self.armed.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            *armed_flag.lock().unwrap() = false;
            on_fire();
        });
    }

    pub fn is_armed(&self) -> bool {
        *self.armed.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn periodic_timer_fires_repeatedly() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let timer = PeriodicTimer::spawn(Duration::from_millis(10), Duration::ZERO, move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::advance(Duration::from_millis(35)).await;
        tokio::task::yield_now().await;
        assert!(count.load(Ordering::SeqCst) >= 3);
        timer.cancel();
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn debounce_timer_coalesces_repeated_arms() {
        let count = Arc::new(AtomicUsize::new(0));
        let timer = DebounceTimer::new(Duration::from_millis(10));

        for _ in 0..5 {
            let count_clone = count.clone();
            timer.arm(move || {
                count_clone.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(timer.is_armed());

        tokio::time::advance(Duration::from_millis(15)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());
    }
}
