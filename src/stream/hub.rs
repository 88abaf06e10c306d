// SPDX-License-Identifier: GPL-3.0-only

//! Fan-out of encoded stream parts to connected consumers
//!
//! Every subscriber gets its own bounded queue. Publishing never blocks: a
//! full queue drops the new part for that subscriber only, and a queue whose
//! receiver is gone is removed from the registry.

use crate::errors::CaptureError;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, trace};

/// Registry of live stream subscriptions
#[derive(Debug)]
pub struct StreamHub {
    subscribers: Mutex<HashMap<u64, mpsc::Sender<Bytes>>>,
    next_id: AtomicU64,
    queue_depth: usize,
    closed: AtomicBool,
    dropped_parts: AtomicU64,
}

impl StreamHub {
    /// Create a hub whose subscribers buffer up to `queue_depth` parts
    pub fn new(queue_depth: usize) -> Arc<Self> {
        Arc::new(Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_depth: queue_depth.max(1),
            closed: AtomicBool::new(false),
            dropped_parts: AtomicU64::new(0),
        })
    }

    /// Register a new consumer
    ///
    /// After [`close`](Self::close) the returned subscription ends immediately.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue_depth);

        let mut subscribers = self.subscribers.lock();
        if !self.closed.load(Ordering::Acquire) {
            subscribers.insert(id, tx);
            info!(id, total = subscribers.len(), "Stream subscriber connected");
        }
        drop(subscribers);

        Subscription {
            id,
            receiver: rx,
            hub: Arc::downgrade(self),
        }
    }

    pub fn unsubscribe(&self, id: u64) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.remove(&id).is_some() {
            info!(id, total = subscribers.len(), "Stream subscriber disconnected");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.lock().is_empty()
    }

    /// Parts dropped so far because a subscriber's queue was full
    pub fn dropped_parts(&self) -> u64 {
        self.dropped_parts.load(Ordering::Relaxed)
    }

    /// Queue a part for every subscriber; returns how many accepted it
    pub fn publish(&self, part: Bytes) -> usize {
        let mut delivered = 0;
        let mut subscribers = self.subscribers.lock();

        subscribers.retain(|&id, tx| match tx.try_send(part.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                trace!(id, "Subscriber queue full, dropping part");
                self.dropped_parts.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(error = %CaptureError::SubscriberUnreachable(id), "Removing subscriber");
                false
            }
        });

        delivered
    }

    /// Remove all subscribers and refuse new ones
    ///
    /// Open streams end once their queued parts are consumed.
    pub fn close(&self) {
        // Flag and clear under the registry lock so no subscribe slips in between
        let mut subscribers = self.subscribers.lock();
        self.closed.store(true, Ordering::Release);
        if !subscribers.is_empty() {
            info!(count = subscribers.len(), "Closing stream subscriptions");
        }
        subscribers.clear();
    }
}

/// One consumer's queue of encoded parts
///
/// Dropping it unregisters the consumer.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<Bytes>,
    hub: Weak<StreamHub>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next part; `None` once the hub is closed
    pub async fn next_part(&mut self) -> Option<Bytes> {
        self.receiver.recv().await
    }

    /// Take a queued part without waiting
    pub fn try_next_part(&mut self) -> Option<Bytes> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parts_arrive_in_order() {
        let hub = StreamHub::new(8);
        let mut sub = hub.subscribe();

        for i in 0..3u8 {
            assert_eq!(hub.publish(Bytes::from(vec![i])), 1);
        }

        for i in 0..3u8 {
            assert_eq!(sub.next_part().await.unwrap(), Bytes::from(vec![i]));
        }
    }

    #[tokio::test]
    async fn test_full_queue_drops_only_for_that_subscriber() {
        let hub = StreamHub::new(2);
        let mut slow = hub.subscribe();
        let mut fast = hub.subscribe();

        for i in 0..5u8 {
            hub.publish(Bytes::from(vec![i]));
            // The fast consumer keeps up
            assert_eq!(fast.next_part().await.unwrap(), Bytes::from(vec![i]));
        }

        // The slow consumer kept the oldest parts, the newer ones were dropped
        assert_eq!(slow.try_next_part().unwrap(), Bytes::from(vec![0]));
        assert_eq!(slow.try_next_part().unwrap(), Bytes::from(vec![1]));
        assert!(slow.try_next_part().is_none());
        assert_eq!(hub.dropped_parts(), 3);
        assert_eq!(hub.subscriber_count(), 2);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let hub = StreamHub::new(2);
        let sub = hub.subscribe();
        assert!(hub.has_subscribers());

        drop(sub);
        assert!(!hub.has_subscribers());
        assert_eq!(hub.publish(Bytes::from_static(b"x")), 0);
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        let hub = StreamHub::new(2);
        let mut sub = hub.subscribe();
        hub.publish(Bytes::from_static(b"last"));
        hub.close();

        assert_eq!(sub.next_part().await.unwrap(), Bytes::from_static(b"last"));
        assert!(sub.next_part().await.is_none());

        let mut late = hub.subscribe();
        assert!(late.next_part().await.is_none());
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_subscribe_racing_close_never_outlives_it() {
        for _ in 0..50 {
            let hub = StreamHub::new(2);
            let barrier = Arc::new(std::sync::Barrier::new(5));

            let subscribers: Vec<_> = (0..4)
                .map(|_| {
                    let hub = Arc::clone(&hub);
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        (0..20).map(|_| hub.subscribe()).collect::<Vec<_>>()
                    })
                })
                .collect();

            barrier.wait();
            hub.close();

            let mut subs: Vec<Subscription> = subscribers
                .into_iter()
                .flat_map(|t| t.join().unwrap())
                .collect();

            assert_eq!(hub.subscriber_count(), 0);
            for sub in &mut subs {
                assert!(sub.try_next_part().is_none());
                assert!(sub.receiver.is_closed());
            }
        }
    }
}
