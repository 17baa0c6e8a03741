// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process sequenced pub/sub bus.
//!
//! The gateway core is the single authority that emits events; WebSocket
//! clients and internal tasks subscribe. Sequence numbers are assigned
//! under a critical section and are strictly increasing with no gaps for
//! the lifetime of the process (the counter is restored from the persisted
//! event log at startup).
//!
//! Delivery is best-effort over a bounded ring per subscriber: a slow
//! consumer loses the oldest contiguous run of undelivered events rather
//! than backpressuring the publisher. Lost counts are surfaced through the
//! `agw_bus_lag_total` counter and per-subscription [`Subscription::lagged`].

use std::sync::Mutex;

use chrono::Utc;
use tokio::sync::broadcast;

use agw_core::{Event, EventType};

/// Default bounded queue size per subscriber.
pub const DEFAULT_QUEUE_SIZE: usize = 1024;

/// Filter applied on the subscriber side of the bus.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    /// Only events whose dotted type name starts with this prefix.
    pub type_prefix: Option<String>,
    /// Only events carrying this run id.
    pub run_id: Option<String>,
}

impl SubscriptionFilter {
    /// Matches every event.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_run(run_id: impl Into<String>) -> Self {
        Self {
            type_prefix: None,
            run_id: Some(run_id.into()),
        }
    }

    fn matches(&self, event: &Event) -> bool {
        event.matches(self.type_prefix.as_deref(), self.run_id.as_deref())
    }
}

/// A live subscription handle. Dropping it unsubscribes.
pub struct Subscription {
    rx: broadcast::Receiver<Event>,
    filter: SubscriptionFilter,
    lagged: u64,
}

impl Subscription {
    /// Receives the next matching event, skipping over lag gaps.
    ///
    /// Returns `None` once the bus is dropped and the backlog is drained.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.lagged += n;
                    metrics::counter!("agw_bus_lag_total").increment(n);
                    tracing::warn!(dropped = n, "subscriber lagged, oldest events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Total events dropped for this subscriber due to overflow.
    pub fn lagged(&self) -> u64 {
        self.lagged
    }
}

/// The in-process event bus.
pub struct EventBus {
    seq: Mutex<u64>,
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_queue_size(DEFAULT_QUEUE_SIZE)
    }

    pub fn with_queue_size(queue_size: usize) -> Self {
        let (tx, _rx) = broadcast::channel(queue_size);
        Self {
            seq: Mutex::new(0),
            tx,
        }
    }

    /// Restores the sequence counter, e.g. from `MAX(seq)` of the persisted
    /// event log. Only valid before the first publication.
    pub fn restore_seq(&self, seq: u64) {
        let mut guard = self.seq.lock().expect("bus seq lock poisoned");
        *guard = seq;
    }

    /// Last assigned sequence number (the subscribe watermark).
    pub fn current_seq(&self) -> u64 {
        *self.seq.lock().expect("bus seq lock poisoned")
    }

    /// Stamps a draft with the next sequence number and the current time.
    ///
    /// Callers that persist before broadcasting (the gateway core) must
    /// serialize stamp + [`broadcast`](Self::broadcast) on their own
    /// critical section so subscribers observe sequence order.
    pub fn stamp(
        &self,
        event_type: EventType,
        run_id: Option<String>,
        channel_id: Option<String>,
        payload: serde_json::Value,
    ) -> Event {
        let mut guard = self.seq.lock().expect("bus seq lock poisoned");
        *guard += 1;
        Event {
            seq: *guard,
            event_type,
            ts: Utc::now(),
            run_id,
            channel_id,
            payload,
        }
    }

    /// Delivers a stamped event to every live subscriber.
    pub fn broadcast(&self, event: Event) {
        // send() only errors when there are no receivers; publication is
        // best-effort so that is not a failure.
        let _ = self.tx.send(event);
    }

    /// Assigns the next sequence number and delivers in one critical
    /// section. Returns the published event.
    pub fn publish(
        &self,
        event_type: EventType,
        run_id: Option<String>,
        channel_id: Option<String>,
        payload: serde_json::Value,
    ) -> Event {
        let mut guard = self.seq.lock().expect("bus seq lock poisoned");
        *guard += 1;
        let event = Event {
            seq: *guard,
            event_type,
            ts: Utc::now(),
            run_id,
            channel_id,
            payload,
        };
        let _ = self.tx.send(event.clone());
        event
    }

    /// Subscribes with the given filter. The subscription sees every event
    /// published after this call, subject to overflow.
    pub fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            filter,
            lagged: 0,
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn publish_assigns_increasing_seq() {
        let bus = EventBus::new();
        let a = bus.publish(EventType::RunProgress, None, None, json!({}));
        let b = bus.publish(EventType::RunProgress, None, None, json!({}));
        assert_eq!(a.seq, 1);
        assert_eq!(b.seq, 2);
        assert_eq!(bus.current_seq(), 2);
    }

    #[tokio::test]
    async fn restore_seq_continues_from_watermark() {
        let bus = EventBus::new();
        bus.restore_seq(41);
        let evt = bus.publish(EventType::RunOutput, None, None, json!({}));
        assert_eq!(evt.seq, 42);
    }

    #[tokio::test]
    async fn subscriber_receives_published_events_in_order() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(SubscriptionFilter::all());

        for _ in 0..5 {
            bus.publish(EventType::RunProgress, Some("run_1".into()), None, json!({}));
        }

        let mut last = 0;
        for _ in 0..5 {
            let evt = sub.recv().await.unwrap();
            assert!(evt.seq > last, "seq must be strictly increasing");
            last = evt.seq;
        }
    }

    #[tokio::test]
    async fn run_filter_hides_other_runs() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(SubscriptionFilter::for_run("run_2"));

        bus.publish(EventType::RunOutput, Some("run_1".into()), None, json!({"n": 1}));
        bus.publish(EventType::RunOutput, Some("run_2".into()), None, json!({"n": 2}));

        let evt = sub.recv().await.unwrap();
        assert_eq!(evt.run_id.as_deref(), Some("run_2"));
    }

    #[tokio::test]
    async fn type_prefix_filter_selects_family() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(SubscriptionFilter {
            type_prefix: Some("security.".into()),
            run_id: None,
        });

        bus.publish(EventType::RunProgress, None, None, json!({}));
        bus.publish(EventType::SecurityBlocked, None, None, json!({"reason": "x"}));

        let evt = sub.recv().await.unwrap();
        assert_eq!(evt.event_type, EventType::SecurityBlocked);
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_counts_lag() {
        let bus = EventBus::with_queue_size(8);
        let mut slow = bus.subscribe(SubscriptionFilter::all());

        // Publish 2x the queue size without the subscriber reading.
        for _ in 0..16 {
            bus.publish(EventType::RunProgress, None, None, json!({}));
        }

        // The first received event is not seq 1: the oldest contiguous run
        // was dropped, never reordered.
        let first = slow.recv().await.unwrap();
        assert!(first.seq > 1);
        assert!(slow.lagged() > 0);

        let mut last = first.seq;
        while let Ok(Some(evt)) =
            tokio::time::timeout(std::time::Duration::from_millis(50), slow.recv()).await
        {
            assert_eq!(evt.seq, last + 1, "post-drop delivery must be gap-free");
            last = evt.seq;
        }
        assert_eq!(last, 16);
    }

    #[tokio::test]
    async fn overflow_does_not_affect_other_subscribers() {
        let bus = EventBus::with_queue_size(8);
        let mut slow = bus.subscribe(SubscriptionFilter::all());
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();

        // A fast subscriber keeps up while the slow one never reads.
        let mut fast = bus.subscribe(SubscriptionFilter::all());
        let reader = tokio::spawn(async move {
            let mut seen = 0u64;
            while seen < 16 {
                let evt = fast.recv().await.unwrap();
                seen += 1;
                assert_eq!(evt.seq, seen);
            }
            let _ = done_tx.send(seen);
        });

        for _ in 0..16 {
            bus.publish(EventType::RunProgress, None, None, json!({}));
            tokio::task::yield_now().await;
        }

        let seen = done_rx.await.unwrap();
        assert_eq!(seen, 16, "fast subscriber must receive all events");
        reader.await.unwrap();

        let first_slow = slow.recv().await.unwrap();
        assert!(first_slow.seq >= 1);
    }

    #[tokio::test]
    async fn subscriber_count_tracks_drops() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        let sub = bus.subscribe(SubscriptionFilter::all());
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
