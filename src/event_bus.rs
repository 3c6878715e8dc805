//! Multi-producer multi-consumer pub/sub keyed by event type.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// An event published on the bus.
#[derive(Debug, Clone)]
pub struct Event {
    /// The event type key subscribers register against.
    pub event_type: String,
    /// The plugin id (or "host") that produced this event.
    pub source: String,
    /// Unix-epoch milliseconds.
    pub timestamp: i64,
    /// Producer-owned payload. Callbacks must not retain it beyond their call.
    pub data: Arc<serde_json::Value>,
}

impl Event {
    /// Construct an event with the current wall-clock timestamp.
    pub fn new(event_type: impl Into<String>, source: impl Into<String>, data: serde_json::Value) -> Self {
        Event {
            event_type: event_type.into(),
            source: source.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            data: Arc::new(data),
        }
    }
}

/// A subscriber callback. Invoked with the published event; panics and
/// logged errors inside it are swallowed by the bus.
pub type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscriber {
    plugin_id: String,
    callback: Callback,
}

impl Clone for Subscriber {
    fn clone(&self) -> Self {
        Subscriber {
            plugin_id: self.plugin_id.clone(),
            callback: Arc::clone(&self.callback),
        }
    }
}

/// The event bus: the canonical cross-plugin synchronization point.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
}

impl EventBus {
    /// Construct an empty bus.
    pub fn new() -> Self {
        EventBus {
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Register `callback` under `event_type` on behalf of `plugin_id`.
    ///
    /// Appended to the end of that type's subscriber list, so ordering
    /// within a single thread's subscriptions matches call order.
    pub fn subscribe(&self, event_type: impl Into<String>, plugin_id: impl Into<String>, callback: Callback) {
        let mut subscribers = self.subscribers.lock();
        subscribers
            .entry(event_type.into())
            .or_default()
            .push(Subscriber {
                plugin_id: plugin_id.into(),
                callback,
            });
    }

    /// Remove every subscription `plugin_id` holds on `event_type`.
    ///
    /// When the type's subscriber list empties as a result, the key itself
    /// is removed.
    pub fn unsubscribe(&self, event_type: &str, plugin_id: &str) {
        let mut subscribers = self.subscribers.lock();
        if let Some(list) = subscribers.get_mut(event_type) {
            list.retain(|s| s.plugin_id != plugin_id);
            if list.is_empty() {
                subscribers.remove(event_type);
            }
        }
    }

    /// Remove every subscription `plugin_id` holds, across all event types.
    pub fn unsubscribe_all(&self, plugin_id: &str) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|_, list| {
            list.retain(|s| s.plugin_id != plugin_id);
            !list.is_empty()
        });
    }

    /// Publish `event` to every current subscriber of its type.
    ///
    /// Clones the subscriber list under lock, releases the lock, then
    /// invokes each callback in subscription order. Subscriptions added
    /// during this call do not see this event; panics inside a callback
    /// are caught and logged, never propagated.
    pub fn publish(&self, event: &Event) {
        let snapshot: Vec<Subscriber> = {
            let subscribers = self.subscribers.lock();
            subscribers
                .get(&event.event_type)
                .cloned()
                .unwrap_or_default()
        };

        for subscriber in &snapshot {
            let callback = Arc::clone(&subscriber.callback);
            let plugin_id = subscriber.plugin_id.clone();
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(event);
            }));
            if result.is_err() {
                tracing::error!(
                    plugin_id = %plugin_id,
                    event_type = %event.event_type,
                    "event subscriber callback panicked"
                );
            }
        }
    }

    /// The number of current subscribers to `event_type`.
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.subscribers
            .lock()
            .get(event_type)
            .map(|list| list.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn publish_only_invokes_matching_event_type() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        bus.subscribe(
            "t",
            "p1",
            Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        bus.publish(&Event::new("other", "host", serde_json::Value::Null));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        bus.publish(&Event::new("t", "host", serde_json::Value::Null));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscribers_fire_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let order1 = Arc::clone(&order);
        bus.subscribe("t", "p1", Arc::new(move |_| order1.lock().push("p1")));
        let order2 = Arc::clone(&order);
        bus.subscribe("t", "p2", Arc::new(move |_| order2.lock().push("p2")));

        bus.publish(&Event::new("t", "host", serde_json::Value::Null));
        assert_eq!(*order.lock(), vec!["p1", "p2"]);
    }

    #[test]
    fn unsubscribe_removes_only_that_plugin() {
        let bus = EventBus::new();
        let fired = Arc::new(Mutex::new(Vec::new()));

        let f1 = Arc::clone(&fired);
        bus.subscribe("t", "p1", Arc::new(move |_| f1.lock().push("p1")));
        let f2 = Arc::clone(&fired);
        bus.subscribe("t", "p2", Arc::new(move |_| f2.lock().push("p2")));

        bus.unsubscribe("t", "p1");
        bus.publish(&Event::new("t", "host", serde_json::Value::Null));
        assert_eq!(*fired.lock(), vec!["p2"]);
    }

    #[test]
    fn unsubscribe_all_removes_across_every_event_type() {
        let bus = EventBus::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        bus.subscribe("a", "p1", Arc::new({
            let f = Arc::clone(&f);
            move |_| {
                f.fetch_add(1, Ordering::SeqCst);
            }
        }));
        bus.subscribe("b", "p1", Arc::new(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        }));

        bus.unsubscribe_all("p1");
        bus.publish(&Event::new("a", "host", serde_json::Value::Null));
        bus.publish(&Event::new("b", "host", serde_json::Value::Null));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count("a"), 0);
        assert_eq!(bus.subscriber_count("b"), 0);
    }

    #[test]
    fn subscriptions_added_during_publish_do_not_fire_for_that_publish() {
        let bus = Arc::new(EventBus::new());
        let fired = Arc::new(AtomicUsize::new(0));

        let bus_clone = Arc::clone(&bus);
        let fired_clone = Arc::clone(&fired);
        bus.subscribe(
            "t",
            "p1",
            Arc::new(move |_| {
                bus_clone.subscribe(
                    "t",
                    "p2",
                    Arc::new({
                        let fired = Arc::clone(&fired_clone);
                        move |_| {
                            fired.fetch_add(1, Ordering::SeqCst);
                        }
                    }),
                );
            }),
        );

        bus.publish(&Event::new("t", "host", serde_json::Value::Null));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count("t"), 2);
    }
}
