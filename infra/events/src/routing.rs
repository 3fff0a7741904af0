use crate::binding::{BindingKey, Producer, Subscription};
use crate::error::BusError;
use crate::event::EventType;
use fxhash::FxHashMap;
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tracing::{trace, warn};

/// Subscriptions for one event type, in registration order.
#[derive(Debug, Default)]
struct Bucket {
    entries: RwLock<Vec<Arc<Subscription>>>,
}

/// Result of [`RoutingTable::add_subscription`].
#[derive(Debug)]
pub(crate) enum Join {
    /// An equal binding is already present.
    Duplicate,
    /// Added; carries the live producer to replay from, if any.
    Added(Option<Arc<Producer>>),
}

/// Concurrent routes: event type to subscriptions, and event type to its single producer.
///
/// Buckets are created on first use and never removed; dead entries are pruned
/// lazily whenever a bucket is written.
#[derive(Debug, Default)]
pub(crate) struct RoutingTable {
    subscribers: RwLock<FxHashMap<EventType, Arc<Bucket>>>,
    producers: RwLock<FxHashMap<EventType, Arc<Producer>>>,
}

impl RoutingTable {
    /// Adds `subscription` unless an equal binding is already present.
    ///
    /// The producer lock is held across the insert and the producer lookup, so
    /// a concurrent [`RoutingTable::put_producer`] either sees this subscription
    /// in its snapshot or is returned here, never both.
    pub(crate) fn add_subscription(&self, subscription: Arc<Subscription>) -> Join {
        let producers = self.producers.read();
        let event_type = subscription.event_type();
        let bucket = self.bucket(event_type);
        let mut entries = bucket.entries.write();

        entries.retain(|existing| existing.is_valid());
        let key = subscription.key();
        if entries.iter().any(|existing| existing.key() == key) {
            return Join::Duplicate;
        }

        entries.push(subscription);
        Join::Added(producers.get(&event_type).filter(|p| p.is_valid()).cloned())
    }

    /// Invalidates and detaches the binding identified by `key`.
    pub(crate) fn remove_subscription(
        &self,
        event_type: EventType,
        key: BindingKey,
        host: &str,
    ) -> Result<(), BusError> {
        let bucket = self.subscribers.read().get(&event_type).cloned();
        let removed = bucket.and_then(|bucket| {
            let mut entries = bucket.entries.write();
            let position = entries.iter().position(|existing| existing.key() == key)?;
            Some(entries.remove(position))
        });

        match removed {
            Some(subscription) => {
                subscription.invalidate();
                trace!(event = event_type.name(), host, "Subscription removed");
                Ok(())
            },
            None => Err(BusError::NotRegistered {
                host: host.to_owned().into(),
                event_type: event_type.name().into(),
                context: Some("subscriber".into()),
            }),
        }
    }

    /// Snapshot of the live subscriptions for `event_type`.
    pub(crate) fn subscribers(&self, event_type: EventType) -> Vec<Arc<Subscription>> {
        let Some(bucket) = self.subscribers.read().get(&event_type).cloned() else {
            return Vec::new();
        };
        let entries = bucket.entries.read();
        entries.iter().filter(|s| s.is_valid()).cloned().collect()
    }

    pub(crate) fn has_subscribers(&self, event_type: EventType) -> bool {
        self.subscribers
            .read()
            .get(&event_type)
            .is_some_and(|bucket| bucket.entries.read().iter().any(|s| s.is_valid()))
    }

    /// Installs `producer` unless a live producer already owns its event type.
    ///
    /// Any live owner, the same host included, is [`BusError::DuplicateProducer`].
    /// A producer whose host was dropped without unregistering is replaced.
    /// Returns the live subscribers of the event type at installation time.
    pub(crate) fn put_producer(
        &self,
        producer: Arc<Producer>,
    ) -> Result<Vec<Arc<Subscription>>, BusError> {
        let event_type = producer.event_type();
        let mut producers = self.producers.write();

        match producers.entry(event_type) {
            Entry::Occupied(existing) if existing.get().is_valid() => {
                return Err(BusError::DuplicateProducer {
                    event_type: event_type.name().into(),
                    existing: format!("{:?}", existing.get().host()).into(),
                    incoming: format!("{:?}", producer.host()).into(),
                    context: None,
                });
            },
            Entry::Occupied(mut stale) => {
                warn!(
                    event = event_type.name(),
                    previous = ?stale.get().host(),
                    "Replacing producer whose host is gone"
                );
                stale.get().invalidate();
                stale.insert(producer);
            },
            Entry::Vacant(slot) => {
                slot.insert(producer);
            },
        }

        let subscribers = self.subscribers(event_type);
        drop(producers);
        Ok(subscribers)
    }

    /// The live producer for `event_type`, if any.
    pub(crate) fn producer(&self, event_type: EventType) -> Option<Arc<Producer>> {
        self.producers.read().get(&event_type).filter(|p| p.is_valid()).cloned()
    }

    /// Invalidates and detaches the producer for `event_type` if it is the one identified by `key`.
    pub(crate) fn remove_producer(
        &self,
        event_type: EventType,
        key: BindingKey,
        host: &str,
    ) -> Result<(), BusError> {
        let mut producers = self.producers.write();

        match producers.entry(event_type) {
            Entry::Occupied(current) if current.get().key() == key => {
                current.remove().invalidate();
                trace!(event = event_type.name(), host, "Producer removed");
                Ok(())
            },
            _ => Err(BusError::NotRegistered {
                host: host.to_owned().into(),
                event_type: event_type.name().into(),
                context: Some("producer".into()),
            }),
        }
    }

    fn bucket(&self, event_type: EventType) -> Arc<Bucket> {
        if let Some(bucket) = self.subscribers.read().get(&event_type) {
            return Arc::clone(bucket);
        }
        Arc::clone(self.subscribers.write().entry(event_type).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::HostRef;
    use crate::event::Routable;
    use crate::registry::{Finder, Registry};
    use std::sync::Barrier;
    use std::thread;

    struct Tick;
    impl Routable for Tick {}

    struct Clock;
    impl Routable for Clock {}

    fn registry() -> Registry {
        Registry::builder()
            .produce::<Clock, Tick>(|_| Tick)
            .subscribe::<Clock, Tick>(|_, _| {})
            .build()
    }

    fn subscription(registry: &Registry, host: &Arc<dyn Routable>) -> Arc<Subscription> {
        let set = registry.subscribers_for(EventType::of::<Clock>()).unwrap();
        Arc::new(Subscription::new(
            HostRef::new(host),
            EventType::of::<Clock>(),
            set.methods()[0].clone(),
        ))
    }

    fn producer(registry: &Registry, host: &Arc<dyn Routable>) -> Arc<Producer> {
        let set = registry.producers_for(EventType::of::<Clock>()).unwrap();
        Arc::new(Producer::new(HostRef::new(host), EventType::of::<Clock>(), set.methods()[0].clone()))
    }

    #[test]
    fn test_equal_binding_is_not_added_twice() {
        let registry = registry();
        let host: Arc<dyn Routable> = Arc::new(Clock);
        let table = RoutingTable::default();

        assert!(matches!(table.add_subscription(subscription(&registry, &host)), Join::Added(None)));
        assert!(matches!(table.add_subscription(subscription(&registry, &host)), Join::Duplicate));
        assert_eq!(table.subscribers(EventType::of::<Tick>()).len(), 1);
    }

    #[test]
    fn test_removed_subscription_is_invalidated() {
        let registry = registry();
        let host: Arc<dyn Routable> = Arc::new(Clock);
        let table = RoutingTable::default();
        let sub = subscription(&registry, &host);
        let _ = table.add_subscription(Arc::clone(&sub));

        table.remove_subscription(EventType::of::<Tick>(), sub.key(), "Clock").unwrap();

        assert!(!sub.is_valid());
        assert!(!table.has_subscribers(EventType::of::<Tick>()));
        let again = table.remove_subscription(EventType::of::<Tick>(), sub.key(), "Clock");
        assert!(matches!(again, Err(BusError::NotRegistered { .. })));
    }

    #[test]
    fn test_dropped_host_is_not_routed() {
        let registry = registry();
        let host: Arc<dyn Routable> = Arc::new(Clock);
        let table = RoutingTable::default();
        let _ = table.add_subscription(subscription(&registry, &host));

        drop(host);

        assert!(table.subscribers(EventType::of::<Tick>()).is_empty());
        assert!(!table.has_subscribers(EventType::of::<Tick>()));
    }

    #[test]
    fn test_second_live_producer_is_rejected() {
        let registry = registry();
        let first: Arc<dyn Routable> = Arc::new(Clock);
        let second: Arc<dyn Routable> = Arc::new(Clock);
        let table = RoutingTable::default();

        table.put_producer(producer(&registry, &first)).unwrap();
        let err = table.put_producer(producer(&registry, &second)).unwrap_err();

        assert!(matches!(err, BusError::DuplicateProducer { .. }));
    }

    #[test]
    fn test_same_host_cannot_install_its_producer_twice() {
        let registry = registry();
        let host: Arc<dyn Routable> = Arc::new(Clock);
        let table = RoutingTable::default();

        table.put_producer(producer(&registry, &host)).unwrap();
        let err = table.put_producer(producer(&registry, &host)).unwrap_err();

        assert!(matches!(err, BusError::DuplicateProducer { .. }));
        assert!(!err.is_registration_conflict());
    }

    #[test]
    fn test_replay_is_recorded_on_exactly_one_side() {
        let registry = registry();
        let host: Arc<dyn Routable> = Arc::new(Clock);
        let table = RoutingTable::default();

        let joined = table.add_subscription(subscription(&registry, &host));
        assert!(matches!(joined, Join::Added(None)));
        let snapshot = table.put_producer(producer(&registry, &host)).unwrap();
        assert_eq!(snapshot.len(), 1);

        let other: Arc<dyn Routable> = Arc::new(Clock);
        let joined = table.add_subscription(subscription(&registry, &other));
        assert!(matches!(joined, Join::Added(Some(_))));
    }

    #[test]
    fn test_producer_of_dropped_host_is_replaced() {
        let registry = registry();
        let first: Arc<dyn Routable> = Arc::new(Clock);
        let second: Arc<dyn Routable> = Arc::new(Clock);
        let table = RoutingTable::default();
        table.put_producer(producer(&registry, &first)).unwrap();

        drop(first);

        assert!(table.producer(EventType::of::<Tick>()).is_none());
        table.put_producer(producer(&registry, &second)).unwrap();
        assert!(table.producer(EventType::of::<Tick>()).is_some());
    }

    #[test]
    fn test_remove_producer_requires_matching_owner() {
        let registry = registry();
        let owner: Arc<dyn Routable> = Arc::new(Clock);
        let other: Arc<dyn Routable> = Arc::new(Clock);
        let table = RoutingTable::default();
        let installed = producer(&registry, &owner);
        table.put_producer(Arc::clone(&installed)).unwrap();

        let foreign = producer(&registry, &other);
        assert!(table.remove_producer(EventType::of::<Tick>(), foreign.key(), "Clock").is_err());
        assert!(table.producer(EventType::of::<Tick>()).is_some());

        table.remove_producer(EventType::of::<Tick>(), installed.key(), "Clock").unwrap();
        assert!(!installed.is_valid());
        assert!(table.producer(EventType::of::<Tick>()).is_none());
    }

    #[test]
    fn test_concurrent_producers_admit_exactly_one() {
        const THREADS: usize = 8;

        let registry = Arc::new(registry());
        let table = Arc::new(RoutingTable::default());
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let table = Arc::clone(&table);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let host: Arc<dyn Routable> = Arc::new(Clock);
                    let candidate = producer(&registry, &host);
                    barrier.wait();
                    let accepted = table.put_producer(candidate).is_ok();
                    (accepted, host)
                })
            })
            .collect();

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(outcomes.iter().filter(|(accepted, _)| *accepted).count(), 1);
    }
}
