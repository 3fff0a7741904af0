//! Capability lookup: which event types a host type produces and subscribes to.
//!
//! [`Finder`] is the seam for generated (or hand-written) adapter code. The bus
//! never inspects host types itself; it only asks a finder and memoizes the
//! answer per concrete host type in a [`FinderCache`].

use crate::error::BusError;
use crate::event::{EventType, Routable, view_as};
use fxhash::FxHashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type SubscribeFn = dyn Fn(&dyn Routable, &dyn Routable) -> Result<(), BusError> + Send + Sync;
type ProduceFn = dyn Fn(&dyn Routable) -> Result<Arc<dyn Routable>, BusError> + Send + Sync;

/// A subscribing method declared by a host type for one event type.
#[derive(Clone)]
pub struct SubscriberMethod {
    event_type: EventType,
    call: Arc<SubscribeFn>,
}

impl SubscriberMethod {
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Invokes the method. `host` and `event` are projected onto the declared types.
    pub(crate) fn invoke(&self, host: &dyn Routable, event: &dyn Routable) -> Result<(), BusError> {
        (self.call)(host, event)
    }
}

impl fmt::Debug for SubscriberMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberMethod").field("event_type", &self.event_type).finish()
    }
}

/// A producing method declared by a host type for one event type.
#[derive(Clone)]
pub struct ProducerMethod {
    event_type: EventType,
    call: Arc<ProduceFn>,
}

impl ProducerMethod {
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        self.event_type
    }

    pub(crate) fn invoke(&self, host: &dyn Routable) -> Result<Arc<dyn Routable>, BusError> {
        (self.call)(host)
    }
}

impl fmt::Debug for ProducerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerMethod").field("event_type", &self.event_type).finish()
    }
}

/// Ordered subscribing methods of one host type.
#[derive(Debug, Clone)]
pub struct SubscriberSet {
    host_type: EventType,
    methods: Vec<SubscriberMethod>,
}

impl SubscriberSet {
    #[must_use]
    pub const fn host_type(&self) -> EventType {
        self.host_type
    }

    #[must_use]
    pub fn methods(&self) -> &[SubscriberMethod] {
        &self.methods
    }

    pub fn event_types(&self) -> impl Iterator<Item = EventType> + '_ {
        self.methods.iter().map(SubscriberMethod::event_type)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Ordered producing methods of one host type.
#[derive(Debug, Clone)]
pub struct ProducerSet {
    host_type: EventType,
    methods: Vec<ProducerMethod>,
}

impl ProducerSet {
    #[must_use]
    pub const fn host_type(&self) -> EventType {
        self.host_type
    }

    #[must_use]
    pub fn methods(&self) -> &[ProducerMethod] {
        &self.methods
    }

    pub fn event_types(&self) -> impl Iterator<Item = EventType> + '_ {
        self.methods.iter().map(ProducerMethod::event_type)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Source of per-host-type capabilities.
///
/// Implementations must be deterministic: the bus caches both answers per host
/// type for its whole lifetime, including absent ones.
pub trait Finder: Send + Sync + fmt::Debug {
    fn producers_for(&self, host_type: EventType) -> Option<Arc<ProducerSet>>;
    fn subscribers_for(&self, host_type: EventType) -> Option<Arc<SubscriberSet>>;
}

/// A finder that knows no host types.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyFinder;

impl Finder for EmptyFinder {
    fn producers_for(&self, _host_type: EventType) -> Option<Arc<ProducerSet>> {
        None
    }

    fn subscribers_for(&self, _host_type: EventType) -> Option<Arc<SubscriberSet>> {
        None
    }
}

/// Table-backed [`Finder`] assembled from typed closures.
///
/// # Examples
/// ```rust
/// use herald_bus::{Registry, Routable};
///
/// struct Temperature(f32);
/// impl Routable for Temperature {}
///
/// struct Sensor;
/// impl Routable for Sensor {}
///
/// struct Display;
/// impl Routable for Display {}
/// impl Display {
///     fn show(&self, t: &Temperature) { let _ = t.0; }
/// }
///
/// let registry = Registry::builder()
///     .produce::<Sensor, Temperature>(|_| Temperature(21.5))
///     .subscribe::<Display, Temperature>(Display::show)
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct Registry {
    producers: FxHashMap<EventType, Arc<ProducerSet>>,
    subscribers: FxHashMap<EventType, Arc<SubscriberSet>>,
}

impl Registry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }
}

impl Finder for Registry {
    fn producers_for(&self, host_type: EventType) -> Option<Arc<ProducerSet>> {
        self.producers.get(&host_type).cloned()
    }

    fn subscribers_for(&self, host_type: EventType) -> Option<Arc<SubscriberSet>> {
        self.subscribers.get(&host_type).cloned()
    }
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    producers: FxHashMap<EventType, Vec<ProducerMethod>>,
    subscribers: FxHashMap<EventType, Vec<SubscriberMethod>>,
}

impl RegistryBuilder {
    /// Declares that hosts of type `H` receive events of type `E`.
    ///
    /// Events whose ancestor chain contains `E` are delivered as their `E` view.
    /// Redeclaring the same `(H, E)` pair replaces the earlier method.
    #[must_use]
    pub fn subscribe<H, E>(mut self, handler: impl Fn(&H, &E) + Send + Sync + 'static) -> Self
    where
        H: Routable,
        E: Routable,
    {
        let call = move |host: &dyn Routable, event: &dyn Routable| -> Result<(), BusError> {
            let host = view_as::<H>(host).ok_or_else(|| mismatch::<H>(host))?;
            let event = view_as::<E>(event).ok_or_else(|| mismatch::<E>(event))?;
            handler(host, event);
            Ok(())
        };
        let method = SubscriberMethod { event_type: EventType::of::<E>(), call: Arc::new(call) };
        upsert(self.subscribers.entry(EventType::of::<H>()).or_default(), method, |m| m.event_type);
        self
    }

    /// Declares that hosts of type `H` produce the current value of `E` on demand.
    #[must_use]
    pub fn produce<H, E>(mut self, current: impl Fn(&H) -> E + Send + Sync + 'static) -> Self
    where
        H: Routable,
        E: Routable,
    {
        let call = move |host: &dyn Routable| -> Result<Arc<dyn Routable>, BusError> {
            let host = view_as::<H>(host).ok_or_else(|| mismatch::<H>(host))?;
            Ok(Arc::new(current(host)))
        };
        let method = ProducerMethod { event_type: EventType::of::<E>(), call: Arc::new(call) };
        upsert(self.producers.entry(EventType::of::<H>()).or_default(), method, |m| m.event_type);
        self
    }

    #[must_use]
    pub fn build(self) -> Registry {
        let producers = self
            .producers
            .into_iter()
            .map(|(host_type, methods)| (host_type, Arc::new(ProducerSet { host_type, methods })))
            .collect();
        let subscribers = self
            .subscribers
            .into_iter()
            .map(|(host_type, methods)| (host_type, Arc::new(SubscriberSet { host_type, methods })))
            .collect();

        Registry { producers, subscribers }
    }
}

fn upsert<M>(methods: &mut Vec<M>, method: M, key: impl Fn(&M) -> EventType) {
    let event_type = key(&method);
    match methods.iter_mut().find(|existing| key(existing) == event_type) {
        Some(slot) => *slot = method,
        None => methods.push(method),
    }
}

fn mismatch<T: Routable>(value: &dyn Routable) -> BusError {
    BusError::TypeMismatch {
        message: format!(
            "{} has no {} view",
            value.type_name(),
            std::any::type_name::<T>()
        )
        .into(),
        context: None,
    }
}

/// Capabilities of one host type, as reported by the finder.
#[derive(Debug, Clone, Default)]
pub(crate) struct Capabilities {
    pub(crate) producers: Option<Arc<ProducerSet>>,
    pub(crate) subscribers: Option<Arc<SubscriberSet>>,
}

impl Capabilities {
    pub(crate) fn is_empty(&self) -> bool {
        self.producers.as_ref().is_none_or(|set| set.is_empty())
            && self.subscribers.as_ref().is_none_or(|set| set.is_empty())
    }
}

/// Per-bus memo of finder answers, negative ones included.
#[derive(Debug)]
pub(crate) struct FinderCache {
    finder: Arc<dyn Finder>,
    entries: RwLock<FxHashMap<EventType, Capabilities>>,
}

impl FinderCache {
    pub(crate) fn new(finder: Arc<dyn Finder>) -> Self {
        Self { finder, entries: RwLock::new(FxHashMap::default()) }
    }

    pub(crate) fn lookup(&self, host_type: EventType) -> Capabilities {
        if let Some(found) = self.entries.read().get(&host_type) {
            return found.clone();
        }

        let computed = Capabilities {
            producers: self.finder.producers_for(host_type),
            subscribers: self.finder.subscribers_for(host_type),
        };

        let mut entries = self.entries.write();
        entries
            .entry(host_type)
            .or_insert_with(|| {
                debug!(
                    host = host_type.name(),
                    empty = computed.is_empty(),
                    "Cached host capabilities"
                );
                computed
            })
            .clone()
    }
}
