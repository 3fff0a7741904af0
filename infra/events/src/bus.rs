use crate::binding::{BindingKey, HostRef, Producer, Subscription};
use crate::config::{EventBusBuilder, NoFinder};
use crate::dispatch::DispatchQueue;
use crate::enforcer::ThreadEnforcer;
use crate::error::BusError;
use crate::event::{DeadEvent, EventType, Routable};
use crate::hierarchy::HierarchyResolver;
use crate::registry::{Finder, FinderCache};
use crate::routing::{Join, RoutingTable};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, trace, warn};

static NEXT_BUS_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_bus_id() -> u64 {
    NEXT_BUS_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug)]
pub(crate) struct BusInner {
    pub(crate) id: u64,
    pub(crate) tag: String,
    pub(crate) strict: AtomicBool,
    pub(crate) enforcer: Arc<dyn ThreadEnforcer>,
    pub(crate) finder: FinderCache,
    pub(crate) hierarchy: HierarchyResolver,
    pub(crate) routes: RoutingTable,
}

/// A type-routed publish/subscribe bus.
///
/// Hosts are registered as `Arc`s and held weakly; dropping the last strong
/// reference silently detaches every binding of the host. Events are routed to
/// subscribers of their concrete type and of every ancestor reported through
/// [`Routable::supertype`].
///
/// Delivery is synchronous on the posting thread. Events posted from inside a
/// handler are queued and delivered after the current delivery returns.
///
/// Cloning is cheap and yields a handle to the same bus.
///
/// # Examples
/// ```rust
/// use herald_bus::{EventBus, Registry, Routable};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// struct Temperature(u32);
/// impl Routable for Temperature {}
///
/// #[derive(Default)]
/// struct Thermostat { last: AtomicU32 }
/// impl Routable for Thermostat {}
///
/// # fn main() -> Result<(), herald_bus::BusError> {
/// let registry = Registry::builder()
///     .subscribe::<Thermostat, Temperature>(|t, reading| t.last.store(reading.0, Ordering::SeqCst))
///     .build();
///
/// let bus = EventBus::new(registry);
/// let thermostat = Arc::new(Thermostat::default());
///
/// bus.register(&thermostat)?;
/// bus.post(Temperature(21))?;
///
/// assert_eq!(thermostat.last.load(Ordering::SeqCst), 21);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct EventBus {
    pub(crate) inner: Arc<BusInner>,
}

impl EventBus {
    /// A lenient bus tagged `default-bus` that accepts calls from any thread.
    #[must_use]
    pub fn new(finder: impl Finder + 'static) -> Self {
        Self::builder().finder(finder).build()
    }

    #[must_use]
    pub fn builder() -> EventBusBuilder<NoFinder> {
        EventBusBuilder::new()
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.inner.tag
    }

    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.inner.strict.load(Ordering::Acquire)
    }

    /// Switches between strict and lenient handling of registration conflicts.
    ///
    /// Takes effect for operations started after the call.
    pub fn set_strict_mode(&self, strict: bool) {
        self.inner.strict.store(strict, Ordering::Release);
        debug!(bus = %self.inner.tag, strict, "Strict mode changed");
    }

    /// Whether any live subscription exists for exactly `event_type`.
    #[must_use]
    pub fn has_subscribers(&self, event_type: EventType) -> bool {
        self.inner.routes.has_subscribers(event_type)
    }

    /// Whether a live producer exists for `event_type`.
    #[must_use]
    pub fn has_producer(&self, event_type: EventType) -> bool {
        self.inner.routes.producer(event_type).is_some()
    }

    /// Registers every producer and subscriber declared by `host`'s type and its ancestors.
    ///
    /// New producers replay their current value to subscribers already on the bus;
    /// new subscribers receive the current value of an already registered producer.
    ///
    /// # Errors
    /// - [`BusError::ThreadAffinity`] if the enforcer rejects the calling thread.
    /// - [`BusError::DuplicateProducer`] if a live producer, this host's own included,
    ///   already owns one of the produced event types. Raised in both modes.
    /// - [`BusError::AlreadyRegistered`] in strict mode, if a subscription already exists.
    /// - [`BusError::StaleDispatch`] or [`BusError::TypeMismatch`] from producing or
    ///   delivering a replay.
    ///
    /// When installation or a replay's production fails, every binding installed by
    /// this call is removed again and no replay is delivered.
    pub fn register<H: Routable>(&self, host: &Arc<H>) -> Result<(), BusError> {
        let host: Arc<dyn Routable> = Arc::<H>::clone(host);
        self.register_dyn(&host)
    }

    /// Type-erased [`EventBus::register`].
    ///
    /// # Errors
    /// See [`EventBus::register`].
    pub fn register_dyn(&self, host: &Arc<dyn Routable>) -> Result<(), BusError> {
        self.enforce()?;

        let host_ref = HostRef::new(host);
        let hierarchy = self.inner.hierarchy.for_registration(&**host, &self.inner.finder);
        let mut installed = Installed::default();

        let replays = self
            .install(&host_ref, &hierarchy, &mut installed)
            .and_then(|()| produce_replays(&installed.replays));
        let replays = match replays {
            Ok(replays) => replays,
            Err(err) => {
                self.rollback(&host_ref, installed);
                return Err(err);
            },
        };

        debug!(
            bus = %self.inner.tag,
            host = ?host_ref,
            producers = installed.producers.len(),
            subscribers = installed.subscriptions.len(),
            "Host registered"
        );

        let queue = self.queue();
        for (event, subscription) in replays {
            trace!(bus = %self.inner.tag, subscriber = %subscription, "Replaying produced value");
            queue.enqueue(event, subscription);
        }
        queue.drain()
    }

    /// Removes every producer and subscriber of `host` and invalidates them.
    ///
    /// Events already queued for the host are skipped.
    ///
    /// # Errors
    /// - [`BusError::ThreadAffinity`] if the enforcer rejects the calling thread.
    /// - [`BusError::NotRegistered`] in strict mode, for the first binding that was
    ///   missing. The remaining bindings are removed regardless.
    pub fn unregister<H: Routable>(&self, host: &Arc<H>) -> Result<(), BusError> {
        let host: Arc<dyn Routable> = Arc::<H>::clone(host);
        self.unregister_dyn(&host)
    }

    /// Type-erased [`EventBus::unregister`].
    ///
    /// # Errors
    /// See [`EventBus::unregister`].
    pub fn unregister_dyn(&self, host: &Arc<dyn Routable>) -> Result<(), BusError> {
        self.enforce()?;

        let host_ref = HostRef::new(host);
        let host_name = format!("{host_ref:?}");
        let hierarchy = self.inner.hierarchy.for_registration(&**host, &self.inner.finder);
        let routes = &self.inner.routes;
        let mut first_error = None;
        let mut removed = 0_usize;

        for &declared_by in hierarchy.iter() {
            let capabilities = self.inner.finder.lookup(declared_by);

            for event_type in capabilities.producers.iter().flat_map(|set| set.event_types()) {
                let key = BindingKey::new(&host_ref, declared_by, event_type);
                match routes.remove_producer(event_type, key, &host_name) {
                    Ok(()) => removed += 1,
                    Err(err) => self.absorb(err, &mut first_error),
                }
            }

            for event_type in capabilities.subscribers.iter().flat_map(|set| set.event_types()) {
                let key = BindingKey::new(&host_ref, declared_by, event_type);
                match routes.remove_subscription(event_type, key, &host_name) {
                    Ok(()) => removed += 1,
                    Err(err) => self.absorb(err, &mut first_error),
                }
            }
        }

        debug!(bus = %self.inner.tag, host = %host_name, count = removed, "Host unregistered");

        first_error.map_or(Ok(()), Err)
    }

    /// Delivers `event` to every subscriber of its type and of its ancestors.
    ///
    /// An event nobody subscribes to is wrapped in a [`DeadEvent`] and posted
    /// once more; an unobserved [`DeadEvent`] is dropped.
    ///
    /// # Errors
    /// - [`BusError::ThreadAffinity`] if the enforcer rejects the calling thread.
    /// - [`BusError::StaleDispatch`] or [`BusError::TypeMismatch`] from a delivery.
    ///   Deliveries queued after the failing one stay queued on this thread.
    pub fn post<E: Routable>(&self, event: E) -> Result<(), BusError> {
        self.post_arc(Arc::new(event))
    }

    /// Posts an already shared event. Every subscriber receives a view of the same value.
    ///
    /// # Errors
    /// See [`EventBus::post`].
    pub fn post_arc(&self, event: Arc<dyn Routable>) -> Result<(), BusError> {
        self.enforce()?;

        let dead_letter = EventType::of_val(&*event) != EventType::of::<DeadEvent>();
        self.route(event, dead_letter);
        self.queue().drain()
    }

    fn enforce(&self) -> Result<(), BusError> {
        self.inner.enforcer.enforce(self)
    }

    fn queue(&self) -> DispatchQueue {
        DispatchQueue::new(self.inner.id)
    }

    fn is_lenient(&self) -> bool {
        !self.is_strict()
    }

    /// Enqueues `event` for every live subscription on its posting hierarchy.
    fn route(&self, event: Arc<dyn Routable>, dead_letter: bool) {
        let hierarchy = self.inner.hierarchy.for_posting(&*event);
        let queue = self.queue();
        let mut count = 0_usize;

        for &event_type in hierarchy.iter() {
            for subscription in self.inner.routes.subscribers(event_type) {
                queue.enqueue(Arc::clone(&event), subscription);
                count += 1;
            }
        }

        let event_type = hierarchy.first().copied().unwrap_or_else(|| EventType::of_val(&*event));
        if count > 0 {
            trace!(bus = %self.inner.tag, event = event_type.name(), count, "Event enqueued");
        } else if dead_letter {
            warn!(bus = %self.inner.tag, event = event_type.name(), "No subscribers, posting dead event");
            self.route(Arc::new(DeadEvent::new(self.clone(), event)), false);
        } else {
            trace!(bus = %self.inner.tag, event = event_type.name(), "Dropping unobserved event");
        }
    }

    fn install(
        &self,
        host: &HostRef,
        hierarchy: &[EventType],
        installed: &mut Installed,
    ) -> Result<(), BusError> {
        let routes = &self.inner.routes;

        for &declared_by in hierarchy {
            let capabilities = self.inner.finder.lookup(declared_by);

            for method in capabilities.producers.iter().flat_map(|set| set.methods()) {
                let producer = Arc::new(Producer::new(host.clone(), declared_by, method.clone()));
                for subscription in routes.put_producer(Arc::clone(&producer))? {
                    installed.replays.push((Arc::clone(&producer), subscription));
                }
                installed.producers.push(producer);
            }

            for method in capabilities.subscribers.iter().flat_map(|set| set.methods()) {
                let subscription =
                    Arc::new(Subscription::new(host.clone(), declared_by, method.clone()));

                if let Join::Added(producer) = routes.add_subscription(Arc::clone(&subscription)) {
                    if let Some(producer) = producer {
                        installed.replays.push((producer, Arc::clone(&subscription)));
                    }
                    installed.subscriptions.push(subscription);
                    continue;
                }

                let err = BusError::AlreadyRegistered {
                    host: format!("{host:?}").into(),
                    event_type: method.event_type().name().into(),
                    context: Some("subscriber".into()),
                };
                if self.is_strict() {
                    return Err(err);
                }
                debug!(bus = %self.inner.tag, error = %err, "Ignoring registration conflict");
            }
        }

        Ok(())
    }

    fn rollback(&self, host: &HostRef, installed: Installed) {
        let host_name = format!("{host:?}");
        let routes = &self.inner.routes;

        for producer in installed.producers {
            let _ = routes.remove_producer(producer.event_type(), producer.key(), &host_name);
        }
        for subscription in installed.subscriptions {
            let _ = routes.remove_subscription(subscription.event_type(), subscription.key(), &host_name);
        }

        debug!(bus = %self.inner.tag, host = %host_name, "Registration rolled back");
    }

    /// Keeps the first error worth reporting; lenient mode drops registration conflicts.
    fn absorb(&self, err: BusError, first_error: &mut Option<BusError>) {
        if err.is_registration_conflict() && self.is_lenient() {
            debug!(bus = %self.inner.tag, error = %err, "Ignoring registration conflict");
            return;
        }
        first_error.get_or_insert(err);
    }
}

impl fmt::Display for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Bus \"{}\"]", self.inner.tag)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("id", &self.inner.id)
            .field("tag", &self.inner.tag)
            .field("strict", &self.is_strict())
            .field("enforcer", &self.inner.enforcer)
            .finish_non_exhaustive()
    }
}

/// Asks every producer for its current value before anything is queued, so a
/// failing producer leaves no replay behind on this thread.
fn produce_replays(
    replays: &[(Arc<Producer>, Arc<Subscription>)],
) -> Result<Vec<(Arc<dyn Routable>, Arc<Subscription>)>, BusError> {
    let mut values = Vec::with_capacity(replays.len());
    for (producer, subscription) in replays {
        if let Some(event) = producer.produce()? {
            values.push((event, Arc::clone(subscription)));
        }
    }
    Ok(values)
}

/// Bindings created by one `register` call, kept for replay and rollback.
#[derive(Default)]
struct Installed {
    producers: Vec<Arc<Producer>>,
    subscriptions: Vec<Arc<Subscription>>,
    replays: Vec<(Arc<Producer>, Arc<Subscription>)>,
}
