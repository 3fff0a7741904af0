use crate::error::BusError;
use crate::event::{EventType, Routable};
use crate::registry::{ProducerMethod, SubscriberMethod};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

/// Non-owning handle to a registered host.
///
/// Identity is the address of the host allocation. The weak reference keeps the
/// allocation (not the value) alive, so the address cannot be reused while
/// any binding still refers to it.
#[derive(Clone)]
pub(crate) struct HostRef {
    addr: usize,
    host_type: EventType,
    weak: Weak<dyn Routable>,
}

impl HostRef {
    pub(crate) fn new(host: &Arc<dyn Routable>) -> Self {
        Self {
            addr: Arc::as_ptr(host).cast::<()>().addr(),
            host_type: EventType::of_val(&**host),
            weak: Arc::downgrade(host),
        }
    }

    pub(crate) const fn addr(&self) -> usize {
        self.addr
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.weak.strong_count() > 0
    }

    pub(crate) fn upgrade(&self) -> Option<Arc<dyn Routable>> {
        self.weak.upgrade()
    }
}

impl fmt::Debug for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:#x}", self.host_type, self.addr)
    }
}

/// Identity of a binding: which host, through which of its types, for which event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct BindingKey {
    host: usize,
    declared_by: EventType,
    event_type: EventType,
}

impl BindingKey {
    pub(crate) const fn new(host: &HostRef, declared_by: EventType, event_type: EventType) -> Self {
        Self { host: host.addr(), declared_by, event_type }
    }
}

/// A host's subscription to one event type.
pub(crate) struct Subscription {
    host: HostRef,
    declared_by: EventType,
    method: SubscriberMethod,
    valid: AtomicBool,
}

impl Subscription {
    pub(crate) const fn new(host: HostRef, declared_by: EventType, method: SubscriberMethod) -> Self {
        Self { host, declared_by, method, valid: AtomicBool::new(true) }
    }

    pub(crate) const fn event_type(&self) -> EventType {
        self.method.event_type()
    }

    pub(crate) const fn key(&self) -> BindingKey {
        BindingKey::new(&self.host, self.declared_by, self.event_type())
    }

    /// Valid until invalidated or until the host is dropped.
    pub(crate) fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire) && self.host.is_alive()
    }

    pub(crate) fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    /// Hands `event` to the host.
    ///
    /// An invalidated subscription is a [`BusError::StaleDispatch`]; a host that
    /// was dropped since the caller's validity check is skipped.
    pub(crate) fn deliver(&self, event: &dyn Routable) -> Result<(), BusError> {
        if !self.valid.load(Ordering::Acquire) {
            return Err(BusError::StaleDispatch {
                message: format!("{self} was invalidated and can no longer receive events").into(),
                context: None,
            });
        }

        let Some(host) = self.host.upgrade() else {
            trace!(subscriber = %self, "Host dropped before delivery");
            return Ok(());
        };

        self.method.invoke(&*host, event)
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Subscriber \"{}\" -> {}]", self.declared_by, self.event_type())
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("host", &self.host)
            .field("declared_by", &self.declared_by)
            .field("event_type", &self.event_type())
            .field("valid", &self.valid.load(Ordering::Relaxed))
            .finish()
    }
}

/// A host's producer for one event type.
pub(crate) struct Producer {
    host: HostRef,
    declared_by: EventType,
    method: ProducerMethod,
    valid: AtomicBool,
}

impl Producer {
    pub(crate) const fn new(host: HostRef, declared_by: EventType, method: ProducerMethod) -> Self {
        Self { host, declared_by, method, valid: AtomicBool::new(true) }
    }

    pub(crate) const fn event_type(&self) -> EventType {
        self.method.event_type()
    }

    pub(crate) const fn host(&self) -> &HostRef {
        &self.host
    }

    pub(crate) const fn key(&self) -> BindingKey {
        BindingKey::new(&self.host, self.declared_by, self.event_type())
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire) && self.host.is_alive()
    }

    pub(crate) fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    /// Asks the host for its current value; `None` if the host was dropped.
    pub(crate) fn produce(&self) -> Result<Option<Arc<dyn Routable>>, BusError> {
        if !self.valid.load(Ordering::Acquire) {
            return Err(BusError::StaleDispatch {
                message: format!("{self} was invalidated and can no longer produce events").into(),
                context: None,
            });
        }

        let Some(host) = self.host.upgrade() else {
            return Ok(None);
        };

        self.method.invoke(&*host).map(Some)
    }
}

impl fmt::Display for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Producer \"{}\" -> {}]", self.declared_by, self.event_type())
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("host", &self.host)
            .field("declared_by", &self.declared_by)
            .field("event_type", &self.event_type())
            .field("valid", &self.valid.load(Ordering::Relaxed))
            .finish()
    }
}
