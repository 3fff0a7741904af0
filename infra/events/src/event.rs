use crate::bus::EventBus;
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A value the bus can route: every posted event and every registered host.
///
/// Rust has no class inheritance, so an ancestor is modelled as an embedded
/// value exposed through [`Routable::supertype`]. A `Click` that embeds an
/// `Input` routes to `Input` subscribers as well, and those subscribers
/// receive the embedded `Input`.
///
/// The ancestor chain must be a property of the type: every instance of `T`
/// has to report supertypes of the same types in the same order, because the
/// bus caches the chain per concrete type.
///
/// ```rust
/// use herald_bus::Routable;
///
/// struct Input { device: u8 }
/// impl Routable for Input {}
///
/// struct Click { input: Input, button: u8 }
/// impl Routable for Click {
///     fn supertype(&self) -> Option<&dyn Routable> {
///         Some(&self.input)
///     }
/// }
/// ```
pub trait Routable: Any + Send + Sync + 'static {
    /// The embedded view of this value as its direct ancestor type.
    fn supertype(&self) -> Option<&dyn Routable> {
        None
    }

    /// Fully qualified name of the concrete type, used for logs and namespace exclusion.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Runtime identity of a routable type.
///
/// Equality and hashing use the [`TypeId`] only; the name is carried for diagnostics.
#[derive(Clone, Copy)]
pub struct EventType {
    id: TypeId,
    name: &'static str,
}

impl EventType {
    #[must_use]
    pub fn of<T: Routable>() -> Self {
        Self { id: TypeId::of::<T>(), name: std::any::type_name::<T>() }
    }

    /// The concrete type of a type-erased value.
    #[must_use]
    pub fn of_val(value: &dyn Routable) -> Self {
        let any: &dyn Any = value;
        Self { id: any.type_id(), name: value.type_name() }
    }

    #[must_use]
    pub const fn id(&self) -> TypeId {
        self.id
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventType {}

impl Hash for EventType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Walks the supertype chain of `value` until it reaches `target`.
pub(crate) fn project(value: &dyn Routable, target: EventType) -> Option<&dyn Routable> {
    let mut seen = Vec::new();
    let mut current = Some(value);
    while let Some(view) = current {
        let ty = EventType::of_val(view);
        if ty == target {
            return Some(view);
        }
        if seen.contains(&ty) {
            return None;
        }
        seen.push(ty);
        current = view.supertype();
    }
    None
}

/// Projects `value` onto `T` and downcasts it.
pub(crate) fn view_as<T: Routable>(value: &dyn Routable) -> Option<&T> {
    let view: &dyn Any = project(value, EventType::of::<T>())?;
    view.downcast_ref::<T>()
}

/// Posted in place of an event that matched no subscriber on any route.
///
/// A dead event is itself posted with the dead-letter fallback disabled, so an
/// unobserved `DeadEvent` is dropped rather than wrapped again.
#[derive(Clone)]
pub struct DeadEvent {
    bus: EventBus,
    event: Arc<dyn Routable>,
}

impl DeadEvent {
    pub(crate) fn new(bus: EventBus, event: Arc<dyn Routable>) -> Self {
        Self { bus, event }
    }

    /// The bus the event was posted on.
    #[must_use]
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The undelivered event.
    #[must_use]
    pub fn event(&self) -> &dyn Routable {
        &*self.event
    }

    #[must_use]
    pub fn event_type(&self) -> EventType {
        EventType::of_val(&*self.event)
    }

    /// The undelivered event viewed as `T` (itself or one of its ancestors).
    #[must_use]
    pub fn downcast<T: Routable>(&self) -> Option<&T> {
        view_as::<T>(&*self.event)
    }
}

impl Routable for DeadEvent {}

impl fmt::Debug for DeadEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeadEvent")
            .field("bus", &self.bus.tag())
            .field("event", &self.event_type())
            .finish()
    }
}
