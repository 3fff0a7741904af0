use crate::bus::{BusInner, EventBus, next_bus_id};
use crate::enforcer::{AnyThread, ThreadEnforcer};
use crate::hierarchy::{DEFAULT_EXCLUDED_NAMESPACES, HierarchyResolver};
use crate::registry::{Finder, FinderCache};
use crate::routing::RoutingTable;
use private::Sealed;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::debug;

/// Deserializable settings of one bus instance.
///
/// Missing fields take their defaults, so an empty table is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Name used in logs and in the bus's `Display` output.
    pub tag: String,
    /// Whether duplicate or missing registrations are errors.
    pub strict: bool,
    /// Type-name prefixes at which hierarchy walks stop.
    pub excluded_namespaces: Vec<String>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            tag: "default-bus".to_owned(),
            strict: false,
            excluded_namespaces: DEFAULT_EXCLUDED_NAMESPACES.iter().map(|s| (*s).to_owned()).collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct NoFinder;
#[derive(Debug)]
pub struct WithFinder(Arc<dyn Finder>);

mod private {
    pub(super) trait Sealed {}
}
impl Sealed for NoFinder {}
impl Sealed for WithFinder {}

/// Builder for [`EventBus`]. A finder must be supplied before the bus can be built.
#[allow(private_bounds)]
#[derive(Debug)]
pub struct EventBusBuilder<S: Sealed = NoFinder> {
    state: S,
    config: BusConfig,
    enforcer: Arc<dyn ThreadEnforcer>,
}

impl Default for EventBusBuilder<NoFinder> {
    fn default() -> Self {
        Self { state: NoFinder, config: BusConfig::default(), enforcer: Arc::new(AnyThread) }
    }
}

#[allow(private_bounds)]
impl<S: Sealed> EventBusBuilder<S> {
    #[must_use = "Sets the tag shown in logs"]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.config.tag = tag.into();
        self
    }

    #[must_use = "Sets whether registration conflicts are errors"]
    pub const fn strict(mut self, enable: bool) -> Self {
        self.config.strict = enable;
        self
    }

    #[must_use = "Sets the thread-affinity policy"]
    pub fn enforcer(mut self, enforcer: impl ThreadEnforcer + 'static) -> Self {
        self.enforcer = Arc::new(enforcer);
        self
    }

    #[must_use = "Replaces the namespaces excluded from hierarchy walks"]
    pub fn excluded_namespaces<I, N>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.config.excluded_namespaces = namespaces.into_iter().map(Into::into).collect();
        self
    }

    #[must_use = "Applies a loaded configuration, replacing earlier settings"]
    pub fn config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    fn transition<N: Sealed>(self, state: N) -> EventBusBuilder<N> {
        EventBusBuilder { state, config: self.config, enforcer: self.enforcer }
    }
}

impl EventBusBuilder<NoFinder> {
    #[must_use = "Creates a new bus builder with default configuration"]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "Sets the capability lookup for registered hosts"]
    pub fn finder(self, finder: impl Finder + 'static) -> EventBusBuilder<WithFinder> {
        self.transition(WithFinder(Arc::new(finder)))
    }

    #[must_use = "Sets a shared capability lookup for registered hosts"]
    pub fn shared_finder(self, finder: Arc<dyn Finder>) -> EventBusBuilder<WithFinder> {
        self.transition(WithFinder(finder))
    }
}

impl EventBusBuilder<WithFinder> {
    #[must_use]
    pub fn build(self) -> EventBus {
        let Self { state: WithFinder(finder), config, enforcer } = self;
        let id = next_bus_id();

        debug!(bus = %config.tag, id, strict = config.strict, "Event bus created");

        EventBus {
            inner: Arc::new(BusInner {
                id,
                tag: config.tag,
                strict: AtomicBool::new(config.strict),
                enforcer,
                finder: FinderCache::new(finder),
                hierarchy: HierarchyResolver::new(config.excluded_namespaces),
                routes: RoutingTable::default(),
            }),
        }
    }
}
