//! # Herald Bus
//!
//! An in-process, type-routed publish/subscribe event bus.
//!
//! ## Overview
//!
//! Hosts declare which event types they produce and subscribe to through a
//! [`Finder`] (usually a [`Registry`]). Registering a host on an [`EventBus`]
//! binds those declarations to the host instance; posting an event delivers it
//! to every subscriber of its type and of its ancestors.
//!
//! ## Features
//!
//! * **Type routing**: events are keyed by [`EventType`] and routed along their
//!   [`Routable::supertype`] chain.
//! * **Producers**: at most one live producer per event type; late subscribers
//!   immediately receive its current value.
//! * **Weak hosts**: the bus never keeps a host alive.
//! * **Reentrancy safe**: events posted from a handler are queued on the
//!   posting thread and delivered in FIFO order once the handler returns.
//! * **Dead events**: an event with no subscribers is reposted as a [`DeadEvent`].
//! * **Concurrent**: `FxHashMap` + `parking_lot::RwLock` routing tables.
//!
//! # Example
//!
//! ```rust
//! use herald_bus::{BusError, EventBus, Registry, Routable};
//! use parking_lot::Mutex;
//! use std::sync::Arc;
//!
//! struct Location { lat: f64, lon: f64 }
//! impl Routable for Location {}
//!
//! struct Gps;
//! impl Routable for Gps {}
//!
//! #[derive(Default)]
//! struct Map { centre: Mutex<Option<(f64, f64)>> }
//! impl Routable for Map {}
//!
//! fn main() -> Result<(), BusError> {
//!     let registry = Registry::builder()
//!         .produce::<Gps, Location>(|_| Location { lat: 50.45, lon: 30.52 })
//!         .subscribe::<Map, Location>(|map, at| *map.centre.lock() = Some((at.lat, at.lon)))
//!         .build();
//!
//!     let bus = EventBus::new(registry);
//!     let gps = Arc::new(Gps);
//!     let map = Arc::new(Map::default());
//!
//!     bus.register(&gps)?;
//!     // The map joins late and still gets the current location.
//!     bus.register(&map)?;
//!     assert_eq!(*map.centre.lock(), Some((50.45, 30.52)));
//!
//!     bus.post(Location { lat: 48.0, lon: 24.0 })?;
//!     assert_eq!(*map.centre.lock(), Some((48.0, 24.0)));
//!     Ok(())
//! }
//! ```

mod binding;
mod bus;
mod config;
mod dispatch;
mod enforcer;
mod error;
mod event;
mod hierarchy;
mod registry;
mod routing;

pub use bus::EventBus;
pub use config::{BusConfig, EventBusBuilder, NoFinder, WithFinder};
pub use enforcer::{AnyThread, DesignatedThread, ThreadEnforcer};
pub use error::{BusError, BusErrorExt};
pub use event::{DeadEvent, EventType, Routable};
pub use hierarchy::DEFAULT_EXCLUDED_NAMESPACES;
pub use registry::{
    EmptyFinder, Finder, ProducerMethod, ProducerSet, Registry, RegistryBuilder, SubscriberMethod,
    SubscriberSet,
};
