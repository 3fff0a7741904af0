#![allow(dead_code)]

use herald_bus::{
    DeadEvent, EventBus, EventType, Finder, ProducerSet, Registry, Routable, SubscriberSet,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick(pub u32);
impl Routable for Tick {}

#[derive(Debug)]
pub struct Input {
    pub device: u8,
}
impl Routable for Input {}

#[derive(Debug)]
pub struct Click {
    pub input: Input,
    pub button: u8,
}
impl Routable for Click {
    fn supertype(&self) -> Option<&dyn Routable> {
        Some(&self.input)
    }
}

impl Click {
    #[must_use]
    pub const fn new(device: u8, button: u8) -> Self {
        Self { input: Input { device }, button }
    }
}

/// Nobody subscribes to this one.
#[derive(Debug)]
pub struct Unheard(pub u32);
impl Routable for Unheard {}

#[derive(Debug)]
pub struct Ping(pub u32);
impl Routable for Ping {}

/// Produces the current [`Tick`].
#[derive(Debug, Default)]
pub struct Clock {
    pub now: AtomicU32,
}
impl Routable for Clock {}

impl Clock {
    #[must_use]
    pub fn at(now: u32) -> Arc<Self> {
        Arc::new(Self { now: AtomicU32::new(now) })
    }
}

/// Subscribes to [`Tick`], [`Input`] and [`Click`].
#[derive(Debug, Default)]
pub struct Screen {
    pub ticks: Mutex<Vec<u32>>,
    pub inputs: Mutex<Vec<u8>>,
    pub clicks: Mutex<Vec<u8>>,
}
impl Routable for Screen {}

impl Screen {
    #[must_use]
    pub fn ticks(&self) -> Vec<u32> {
        self.ticks.lock().clone()
    }
}

#[derive(Debug, Default)]
pub struct DeadLetters {
    pub types: Mutex<Vec<&'static str>>,
    pub unheard: Mutex<Vec<u32>>,
    pub buses: Mutex<Vec<String>>,
}
impl Routable for DeadLetters {}

/// Base host type: subscribes to [`Tick`] on behalf of every type embedding it.
#[derive(Debug, Default)]
pub struct Widget {
    pub ticks: Mutex<Vec<u32>>,
}
impl Routable for Widget {}

#[derive(Debug, Default)]
pub struct Button {
    pub widget: Widget,
    pub presses: Mutex<Vec<u8>>,
}
impl Routable for Button {
    fn supertype(&self) -> Option<&dyn Routable> {
        Some(&self.widget)
    }
}

pub type Journal = Arc<Mutex<Vec<String>>>;

/// Re-posts `Ping(n + 1)` while handling `Ping(n)`, up to `limit`.
#[derive(Debug)]
pub struct Echo {
    pub bus: EventBus,
    pub journal: Journal,
    pub limit: u32,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
}
impl Routable for Echo {}

impl Echo {
    #[must_use]
    pub fn new(bus: &EventBus, journal: &Journal, limit: u32) -> Arc<Self> {
        Arc::new(Self {
            bus: bus.clone(),
            journal: Arc::clone(journal),
            limit,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    fn on_ping(&self, ping: &Ping) {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        self.journal.lock().push(format!("echo {} start", ping.0));
        if ping.0 < self.limit {
            self.bus.post(Ping(ping.0 + 1)).expect("nested post failed");
        }
        self.journal.lock().push(format!("echo {} end", ping.0));

        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Second subscriber to [`Ping`].
#[derive(Debug)]
pub struct Mirror {
    pub journal: Journal,
}
impl Routable for Mirror {}

/// Unregisters its target the first time it sees a [`Tick`].
#[derive(Debug)]
pub struct Gatekeeper {
    pub bus: EventBus,
    pub target: Arc<Screen>,
}
impl Routable for Gatekeeper {}

/// Ancestor of [`Pendulum`].
#[derive(Debug, Default)]
pub struct Swing;
impl Routable for Swing {}

/// Produces a [`Click`], and through [`Swing`] whatever [`CrossedFinder`] hands it.
#[derive(Debug, Default)]
pub struct Pendulum {
    pub swing: Swing,
}
impl Routable for Pendulum {
    fn supertype(&self) -> Option<&dyn Routable> {
        Some(&self.swing)
    }
}

/// Receives [`Screen`]'s subscriptions from [`CrossedFinder`].
#[derive(Debug, Default)]
pub struct Decoy;
impl Routable for Decoy {}

/// Hands [`Swing`] the producers of [`Clock`] and [`Decoy`] the subscribers of
/// [`Screen`]; every call through them fails to project the host.
#[derive(Debug)]
pub struct CrossedFinder {
    registry: Registry,
}

impl Finder for CrossedFinder {
    fn producers_for(&self, host_type: EventType) -> Option<Arc<ProducerSet>> {
        if host_type == EventType::of::<Swing>() {
            return self.registry.producers_for(EventType::of::<Clock>());
        }
        self.registry.producers_for(host_type)
    }

    fn subscribers_for(&self, host_type: EventType) -> Option<Arc<SubscriberSet>> {
        if host_type == EventType::of::<Decoy>() {
            return self.registry.subscribers_for(EventType::of::<Screen>());
        }
        self.registry.subscribers_for(host_type)
    }
}

/// Capabilities of every fixture host.
#[must_use]
pub fn registry() -> Registry {
    Registry::builder()
        .produce::<Clock, Tick>(|clock| Tick(clock.now.load(Ordering::SeqCst)))
        .produce::<Pendulum, Click>(|_| Click::new(0, 7))
        .subscribe::<Screen, Tick>(|screen, tick| screen.ticks.lock().push(tick.0))
        .subscribe::<Screen, Input>(|screen, input| screen.inputs.lock().push(input.device))
        .subscribe::<Screen, Click>(|screen, click| screen.clicks.lock().push(click.button))
        .subscribe::<DeadLetters, DeadEvent>(|letters, dead| {
            letters.types.lock().push(dead.event_type().name());
            letters.buses.lock().push(dead.bus().tag().to_owned());
            if let Some(unheard) = dead.downcast::<Unheard>() {
                letters.unheard.lock().push(unheard.0);
            }
        })
        .subscribe::<Widget, Tick>(|widget, tick| widget.ticks.lock().push(tick.0))
        .subscribe::<Button, Click>(|button, click| button.presses.lock().push(click.button))
        .subscribe::<Echo, Ping>(Echo::on_ping)
        .subscribe::<Mirror, Ping>(|mirror, ping| mirror.journal.lock().push(format!("mirror {}", ping.0)))
        .subscribe::<Gatekeeper, Tick>(|gate, _| {
            gate.bus.unregister(&gate.target).expect("unregister from handler failed");
        })
        .build()
}

/// A lenient bus over [`registry`].
#[must_use]
pub fn setup_bus() -> EventBus {
    EventBus::new(registry())
}

/// A strict bus over [`registry`].
#[must_use]
pub fn setup_strict_bus() -> EventBus {
    EventBus::builder().tag("strict-bus").strict(true).finder(registry()).build()
}

/// A lenient bus whose finder hands out methods declared for other host types.
#[must_use]
pub fn setup_crossed_bus() -> EventBus {
    EventBus::new(CrossedFinder { registry: registry() })
}
