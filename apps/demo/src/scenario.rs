//! A small sensor dashboard wired through the bus.

use herald_bus::{BusError, DeadEvent, EventBus, Registry, Routable};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

/// Any sensor sample.
#[derive(Debug, Clone)]
pub struct Reading {
    pub sensor: &'static str,
}
impl Routable for Reading {}

#[derive(Debug, Clone)]
pub struct Temperature {
    pub reading: Reading,
    pub celsius: f32,
}
impl Routable for Temperature {
    fn supertype(&self) -> Option<&dyn Routable> {
        Some(&self.reading)
    }
}

impl Temperature {
    #[must_use]
    pub const fn new(sensor: &'static str, celsius: f32) -> Self {
        Self { reading: Reading { sensor }, celsius }
    }
}

#[derive(Debug, Clone)]
pub struct Humidity {
    pub reading: Reading,
    pub percent: f32,
}
impl Routable for Humidity {
    fn supertype(&self) -> Option<&dyn Routable> {
        Some(&self.reading)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alarm {
    pub sensor: &'static str,
    pub celsius: f32,
}
impl Routable for Alarm {}

/// An event nobody listens to; ends up as a [`DeadEvent`].
#[derive(Debug)]
pub struct Heartbeat;
impl Routable for Heartbeat {}

/// Produces the latest [`Temperature`].
#[derive(Debug)]
pub struct Thermometer {
    pub sensor: &'static str,
    pub celsius: Mutex<f32>,
}
impl Routable for Thermometer {}

#[derive(Debug, Default)]
pub struct Dashboard {
    pub readings: Mutex<Vec<&'static str>>,
    pub temperatures: Mutex<Vec<f32>>,
}
impl Routable for Dashboard {}

/// Posts an [`Alarm`] from inside its [`Temperature`] handler.
#[derive(Debug)]
pub struct Watchdog {
    pub bus: EventBus,
    pub threshold: f32,
}
impl Routable for Watchdog {}

#[derive(Debug, Default)]
pub struct AlarmPanel {
    pub alarms: Mutex<Vec<Alarm>>,
}
impl Routable for AlarmPanel {}

#[derive(Debug, Default)]
pub struct DeadLetterLog {
    pub events: Mutex<Vec<&'static str>>,
}
impl Routable for DeadLetterLog {}

/// Capabilities of every host in the scenario.
#[must_use]
pub fn registry() -> Registry {
    Registry::builder()
        .produce::<Thermometer, Temperature>(|t| Temperature::new(t.sensor, *t.celsius.lock()))
        .subscribe::<Dashboard, Reading>(|d, reading| d.readings.lock().push(reading.sensor))
        .subscribe::<Dashboard, Temperature>(|d, t| d.temperatures.lock().push(t.celsius))
        .subscribe::<Watchdog, Temperature>(|w, t| {
            if t.celsius <= w.threshold {
                return;
            }
            let alarm = Alarm { sensor: t.reading.sensor, celsius: t.celsius };
            if let Err(err) = w.bus.post(alarm) {
                warn!(error = %err, "Failed to raise alarm");
            }
        })
        .subscribe::<AlarmPanel, Alarm>(|panel, alarm| {
            warn!(sensor = alarm.sensor, celsius = alarm.celsius, "Temperature alarm");
            panel.alarms.lock().push(alarm.clone());
        })
        .subscribe::<DeadLetterLog, DeadEvent>(|log, dead| {
            info!(event = dead.event_type().name(), bus = %dead.bus(), "Dead event");
            log.events.lock().push(dead.event_type().name());
        })
        .build()
}

/// What the scenario observed.
#[derive(Debug, Default, PartialEq)]
pub struct Summary {
    pub readings: usize,
    pub temperatures: Vec<f32>,
    pub alarms: usize,
    pub dead_events: usize,
}

/// Drives the dashboard scenario on `bus`, which must use [`registry`].
///
/// # Errors
/// Propagates the first [`BusError`] returned by the bus.
pub fn run(bus: &EventBus, threshold: f32) -> Result<Summary, BusError> {
    let thermometer = Arc::new(Thermometer { sensor: "boiler", celsius: Mutex::new(21.0) });
    let dashboard = Arc::new(Dashboard::default());
    let watchdog = Arc::new(Watchdog { bus: bus.clone(), threshold });
    let panel = Arc::new(AlarmPanel::default());
    let dead_letters = Arc::new(DeadLetterLog::default());

    bus.register(&dead_letters)?;
    bus.register(&panel)?;
    bus.register(&watchdog)?;
    bus.register(&thermometer)?;
    // Joins late and is brought up to date by the thermometer.
    bus.register(&dashboard)?;
    info!(bus = %bus, "Hosts registered");

    for celsius in [24.5, 31.0, 28.0] {
        *thermometer.celsius.lock() = celsius;
        bus.post(Temperature::new(thermometer.sensor, celsius))?;
    }
    bus.post(Humidity { reading: Reading { sensor: "cellar" }, percent: 71.0 })?;
    bus.post(Heartbeat)?;

    bus.unregister(&dashboard)?;
    bus.post(Temperature::new(thermometer.sensor, 35.0))?;

    let summary = Summary {
        readings: dashboard.readings.lock().len(),
        temperatures: dashboard.temperatures.lock().clone(),
        alarms: panel.alarms.lock().len(),
        dead_events: dead_letters.events.lock().len(),
    };

    bus.unregister(&thermometer)?;
    bus.unregister(&watchdog)?;
    bus.unregister(&panel)?;
    bus.unregister(&dead_letters)?;

    info!(?summary, "Scenario finished");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_bus::BusConfig;

    fn bus(strict: bool) -> EventBus {
        let config = BusConfig { tag: "scenario".to_owned(), strict, ..BusConfig::default() };
        EventBus::builder().config(config).finder(registry()).build()
    }

    #[test]
    fn test_scenario_observes_replay_alarms_and_dead_events() {
        let summary = run(&bus(true), 30.0).unwrap();

        // Replay of 21.0, then three posts; the 35.0 post happens after unregistering.
        assert_eq!(summary.temperatures, vec![21.0, 24.5, 31.0, 28.0]);
        // Posted temperatures reach the `Reading` route too, as does the humidity sample.
        assert_eq!(summary.readings, 4);
        assert_eq!(summary.alarms, 2);
        assert_eq!(summary.dead_events, 1);
    }

    #[test]
    fn test_scenario_runs_in_lenient_mode() {
        let summary = run(&bus(false), 100.0).unwrap();

        assert_eq!(summary.alarms, 0);
        assert_eq!(summary.dead_events, 1);
    }

    #[test]
    fn test_scenario_leaves_bus_empty() {
        let bus = bus(true);
        run(&bus, 30.0).unwrap();

        assert!(!bus.has_producer(herald_bus::EventType::of::<Temperature>()));
        assert!(!bus.has_subscribers(herald_bus::EventType::of::<Temperature>()));
    }
}
