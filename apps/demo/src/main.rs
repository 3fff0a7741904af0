use anyhow::Context;
use herald_bus::EventBus;
use herald_demo::{DemoConfig, load_config, logging, scenario};
use tracing::info;

fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1);
    let cfg: DemoConfig = load_config(path).context("Critical: Configuration is malformed")?;

    logging::init(&cfg.log_filter)?;

    let bus = EventBus::builder().config(cfg.bus).finder(scenario::registry()).build();
    let summary = scenario::run(&bus, cfg.alarm_threshold)?;

    info!(
        readings = summary.readings,
        alarms = summary.alarms,
        dead_events = summary.dead_events,
        "Done"
    );
    Ok(())
}
