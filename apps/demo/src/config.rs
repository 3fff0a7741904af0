use config::{Config, Environment, File};
use herald_bus::BusConfig;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::info;

/// Errors raised while loading the demo configuration.
#[herald_derive::herald_error]
pub enum ConfigError {
    #[error("Config error{}: {source}", format_context(.context))]
    Config { source: config::ConfigError, context: Option<Cow<'static, str>> },
}

/// Settings of the `herald` binary.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Directives for the tracing filter; `RUST_LOG` takes precedence.
    pub log_filter: String,
    /// Temperature above which the watchdog raises an alarm.
    pub alarm_threshold: f32,
    pub bus: BusConfig,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self { log_filter: "info".to_owned(), alarm_threshold: 30.0, bus: BusConfig::default() }
    }
}

/// Loads `T` from an optional file overlaid with `HERALD__*` environment variables.
///
/// Nested keys use double underscores: `HERALD__BUS__STRICT=true` sets `bus.strict`.
/// A missing file is not an error; every field then comes from its default or
/// from the environment.
///
/// # Errors
/// Returns [`ConfigError::Config`] if the file is malformed or the merged
/// values do not deserialize into `T`.
pub fn load_config<T>(path: Option<impl AsRef<Path>>) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    let effective_path = path.map_or_else(|| PathBuf::from("herald"), |p| p.as_ref().to_path_buf());

    let builder = Config::builder()
        .add_source(File::from(effective_path.as_path()).required(false))
        .add_source(Environment::with_prefix("HERALD").separator("__").try_parsing(true));

    info!("Loading config from {}", effective_path.display());

    let config = builder
        .build()
        .context("Failed to build config")?
        .try_deserialize::<T>()
        .context("Failed to deserialize config")?;

    Ok(config)
}
