use std::borrow::Cow;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[herald_derive::herald_error]
pub enum LoggingError {
    /// The filter directives could not be parsed.
    #[error("Invalid log filter{}: {source}", format_context(.context))]
    Filter {
        source: tracing_subscriber::filter::ParseError,
        context: Option<Cow<'static, str>>,
    },

    /// A global subscriber was already installed in this process.
    #[error("Tracing subscriber error{}: {source}", format_context(.context))]
    Subscriber {
        source: tracing_subscriber::util::TryInitError,
        context: Option<Cow<'static, str>>,
    },
}

/// Installs a compact console subscriber.
///
/// `RUST_LOG` overrides `directives` when it is set.
///
/// # Errors
/// Returns [`LoggingError::Filter`] for invalid directives and
/// [`LoggingError::Subscriber`] if a global subscriber is already installed.
pub fn init(directives: &str) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(directives).context(format!("directives `{directives}`"))?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer().compact().with_ansi(true).with_thread_names(true).boxed())
        .try_init()?;

    Ok(())
}
