//! Tracing subscriber setup.

use tracing_subscriber::{
    filter::Directive,
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{CacheError, CacheResult};

/// Install a global tracing subscriber. `RUST_LOG` overrides `level`.
pub fn init(logging: &LoggingConfig) -> CacheResult<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_directive(&logging.level)?)
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|err| CacheError::Telemetry(format!("failed to install tracing subscriber: {err}")))
}

fn default_directive(level: &str) -> CacheResult<Directive> {
    level
        .parse::<Directive>()
        .map_err(|err| CacheError::Telemetry(format!("invalid log level {level:?}: {err}")))
}
