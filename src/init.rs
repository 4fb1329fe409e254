use crate::context::ContextFilter;
use crate::encoder::{EncoderConfig, JsonEncoder};
use crate::env::{
    env_opt, parse_flag, JSON_LOG_DATE_FORMAT_ENV, JSON_LOG_HUMAN_READABLE_ENV, JSON_LOG_INDENT_ENV,
    JSON_LOG_LEVEL_ENV, JSON_LOG_PROCESS_NAME_ENV, JSON_LOG_UTC_ENV,
};
use crate::error::{ConfigError, InitError};
use crate::formatter::{Clock, FormatterConfig, JsonFormatter};
use crate::layer::JsonLogLayer;
use crate::scope::ThreadContext;
use crate::sink::LineSink;
use crate::value::Attributes;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Configuration of the JSON logging layer.
///
/// **Fields**
/// - `formatter`: timestamp clock and layout, excluded fields, frame bound.
/// - `encoder`: indentation and separators of the JSON output.
/// - `context_defaults`: keys guaranteed on every record, with the value
///   used when nothing else supplies them.
/// - `scoped_context`: if `true`, values entered with
///   [`LogContext`](crate::scope::LogContext) on the logging thread are
///   added to each record.
/// - `max_level`: least severe level that is recorded.
/// - `process_name`: overrides the reported `processName`.
/// - `human_readable`: if `true`, a `tracing_subscriber::fmt` layer is
///   installed alongside to print human-readable lines as well.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub formatter: FormatterConfig,
    pub encoder: EncoderConfig,
    pub context_defaults: Attributes,
    pub scoped_context: bool,
    pub max_level: tracing::Level,
    pub process_name: Option<String>,
    pub human_readable: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            formatter: FormatterConfig::default(),
            encoder: EncoderConfig::default(),
            context_defaults: Attributes::new(),
            scoped_context: true,
            max_level: tracing::Level::INFO,
            process_name: None,
            human_readable: false,
        }
    }
}

impl LayerConfig {
    /// Defaults overridden by the `JSON_LOG_*` environment variables that
    /// are set. Malformed values are reported rather than ignored.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = LayerConfig::default();

        if let Some(indent) = env_opt(JSON_LOG_INDENT_ENV) {
            let n = indent.trim().parse::<usize>().map_err(|_| invalid(JSON_LOG_INDENT_ENV, &indent))?;
            config.encoder.indent = Some(n);
        }
        if let Some(utc) = env_opt(JSON_LOG_UTC_ENV) {
            if parse_flag(JSON_LOG_UTC_ENV, &utc)? {
                config.formatter.clock = Clock::Utc;
            }
        }
        if let Some(format) = env_opt(JSON_LOG_DATE_FORMAT_ENV) {
            config.formatter.date_format = format;
        }
        if let Some(level) = env_opt(JSON_LOG_LEVEL_ENV) {
            config.max_level = level.trim().parse().map_err(|_| invalid(JSON_LOG_LEVEL_ENV, &level))?;
        }
        config.process_name = env_opt(JSON_LOG_PROCESS_NAME_ENV);
        if let Some(flag) = env_opt(JSON_LOG_HUMAN_READABLE_ENV) {
            config.human_readable = parse_flag(JSON_LOG_HUMAN_READABLE_ENV, &flag)?;
        }
        Ok(config)
    }

    /// Build the layer described by this configuration. All validation
    /// happens here, so a built layer never fails on the logging path.
    pub fn build_layer(&self, sink: Arc<dyn LineSink>) -> Result<JsonLogLayer, ConfigError> {
        let encoder = JsonEncoder::new(self.encoder.clone())?;
        let formatter = JsonFormatter::new(self.formatter.clone(), encoder)?;

        let mut filter = ContextFilter::builder().defaults(self.context_defaults.clone());
        if self.scoped_context {
            filter = filter.source(ThreadContext);
        }

        let mut layer = JsonLogLayer::new(sink, formatter)
            .with_context(filter.build()?)
            .with_max_level(self.max_level);
        if let Some(name) = &self.process_name {
            layer = layer.with_process_name(name.clone());
        }
        Ok(layer)
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnv { key: key.to_string(), value: value.to_string() }
}

/// Initialize global `tracing` subscriber using the provided sink and
/// [`LayerConfig`].
///
/// **Parameters**
/// - `sink`: implementation of [`LineSink`] that will receive one JSON
///   document per event.
/// - `config`: [`LayerConfig`] controlling formatting and context.
///
/// **Effects**
///
/// This installs a [`Registry`] combined with [`JsonLogLayer`] as the
/// global default subscriber, so all `tracing` events in the process
/// are observed by the layer.
///
/// **Errors**
/// - [`InitError::Config`] if the configuration is invalid.
/// - [`InitError::AlreadyInstalled`] if a global subscriber already exists.
pub fn init_tracing_with_config(sink: Arc<dyn LineSink>, config: LayerConfig) -> Result<(), InitError> {
    let layer = config.build_layer(sink)?;

    // The two stacks have different types, so each branch installs its own.
    if config.human_readable {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}

/// Initialize tracing with sensible defaults.
///
/// Equivalent to calling [`init_tracing_with_config`] with
/// [`LayerConfig::default`]. This is the recommended entrypoint for
/// typical services.
pub fn init_tracing(sink: Arc<dyn LineSink>) -> Result<(), InitError> {
    init_tracing_with_config(sink, LayerConfig::default())
}
