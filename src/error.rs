/// Error returned when an encoder, formatter or filter is configured with
/// values that could never produce a well-formed record.
///
/// These are surfaced at construction time so that the formatting path
/// itself never has to fail.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("item separator must be a single ',' surrounded by whitespace, got {0:?}")]
    InvalidItemSeparator(String),

    #[error("key separator must be a single ':' surrounded by whitespace, got {0:?}")]
    InvalidKeySeparator(String),

    #[error("indent of {0} spaces exceeds the maximum of {max}", max = crate::encoder::MAX_INDENT)]
    IndentTooLarge(usize),

    #[error("invalid date format {0:?}")]
    InvalidDateFormat(String),

    #[error("context key {0:?} collides with a field the formatter writes")]
    ReservedKey(String),

    #[error("context key must not be empty")]
    EmptyKey,

    #[error("invalid value {value:?} for environment variable {key}")]
    InvalidEnv { key: String, value: String },
}

/// Failure reported by a [`ContextSource`](crate::context::ContextSource).
///
/// The filter never propagates these; they are counted and the event
/// continues with an empty context.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("context source is unavailable")]
    Unavailable,

    #[error("context source failed: {0}")]
    Failed(String),
}

/// Error returned by [`JsonFormatter::try_format`](crate::formatter::JsonFormatter::try_format).
#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("serialized record is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Error returned when installing the global subscriber.
#[cfg(feature = "layer")]
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),
}
