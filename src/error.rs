/// Error type for store backend operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// A store operation failed.
    ///
    /// The built-in in-memory stores never fail; this is the reporting
    /// channel for user-implemented backends (disk or network backed
    /// stores).
    #[error("[{store}] store error for key '{key}': {message}")]
    Operation {
        store: String,
        key: String,
        message: String,
    },
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Create a new operation error.
    pub fn operation(
        store: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        StoreError::Operation {
            store: store.into(),
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Error type for fetch attempts.
///
/// `Network` and `Validation` are surfaced to subscribers via
/// [`ResourceState::error`](crate::ResourceState); this layer is
/// schema-agnostic and treats them identically. `Cancelled` is never
/// surfaced: a superseded or abandoned fetch has an unobservable outcome.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// Transport or HTTP failure.
    #[error("network error: {0}")]
    Network(String),
    /// The response failed schema validation in the endpoint layer.
    #[error("validation error: {0}")]
    Validation(String),
    /// The fetch was cancelled; absorbed by the generation gate.
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        FetchError::Network(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        FetchError::Validation(message.into())
    }

    /// Whether this error is cancellation (never surfaced to subscribers).
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}
