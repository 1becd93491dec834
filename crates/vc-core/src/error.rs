//! Unified error types for the synthesis service.

/// Main error type for synthesis operations.
///
/// Only `Validation`, `NotFound`, `ResourceLoad` and `Synthesis` are meant to
/// reach a client. `Conversion` is produced by the optional conversion stage
/// and is absorbed by the pipeline's fallback.
#[derive(Debug, thiserror::Error)]
pub enum VcError {
    /// Bad request shape or values.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A voice reference matched no installed voice.
    #[error("not found: {0}")]
    NotFound(String),

    /// Engine construction failed (missing/corrupt asset, resource exhaustion).
    #[error("failed to load {resource}: {reason}")]
    ResourceLoad { resource: String, reason: String },

    /// The mandatory synthesis stage failed.
    #[error("synthesis failed: {0}")]
    Synthesis(String),

    /// The optional conversion stage failed.
    #[error("conversion failed: {0}")]
    Conversion(String),

    /// Resampling or container encoding failed.
    #[error("audio encoding failed: {0}")]
    Encode(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (should not happen in normal operation).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results with VcError.
pub type VcResult<T> = Result<T, VcError>;

impl VcError {
    /// Create a validation error with message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not-found error with message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a resource load error for the named resource.
    pub fn resource_load(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ResourceLoad {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// Create a synthesis error with message.
    pub fn synthesis(msg: impl Into<String>) -> Self {
        Self::Synthesis(msg.into())
    }

    /// Create a conversion error with message.
    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::Conversion(msg.into())
    }

    /// Create an encode error with message.
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Create a config error with message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error with message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable kind, used in error responses and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::ResourceLoad { .. } => "resource_load_error",
            Self::Synthesis(_) => "synthesis_error",
            Self::Conversion(_) => "conversion_error",
            Self::Encode(_) => "encode_error",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Whether the caller is at fault (maps to a 4xx response).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_))
    }
}
