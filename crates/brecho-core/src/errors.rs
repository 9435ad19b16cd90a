//! Error types for brecho-core.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout brecho-core.
pub type BrechoResult<T> = Result<T, BrechoError>;

/// Domain-specific errors for Brecho operations.
///
/// Oracle and speech failures are absent on purpose: the intake pipeline
/// recovers from them locally and they never reach a caller.
#[derive(Error, Debug)]
pub enum BrechoError {
    // =========================================================================
    // Input errors
    // =========================================================================
    /// An image could not be decoded or has no pixels.
    #[error("Image could not be used: {message}")]
    Extraction {
        /// What was wrong with the image.
        message: String,
    },

    /// Invalid argument provided to an operation.
    #[error("{0}")]
    InvalidArgument(String),

    /// A vector does not have the index dimension.
    #[error("Vector has dimension {actual}, the index expects {expected}")]
    DimensionMismatch {
        /// Dimension of the index.
        expected: usize,
        /// Dimension that was supplied.
        actual: usize,
    },

    // =========================================================================
    // Vector index errors
    // =========================================================================
    /// The vector index could not be read or written.
    #[error("Vector index storage error at `{path}`: {message}")]
    Persistence {
        /// Path to the index file or directory.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// The index on disk cannot be opened with the current configuration.
    #[error("Vector index incompatible: {reason}")]
    IndexIncompatible {
        /// Reason for incompatibility.
        reason: String,
    },

    /// The configured index backend is not compiled in.
    #[error("Vector index backend unavailable: {reason}")]
    IndexBackendUnavailable {
        /// Reason why the backend is unavailable.
        reason: String,
    },

    // =========================================================================
    // Model errors
    // =========================================================================
    /// The image embedding model could not be loaded or run.
    #[error("Embedding provider `{provider}` is unavailable: {reason}")]
    EmbeddingProviderUnavailable {
        /// The provider or model that failed.
        provider: String,
        /// Reason why the provider is unavailable.
        reason: String,
    },

    /// A remote collaborator failed outside the intake pipeline.
    #[error("Upstream service failed: {message}")]
    Upstream {
        /// Description of the failure.
        message: String,
    },

    // =========================================================================
    // Deadlines
    // =========================================================================
    /// The request did not finish within its overall deadline.
    #[error("Intake did not finish within {}s", .after.as_secs())]
    DeadlineExceeded {
        /// The deadline that was exceeded.
        after: Duration,
    },

    // =========================================================================
    // Configuration errors
    // =========================================================================
    /// Global configuration file is invalid.
    #[error("Global config invalid: {0}")]
    InvalidGlobalConfig(String),

    /// A configuration value is invalid.
    #[error("Invalid configuration: {message}. {hint}")]
    InvalidConfiguration {
        /// Description of the invalid configuration.
        message: String,
        /// Actionable hint on how to fix it.
        hint: String,
    },

    // =========================================================================
    // Wrapped errors
    // =========================================================================
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A background task panicked or was cancelled.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BrechoError {
    /// Create an extraction error.
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
        }
    }

    /// Stable machine-readable code, used by the HTTP gateway and `--json`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Extraction { .. } => "extraction_failed",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::Persistence { .. } => "persistence_failed",
            Self::IndexIncompatible { .. } => "index_incompatible",
            Self::IndexBackendUnavailable { .. } => "index_backend_unavailable",
            Self::EmbeddingProviderUnavailable { .. } => "embedding_unavailable",
            Self::Upstream { .. } => "upstream_failed",
            Self::DeadlineExceeded { .. } => "deadline_exceeded",
            Self::InvalidGlobalConfig(_) | Self::InvalidConfiguration { .. } => {
                "invalid_configuration"
            }
            Self::Io(_) | Self::Json(_) | Self::Yaml(_) | Self::Internal(_) => "internal",
        }
    }

    /// Whether the caller sent something unusable (as opposed to a server fault).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Extraction { .. } | Self::InvalidArgument(_) | Self::DimensionMismatch { .. }
        )
    }
}
