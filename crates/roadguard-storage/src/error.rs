//! Storage error types for the event store abstraction.

use std::fmt;

/// Errors that can occur during event store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested event was not found.
    #[error("Event not found: {id}")]
    NotFound {
        /// The id that was looked up.
        id: String,
    },

    /// Attempted to create an event whose id is already taken.
    #[error("Event already exists: {id}")]
    AlreadyExists {
        /// The duplicated id.
        id: String,
    },

    /// The backend could not be reached.
    #[error("Storage unavailable: {message}")]
    Unavailable {
        /// Description of the connectivity problem.
        message: String,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(id: impl Into<String>) -> Self {
        Self::AlreadyExists { id: id.into() }
    }

    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::AlreadyExists { .. } => ErrorCategory::Conflict,
            Self::Unavailable { .. } => ErrorCategory::Connection,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns `true` if the operation may succeed when attempted again.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    NotFound,
    Conflict,
    Connection,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Connection => write!(f, "connection"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
