//! Error types for Treasure Core
//!
//! Every fallible operation in the core returns [`TreasureError`]. Store
//! failures are classified at the boundary so callers can tell an expected
//! uniqueness rejection apart from an unreachable store.

use thiserror::Error;

/// Result type alias for Treasure operations
pub type Result<T> = std::result::Result<T, TreasureError>;

/// Main error type for Treasure operations
#[derive(Error, Debug)]
pub enum TreasureError {
    /// The persistent store could not be reached, timed out, or failed
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A write was rejected by a uniqueness or foreign-key constraint
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Operation on an unknown identifier
    #[error("Not found: {0}")]
    NotFound(String),

    /// Identifier or location is already taken
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Operation attempted in a state that forbids it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Caller supplied a value the model cannot hold
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be used
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<TreasureError>,
    },
}

impl TreasureError {
    /// Add context to an error
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The error with all context layers peeled off
    pub fn root(&self) -> &TreasureError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// True when the store rejected a write because of a constraint
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self.root(), Self::ConstraintViolation(_))
    }

    /// True when the store itself failed
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self.root(), Self::StoreUnavailable(_))
    }
}

impl From<rusqlite::Error> for TreasureError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(ref err, ref message)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                TreasureError::ConstraintViolation(
                    message.clone().unwrap_or_else(|| err.to_string()),
                )
            }
            other => TreasureError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<r2d2::Error> for TreasureError {
    fn from(e: r2d2::Error) -> Self {
        TreasureError::StoreUnavailable(format!("connection pool: {}", e))
    }
}

impl From<tokio::task::JoinError> for TreasureError {
    fn from(e: tokio::task::JoinError) -> Self {
        TreasureError::StoreUnavailable(format!("store worker failed: {}", e))
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add lazy context to a Result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<TreasureError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().context(f()))
    }
}
