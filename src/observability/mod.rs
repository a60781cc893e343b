//! Observability subsystem for tabula
//!
//! Structured logging through `tracing`. Every structural mutation logs an
//! [`Event`] name plus the database, table and column it touched.
//!
//! # Usage
//!
//! ```ignore
//! use tabula::observability::{init_logging, Event, LoggingConfig};
//!
//! init_logging(&LoggingConfig::default())?;
//! tracing::info!(event = %Event::ColumnCreated, database = "books", "column created");
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{init_logging, LogFormat, LoggingConfig};

use std::fmt;

/// Observability error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservabilityErrorCode {
    /// Logging could not be configured
    TabulaObservabilityFailed,
}

impl ObservabilityErrorCode {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservabilityErrorCode::TabulaObservabilityFailed => "TABULA_OBSERVABILITY_FAILED",
        }
    }
}

impl fmt::Display for ObservabilityErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Observability error
#[derive(Debug)]
pub struct ObservabilityError {
    code: ObservabilityErrorCode,
    message: String,
}

impl ObservabilityError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: ObservabilityErrorCode::TabulaObservabilityFailed,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ObservabilityErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ObservabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ERROR] {}: {}", self.code, self.message)
    }
}

impl std::error::Error for ObservabilityError {}

/// Result type for observability operations
pub type ObservabilityResult<T> = Result<T, ObservabilityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_level_is_reported() {
        let config = LoggingConfig {
            level: "tabula=notalevel".into(),
            format: LogFormat::Pretty,
        };
        if std::env::var_os("RUST_LOG").is_none() {
            let err = config.filter().unwrap_err();
            assert_eq!(err.code(), ObservabilityErrorCode::TabulaObservabilityFailed);
            assert!(err.to_string().starts_with("[ERROR] TABULA_OBSERVABILITY_FAILED"));
        }
    }
}
