//! Error types for nvdl-rs
//!
//! This module defines all error types used throughout the library.
//! Structural errors are fatal to a whole compilation; resolution errors
//! come from external collaborators and are propagated unchanged.

use std::fmt;
use thiserror::Error;

use crate::model::SourceLocation;

/// Result type alias using nvdl Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for nvdl operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed rule set (undeclared mode, inclusion cycle, bad wildcard, ...)
    #[error("structural error: {0}")]
    Structural(#[from] StructuralError),

    /// A collaborator failed (validator provider, schema dereferencing).
    /// I/O failures inside the file resolver surface here with path context.
    /// Never produced by the compiler itself and never retried.
    #[error("resolution error: {0}")]
    Resolution(String),

    /// URL parsing error
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

/// Structural error in a declarative rule set.
///
/// Always fatal to the whole compilation: no partial dispatch graph is
/// produced, because downstream dispatch correctness depends on a fully
/// resolved, internally consistent mode graph.
#[derive(Debug, Clone)]
pub struct StructuralError {
    /// Error message
    pub message: String,
    /// Location of the offending declarative node, when known
    pub location: Option<SourceLocation>,
}

impl StructuralError {
    /// Create a new structural error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    /// Attach the offending node's source location
    pub fn with_location(mut self, location: &SourceLocation) -> Self {
        if location.has_line_info() || location.source_uri.is_some() {
            self.location = Some(location.clone());
        }
        self
    }
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(ref loc) = self.location {
            write!(f, " ({})", loc)?;
        }

        Ok(())
    }
}

impl std::error::Error for StructuralError {}
