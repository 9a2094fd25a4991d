//! Core identifier types for the scheduler.
//!
//! These types provide type-safe identifiers for queues and running services.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised when a queue name fails validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    /// The name was empty.
    #[error("queue name must not be empty")]
    Empty,

    /// The name contained wildcard characters.
    #[error("queue name must not be a wildcard pattern: {0}")]
    Wildcard(String),
}

/// Name of a queue.
///
/// Queue names key every table in the scheduler. A valid name is non-empty
/// and is not a wildcard pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueName(String);

/// Opaque identifier assigned by the runtime adapter when a service starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceId(String);

impl QueueName {
    /// Create a new QueueName from a string without validation.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Parse and validate a queue name.
    pub fn parse(name: &str) -> Result<Self, NameError> {
        if name.is_empty() {
            return Err(NameError::Empty);
        }
        if name.contains(['*', '?']) {
            return Err(NameError::Wildcard(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    /// Get the underlying string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for QueueName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for QueueName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl ServiceId {
    /// Create a new ServiceId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServiceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ServiceId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
