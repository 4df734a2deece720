//! Remapper Error Handling
//!
//! Error types for the matching engine using `thiserror`.
//!
//! # Error Categories
//! - **Descriptor errors**: a field or method descriptor that cannot be parsed
//! - **Malformed elements**: records missing data the engine needs
//! - **Configuration errors**: knobs outside their valid range
//! - **Snapshot errors**: reading or decoding a snapshot / config file
//!
//! "No match found" is never an error: stages return empty mappings instead.

use thiserror::Error;

/// Remapper error types.
#[derive(Error, Debug)]
pub enum RemapError {
    /// Descriptor parsing error.
    ///
    /// Occurs when a descriptor string does not follow the JVM grammar.
    #[error("Malformed descriptor `{descriptor}`: {message}")]
    Descriptor { descriptor: String, message: String },

    /// Malformed input element.
    ///
    /// Occurs when a class, method or field record is missing required data.
    /// The engine logs and skips such elements.
    #[error("Malformed element {element}: {message}")]
    MalformedElement { element: String, message: String },

    /// Invalid configuration value.
    #[error("Invalid configuration: {field} = {value} ({message})")]
    InvalidConfig {
        field: &'static str,
        value: String,
        message: String,
    },

    /// Snapshot or configuration file could not be read or decoded.
    #[error("Snapshot error: {message}")]
    Snapshot {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RemapError {
    #[cold]
    pub fn descriptor(descriptor: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Descriptor {
            descriptor: descriptor.into(),
            message: message.into(),
        }
    }

    #[cold]
    pub fn malformed(element: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedElement {
            element: element.into(),
            message: message.into(),
        }
    }

    #[cold]
    pub fn invalid_config(field: &'static str, value: impl ToString, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            value: value.to_string(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for RemapError {
    #[cold]
    fn from(err: std::io::Error) -> Self {
        Self::Snapshot {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_json::Error> for RemapError {
    #[cold]
    fn from(err: serde_json::Error) -> Self {
        Self::Snapshot {
            message: format!("invalid JSON at line {} column {}", err.line(), err.column()),
            source: Some(Box::new(err)),
        }
    }
}

/// Result type for remapper operations.
pub type RemapResult<T> = Result<T, RemapError>;
