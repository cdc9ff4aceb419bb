//! Unified Error Handling System
//!
//! This module defines centralized error types for the motor daemon,
//! enabling consistency in error handling across the server and the
//! configuration layer. Actuation failures have their own type in
//! `actuation` and are reported to the controller rather than propagated.

use thiserror::Error;

/// Enumeration of all error types in the application
#[derive(Error, Debug)]
pub enum MotorError {
    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid arguments error
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// System I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Accept, read or write failure on a controller connection
    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<toml::de::Error> for MotorError {
    fn from(error: toml::de::Error) -> Self {
        MotorError::Config(error.to_string())
    }
}

impl From<std::net::AddrParseError> for MotorError {
    fn from(error: std::net::AddrParseError) -> Self {
        MotorError::InvalidArguments(error.to_string())
    }
}

/// Standardized result type for the entire application
pub type Result<T> = std::result::Result<T, MotorError>;
