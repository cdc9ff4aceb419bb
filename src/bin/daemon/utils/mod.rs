//! Utilities Module
//!
//! This module contains shared utility functionality for the motor daemon.

pub mod error;
pub mod tracing;

/// Tests module for utils components
#[cfg(test)]
mod utils_tests;
