//! Actuation Backend Abstraction
//!
//! This module defines the trait implemented by every motor actuation
//! strategy and the types passed across it. The execution loop only ever
//! talks to `dyn ActuationBackend`, so it has no direct dependency on process
//! spawning or hardware access.

use crate::config::{ActuationSettings, BackendKind};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod external;
pub mod simulated;

pub use external::ExternalProcessBackend;
pub use simulated::SimulatedBackend;

/// Direction of a rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationKind {
    Clockwise,
    CounterClockwise,
}

impl RotationKind {
    /// Number used in the controller-facing status lines (`Starting command <n>`)
    pub fn opcode_number(self) -> u8 {
        match self {
            RotationKind::Clockwise => 1,
            RotationKind::CounterClockwise => 2,
        }
    }

    /// Argument handed to external motor programs
    pub fn as_arg(self) -> &'static str {
        match self {
            RotationKind::Clockwise => "cw",
            RotationKind::CounterClockwise => "ccw",
        }
    }
}

impl fmt::Display for RotationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationKind::Clockwise => write!(f, "Rotate CW"),
            RotationKind::CounterClockwise => write!(f, "Rotate CCW"),
        }
    }
}

/// A single motor action requested by the execution loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Actuation {
    pub kind: RotationKind,
    pub speed: f32,
    /// Requested run time in milliseconds
    pub duration: f32,
    /// Acceleration applied at the time of the request, within [0, 10]
    pub acceleration: f32,
}

/// Failures reported by actuation backends
#[derive(Error, Debug)]
pub enum ActuationError {
    /// The backend ran but did not complete the action successfully
    #[error("Backend {backend} failed: {message}")]
    BackendFailed { backend: String, message: String },

    /// The execution loop stopped waiting for the backend
    #[error("Actuation did not complete within {0:?}")]
    TimedOut(Duration),
}

/// Central trait for motor actuation
pub trait ActuationBackend: Send + Sync {
    /// Performs the action and resolves once the motor is done (or failed)
    fn execute<'a>(
        &'a self,
        actuation: &'a Actuation,
    ) -> BoxFuture<'a, Result<(), ActuationError>>;

    /// Gets the backend name
    fn backend_name(&self) -> &'static str;
}

/// Builds the backend selected by the configuration
pub fn build_backend(settings: &ActuationSettings) -> Arc<dyn ActuationBackend> {
    match settings.backend {
        BackendKind::Simulated => Arc::new(SimulatedBackend::new(settings.simulated_latency())),
        BackendKind::External => Arc::new(ExternalProcessBackend::new(
            settings.program.clone(),
            settings.args.clone(),
            settings.timeout(),
        )),
    }
}

#[cfg(test)]
mod actuation_tests;
