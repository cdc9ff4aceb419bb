use super::{Actuation, ActuationBackend, ActuationError};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::time::Duration;
use tracing::debug;

/// Backend used when no physical motor is configured.
///
/// Every actuation sleeps for a fixed latency and succeeds.
pub struct SimulatedBackend {
    latency: Duration,
}

impl SimulatedBackend {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }
}

impl ActuationBackend for SimulatedBackend {
    fn execute<'a>(
        &'a self,
        actuation: &'a Actuation,
    ) -> BoxFuture<'a, Result<(), ActuationError>> {
        async move {
            debug!(
                "Simulating {} at speed {:.2} for {}ms (latency {:?})",
                actuation.kind, actuation.speed, actuation.duration, self.latency()
            );
            async_std::task::sleep(self.latency()).await;
            Ok(())
        }
        .boxed()
    }

    fn backend_name(&self) -> &'static str {
        "Simulated"
    }
}
