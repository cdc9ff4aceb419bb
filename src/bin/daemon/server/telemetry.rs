//! Telemetry Channel
//!
//! While a session is open a telemetry task emits one reading per interval:
//! the current motor speed when telemetry is enabled, the `off` sentinel when
//! it is not. It runs independently of the execution loop, so an actuation in
//! progress never delays a reading.

use super::session::Session;
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tracing::debug;

/// Reading sent while telemetry is disabled
pub const TELEMETRY_OFF: &str = "off";

/// Enabled flag plus reporting cadence
pub struct TelemetryState {
    enabled: AtomicBool,
    interval: Duration,
}

impl TelemetryState {
    pub fn new(interval: Duration) -> Self {
        Self {
            enabled: AtomicBool::new(false),
            interval,
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Back to disabled, as at the start of every session
    pub fn reset(&self) {
        self.set_enabled(false);
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Latest speed reading, published by the execution loop
#[derive(Default)]
pub struct SpeedGauge {
    bits: AtomicU32,
}

impl SpeedGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, speed: f32) {
        self.bits.store(speed.to_bits(), Ordering::Release);
    }

    /// Motor at rest
    pub fn clear(&self) {
        self.set(0.0);
    }

    pub fn read(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }
}

/// The line sent on the next tick
pub fn reading(state: &TelemetryState, gauge: &SpeedGauge) -> String {
    if state.is_enabled() {
        format!("{:.2}", gauge.read())
    } else {
        TELEMETRY_OFF.to_string()
    }
}

/// Emits readings for `session` until it closes or its telemetry route fails.
///
/// Ticks are skipped while the session still waits for its telemetry socket.
pub async fn telemetry_loop(
    session: Arc<Session>,
    state: Arc<TelemetryState>,
    gauge: Arc<SpeedGauge>,
) {
    let mut ticks = async_std::stream::interval(state.interval());

    while ticks.next().await.is_some() {
        if !session.is_alive() {
            break;
        }
        if !session.has_telemetry() {
            continue;
        }
        if let Err(e) = session.send_telemetry(&reading(&state, &gauge)).await {
            debug!("Telemetry for session {} stopped: {}", session.id(), e);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_state_reports_the_sentinel() {
        let state = TelemetryState::new(Duration::from_millis(100));
        let gauge = SpeedGauge::new();
        gauge.set(7.25);
        assert_eq!(reading(&state, &gauge), "off");
    }

    #[test]
    fn enabled_state_reports_the_gauge() {
        let state = TelemetryState::new(Duration::from_millis(100));
        let gauge = SpeedGauge::new();
        state.set_enabled(true);
        assert_eq!(reading(&state, &gauge), "0.00");

        gauge.set(3.5);
        assert_eq!(reading(&state, &gauge), "3.50");

        gauge.clear();
        assert_eq!(reading(&state, &gauge), "0.00");
    }

    #[test]
    fn reset_disables() {
        let state = TelemetryState::new(Duration::from_millis(100));
        state.set_enabled(true);
        state.reset();
        assert!(!state.is_enabled());
    }
}
