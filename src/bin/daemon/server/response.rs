//! Status lines written back to the controller.
//!
//! The controller displays these verbatim; nothing here is machine-parsed by
//! the server.

use crate::actuation::ActuationError;
use chrono::{DateTime, Local};

pub const NO_COMMAND: &str = "No command sent.";
pub const CLIENT_DISCONNECTED: &str = "Client disconnected.";

/// Format used for the `<timestamp>` part of progress notices
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub fn timestamp(at: DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn starting(number: u8, at: DateTime<Local>) -> String {
    format!("Starting command {} -- <{}>", number, timestamp(at))
}

pub fn completed(number: u8, at: DateTime<Local>) -> String {
    format!("Command {} completed -- <{}>", number, timestamp(at))
}

pub fn failed(number: u8, error: &ActuationError, at: DateTime<Local>) -> String {
    format!("Command {} failed: {} -- <{}>", number, error, timestamp(at))
}

pub fn acceleration_set(value: f32) -> String {
    format!("Acceleration set to {}.", value)
}

pub fn speed_measurement(enabled: bool) -> String {
    format!(
        "Speed measurement set to: '{}'.",
        if enabled { "True" } else { "False" }
    )
}

pub fn received(line: &str) -> String {
    format!("Command '{}' received.", line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn progress_notices_carry_number_and_timestamp() {
        let at = Local.with_ymd_and_hms(2024, 5, 17, 9, 30, 0).unwrap();
        assert_eq!(
            starting(1, at),
            "Starting command 1 -- <2024-05-17 09:30:00.000>"
        );
        assert_eq!(
            completed(2, at),
            "Command 2 completed -- <2024-05-17 09:30:00.000>"
        );
    }

    #[test]
    fn failure_notice_includes_the_error() {
        let at = Local.with_ymd_and_hms(2024, 5, 17, 9, 30, 0).unwrap();
        let error = ActuationError::BackendFailed {
            backend: "ExternalProcess".to_string(),
            message: "exited with status 3".to_string(),
        };
        let line = failed(1, &error, at);
        assert!(line.starts_with("Command 1 failed: Backend ExternalProcess failed"));
        assert!(line.ends_with("<2024-05-17 09:30:00.000>"));
    }

    #[test]
    fn toggles_and_echoes() {
        assert_eq!(speed_measurement(true), "Speed measurement set to: 'True'.");
        assert_eq!(speed_measurement(false), "Speed measurement set to: 'False'.");
        assert_eq!(acceleration_set(7.5), "Acceleration set to 7.5.");
        assert_eq!(received("RCW 1 2"), "Command 'RCW 1 2' received.");
    }
}
