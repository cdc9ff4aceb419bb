// Test suite for the actuation backends
// The external backend is exercised with small shell scripts written to a
// temporary directory.

use super::*;
use crate::config::ActuationSettings;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Instant;

fn clockwise(speed: f32, duration: f32, acceleration: f32) -> Actuation {
    Actuation {
        kind: RotationKind::Clockwise,
        speed,
        duration,
        acceleration,
    }
}

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

// Tests for the rotation types
#[cfg(test)]
mod rotation_tests {
    use super::*;

    /// Status lines number CW as 1 and CCW as 2
    #[test]
    fn test_opcode_numbers() {
        assert_eq!(RotationKind::Clockwise.opcode_number(), 1);
        assert_eq!(RotationKind::CounterClockwise.opcode_number(), 2);
    }

    /// Program arguments and display names
    #[test]
    fn test_names() {
        assert_eq!(RotationKind::Clockwise.as_arg(), "cw");
        assert_eq!(RotationKind::CounterClockwise.as_arg(), "ccw");
        assert_eq!(RotationKind::CounterClockwise.to_string(), "Rotate CCW");
    }

    /// Errors render with the backend name
    #[test]
    fn test_error_display() {
        let error = ActuationError::BackendFailed {
            backend: "ExternalProcess".to_string(),
            message: "exited with status 2".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Backend ExternalProcess failed: exited with status 2"
        );
        assert!(
            ActuationError::TimedOut(Duration::from_secs(30))
                .to_string()
                .contains("30s")
        );
    }
}

// Tests for the simulated backend
#[cfg(test)]
mod simulated_tests {
    use super::*;

    /// The simulated motor takes its configured latency and succeeds
    #[async_std::test]
    async fn test_latency() {
        let backend = SimulatedBackend::new(Duration::from_millis(60));
        let started = Instant::now();
        backend.execute(&clockwise(5.0, 100.0, 10.0)).await.unwrap();
        assert!(started.elapsed() >= backend.latency());
    }

    /// Configuration picks the backend
    #[test]
    fn test_build_backend() {
        let mut settings = ActuationSettings::default();
        assert_eq!(build_backend(&settings).backend_name(), "Simulated");

        settings.backend = BackendKind::External;
        assert_eq!(build_backend(&settings).backend_name(), "ExternalProcess");
    }
}

// Tests for the external process backend
#[cfg(test)]
mod external_tests {
    use super::*;

    /// A zero exit status is a completed actuation
    #[async_std::test]
    async fn test_success() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "ok.sh", "exit 0");
        let backend = ExternalProcessBackend::new(program, Vec::new(), Duration::from_secs(5));

        assert!(backend.execute(&clockwise(1.0, 10.0, 10.0)).await.is_ok());
    }

    /// Direction, speed and duration follow the configured arguments;
    /// acceleration travels in the environment
    #[async_std::test]
    async fn test_arguments_and_environment() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("record.txt");
        let program = script(
            dir.path(),
            "record.sh",
            "echo \"$2 $3 $4 $MOTOR_ACCELERATION\" > \"$1\"",
        );
        let backend = ExternalProcessBackend::new(
            program,
            vec![record.to_string_lossy().into_owned()],
            Duration::from_secs(5),
        );

        backend.execute(&clockwise(3.5, 200.0, 7.5)).await.unwrap();
        assert_eq!(fs::read_to_string(&record).unwrap().trim(), "cw 3.5 200 7.5");

        let ccw = Actuation {
            kind: RotationKind::CounterClockwise,
            ..clockwise(2.0, 50.0, 0.0)
        };
        backend.execute(&ccw).await.unwrap();
        assert_eq!(fs::read_to_string(&record).unwrap().trim(), "ccw 2 50 0");
    }

    /// A non-zero exit status is a backend failure
    #[async_std::test]
    async fn test_non_zero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "fail.sh", "echo stalled >&2\nexit 3");
        let backend = ExternalProcessBackend::new(program, Vec::new(), Duration::from_secs(5));

        match backend.execute(&clockwise(1.0, 10.0, 10.0)).await {
            Err(ActuationError::BackendFailed { backend, message }) => {
                assert_eq!(backend, "ExternalProcess");
                assert_eq!(message, "exited with status 3");
            }
            other => panic!("Expected BackendFailed, got {:?}", other),
        }
    }

    /// A program that outlives its timeout is killed
    #[async_std::test]
    async fn test_timeout_kills_program() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "hang.sh", "exec sleep 30");
        let backend = ExternalProcessBackend::new(program, Vec::new(), Duration::from_millis(200));

        let started = Instant::now();
        match backend.execute(&clockwise(1.0, 10.0, 10.0)).await {
            Err(ActuationError::BackendFailed { message, .. }) => {
                assert!(message.contains("timed out"), "message: {}", message)
            }
            other => panic!("Expected BackendFailed, got {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    /// A program that cannot be started is a backend failure
    #[async_std::test]
    async fn test_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ExternalProcessBackend::new(
            dir.path().join("absent"),
            Vec::new(),
            Duration::from_secs(5),
        );

        match backend.execute(&clockwise(1.0, 10.0, 10.0)).await {
            Err(ActuationError::BackendFailed { message, .. }) => {
                assert!(message.starts_with("cannot spawn"))
            }
            other => panic!("Expected BackendFailed, got {:?}", other),
        }
    }
}
