// Test suite for the utils module
// This file contains tests for the error type and the tracing setup.

use crate::utils::error::{MotorError, Result};

// Tests for the error module functionality
#[cfg(test)]
mod error_tests {
    use super::*;
    use std::io;

    /// Test the display form of every variant
    #[test]
    fn test_error_display() {
        let config_error = MotorError::Config("bad port".to_string());
        assert_eq!(format!("{}", config_error), "Configuration error: bad port");

        let args_error = MotorError::InvalidArguments("no host".to_string());
        assert_eq!(format!("{}", args_error), "Invalid arguments: no host");

        let connection_error = MotorError::Connection("write failed".to_string());
        assert_eq!(format!("{}", connection_error), "Connection error: write failed");
    }

    /// Test conversion from std::io::Error to MotorError
    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::AddrInUse, "Address in use");
        let motor_error: MotorError = io_error.into();
        match motor_error {
            MotorError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::AddrInUse),
            _ => panic!("Expected Io"),
        }
    }

    /// Test conversion from an unparsable bind address
    #[test]
    fn test_addr_parse_error_conversion() {
        let parse_error = "not-an-ip".parse::<std::net::IpAddr>().unwrap_err();
        let motor_error: MotorError = parse_error.into();
        assert!(matches!(motor_error, MotorError::InvalidArguments(_)));
    }

    /// Test conversion from a TOML syntax error
    #[test]
    fn test_toml_error_conversion() {
        let toml_error = toml::from_str::<toml::Table>("= broken").unwrap_err();
        let motor_error: MotorError = toml_error.into();
        assert!(matches!(motor_error, MotorError::Config(_)));
    }

    /// Test error propagation through the Result alias
    #[test]
    fn test_question_mark_propagation() {
        fn bind_port(raw: &str) -> Result<std::net::IpAddr> {
            Ok(raw.parse::<std::net::IpAddr>()?)
        }

        assert!(bind_port("127.0.0.1").is_ok());
        assert!(bind_port("localhost:80").is_err());
    }
}

// Tests for the tracing setup
#[cfg(test)]
mod tracing_tests {
    use crate::config::LoggingSettings;
    use crate::utils::tracing::setup_tracing;

    /// Repeated setup is harmless, with or without a log file
    #[test]
    fn test_setup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let settings = LoggingSettings {
            file: Some(dir.path().join("motord.log")),
            level: "debug".to_string(),
        };

        setup_tracing(&settings);
        setup_tracing(&LoggingSettings::default());
        tracing::info!("tracing initialized for tests");
    }
}
