//! Configuration Module
//!
//! This module provides constants, default settings and TOML loading for the
//! motor daemon. Command line flags are applied on top of the loaded file by
//! `main`.

use crate::utils::error::{MotorError, Result};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Constants for default settings
pub const DEFAULT_CONFIG_PATH: &str = "/etc/motord.toml";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_COMMAND_PORT: u16 = 12345;
pub const DEFAULT_TELEMETRY_PORT: u16 = 12346;
pub const DEFAULT_TELEMETRY_ACCEPT_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_TELEMETRY_INTERVAL_MS: u64 = 100;
pub const DEFAULT_ACTUATION_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SIMULATED_LATENCY_MS: u64 = 2000;
pub const DEFAULT_ACCELERATION: f32 = 10.0;
pub const DEFAULT_MOTOR_PROGRAM: &str = "/usr/local/bin/motor-control";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Bounds applied to `ACC` values by the execution loop
pub const ACCELERATION_MIN: f32 = 0.0;
pub const ACCELERATION_MAX: f32 = 10.0;

/// Size of a single socket read, matching the controller's buffers
pub const READ_BUFFER_SIZE: usize = 1024;

/// Complete daemon configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSettings,
    pub protocol: ProtocolSettings,
    pub telemetry: TelemetrySettings,
    pub actuation: ActuationSettings,
    pub logging: LoggingSettings,
}

/// Listening sockets
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: String,
    pub command_port: u16,
    /// Dedicated telemetry port; `None` streams telemetry on the command socket
    pub telemetry_port: Option<u16>,
    pub telemetry_accept_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            command_port: DEFAULT_COMMAND_PORT,
            telemetry_port: Some(DEFAULT_TELEMETRY_PORT),
            telemetry_accept_timeout_ms: DEFAULT_TELEMETRY_ACCEPT_TIMEOUT_MS,
        }
    }
}

impl ServerSettings {
    pub fn telemetry_accept_timeout(&self) -> Duration {
        Duration::from_millis(self.telemetry_accept_timeout_ms)
    }
}

/// Wire protocol options
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProtocolSettings {
    /// Echo `Command '<line>' received.` for every line read
    pub acknowledge_receipt: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub interval_ms: u64,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_TELEMETRY_INTERVAL_MS,
        }
    }
}

impl TelemetrySettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

/// Which actuation strategy drives the motor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Simulated,
    External,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActuationSettings {
    pub backend: BackendKind,
    /// Motor control program used by the external backend
    pub program: PathBuf,
    /// Arguments placed before the rotation arguments
    pub args: Vec<String>,
    pub timeout_secs: u64,
    pub simulated_latency_ms: u64,
    pub default_acceleration: f32,
}

impl Default for ActuationSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            program: PathBuf::from(DEFAULT_MOTOR_PROGRAM),
            args: Vec::new(),
            timeout_secs: DEFAULT_ACTUATION_TIMEOUT_SECS,
            simulated_latency_ms: DEFAULT_SIMULATED_LATENCY_MS,
            default_acceleration: DEFAULT_ACCELERATION,
        }
    }
}

impl ActuationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn simulated_latency(&self) -> Duration {
        Duration::from_millis(self.simulated_latency_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub file: Option<PathBuf>,
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            file: None,
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    /// Parses a TOML document; omitted keys keep their defaults
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration file at `path`.
    ///
    /// A missing file yields the defaults. A file that exists but cannot be
    /// read or parsed is an error.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(raw) => Self::from_toml(&raw),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(MotorError::Config(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.telemetry_port == Some(self.server.command_port)
            && self.server.command_port != 0
        {
            return Err(MotorError::Config(
                "telemetry_port must differ from command_port".to_string(),
            ));
        }
        if !(ACCELERATION_MIN..=ACCELERATION_MAX).contains(&self.actuation.default_acceleration) {
            return Err(MotorError::Config(format!(
                "default_acceleration must be within [{}, {}]",
                ACCELERATION_MIN, ACCELERATION_MAX
            )));
        }
        if self.actuation.timeout_secs == 0 {
            return Err(MotorError::Config(
                "actuation timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_controller_ports() {
        let config = Config::default();
        assert_eq!(config.server.command_port, 12345);
        assert_eq!(config.server.telemetry_port, Some(12346));
        assert_eq!(config.actuation.backend, BackendKind::Simulated);
        assert_eq!(config.actuation.timeout(), Duration::from_secs(30));
        assert_eq!(config.telemetry.interval(), Duration::from_millis(100));
        assert!(!config.protocol.acknowledge_receipt);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [server]
            command_port = 4000

            [actuation]
            backend = "external"
            program = "/opt/motor/rotate.py"
            args = ["-u"]
            "#,
        )
        .unwrap();

        assert_eq!(config.server.command_port, 4000);
        assert_eq!(config.server.telemetry_port, Some(DEFAULT_TELEMETRY_PORT));
        assert_eq!(config.actuation.backend, BackendKind::External);
        assert_eq!(config.actuation.program, PathBuf::from("/opt/motor/rotate.py"));
        assert_eq!(config.actuation.args, vec!["-u".to_string()]);
        assert_eq!(config.actuation.timeout_secs, DEFAULT_ACTUATION_TIMEOUT_SECS);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let result = Config::from_toml("server = [");
        assert!(matches!(result, Err(MotorError::Config(_))));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let result = Config::from_toml("[actuation]\nbackend = \"stepper\"\n");
        assert!(matches!(result, Err(MotorError::Config(_))));
    }

    #[test]
    fn same_ports_are_rejected() {
        let result = Config::from_toml("[server]\ncommand_port = 5000\ntelemetry_port = 5000\n");
        assert!(matches!(result, Err(MotorError::Config(_))));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.bind_addr, DEFAULT_BIND_ADDR);
    }

    #[test]
    fn loads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[telemetry]\ninterval_ms = 250\n[logging]\nlevel = \"debug\"").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.telemetry.interval(), Duration::from_millis(250));
        assert_eq!(config.logging.level, "debug");
    }
}
