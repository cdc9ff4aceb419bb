//! Command Parser
//!
//! Maps one protocol line to a typed [`Command`]. Parsing never fails from the
//! caller's point of view: malformed lines are downgraded to `Command::None`
//! so a bad line can never tear a session down.

use std::fmt;
use thiserror::Error;
use tracing::debug;

/// A parsed instruction from the controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Unrecognized or malformed line
    None,
    RotateCW { speed: f32, duration: f32 },
    RotateCCW { speed: f32, duration: f32 },
    /// Raw acceleration value; clamping happens at execution time
    SetAcceleration(f32),
    TelemetryOn,
    TelemetryOff,
    Quit,
}

/// Why a line was not recognized
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown opcode: {0}")]
    UnknownOpcode(String),

    #[error("Invalid numeric argument '{value}' for {opcode}")]
    InvalidNumber { opcode: String, value: String },
}

impl Command {
    /// Parses a protocol line, returning `Command::None` for anything invalid
    pub fn parse(line: &str) -> Command {
        match Command::try_from(line) {
            Ok(command) => command,
            Err(e) => {
                debug!("{}; treating '{}' as no command", e, line);
                Command::None
            }
        }
    }

    /// Opcode as written on the wire
    pub fn opcode(&self) -> &'static str {
        match self {
            Command::None => "-",
            Command::RotateCW { .. } => "RCW",
            Command::RotateCCW { .. } => "RCCW",
            Command::SetAcceleration(_) => "ACC",
            Command::TelemetryOn => "TSI",
            Command::TelemetryOff => "TSO",
            Command::Quit => "quit",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::None => write!(f, "None"),
            Command::RotateCW { speed, duration } | Command::RotateCCW { speed, duration } => {
                write!(f, "{} {} {}", self.opcode(), speed, duration)
            }
            Command::SetAcceleration(value) => write!(f, "ACC {}", value),
            _ => write!(f, "{}", self.opcode()),
        }
    }
}

/// Reads an optional positional number; absent fields default to zero
fn number(opcode: &str, token: Option<&str>) -> Result<f32, ParseError> {
    let Some(token) = token else {
        return Ok(0.0);
    };
    token
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| ParseError::InvalidNumber {
            opcode: opcode.to_string(),
            value: token.to_string(),
        })
}

impl TryFrom<&str> for Command {
    type Error = ParseError;

    fn try_from(line: &str) -> Result<Self, Self::Error> {
        let mut tokens = line.split_whitespace();
        let opcode = tokens.next().ok_or(ParseError::Empty)?;

        match opcode {
            "RCW" | "RCCW" => {
                let speed = number(opcode, tokens.next())?;
                let duration = number(opcode, tokens.next())?;
                if opcode == "RCW" {
                    Ok(Command::RotateCW { speed, duration })
                } else {
                    Ok(Command::RotateCCW { speed, duration })
                }
            }
            "ACC" => Ok(Command::SetAcceleration(number(opcode, tokens.next())?)),
            "TSI" => Ok(Command::TelemetryOn),
            "TSO" => Ok(Command::TelemetryOff),
            "quit" => Ok(Command::Quit),
            _ => Err(ParseError::UnknownOpcode(opcode.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rotations_with_arguments() {
        assert_eq!(
            Command::parse("RCW 3.5 200"),
            Command::RotateCW {
                speed: 3.5,
                duration: 200.0
            }
        );
        assert_eq!(
            Command::parse("RCCW 12 1500"),
            Command::RotateCCW {
                speed: 12.0,
                duration: 1500.0
            }
        );
    }

    #[test]
    fn absent_numbers_default_to_zero() {
        assert_eq!(
            Command::parse("RCW"),
            Command::RotateCW {
                speed: 0.0,
                duration: 0.0
            }
        );
        assert_eq!(
            Command::parse("RCCW 4"),
            Command::RotateCCW {
                speed: 4.0,
                duration: 0.0
            }
        );
        assert_eq!(Command::parse("ACC"), Command::SetAcceleration(0.0));
    }

    #[test]
    fn parser_does_not_clamp() {
        assert_eq!(Command::parse("ACC 42"), Command::SetAcceleration(42.0));
        assert_eq!(Command::parse("ACC -3"), Command::SetAcceleration(-3.0));
    }

    #[test]
    fn simple_opcodes() {
        assert_eq!(Command::parse("TSI"), Command::TelemetryOn);
        assert_eq!(Command::parse("TSO"), Command::TelemetryOff);
        assert_eq!(Command::parse("quit"), Command::Quit);
        // Trailing tokens are ignored
        assert_eq!(Command::parse("quit now"), Command::Quit);
    }

    #[test]
    fn unrecognized_lines_become_none() {
        for line in ["garbage", "", "   ", "rcw 1 1", "QUIT", "TS", "komanda 1", "RCWX 1 2"] {
            assert_eq!(Command::parse(line), Command::None, "line {:?}", line);
        }
    }

    #[test]
    fn bad_numbers_become_none() {
        for line in ["RCW fast 100", "RCCW 1 long", "ACC high", "RCW NaN 1", "ACC inf"] {
            assert_eq!(Command::parse(line), Command::None, "line {:?}", line);
        }
    }

    #[test]
    fn try_from_reports_the_reason() {
        assert_eq!(Command::try_from(""), Err(ParseError::Empty));
        assert_eq!(
            Command::try_from("spin 1"),
            Err(ParseError::UnknownOpcode("spin".to_string()))
        );
        assert_eq!(
            Command::try_from("ACC x"),
            Err(ParseError::InvalidNumber {
                opcode: "ACC".to_string(),
                value: "x".to_string()
            })
        );
    }

    #[test]
    fn display_uses_wire_form() {
        let command = Command::RotateCW {
            speed: 3.5,
            duration: 200.0,
        };
        assert_eq!(command.to_string(), "RCW 3.5 200");
        assert_eq!(Command::TelemetryOff.to_string(), "TSO");
    }
}
