//! Server Module
//!
//! This module contains the core server components for the motor daemon.
//! One controller at a time connects over TCP, sends line-oriented commands
//! and receives status lines plus a periodic telemetry stream.
//!
//! The server module is organized into these components:
//! - command: Parses protocol lines into commands
//! - queue: FIFO between the read loop and the execution loop
//! - executor: Runs queued commands one at a time against the actuation backend
//! - telemetry: Periodic speed readings
//! - session: Per-controller sockets and the read loop
//! - server: Accept loop and session lifecycle

/// Command module - the command vocabulary and its line parser
pub mod command;

/// Executor module - the execution loop
pub mod executor;

/// Queue module - the command queue shared by the read and execution loops
pub mod queue;

/// Response module - status lines written back to the controller
pub mod response;

/// Server module - binds the sockets and serves controllers one after another
pub mod server;

/// Session module - controller sockets and the read loop
pub mod session;

/// Telemetry module - telemetry state and the reporting loop
pub mod telemetry;
