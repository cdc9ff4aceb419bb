//! Execution Loop
//!
//! Drains the command queue strictly in FIFO order and runs one command at a
//! time. Rotations are handed to the actuation backend and bracketed by
//! start/completion notices on the command socket.

use super::command::Command;
use super::queue::{QueueConsumer, QueueEntry};
use super::response;
use super::session::Session;
use super::telemetry::{SpeedGauge, TelemetryState};
use crate::actuation::{Actuation, ActuationBackend, ActuationError, RotationKind};
use crate::config::{ACCELERATION_MAX, ACCELERATION_MIN};
use async_std::future::timeout;
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a dequeued command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Ran to completion
    Completed,
    /// `Command::None`, nothing to run
    Skipped,
    /// The actuation backend reported an error or hit the ceiling
    Failed,
    /// The session was already gone, nothing was run
    Discarded,
}

pub struct Executor {
    backend: Arc<dyn ActuationBackend>,
    telemetry: Arc<TelemetryState>,
    gauge: Arc<SpeedGauge>,
    ceiling: Duration,
    default_acceleration: f32,
    acceleration: f32,
    session_id: Option<u64>,
}

impl Executor {
    pub fn new(
        backend: Arc<dyn ActuationBackend>,
        telemetry: Arc<TelemetryState>,
        gauge: Arc<SpeedGauge>,
        ceiling: Duration,
        default_acceleration: f32,
    ) -> Self {
        Self {
            backend,
            telemetry,
            gauge,
            ceiling,
            default_acceleration,
            acceleration: default_acceleration,
            session_id: None,
        }
    }

    pub fn acceleration(&self) -> f32 {
        self.acceleration
    }

    /// Runs until the queue is closed and drained
    pub async fn run(mut self, queue: QueueConsumer) {
        info!(
            "Execution loop started with {} backend",
            self.backend.backend_name()
        );
        while let Some(entry) = queue.dequeue_one().await {
            self.process(entry).await;
            // Whatever piled up during that command runs back to back
            for entry in queue.dequeue_all() {
                self.process(entry).await;
            }
        }
        info!("Execution loop stopped");
    }

    async fn process(&mut self, entry: QueueEntry) {
        match entry {
            QueueEntry::Command { session, command } => {
                let outcome = self.execute(&session, command).await;
                debug!("{} -> {:?}", command, outcome);
            }
            QueueEntry::SessionEnd { session, done } => {
                self.end_session(&session);
                let _ = done.try_send(());
            }
        }
    }

    fn begin_session(&mut self, session: &Session) {
        if self.session_id != Some(session.id()) {
            self.session_id = Some(session.id());
            self.acceleration = self.default_acceleration;
        }
    }

    fn end_session(&mut self, session: &Session) {
        session.close();
        self.telemetry.reset();
        self.gauge.clear();
        self.session_id = None;
        self.acceleration = self.default_acceleration;
        info!("Session {} drained", session.id());
    }

    /// Runs one command for `session`
    pub async fn execute(&mut self, session: &Session, command: Command) -> Outcome {
        if !session.is_alive() {
            debug!("Discarding {} for closed session {}", command, session.id());
            return Outcome::Discarded;
        }
        self.begin_session(session);

        match command {
            Command::None => {
                self.reply(session, response::NO_COMMAND).await;
                Outcome::Skipped
            }
            Command::RotateCW { speed, duration } => {
                self.rotate(session, RotationKind::Clockwise, speed, duration)
                    .await
            }
            Command::RotateCCW { speed, duration } => {
                self.rotate(session, RotationKind::CounterClockwise, speed, duration)
                    .await
            }
            Command::SetAcceleration(value) => {
                let applied = value.clamp(ACCELERATION_MIN, ACCELERATION_MAX);
                if applied != value {
                    warn!("Acceleration {} out of range, clamped to {}", value, applied);
                }
                self.acceleration = applied;
                self.reply(session, &response::acceleration_set(applied)).await;
                Outcome::Completed
            }
            Command::TelemetryOn | Command::TelemetryOff => {
                let enabled = command == Command::TelemetryOn;
                self.telemetry.set_enabled(enabled);
                info!("Speed measurement {}", if enabled { "on" } else { "off" });
                self.reply(session, &response::speed_measurement(enabled)).await;
                Outcome::Completed
            }
            Command::Quit => {
                self.reply(session, response::CLIENT_DISCONNECTED).await;
                info!("Client disconnected.");
                session.close();
                self.telemetry.reset();
                Outcome::Completed
            }
        }
    }

    async fn rotate(
        &mut self,
        session: &Session,
        kind: RotationKind,
        speed: f32,
        duration: f32,
    ) -> Outcome {
        let number = kind.opcode_number();
        if !self.reply(session, &response::starting(number, Local::now())).await {
            return Outcome::Discarded;
        }

        let actuation = Actuation {
            kind,
            speed,
            duration,
            acceleration: self.acceleration(),
        };
        info!("Starting {} (speed {:.2}, {}ms)", kind, speed, duration);

        self.gauge.set(speed.abs());
        let result = match timeout(self.ceiling, self.backend.execute(&actuation)).await {
            Ok(result) => result,
            Err(_) => Err(ActuationError::TimedOut(self.ceiling)),
        };
        self.gauge.clear();

        let (line, outcome) = match &result {
            Ok(()) => {
                info!("{} complete", kind);
                (response::completed(number, Local::now()), Outcome::Completed)
            }
            Err(e) => {
                warn!("{} failed: {}", kind, e);
                (response::failed(number, e, Local::now()), Outcome::Failed)
            }
        };
        self.reply(session, &line).await;
        outcome
    }

    /// Writes a status line; returns false once the session is dead
    async fn reply(&self, session: &Session, line: &str) -> bool {
        match session.send(line).await {
            Ok(()) => true,
            Err(e) => {
                debug!("Dropping reply '{}': {}", line, e);
                false
            }
        }
    }
}
