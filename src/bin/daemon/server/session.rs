//! Controller session
//!
//! A [`Session`] owns the command socket of the one connected controller and,
//! depending on configuration, a dedicated telemetry socket. It also hosts the
//! read loop that feeds parsed commands into the queue.

use super::command::Command;
use super::queue::QueueProducer;
use super::response;
use crate::config::READ_BUFFER_SIZE;
use crate::utils::error::{MotorError, Result};
use async_std::future::timeout;
use async_std::io::{ReadExt, WriteExt};
use async_std::net::TcpStream;
use async_std::sync::Mutex;
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long an unterminated line may wait for the rest of its bytes
const PARTIAL_LINE_IDLE: Duration = Duration::from_millis(200);

/// Where telemetry readings of a session are written
pub enum TelemetryRoute {
    /// Readings share the command socket
    Shared,
    /// Readings go to a second socket accepted together with the command socket
    Dedicated(TelemetryLink),
    /// A dedicated socket was expected but the controller did not open it in
    /// time. It may still be attached later with [`Session::attach_telemetry`].
    Unavailable,
}

/// Dedicated telemetry socket
pub struct TelemetryLink {
    handle: TcpStream,
    writer: Mutex<TcpStream>,
    alive: AtomicBool,
}

impl TelemetryLink {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            writer: Mutex::new(stream.clone()),
            handle: stream,
            alive: AtomicBool::new(true),
        }
    }

    async fn send(&self, message: &str) -> Result<()> {
        if !self.alive.load(Ordering::Acquire) {
            return Err(MotorError::Connection("telemetry channel closed".to_string()));
        }
        let mut writer = self.writer.lock().await;
        if let Err(e) = write_frame(&mut writer, message).await {
            drop(writer);
            self.close();
            return Err(MotorError::Connection(format!("telemetry write failed: {}", e)));
        }
        Ok(())
    }

    fn close(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            let _ = self.handle.shutdown(Shutdown::Both);
        }
    }
}

/// One connected controller
pub struct Session {
    id: u64,
    peer: SocketAddr,
    /// Handle used to shut the socket down and to clone the read half
    stream: TcpStream,
    /// Serializes outbound frames from the execution and telemetry loops
    writer: Mutex<TcpStream>,
    telemetry: TelemetryRoute,
    late_link: OnceLock<TelemetryLink>,
    alive: AtomicBool,
}

impl Session {
    pub fn new(id: u64, peer: SocketAddr, stream: TcpStream, telemetry: TelemetryRoute) -> Self {
        Self {
            id,
            peer,
            writer: Mutex::new(stream.clone()),
            stream,
            telemetry,
            late_link: OnceLock::new(),
            alive: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Writes one status line on the command socket.
    ///
    /// A write failure marks the session dead; later sends fail immediately.
    pub async fn send(&self, message: &str) -> Result<()> {
        if !self.is_alive() {
            return Err(MotorError::Connection(format!(
                "session {} is closed",
                self.id
            )));
        }
        let mut writer = self.writer.lock().await;
        if let Err(e) = write_frame(&mut writer, message).await {
            drop(writer);
            self.close();
            return Err(MotorError::Connection(format!("write failed: {}", e)));
        }
        Ok(())
    }

    /// True while a dedicated telemetry socket is expected but not attached
    pub fn awaits_telemetry(&self) -> bool {
        matches!(self.telemetry, TelemetryRoute::Unavailable) && self.late_link.get().is_none()
    }

    /// True once readings have somewhere to go
    pub fn has_telemetry(&self) -> bool {
        !self.awaits_telemetry()
    }

    /// Attaches a telemetry socket that arrived after the handshake.
    ///
    /// Returns false (and closes the link) if the session does not wait for
    /// one or is already closed.
    pub fn attach_telemetry(&self, link: TelemetryLink) -> bool {
        if !self.awaits_telemetry() {
            link.close();
            return false;
        }
        if let Err(link) = self.late_link.set(link) {
            link.close();
            return false;
        }
        if !self.is_alive() {
            // close() may have run before the link was stored
            if let Some(link) = self.late_link.get() {
                link.close();
            }
            return false;
        }
        true
    }

    /// Writes one telemetry reading on the route chosen for this session
    pub async fn send_telemetry(&self, reading: &str) -> Result<()> {
        match &self.telemetry {
            TelemetryRoute::Shared => self.send(reading).await,
            TelemetryRoute::Dedicated(link) => link.send(reading).await,
            TelemetryRoute::Unavailable => match self.late_link.get() {
                Some(link) => link.send(reading).await,
                None => Err(MotorError::Connection(
                    "no telemetry channel for this session".to_string(),
                )),
            },
        }
    }

    /// Closes both sockets. Pending reads on them return end-of-stream.
    pub fn close(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            info!("Closing session {} with {}", self.id, self.peer);
            let _ = self.stream.shutdown(Shutdown::Both);
            if let TelemetryRoute::Dedicated(link) = &self.telemetry {
                link.close();
            }
            if let Some(link) = self.late_link.get() {
                link.close();
            }
        }
    }

    pub(crate) fn reader(&self) -> TcpStream {
        self.stream.clone()
    }
}

async fn write_frame(stream: &mut TcpStream, message: &str) -> std::io::Result<()> {
    let mut frame = Vec::with_capacity(message.len() + 1);
    frame.extend_from_slice(message.as_bytes());
    frame.push(b'\n');
    stream.write_all(&frame).await?;
    stream.flush().await
}

/// Reassembles protocol lines from socket reads.
///
/// A line ends at `\n`. A NUL byte ends the whole message: controllers pad
/// fixed-size buffers with NULs, so everything before it is complete and the
/// padding is dropped. Bytes after the last terminator are kept until the next
/// read. Blank lines are dropped and a trailing `\r` is removed.
#[derive(Debug, Default)]
pub struct LineFramer {
    partial: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one payload and returns every line it completes
    pub fn push(&mut self, payload: &[u8]) -> Vec<String> {
        match payload.iter().position(|&b| b == 0) {
            Some(end) => {
                self.partial.extend_from_slice(&payload[..end]);
                let message = std::mem::take(&mut self.partial);
                split_lines(&message)
            }
            None => {
                self.partial.extend_from_slice(payload);
                match self.partial.iter().rposition(|&b| b == b'\n') {
                    Some(last) => {
                        let tail = self.partial.split_off(last + 1);
                        let complete = std::mem::replace(&mut self.partial, tail);
                        split_lines(&complete)
                    }
                    None => Vec::new(),
                }
            }
        }
    }

    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }

    /// Gives up waiting for a terminator and returns the held bytes as a line
    pub fn flush(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.partial);
        split_lines(&tail).pop()
    }
}

fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Queues one line; returns false when the read loop must stop
async fn submit(
    session: &Arc<Session>,
    queue: &QueueProducer,
    acknowledge_receipt: bool,
    line: String,
) -> bool {
    info!("Received from controller: {}", line);
    if acknowledge_receipt {
        if let Err(e) = session.send(&response::received(&line)).await {
            debug!("Receipt not delivered: {}", e);
        }
    }

    let command = Command::parse(&line);
    if let Err(e) = queue.enqueue(session.clone(), command) {
        warn!("Dropping '{}': {}", line, e);
        return false;
    }
    if command == Command::Quit {
        debug!("Quit received, session {} stops reading", session.id());
        return false;
    }
    true
}

/// Reads payloads from the controller until it disconnects, sends `quit`,
/// or the session is closed from elsewhere.
pub async fn read_loop(session: Arc<Session>, queue: QueueProducer, acknowledge_receipt: bool) {
    let mut reader = session.reader();
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut framer = LineFramer::new();

    loop {
        // A held partial line is flushed if the controller goes quiet
        let read = if framer.has_partial() {
            timeout(PARTIAL_LINE_IDLE, reader.read(&mut buf)).await.ok()
        } else {
            Some(reader.read(&mut buf).await)
        };

        let (lines, finished) = match read {
            None => (framer.flush().into_iter().collect(), false),
            Some(Ok(0)) => {
                if session.is_alive() {
                    info!("Controller {} disconnected", session.peer());
                }
                (framer.flush().into_iter().collect(), true)
            }
            Some(Ok(n)) => (framer.push(&buf[..n]), false),
            Some(Err(e)) => {
                if session.is_alive() {
                    warn!("Read from {} failed: {}", session.peer(), e);
                }
                (Vec::new(), true)
            }
        };

        for line in lines {
            if !submit(&session, &queue, acknowledge_receipt, line).await {
                return;
            }
        }
        if finished {
            break;
        }
    }
}
