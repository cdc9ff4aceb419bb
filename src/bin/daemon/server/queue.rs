//! Command Queue
//!
//! Unbounded FIFO between the read loop (sole producer) and the execution
//! loop (sole consumer). Enqueueing never blocks, so a long actuation never
//! holds up command acceptance.

use super::command::Command;
use super::session::Session;
use crate::utils::error::{MotorError, Result};
use async_std::channel::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;

/// One element of the queue
pub enum QueueEntry {
    /// A command received on `session`
    Command {
        session: Arc<Session>,
        command: Command,
    },
    /// Marks the end of `session`. The consumer signals `done` once every
    /// earlier entry has been handled.
    SessionEnd {
        session: Arc<Session>,
        done: Sender<()>,
    },
}

/// Producer half, held by the connection manager and the read loop
#[derive(Clone)]
pub struct QueueProducer {
    sender: Sender<QueueEntry>,
}

/// Consumer half, owned by the execution loop
pub struct QueueConsumer {
    receiver: Receiver<QueueEntry>,
}

/// Creates an empty queue
pub fn command_queue() -> (QueueProducer, QueueConsumer) {
    let (sender, receiver) = channel::unbounded();
    (QueueProducer { sender }, QueueConsumer { receiver })
}

impl QueueProducer {
    /// Appends a command; fails only once the queue has been closed
    pub fn enqueue(&self, session: Arc<Session>, command: Command) -> Result<()> {
        self.push(QueueEntry::Command { session, command })
    }

    /// Appends the end-of-session marker and returns the channel on which the
    /// consumer acknowledges it.
    pub fn end_session(&self, session: Arc<Session>) -> Result<Receiver<()>> {
        let (done, acknowledged) = channel::bounded(1);
        self.push(QueueEntry::SessionEnd { session, done })?;
        Ok(acknowledged)
    }

    /// Stops accepting entries; the consumer drains what is left and stops
    pub fn close(&self) {
        self.sender.close();
    }

    pub fn len(&self) -> usize {
        self.sender.len()
    }

    fn push(&self, entry: QueueEntry) -> Result<()> {
        self.sender
            .try_send(entry)
            .map_err(|_| MotorError::Connection("command queue is closed".to_string()))
    }
}

impl QueueConsumer {
    /// Waits for the next entry. Returns `None` once the queue is closed and empty.
    pub async fn dequeue_one(&self) -> Option<QueueEntry> {
        self.receiver.recv().await.ok()
    }

    /// Takes every entry that is ready right now, in FIFO order, without waiting
    pub fn dequeue_all(&self) -> Vec<QueueEntry> {
        let mut entries = Vec::with_capacity(self.receiver.len());
        loop {
            match self.receiver.try_recv() {
                Ok(entry) => entries.push(entry),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        entries
    }
}
