use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use super::messages::CommandMessage;

#[derive(Debug, Clone)]
pub struct QueuedCommand {
    pub message: CommandMessage,
    pub enqueued_at: Instant,
}

/// Ordered holding area for commands submitted while the link is down
///
/// Bounded at `capacity`. On overflow the oldest entry that has outlived
/// `expiry` is evicted; if none has, the oldest entry overall goes. The
/// entry being pushed is never the one evicted. A correlation id is held at
/// most once: pushing it again replaces the queued copy in place.
#[derive(Debug)]
pub struct PendingQueue {
    entries: VecDeque<QueuedCommand>,
    capacity: usize,
    expiry: Duration,
}

impl PendingQueue {
    pub fn new(capacity: usize, expiry: Duration) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            expiry,
        }
    }

    /// Append a command, returning the evicted one if the queue was full
    pub fn push(&mut self, message: CommandMessage, now: Instant) -> Option<CommandMessage> {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.message.correlation_id == message.correlation_id)
        {
            entry.message = message;
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.evict(now)
        } else {
            None
        };

        self.entries.push_back(QueuedCommand {
            message,
            enqueued_at: now,
        });

        evicted
    }

    fn evict(&mut self, now: Instant) -> Option<CommandMessage> {
        let index = self
            .entries
            .iter()
            .position(|entry| now.saturating_duration_since(entry.enqueued_at) >= self.expiry)
            .unwrap_or(0);

        self.entries.remove(index).map(|entry| entry.message)
    }

    /// Put a command back at the head, e.g. after a failed flush
    pub fn push_front(&mut self, entry: QueuedCommand) {
        self.entries.push_front(entry);
    }

    /// Drop a queued command so it is never transmitted
    pub fn remove(&mut self, correlation_id: Uuid) -> Option<CommandMessage> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.message.correlation_id == correlation_id)?;
        self.entries.remove(index).map(|entry| entry.message)
    }

    pub fn pop_front(&mut self) -> Option<QueuedCommand> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
