//! In-process partitioned log.
//!
//! A fixed set of partitions, each an append-only message list with two
//! cursors: `next_read` (advanced by fetch, shared by all readers of the
//! group) and `committed` (advanced only by explicit commits). Rewinding
//! `next_read` to `committed` reproduces the redelivery a restart would
//! cause, which is how at-least-once behavior is exercised in tests.

use super::{ChannelError, ChannelResult, ClickPublisher, ClickReader, FetchedMessage};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

#[derive(Default)]
struct Partition {
    messages: Vec<String>,
    next_read: usize,
    committed: usize,
}

/// Ordered, partitioned, offset-committable in-process log.
pub struct InMemoryLog {
    partitions: Vec<Mutex<Partition>>,
    notify: Notify,
    rr: AtomicUsize,
    closed: AtomicBool,
}

impl InMemoryLog {
    pub fn new(partitions: u32) -> Self {
        Self {
            partitions: (0..partitions).map(|_| Mutex::default()).collect(),
            notify: Notify::new(),
            rr: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn partition_count(&self) -> u32 {
        self.partitions.len() as u32
    }

    fn lock(&self, partition: usize) -> std::sync::MutexGuard<'_, Partition> {
        self.partitions[partition]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Scans partitions round-robin for an unread message.
    fn try_fetch(&self) -> Option<FetchedMessage> {
        let start = self.rr.fetch_add(1, Ordering::Relaxed);

        for i in 0..self.partitions.len() {
            let partition = (start + i) % self.partitions.len();
            let mut state = self.lock(partition);

            if state.next_read < state.messages.len() {
                let offset = state.next_read;
                state.next_read += 1;

                return Some(FetchedMessage {
                    partition: partition as u32,
                    offset: offset as u64,
                    payload: state.messages[offset].clone(),
                });
            }
        }

        None
    }

    /// Committed offset high-water mark for a partition.
    pub fn committed(&self, partition: u32) -> u64 {
        self.lock(partition as usize).committed as u64
    }

    /// Number of messages ever appended to a partition.
    pub fn appended(&self, partition: u32) -> u64 {
        self.lock(partition as usize).messages.len() as u64
    }

    /// Rewinds every partition's read cursor to its committed offset,
    /// reproducing the redelivery a consumer restart would cause.
    pub fn rewind_to_committed(&self) {
        for i in 0..self.partitions.len() {
            let mut state = self.lock(i);
            state.next_read = state.committed;
        }
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl ClickPublisher for InMemoryLog {
    async fn publish(&self, partition: u32, payload: &str) -> ChannelResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }

        if partition as usize >= self.partitions.len() {
            return Err(ChannelError::UnknownPartition(partition));
        }

        self.lock(partition as usize)
            .messages
            .push(payload.to_string());
        self.notify.notify_waiters();

        Ok(())
    }
}

#[async_trait]
impl ClickReader for InMemoryLog {
    async fn fetch(&self) -> ChannelResult<FetchedMessage> {
        loop {
            // Register for wakeups before checking so a publish between
            // the check and the await is not lost.
            let notified = self.notify.notified();

            if let Some(msg) = self.try_fetch() {
                return Ok(msg);
            }

            if self.closed.load(Ordering::Acquire) {
                return Err(ChannelError::Closed);
            }

            notified.await;
        }
    }

    async fn commit(&self, batch: &[FetchedMessage]) -> ChannelResult<()> {
        for msg in batch {
            if msg.partition as usize >= self.partitions.len() {
                return Err(ChannelError::UnknownPartition(msg.partition));
            }

            let mut state = self.lock(msg.partition as usize);
            state.committed = state.committed.max(msg.offset as usize + 1);
        }

        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}
