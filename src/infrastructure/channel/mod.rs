//! Message channel boundary for click events.
//!
//! The pipeline talks to an ordered, partitioned, offset-committable log
//! through these traits: producers append to an explicit partition,
//! consumers pull messages and acknowledge them with manual, batchable
//! offset commits. The broker behind the traits is a deployment choice;
//! [`InMemoryLog`] is the in-process implementation used for
//! single-process deployments and tests.

mod memory_log;

pub use memory_log::InMemoryLog;

use async_trait::async_trait;

/// Errors from channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,
    #[error("unknown partition {0}")]
    UnknownPartition(u32),
    #[error("channel operation timed out")]
    Timeout,
    #[error("channel error: {0}")]
    Other(String),
}

pub type ChannelResult<T> = Result<T, ChannelError>;

/// A message pulled from the channel, held until its offset is committed.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    pub partition: u32,
    pub offset: u64,
    pub payload: String,
}

/// Appends click events with explicit partition assignment.
#[async_trait]
pub trait ClickPublisher: Send + Sync {
    async fn publish(&self, partition: u32, payload: &str) -> ChannelResult<()>;
}

/// Pull cursor over the channel for one consumer group.
///
/// `fetch` advances the shared group cursor; the message is redelivered
/// after a restart unless its offset is committed. Commits are manual and
/// may cover any batch of previously fetched messages.
#[async_trait]
pub trait ClickReader: Send + Sync {
    /// Fetches the next unread message, waiting until one is available.
    ///
    /// Returns [`ChannelError::Closed`] once the channel is closed and
    /// drained.
    async fn fetch(&self) -> ChannelResult<FetchedMessage>;

    /// Commits the offsets of `batch`, one high-water mark per partition.
    async fn commit(&self, batch: &[FetchedMessage]) -> ChannelResult<()>;

    /// Closes the channel; pending fetches return [`ChannelError::Closed`].
    async fn close(&self);
}
